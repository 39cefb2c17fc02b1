//! Error types for build projects and the execution service.

use std::path::PathBuf;

/// Errors raised while refreshing, building, cleaning or flushing a project.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// An I/O error occurred while accessing a root.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Two or more tasks depend on each other's targets.
    #[error("dependency cycle through target {target}")]
    DependencyCycle {
        /// The target at which the cycle was detected.
        target: String,
    },

    /// `build` was called before `refresh`, or after the project went stale.
    #[error("project must be refreshed before it can be built")]
    NotRefreshed,

    /// A rule could not produce its tasks.
    #[error("rule '{rule}' failed: {reason}")]
    Rule {
        /// Name of the rule.
        rule: String,
        /// What went wrong.
        reason: String,
    },

    /// A task could not be initialised.
    #[error("task for {target} failed: {reason}")]
    Task {
        /// The task's target artifact.
        target: String,
        /// What went wrong.
        reason: String,
    },

    /// The execution service could not be created.
    #[error("execution service error: {reason}")]
    Executor {
        /// Description of the failure.
        reason: String,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a submitted job produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The job was cancelled through its handle.
    #[error("job was cancelled")]
    Cancelled,

    /// A timed wait elapsed first. The job keeps running.
    #[error("timed out waiting for job")]
    Timeout,

    /// The job panicked.
    #[error("job panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The job was dropped by the execution service without running.
    #[error("job was dropped before completing")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = BuildError::io(
            "/tmp/project/bin/a.out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("a.out"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn cycle_display() {
        let err = BuildError::DependencyCycle {
            target: "bin/a.out".to_string(),
        };
        assert_eq!(err.to_string(), "dependency cycle through target bin/a.out");
    }

    #[test]
    fn rule_display() {
        let err = BuildError::Rule {
            rule: "stage".to_string(),
            reason: "unknown content type".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'stage'"));
        assert!(msg.contains("unknown content type"));
    }

    #[test]
    fn job_error_display() {
        assert_eq!(JobError::Timeout.to_string(), "timed out waiting for job");
        let err = JobError::Panicked {
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("boom"));
    }
}
