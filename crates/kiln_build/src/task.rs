//! Build tasks: one target artifact produced from declared sources.

use std::fmt;
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::error::BuildError;
use crate::meter::Meter;

/// A prepared unit of work. Returns `true` on success.
pub type TaskInstance = Arc<dyn Fn(&dyn Meter) -> bool + Send + Sync>;

/// A unit of build work with declared sources and a single target.
///
/// A task depends on another task exactly when one of its sources equals the
/// other's target.
pub trait Task: Send + Sync {
    /// The artifacts this task reads.
    fn sources(&self) -> &[Artifact];

    /// The artifact this task produces.
    fn target(&self) -> &Artifact;

    /// Prepares the work to run. Called once per refresh.
    fn initialise(&self) -> Result<TaskInstance, BuildError>;
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("sources", &self.sources())
            .field("target", &self.target())
            .finish()
    }
}

/// A task whose work is a closure.
pub struct FnTask {
    sources: Vec<Artifact>,
    target: Artifact,
    body: TaskInstance,
}

impl FnTask {
    /// Creates a task that runs `body`.
    pub fn new(
        sources: Vec<Artifact>,
        target: Artifact,
        body: impl Fn(&dyn Meter) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            sources,
            target,
            body: Arc::new(body),
        }
    }
}

impl Task for FnTask {
    fn sources(&self) -> &[Artifact] {
        &self.sources
    }

    fn target(&self) -> &Artifact {
        &self.target
    }

    fn initialise(&self) -> Result<TaskInstance, BuildError> {
        Ok(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactId, ContentType};
    use crate::meter::NullMeter;

    #[test]
    fn fn_task_runs_body() {
        let target = Artifact::new(ArtifactId::new("out"), ContentType::new("Output", "out"));
        let task = FnTask::new(vec![], target.clone(), |_| true);
        assert_eq!(task.target(), &target);
        assert!(task.sources().is_empty());
        let instance = task.initialise().unwrap();
        assert!(instance(&NullMeter));
    }
}
