//! Rules turn the current contents of a root into build tasks.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::artifact::{Artifact, ArtifactId, ContentType};
use crate::error::BuildError;
use crate::filter::Filter;
use crate::meter::Meter;
use crate::root::Root;
use crate::task::{Task, TaskInstance};

/// Produces tasks from the state of a root.
pub trait Rule: Send + Sync {
    /// Returns the rule's name, used in logs and errors.
    fn name(&self) -> &str;

    /// Appends zero or more tasks to `tasks`.
    fn apply(&self, root: &Arc<dyn Root>, tasks: &mut Vec<Box<dyn Task>>) -> Result<(), BuildError>;
}

/// Converts the contents of one artifact into another.
pub trait Transform: Send + Sync {
    /// Short name reported to the meter.
    fn name(&self) -> &str;

    /// Produces target contents from source contents.
    fn transform(&self, source: &Artifact, contents: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Copies the source contents unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn name(&self) -> &str {
        "copy"
    }

    fn transform(&self, _source: &Artifact, contents: Vec<u8>) -> Result<Vec<u8>, String> {
        Ok(contents)
    }
}

/// Maps every source matching a filter to a target under another prefix.
///
/// `src/**` with target dir `bin` maps `src/a/b.txt` to `bin/a/b.<target type>`.
/// In incremental mode a source is skipped when its target exists and is no
/// older than the source.
pub struct TransformRule {
    name: String,
    filter: Filter,
    target_dir: ArtifactId,
    target_type: ContentType,
    transform: Arc<dyn Transform>,
    incremental: bool,
}

impl TransformRule {
    /// Creates a rule. `filter` should carry the source content type.
    pub fn new(
        name: impl Into<String>,
        filter: Filter,
        target_dir: ArtifactId,
        target_type: ContentType,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            name: name.into(),
            filter,
            target_dir,
            target_type,
            transform,
            incremental: false,
        }
    }

    /// Enables or disables skipping of up-to-date targets.
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Returns the target artifact for `source`.
    pub fn target_for(&self, source: &Artifact) -> Artifact {
        Artifact::new(
            source.id().relocate(&self.filter.prefix(), &self.target_dir),
            self.target_type.clone(),
        )
    }
}

impl Rule for TransformRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, root: &Arc<dyn Root>, tasks: &mut Vec<Box<dyn Task>>) -> Result<(), BuildError> {
        let mut skipped = 0;
        let before = tasks.len();
        for source in root.entries(&self.filter)? {
            let target = self.target_for(&source.artifact);
            if target == source.artifact {
                return Err(BuildError::Rule {
                    rule: self.name.clone(),
                    reason: format!("{target} would overwrite its own source"),
                });
            }
            if self.incremental {
                if let Some(existing) = root.entry(&target)? {
                    if existing.last_modified >= source.last_modified {
                        skipped += 1;
                        continue;
                    }
                }
            }
            tasks.push(Box::new(TransformTask {
                root: root.clone(),
                sources: vec![source.artifact],
                target,
                transform: self.transform.clone(),
            }));
        }
        debug!(
            rule = %self.name,
            tasks = tasks.len() - before,
            skipped,
            "applied rule"
        );
        Ok(())
    }
}

/// Reads one source, transforms it and writes the target.
pub struct TransformTask {
    root: Arc<dyn Root>,
    sources: Vec<Artifact>,
    target: Artifact,
    transform: Arc<dyn Transform>,
}

impl Task for TransformTask {
    fn sources(&self) -> &[Artifact] {
        &self.sources
    }

    fn target(&self) -> &Artifact {
        &self.target
    }

    fn initialise(&self) -> Result<TaskInstance, BuildError> {
        let root = self.root.clone();
        let source = self.sources.first().cloned().ok_or_else(|| BuildError::Task {
            target: self.target.to_string(),
            reason: "no source artifact".to_string(),
        })?;
        let target = self.target.clone();
        let transform = self.transform.clone();
        Ok(Arc::new(move |meter: &dyn Meter| {
            let result = root
                .read(&source)
                .map_err(|e| e.to_string())
                .and_then(|contents| transform.transform(&source, contents))
                .and_then(|output| root.write(&target, output).map_err(|e| e.to_string()));
            match result {
                Ok(()) => {
                    meter.step(transform.name(), 1);
                    true
                }
                Err(reason) => {
                    warn!(source = %source, target = %target, %reason, "transform failed");
                    false
                }
            }
        }))
    }
}
