//! Rule-driven builds over a store of artifacts.
//!
//! A [`BuildProject`] applies its [`Rule`]s to a [`Root`] to obtain [`Task`]s,
//! orders them so that every task follows the tasks producing its sources,
//! and runs them one at a time on an [`ExecutionService`].

#![warn(missing_docs)]

pub mod artifact;
pub mod directory;
pub mod error;
pub mod executor;
pub mod filter;
pub mod graph;
pub mod handle;
pub mod meter;
pub mod project;
pub mod root;
pub mod rule;
pub mod task;

pub use artifact::{Artifact, ArtifactId, ContentRegistry, ContentType};
pub use directory::DirectoryRoot;
pub use error::{BuildError, JobError};
pub use executor::{submit, CancelToken, ExecutionService, Job, JobHandle, ThreadPoolService};
pub use filter::Filter;
pub use graph::DependencyGraph;
pub use handle::{BuildHandle, BuildState};
pub use meter::{Meter, NullMeter, TracingMeter};
pub use project::{BuildProject, CleanReport, Package};
pub use root::{Entry, MemoryRoot, Root};
pub use rule::{CopyTransform, Rule, Transform, TransformRule, TransformTask};
pub use task::{FnTask, Task, TaskInstance};
