//! Artifact stores that rules read from and tasks write to.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use crate::artifact::Artifact;
use crate::error::BuildError;
use crate::filter::Filter;

/// An artifact present in a root, with its modification time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// The artifact.
    pub artifact: Artifact,
    /// When the artifact was last written.
    pub last_modified: SystemTime,
}

/// A location holding artifacts, such as a project directory.
///
/// Writes may be buffered until [`Root::flush`]. [`Root::refresh`] picks up
/// outside changes but keeps buffered writes. A root is not synchronized
/// against concurrent mutation from outside a build; callers keep a single
/// writer while a build is in flight.
pub trait Root: Send + Sync {
    /// Returns every entry matching `filter`, ordered by artifact.
    fn entries(&self, filter: &Filter) -> Result<Vec<Entry>, BuildError>;

    /// Returns the entry for `artifact`, if present.
    fn entry(&self, artifact: &Artifact) -> Result<Option<Entry>, BuildError>;

    /// Reads an artifact's contents.
    fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, BuildError>;

    /// Creates or replaces an artifact.
    fn write(&self, artifact: &Artifact, contents: Vec<u8>) -> Result<(), BuildError>;

    /// Removes an artifact. Returns `false` if it did not exist.
    fn remove(&self, artifact: &Artifact) -> Result<bool, BuildError>;

    /// Re-reads persistent state, keeping unflushed writes.
    fn refresh(&self) -> Result<(), BuildError>;

    /// Persists buffered writes.
    fn flush(&self) -> Result<(), BuildError>;
}

pub(crate) fn not_found(artifact: &Artifact) -> BuildError {
    BuildError::io(
        artifact.relative_path(),
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact"),
    )
}

/// A root held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRoot {
    entries: RwLock<BTreeMap<Artifact, (Vec<u8>, SystemTime)>>,
}

impl MemoryRoot {
    /// Creates an empty root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an artifact, stamped with the current time.
    pub fn insert(&self, artifact: Artifact, contents: impl Into<Vec<u8>>) {
        self.insert_with_modified(artifact, contents, SystemTime::now());
    }

    /// Adds or replaces an artifact with an explicit modification time.
    pub fn insert_with_modified(
        &self,
        artifact: Artifact,
        contents: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact, (contents.into(), modified));
    }

    /// Returns the number of artifacts.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the root holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Root for MemoryRoot {
    fn entries(&self, filter: &Filter) -> Result<Vec<Entry>, BuildError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|(artifact, _)| filter.matches(artifact))
            .map(|(artifact, (_, modified))| Entry {
                artifact: artifact.clone(),
                last_modified: *modified,
            })
            .collect())
    }

    fn entry(&self, artifact: &Artifact) -> Result<Option<Entry>, BuildError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(artifact).map(|(_, modified)| Entry {
            artifact: artifact.clone(),
            last_modified: *modified,
        }))
    }

    fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, BuildError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(artifact)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| not_found(artifact))
    }

    fn write(&self, artifact: &Artifact, contents: Vec<u8>) -> Result<(), BuildError> {
        self.insert(artifact.clone(), contents);
        Ok(())
    }

    fn remove(&self, artifact: &Artifact) -> Result<bool, BuildError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(artifact)
            .is_some())
    }

    fn refresh(&self) -> Result<(), BuildError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), BuildError> {
        Ok(())
    }
}
