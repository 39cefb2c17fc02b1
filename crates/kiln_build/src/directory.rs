//! A root backed by a directory on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use crate::artifact::{Artifact, ContentRegistry};
use crate::error::BuildError;
use crate::filter::Filter;
use crate::root::{not_found, Entry, Root};

#[derive(Debug, Default)]
struct State {
    /// Every known artifact with its modification time.
    index: BTreeMap<Artifact, SystemTime>,
    /// Written but not yet flushed.
    dirty: BTreeMap<Artifact, Vec<u8>>,
}

/// Artifacts stored as files under a directory.
///
/// Files whose suffix is not in the [`ContentRegistry`] are ignored. Writes
/// are held in memory and visible to reads immediately, but only reach the
/// disk on [`Root::flush`].
#[derive(Debug)]
pub struct DirectoryRoot {
    dir: PathBuf,
    registry: ContentRegistry,
    state: RwLock<State>,
}

impl DirectoryRoot {
    /// Opens `dir` and indexes the files in it.
    pub fn open(dir: impl Into<PathBuf>, registry: ContentRegistry) -> Result<Self, BuildError> {
        let root = Self {
            dir: dir.into(),
            registry,
            state: RwLock::new(State::default()),
        };
        root.refresh()?;
        Ok(root)
    }

    /// Returns the directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the on-disk path of `artifact`.
    pub fn path_of(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(artifact.relative_path())
    }

    fn scan(&self) -> Result<BTreeMap<Artifact, SystemTime>, BuildError> {
        let mut index = BTreeMap::new();
        if !self.dir.exists() {
            return Ok(index);
        }
        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(self.dir.as_path()).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            let Some(artifact) = self.registry.classify(relative) else {
                continue;
            };
            let modified = entry
                .metadata()
                .map_err(|e| BuildError::io(entry.path(), e.into()))?
                .modified()
                .map_err(|e| BuildError::io(entry.path(), e))?;
            index.insert(artifact, modified);
        }
        Ok(index)
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Root for DirectoryRoot {
    fn entries(&self, filter: &Filter) -> Result<Vec<Entry>, BuildError> {
        Ok(self
            .state()
            .index
            .iter()
            .filter(|(artifact, _)| filter.matches(artifact))
            .map(|(artifact, modified)| Entry {
                artifact: artifact.clone(),
                last_modified: *modified,
            })
            .collect())
    }

    fn entry(&self, artifact: &Artifact) -> Result<Option<Entry>, BuildError> {
        Ok(self.state().index.get(artifact).map(|modified| Entry {
            artifact: artifact.clone(),
            last_modified: *modified,
        }))
    }

    fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, BuildError> {
        {
            let state = self.state();
            if let Some(contents) = state.dirty.get(artifact) {
                return Ok(contents.clone());
            }
            if !state.index.contains_key(artifact) {
                return Err(not_found(artifact));
            }
        }
        let path = self.path_of(artifact);
        fs::read(&path).map_err(|e| BuildError::io(path, e))
    }

    fn write(&self, artifact: &Artifact, contents: Vec<u8>) -> Result<(), BuildError> {
        let mut state = self.state_mut();
        state.index.insert(artifact.clone(), SystemTime::now());
        state.dirty.insert(artifact.clone(), contents);
        Ok(())
    }

    fn remove(&self, artifact: &Artifact) -> Result<bool, BuildError> {
        let mut state = self.state_mut();
        let path = self.path_of(artifact);
        // The index only forgets the artifact once the file is really gone.
        let on_disk = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(BuildError::io(path, e)),
        };
        let was_dirty = state.dirty.remove(artifact).is_some();
        let was_indexed = state.index.remove(artifact).is_some();
        Ok(on_disk || was_dirty || was_indexed)
    }

    fn refresh(&self) -> Result<(), BuildError> {
        let mut index = self.scan()?;
        let mut state = self.state_mut();
        for artifact in state.dirty.keys() {
            if let Some(modified) = state.index.get(artifact) {
                index.insert(artifact.clone(), *modified);
            }
        }
        debug!(dir = %self.dir.display(), entries = index.len(), "indexed directory");
        state.index = index;
        Ok(())
    }

    fn flush(&self) -> Result<(), BuildError> {
        let mut state = self.state_mut();
        let mut written = 0;
        while let Some((artifact, contents)) = state.dirty.pop_first() {
            match write_file(&self.path_of(&artifact), &contents) {
                Ok(modified) => {
                    state.index.insert(artifact, modified);
                    written += 1;
                }
                Err(e) => {
                    state.dirty.insert(artifact, contents);
                    return Err(e);
                }
            }
        }
        debug!(dir = %self.dir.display(), written, "flushed directory");
        Ok(())
    }
}

/// Writes `contents` to `path`, creating parent directories, and returns the
/// file's new modification time.
fn write_file(path: &Path, contents: &[u8]) -> Result<SystemTime, BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))?;
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| BuildError::io(path, e))
}
