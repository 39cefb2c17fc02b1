//! Artifact identities and content types.
//!
//! An [`Artifact`] is what tasks read and write: a slash-separated
//! [`ArtifactId`] plus the [`ContentType`] that determines its file suffix.
//! Two artifacts are the same dependency iff both parts compare equal.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A normalized, slash-separated artifact path without a suffix, e.g. `src/util/io`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Creates an identifier, dropping empty and `.` segments so `/a//./b/`
    /// becomes `a/b`. A `..` segment removes the one before it and never
    /// climbs above the root: `../x` is `x`.
    pub fn new(id: &str) -> Self {
        let mut segments = Vec::new();
        for segment in id.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
        Self(segments.join("/"))
    }

    /// The root identifier (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the root identifier.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Appends `other`'s segments to this identifier.
    pub fn join(&self, other: &ArtifactId) -> Self {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}/{}", self.0, other.0)),
        }
    }

    /// Removes a leading `prefix` (whole segments only).
    pub fn strip_prefix(&self, prefix: &ArtifactId) -> Option<Self> {
        if prefix.is_root() {
            return Some(self.clone());
        }
        if self.0 == prefix.0 {
            return Some(Self::root());
        }
        self.0
            .strip_prefix(&prefix.0)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| Self(rest.to_string()))
    }

    /// Moves this identifier from under `from` to under `to`. Identifiers not
    /// under `from` are placed under `to` unchanged.
    pub fn relocate(&self, from: &ArtifactId, to: &ArtifactId) -> Self {
        let rest = self.strip_prefix(from).unwrap_or_else(|| self.clone());
        to.join(&rest)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kind of artifact content, identified by its file suffix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentType {
    name: String,
    suffix: String,
}

impl ContentType {
    /// Creates a content type.
    pub fn new(name: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
        }
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file suffix, without the dot.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An identifier paired with its content type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Artifact {
    id: ArtifactId,
    content_type: ContentType,
}

impl Artifact {
    /// Creates an artifact.
    pub fn new(id: ArtifactId, content_type: ContentType) -> Self {
        Self { id, content_type }
    }

    /// Returns the identifier.
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// Returns the content type.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Returns the relative file path, e.g. `src/util/io.txt`.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.to_string())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.content_type.suffix)
    }
}

/// The content types known to a project, keyed by suffix.
///
/// Built once at startup and passed to whatever needs to classify files.
#[derive(Clone, Debug, Default)]
pub struct ContentRegistry {
    by_suffix: BTreeMap<String, ContentType>,
}

impl ContentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a content type, replacing any type with the same suffix.
    pub fn register(&mut self, content_type: ContentType) {
        self.by_suffix
            .insert(content_type.suffix().to_string(), content_type);
    }

    /// Looks up a content type by suffix.
    pub fn get(&self, suffix: &str) -> Option<&ContentType> {
        self.by_suffix.get(suffix)
    }

    /// Iterates over registered types in suffix order.
    pub fn iter(&self) -> impl Iterator<Item = &ContentType> {
        self.by_suffix.values()
    }

    /// Classifies a relative file path. Returns `None` for paths with no
    /// registered suffix or with components other than plain names.
    pub fn classify(&self, path: &Path) -> Option<Artifact> {
        let suffix = path.extension()?.to_str()?;
        let content_type = self.get(suffix)?;
        let stem = path.with_extension("");
        let mut segments = Vec::new();
        for component in stem.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_str()?),
                _ => return None,
            }
        }
        Some(Artifact::new(
            ArtifactId::new(&segments.join("/")),
            content_type.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt() -> ContentType {
        ContentType::new("Text", "txt")
    }

    #[test]
    fn id_normalization() {
        assert_eq!(ArtifactId::new("/a//b/").as_str(), "a/b");
        assert!(ArtifactId::new("///").is_root());
        assert_eq!(ArtifactId::new("a/b/c").segments().count(), 3);
        assert_eq!(ArtifactId::new("a/./b/../c").as_str(), "a/c");
        assert_eq!(ArtifactId::new("../../x").as_str(), "x");
    }

    #[test]
    fn strip_prefix_whole_segments() {
        let id = ArtifactId::new("src/util/io");
        assert_eq!(
            id.strip_prefix(&ArtifactId::new("src")),
            Some(ArtifactId::new("util/io"))
        );
        assert_eq!(id.strip_prefix(&ArtifactId::new("sr")), None);
        assert_eq!(id.strip_prefix(&id), Some(ArtifactId::root()));
    }

    #[test]
    fn relocate_under_new_prefix() {
        let id = ArtifactId::new("src/util/io");
        let moved = id.relocate(&ArtifactId::new("src"), &ArtifactId::new("bin"));
        assert_eq!(moved.as_str(), "bin/util/io");
        let root_move = id.relocate(&ArtifactId::root(), &ArtifactId::new("out"));
        assert_eq!(root_move.as_str(), "out/src/util/io");
    }

    #[test]
    fn artifact_display_and_path() {
        let a = Artifact::new(ArtifactId::new("src/main"), txt());
        assert_eq!(a.to_string(), "src/main.txt");
        assert_eq!(a.relative_path(), PathBuf::from("src/main.txt"));
    }

    #[test]
    fn equality_needs_matching_type() {
        let id = ArtifactId::new("a");
        let a = Artifact::new(id.clone(), txt());
        let b = Artifact::new(id, ContentType::new("Binary", "bin"));
        assert_ne!(a, b);
    }

    #[test]
    fn classify_known_suffix() {
        let mut reg = ContentRegistry::new();
        reg.register(txt());
        let a = reg.classify(Path::new("src/util/io.txt")).unwrap();
        assert_eq!(a.id().as_str(), "src/util/io");
        assert_eq!(a.content_type(), &txt());
        assert!(reg.classify(Path::new("src/io.rs")).is_none());
        assert!(reg.classify(Path::new("README")).is_none());
        assert!(reg.classify(Path::new("../x.txt")).is_none());
    }
}
