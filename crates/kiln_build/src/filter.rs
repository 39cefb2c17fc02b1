//! Path filters for selecting artifacts from a root.

use std::fmt;

use crate::artifact::{Artifact, ArtifactId, ContentType};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    One,
    /// `**`: zero or more segments.
    Any,
}

/// Matches artifact identifiers segment by segment, optionally restricted to
/// a single content type.
///
/// `src/*/main` matches `src/app/main`; `src/**` matches everything under
/// `src`, including `src` itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    segments: Vec<Segment>,
    content_type: Option<ContentType>,
}

impl Filter {
    /// Parses a slash-separated pattern.
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "*" => Segment::One,
                "**" => Segment::Any,
                _ => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            segments,
            content_type: None,
        }
    }

    /// A filter matching every artifact.
    pub fn all() -> Self {
        Self::new("**")
    }

    /// Restricts the filter to one content type.
    pub fn with_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Returns the content type restriction, if any.
    pub fn content_type(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    /// Returns the leading literal segments, e.g. `src/lib` for `src/lib/**`.
    pub fn prefix(&self) -> ArtifactId {
        let literals: Vec<&str> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(l) => Some(l.as_str()),
                _ => None,
            })
            .collect();
        ArtifactId::new(&literals.join("/"))
    }

    /// Returns `true` if `id` matches the pattern, ignoring content type.
    pub fn matches_id(&self, id: &ArtifactId) -> bool {
        let parts: Vec<&str> = id.segments().collect();
        match_segments(&self.segments, &parts)
    }

    /// Returns `true` if `artifact` matches the pattern and content type.
    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.content_type
            .as_ref()
            .map_or(true, |ct| ct == artifact.content_type())
            && self.matches_id(artifact.id())
    }
}

fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
    match (pattern.split_first(), parts.split_first()) {
        (None, None) => true,
        (Some((Segment::Any, rest)), _) => {
            match_segments(rest, parts) || (!parts.is_empty() && match_segments(pattern, &parts[1..]))
        }
        (Some((Segment::One, rest)), Some((_, tail))) => match_segments(rest, tail),
        (Some((Segment::Literal(l), rest)), Some((p, tail))) => l == p && match_segments(rest, tail),
        _ => false,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.as_str(),
                Segment::One => "*",
                Segment::Any => "**",
            })
            .collect();
        f.write_str(&rendered.join("/"))?;
        if let Some(ct) = &self.content_type {
            write!(f, ".{}", ct.suffix())?;
        }
        Ok(())
    }
}
