use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Characters that may not appear in a path segment, matching the key rules
/// of the managed tree stores this crate models.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// A slash-separated location in the tree, e.g. `chats/-OaK3/participants`.
///
/// The empty path is the tree root. Segments are non-empty and free of
/// forbidden characters; consecutive or trailing slashes are rejected so a
/// path has exactly one spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn parse(raw: &str) -> StoreResult<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            check_segment(segment, raw)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Append a single child segment.
    pub fn child(&self, segment: &str) -> StoreResult<Self> {
        check_segment(segment, segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Append a relative path, which may span several segments. This is how
    /// multi-path update keys like `participants/abc` resolve.
    pub fn join(&self, relative: &str) -> StoreResult<Self> {
        let tail = Self::parse(relative)?;
        if tail.is_root() {
            return Err(StoreError::InvalidPath(format!(
                "empty relative path {relative:?}"
            )));
        }
        let mut segments = self.segments.clone();
        segments.extend(tail.segments);
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` is `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn check_segment(segment: &str, raw: &str) -> StoreResult<()> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath(format!(
            "empty segment in {raw:?}"
        )));
    }
    if segment
        .chars()
        .any(|c| FORBIDDEN.contains(&c) || c.is_control())
    {
        return Err(StoreError::InvalidPath(format!(
            "forbidden character in segment {segment:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = TreePath::parse("chats/abc/messages").unwrap();
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.to_string(), "chats/abc/messages");

        // Leading and trailing slashes are tolerated, not preserved.
        let padded = TreePath::parse("/chats/abc/").unwrap();
        assert_eq!(padded, TreePath::parse("chats/abc").unwrap());
    }

    #[test]
    fn test_root() {
        assert!(TreePath::parse("").unwrap().is_root());
        assert!(TreePath::parse("/").unwrap().is_root());
        assert_eq!(TreePath::root().to_string(), "");
    }

    #[test]
    fn test_rejects_bad_segments() {
        assert!(TreePath::parse("chats//abc").is_err());
        assert!(TreePath::parse("cha.ts").is_err());
        assert!(TreePath::parse("a/b#c").is_err());
        assert!(TreePath::root().child("").is_err());
        assert!(TreePath::root().child("x$y").is_err());
        // A single segment cannot smuggle in a separator.
        assert!(TreePath::root().child("a/b").is_err());
    }

    #[test]
    fn test_join_and_prefix() {
        let chat = TreePath::parse("chats/abc").unwrap();
        let member = chat.join("participants/u1").unwrap();
        assert_eq!(member.to_string(), "chats/abc/participants/u1");
        assert!(member.starts_with(&chat));
        assert!(!chat.starts_with(&member));
        assert!(chat.starts_with(&TreePath::root()));
        assert!(chat.join("").is_err());
    }
}
