use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const PATH_SEPARATOR: char = '.';

/// Dot-addressed procedure identity, e.g. `exercise.list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcedurePath {
    segments: Vec<String>,
}

impl ProcedurePath {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("procedure path must be non-empty");
        }
        let segments: Vec<String> = raw.split(PATH_SEPARATOR).map(str::to_string).collect();
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            anyhow::bail!("invalid procedure path segment {bad:?} in {raw:?}");
        }
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            anyhow::bail!("procedure path must be non-empty");
        }
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            anyhow::bail!("invalid procedure path segment {bad:?}");
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The group part of the path (everything but the last segment).
    pub fn namespace(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn starts_with(&self, prefix: &[String]) -> bool {
        self.segments.starts_with(prefix)
    }
}

pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for ProcedurePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl Serialize for ProcedurePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProcedurePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_namespace_and_name() {
        let path = ProcedurePath::parse("admin.users.list").unwrap();
        assert_eq!(path.namespace(), ["admin".to_string(), "users".to_string()]);
        assert_eq!(path.name(), "list");
        assert_eq!(path.to_string(), "admin.users.list");
        assert!(path.starts_with(&["admin".to_string()]));
    }

    #[test]
    fn rejects_empty_and_malformed_segments() {
        assert!(ProcedurePath::parse("").is_err());
        assert!(ProcedurePath::parse("exercise..list").is_err());
        assert!(ProcedurePath::parse("exercise.list!").is_err());
        assert!(ProcedurePath::parse("exercise.by-id").is_ok());
    }
}
