// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Handles repo, repo:tag, registry:port/repo:tag and @digest forms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0:?}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// A parsed image reference such as `ghcr.io/org/app:v2`.
///
/// References without tag or digest default to the `latest` tag, matching the
/// container runtimes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@'))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) if !after.is_empty() => (before, Some(after.to_string())),
            Some(_) => return Err(ParseImageRefError::InvalidFormat(input.to_string())),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; one before it is a
        // registry port.
        let (repository, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => {
                if after.is_empty() {
                    return Err(ParseImageRefError::InvalidFormat(input.to_string()));
                }
                (before, Some(after.to_string()))
            }
            _ => (without_digest, None),
        };

        let (registry, name) = split_registry(repository)?;

        let tag = match (tag, &digest) {
            (None, None) => Some("latest".to_string()),
            (tag, _) => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The reference without tag or digest, e.g. `ghcr.io/org/app`.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    /// Same repository with a different tag (digest dropped).
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    /// Whether both references point into the same repository.
    pub fn same_repository(&self, other: &ImageRef) -> bool {
        self.registry == other.registry && self.name == other.name
    }
}

fn split_registry(input: &str) -> Result<(Option<String>, String), ParseImageRefError> {
    if input.is_empty() || input.starts_with('/') || input.ends_with('/') {
        return Err(ParseImageRefError::InvalidFormat(input.to_string()));
    }

    match input.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            Ok((Some(first.to_string()), rest.to_string()))
        }
        _ => Ok((None, input.to_string())),
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_defaults_to_latest() {
        let image = ImageRef::parse("nginx").unwrap();
        assert_eq!(image.name(), "nginx");
        assert_eq!(image.tag(), Some("latest"));
        assert_eq!(image.to_string(), "nginx:latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let image = ImageRef::parse("localhost:5000/team/app").unwrap();
        assert_eq!(image.registry(), Some("localhost:5000"));
        assert_eq!(image.name(), "team/app");
        assert_eq!(image.tag(), Some("latest"));
    }

    #[test]
    fn digest_without_tag_keeps_no_tag() {
        let image = ImageRef::parse("ghcr.io/org/app@sha256:abc").unwrap();
        assert_eq!(image.tag(), None);
        assert_eq!(image.digest(), Some("sha256:abc"));
    }

    #[test]
    fn with_tag_replaces_tag_and_drops_digest() {
        let image = ImageRef::parse("ghcr.io/org/app:v1@sha256:abc").unwrap();
        let retagged = image.with_tag("v2");
        assert_eq!(retagged.to_string(), "ghcr.io/org/app:v2");
        assert!(retagged.same_repository(&image));
    }

    #[test]
    fn rejects_whitespace_inside() {
        assert_eq!(
            ImageRef::parse("my app"),
            Err(ParseImageRefError::InvalidChar(' '))
        );
    }

    #[test]
    fn rejects_empty_tag() {
        assert!(matches!(
            ImageRef::parse("app:"),
            Err(ParseImageRefError::InvalidFormat(_))
        ));
    }
}
