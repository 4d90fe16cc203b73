use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SourceError {
    #[error("empty source")]
    Empty,
    #[error("missing scheme in source `{0}`")]
    MissingScheme(String),
    #[error("unsupported source type: {0}")]
    UnsupportedScheme(String),
}

/// Where a dependency comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "google-well-known")]
    WellKnown,
    #[serde(rename = "protodex")]
    Registry,
}

impl SourceType {
    fn from_scheme(scheme: &str) -> Result<Self, SourceError> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(SourceType::Http),
            "github" => Ok(SourceType::GitHub),
            "google-well-known" => Ok(SourceType::WellKnown),
            "protodex" => Ok(SourceType::Registry),
            "file" => Ok(SourceType::Local),
            _ => Err(SourceError::UnsupportedScheme(scheme.to_owned())),
        }
    }

    /// Version used when a reference does not carry an explicit `@version`.
    pub fn default_version(&self) -> &'static str {
        match self {
            SourceType::GitHub => "main",
            SourceType::Registry => "latest",
            SourceType::Local | SourceType::Http | SourceType::WellKnown => "",
        }
    }
}

impl Display for SourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceType::Local => "local",
            SourceType::GitHub => "github",
            SourceType::Http => "http",
            SourceType::WellKnown => "google-well-known",
            SourceType::Registry => "protodex",
        })
    }
}

/// A parsed source reference such as `github://acme/schemas@v1.2.0`.
///
/// The type is derived once, when the descriptor is built, and the fields are
/// only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    source_type: SourceType,
    locator: String,
    version_ref: String,
    raw: String,
}

impl SourceDescriptor {
    pub fn parse(raw: &str) -> Result<SourceDescriptor, SourceError> {
        if raw.is_empty() {
            return Err(SourceError::Empty);
        }

        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(Self::local(path, raw));
        }

        if looks_like_local_path(raw) {
            return Ok(Self::local(raw, raw));
        }

        let (base, version) = match raw.rfind('@') {
            Some(index) => (&raw[..index], Some(&raw[index + 1..])),
            None => (raw, None),
        };

        let (scheme, rest) =
            split_scheme(base).ok_or_else(|| SourceError::MissingScheme(raw.to_owned()))?;
        let source_type = SourceType::from_scheme(scheme)?;

        let version_ref = match version {
            Some(version) if !version.is_empty() => version.to_owned(),
            _ => source_type.default_version().to_owned(),
        };

        Ok(SourceDescriptor {
            source_type,
            locator: host_and_path(rest),
            version_ref,
            raw: raw.to_owned(),
        })
    }

    /// Builds a descriptor from already separated parts, as stored in a
    /// project file. An empty version falls back to the type default.
    pub fn from_parts(source_type: SourceType, locator: &str, version: &str) -> SourceDescriptor {
        let version_ref = if version.is_empty() {
            source_type.default_version()
        } else {
            version
        };
        SourceDescriptor {
            source_type,
            locator: locator.to_owned(),
            version_ref: version_ref.to_owned(),
            raw: locator.to_owned(),
        }
    }

    fn local(path: &str, raw: &str) -> SourceDescriptor {
        SourceDescriptor {
            source_type: SourceType::Local,
            locator: path.to_owned(),
            version_ref: String::new(),
            raw: raw.to_owned(),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn version_ref(&self) -> &str {
        &self.version_ref
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Raw reference without its `@version` suffix.
    pub fn raw_without_version(&self) -> &str {
        self.raw
            .strip_suffix(self.version_ref.as_str())
            .and_then(|s| s.strip_suffix('@'))
            .or_else(|| self.raw.strip_suffix('@'))
            .unwrap_or(&self.raw)
    }
}

impl FromStr for SourceDescriptor {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceDescriptor::parse(s)
    }
}

impl Display for SourceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn looks_like_local_path(input: &str) -> bool {
    input.starts_with("./")
        || input.starts_with("../")
        || input.starts_with('/')
        || (!input.contains("://") && !input.contains('@'))
}

/// Splits `scheme:rest`, rejecting anything that is not a valid URI scheme.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Host followed by path, with query and fragment dropped. Opaque URIs
/// (`scheme:opaque`) have neither.
fn host_and_path(rest: &str) -> String {
    let Some(authority_and_path) = rest.strip_prefix("//") else {
        return String::new();
    };
    let end = authority_and_path
        .find(['?', '#'])
        .unwrap_or(authority_and_path.len());
    authority_and_path[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_github_with_tag() {
        let descriptor = SourceDescriptor::parse("github://acme/schemas@v1.2.0").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::GitHub);
        assert_eq!(descriptor.locator(), "acme/schemas");
        assert_eq!(descriptor.version_ref(), "v1.2.0");
        assert_eq!(descriptor.raw(), "github://acme/schemas@v1.2.0");
    }

    #[test]
    fn parse_github_default_branch() {
        let descriptor = SourceDescriptor::parse("github://acme/schemas").unwrap();
        assert_eq!(descriptor.version_ref(), "main");
    }

    #[test]
    fn parse_github_subdirectory() {
        let descriptor = SourceDescriptor::parse("github://acme/schemas/proto@dev").unwrap();
        assert_eq!(descriptor.locator(), "acme/schemas/proto");
        assert_eq!(descriptor.version_ref(), "dev");
    }

    #[test]
    fn parse_registry_default_version() {
        let descriptor = SourceDescriptor::parse("protodex://svc").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::Registry);
        assert_eq!(descriptor.locator(), "svc");
        assert_eq!(descriptor.version_ref(), "latest");
    }

    #[test]
    fn parse_relative_local_path() {
        let descriptor = SourceDescriptor::parse("./local/dir").unwrap();
        assert_eq!(
            descriptor,
            SourceDescriptor {
                source_type: SourceType::Local,
                locator: "./local/dir".to_owned(),
                version_ref: String::new(),
                raw: "./local/dir".to_owned(),
            }
        );
    }

    #[test]
    fn parse_local_heuristics() {
        for input in ["../up", "/abs/path", "plain-dir", "nested/dir"] {
            let descriptor = SourceDescriptor::parse(input).unwrap();
            assert_eq!(descriptor.source_type(), SourceType::Local, "{input}");
            assert_eq!(descriptor.locator(), input);
        }
    }

    #[test]
    fn parse_file_scheme() {
        let descriptor = SourceDescriptor::parse("file:///tmp/protos").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::Local);
        assert_eq!(descriptor.locator(), "/tmp/protos");
        assert_eq!(descriptor.version_ref(), "");
    }

    #[test]
    fn parse_file_scheme_with_version_is_local() {
        let descriptor = SourceDescriptor::parse("file:///tmp/protos@v1").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::Local);
        assert_eq!(descriptor.locator(), "/tmp/protos@v1");
    }

    #[test]
    fn parse_https_archive() {
        let descriptor =
            SourceDescriptor::parse("https://example.com/schemas/archive.zip").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::Http);
        assert_eq!(descriptor.locator(), "example.com/schemas/archive.zip");
        assert_eq!(descriptor.version_ref(), "");
        assert_eq!(
            descriptor.raw_without_version(),
            "https://example.com/schemas/archive.zip"
        );
    }

    #[test]
    fn parse_rightmost_at_wins() {
        let descriptor = SourceDescriptor::parse("https://host/a@b.zip@v2").unwrap();
        assert_eq!(descriptor.locator(), "host/a@b.zip");
        assert_eq!(descriptor.version_ref(), "v2");
        assert_eq!(descriptor.raw_without_version(), "https://host/a@b.zip");
    }

    #[test]
    fn empty_version_suffix_is_dropped() {
        let descriptor = SourceDescriptor::parse("https://host/x.zip@").unwrap();
        assert_eq!(descriptor.version_ref(), "");
        assert_eq!(descriptor.raw_without_version(), "https://host/x.zip");

        let descriptor = SourceDescriptor::parse("github://acme/schemas@").unwrap();
        assert_eq!(descriptor.version_ref(), "main");
        assert_eq!(descriptor.raw_without_version(), "github://acme/schemas");
    }

    #[test]
    fn parse_scheme_is_case_insensitive() {
        let descriptor = SourceDescriptor::parse("GitHub://acme/schemas").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::GitHub);
    }

    #[test]
    fn parse_well_known() {
        let descriptor = SourceDescriptor::parse("google-well-known://protobuf").unwrap();
        assert_eq!(descriptor.source_type(), SourceType::WellKnown);
        assert_eq!(descriptor.locator(), "protobuf");
        assert_eq!(descriptor.version_ref(), "");
    }

    #[test]
    fn parse_empty() {
        assert_eq!(SourceDescriptor::parse(""), Err(SourceError::Empty));
    }

    #[test]
    fn parse_unsupported_scheme() {
        assert_eq!(
            SourceDescriptor::parse("ftp://x/y"),
            Err(SourceError::UnsupportedScheme("ftp".to_owned()))
        );
    }

    #[test]
    fn parse_missing_scheme() {
        assert!(matches!(
            SourceDescriptor::parse("acme/schemas@v1"),
            Err(SourceError::MissingScheme(_))
        ));
        assert!(matches!(
            SourceDescriptor::parse("git@github.com:acme/schemas"),
            Err(SourceError::MissingScheme(_))
        ));
    }

    #[test]
    fn from_parts_uses_type_default() {
        let descriptor = SourceDescriptor::from_parts(SourceType::GitHub, "acme/schemas", "");
        assert_eq!(descriptor.version_ref(), "main");
        let descriptor = SourceDescriptor::from_parts(SourceType::Registry, "svc", "v3");
        assert_eq!(descriptor.version_ref(), "v3");
    }
}
