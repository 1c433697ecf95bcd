//! Release-metadata file (`release`) inside an image.
//!
//! Only the `SOURCE="component:version ..."` line is rewritten; everything
//! else passes through unchanged.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::install::{self, FILE_MODE};

/// Component dropped from the source list: the bootstrap's own engine sources.
pub const BOOTSTRAP_COMPONENT: &str = "hotspot";

/// Component recording this suite's revision.
pub const SUITE_COMPONENT: &str = "jvmci";

/// Characters of the revision kept in the source list.
pub const REVISION_LENGTH: usize = 12;

const SOURCE_PREFIX: &str = "SOURCE=\"";

/// Parsed `component:version` tokens in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceList {
    pub components: Vec<(String, String)>,
}

impl SourceList {
    /// Parse the quoted body of a `SOURCE` line.
    pub fn parse(body: &str) -> Result<Self> {
        let mut components = Vec::new();
        for token in body.split(' ').filter(|t| !t.is_empty()) {
            let Some((name, version)) = token.split_once(':') else {
                bail!("malformed source component '{}'", token);
            };
            components.push((name.to_string(), version.to_string()));
        }
        Ok(Self { components })
    }

    /// Set `name` to `version`, keeping its position if it already exists.
    pub fn upsert(&mut self, name: &str, version: &str) {
        match self.components.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = version.to_string(),
            None => self
                .components
                .push((name.to_string(), version.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.components.retain(|(n, _)| n != name);
    }

    pub fn render(&self) -> String {
        let body = self
            .components
            .iter()
            .map(|(n, v)| format!("{}:{}", n, v))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}\"", SOURCE_PREFIX, body)
    }
}

/// Rewrite the `SOURCE` line of `content` for this suite's `revision`.
///
/// A `SOURCE` line that cannot be parsed is kept as it was and reported.
pub fn patch(content: &str, revision: Option<&str>) -> String {
    let version = revision
        .map(|r| r.chars().take(REVISION_LENGTH).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let mut out = String::with_capacity(content.len() + 32);
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        let body = trimmed
            .strip_prefix(SOURCE_PREFIX)
            .and_then(|rest| rest.strip_suffix('"'));
        match body.map(SourceList::parse) {
            Some(Ok(mut sources)) => {
                sources.upsert(SUITE_COMPONENT, &version);
                sources.remove(BOOTSTRAP_COMPONENT);
                out.push_str(&sources.render());
                out.push_str(line_terminator(line));
            }
            Some(Err(e)) => {
                warn!("Exception while updating release file: {}", e);
                out.push_str(line);
            }
            None => out.push_str(line),
        }
    }
    out
}

/// The `\r\n`, `\n` or empty terminator ending `line`.
fn line_terminator(line: &str) -> &str {
    let body = line.trim_end_matches(['\r', '\n']);
    &line[body.len()..]
}

/// Patch the release file at `path` in place, if it exists.
pub fn patch_file(path: &Path, revision: Option<&str>) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let patched = patch(&content, revision);
    if patched != content {
        debug!("Updating {}", path.display());
        install::write_atomic(path, patched.as_bytes(), FILE_MODE)?;
    }
    Ok(())
}

/// Value of a `KEY="value"` line, e.g. `JAVA_VERSION`.
pub fn read_value(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k == key).then(|| v.trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_patch_replaces_bootstrap_component() {
        let content = "JAVA_VERSION=\"1.8.0_60\"\n\
                       SOURCE=\" .:1e9ac8d2d1e3 corba:3f2e1d hotspot:aa11bb22cc33 jdk:7d8e9f\"\n\
                       OTHER=\"x\"\n";
        let out = patch(content, Some("0123456789abcdef"));
        assert_eq!(
            out,
            "JAVA_VERSION=\"1.8.0_60\"\n\
             SOURCE=\" .:1e9ac8d2d1e3 corba:3f2e1d jdk:7d8e9f jvmci:0123456789ab\"\n\
             OTHER=\"x\"\n"
        );
    }

    #[test]
    fn test_patch_is_stable_on_rerun() {
        let content = "SOURCE=\" jdk:1 hotspot:2\"\n";
        let once = patch(content, Some("abc"));
        assert_eq!(patch(&once, Some("abc")), once);
        assert_eq!(once, "SOURCE=\" jdk:1 jvmci:abc\"\n");
    }

    #[test]
    fn test_patch_without_revision_records_unknown() {
        assert_eq!(patch("SOURCE=\"jdk:1\"", None), "SOURCE=\" jdk:1 jvmci:unknown\"");
    }

    #[test]
    fn test_patch_keeps_crlf_line_endings() {
        let content = "JAVA_VERSION=\"1.8.0_60\"\r\nSOURCE=\"jdk:1 hotspot:2\"\r\nOS_NAME=\"Windows\"\r\n";
        assert_eq!(
            patch(content, Some("abc")),
            "JAVA_VERSION=\"1.8.0_60\"\r\nSOURCE=\" jdk:1 jvmci:abc\"\r\nOS_NAME=\"Windows\"\r\n"
        );
    }

    #[test]
    fn test_unparsable_source_line_is_preserved() {
        let content = "SOURCE=\"broken jdk:1\"\nX=1\n";
        assert_eq!(patch(content, Some("abc")), content);
    }

    #[test]
    fn test_read_value() {
        let content = "JAVA_VERSION=\"1.8.0_60\"\nOS_NAME=\"Linux\"\n";
        assert_eq!(read_value(content, "JAVA_VERSION"), Some("1.8.0_60".into()));
        assert_eq!(read_value(content, "MISSING"), None);
    }

    #[test]
    fn test_patch_file_missing_is_noop() {
        let dir = tempdir().unwrap();
        patch_file(&dir.path().join("release"), Some("abc")).unwrap();
        assert!(!dir.path().join("release").exists());
    }
}
