//! Engine-options properties file (`jvmci.properties`).
//!
//! Plain `key=value` lines where the last definition of a key wins. The file
//! always starts with [`HEADER`].

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::install::{self, FILE_MODE};

/// First line of every properties file this tool writes.
pub const HEADER: &str =
    "# the last definition of a property wins (i.e., it overwrites any earlier definitions)";

/// Property selecting the compiler the engine uses.
pub const COMPILER_KEY: &str = "jvmci.compiler";

/// One line of a properties file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyLine {
    Comment(String),
    Assignment { key: String, value: String },
    Passthrough(String),
}

impl PropertyLine {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.starts_with('!') {
            return PropertyLine::Comment(trimmed.to_string());
        }
        match trimmed.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => PropertyLine::Assignment {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            },
            _ => PropertyLine::Passthrough(trimmed.to_string()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            PropertyLine::Comment(s) | PropertyLine::Passthrough(s) => s.clone(),
            PropertyLine::Assignment { key, value } => format!("{}={}", key, value),
        }
    }

    fn assigns(&self, wanted: &str) -> bool {
        matches!(self, PropertyLine::Assignment { key, .. } if key == wanted)
    }
}

/// Render `existing` with every assignment of `key` replaced by one line per value.
///
/// Non-conflicting lines keep their order; new assignments go at the end.
pub fn rewrite(existing: &str, key: &str, values: &[String]) -> String {
    let mut out = vec![HEADER.to_string()];
    for line in existing.lines() {
        if line.trim() == HEADER {
            continue;
        }
        if PropertyLine::parse(line).assigns(key) {
            continue;
        }
        out.push(line.to_string());
    }
    for value in values {
        out.push(
            PropertyLine::Assignment {
                key: key.to_string(),
                value: value.clone(),
            }
            .render(),
        );
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Set `key` to `values` in the properties file at `path`, creating it if needed.
pub fn set_values(path: &Path, key: &str, values: &[String]) -> Result<()> {
    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    } else {
        String::new()
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!("Setting {} in {}", key, path.display());
    install::write_atomic(path, rewrite(&existing, key, values).as_bytes(), FILE_MODE)
}

/// Last value assigned to `key`, if any.
pub fn lookup(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .map(PropertyLine::parse)
        .filter_map(|l| match l {
            PropertyLine::Assignment { key: k, value } if k == key => Some(value),
            _ => None,
        })
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_last_writer_wins() {
        let out = rewrite("jvmci.compiler=X\n", COMPILER_KEY, &["Y".to_string()]);
        assert_eq!(out, format!("{}\njvmci.compiler=Y\n", HEADER));
    }

    #[test]
    fn test_keeps_unrelated_lines_in_order() {
        let existing = format!("{}\nfoo=1\njvmci.compiler=old\n# note\nbar=2\n", HEADER);
        let out = rewrite(&existing, COMPILER_KEY, &["graal".to_string()]);
        assert_eq!(
            out,
            format!("{}\nfoo=1\n# note\nbar=2\njvmci.compiler=graal\n", HEADER)
        );
    }

    #[test]
    fn test_header_appears_once_and_first() {
        let existing = format!("a=b\n{}\n", HEADER);
        let out = rewrite(&existing, COMPILER_KEY, &[]);
        assert_eq!(out.matches(HEADER).count(), 1);
        assert!(out.starts_with(HEADER));
    }

    #[test]
    fn test_lookup_returns_last_definition() {
        assert_eq!(
            lookup("k=1\nk=2\nother=3\n", "k"),
            Some("2".to_string())
        );
        assert_eq!(lookup("other=3\n", "k"), None);
    }

    #[test]
    fn test_set_values_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jvmci/jvmci.properties");
        set_values(&path, COMPILER_KEY, &["a".into(), "b".into()]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            format!("{}\njvmci.compiler=a\njvmci.compiler=b\n", HEADER)
        );
        assert_eq!(lookup(&content, COMPILER_KEY), Some("b".into()));
    }
}
