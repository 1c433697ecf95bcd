//! Engine registry file (`jvm.cfg`).
//!
//! The registry lists which engines an image knows about:
//!
//! ```text
//! # comment
//! -jvmci KNOWN
//! -graal ALIASED_TO -jvmci
//! -server KNOWN
//! ```
//!
//! Files are parsed into [`RegistryLine`]s that keep their original text, so
//! lines this module does not understand are written back byte for byte.
//! Rewrites go through [`crate::install::write_atomic`].

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ImageError;
use crate::install::{self, FILE_MODE};
use crate::vm::ORIGINAL_ENGINE;

/// Lines starting with this marker are comments.
pub const COMMENT_MARKER: char = '#';

const KNOWN: &str = "KNOWN";
const ALIASED_TO: &str = "ALIASED_TO";

/// What a registry line says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `-<engine> KNOWN`
    Known { engine: String },
    /// `-<alias> ALIASED_TO -<target>`
    AliasedTo { alias: String, target: String },
    /// `-<engine> <anything else>`, e.g. `-hotspot ERROR`.
    Other { engine: String },
}

impl Directive {
    /// Engine name the line is about.
    pub fn engine(&self) -> &str {
        match self {
            Directive::Known { engine } | Directive::Other { engine } => engine,
            Directive::AliasedTo { alias, .. } => alias,
        }
    }
}

/// One line of a registry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLine {
    Comment(String),
    Directive { directive: Directive, raw: String },
    Passthrough(String),
}

impl RegistryLine {
    pub fn parse(line: &str) -> Self {
        if line.starts_with(COMMENT_MARKER) {
            return RegistryLine::Comment(line.to_string());
        }
        match parse_directive(line) {
            Some(directive) => RegistryLine::Directive {
                directive,
                raw: line.to_string(),
            },
            None => RegistryLine::Passthrough(line.to_string()),
        }
    }

    pub fn known(engine: &str) -> Self {
        RegistryLine::Directive {
            directive: Directive::Known {
                engine: engine.to_string(),
            },
            raw: format!("-{} {}", engine, KNOWN),
        }
    }

    pub fn aliased(alias: &str, target: &str) -> Self {
        RegistryLine::Directive {
            directive: Directive::AliasedTo {
                alias: alias.to_string(),
                target: target.to_string(),
            },
            raw: format!("-{} {} -{}", alias, ALIASED_TO, target),
        }
    }

    pub fn directive(&self) -> Option<&Directive> {
        match self {
            RegistryLine::Directive { directive, .. } => Some(directive),
            _ => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, RegistryLine::Comment(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RegistryLine::Comment(s) | RegistryLine::Passthrough(s) => s,
            RegistryLine::Directive { raw, .. } => raw,
        }
    }
}

impl fmt::Display for RegistryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_directive(line: &str) -> Option<Directive> {
    let mut parts = line.split_whitespace();
    let engine = parts.next()?.strip_prefix('-')?;
    if engine.is_empty() {
        return None;
    }
    let engine = engine.to_string();
    let action = parts.next()?;
    match (action, parts.next(), parts.next()) {
        (KNOWN, None, _) => Some(Directive::Known { engine }),
        (ALIASED_TO, Some(target), None) => Some(Directive::AliasedTo {
            alias: engine,
            target: target.strip_prefix('-').unwrap_or(target).to_string(),
        }),
        _ => Some(Directive::Other { engine }),
    }
}

/// Parsed contents of a registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub lines: Vec<RegistryLine>,
    trailing_newline: bool,
}

impl Registry {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(RegistryLine::parse).collect(),
            trailing_newline: content.is_empty() || content.ends_with('\n'),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ImageError::RegistryMissing(path.to_path_buf()).into());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(RegistryLine::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        install::write_atomic(path, self.render().as_bytes(), FILE_MODE)
    }

    /// Exact-line check for `-<engine> KNOWN`.
    pub fn is_known(&self, engine: &str) -> bool {
        let wanted = format!("-{} {}", engine, KNOWN);
        self.lines.iter().any(|l| l.as_str().trim() == wanted)
    }

    /// Engines declared `KNOWN`, in file order.
    pub fn known_engines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l.directive() {
                Some(Directive::Known { engine }) => Some(engine.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Make `engine` known, returning whether anything changed.
    ///
    /// The `KNOWN` line goes right before the first non-comment line, followed
    /// by one `ALIASED_TO` line per alias of `engine`. Any other line for the
    /// same engine is dropped so exactly one declaration remains.
    pub fn ensure_known(&mut self, engine: &str, aliases: &[(&str, &str)]) -> bool {
        if self.is_known(engine) {
            return false;
        }

        let mut inserted: Vec<RegistryLine> = vec![RegistryLine::known(engine)];
        inserted.extend(
            aliases
                .iter()
                .filter(|(_, target)| *target == engine)
                .map(|(alias, target)| RegistryLine::aliased(alias, target)),
        );

        let old = std::mem::take(&mut self.lines);
        let mut written = false;
        for line in old {
            if line.is_comment() {
                self.lines.push(line);
                continue;
            }
            if !written {
                self.lines.extend(inserted.iter().cloned());
                written = true;
            }
            let same_engine = line
                .directive()
                .map(|d| d.engine() == engine)
                .unwrap_or(false);
            if same_engine || inserted.contains(&line) {
                continue;
            }
            self.lines.push(line);
        }
        if !written {
            self.lines.extend(inserted);
        }
        true
    }

    /// Swap the bootstrap's default engine for the reserved original engine.
    ///
    /// The first directive line names the default engine. It is replaced by an
    /// explanatory comment plus `-original KNOWN`; every other line is kept in
    /// order. Directive lines before the default that are not plain
    /// `-<engine> KNOWN` lines are kept and reported.
    ///
    /// Returns the default engine's name.
    pub fn replace_default_with_original(&mut self, path: &Path) -> Result<String> {
        let mut default = None;
        let old = std::mem::take(&mut self.lines);
        for line in old {
            if default.is_some() || !line.as_str().starts_with('-') {
                self.lines.push(line);
                continue;
            }
            match line.directive() {
                Some(Directive::Known { engine }) => {
                    self.lines.push(RegistryLine::Comment(format!(
                        "# default VM is a copy of the unmodified {} VM",
                        engine
                    )));
                    self.lines.push(RegistryLine::known(ORIGINAL_ENGINE));
                    default = Some(engine.clone());
                }
                _ => {
                    warn!(
                        "skipping not parsable line \"{}\" in {}",
                        line.as_str(),
                        path.display()
                    );
                    self.lines.push(line);
                }
            }
        }
        default.ok_or_else(|| ImageError::NoDefaultEngine(path.to_path_buf()).into())
    }
}

/// Whether the registry at `path` declares `engine` as known.
pub fn is_known(path: &Path, engine: &str) -> Result<bool> {
    Ok(Registry::load(path)?.is_known(engine))
}

/// Ensure the registry at `path` declares `engine` as known.
///
/// The file must exist. It is only rewritten when something changes.
pub fn ensure_known(path: &Path, engine: &str, aliases: &[(&str, &str)]) -> Result<()> {
    let mut registry = Registry::load(path)?;
    if registry.ensure_known(engine, aliases) {
        info!("Prepending \"-{} KNOWN\" to {}", engine, path.display());
        registry.save(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::ENGINE_ALIASES;
    use tempfile::tempdir;

    const BOOTSTRAP_CFG: &str = "\
# List of JVMs that can be used as an option to java, javac, etc.
# ...
-server KNOWN
-client IGNORE
";

    #[test]
    fn test_parse_line_kinds() {
        assert!(RegistryLine::parse("# hi").is_comment());
        assert_eq!(
            RegistryLine::parse("-server KNOWN").directive(),
            Some(&Directive::Known {
                engine: "server".into()
            })
        );
        assert_eq!(
            RegistryLine::parse("-graal ALIASED_TO -jvmci").directive(),
            Some(&Directive::AliasedTo {
                alias: "graal".into(),
                target: "jvmci".into()
            })
        );
        assert_eq!(
            RegistryLine::parse("-client IGNORE").directive(),
            Some(&Directive::Other {
                engine: "client".into()
            })
        );
        assert_eq!(
            RegistryLine::parse("garbage"),
            RegistryLine::Passthrough("garbage".into())
        );
        assert_eq!(RegistryLine::parse("-"), RegistryLine::Passthrough("-".into()));
    }

    #[test]
    fn test_render_preserves_unrecognized_lines() {
        let content = "# c\n  odd spacing \n-x KNOWN\n-y WEIRD thing here\n";
        assert_eq!(Registry::parse(content).render(), content);
    }

    #[test]
    fn test_ensure_known_inserts_before_first_non_comment() {
        let mut reg = Registry::parse(BOOTSTRAP_CFG);
        assert!(reg.ensure_known("jvmci", &[]));
        assert_eq!(
            reg.render(),
            "# List of JVMs that can be used as an option to java, javac, etc.\n\
             # ...\n\
             -jvmci KNOWN\n\
             -server KNOWN\n\
             -client IGNORE\n"
        );
    }

    #[test]
    fn test_ensure_known_is_idempotent() {
        let mut reg = Registry::parse(BOOTSTRAP_CFG);
        reg.ensure_known("jvmci", ENGINE_ALIASES);
        let once = reg.render();
        assert!(!reg.ensure_known("jvmci", ENGINE_ALIASES));
        assert_eq!(reg.render(), once);
        assert_eq!(once.matches("-jvmci KNOWN").count(), 1);
    }

    #[test]
    fn test_ensure_known_adds_alias_lines() {
        let mut reg = Registry::parse("# header\n-server KNOWN\n");
        reg.ensure_known("new", &[("old", "new"), ("other", "server")]);
        let out = reg.render();
        assert!(out.contains("-new KNOWN\n-old ALIASED_TO -new\n"));
        assert!(!out.contains("-other"));
    }

    #[test]
    fn test_ensure_known_replaces_other_declaration_of_same_engine() {
        let mut reg = Registry::parse("# h\n-server KNOWN\n-jvmci IGNORE\n");
        reg.ensure_known("jvmci", &[]);
        assert_eq!(reg.render(), "# h\n-jvmci KNOWN\n-server KNOWN\n");
    }

    #[test]
    fn test_ensure_known_does_not_duplicate_existing_alias() {
        let mut reg = Registry::parse("-server KNOWN\n-graal ALIASED_TO -jvmci\n");
        reg.ensure_known("jvmci", ENGINE_ALIASES);
        let out = reg.render();
        assert_eq!(out.matches("-graal ALIASED_TO -jvmci").count(), 1);
    }

    #[test]
    fn test_ensure_known_comment_only_file_appends() {
        let mut reg = Registry::parse("# only comments\n");
        reg.ensure_known("server", &[]);
        assert_eq!(reg.render(), "# only comments\n-server KNOWN\n");
    }

    #[test]
    fn test_comments_never_move() {
        let mut reg = Registry::parse("-a KNOWN\n# middle\n-b KNOWN\n");
        reg.ensure_known("c", &[]);
        assert_eq!(reg.render(), "-c KNOWN\n-a KNOWN\n# middle\n-b KNOWN\n");
    }

    #[test]
    fn test_replace_default_with_original() {
        let mut reg = Registry::parse("# header\n-server KNOWN\n-client IGNORE\n");
        let default = reg
            .replace_default_with_original(Path::new("jvm.cfg"))
            .unwrap();
        assert_eq!(default, "server");
        assert_eq!(
            reg.render(),
            "# header\n\
             # default VM is a copy of the unmodified server VM\n\
             -original KNOWN\n\
             -client IGNORE\n"
        );
    }

    #[test]
    fn test_replace_default_keeps_unparsable_leading_lines() {
        let mut reg = Registry::parse("-hotspot ALIASED_TO -client\n-client KNOWN\n");
        let default = reg
            .replace_default_with_original(Path::new("jvm.cfg"))
            .unwrap();
        assert_eq!(default, "client");
        assert!(reg.render().starts_with("-hotspot ALIASED_TO -client\n"));
    }

    #[test]
    fn test_replace_default_fails_without_known_line() {
        let mut reg = Registry::parse("# nothing here\n");
        let err = reg
            .replace_default_with_original(Path::new("jvm.cfg"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::NoDefaultEngine(_))
        ));
    }

    #[test]
    fn test_file_level_ensure_and_is_known() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jvm.cfg");
        fs::write(&path, "# header\n-server KNOWN\n").unwrap();

        assert!(!is_known(&path, "new").unwrap());
        ensure_known(&path, "new", &[("old", "new")]).unwrap();
        assert!(is_known(&path, "new").unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("-new KNOWN"));
        assert!(content.contains("-old ALIASED_TO -new"));

        ensure_known(&path, "new", &[("old", "new")]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_missing_registry_is_fatal() {
        let dir = tempdir().unwrap();
        let err = is_known(&dir.path().join("jvm.cfg"), "server").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::RegistryMissing(_))
        ));
    }
}
