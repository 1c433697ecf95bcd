//! Settings for one suite checkout.
//!
//! Values come from, lowest precedence first: built-in defaults, the suite
//! env file (`<suite>/.vmimage/env`), the process environment, and finally
//! command-line flags applied by the binary.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::install::Installer;
use crate::layout::Platform;
use crate::release;

/// Directory under the suite holding the env file.
pub const CONFIG_DIR: &str = ".vmimage";

/// Resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the suite checkout (holds `src/`, `make/`).
    pub suite_dir: PathBuf,
    /// `KEY=value` file with persistent settings.
    pub env_file: PathBuf,
    /// Bootstrap image every runtime image is derived from.
    pub bootstrap_home: Option<PathBuf>,
    bootstrap_version: Option<String>,
    /// Parent of the `jdk<version>` images root, defaults to the suite.
    pub images_dir: Option<PathBuf>,
    /// Engine used when none is given on the command line.
    pub default_vm: Option<String>,
    /// Install artifacts as symlinks instead of copies.
    pub symlink_artifacts: bool,
    /// Version-control revision of the suite, if known.
    pub revision: Option<String>,
    /// Release version used in the engine's version suffix.
    pub release_version: String,
    /// Directory holding built artifact bundles.
    pub artifact_dir: PathBuf,
    pub platform: Platform,
    pub verbose: bool,
    /// Env-file values overlaid with the process environment.
    vars: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings for `suite_dir` from its env file and the process environment.
    pub fn load(suite_dir: &Path) -> Result<Self> {
        let env_file = suite_dir.join(CONFIG_DIR).join("env");
        let mut vars = read_env_file(&env_file)?;
        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }
        Ok(Self::from_vars(suite_dir, env_file, vars))
    }

    /// Build settings from an already merged variable map.
    pub fn from_vars(suite_dir: &Path, env_file: PathBuf, vars: BTreeMap<String, String>) -> Self {
        let get = |k: &str| vars.get(k).filter(|v| !v.is_empty()).cloned();
        Self {
            suite_dir: suite_dir.to_path_buf(),
            env_file,
            bootstrap_home: get("JAVA_HOME").map(PathBuf::from),
            bootstrap_version: get("BOOTSTRAP_VERSION"),
            images_dir: get("VM_IMAGES_DIR").map(PathBuf::from),
            default_vm: get("DEFAULT_VM"),
            symlink_artifacts: get("SYMLINK_ARTIFACTS").as_deref() == Some("true"),
            revision: get("SUITE_REVISION"),
            release_version: get("SUITE_VERSION").unwrap_or_else(|| "dev".to_string()),
            artifact_dir: get("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| suite_dir.join("build").join("dists")),
            platform: Platform::host(),
            verbose: false,
            vars,
        }
    }

    /// Value of any variable from the env file or environment.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Variables the env file defines or the environment overrides.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn bootstrap_home(&self) -> Result<&Path> {
        match &self.bootstrap_home {
            Some(home) => Ok(home),
            None => bail!(
                "No bootstrap JDK configured.\n\
                 Set JAVA_HOME in the environment or in {}",
                self.env_file.display()
            ),
        }
    }

    /// Version of the bootstrap image.
    ///
    /// Taken from `BOOTSTRAP_VERSION`, else from `JAVA_VERSION` in the
    /// bootstrap image's release file.
    pub fn bootstrap_version(&self) -> Result<String> {
        if let Some(v) = &self.bootstrap_version {
            return Ok(v.clone());
        }
        let release_file = self.bootstrap_home()?.join("release");
        let content = fs::read_to_string(&release_file).with_context(|| {
            format!(
                "Cannot determine the bootstrap version: reading {} failed (set BOOTSTRAP_VERSION)",
                release_file.display()
            )
        })?;
        match release::read_value(&content, "JAVA_VERSION") {
            Some(v) => Ok(v),
            None => bail!("No JAVA_VERSION in {}", release_file.display()),
        }
    }

    /// Directory holding one image per build kind.
    pub fn images_root(&self) -> Result<PathBuf> {
        let parent = self.images_dir.as_deref().unwrap_or(&self.suite_dir);
        Ok(parent.join(format!("jdk{}", self.bootstrap_version()?)))
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self.symlink_artifacts)
    }

    /// Whether the env file contains exactly `key=value`.
    pub fn env_file_defines(&self, key: &str, value: &str) -> bool {
        let wanted = format!("{}={}", key, value);
        fs::read_to_string(&self.env_file)
            .map(|c| c.lines().any(|l| l.trim() == wanted))
            .unwrap_or(false)
    }

    /// Append `key=value` to the env file.
    pub fn persist_env(&self, key: &str, value: &str) -> Result<()> {
        if let Some(dir) = self.env_file.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let needs_newline = fs::read_to_string(&self.env_file)
            .map(|c| !c.is_empty() && !c.ends_with('\n'))
            .unwrap_or(false);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.env_file)
            .with_context(|| format!("opening {}", self.env_file.display()))?;
        if needs_newline {
            writeln!(file)?;
        }
        writeln!(file, "{}={}", key, value)?;
        debug!("Persisted {}={} to {}", key, value, self.env_file.display());
        Ok(())
    }
}

/// Read `KEY=value` lines from `path`; a missing file yields nothing.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let iter =
        dotenvy::from_path_iter(path).with_context(|| format!("reading {}", path.display()))?;
    for item in iter {
        let (key, value) = item.with_context(|| format!("parsing {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}
