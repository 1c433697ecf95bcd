//! Variables passed to the native toolchain.
//!
//! Each variable appears once on the make command line. Values given with
//! `-D NAME=value` always win; the others come from the environment (or env
//! file) when set there, else from a computed default.

use anyhow::{bail, Result};
use std::fmt;

use crate::config::Settings;
use crate::layout::Os;
use crate::vm::EngineVariant;

/// Variables users are expected to set, with their descriptions.
pub const BUILD_VARIABLES: &[(&str, &str)] = &[
    ("ALT_BOOTDIR", "The location of the bootstrap JDK installation"),
    ("ALT_OUTPUTDIR", "Build directory"),
    ("HOTSPOT_BUILD_JOBS", "Number of CPUs used by make"),
    ("INSTALL", "Install the built VM into the JDK? (default: y)"),
    ("ZIP_DEBUGINFO_FILES", "Install zipped debug symbols file? (default: 0)"),
];

const SPARC_LINUX_CFLAGS: &str = "-Wno-conversion-null -Wno-int-to-pointer-cast \
     -Wno-unused-function -fno-tree-loop-distribute-patterns -fno-schedule-insns";

/// Ordered `NAME=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildVars {
    vars: Vec<(String, String)>,
    overridden: Vec<String>,
}

impl BuildVars {
    /// Record an explicit value. Later overrides of the same name replace earlier ones.
    pub fn set_override(&mut self, name: &str, value: &str) {
        self.put(name, value);
        if !self.overridden.iter().any(|n| n == name) {
            self.overridden.push(name.to_string());
        }
    }

    /// Set `name` unless it was overridden.
    pub fn set(&mut self, name: &str, value: &str) {
        if !self.is_overridden(name) {
            self.put(name, value);
        }
    }

    /// Set `name` from `settings`, falling back to `default`, unless overridden.
    pub fn set_from_env(&mut self, settings: &Settings, name: &str, default: &str) {
        let value = settings.var(name).unwrap_or(default).to_string();
        self.set(name, &value);
    }

    fn put(&mut self, name: &str, value: &str) {
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.vars.push((name.to_string(), value.to_string())),
        }
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.overridden.iter().any(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `NAME=value` arguments in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.vars.iter().map(|(n, v)| format!("{}={}", n, v)).collect()
    }
}

impl fmt::Display for BuildVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

/// Parse a `-D NAME=value` argument.
pub fn parse_override(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => bail!("build variable must have the form NAME=value: '{}'", arg),
    }
}

/// Number of parallel make jobs when not configured.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Compute the make variables for building `engine`.
pub fn compute(
    settings: &Settings,
    engine: EngineVariant,
    overrides: &[(String, String)],
    jobs: usize,
) -> Result<BuildVars> {
    let platform = &settings.platform;
    let mut vars = BuildVars::default();
    for (name, value) in overrides {
        vars.set_override(name, value);
    }

    vars.set_from_env(settings, "ARCH_DATA_MODEL", "64");
    vars.set_from_env(settings, "HOTSPOT_BUILD_JOBS", &jobs.to_string());
    let bootdir = settings.bootstrap_home()?.display().to_string();
    vars.set_from_env(settings, "ALT_BOOTDIR", &bootdir);

    if platform.os == Os::Linux && platform.arch == "sparcv9" {
        vars.set_from_env(settings, "DEBUG_BINARIES", "true");
        vars.set_from_env(settings, "EXTRA_CFLAGS", SPARC_LINUX_CFLAGS);
    }

    vars.set("MAKE_VERBOSE", if settings.verbose { "y" } else { "" });
    if engine.includes_jvmci() {
        vars.set(
            "USER_RELEASE_SUFFIX",
            &format!("jvmci-{}", settings.release_version),
        );
        vars.set("INCLUDE_JVMCI", "true");
    } else {
        vars.set("INCLUDE_JVMCI", "false");
        let outdir = nojvmci_output_dir(settings).display().to_string();
        vars.set_from_env(settings, "ALT_OUTPUTDIR", &outdir);
    }

    if platform.os == Os::Darwin {
        vars.set("USE_CLANG", "true");
        vars.set("COMPILER_WARNINGS_FATAL", "false");
    }

    // Keeps debug symbols usable without unzipping them first.
    vars.set_from_env(settings, "ZIP_DEBUGINFO_FILES", "0");

    if engine.target_suffix() == Some("1") {
        vars.set("BUILD_CLIENT_ONLY", "true");
    }
    Ok(vars)
}

/// Output directory of engines built without the compiler interface.
pub fn nojvmci_output_dir(settings: &Settings) -> std::path::PathBuf {
    settings
        .suite_dir
        .join("build-nojvmci")
        .join(settings.platform.os.toolchain_name())
}
