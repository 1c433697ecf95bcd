//! Preflight checks for image and build prerequisites.
//!
//! Validates the host and the bootstrap image BEFORE creating images or
//! starting a native build.
//!
//! # Checks Performed
//!
//! - **Host tools**: make and a C++ compiler are installed
//! - **Bootstrap**: the bootstrap JDK exists, has a known version and an engine registry
//! - **Image status**: reports which images exist and the engines they know
//!
//! # Usage
//!
//! ```rust,ignore
//! use vmimage::preflight::PreflightChecker;
//!
//! let report = PreflightChecker::new(&settings).run_all();
//! if !report.is_ok() {
//!     for error in report.errors() {
//!         eprintln!("  - {}", error.message);
//!     }
//!     std::process::exit(1);
//! }
//! ```

mod bootstrap;
mod host_tools;

pub use bootstrap::check_bootstrap;
pub use host_tools::check_host_tools;

use std::path::PathBuf;

use crate::config::Settings;
use crate::layout::ImageLayout;
use crate::registry::Registry;
use crate::vm::BuildKind;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Comprehensive preflight report.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
    pub images: Vec<ImageStatus>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Print a summary of the preflight checks.
    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        println!("=== Images ===\n");
        for image in &self.images {
            image.print();
        }

        println!();
        if self.is_ok() {
            println!(
                "All preflight checks passed ({}/{})",
                self.passed_count(),
                self.total_count()
            );
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.total_count()
            );
        }
    }
}

/// What exists for one build kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStatus {
    pub build: BuildKind,
    pub path: PathBuf,
    pub exists: bool,
    /// Engines the image's registry declares `KNOWN`.
    pub engines: Vec<String>,
}

impl ImageStatus {
    pub fn print(&self) {
        if self.exists {
            let engines = if self.engines.is_empty() {
                "no engines".to_string()
            } else {
                self.engines.join(", ")
            };
            println!("[created]  {:<10} {} ({})", self.build, self.path.display(), engines);
        } else {
            println!("[missing]  {:<10} {}", self.build, self.path.display());
        }
    }
}

/// Preflight checker for one suite.
pub struct PreflightChecker<'a> {
    settings: &'a Settings,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Run all preflight checks and return a comprehensive report.
    pub fn run_all(&self) -> PreflightReport {
        let mut report = PreflightReport::default();
        report.checks.extend(check_host_tools(&self.settings.platform));
        report.checks.extend(check_bootstrap(self.settings));
        report.images = self.image_status();
        report
    }

    /// Status of every build kind's image. Empty when the images root is unknown.
    pub fn image_status(&self) -> Vec<ImageStatus> {
        let Ok(root) = self.settings.images_root() else {
            return Vec::new();
        };
        BuildKind::ALL
            .iter()
            .map(|&build| {
                let path = root.join(build.name());
                let layout = ImageLayout::new(&path, self.settings.platform.clone());
                let engines = Registry::load(&layout.registry_file())
                    .map(|r| r.known_engines().into_iter().map(str::to_string).collect())
                    .unwrap_or_default();
                ImageStatus {
                    build,
                    exists: path.is_dir(),
                    path,
                    engines,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", "passed");
        assert!(result.passed);
        assert!(result.suggestion.is_none());
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("test", "failed", "fix it");
        assert!(!result.passed);
        assert!(result.suggestion.is_some());
    }

    #[test]
    fn test_preflight_report_is_ok() {
        let mut report = PreflightReport::default();
        assert!(report.is_ok());

        report.checks.push(CheckResult::pass("test1", "ok"));
        assert!(report.is_ok());

        report.checks.push(CheckResult::fail("test2", "bad", "fix"));
        assert!(!report.is_ok());
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_image_status_lists_known_engines() {
        let dir = tempdir().unwrap();
        let mut vars = BTreeMap::new();
        vars.insert("BOOTSTRAP_VERSION".to_string(), "1.8.0".to_string());
        let settings = Settings::from_vars(dir.path(), dir.path().join("env"), vars);

        let product = ImageLayout::new(
            dir.path().join("jdk1.8.0/product"),
            settings.platform.clone(),
        );
        let registry = product.registry_file();
        fs::create_dir_all(registry.parent().unwrap()).unwrap();
        fs::write(&registry, "-original KNOWN\n-jvmci KNOWN\n").unwrap();

        let status = PreflightChecker::new(&settings).image_status();
        assert_eq!(status.len(), BuildKind::ALL.len());
        assert!(status[0].exists);
        assert_eq!(status[0].engines, vec!["original", "jvmci"]);
        assert!(!status[1].exists);
        assert!(status[1].engines.is_empty());
    }
}
