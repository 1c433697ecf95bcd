//! Bootstrap image validation.

use super::CheckResult;
use crate::config::Settings;
use crate::layout::ImageLayout;
use crate::registry::Registry;

/// Check the bootstrap JDK every image is created from.
pub fn check_bootstrap(settings: &Settings) -> Vec<CheckResult> {
    let mut checks = Vec::new();
    let suggestion = format!("Set JAVA_HOME in {}", settings.env_file.display());

    let home = match settings.bootstrap_home() {
        Ok(home) if home.is_dir() => {
            checks.push(CheckResult::pass("bootstrap JDK", format!("Found at {}", home.display())));
            home
        }
        Ok(home) => {
            checks.push(CheckResult::fail(
                "bootstrap JDK",
                format!("{} is not a directory", home.display()),
                suggestion,
            ));
            return checks;
        }
        Err(_) => {
            checks.push(CheckResult::fail("bootstrap JDK", "Not configured", suggestion));
            return checks;
        }
    };

    checks.push(match settings.bootstrap_version() {
        Ok(version) => CheckResult::pass("bootstrap version", version),
        Err(e) => CheckResult::fail(
            "bootstrap version",
            format!("{:#}", e),
            "Set BOOTSTRAP_VERSION",
        ),
    });

    let registry = ImageLayout::new(home, settings.platform.clone()).registry_file();
    checks.push(match Registry::load(&registry) {
        Ok(r) if !r.known_engines().is_empty() => CheckResult::pass(
            "engine registry",
            format!("{} ({})", registry.display(), r.known_engines().join(", ")),
        ),
        Ok(_) => CheckResult::fail(
            "engine registry",
            format!("{} declares no KNOWN engine", registry.display()),
            "Use an unmodified JDK as the bootstrap",
        ),
        Err(_) => CheckResult::fail(
            "engine registry",
            format!("{} does not exist", registry.display()),
            "Point JAVA_HOME at a JDK, not a JRE",
        ),
    });
    checks
}
