//! Host tool validation for native builds.
//!
//! Checks that required external tools are installed and executable.

use super::CheckResult;
use crate::layout::{Os, Platform};
use crate::process::which;

/// Tools needed on Unix hosts, with install suggestions. Any one name of a
/// group is enough.
const UNIX_TOOLS: &[(&[&str], &str, &str)] = &[
    (&["gmake", "make"], "Run the native build", "sudo dnf install make"),
    (&["g++", "clang++", "CC"], "Compile the native engine", "sudo dnf install gcc-c++"),
    (&["zip"], "Package debug symbols", "sudo dnf install zip"),
];

const WINDOWS_TOOLS: &[(&[&str], &str, &str)] = &[(
    &["msbuild"],
    "Build the engine project",
    "Install the Windows SDK and set WIN_SDK",
)];

/// Check that all host tools for `platform` are installed.
pub fn check_host_tools(platform: &Platform) -> Vec<CheckResult> {
    let tools = if platform.os == Os::Windows {
        WINDOWS_TOOLS
    } else {
        UNIX_TOOLS
    };
    tools
        .iter()
        .map(|(names, purpose, install)| check_tool(names, purpose, install))
        .collect()
}

fn check_tool(names: &[&str], purpose: &str, install_cmd: &str) -> CheckResult {
    let label = format!("{} tool", names.join("/"));
    match names.iter().find_map(|n| which(n)) {
        Some(path) => CheckResult::pass(label, format!("Found at {} ({})", path, purpose)),
        None => CheckResult::fail(
            label,
            format!("Not found (needed for: {})", purpose),
            install_cmd,
        ),
    }
}
