//! Disassembler helper library (`hsdis`).
//!
//! Prebuilt helpers exist for a fixed set of platforms. The library is
//! expected in the suite's output cache; fetching it is left to the user.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ImageError;
use crate::install::{Installer, FILE_MODE};
use crate::layout::{Os, Platform};

/// Assembly syntax of the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    #[default]
    Intel,
    Att,
}

/// `<flavor>/<library>` pairs a helper exists for.
const SUPPORTED: &[&str] = &[
    "att/hsdis-amd64.dll",
    "att/hsdis-amd64.so",
    "intel/hsdis-amd64.dll",
    "intel/hsdis-amd64.so",
    "intel/hsdis-amd64.dylib",
    "sparcv9/hsdis-solaris-sparcv9.so",
    "sparcv9/hsdis-linux-sparcv9.so",
];

fn lib_suffix(os: Os) -> &'static str {
    match os {
        Os::Windows => "dll",
        Os::Darwin => "dylib",
        _ => "so",
    }
}

/// Cached helper file name and its table key, if this platform has one.
pub fn library_name(platform: &Platform, flavor: Flavor) -> Result<String> {
    let (flavor, os_part) = if platform.arch == "sparcv9" {
        ("sparcv9", format!("{}-", platform.os.name()))
    } else {
        let f = match flavor {
            Flavor::Intel => "intel",
            Flavor::Att => "att",
        };
        (f, String::new())
    };
    let lib = format!(
        "hsdis-{}{}.{}",
        os_part,
        platform.arch,
        lib_suffix(platform.os)
    );
    if !SUPPORTED.contains(&format!("{}/{}", flavor, lib).as_str()) {
        return Err(ImageError::DisassemblerUnavailable(format!(
            "hsdis not supported on {}-{}",
            platform.os, platform.arch
        ))
        .into());
    }
    Ok(lib)
}

/// File name the engine looks for next to its libraries.
pub fn installed_name(platform: &Platform) -> String {
    format!("hsdis-{}.{}", platform.arch, lib_suffix(platform.os))
}

/// Copy the cached helper from `cache_dir` into `engine_lib_dir`.
pub fn install(
    installer: &Installer,
    platform: &Platform,
    flavor: Flavor,
    cache_dir: &Path,
    engine_lib_dir: &Path,
) -> Result<PathBuf> {
    let cached = cache_dir.join(library_name(platform, flavor)?);
    if !cached.is_file() {
        return Err(ImageError::DisassemblerUnavailable(format!(
            "{} has not been downloaded",
            cached.display()
        ))
        .into());
    }
    debug!("Installing {} into {}", cached.display(), engine_lib_dir.display());
    // Copied even in link mode: the installed name differs from the cached one.
    let mut file = std::fs::File::open(&cached)?;
    installer.install_reader(&mut file, engine_lib_dir, &installed_name(platform), FILE_MODE)
}
