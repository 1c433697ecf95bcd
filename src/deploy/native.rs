//! Native engine bundles.
//!
//! A native bundle is a tar archive produced by the native build. Only the
//! entries named in the relocation table are installed; everything else in
//! the archive is ignored.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::install::{Installer, FILE_MODE};
use crate::layout::{ImageLayout, Platform};

/// Where each recognized archive entry goes, relative to the image root.
pub fn relocation_table(platform: &Platform, engine: &str) -> Vec<(String, PathBuf)> {
    let lib_dir = platform.engine_lib_dir();
    let engine_dir = lib_dir.join(engine);
    vec![
        ("jvmti.h".to_string(), PathBuf::from("include")),
        ("sa-jdi.jar".to_string(), PathBuf::from("lib")),
        (platform.lib_name("jvm"), engine_dir.clone()),
        (platform.debug_lib_name("jvm"), engine_dir),
        (platform.lib_name("saproc"), lib_dir.clone()),
        (platform.debug_lib_name("saproc"), lib_dir.clone()),
        (platform.lib_name("jsig"), lib_dir.clone()),
        (platform.debug_lib_name("jsig"), lib_dir),
    ]
}

/// Install the relocatable entries of `bundle` into `image`.
///
/// Returns the installed paths.
pub fn extract(
    bundle: &Path,
    image: &ImageLayout,
    engine: &str,
    installer: &Installer,
) -> Result<Vec<PathBuf>> {
    let table = relocation_table(&image.platform, engine);
    let file = fs::File::open(bundle).with_context(|| format!("opening {}", bundle.display()))?;
    let mut archive = tar::Archive::new(file);
    let mut installed = Vec::new();

    for entry in archive
        .entries()
        .with_context(|| format!("reading {}", bundle.display()))?
    {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let Some((_, target)) = table.iter().find(|(n, _)| *n == name) else {
            continue;
        };
        let target_dir = image.root.join(target);
        debug!(
            "Deploying {} from {} to {}",
            name,
            bundle.display(),
            target_dir.display()
        );
        let mode = entry.header().mode().unwrap_or(FILE_MODE) & 0o7777;
        installed.push(installer.install_reader(&mut entry, &target_dir, &name, mode)?);
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Os;
    use tempfile::tempdir;

    fn add(builder: &mut tar::Builder<fs::File>, name: &str, data: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    #[test]
    fn test_relocation_table_linux() {
        let table = relocation_table(&Platform::new(Os::Linux, "amd64"), "jvmci");
        let find = |n: &str| table.iter().find(|(k, _)| k == n).map(|(_, v)| v.clone());
        assert_eq!(find("libjvm.so"), Some(PathBuf::from("jre/lib/amd64/jvmci")));
        assert_eq!(find("libjsig.debuginfo"), Some(PathBuf::from("jre/lib/amd64")));
        assert_eq!(find("jvmti.h"), Some(PathBuf::from("include")));
        assert_eq!(table.len(), 8);
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_relocates_known_entries_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let bundle = dir.path().join("jvm-product-server.tar");
        let mut builder = tar::Builder::new(fs::File::create(&bundle).unwrap());
        add(&mut builder, "libjvm.so", b"jvm", 0o755);
        add(&mut builder, "libsaproc.so", b"sa", 0o755);
        add(&mut builder, "jvmti.h", b"h", 0o644);
        add(&mut builder, "README", b"ignored", 0o644);
        builder.finish().unwrap();
        drop(builder);

        let image = ImageLayout::new(dir.path().join("image"), Platform::new(Os::Linux, "amd64"));
        let installed = extract(&bundle, &image, "server", &Installer::default()).unwrap();

        assert_eq!(installed.len(), 3);
        let jvm = image.engine_dir("server").join("libjvm.so");
        assert_eq!(fs::read(&jvm).unwrap(), b"jvm");
        assert_eq!(fs::metadata(&jvm).unwrap().permissions().mode() & 0o777, 0o755);
        assert!(image.engine_lib_dir().join("libsaproc.so").exists());
        assert!(image.root.join("include/jvmti.h").exists());
        assert!(!image.root.join("README").exists());
    }
}
