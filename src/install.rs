//! Crash-safe installation of single files into an image.
//!
//! # Atomicity
//!
//! Every file is first written to a uniquely named temporary file in the
//! target directory and then renamed over the final name. The rename stays
//! on one filesystem, so a process reading the target sees either the old
//! content or the complete new content, never a partial write. If the
//! install is abandoned before the rename, the temporary file is removed and
//! the target is left untouched.
//!
//! Errors are propagated as-is. Nothing here retries.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Mode for directories inside an image.
pub const DIR_MODE: u32 = 0o755;
/// Mode for regular files inside an image.
pub const FILE_MODE: u32 = 0o644;
/// Mode for executables inside an image.
pub const EXEC_MODE: u32 = 0o755;

/// Installs files into image directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct Installer {
    /// Link installed artifacts instead of copying them.
    ///
    /// Much faster than copying, but a running VM sees the artifact change
    /// underneath it when the source is rebuilt.
    link: bool,
}

impl Installer {
    pub fn new(link: bool) -> Self {
        Self { link }
    }

    pub fn links(&self) -> bool {
        self.link
    }

    /// Install `src` into `target_dir` under its own file name.
    ///
    /// Returns the installed path.
    pub fn install(&self, src: &Path, target_dir: &Path, mode: u32) -> Result<PathBuf> {
        let name = src
            .file_name()
            .with_context(|| format!("{} has no file name", src.display()))?;
        fs::create_dir_all(target_dir)
            .with_context(|| format!("creating {}", target_dir.display()))?;
        let dst = target_dir.join(name);

        if self.link {
            self.link_into(src, &dst)?;
            return Ok(dst);
        }

        let mut file =
            fs::File::open(src).with_context(|| format!("opening {}", src.display()))?;
        let staged = stage(&mut file, target_dir, &name.to_string_lossy())?;
        staged.commit(mode)
    }

    /// Install generated content into `target_dir` as `name`.
    pub fn install_bytes(
        &self,
        contents: &[u8],
        target_dir: &Path,
        name: &str,
        mode: u32,
    ) -> Result<PathBuf> {
        fs::create_dir_all(target_dir)
            .with_context(|| format!("creating {}", target_dir.display()))?;
        let staged = stage(&mut io::Cursor::new(contents), target_dir, name)?;
        staged.commit(mode)
    }

    /// Install the content of `reader` into `target_dir` as `name`.
    pub fn install_reader(
        &self,
        reader: &mut dyn Read,
        target_dir: &Path,
        name: &str,
        mode: u32,
    ) -> Result<PathBuf> {
        fs::create_dir_all(target_dir)
            .with_context(|| format!("creating {}", target_dir.display()))?;
        stage(reader, target_dir, name)?.commit(mode)
    }

    fn link_into(&self, src: &Path, dst: &Path) -> Result<()> {
        let src = fs::canonicalize(src)
            .with_context(|| format!("resolving {}", src.display()))?;

        if dst.is_symlink() {
            if let Ok(current) = fs::canonicalize(dst) {
                if current == src {
                    return Ok(());
                }
            }
        }

        // Link under a temporary name first so the swap is a single rename.
        let tmp = dst.with_file_name(format!(
            ".{}.{}.link",
            dst.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            std::process::id()
        ));
        if tmp.is_symlink() || tmp.exists() {
            fs::remove_file(&tmp)?;
        }
        symlink(&src, &tmp)
            .with_context(|| format!("linking {} -> {}", tmp.display(), src.display()))?;
        if let Err(e) = fs::rename(&tmp, dst) {
            let _ = fs::remove_file(&tmp);
            return Err(e)
                .with_context(|| format!("moving link into place at {}", dst.display()));
        }
        Ok(())
    }
}

/// A fully written temporary file waiting to be renamed into place.
///
/// Dropping it without calling [`StagedFile::commit`] deletes the temporary
/// file and leaves the target as it was.
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Path the staged content will be installed at.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the temporary file holding the staged content.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Rename the staged content over the target and apply `mode`.
    pub fn commit(self, mode: u32) -> Result<PathBuf> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("renaming into {}", target.display()))?;
        set_mode(&target, mode)?;
        Ok(target)
    }
}

/// Write `reader` to a temporary file next to `dir/name`.
pub fn stage(reader: &mut dyn Read, dir: &Path, name: &str) -> Result<StagedFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(name)
        .tempfile_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    io::copy(reader, &mut tmp).with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(StagedFile {
        tmp,
        target: dir.join(name),
    })
}

/// Atomically replace the file at `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy();
    stage(&mut io::Cursor::new(contents), dir, &name)?.commit(mode)?;
    Ok(())
}

/// Set Unix permission bits. No-op on other platforms.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting mode {:o} on {}", mode, path.display()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}
