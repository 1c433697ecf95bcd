//! Rebuild detection by modification time.
//!
//! A native build is stale when its output is missing or any input file is
//! newer than the newest output file.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A file and its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Newest regular file under `dir`, or `None` if there is none.
pub fn newest_file(dir: &Path) -> Option<Stamp> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some(Stamp {
                path: e.into_path(),
                modified,
            })
        })
        .max_by_key(|s| s.modified)
}

/// First file under `roots` newer than `than`, skipping `excluded` subtrees.
///
/// Missing roots contribute nothing.
pub fn first_newer(roots: &[PathBuf], excluded: &[PathBuf], than: SystemTime) -> Option<PathBuf> {
    for root in roots.iter().filter(|r| r.is_dir()) {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !excluded.iter().any(|x| e.path() == x.as_path()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let newer = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|m| m > than)
                .unwrap_or(false);
            if newer {
                return Some(entry.into_path());
            }
        }
    }
    None
}
