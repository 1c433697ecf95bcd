//! Mapping distribution names to artifact files.

use std::path::{Path, PathBuf};

use crate::vm::{BuildKind, EngineVariant};

/// Name template of the native engine distribution.
pub const NATIVE_TEMPLATE: &str = "JVM_<vmbuild>_<vm>";

/// Instantiate a distribution name template for one engine and build kind.
pub fn instantiate(template: &str, engine: EngineVariant, build: BuildKind) -> String {
    template
        .replace("<vmbuild>", build.name())
        .replace("<vm>", engine.name())
}

/// Finds the artifact file of a distribution.
///
/// The returned path may not exist yet: distributions that have not been
/// built are skipped by the caller.
pub trait ArtifactResolver {
    fn artifact_path(&self, distribution: &str, extension: &str) -> PathBuf;
}

/// Resolves artifacts in a flat output directory.
///
/// `JVMCI_API` with extension `jar` becomes `<dir>/jvmci-api.jar`.
#[derive(Debug, Clone)]
pub struct DistsDirResolver {
    dir: PathBuf,
}

impl DistsDirResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactResolver for DistsDirResolver {
    fn artifact_path(&self, distribution: &str, extension: &str) -> PathBuf {
        let base = distribution.to_lowercase().replace('_', "-");
        self.dir.join(format!("{}.{}", base, extension))
    }
}
