//! Deploying built distributions into runtime images.
//!
//! A deployment pass resolves every distribution to its artifact file and
//! installs the ones that exist into each image under the images root.
//! Artifacts that have not been built yet are skipped.

pub mod native;
pub mod resolve;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::image;
use crate::install::{Installer, FILE_MODE};
use crate::layout::{self, ImageLayout, Platform};
use crate::properties::{self, COMPILER_KEY};
use crate::registry;
use crate::release;
use crate::services::ServiceMerger;
use crate::vm::{BuildKind, EngineVariant, ENGINE_ALIASES};

use resolve::{instantiate, ArtifactResolver, NATIVE_TEMPLATE};

/// A distribution that is installed into runtime images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployedDistribution {
    /// A jar copied into a fixed library directory.
    Library { name: String, target_dir: PathBuf },
    /// A jar in the engine-library directory contributing services and,
    /// optionally, compiler selections.
    EngineLibrary { name: String, compilers: Vec<String> },
    /// The native engine built for the selected engine and build kind.
    NativeEngine { template: String },
}

/// Everything a deployment needs besides the image itself.
pub struct DeployContext<'a> {
    pub platform: Platform,
    pub images_root: PathBuf,
    pub installer: Installer,
    pub resolver: &'a dyn ArtifactResolver,
    pub engine: EngineVariant,
    pub build: BuildKind,
    /// Name the native template is currently bound to.
    pub native_distribution: Option<String>,
}

impl DeployContext<'_> {
    fn layout(&self, image_dir: &Path) -> ImageLayout {
        ImageLayout::new(image_dir, self.platform.clone())
    }
}

impl DeployedDistribution {
    pub fn library(name: &str) -> Self {
        DeployedDistribution::Library {
            name: name.to_string(),
            target_dir: layout::library_dir(),
        }
    }

    pub fn extension(name: &str) -> Self {
        DeployedDistribution::Library {
            name: name.to_string(),
            target_dir: layout::extension_dir(),
        }
    }

    pub fn engine_library(name: &str, compilers: &[&str]) -> Self {
        DeployedDistribution::EngineLibrary {
            name: name.to_string(),
            compilers: compilers.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn native_engine() -> Self {
        DeployedDistribution::NativeEngine {
            template: NATIVE_TEMPLATE.to_string(),
        }
    }

    /// Concrete distribution name in `ctx`.
    pub fn name(&self, ctx: &DeployContext<'_>) -> String {
        match self {
            DeployedDistribution::Library { name, .. }
            | DeployedDistribution::EngineLibrary { name, .. } => name.clone(),
            DeployedDistribution::NativeEngine { template } => ctx
                .native_distribution
                .clone()
                .unwrap_or_else(|| instantiate(template, ctx.engine, ctx.build)),
        }
    }

    fn extension_name(&self) -> &'static str {
        match self {
            DeployedDistribution::NativeEngine { .. } => "tar",
            _ => "jar",
        }
    }

    /// Artifact file of this distribution, which may not exist yet.
    pub fn artifact(&self, ctx: &DeployContext<'_>) -> PathBuf {
        ctx.resolver.artifact_path(&self.name(ctx), self.extension_name())
    }

    /// Install location relative to an image root.
    pub fn target_directory(&self, platform: &Platform, engine: EngineVariant) -> PathBuf {
        match self {
            DeployedDistribution::Library { target_dir, .. } => target_dir.clone(),
            DeployedDistribution::EngineLibrary { .. } => layout::jvmci_dir(),
            DeployedDistribution::NativeEngine { .. } => {
                platform.engine_lib_dir().join(engine.name())
            }
        }
    }

    /// Install this distribution into the image at `image_dir`.
    ///
    /// Returns `false` when there was nothing to do: the artifact has not
    /// been built, or a native bundle belongs to another build kind.
    pub fn deploy(&self, image_dir: &Path, ctx: &DeployContext<'_>) -> Result<bool> {
        let artifact = self.artifact(ctx);
        if !artifact.is_file() {
            debug!("Skipping {}: {} not built", self.name(ctx), artifact.display());
            return Ok(false);
        }
        let image = ctx.layout(image_dir);

        match self {
            DeployedDistribution::Library { .. } => {
                let target = image_dir.join(self.target_directory(&ctx.platform, ctx.engine));
                debug!("Deploying {} to {}", self.name(ctx), target.display());
                ctx.installer.install(&artifact, &target, FILE_MODE)?;
            }
            DeployedDistribution::EngineLibrary { compilers, .. } => {
                let target = image.jvmci_dir();
                debug!("Deploying {} to {}", self.name(ctx), target.display());
                ctx.installer.install(&artifact, &target, FILE_MODE)?;
                update_services(&image, &ctx.installer)?;
                if !compilers.is_empty() {
                    properties::set_values(&image.properties_file(), COMPILER_KEY, compilers)?;
                }
            }
            DeployedDistribution::NativeEngine { .. } => {
                let image_build = image::build_kind_from_dir(&ctx.images_root, image_dir)?;
                if image_build != ctx.build {
                    return Ok(false);
                }
                native::extract(&artifact, &image, ctx.engine.name(), &ctx.installer)?;
                registry::ensure_known(&image.registry_file(), ctx.engine.name(), ENGINE_ALIASES)?;
            }
        }
        Ok(true)
    }
}

/// Engine-library jars currently installed in `image`, sorted by name.
pub fn engine_bundles(image: &ImageLayout) -> Result<Vec<PathBuf>> {
    let dir = image.jvmci_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut jars = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().map(|e| e == "jar").unwrap_or(false) {
            jars.push(path);
        }
    }
    jars.sort();
    Ok(jars)
}

/// Regenerate the service directory of `image` from its engine-library jars.
pub fn update_services(image: &ImageLayout, installer: &Installer) -> Result<()> {
    let bundles = engine_bundles(image)?;
    ServiceMerger::new(*installer).merge(&bundles, &image.services_dir(), false)?;
    Ok(())
}

/// Distributions deployed into every image.
pub fn default_distributions() -> Vec<DeployedDistribution> {
    vec![
        DeployedDistribution::library("JVMCI_SERVICE"),
        DeployedDistribution::engine_library("JVMCI_API", &[]),
        DeployedDistribution::engine_library("JVMCI_HOTSPOT", &[]),
        DeployedDistribution::engine_library("JVMCI_HOTSPOTVMCONFIG", &[]),
        DeployedDistribution::engine_library("JVMCI_OPTIONS", &[]),
        DeployedDistribution::native_engine(),
    ]
}

/// Image directories under `images_root`, sorted by name.
pub fn image_dirs(images_root: &Path) -> Result<Vec<PathBuf>> {
    if !images_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in
        fs::read_dir(images_root).with_context(|| format!("listing {}", images_root.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Run a deployment pass, then patch the release file of `selected_image`.
///
/// Returns the number of (distribution, image) installs performed.
pub fn deploy_all(
    distributions: &[DeployedDistribution],
    ctx: &DeployContext<'_>,
    selected_image: &Path,
    revision: Option<&str>,
) -> Result<usize> {
    let images = image_dirs(&ctx.images_root)?;
    let mut deployed = 0;
    for dist in distributions {
        if !dist.artifact(ctx).is_file() {
            continue;
        }
        for image_dir in &images {
            if dist.deploy(image_dir, ctx)? {
                deployed += 1;
            }
        }
    }
    release::patch_file(&ctx.layout(selected_image).release_file(), revision)?;
    Ok(deployed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Os;
    use resolve::DistsDirResolver;
    use std::io::Write;
    use tempfile::tempdir;

    fn jar(path: &Path, services: &[(&str, &str)]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (service, providers) in services {
            zip.start_file(
                format!("META-INF/jvmci.services/{}", service),
                zip::write::FileOptions::default(),
            )
            .unwrap();
            zip.write_all(providers.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn ctx<'a>(root: &Path, resolver: &'a DistsDirResolver) -> DeployContext<'a> {
        DeployContext {
            platform: Platform::new(Os::Linux, "amd64"),
            images_root: root.join("jdk1.8.0"),
            installer: Installer::default(),
            resolver,
            engine: EngineVariant::Server,
            build: BuildKind::Product,
            native_distribution: None,
        }
    }

    #[test]
    fn test_missing_artifact_is_skipped() {
        let dir = tempdir().unwrap();
        let resolver = DistsDirResolver::new(dir.path().join("dists"));
        let ctx = ctx(dir.path(), &resolver);
        let image = ctx.images_root.join("product");
        fs::create_dir_all(&image).unwrap();

        let deployed = DeployedDistribution::library("JVMCI_SERVICE")
            .deploy(&image, &ctx)
            .unwrap();
        assert!(!deployed);
        assert!(!image.join("jre/lib").exists());
    }

    #[test]
    fn test_library_and_engine_library_targets() {
        let platform = Platform::new(Os::Linux, "amd64");
        assert_eq!(
            DeployedDistribution::library("X").target_directory(&platform, EngineVariant::Server),
            PathBuf::from("jre/lib")
        );
        assert_eq!(
            DeployedDistribution::extension("X").target_directory(&platform, EngineVariant::Server),
            PathBuf::from("jre/lib/ext")
        );
        assert_eq!(
            DeployedDistribution::engine_library("X", &[])
                .target_directory(&platform, EngineVariant::Server),
            PathBuf::from("jre/lib/jvmci")
        );
        assert_eq!(
            DeployedDistribution::native_engine().target_directory(&platform, EngineVariant::Jvmci),
            PathBuf::from("jre/lib/amd64/jvmci")
        );
    }

    #[test]
    fn test_engine_library_merges_services_and_sets_compilers() {
        let dir = tempdir().unwrap();
        let dists = dir.path().join("dists");
        jar(&dists.join("jvmci-api.jar"), &[("jdk.vm.ci.compiler", "A\n")]);
        let resolver = DistsDirResolver::new(&dists);
        let ctx = ctx(dir.path(), &resolver);
        let image = ctx.images_root.join("product");
        fs::create_dir_all(&image).unwrap();

        DeployedDistribution::engine_library("JVMCI_API", &["graal"])
            .deploy(&image, &ctx)
            .unwrap();

        assert!(image.join("jre/lib/jvmci/jvmci-api.jar").is_file());
        assert_eq!(
            fs::read_to_string(image.join("jre/lib/jvmci/services/jdk.vm.ci.compiler")).unwrap(),
            "A\n"
        );
        let props = fs::read_to_string(image.join("jre/lib/jvmci/jvmci.properties")).unwrap();
        assert!(props.starts_with(properties::HEADER));
        assert!(props.contains("jvmci.compiler=graal\n"));
    }

    #[test]
    fn test_native_bundle_skips_other_build_kinds() {
        let dir = tempdir().unwrap();
        let dists = dir.path().join("dists");
        fs::create_dir_all(&dists).unwrap();
        let bundle = dists.join("jvm-product-server.tar");
        let mut builder = tar::Builder::new(fs::File::create(&bundle).unwrap());
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "libjvm.so", &b"jvm"[..]).unwrap();
        builder.finish().unwrap();
        drop(builder);

        let resolver = DistsDirResolver::new(&dists);
        let ctx = ctx(dir.path(), &resolver);
        for build in ["product", "fastdebug"] {
            let cfg = ctx.images_root.join(build).join("jre/lib/amd64/jvm.cfg");
            fs::create_dir_all(cfg.parent().unwrap()).unwrap();
            fs::write(&cfg, "-original KNOWN\n").unwrap();
        }

        let installs = deploy_all(&[DeployedDistribution::native_engine()], &ctx, &ctx.images_root.join("product"), None)
            .unwrap();

        assert_eq!(installs, 1);
        let product = ctx.images_root.join("product/jre/lib/amd64");
        assert!(product.join("server/libjvm.so").is_file());
        assert_eq!(
            fs::read_to_string(product.join("jvm.cfg")).unwrap(),
            "-server KNOWN\n-original KNOWN\n"
        );
        assert!(!ctx.images_root.join("fastdebug/jre/lib/amd64/server").exists());
    }
}
