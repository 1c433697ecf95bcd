//! Runtime images derived from the bootstrap image.
//!
//! An image is a full copy of the bootstrap image whose default engine has
//! been renamed to [`ORIGINAL_ENGINE`], so later builds can install their own
//! engines next to it. There is one image per build kind under the images
//! root.

pub mod disassembler;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::deploy::resolve::{DistsDirResolver, NATIVE_TEMPLATE};
use crate::deploy::{self, DeployContext, DeployedDistribution};
use crate::error::ImageError;
use crate::install::{self, Installer, DIR_MODE, FILE_MODE};
use crate::layout::{ImageLayout, Platform};
use crate::prompt::Prompter;
use crate::registry::{self, Registry};
use crate::select::ImageSelector;
use crate::vm::{BuildKind, EngineVariant, ORIGINAL_ENGINE};

/// Create a new image at `image_dir` from `bootstrap_home`.
///
/// `image_dir` must not exist. The disassembler helper is installed from
/// `disassembler_cache` when available; its absence is not an error.
pub fn create_image(
    bootstrap_home: &Path,
    image_dir: &Path,
    platform: &Platform,
    installer: &Installer,
    disassembler_cache: &Path,
) -> Result<()> {
    if image_dir.exists() {
        bail!("{} already exists", image_dir.display());
    }
    info!("Creating {} from {}", image_dir.display(), bootstrap_home.display());
    copy_tree(bootstrap_home, image_dir)?;

    let image = ImageLayout::new(image_dir, platform.clone());
    let registry_file = image.registry_file();
    let mut registry = Registry::load(&registry_file)?;
    let default_engine = registry.replace_default_with_original(&registry_file)?;

    chmod_dirs(image_dir, DIR_MODE)?;

    let from = image.engine_dir(&default_engine);
    let to = image.engine_dir(ORIGINAL_ENGINE);
    fs::rename(&from, &to)
        .with_context(|| format!("renaming {} to {}", from.display(), to.display()))?;

    registry.save(&registry_file)?;

    match disassembler::install(
        installer,
        platform,
        disassembler::Flavor::default(),
        disassembler_cache,
        &image.engine_lib_dir(),
    ) {
        Ok(path) => debug!("Installed {}", path.display()),
        Err(e) => match e.downcast_ref::<ImageError>() {
            Some(err) if err.is_recoverable() => debug!("{}", err),
            _ => return Err(e),
        },
    }
    Ok(())
}

/// Recursively copy `src` to `dst`, recreating symlinks as symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        bail!("{} is not a directory", src.display());
    }
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            symlink(&link, &target)
                .with_context(|| format!("linking {}", target.display()))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Set `mode` on every directory under `root`, `root` included.
pub fn chmod_dirs(root: &Path, mode: u32) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            install::set_mode(entry.path(), mode)?;
        }
    }
    Ok(())
}

/// Build kind of the image at `image_dir` under `images_root`.
pub fn build_kind_from_dir(images_root: &Path, image_dir: &Path) -> Result<BuildKind> {
    let unknown = |name: String| ImageError::UnknownBuildKind {
        dir: image_dir.to_path_buf(),
        name,
    };
    let rel = image_dir
        .strip_prefix(images_root)
        .map_err(|_| unknown(image_dir.display().to_string()))?;
    let name = rel.to_string_lossy().into_owned();
    name.parse::<BuildKind>().map_err(|_| unknown(name).into())
}

/// Copy the suite's engine options file into `image`, or remove a stale copy.
pub fn sync_options_file(suite_dir: &Path, image: &ImageLayout) -> Result<()> {
    let source = suite_dir.join("jvmci.options");
    let installed = image.options_file();
    if source.is_file() {
        let content =
            fs::read(&source).with_context(|| format!("reading {}", source.display()))?;
        if let Some(dir) = installed.parent() {
            fs::create_dir_all(dir)?;
        }
        install::write_atomic(&installed, &content, FILE_MODE)?;
    } else if installed.exists() {
        fs::remove_file(&installed)
            .with_context(|| format!("removing {}", installed.display()))?;
    }
    Ok(())
}

/// Builds the given engine into the given build kind's image.
pub type BuildHook<'a> = &'a dyn Fn(EngineVariant, BuildKind) -> Result<()>;

/// What [`ImageManager::image_dir`] should do besides locating the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRequest {
    /// Create the image from the bootstrap if it is missing.
    pub create: bool,
    /// Run a deployment pass.
    pub deploy: bool,
    /// Require this engine to be installed.
    pub check_engine: Option<EngineVariant>,
}

/// Locates, creates and refreshes images for one suite.
pub struct ImageManager<'a> {
    settings: &'a Settings,
    prompter: &'a dyn Prompter,
    build_hook: Option<BuildHook<'a>>,
}

impl<'a> ImageManager<'a> {
    pub fn new(settings: &'a Settings, prompter: &'a dyn Prompter) -> Self {
        Self {
            settings,
            prompter,
            build_hook: None,
        }
    }

    /// Offer to build missing engines with `hook`.
    pub fn with_build_hook(mut self, hook: BuildHook<'a>) -> Self {
        self.build_hook = Some(hook);
        self
    }

    pub fn images_root(&self) -> Result<PathBuf> {
        self.settings.images_root()
    }

    pub fn image_path(&self, build: BuildKind) -> Result<PathBuf> {
        Ok(self.images_root()?.join(build.name()))
    }

    pub fn layout(&self, image_dir: &Path) -> ImageLayout {
        ImageLayout::new(image_dir, self.settings.platform.clone())
    }

    /// The image for the selector's build kind.
    pub fn image_dir(&self, selector: &mut ImageSelector, request: ImageRequest) -> Result<PathBuf> {
        let build = selector.build_kind();
        let image_dir = self.image_path(build)?;

        if request.create {
            if !image_dir.exists() {
                create_image(
                    self.settings.bootstrap_home()?,
                    &image_dir,
                    &self.settings.platform,
                    &self.settings.installer(),
                    &self.settings.suite_dir.join("build"),
                )?;
            }
        } else if !image_dir.exists() {
            if self.settings.images_dir.is_some() {
                info!("The selected JDK directory does not (yet) exist: {}", image_dir.display());
            }
            let (engine, _) = match request.check_engine {
                Some(engine) => (engine, build),
                None => selector.resolve(self.settings, self.prompter)?,
            };
            self.handle_missing(engine, build)?;
        }

        if request.deploy {
            self.deploy(selector, &image_dir)?;
        }

        if let Some(engine) = request.check_engine {
            self.check_engine_exists(engine, build, &image_dir)?;
        }
        Ok(image_dir)
    }

    /// Run a deployment pass over every image and refresh `image_dir`.
    pub fn deploy(&self, selector: &mut ImageSelector, image_dir: &Path) -> Result<usize> {
        let (engine, build) = selector.resolve(self.settings, self.prompter)?;
        let resolver = DistsDirResolver::new(&self.settings.artifact_dir);
        let ctx = DeployContext {
            platform: self.settings.platform.clone(),
            images_root: self.images_root()?,
            installer: self.settings.installer(),
            resolver: &resolver,
            engine,
            build,
            native_distribution: selector.bound_distribution(NATIVE_TEMPLATE).map(str::to_string),
        };
        let distributions: Vec<DeployedDistribution> = deploy::default_distributions();
        let count =
            deploy::deploy_all(&distributions, &ctx, image_dir, self.settings.revision.as_deref())?;
        if image_dir.exists() {
            sync_options_file(&self.settings.suite_dir, &self.layout(image_dir))?;
        }
        Ok(count)
    }

    /// Fail unless `engine` is registered in the image at `image_dir`.
    pub fn check_engine_exists(
        &self,
        engine: EngineVariant,
        build: BuildKind,
        image_dir: &Path,
    ) -> Result<()> {
        let registry_file = self.layout(image_dir).registry_file();
        if registry::is_known(&registry_file, engine.name())? {
            return Ok(());
        }
        self.handle_missing(engine, build)
    }

    fn handle_missing(&self, engine: EngineVariant, build: BuildKind) -> Result<()> {
        info!("The {} {} VM has not been created", build, engine);
        if let Some(hook) = self.build_hook {
            if self.prompter.is_interactive() && self.prompter.confirm("Build it now", true)? {
                return hook(engine, build);
            }
        }
        Err(ImageError::ImageMissing {
            engine: engine.name().to_string(),
            build: build.name().to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Os;
    use crate::prompt::{NonInteractive, Scripted};
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn bootstrap(root: &Path) -> PathBuf {
        let home = root.join("bootstrap");
        let lib = home.join("jre/lib/amd64");
        fs::create_dir_all(lib.join("server")).unwrap();
        fs::write(lib.join("server/libjvm.so"), b"jvm").unwrap();
        fs::write(lib.join("jvm.cfg"), "# header\n-server KNOWN\n-client IGNORE\n").unwrap();
        fs::write(home.join("release"), "JAVA_VERSION=\"1.8.0_60\"\n").unwrap();
        home
    }

    fn settings(root: &Path, home: &Path) -> Settings {
        let mut vars = BTreeMap::new();
        vars.insert("JAVA_HOME".to_string(), home.display().to_string());
        let mut s = Settings::from_vars(root, root.join(".vmimage/env"), vars);
        s.platform = Platform::new(Os::Linux, "amd64");
        s
    }

    #[test]
    fn test_build_kind_from_dir() {
        let root = Path::new("/suite/jdk1.8.0");
        assert_eq!(
            build_kind_from_dir(root, &root.join("fastdebug")).unwrap(),
            BuildKind::FastDebug
        );
        let err = build_kind_from_dir(root, &root.join("weird")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::UnknownBuildKind { .. })
        ));
    }

    #[test]
    fn test_create_image_refuses_existing_dir() {
        let dir = tempdir().unwrap();
        let home = bootstrap(dir.path());
        let err = create_image(
            &home,
            &home,
            &Platform::new(Os::Linux, "amd64"),
            &Installer::default(),
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_create_image_without_default_engine_fails() {
        let dir = tempdir().unwrap();
        let home = bootstrap(dir.path());
        fs::write(home.join("jre/lib/amd64/jvm.cfg"), "# nothing\n").unwrap();

        let err = create_image(
            &home,
            &dir.path().join("image"),
            &Platform::new(Os::Linux, "amd64"),
            &Installer::default(),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::NoDefaultEngine(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_keeps_symlinks() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/java"), b"x").unwrap();
        std::os::unix::fs::symlink("bin/java", src.join("java")).unwrap();

        copy_tree(&src, &dir.path().join("dst")).unwrap();

        let link = dir.path().join("dst/java");
        assert!(link.is_symlink());
        assert_eq!(fs::read_link(link).unwrap(), PathBuf::from("bin/java"));
    }

    #[test]
    fn test_sync_options_file() {
        let dir = tempdir().unwrap();
        let image = ImageLayout::new(dir.path().join("image"), Platform::new(Os::Linux, "amd64"));

        fs::write(dir.path().join("jvmci.options"), "a=1\n").unwrap();
        sync_options_file(dir.path(), &image).unwrap();
        assert_eq!(fs::read_to_string(image.options_file()).unwrap(), "a=1\n");

        fs::remove_file(dir.path().join("jvmci.options")).unwrap();
        sync_options_file(dir.path(), &image).unwrap();
        assert!(!image.options_file().exists());
    }

    #[test]
    fn test_missing_engine_non_interactive_names_build_command() {
        let dir = tempdir().unwrap();
        let home = bootstrap(dir.path());
        let s = settings(dir.path(), &home);
        let manager = ImageManager::new(&s, &NonInteractive);
        let mut selector = ImageSelector::new(Some(EngineVariant::Server), BuildKind::Product);

        let err = manager
            .image_dir(
                &mut selector,
                ImageRequest {
                    create: true,
                    deploy: false,
                    check_engine: Some(EngineVariant::Server),
                },
            )
            .unwrap_err();

        assert!(err
            .to_string()
            .contains("vmimage --vm server --vmbuild product build"));
        // The image itself was created.
        assert!(dir.path().join("jdk1.8.0_60/product/jre/lib/amd64/original").is_dir());
    }

    #[test]
    fn test_missing_image_runs_build_hook_when_confirmed() {
        let dir = tempdir().unwrap();
        let home = bootstrap(dir.path());
        let s = settings(dir.path(), &home);
        let prompter = Scripted::new(&[], &[true]);
        let built = Cell::new(None);
        let hook = |engine: EngineVariant, build: BuildKind| -> Result<()> {
            built.set(Some((engine, build)));
            Ok(())
        };
        let manager = ImageManager::new(&s, &prompter).with_build_hook(&hook);
        let mut selector = ImageSelector::new(Some(EngineVariant::Jvmci), BuildKind::Debug);

        manager
            .image_dir(&mut selector, ImageRequest::default())
            .unwrap();

        assert_eq!(built.get(), Some((EngineVariant::Jvmci, BuildKind::Debug)));
    }
}
