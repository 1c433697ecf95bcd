//! Building one engine variant with the native toolchain.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::debug_shell::{self, ShellCommand};
use super::vars::{self, BuildVars};
use crate::config::Settings;
use crate::deploy::native::relocation_table;
use crate::deploy::resolve::{instantiate, ArtifactResolver, DistsDirResolver, NATIVE_TEMPLATE};
use crate::install::FILE_MODE;
use crate::layout::Os;
use crate::process::{self, Cmd};
use crate::rebuild;
use crate::vm::{BuildKind, EngineVariant};

/// Progress of a [`VariantBuildTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    NotStarted,
    NeedsBuild { reason: String },
    Building,
    Succeeded,
    Failed { reason: String },
    /// The pair cannot be built here. Terminal, but not an error.
    Skipped { reason: String },
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Succeeded | BuildState::Failed { .. } | BuildState::Skipped { .. }
        )
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::NotStarted => f.write_str("not started"),
            BuildState::NeedsBuild { reason } => write!(f, "needs build ({})", reason),
            BuildState::Building => f.write_str("building"),
            BuildState::Succeeded => f.write_str("succeeded"),
            BuildState::Failed { reason } => write!(f, "failed ({})", reason),
            BuildState::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Subtrees of the suite holding the native sources.
const SOURCE_DIRS: &[&str] = &["src", "make", "jvmci/jdk.vm.ci.hotspot/src_gen/hotspot"];
/// Excluded from the staleness scan.
const EXCLUDED_SOURCE_DIR: &str = "src/share/tools";

/// Builds one (engine, build kind) pair.
pub struct VariantBuildTask<'a> {
    settings: &'a Settings,
    engine: EngineVariant,
    build: BuildKind,
    overrides: Vec<(String, String)>,
    jobs: usize,
    state: BuildState,
}

impl<'a> VariantBuildTask<'a> {
    pub fn new(settings: &'a Settings, engine: EngineVariant, build: BuildKind) -> Self {
        Self {
            settings,
            engine,
            build,
            overrides: Vec::new(),
            jobs: vars::default_jobs(),
            state: BuildState::NotStarted,
        }
    }

    /// Explicit `NAME=value` build variables.
    pub fn with_overrides(mut self, overrides: Vec<(String, String)>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn engine(&self) -> EngineVariant {
        self.engine
    }

    pub fn build_kind(&self) -> BuildKind {
        self.build
    }

    /// Where the toolchain writes this pair's binaries.
    pub fn output_dir(&self) -> PathBuf {
        let platform = &self.settings.platform;
        let hsos = platform.os.toolchain_name();
        let build_dir = if self.engine.includes_jvmci() {
            "build"
        } else {
            "build-nojvmci"
        };
        self.settings
            .suite_dir
            .join(build_dir)
            .join(hsos)
            .join(format!(
                "{}_{}_{}",
                hsos,
                platform.arch,
                self.engine.toolchain_variant()
            ))
            .join(self.build.name())
    }

    /// Why this pair cannot be built on this platform, if it cannot.
    pub fn build_forbidden(&mut self) -> Option<String> {
        let reason = if self.engine == EngineVariant::Original {
            if self.build != BuildKind::Product {
                info!("only product build of original VM exists");
            }
            Some(format!("the {} VM is not built from source", self.engine))
        } else if !self.engine.is_supported_on(&self.settings.platform) {
            info!(
                "The {} VM is not supported on this platform - skipping",
                self.engine
            );
            Some(format!(
                "the {} VM is not supported on {}",
                self.engine, self.settings.platform.os
            ))
        } else {
            None
        };
        if let Some(reason) = &reason {
            self.state = BuildState::Skipped {
                reason: reason.clone(),
            };
        }
        reason
    }

    /// Check whether the output is missing or older than any source file.
    ///
    /// Returns the reason a build is needed.
    pub fn needs_build(&mut self) -> Option<String> {
        let reason = self.staleness();
        match &reason {
            Some(reason) => {
                self.state = BuildState::NeedsBuild {
                    reason: reason.clone(),
                }
            }
            None => self.state = BuildState::Succeeded,
        }
        reason
    }

    fn staleness(&self) -> Option<String> {
        let output = self.output_dir();
        let newest = match rebuild::newest_file(&output) {
            Some(stamp) => stamp,
            None => return Some(format!("{} does not exist", output.display())),
        };
        let suite = &self.settings.suite_dir;
        let roots: Vec<PathBuf> = SOURCE_DIRS.iter().map(|d| suite.join(d)).collect();
        let excluded = [suite.join(EXCLUDED_SOURCE_DIR)];
        rebuild::first_newer(&roots, &excluded, newest.modified).map(|source| {
            format!("{} is newer than {}", source.display(), newest.path.display())
        })
    }

    /// Build variables for this pair.
    pub fn build_vars(&self) -> Result<BuildVars> {
        vars::compute(self.settings, self.engine, &self.overrides, self.jobs)
    }

    /// Make target: the build kind plus the engine's suffix.
    pub fn make_target(&self) -> Result<String> {
        match self.engine.target_suffix() {
            Some(suffix) => Ok(format!("{}{}", self.build, suffix)),
            None => bail!("the {} VM has no make target", self.engine),
        }
    }

    /// The toolchain invocation, with environment adjustments applied.
    pub fn make_command(&self) -> Result<Cmd> {
        let vars = self.build_vars()?;
        let mut cmd = Cmd::new(make_tool()?);
        if self.settings.var("LANG").is_none() {
            cmd = cmd.env("LANG", "C");
        }
        cmd = cmd
            .env_remove("CLASSPATH")
            .args(vars.to_args())
            .arg("-C")
            .arg_path(&self.settings.suite_dir.join("make"))
            .arg(self.make_target()?)
            .arg("docs")
            .error_msg(format!(
                "Building the {} {} VM failed",
                self.build, self.engine
            ));
        Ok(cmd)
    }

    /// Skip, check staleness, then build and package as needed.
    pub fn run(&mut self, force: bool) -> Result<&BuildState> {
        if self.build_forbidden().is_some() {
            return Ok(&self.state);
        }
        let reason = if force {
            Some("rebuild requested".to_string())
        } else {
            self.needs_build()
        };
        match reason {
            Some(reason) => {
                info!("Building the {} {} VM: {}", self.build, self.engine, reason);
                self.state = BuildState::NeedsBuild { reason };
                self.build()?;
                self.package()?;
            }
            None => info!("The {} {} VM is up to date", self.build, self.engine),
        }
        Ok(&self.state)
    }

    /// Invoke the toolchain. A non-zero exit fails the whole operation.
    pub fn build(&mut self) -> Result<()> {
        self.state = BuildState::Building;
        let result = if self.settings.platform.os == Os::Windows {
            self.build_windows()
        } else {
            self.build_make()
        };
        self.state = match &result {
            Ok(()) => BuildState::Succeeded,
            Err(e) => BuildState::Failed {
                reason: format!("{:#}", e),
            },
        };
        result
    }

    fn build_make(&self) -> Result<()> {
        let cmd = self.make_command()?;
        info!("--------------- make command line ----------------------");
        info!("{}", cmd.display());
        cmd.run_filtering_stderr(|line| !line.contains("Xusage.txt"))?;
        Ok(())
    }

    fn build_windows(&self) -> Result<()> {
        let suite = self.settings.suite_dir.display().to_string();
        let log = self.settings.suite_dir.join("vmimageCompile.log");
        let mks_home = self.settings.var("MKS_HOME").unwrap_or("C:\\cygwin\\bin");
        let jdk = self.settings.bootstrap_home()?.display().to_string();

        // Every build starts from a cleaned project; a failed clean is not fatal.
        let clean = ShellCommand::new(self.msbuild_command(Some("clean")), suite.clone());
        if !debug_shell::run(self.settings, &clean, None)? {
            warn!("Cleaning the {} {} project failed", self.build, self.engine);
        }

        let create = format!(
            "set HotSpotMksHome={}& set JAVA_HOME={}& set path=%JAVA_HOME%\\bin;%path%;%HotSpotMksHome%& \
             cd /D \"{}\\make\\windows\"& call create.bat {}",
            mks_home, jdk, suite, suite
        );
        info!("{}", create);
        let create = ShellCommand::new(create, suite.clone())
            .success_when(Regex::new(r"^Writing \.vcxproj file:")?);
        if !debug_shell::run(self.settings, &create, Some(&log))? {
            bail!("Error executing create command (see {})", log.display());
        }

        let msbuild = ShellCommand::new(self.msbuild_command(None), suite);
        if !debug_shell::run(self.settings, &msbuild, Some(&log))? {
            bail!("Error building project (see {})", log.display());
        }
        Ok(())
    }

    /// `msbuild` invocation for the engine project, optionally for `target`.
    pub fn msbuild_command(&self, target: Option<&str>) -> String {
        let project = format!(
            "{}\\build\\vs-amd64\\jvm.vcxproj",
            self.settings.suite_dir.display()
        );
        let config = format!("{}_{}", self.engine.toolchain_variant(), self.build);
        match target {
            Some(target) => format!(
                "msbuild {} /p:Configuration={} /p:Platform=x64 /target:{}",
                project, config, target
            ),
            None => format!("msbuild {} /p:Configuration={} /p:Platform=x64", project, config),
        }
    }

    /// Artifact the native bundle is packaged into.
    pub fn bundle_path(&self) -> PathBuf {
        DistsDirResolver::new(&self.settings.artifact_dir).artifact_path(
            &instantiate(NATIVE_TEMPLATE, self.engine, self.build),
            "tar",
        )
    }

    /// Package the relocatable build outputs into the native bundle.
    ///
    /// Outputs that were not produced are left out of the bundle.
    pub fn package(&self) -> Result<PathBuf> {
        let output = self.output_dir();
        // Headers and the SA jar are generated next to the per-build directories.
        let generated = output
            .parent()
            .map(|p| p.join("generated"))
            .unwrap_or_else(|| output.join("generated"));
        let table = relocation_table(&self.settings.platform, self.engine.name());

        let mut builder = tar::Builder::new(Vec::new());
        let mut packed = 0;
        for (name, _) in &table {
            let Some(path) = find_named(&[&output, &generated], name) else {
                continue;
            };
            builder
                .append_path_with_name(&path, name)
                .with_context(|| format!("packaging {}", path.display()))?;
            packed += 1;
        }
        let bytes = builder.into_inner()?;

        let bundle = self.bundle_path();
        let dir = bundle
            .parent()
            .context("bundle path has no parent directory")?;
        let file_name = bundle
            .file_name()
            .context("bundle path has no file name")?
            .to_string_lossy()
            .into_owned();
        crate::install::Installer::default().install_bytes(&bytes, dir, &file_name, FILE_MODE)?;
        info!("Packaged {} files into {}", packed, bundle.display());
        Ok(bundle)
    }

    /// Remove build outputs and the images root.
    ///
    /// A clean preceding an incremental build does nothing.
    pub fn clean(&self, for_build: bool) -> Result<()> {
        if for_build {
            return Ok(());
        }
        let bootdir = self.settings.bootstrap_home()?.display().to_string();
        let make_dir = self.settings.suite_dir.join("make");
        let tool = make_tool()?;
        let base = || {
            Cmd::new(&tool)
                .arg("ARCH_DATA_MODEL=64")
                .arg(format!("ALT_BOOTDIR={}", bootdir))
                .dir(&make_dir)
        };
        base().arg("clean").error_msg("make clean failed").run_interactive()?;
        let nojvmci = vars::nojvmci_output_dir(self.settings);
        base()
            .arg(format!("ALT_OUTPUTDIR={}", nojvmci.display()))
            .arg("clean")
            .error_msg("make clean failed")
            .run_interactive()?;

        let images_root = self.settings.images_root()?;
        if images_root.exists() {
            info!("Deleting {}", images_root.display());
            fs::remove_dir_all(&images_root)
                .with_context(|| format!("removing {}", images_root.display()))?;
        }
        Ok(())
    }
}

/// GNU make under the name the host installs it as.
pub fn make_tool() -> Result<String> {
    if process::exists("gmake") {
        return Ok("gmake".to_string());
    }
    process::ensure_exists("make", "building the native engine")?;
    Ok("make".to_string())
}

fn find_named(roots: &[&Path], name: &str) -> Option<PathBuf> {
    roots.iter().filter(|r| r.is_dir()).find_map(|root| {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == name)
            .map(|e| e.into_path())
    })
}
