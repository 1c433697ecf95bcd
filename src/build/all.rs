//! Building several engine variants in sequence.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Settings;
use crate::process::Cmd;
use crate::vm::{BuildKind, EngineVariant};

/// Which pairs to build and how.
#[derive(Debug, Clone)]
pub struct BuildAllOptions {
    pub engines: Vec<EngineVariant>,
    pub builds: Vec<BuildKind>,
    /// Build in this process with output on the console instead of per-pair logs.
    pub console: bool,
    /// Skip running `java -version` on each built engine.
    pub no_check: bool,
}

impl Default for BuildAllOptions {
    fn default() -> Self {
        Self {
            engines: vec![EngineVariant::Server, EngineVariant::Jvmci],
            builds: BuildKind::ALL.to_vec(),
            console: false,
            no_check: false,
        }
    }
}

/// Pairs `options` selects that can be built on this platform, in order.
pub fn buildable_pairs(settings: &Settings, options: &BuildAllOptions) -> Vec<(EngineVariant, BuildKind)> {
    let mut pairs = Vec::new();
    for &engine in &options.engines {
        if !engine.is_supported_on(&settings.platform) {
            info!(
                "The {} VM is not supported on this platform - skipping",
                engine
            );
            continue;
        }
        for &build in &options.builds {
            if engine == EngineVariant::Original && build != BuildKind::Product {
                continue;
            }
            pairs.push((engine, build));
        }
    }
    pairs
}

/// Log file of one pair's build.
pub fn log_file(settings: &Settings, engine: EngineVariant, build: BuildKind) -> PathBuf {
    settings
        .suite_dir
        .join(format!("{}-{}.log", engine, build))
}

/// Build every selected pair.
///
/// Without `console`, each pair is built by running this program again with
/// `--vm E --vmbuild B build`. With it, `build_in_process` is called instead.
pub fn build_all(
    settings: &Settings,
    options: &BuildAllOptions,
    build_in_process: &dyn Fn(EngineVariant, BuildKind) -> Result<()>,
) -> Result<()> {
    let exe = std::env::current_exe().context("locating the vmimage executable")?;
    let all_start = Instant::now();

    for (engine, build) in buildable_pairs(settings, options) {
        let start = Instant::now();
        if options.console {
            build_in_process(engine, build)?;
        } else {
            let log = log_file(settings, engine, build);
            info!("BEGIN: {}-{}\t(see: {})", engine, build, log.display());
            let mut cmd = Cmd::new(&exe);
            if settings.verbose {
                cmd = cmd.arg("-v");
            }
            cmd.args(["--vm", engine.name(), "--vmbuild", build.name(), "build"])
                .dir(&settings.suite_dir)
                .error_msg(format!("Building {}-{} failed (see {})", engine, build, log.display()))
                .run_logged(&log)?;
            info!(
                "END:   {}-{}\t[{}]",
                engine,
                build,
                format_duration(start.elapsed())
            );
        }

        if !options.no_check {
            check_engine(settings, engine, build)?;
        }
    }
    info!("TOTAL TIME:   [{}]", format_duration(all_start.elapsed()));
    Ok(())
}

/// Run `java -<engine> -version` in the built image.
fn check_engine(settings: &Settings, engine: EngineVariant, build: BuildKind) -> Result<()> {
    let java = settings
        .images_root()?
        .join(build.name())
        .join("bin")
        .join(if cfg!(windows) { "java.exe" } else { "java" });
    let mut cmd = Cmd::new(java).arg(format!("-{}", engine));
    if engine == EngineVariant::Jvmci {
        cmd = cmd.arg("-XX:-BootstrapJVMCI");
    }
    cmd.arg("-version")
        .error_msg(format!("The {} {} VM does not start", build, engine))
        .run()?;
    Ok(())
}

/// `H:MM:SS`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
