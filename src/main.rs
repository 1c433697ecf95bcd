//! VM image builder CLI
//!
//! Maintains runtime images derived from a bootstrap JDK and deploys engine
//! artifacts into them.
//!
//! # Usage
//!
//! ```bash
//! # Show prerequisites and existing images
//! vmimage status
//!
//! # Create the fastdebug image from $JAVA_HOME
//! vmimage --vmbuild fastdebug create
//!
//! # Build the jvmci engine and deploy it
//! vmimage --vm jvmci build
//!
//! # Build every engine/build pair, one log file per pair
//! vmimage build-all --vms server,jvmci --builds product,fastdebug
//!
//! # Print the image directory for the selected engine
//! vmimage --vm jvmci home
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vmimage::build::{self, vars, BuildAllOptions, BuildState, VariantBuildTask};
use vmimage::deploy;
use vmimage::image::{ImageManager, ImageRequest};
use vmimage::layout::ImageLayout;
use vmimage::preflight::PreflightChecker;
use vmimage::prompt::{Prompter, TerminalPrompter};
use vmimage::services::{self, ServiceMerger};
use vmimage::{BuildKind, EngineVariant, ImageSelector, Settings};

#[derive(Parser)]
#[command(name = "vmimage")]
#[command(author, version, about = "VM image builder", long_about = None)]
struct Cli {
    /// Engine variant to use (defaults to DEFAULT_VM)
    #[arg(long, global = true)]
    vm: Option<String>,

    /// Build kind of the image
    #[arg(long, global = true, default_value = "product")]
    vmbuild: String,

    /// Suite checkout to operate on
    #[arg(long, global = true, env = "VMIMAGE_SUITE", default_value = ".")]
    suite: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the image for the selected build kind
    Create {
        /// Also deploy built artifacts into it
        #[arg(long)]
        deploy: bool,
    },

    /// Deploy built artifacts into every image
    Deploy,

    /// Report service files no deployed bundle declares
    CheckServices,

    /// Build the selected engine and deploy it
    Build {
        /// Build variable, may be repeated
        #[arg(short = 'D', value_name = "NAME=VALUE")]
        define: Vec<String>,

        /// Build even if the output is up to date
        #[arg(long)]
        force: bool,
    },

    /// Build several engine variants in sequence
    BuildAll {
        /// Engines to build
        #[arg(long, value_delimiter = ',', default_value = "server,jvmci")]
        vms: Vec<String>,

        /// Build kinds to build
        #[arg(long, value_delimiter = ',', default_value = "product,fastdebug,debug,optimized")]
        builds: Vec<String>,

        /// Skip running the built engines
        #[arg(short = 'n', long)]
        no_check: bool,

        /// Build in this process with output on the console
        #[arg(short, long)]
        console: bool,
    },

    /// Describe the variables that can be set for the native build
    Buildvars,

    /// Print the directory of the selected image
    Home,

    /// Show prerequisites and image status
    Status,

    /// Remove native build outputs and all images
    Clean,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(&cli.suite)?;
    settings.verbose = cli.verbose;

    let engine = cli.vm.as_deref().map(EngineVariant::resolve).transpose()?;
    let build: BuildKind = cli.vmbuild.parse()?;
    let mut selector = ImageSelector::new(engine, build);
    let prompter = TerminalPrompter::default();

    match cli.command {
        Commands::Create { deploy } => cmd_create(&settings, &prompter, &mut selector, deploy),
        Commands::Deploy => cmd_deploy(&settings, &prompter, &mut selector),
        Commands::CheckServices => cmd_check_services(&settings, &prompter),
        Commands::Build { define, force } => {
            cmd_build(&settings, &prompter, &mut selector, &define, force)
        }
        Commands::BuildAll {
            vms,
            builds,
            no_check,
            console,
        } => cmd_build_all(&settings, &prompter, &vms, &builds, no_check, console),
        Commands::Buildvars => cmd_buildvars(&settings),
        Commands::Home => cmd_home(&settings, &prompter, &mut selector),
        Commands::Status => cmd_status(&settings),
        Commands::Clean => cmd_clean(&settings, &selector),
    }
}

fn cmd_create(
    settings: &Settings,
    prompter: &dyn Prompter,
    selector: &mut ImageSelector,
    deploy: bool,
) -> Result<()> {
    let manager = ImageManager::new(settings, prompter);
    let image = manager.image_dir(
        selector,
        ImageRequest {
            create: true,
            deploy,
            check_engine: None,
        },
    )?;
    println!("{}", image.display());
    Ok(())
}

fn cmd_deploy(settings: &Settings, prompter: &dyn Prompter, selector: &mut ImageSelector) -> Result<()> {
    let manager = ImageManager::new(settings, prompter);
    let image = manager.image_path(selector.build_kind())?;
    let count = manager.deploy(selector, &image)?;
    println!("Deployed {} artifact(s)", count);
    Ok(())
}

fn cmd_check_services(settings: &Settings, prompter: &dyn Prompter) -> Result<()> {
    let merger = ServiceMerger::new(settings.installer());
    let mut obsolete = 0;
    for image_dir in deploy::image_dirs(&settings.images_root()?)? {
        let image = ImageLayout::new(&image_dir, settings.platform.clone());
        let bundles = deploy::engine_bundles(&image)?;
        let remaining = services::check_obsolete(&merger, &bundles, &image.services_dir(), prompter)?;
        for name in &remaining {
            println!("  {}", image.services_dir().join(name).display());
        }
        obsolete += remaining.len();
    }
    if obsolete == 0 {
        println!("No obsolete service files");
    }
    Ok(())
}

/// Build one pair, then make sure its image exists and carries it.
fn build_and_deploy(
    settings: &Settings,
    prompter: &dyn Prompter,
    selector: &mut ImageSelector,
    engine: EngineVariant,
    build: BuildKind,
    overrides: &[(String, String)],
    force: bool,
) -> Result<()> {
    let mut task = VariantBuildTask::new(settings, engine, build).with_overrides(overrides.to_vec());
    let state = task.run(force)?.clone();
    if let BuildState::Skipped { reason } = &state {
        if engine != EngineVariant::Original {
            println!("[SKIP] {}", reason);
            return Ok(());
        }
    }

    let mut scoped = selector.scoped(engine, build);
    let manager = ImageManager::new(settings, prompter);
    manager.image_dir(
        &mut scoped,
        ImageRequest {
            create: true,
            deploy: true,
            check_engine: Some(engine),
        },
    )?;
    Ok(())
}

fn cmd_build(
    settings: &Settings,
    prompter: &dyn Prompter,
    selector: &mut ImageSelector,
    define: &[String],
    force: bool,
) -> Result<()> {
    let overrides = define
        .iter()
        .map(|d| vars::parse_override(d))
        .collect::<Result<Vec<_>>>()?;
    let (engine, build) = selector.resolve(settings, prompter)?;
    build_and_deploy(settings, prompter, selector, engine, build, &overrides, force)
}

fn cmd_build_all(
    settings: &Settings,
    prompter: &dyn Prompter,
    vms: &[String],
    builds: &[String],
    no_check: bool,
    console: bool,
) -> Result<()> {
    let options = BuildAllOptions {
        engines: vms
            .iter()
            .map(|v| EngineVariant::resolve(v))
            .collect::<Result<_>>()?,
        builds: builds.iter().map(|b| b.parse::<BuildKind>()).collect::<Result<_>>()?,
        console,
        no_check,
    };
    build::build_all(settings, &options, &|engine, build| {
        let mut selector = ImageSelector::new(Some(engine), build);
        build_and_deploy(settings, prompter, &mut selector, engine, build, &[], false)
    })
}

fn cmd_buildvars(settings: &Settings) -> Result<()> {
    let bootdir = settings
        .bootstrap_home
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "$JAVA_HOME".to_string());
    let jobs = vars::default_jobs().to_string();

    println!("build variables that can be set by the -D option to \"vmimage build\":");
    println!();
    for (name, description) in vars::BUILD_VARIABLES {
        let default = match *name {
            "ALT_BOOTDIR" => Some(bootdir.as_str()),
            "HOTSPOT_BUILD_JOBS" => Some(jobs.as_str()),
            _ => None,
        };
        match default {
            Some(d) => println!("    {:<21} {} (default: {})", name, description, d),
            None => println!("    {:<21} {}", name, description),
        }
    }
    println!();
    println!(
        "These variables can also be set in {} to persist them.",
        settings.env_file.display()
    );
    Ok(())
}

fn cmd_home(settings: &Settings, prompter: &dyn Prompter, selector: &mut ImageSelector) -> Result<()> {
    let (engine, _) = selector.resolve(settings, prompter)?;
    let hook = |engine: EngineVariant, build: BuildKind| {
        let mut selector = ImageSelector::new(Some(engine), build);
        build_and_deploy(settings, prompter, &mut selector, engine, build, &[], false)
    };
    let manager = ImageManager::new(settings, prompter).with_build_hook(&hook);
    let image = manager.image_dir(
        selector,
        ImageRequest {
            check_engine: Some(engine),
            ..Default::default()
        },
    )?;
    println!("{}", image.display());
    Ok(())
}

fn cmd_status(settings: &Settings) -> Result<()> {
    println!("VM Image Builder Status");
    println!("=======================");
    println!();
    println!("Configuration:");
    println!("  Suite:        {}", settings.suite_dir.display());
    println!("  Env file:     {}", settings.env_file.display());
    println!("  Platform:     {} {}", settings.platform.os, settings.platform.arch);
    println!(
        "  Default VM:   {}",
        settings.default_vm.as_deref().unwrap_or("(not set)")
    );
    println!("  Artifacts:    {}", settings.artifact_dir.display());
    println!(
        "  Install mode: {}",
        if settings.installer().links() { "symlink" } else { "copy" }
    );
    println!();

    let report = PreflightChecker::new(settings).run_all();
    report.print_summary();
    Ok(())
}

fn cmd_clean(settings: &Settings, selector: &ImageSelector) -> Result<()> {
    let engine = selector.pinned_engine().unwrap_or(EngineVariant::Server);
    VariantBuildTask::new(settings, engine, selector.build_kind()).clean(false)
}
