//! ffprep CLI
//!
//! Prepares FFmpeg for embedding: installs it through vcpkg, extracts the
//! matching source tree, copies the generated configuration headers and
//! generates `src/ffmpeg_crt.c` with `main` renamed to `ffmpeg_entry`.
//!
//! # Usage
//!
//! ```bash
//! # Check the host before the long install
//! ffprep preflight
//!
//! # Everything, skipping whatever is already done
//! ffprep prepare
//!
//! # vcpkg already ran; print the resolved paths as JSON
//! ffprep prepare --skip-install --json
//!
//! # Single stages
//! ffprep install
//! ffprep source
//!
//! # What exists and what to run next
//! ffprep status
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ffprep::config::{PrepConfig, PrepContext, VCPKG_ROOT_ENV};
use ffprep::error::exit_code_for;
use ffprep::pipeline::{Pipeline, PipelineReport, Stage};
use ffprep::preflight::{CacheStatus, PreflightChecker};

#[derive(Parser)]
#[command(name = "ffprep")]
#[command(author, version, about = "FFmpeg source preparation for embedding", long_about = None)]
struct Cli {
    /// Project root; vcpkg/, lib_sources/ and src/ live under it
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage, skipping what is already done
    Prepare {
        /// Do not touch vcpkg; its download cache and build tree must exist
        #[arg(long)]
        skip_install: bool,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Clone, bootstrap and install FFmpeg through vcpkg
    Install,

    /// Extract and verify the FFmpeg source tree
    Source,

    /// Check host tools, disk space and network
    Preflight,

    /// Show artifact status and next steps
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_for(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = if cli.root.is_absolute() {
        cli.root
    } else {
        std::env::current_dir()?.join(cli.root)
    };
    let ctx = PrepContext::for_host(PrepConfig::from_env(root));

    match cli.command {
        Commands::Prepare { skip_install, json } => cmd_prepare(&ctx, skip_install, json).await,
        Commands::Install => cmd_stage(&ctx, Stage::InstallToolkit, "ffprep source").await,
        Commands::Source => cmd_stage(&ctx, Stage::AcquireSource, "ffprep prepare --skip-install").await,
        Commands::Preflight => cmd_preflight(&ctx).await,
        Commands::Status => cmd_status(&ctx),
    }
}

async fn cmd_prepare(ctx: &PrepContext, skip_install: bool, json: bool) -> Result<()> {
    let pipeline = if skip_install {
        Pipeline::without_install(ctx)
    } else {
        Pipeline::full(ctx)
    };
    let start = Instant::now();

    if !json {
        println!("=== FFmpeg Source Preparation ({}) ===\n", ctx.platform);
    }

    let report = pipeline.run().await;

    if json {
        println!("{}", report.to_json()?);
        return report.into_result().map(|_| ());
    }

    println!();
    report.print_steps();
    let summary = finish(report)?;

    let total = start.elapsed().as_secs_f64();
    if total >= 60.0 {
        println!("\n=== Preparation Complete ({:.1}m) ===", total / 60.0);
    } else {
        println!("\n=== Preparation Complete ({:.1}s) ===", total);
    }
    summary.print();

    Ok(())
}

async fn cmd_stage(ctx: &PrepContext, stage: Stage, next: &str) -> Result<()> {
    println!("=== {} ({}) ===\n", stage.description(), ctx.platform);

    let report = Pipeline::with_stages(ctx, vec![stage]).run().await;
    println!();
    report.print_steps();
    finish(report)?;

    println!("\nNext: {}", next);
    Ok(())
}

fn finish(report: PipelineReport) -> Result<ffprep::pipeline::BuildSummary> {
    if let Some(failed) = report.steps.iter().find(|s| s.error.is_some()) {
        println!(
            "\nStopped at step {}/{}; rerun to resume from there.",
            failed.order,
            report.steps.len()
        );
    }
    report.into_result()
}

async fn cmd_preflight(ctx: &PrepContext) -> Result<()> {
    let report = PreflightChecker::new(ctx).run_all().await;
    report.print_summary();

    if !report.is_ok() {
        bail!(
            "{} preflight check(s) failed",
            report.errors().len()
        );
    }
    Ok(())
}

fn cmd_status(ctx: &PrepContext) -> Result<()> {
    let config = &ctx.config;
    let cache = CacheStatus::inspect(ctx);
    let found = |b: bool| if b { "FOUND" } else { "NOT FOUND" };

    println!("ffprep Status");
    println!("=============");
    println!();
    println!("Configuration:");
    println!("  Platform:     {}", ctx.platform);
    println!("  Triplet:      {}", ctx.triplet());
    println!("  Project root: {}", config.project_root.display());
    println!("  vcpkg root:   {}", config.vcpkg_root.display());
    if std::env::var_os(VCPKG_ROOT_ENV).is_some() {
        println!("                (from {})", VCPKG_ROOT_ENV);
    }
    if !ctx.toolchain.is_empty() {
        for dir in &ctx.toolchain.path_prepend {
            println!("  Toolchain:    {}", dir.display());
        }
    }
    println!();

    println!("Dependencies (managed by vcpkg):");
    println!("  vcpkg checkout:  {}", found(cache.vcpkg_cloned));
    println!("  vcpkg binary:    {}", found(cache.vcpkg_bootstrapped));
    if cache.toolkit_installed {
        println!("  FFmpeg libs:     FOUND at {}", ctx.lib_dir().display());
    } else {
        println!("  FFmpeg libs:     NOT FOUND (run 'ffprep install')");
    }
    println!("  Source archive:  {}", found(cache.archive_cached));
    println!();

    println!("Prepared Sources:");
    if cache.source_verified {
        println!("  Source tree:     VERIFIED at {}", config.source_root.display());
    } else if config.source_root.exists() {
        println!("  Source tree:     INCOMPLETE (run 'ffprep source' to extract again)");
    } else {
        println!("  Source tree:     NOT EXTRACTED");
    }
    println!("  Config headers:  {}", found(cache.config_synced));
    if cache.entry_generated {
        println!("  Entry source:    GENERATED at {}", config.entry_output.display());
    } else {
        println!("  Entry source:    NOT GENERATED");
    }
    println!();

    println!("Next steps:");
    match cache.next_command() {
        Some(cmd) => println!("  1. Run '{}'", cmd),
        None => println!("  Sources ready. Build the host with the paths above."),
    }

    Ok(())
}
