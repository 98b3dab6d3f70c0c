use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use nesium_smoke::{DEFAULT_EXISTING_CSV, DEFAULT_OUT_CSV, SmokeConfig, SmokeOptions, run_smoke};

/// Headless runtime smoke test for NES emulator cores
#[derive(Parser, Debug)]
#[command(name = "nesium-smoke")]
#[command(about = "Run every ROM in a corpus through an emulator core and report runtime signals", long_about = None)]
struct Args {
    /// Directory scanned recursively for .nes files
    rom_dir: PathBuf,

    /// Report to (re)write
    #[arg(long, default_value = DEFAULT_OUT_CSV)]
    out_csv: PathBuf,

    /// Prior report to carry manual columns from
    #[arg(long, default_value = DEFAULT_EXISTING_CSV)]
    existing_csv: PathBuf,

    /// Frames per ROM [default: 120]
    #[arg(long)]
    frames: Option<u32>,

    /// Per-ROM timeout in seconds [default: 20]
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Cargo used to build the harness [default: $CARGO or cargo]
    #[arg(long)]
    cargo: Option<PathBuf>,

    /// Directory containing the emulator core's Cargo.toml [default: .]
    #[arg(long)]
    core_dir: Option<PathBuf>,

    /// Core package name (read from its Cargo.toml when omitted)
    #[arg(long)]
    core_package: Option<String>,

    /// Type implementing nesium_probe::EmulatorCore [default: <crate>::SmokeCore]
    #[arg(long)]
    core_type: Option<String>,

    /// Concurrent harness processes [default: 1]
    #[arg(short, long)]
    jobs: Option<usize>,

    /// TOML config file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write a Markdown summary here
    #[arg(long)]
    summary_md: Option<PathBuf>,

    /// Only inventory headers; nothing is built or executed
    #[arg(long)]
    inventory_only: bool,

    /// Prebuilt harness executable to use instead of building one
    #[arg(long)]
    harness: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn config(&self) -> anyhow::Result<SmokeConfig> {
        let mut config = match &self.config {
            Some(path) => SmokeConfig::load(path)?,
            None => SmokeConfig::default(),
        };

        if let Some(frames) = self.frames {
            config.frames = frames;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(cargo) = &self.cargo {
            config.cargo = cargo.clone();
        }
        if let Some(dir) = &self.core_dir {
            config.core.manifest_dir = dir.clone();
        }
        if let Some(package) = &self.core_package {
            config.core.package = Some(package.clone());
        }
        if let Some(type_path) = &self.core_type {
            config.core.type_path = Some(type_path.clone());
        }
        Ok(config)
    }

    fn options(&self) -> SmokeOptions {
        SmokeOptions {
            rom_dir: self.rom_dir.clone(),
            out_csv: self.out_csv.clone(),
            existing_csv: self.existing_csv.clone(),
            summary_md: self.summary_md.clone(),
            inventory_only: self.inventory_only,
            harness: self.harness.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.config()?;
    let options = args.options();
    let rows = run_smoke(&options, &config)
        .with_context(|| format!("smoke run over {} failed", options.rom_dir.display()))?;

    println!(
        "Wrote runtime matrix for {} ROMs -> {}",
        rows.len(),
        options.out_csv.display()
    );
    Ok(())
}
