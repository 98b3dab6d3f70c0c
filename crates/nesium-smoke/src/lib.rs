//! Runtime smoke testing of NES emulator cores across a ROM corpus.
//!
//! A run scans a directory of iNES images, builds one harness executable that
//! links the core under test, runs every supported ROM through it for a fixed
//! frame budget and writes a CSV report. Manual columns from the previous report
//! are carried forward so the file can be re-generated at any time.

pub mod batch;
pub mod config;
pub mod corpus;
pub mod error;
pub mod harness;
pub mod header;
pub mod report;
pub mod runner;
pub mod signal;
pub mod summary;

use std::path::PathBuf;

use tracing::info;

pub use config::SmokeConfig;
pub use error::SmokeError as Error;

use batch::run_batch;
use corpus::Corpus;
use harness::{Harness, HarnessBuilder};
use report::{ManualAnnotations, ReportRow, merge, write_report};
use runner::RomRunner;
use signal::RuntimeSignal;
use summary::write_summary;

pub const DEFAULT_OUT_CSV: &str = "tests/rom_runtime_matrix.csv";
pub const DEFAULT_EXISTING_CSV: &str = "tests/rom_matrix.csv";

/// Inputs and outputs of one invocation.
#[derive(Debug, Clone)]
pub struct SmokeOptions {
    pub rom_dir: PathBuf,
    pub out_csv: PathBuf,
    /// Prior report whose manual columns are carried forward.
    pub existing_csv: PathBuf,
    pub summary_md: Option<PathBuf>,
    /// Record every ROM as `not_run` without building or running anything.
    pub inventory_only: bool,
    /// Use this harness executable instead of building one.
    pub harness: Option<PathBuf>,
}

impl SmokeOptions {
    pub fn new(rom_dir: impl Into<PathBuf>) -> Self {
        Self {
            rom_dir: rom_dir.into(),
            out_csv: PathBuf::from(DEFAULT_OUT_CSV),
            existing_csv: PathBuf::from(DEFAULT_EXISTING_CSV),
            summary_md: None,
            inventory_only: false,
            harness: None,
        }
    }
}

/// Runs the whole pipeline and returns the rows that were written.
///
/// Only corpus, build, config and report failures are errors. Anything that goes
/// wrong with an individual ROM ends up in that ROM's row.
pub fn run_smoke(options: &SmokeOptions, config: &SmokeConfig) -> Result<Vec<ReportRow>, Error> {
    let corpus = Corpus::scan(&options.rom_dir)?.require_roms()?;
    let eligible = corpus.eligible(&config.supported_mappers).count();
    let roms = corpus.into_roms();
    info!(
        "found {} ROM(s) under {}, {eligible} with mapper {}",
        roms.len(),
        options.rom_dir.display(),
        config.supported_mappers
    );

    let manual = ManualAnnotations::load(&options.existing_csv)?;

    let signals = if options.inventory_only {
        info!("inventory only, skipping harness build");
        vec![RuntimeSignal::not_run(); roms.len()]
    } else {
        let harness = match &options.harness {
            Some(path) => Harness::prebuilt(path),
            None => HarnessBuilder::from_config(config).build()?,
        };
        let runner = RomRunner::from_config(harness.path(), config);
        info!(
            "running {eligible} ROM(s) for {} frames on {} worker(s)",
            config.frames,
            config.workers()
        );
        run_batch(&roms, config.workers(), |rom| runner.run(rom))
    };

    let rows = merge(&roms, &signals, &manual, &config.supported_mappers);
    write_report(&options.out_csv, &rows)?;
    if let Some(path) = &options.summary_md {
        write_summary(path, &rows, &config.supported_mappers)?;
        info!("wrote summary -> {}", path.display());
    }
    Ok(rows)
}
