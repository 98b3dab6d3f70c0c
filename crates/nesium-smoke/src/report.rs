//! Runtime matrix report.
//!
//! The report is a CSV file with one row per ROM. Machine columns (`auto_*` and
//! the header fields) are recomputed every run. The four manual columns are owned
//! by humans: they are read from the prior report and written back untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::SupportedMappers;
use crate::error::ReportError;
use crate::header::RomEntry;
use crate::signal::RuntimeSignal;

/// Report columns, in file order.
pub const COLUMNS: [&str; 17] = [
    "rom",
    "mapper",
    "supported_now",
    "prg_banks_16k",
    "chr_banks_8k",
    "mirroring",
    "auto_boot",
    "auto_title_stable",
    "auto_input_ok",
    "auto_jammed",
    "auto_changed_frames",
    "auto_unique_hashes",
    "auto_notes",
    "boot",
    "title_stable",
    "input_ok",
    "notes",
];

/// Human-entered columns for one ROM. Empty when never filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualAnnotation {
    pub boot: String,
    pub title_stable: String,
    pub input_ok: String,
    pub notes: String,
}

/// Positions of the key and manual columns in a prior report's header.
///
/// Absent columns, and fields missing from short rows, read as empty strings.
#[derive(Debug, Clone, Copy)]
struct PriorColumns {
    rom: Option<usize>,
    boot: Option<usize>,
    title_stable: Option<usize>,
    input_ok: Option<usize>,
    notes: Option<usize>,
}

impl PriorColumns {
    fn resolve(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        Self {
            rom: find("rom"),
            boot: find("boot"),
            title_stable: find("title_stable"),
            input_ok: find("input_ok"),
            notes: find("notes"),
        }
    }

    fn field(record: &StringRecord, index: Option<usize>) -> String {
        index
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string()
    }

    fn annotation(&self, record: &StringRecord) -> ManualAnnotation {
        ManualAnnotation {
            boot: Self::field(record, self.boot),
            title_stable: Self::field(record, self.title_stable),
            input_ok: Self::field(record, self.input_ok),
            notes: Self::field(record, self.notes),
        }
    }
}

/// Manual annotations from a prior report, keyed by ROM relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualAnnotations(BTreeMap<String, ManualAnnotation>);

impl ManualAnnotations {
    /// Reads `path` if it exists. A missing file yields no annotations.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        if !path.exists() {
            debug!("no prior report at {}", path.display());
            return Ok(Self::default());
        }

        let csv_err = |source: csv::Error| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let columns = PriorColumns::resolve(reader.headers().map_err(csv_err)?);

        let mut annotations = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let rom = PriorColumns::field(&record, columns.rom);
            if rom.is_empty() {
                continue;
            }
            let annotation = columns.annotation(&record);
            if annotations.insert(rom.clone(), annotation).is_some() {
                warn!(
                    "{rom} listed more than once in {}; keeping the last row",
                    path.display()
                );
            }
        }

        debug!(
            "loaded {} manual annotation(s) from {}",
            annotations.len(),
            path.display()
        );
        Ok(Self(annotations))
    }

    pub fn get(&self, rom: &str) -> Option<&ManualAnnotation> {
        self.0.get(rom)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ManualAnnotation)> for ManualAnnotations {
    fn from_iter<I: IntoIterator<Item = (String, ManualAnnotation)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One persisted line of the report. Field order is column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub rom: String,
    pub mapper: u16,
    pub supported_now: &'static str,
    pub prg_banks_16k: u8,
    pub chr_banks_8k: u8,
    pub mirroring: &'static str,
    pub auto_boot: &'static str,
    pub auto_title_stable: &'static str,
    pub auto_input_ok: &'static str,
    pub auto_jammed: &'static str,
    pub auto_changed_frames: u32,
    pub auto_unique_hashes: u32,
    pub auto_notes: String,
    pub boot: String,
    pub title_stable: String,
    pub input_ok: String,
    pub notes: String,
}

impl ReportRow {
    pub fn new(
        rom: &RomEntry,
        signal: &RuntimeSignal,
        manual: Option<&ManualAnnotation>,
        supported: &SupportedMappers,
    ) -> Self {
        let manual = manual.cloned().unwrap_or_default();
        Self {
            rom: rom.rom.clone(),
            mapper: rom.mapper,
            supported_now: yes_no(supported.contains(rom.mapper)),
            prg_banks_16k: rom.prg_banks_16k,
            chr_banks_8k: rom.chr_banks_8k,
            mirroring: rom.mirroring.as_str(),
            auto_boot: yes_no(signal.boot),
            auto_title_stable: yes_no(signal.title_stable),
            // Input handling is only ever judged by a human.
            auto_input_ok: "unknown",
            auto_jammed: signal.jammed.as_str(),
            auto_changed_frames: signal.changed_frames,
            auto_unique_hashes: signal.unique_hashes,
            auto_notes: signal.notes_field(),
            boot: manual.boot,
            title_stable: manual.title_stable,
            input_ok: manual.input_ok,
            notes: manual.notes,
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Joins ROMs with their signals and carried-forward manual columns.
///
/// `roms` and `signals` are parallel slices. Annotations for ROMs that are no
/// longer in the corpus are dropped.
pub fn merge(
    roms: &[RomEntry],
    signals: &[RuntimeSignal],
    manual: &ManualAnnotations,
    supported: &SupportedMappers,
) -> Vec<ReportRow> {
    debug_assert_eq!(roms.len(), signals.len());

    let current: BTreeSet<&str> = roms.iter().map(|rom| rom.rom.as_str()).collect();
    let stale = manual
        .0
        .keys()
        .filter(|key| !current.contains(key.as_str()))
        .count();
    if stale > 0 {
        warn!("dropping manual annotations for {stale} ROM(s) no longer in the corpus");
    }

    roms.iter()
        .zip(signals)
        .map(|(rom, signal)| ReportRow::new(rom, signal, manual.get(&rom.rom), supported))
        .collect()
}

/// Serializes rows, header first.
pub fn render_csv(rows: &[ReportRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

/// Writes the report to `path`, replacing any previous file.
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    let bytes = render_csv(rows).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

/// Writes through a sibling temp file so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let io_err = |source: std::io::Error| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut file = NamedTempFile::new_in(parent).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}
