//! Recursive ROM corpus scan.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::SupportedMappers;
use crate::error::{CorpusError, FormatError};
use crate::header::{RomEntry, inspect, relative_key};

/// Outcome of inspecting one `.nes` file.
#[derive(Debug)]
pub enum ScanEntry {
    Parsed(RomEntry),
    /// The file is excluded from the run; the reason is kept for logging.
    Unparseable { rom: String, error: FormatError },
}

/// Every `.nes` file under a root, in path order.
#[derive(Debug)]
pub struct Corpus {
    root: PathBuf,
    entries: Vec<ScanEntry>,
}

impl Corpus {
    /// Walks `root` and inspects every `.nes` file.
    ///
    /// Fails only when `root` is not a readable directory. Use
    /// [`Corpus::require_roms`] to reject a corpus without any valid image.
    pub fn scan(root: &Path) -> Result<Self, CorpusError> {
        if !root.is_dir() {
            return Err(CorpusError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        collect_nes_files(root, &mut files)?;
        files.sort_by(|a, b| {
            a.strip_prefix(root)
                .unwrap_or(a)
                .cmp(b.strip_prefix(root).unwrap_or(b))
        });

        let entries = files
            .iter()
            .map(|path| match inspect(root, path) {
                Ok(entry) => ScanEntry::Parsed(entry),
                Err(error) => ScanEntry::Unparseable {
                    rom: relative_key(root, path),
                    error,
                },
            })
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Logs unparseable files and fails when nothing usable was found.
    pub fn require_roms(self) -> Result<Self, CorpusError> {
        for (rom, error) in self.unparseable() {
            warn!("skipping {rom}: {error}");
        }
        if self.roms().next().is_none() {
            return Err(CorpusError::NoRoms(self.root));
        }
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    /// Parsed ROMs in scan order.
    pub fn roms(&self) -> impl Iterator<Item = &RomEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            ScanEntry::Parsed(rom) => Some(rom),
            ScanEntry::Unparseable { .. } => None,
        })
    }

    pub fn unparseable(&self) -> impl Iterator<Item = (&str, &FormatError)> {
        self.entries.iter().filter_map(|entry| match entry {
            ScanEntry::Unparseable { rom, error } => Some((rom.as_str(), error)),
            ScanEntry::Parsed(_) => None,
        })
    }

    /// Parsed ROMs whose mapper is in `supported`.
    pub fn eligible<'a>(
        &'a self,
        supported: &'a SupportedMappers,
    ) -> impl Iterator<Item = &'a RomEntry> + 'a {
        self.roms().filter(|rom| supported.contains(rom.mapper))
    }

    /// Consumes the scan, keeping only parsed ROMs.
    pub fn into_roms(self) -> Vec<RomEntry> {
        self.entries
            .into_iter()
            .filter_map(|entry| match entry {
                ScanEntry::Parsed(rom) => Some(rom),
                ScanEntry::Unparseable { .. } => None,
            })
            .collect()
    }
}

fn collect_nes_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CorpusError> {
    let read_dir = fs::read_dir(dir).map_err(|source| CorpusError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in read_dir {
        let entry = entry.map_err(|source| CorpusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| CorpusError::Io {
            path: path.clone(),
            source,
        })?;
        // Symlinked directories are not followed; symlinked images are kept.
        if file_type.is_dir() {
            collect_nes_files(&path, out)?;
        } else if is_nes_file(&path) && (file_type.is_file() || path.is_file()) {
            out.push(path);
        } else {
            debug!("ignoring {}", path.display());
        }
    }
    Ok(())
}

fn is_nes_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("nes"))
}
