//! iNES header inspection.
//!
//! Only the fields the smoke report needs are decoded: PRG/CHR bank counts, the
//! mapper number and the nametable mirroring. NES 2.0 extensions are ignored, so
//! a NES 2.0 image reports the same mapper an iNES 1.0 reader would see.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::error::FormatError;

const NES_MAGIC: &[u8; 4] = b"NES\x1A";

/// Size of the fixed iNES header in bytes.
pub const NES_HEADER_LEN: usize = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags6: u8 {
        const MIRRORING        = 0b0000_0001;
        const FOUR_SCREEN      = 0b0000_1000;
        const MAPPER_LOW_MASK  = 0b1111_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags7: u8 {
        const MAPPER_HIGH_MASK = 0b1111_0000;
    }
}

/// Nametable layout advertised by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

impl Mirroring {
    /// Spelling used in the report.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::FourScreen => "four-screen",
        }
    }
}

impl fmt::Display for Mirroring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderInfo {
    /// Mapper ID (0 == NROM, 1 == MMC1, ...).
    pub mapper: u16,
    /// PRG ROM size in 16 KiB units.
    pub prg_banks_16k: u8,
    /// CHR ROM size in 8 KiB units (0 means CHR RAM).
    pub chr_banks_8k: u8,
    pub mirroring: Mirroring,
}

/// Parse the first [`NES_HEADER_LEN`] bytes of an image.
pub fn parse_header(bytes: &[u8]) -> Result<HeaderInfo, FormatError> {
    if bytes.len() < NES_HEADER_LEN {
        return Err(FormatError::TooShort {
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != NES_MAGIC {
        return Err(FormatError::InvalidMagic);
    }

    let flags6 = Flags6::from_bits_truncate(bytes[6]);
    let flags7 = Flags7::from_bits_truncate(bytes[7]);

    Ok(HeaderInfo {
        mapper: combine_mapper(flags6, flags7),
        prg_banks_16k: bytes[4],
        chr_banks_8k: bytes[5],
        mirroring: resolve_mirroring(flags6),
    })
}

fn combine_mapper(flags6: Flags6, flags7: Flags7) -> u16 {
    let low = (flags6 & Flags6::MAPPER_LOW_MASK).bits() >> 4;
    let high = (flags7 & Flags7::MAPPER_HIGH_MASK).bits() >> 4;
    (u16::from(high) << 4) | u16::from(low)
}

fn resolve_mirroring(flags6: Flags6) -> Mirroring {
    if flags6.contains(Flags6::FOUR_SCREEN) {
        Mirroring::FourScreen
    } else if flags6.contains(Flags6::MIRRORING) {
        Mirroring::Vertical
    } else {
        Mirroring::Horizontal
    }
}

/// Identity of one ROM in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomEntry {
    /// Path relative to the scan root with `/` separators. This is the report key.
    pub rom: String,
    /// Location on disk, handed to the harness.
    pub path: PathBuf,
    pub mapper: u16,
    pub prg_banks_16k: u8,
    pub chr_banks_8k: u8,
    pub mirroring: Mirroring,
}

impl RomEntry {
    pub fn new(rom: String, path: PathBuf, header: HeaderInfo) -> Self {
        Self {
            rom,
            path,
            mapper: header.mapper,
            prg_banks_16k: header.prg_banks_16k,
            chr_banks_8k: header.chr_banks_8k,
            mirroring: header.mirroring,
        }
    }
}

/// Report key for `path` under `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads and decodes the header of the file at `path`.
pub fn inspect(root: &Path, path: &Path) -> Result<RomEntry, FormatError> {
    let mut bytes = Vec::with_capacity(NES_HEADER_LEN);
    File::open(path)?
        .take(NES_HEADER_LEN as u64)
        .read_to_end(&mut bytes)?;
    let header = parse_header(&bytes)?;
    Ok(RomEntry::new(
        relative_key(root, path),
        path.to_path_buf(),
        header,
    ))
}
