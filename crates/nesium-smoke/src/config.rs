//! Run configuration.
//!
//! Values come from [`SmokeConfig::default`], optionally overlaid by a TOML file
//! and finally by command line flags.
//!
//! ```toml
//! supported_mappers = [0, 1, 2, 4]
//! frames = 300
//! timeout_secs = 30
//! jobs = 4
//!
//! [core]
//! manifest_dir = "../my-nes"
//! type_path = "my_nes::smoke::Core"
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_FRAMES: u32 = 120;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
/// NROM, MMC1 and UxROM.
pub const DEFAULT_SUPPORTED_MAPPERS: [u16; 3] = [0, 1, 2];

/// Mapper numbers the core under test is expected to handle.
///
/// ROMs outside this set are reported but never executed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SupportedMappers(BTreeSet<u16>);

impl SupportedMappers {
    pub fn contains(&self, mapper: u16) -> bool {
        self.0.contains(&mapper)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SupportedMappers {
    fn default() -> Self {
        DEFAULT_SUPPORTED_MAPPERS.into_iter().collect()
    }
}

impl FromIterator<u16> for SupportedMappers {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Renders as `0/1/2`.
impl fmt::Display for SupportedMappers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mapper) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{mapper}")?;
        }
        Ok(())
    }
}

/// Where the emulator core under test lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreBinding {
    /// Directory holding the core crate's `Cargo.toml`.
    pub manifest_dir: PathBuf,
    /// Package name; read from the manifest when absent.
    pub package: Option<String>,
    /// Type implementing `nesium_probe::EmulatorCore`. Defaults to
    /// `<crate>::SmokeCore`.
    pub type_path: Option<String>,
}

impl Default for CoreBinding {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("."),
            package: None,
            type_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    pub supported_mappers: SupportedMappers,
    /// Frames each ROM runs for.
    pub frames: u32,
    /// Wall-clock budget per ROM.
    pub timeout_secs: u64,
    /// Concurrent harness processes.
    pub jobs: usize,
    /// Cargo executable used to build the harness.
    pub cargo: PathBuf,
    /// Location of the `nesium-probe` crate the harness links against.
    pub probe_dir: PathBuf,
    pub core: CoreBinding,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            supported_mappers: SupportedMappers::default(),
            frames: DEFAULT_FRAMES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            jobs: 1,
            cargo: default_cargo(),
            probe_dir: default_probe_dir(),
            core: CoreBinding::default(),
        }
    }
}

impl SmokeConfig {
    /// Load a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Worker count, never below one.
    pub fn workers(&self) -> usize {
        self.jobs.max(1)
    }
}

/// `$CARGO` when set (e.g. under `cargo run`), otherwise `cargo` from `PATH`.
pub fn default_cargo() -> PathBuf {
    std::env::var_os("CARGO")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cargo"))
}

/// The `nesium-probe` crate next to this one in the workspace.
pub fn default_probe_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("nesium-probe")
}
