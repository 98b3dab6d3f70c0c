use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::header::NES_HEADER_LEN;

/// A single file could not be decoded as an iNES image.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("header expected {expected} bytes, got {actual}", expected = NES_HEADER_LEN)]
    TooShort { actual: usize },

    #[error("missing NES magic bytes")]
    InvalidMagic,

    #[error("i/o error while reading header: {0}")]
    Io(#[from] io::Error),
}

/// The corpus as a whole is unusable.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("ROM directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no valid .nes ROM files found under {}", .0.display())]
    NoRoms(PathBuf),
}

/// The smoke harness executable could not be produced.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to read core manifest {}: {source}", path.display())]
    CoreManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid core manifest {}: {source}", path.display())]
    CoreManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("core manifest {} has no [package] name", .0.display())]
    MissingPackageName(PathBuf),

    #[error("failed to render harness manifest: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("failed to prepare harness sources: {0}")]
    Io(#[from] io::Error),

    #[error("failed to spawn `{}`: {source}", cargo.display())]
    Spawn {
        cargo: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("harness compilation failed ({status}):\n{stderr}")]
    Compile { status: ExitStatus, stderr: String },

    #[error("harness build reported success but {} is missing", .0.display())]
    MissingBinary(PathBuf),
}

/// One ROM's harness run failed. Always recovered into a runtime signal.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("failed to spawn harness: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed while waiting for harness: {0}")]
    Wait(#[source] io::Error),

    #[error("harness exceeded {secs}s and was killed")]
    Timeout { secs: u64 },

    #[error("harness exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("malformed harness output: {0}")]
    Malformed(#[from] DecodeError),
}

/// Harness stdout did not follow the `key=value` protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing `{0}`")]
    MissingKey(&'static str),

    #[error("`{key}` has invalid value `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("csv error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fatal errors that abort a smoke run.
#[derive(Error, Debug)]
pub enum SmokeError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
