//! Per-ROM harness execution.
//!
//! Every ROM runs in its own child process with stdout/stderr redirected into
//! anonymous temp files, so a chatty or wedged harness can never block on a full
//! pipe. The child is polled against a wall-clock deadline and killed once it
//! expires.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{SmokeConfig, SupportedMappers};
use crate::error::{DecodeError, ExecutionError};
use crate::header::RomEntry;
use crate::signal::{RuntimeSignal, classify};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_TAIL_LINES: usize = 20;

/// Value of the harness `status` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessStatus {
    Ok,
    InitFail,
    LoadFail,
}

impl FromStr for HarnessStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "init_fail" => Ok(Self::InitFail),
            "load_fail" => Ok(Self::LoadFail),
            _ => Err(()),
        }
    }
}

/// Decoded harness stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub status: HarnessStatus,
    pub jammed: bool,
    pub frames: Option<u32>,
    pub changed_frames: u32,
    pub unique_hashes: u32,
    pub first_hash: Option<u64>,
    pub last_hash: Option<u64>,
}

impl HarnessReport {
    /// Decodes `key=value` lines.
    ///
    /// Lines without `=` and unknown keys are ignored; a repeated key keeps its
    /// last value. `status` is always required, and the counters are required
    /// whenever the status is `ok`.
    pub fn decode(stdout: &str) -> Result<Self, DecodeError> {
        let pairs: BTreeMap<&str, &str> = stdout
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let status = required(&pairs, "status")?;
        let status = status
            .parse::<HarnessStatus>()
            .map_err(|()| DecodeError::InvalidValue {
                key: "status",
                value: status.to_string(),
            })?;

        if status != HarnessStatus::Ok {
            return Ok(Self {
                status,
                jammed: false,
                frames: None,
                changed_frames: 0,
                unique_hashes: 0,
                first_hash: None,
                last_hash: None,
            });
        }

        let jammed: u32 = parse_value("jammed", required(&pairs, "jammed")?)?;
        Ok(Self {
            status,
            jammed: jammed != 0,
            frames: optional(&pairs, "frames")?,
            changed_frames: parse_value("changed_frames", required(&pairs, "changed_frames")?)?,
            unique_hashes: parse_value("unique_hashes", required(&pairs, "unique_hashes")?)?,
            first_hash: optional(&pairs, "first_hash")?,
            last_hash: optional(&pairs, "last_hash")?,
        })
    }
}

fn required<'a>(
    pairs: &BTreeMap<&str, &'a str>,
    key: &'static str,
) -> Result<&'a str, DecodeError> {
    pairs.get(key).copied().ok_or(DecodeError::MissingKey(key))
}

fn optional<T: FromStr>(
    pairs: &BTreeMap<&str, &str>,
    key: &'static str,
) -> Result<Option<T>, DecodeError> {
    pairs
        .get(key)
        .map(|value| parse_value(key, value))
        .transpose()
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Runs the shared harness executable once per ROM.
#[derive(Debug, Clone)]
pub struct RomRunner<'a> {
    harness: &'a Path,
    frames: u32,
    timeout: Duration,
    supported: &'a SupportedMappers,
}

impl<'a> RomRunner<'a> {
    pub fn new(
        harness: &'a Path,
        frames: u32,
        timeout: Duration,
        supported: &'a SupportedMappers,
    ) -> Self {
        Self {
            harness,
            frames,
            timeout,
            supported,
        }
    }

    pub fn from_config(harness: &'a Path, config: &'a SmokeConfig) -> Self {
        Self::new(
            harness,
            config.frames,
            config.timeout(),
            &config.supported_mappers,
        )
    }

    /// Produces the runtime signal for `rom`. Never fails: unsupported mappers,
    /// timeouts and harness failures all become synthesized signals.
    pub fn run(&self, rom: &RomEntry) -> RuntimeSignal {
        if !self.supported.contains(rom.mapper) {
            debug!("{}: mapper {} unsupported, not executed", rom.rom, rom.mapper);
            return RuntimeSignal::unsupported_mapper();
        }

        let started = Instant::now();
        match self.execute(&rom.path) {
            Ok(report) => {
                let signal = classify(&report);
                debug!(
                    "{}: {} in {:.2?}",
                    rom.rom,
                    signal.notes_field(),
                    started.elapsed()
                );
                signal
            }
            Err(err @ ExecutionError::Timeout { .. }) => {
                warn!("{}: {err}", rom.rom);
                RuntimeSignal::timeout()
            }
            Err(err) => {
                warn!("{}: {err}", rom.rom);
                RuntimeSignal::runner_error()
            }
        }
    }

    /// Runs the harness on `rom_path` and decodes its output.
    pub fn execute(&self, rom_path: &Path) -> Result<HarnessReport, ExecutionError> {
        let mut stdout = tempfile::tempfile().map_err(ExecutionError::Spawn)?;
        let mut stderr = tempfile::tempfile().map_err(ExecutionError::Spawn)?;

        let mut child = Command::new(self.harness)
            .arg(rom_path)
            .arg(self.frames.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(
                stdout.try_clone().map_err(ExecutionError::Spawn)?,
            ))
            .stderr(Stdio::from(
                stderr.try_clone().map_err(ExecutionError::Spawn)?,
            ))
            .spawn()
            .map_err(ExecutionError::Spawn)?;

        let Some(status) = wait_with_deadline(&mut child, self.timeout)? else {
            return Err(ExecutionError::Timeout {
                secs: self.timeout.as_secs(),
            });
        };

        if !status.success() {
            return Err(ExecutionError::Exit {
                status,
                stderr: stderr_tail(&read_captured(&mut stderr)?),
            });
        }

        let text = read_captured(&mut stdout)?;
        Ok(HarnessReport::decode(&text)?)
    }
}

/// Waits for `child`, killing it once `timeout` has elapsed.
///
/// Returns `None` when the deadline fired.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, ExecutionError> {
    let started = Instant::now();
    loop {
        match child.try_wait().map_err(ExecutionError::Wait)? {
            Some(status) => return Ok(Some(status)),
            None if started.elapsed() >= timeout => {
                // The child may exit on its own between try_wait and kill.
                let _ = child.kill();
                child.wait().map_err(ExecutionError::Wait)?;
                return Ok(None);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

fn read_captured(file: &mut File) -> Result<String, ExecutionError> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(ExecutionError::Wait)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_report() {
        let report = HarnessReport::decode(
            "status=ok\njammed=0\nframes=120\nchanged_frames=10\nunique_hashes=5\nfirst_hash=1469598103934665603\nlast_hash=42\n",
        )
        .unwrap();
        assert_eq!(
            report,
            HarnessReport {
                status: HarnessStatus::Ok,
                jammed: false,
                frames: Some(120),
                changed_frames: 10,
                unique_hashes: 5,
                first_hash: Some(1469598103934665603),
                last_hash: Some(42),
            }
        );
    }

    #[test]
    fn tolerates_noise_and_whitespace() {
        let report = HarnessReport::decode(
            "booting core...\n status = ok \njammed=1\nchanged_frames=3\nunique_hashes=2\nextra=thing\n",
        )
        .unwrap();
        assert!(report.jammed);
        assert_eq!(report.frames, None);
        assert_eq!(report.changed_frames, 3);
    }

    #[test]
    fn status_is_required() {
        assert_eq!(
            HarnessReport::decode("jammed=0\n"),
            Err(DecodeError::MissingKey("status"))
        );
    }

    #[test]
    fn ok_status_requires_counters() {
        assert_eq!(
            HarnessReport::decode("status=ok\njammed=0\nchanged_frames=1\n"),
            Err(DecodeError::MissingKey("unique_hashes"))
        );
    }

    #[test]
    fn rejects_non_numeric_counters() {
        let err = HarnessReport::decode(
            "status=ok\njammed=0\nchanged_frames=lots\nunique_hashes=2\n",
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidValue {
                key: "changed_frames",
                value: "lots".into()
            }
        );
    }

    #[test]
    fn failure_status_needs_no_counters() {
        let report = HarnessReport::decode("status=load_fail\n").unwrap();
        assert_eq!(report.status, HarnessStatus::LoadFail);
    }

    #[test]
    fn unknown_status_is_invalid() {
        assert!(matches!(
            HarnessReport::decode("status=maybe\n"),
            Err(DecodeError::InvalidValue { key: "status", .. })
        ));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let long: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&long);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
    }
}
