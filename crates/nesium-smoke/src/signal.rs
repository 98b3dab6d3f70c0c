//! Classification of harness counters into runtime signals.
//!
//! The title-stability check is a heuristic: a ROM that renders at least two
//! distinct frames, changes the picture at least once relative to the first frame
//! and never jams is treated as "visibly progressing". The thresholds feed manual
//! triage and must stay as they are.

use std::fmt;

use crate::runner::{HarnessReport, HarnessStatus};

/// CPU jam state as seen by automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jammed {
    Yes,
    No,
    /// The harness never produced counters.
    Unknown,
}

impl Jammed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Jammed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic tag attached to a runtime signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Note {
    CpuJammed,
    NoVideoChange,
    FrozenFrameHash,
    Ok,
    RunnerError,
    Timeout,
    UnsupportedMapper,
    NotRun,
}

impl Note {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CpuJammed => "cpu_jammed",
            Self::NoVideoChange => "no_video_change",
            Self::FrozenFrameHash => "frozen_frame_hash",
            Self::Ok => "ok",
            Self::RunnerError => "runner_error",
            Self::Timeout => "timeout",
            Self::UnsupportedMapper => "unsupported_mapper",
            Self::NotRun => "not_run",
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-derived health of one ROM for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSignal {
    pub boot: bool,
    pub title_stable: bool,
    pub jammed: Jammed,
    pub changed_frames: u32,
    pub unique_hashes: u32,
    /// Ordered, no duplicates.
    pub notes: Vec<Note>,
}

impl RuntimeSignal {
    /// Signal for a ROM that produced no counters, tagged with `note`.
    pub fn synthesized(note: Note) -> Self {
        Self {
            boot: false,
            title_stable: false,
            jammed: Jammed::Unknown,
            changed_frames: 0,
            unique_hashes: 0,
            notes: vec![note],
        }
    }

    pub fn runner_error() -> Self {
        Self::synthesized(Note::RunnerError)
    }

    pub fn timeout() -> Self {
        Self::synthesized(Note::Timeout)
    }

    pub fn unsupported_mapper() -> Self {
        Self::synthesized(Note::UnsupportedMapper)
    }

    pub fn not_run() -> Self {
        Self::synthesized(Note::NotRun)
    }

    pub fn has_note(&self, note: Note) -> bool {
        self.notes.contains(&note)
    }

    /// Notes joined with `;`, as stored in the report.
    pub fn notes_field(&self) -> String {
        self.notes
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Derives boot/stability booleans and notes from decoded harness counters.
pub fn classify(report: &HarnessReport) -> RuntimeSignal {
    if report.status != HarnessStatus::Ok {
        return RuntimeSignal::runner_error();
    }

    let changed = report.changed_frames;
    let unique = report.unique_hashes;
    let jammed = report.jammed;

    let mut notes = Vec::new();
    if jammed {
        notes.push(Note::CpuJammed);
    }
    if changed == 0 {
        notes.push(Note::NoVideoChange);
    }
    if unique <= 1 {
        notes.push(Note::FrozenFrameHash);
    }
    if notes.is_empty() {
        notes.push(Note::Ok);
    }

    RuntimeSignal {
        boot: true,
        title_stable: changed > 0 && unique >= 2 && !jammed,
        jammed: if jammed { Jammed::Yes } else { Jammed::No },
        changed_frames: changed,
        unique_hashes: unique,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(jammed: bool, changed: u32, unique: u32) -> HarnessReport {
        HarnessReport {
            status: HarnessStatus::Ok,
            jammed,
            frames: Some(120),
            changed_frames: changed,
            unique_hashes: unique,
            first_hash: None,
            last_hash: None,
        }
    }

    #[test]
    fn progressing_rom_is_ok() {
        let signal = classify(&report(false, 10, 5));
        assert!(signal.boot);
        assert!(signal.title_stable);
        assert_eq!(signal.jammed, Jammed::No);
        assert_eq!(signal.notes, [Note::Ok]);
        assert_eq!(signal.notes_field(), "ok");
    }

    #[test]
    fn jam_blocks_title_stability() {
        let signal = classify(&report(true, 10, 5));
        assert!(signal.boot);
        assert!(!signal.title_stable);
        assert_eq!(signal.jammed, Jammed::Yes);
        assert!(signal.has_note(Note::CpuJammed));
    }

    #[test]
    fn notes_keep_priority_order() {
        let signal = classify(&report(true, 0, 1));
        assert_eq!(
            signal.notes,
            [Note::CpuJammed, Note::NoVideoChange, Note::FrozenFrameHash]
        );
        assert_eq!(
            signal.notes_field(),
            "cpu_jammed;no_video_change;frozen_frame_hash"
        );
    }

    #[test]
    fn thresholds_are_exact() {
        // One changed frame and two hashes is the smallest passing picture.
        assert!(classify(&report(false, 1, 2)).title_stable);
        assert!(!classify(&report(false, 1, 1)).title_stable);
        assert!(!classify(&report(false, 0, 2)).title_stable);

        let frozen = classify(&report(false, 3, 1));
        assert_eq!(frozen.notes, [Note::FrozenFrameHash]);
        let still = classify(&report(false, 0, 2));
        assert_eq!(still.notes, [Note::NoVideoChange]);
    }

    #[test]
    fn failure_status_with_clean_exit_is_a_runner_error() {
        let mut r = report(false, 10, 5);
        r.status = HarnessStatus::LoadFail;
        assert_eq!(classify(&r), RuntimeSignal::runner_error());
    }

    #[test]
    fn synthesized_signals_never_boot() {
        for signal in [
            RuntimeSignal::timeout(),
            RuntimeSignal::unsupported_mapper(),
            RuntimeSignal::runner_error(),
            RuntimeSignal::not_run(),
        ] {
            assert!(!signal.boot);
            assert!(!signal.title_stable);
            assert_eq!(signal.jammed, Jammed::Unknown);
            assert_eq!(signal.notes.len(), 1);
        }
        assert_eq!(RuntimeSignal::timeout().notes_field(), "timeout");
    }
}
