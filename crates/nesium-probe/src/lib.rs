//! Headless smoke probe for NES emulator cores.
//!
//! `nesium-smoke` generates a tiny binary crate whose `main` is a single call to
//! [`run_main`], monomorphised over the emulator core under test. The probe loads
//! a ROM, runs it for a fixed number of frames and prints one `key=value` pair per
//! line on stdout:
//!
//! ```text
//! status=ok
//! jammed=0
//! frames=120
//! changed_frames=87
//! unique_hashes=12
//! first_hash=1469598103934665603
//! last_hash=6412035912583913466
//! ```
//!
//! Failures print `status=init_fail` or `status=load_fail` and exit non-zero.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

mod hash;

pub use hash::{FNV_OFFSET_BASIS, FNV_PRIME, frame_hash};

/// Frame budget used when the caller passes zero or a negative count.
pub const DEFAULT_FRAMES: u32 = 120;

/// Minimal surface an emulator core must expose to be smoke tested.
pub trait EmulatorCore: Sized {
    type Error: fmt::Display;

    /// Powers the console on.
    fn init() -> Result<Self, Self::Error>;

    /// Loads a ROM image from disk.
    fn load_rom(&mut self, path: &Path) -> Result<(), Self::Error>;

    fn reset(&mut self);

    /// Runs until the PPU completes the next frame.
    fn run_frame(&mut self);

    /// `true` once the CPU has halted on a JAM/KIL opcode.
    fn jammed(&self) -> bool;

    /// Packed pixel words of the latest frame. The length must not change
    /// between frames.
    fn framebuffer(&self) -> &[u32];
}

/// Counters collected over one probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub jammed: bool,
    pub frames: u32,
    pub changed_frames: u32,
    pub unique_hashes: u32,
    pub first_hash: u64,
    pub last_hash: u64,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status=ok")?;
        writeln!(f, "jammed={}", u8::from(self.jammed))?;
        writeln!(f, "frames={}", self.frames)?;
        writeln!(f, "changed_frames={}", self.changed_frames)?;
        writeln!(f, "unique_hashes={}", self.unique_hashes)?;
        writeln!(f, "first_hash={}", self.first_hash)?;
        writeln!(f, "last_hash={}", self.last_hash)
    }
}

/// Accumulates per-frame observations into [`FrameStats`].
#[derive(Debug, Default)]
pub struct FrameTracker {
    first_hash: Option<u64>,
    last_hash: u64,
    frames: u32,
    changed_frames: u32,
    seen: HashSet<u64>,
    jammed: bool,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the digest of one completed frame and the core's jam flag after it.
    pub fn observe(&mut self, hash: u64, jammed: bool) {
        let first = *self.first_hash.get_or_insert(hash);
        if hash != first {
            self.changed_frames += 1;
        }
        self.last_hash = hash;
        self.seen.insert(hash);
        self.jammed |= jammed;
        self.frames += 1;
    }

    pub fn finish(self) -> FrameStats {
        FrameStats {
            jammed: self.jammed,
            frames: self.frames,
            changed_frames: self.changed_frames,
            unique_hashes: self.seen.len() as u32,
            first_hash: self.first_hash.unwrap_or(0),
            last_hash: self.last_hash,
        }
    }
}

/// Why a probe run stopped before the first frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("core initialization failed: {0}")]
    Init(String),

    #[error("ROM load failed: {0}")]
    Load(String),
}

impl ProbeError {
    /// Value printed for the `status` key.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Init(_) => "init_fail",
            Self::Load(_) => "load_fail",
        }
    }
}

/// Initializes `C`, loads `rom`, resets and runs `frames` frames.
pub fn probe<C: EmulatorCore>(rom: &Path, frames: u32) -> Result<FrameStats, ProbeError> {
    let mut core = C::init().map_err(|e| ProbeError::Init(e.to_string()))?;
    core.load_rom(rom).map_err(|e| ProbeError::Load(e.to_string()))?;
    core.reset();

    let mut tracker = FrameTracker::new();
    for _ in 0..frames {
        core.run_frame();
        tracker.observe(frame_hash(core.framebuffer()), core.jammed());
    }
    Ok(tracker.finish())
}

/// Smoke harness for one ROM.
#[derive(Parser, Debug)]
#[command(about = "Run a ROM headlessly and print frame-hash counters", long_about = None)]
struct Args {
    /// Path to the NES ROM file
    rom: PathBuf,

    /// Number of frames to run (values below 1 fall back to 120)
    #[arg(allow_negative_numbers = true, default_value_t = i64::from(DEFAULT_FRAMES))]
    frames: i64,
}

/// Normalizes the requested frame budget.
pub fn frame_budget(requested: i64) -> u32 {
    if requested <= 0 {
        DEFAULT_FRAMES
    } else {
        u32::try_from(requested).unwrap_or(u32::MAX)
    }
}

/// Entry point of a generated harness binary.
///
/// Usage errors exit with 2, core failures with 1.
pub fn run_main<C: EmulatorCore>() -> ExitCode {
    let args = Args::parse();
    match probe::<C>(&args.rom, frame_budget(args.frames)) {
        Ok(stats) => {
            print!("{stats}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("status={}", err.status());
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FB_LEN: usize = 16;

    /// Frame `n` fills the whole buffer with `script[n]` (the last entry repeats).
    struct ScriptedCore {
        script: Vec<u32>,
        jam_after: Option<usize>,
        frame: usize,
        fb: [u32; FB_LEN],
    }

    thread_local! {
        static SCRIPT: std::cell::RefCell<(Vec<u32>, Option<usize>, bool, bool)> =
            const { std::cell::RefCell::new((Vec::new(), None, false, false)) };
    }

    fn set_script(frames: Vec<u32>, jam_after: Option<usize>, fail_init: bool, fail_load: bool) {
        SCRIPT.with(|s| *s.borrow_mut() = (frames, jam_after, fail_init, fail_load));
    }

    impl EmulatorCore for ScriptedCore {
        type Error = String;

        fn init() -> Result<Self, Self::Error> {
            let (script, jam_after, fail_init, _) = SCRIPT.with(|s| s.borrow().clone());
            if fail_init {
                return Err("no power".into());
            }
            Ok(Self {
                script,
                jam_after,
                frame: 0,
                fb: [0; FB_LEN],
            })
        }

        fn load_rom(&mut self, _path: &Path) -> Result<(), Self::Error> {
            if SCRIPT.with(|s| s.borrow().3) {
                return Err("bad mapper".into());
            }
            Ok(())
        }

        fn reset(&mut self) {
            self.frame = 0;
        }

        fn run_frame(&mut self) {
            let value = self
                .script
                .get(self.frame)
                .or(self.script.last())
                .copied()
                .unwrap_or(0);
            self.fb = [value; FB_LEN];
            self.frame += 1;
        }

        fn jammed(&self) -> bool {
            self.jam_after.is_some_and(|n| self.frame > n)
        }

        fn framebuffer(&self) -> &[u32] {
            &self.fb
        }
    }

    #[test]
    fn static_picture_counts_no_changes() {
        set_script(vec![7], None, false, false);
        let stats = probe::<ScriptedCore>(Path::new("x.nes"), 10).unwrap();
        assert_eq!(stats.frames, 10);
        assert_eq!(stats.changed_frames, 0);
        assert_eq!(stats.unique_hashes, 1);
        assert_eq!(stats.first_hash, stats.last_hash);
        assert!(!stats.jammed);
    }

    #[test]
    fn changed_frames_compare_against_first_frame() {
        // A B A C -> frames 2 and 4 differ from frame 1.
        set_script(vec![1, 2, 1, 3], None, false, false);
        let stats = probe::<ScriptedCore>(Path::new("x.nes"), 4).unwrap();
        assert_eq!(stats.changed_frames, 2);
        assert_eq!(stats.unique_hashes, 3);
        assert_eq!(stats.first_hash, frame_hash(&[1; FB_LEN]));
        assert_eq!(stats.last_hash, frame_hash(&[3; FB_LEN]));
    }

    #[test]
    fn jam_is_sticky() {
        set_script(vec![1, 2, 3], Some(1), false, false);
        let stats = probe::<ScriptedCore>(Path::new("x.nes"), 3).unwrap();
        assert!(stats.jammed);
    }

    #[test]
    fn init_and_load_failures_map_to_status() {
        set_script(vec![], None, true, false);
        let err = probe::<ScriptedCore>(Path::new("x.nes"), 3).unwrap_err();
        assert_eq!(err.status(), "init_fail");

        set_script(vec![], None, false, true);
        let err = probe::<ScriptedCore>(Path::new("x.nes"), 3).unwrap_err();
        assert_eq!(err.status(), "load_fail");
    }

    #[test]
    fn output_is_one_pair_per_line() {
        let stats = FrameStats {
            jammed: true,
            frames: 120,
            changed_frames: 10,
            unique_hashes: 5,
            first_hash: 1,
            last_hash: 2,
        };
        let text = stats.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "status=ok",
                "jammed=1",
                "frames=120",
                "changed_frames=10",
                "unique_hashes=5",
                "first_hash=1",
                "last_hash=2",
            ]
        );
    }

    #[test]
    fn frame_budget_falls_back_for_non_positive() {
        assert_eq!(frame_budget(0), DEFAULT_FRAMES);
        assert_eq!(frame_budget(-4), DEFAULT_FRAMES);
        assert_eq!(frame_budget(300), 300);
    }
}
