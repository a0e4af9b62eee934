//! # Telemetry Blackboard
//!
//! Thread-safe progress tracking for validation runs.
//!
//! The feeder and collector threads of a stage pipeline bump atomic counters;
//! a background heartbeat thread periodically reads them and reports progress
//! on stderr.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Processing stage for high-level progress tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Initializing = 0,
    Partitioning = 1,
    RunningStages = 2,
    Classifying = 3,
    WritingOutput = 4,
    Complete = 5,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::Partitioning => "Partitioning",
            Stage::RunningStages => "Running Stages",
            Stage::Classifying => "Classifying",
            Stage::WritingOutput => "Writing Output",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::Partitioning,
            2 => Stage::RunningStages,
            3 => Stage::Classifying,
            4 => Stage::WritingOutput,
            _ => Stage::Complete,
        }
    }
}

/// Shared progress counters.
///
/// Relaxed ordering everywhere; the heartbeat only needs approximate values.
pub struct TelemetryBlackboard {
    stage: AtomicU64,

    contigs_done: AtomicU64,
    total_contigs: AtomicU64,

    records_fed: AtomicU64,
    calls_collected: AtomicU64,
    verdicts: AtomicU64,

    start_time: Instant,
    last_progress_nanos: AtomicU64,

    shutdown: AtomicBool,
}

impl TelemetryBlackboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u64, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        Stage::from_u64(self.stage.load(Ordering::Relaxed))
    }

    pub fn set_total_contigs(&self, n: u64) {
        self.total_contigs.store(n, Ordering::Relaxed);
    }

    pub fn contig_done(&self) {
        self.contigs_done.fetch_add(1, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn add_records_fed(&self, n: u64) {
        self.records_fed.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn add_calls_collected(&self, n: u64) {
        self.calls_collected.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn add_verdicts(&self, n: u64) {
        self.verdicts.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    pub fn records_fed(&self) -> u64 {
        self.records_fed.load(Ordering::Relaxed)
    }

    pub fn calls_collected(&self) -> u64 {
        self.calls_collected.load(Ordering::Relaxed)
    }

    #[inline]
    fn touch_progress(&self) {
        let elapsed = self.start_time.elapsed().as_nanos() as u64;
        self.last_progress_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            stage: self.stage(),
            contigs_done: self.contigs_done.load(Ordering::Relaxed),
            total_contigs: self.total_contigs.load(Ordering::Relaxed),
            records_fed: self.records_fed(),
            calls_collected: self.calls_collected(),
            verdicts: self.verdicts.load(Ordering::Relaxed),
            elapsed_secs: self.elapsed_secs(),
            last_progress_nanos: self.last_progress_nanos.load(Ordering::Relaxed),
            current_nanos: self.start_time.elapsed().as_nanos() as u64,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for TelemetryBlackboard {
    fn default() -> Self {
        Self {
            stage: AtomicU64::new(Stage::Initializing as u64),
            contigs_done: AtomicU64::new(0),
            total_contigs: AtomicU64::new(0),
            records_fed: AtomicU64::new(0),
            calls_collected: AtomicU64::new(0),
            verdicts: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

struct TelemetrySnapshot {
    stage: Stage,
    contigs_done: u64,
    total_contigs: u64,
    records_fed: u64,
    calls_collected: u64,
    verdicts: u64,
    elapsed_secs: f64,
    last_progress_nanos: u64,
    current_nanos: u64,
}

/// Heartbeat output configuration
pub struct HeartbeatConfig {
    /// Interval between heartbeats (seconds)
    pub interval_secs: u64,
    /// Stall warning threshold (seconds with no progress)
    pub stall_threshold_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            stall_threshold_secs: 300,
        }
    }
}

/// Handle to the heartbeat thread
pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
    blackboard: Arc<TelemetryBlackboard>,
}

impl HeartbeatHandle {
    /// Spawn the heartbeat thread
    pub fn spawn(blackboard: Arc<TelemetryBlackboard>, config: HeartbeatConfig) -> io::Result<Self> {
        let bb = blackboard.clone();
        let is_tty = io::stderr().is_terminal();

        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || heartbeat_loop(bb, config, is_tty))?;

        Ok(Self {
            handle: Some(handle),
            blackboard,
        })
    }

    /// Signal shutdown and wait for thread to finish
    pub fn shutdown(mut self) {
        self.blackboard.signal_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        // don't block in drop
        self.blackboard.signal_shutdown();
    }
}

fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{:.0}m{:.0}s", mins, remaining_secs)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

fn heartbeat_loop(bb: Arc<TelemetryBlackboard>, config: HeartbeatConfig, is_tty: bool) {
    let interval = Duration::from_secs(config.interval_secs.max(1));
    // short ticks so shutdown is not delayed by a whole interval
    let tick = Duration::from_millis(100).min(interval);
    let mut last_beat = Instant::now();

    while !bb.is_shutdown() {
        thread::sleep(tick);
        if last_beat.elapsed() < interval {
            continue;
        }
        last_beat = Instant::now();

        let snap = bb.snapshot();
        let stall_secs =
            (snap.current_nanos.saturating_sub(snap.last_progress_nanos)) / 1_000_000_000;
        let is_stalled = stall_secs > config.stall_threshold_secs;
        let line = format_progress(&snap, is_stalled);

        if is_tty {
            eprint!("\r{}    \x1b[K", line);
            let _ = io::stderr().flush();
        } else {
            eprintln!("[HEARTBEAT] {}", line);
        }
    }

    if is_tty {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

fn format_progress(snap: &TelemetrySnapshot, is_stalled: bool) -> String {
    format!(
        "stage=\"{}\" contigs={}/{} fed={} collected={} verdicts={} elapsed={}{}",
        snap.stage.as_str(),
        snap.contigs_done,
        snap.total_contigs,
        snap.records_fed,
        snap.calls_collected,
        snap.verdicts,
        format_duration(snap.elapsed_secs),
        if is_stalled { " [STALLED]" } else { "" }
    )
}
