//! # Telemetry Blackboard
//!
//! Progress tracking for a genome build. Counters are atomics so a background
//! heartbeat thread can read them while the scheduler writes them.
//!
//! The blackboard pattern decouples work execution from progress reporting:
//! - The scheduler thread updates counters as chromosome results arrive
//! - A background heartbeat thread periodically reads and reports progress

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
    Indexing = 1,
    Aggregating = 2,
    Reloading = 3,
    Verifying = 4,
    WritingManifest = 5,
    Complete = 6,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::Indexing => "Indexing",
            Stage::Aggregating => "Aggregating",
            Stage::Reloading => "Reloading",
            Stage::Verifying => "Verifying",
            Stage::WritingManifest => "Writing Manifest",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::Indexing,
            2 => Stage::Aggregating,
            3 => Stage::Reloading,
            4 => Stage::Verifying,
            5 => Stage::WritingManifest,
            _ => Stage::Complete,
        }
    }
}

/// Build progress shared between the scheduler and the heartbeat thread.
///
/// All fields use relaxed ordering since we only need eventual visibility,
/// not strict synchronization. The heartbeat thread reads approximate values.
pub struct TelemetryBlackboard {
    stage: AtomicU64,

    chromosomes_done: AtomicU64,
    chromosomes_total: AtomicU64,
    snps_aggregated: AtomicU64,
    bins_aggregated: AtomicU64,

    start_time: Instant,
    last_progress_nanos: AtomicU64,

    shutdown: AtomicBool,
}

impl TelemetryBlackboard {
    /// Create a new telemetry blackboard
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

    pub fn set_chromosomes_total(&self, total: u64) {
        self.chromosomes_total.store(total, Ordering::Relaxed);
    }

    /// Record one finished (or skipped) chromosome
    pub fn record_chromosome(&self, bins: u64, snps: u64) {
        self.chromosomes_done.fetch_add(1, Ordering::Relaxed);
        self.bins_aggregated.fetch_add(bins, Ordering::Relaxed);
        self.snps_aggregated.fetch_add(snps, Ordering::Relaxed);
        self.touch_progress();
    }

    pub fn chromosomes_done(&self) -> u64 {
        self.chromosomes_done.load(Ordering::Relaxed)
    }

    pub fn snps_aggregated(&self) -> u64 {
        self.snps_aggregated.load(Ordering::Relaxed)
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
            chromosomes_done: self.chromosomes_done.load(Ordering::Relaxed),
            chromosomes_total: self.chromosomes_total.load(Ordering::Relaxed),
            snps_aggregated: self.snps_aggregated.load(Ordering::Relaxed),
            bins_aggregated: self.bins_aggregated.load(Ordering::Relaxed),
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
            chromosomes_done: AtomicU64::new(0),
            chromosomes_total: AtomicU64::new(0),
            snps_aggregated: AtomicU64::new(0),
            bins_aggregated: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Snapshot of telemetry state at a point in time
struct TelemetrySnapshot {
    stage: Stage,
    chromosomes_done: u64,
    chromosomes_total: u64,
    snps_aggregated: u64,
    bins_aggregated: u64,
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
            stall_threshold_secs: 1800,
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
            .spawn(move || {
                heartbeat_loop(bb, config, is_tty);
            })?;

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
        // Don't block in drop - just signal shutdown
        self.blackboard.signal_shutdown();
    }
}

/// Get RSS memory usage in MB (Linux only)
fn get_rss_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| {
                let parts: Vec<&str> = s.split_whitespace().collect();
                // Second field is RSS in pages
                parts.get(1)?.parse::<u64>().ok()
            })
            .map(|pages| pages * 4096 / (1024 * 1024))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Format duration in human-readable form
pub fn format_duration(secs: f64) -> String {
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

/// Sleep for `interval` in short slices so shutdown is noticed promptly
fn sleep_unless_shutdown(bb: &TelemetryBlackboard, interval: Duration) -> bool {
    let slice = Duration::from_millis(100);
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline {
        if bb.is_shutdown() {
            return false;
        }
        thread::sleep(slice.min(deadline.saturating_duration_since(Instant::now())));
    }
    !bb.is_shutdown()
}

fn heartbeat_loop(bb: Arc<TelemetryBlackboard>, config: HeartbeatConfig, is_tty: bool) {
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let mut last_snps = 0u64;
    let mut last_time = Instant::now();

    while sleep_unless_shutdown(&bb, interval) {
        let snap = bb.snapshot();

        let now = Instant::now();
        let dt = now.duration_since(last_time).as_secs_f64();
        let velocity = if dt > 0.1 {
            snap.snps_aggregated.saturating_sub(last_snps) as f64 / dt
        } else {
            0.0
        };
        last_snps = snap.snps_aggregated;
        last_time = now;

        let stall_secs =
            (snap.current_nanos.saturating_sub(snap.last_progress_nanos)) / 1_000_000_000;
        let is_stalled = stall_secs > config.stall_threshold_secs;

        let rss_mb = get_rss_mb();

        if is_tty {
            print_tty_progress(&snap, rss_mb, velocity, is_stalled);
        } else {
            print_log_progress(&snap, rss_mb, velocity, is_stalled);
        }
    }

    // Clear TTY line on shutdown
    if is_tty {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

fn print_tty_progress(snap: &TelemetrySnapshot, rss_mb: Option<u64>, velocity: f64, is_stalled: bool) {
    let progress_pct = if snap.chromosomes_total > 0 {
        (snap.chromosomes_done as f64 / snap.chromosomes_total as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    // Build progress bar (20 chars)
    let bar_width = 20;
    let filled = ((progress_pct / 100.0) * bar_width as f64) as usize;
    let bar: String =
        "=".repeat(filled.min(bar_width)) + &" ".repeat(bar_width.saturating_sub(filled));

    let mem_str = rss_mb.map(|mb| format!(" {}MB", mb)).unwrap_or_default();
    let stall_str = if is_stalled { " [STALLED]" } else { "" };

    eprint!(
        "\r[{}] {:>5.1}% | {} C{}/{} | {} bins {} snps | {:.0} snp/s | {}{}{}    \x1b[K",
        bar,
        progress_pct,
        snap.stage.as_str(),
        snap.chromosomes_done,
        snap.chromosomes_total,
        snap.bins_aggregated,
        snap.snps_aggregated,
        velocity,
        format_duration(snap.elapsed_secs),
        mem_str,
        stall_str
    );
    let _ = io::stderr().flush();
}

fn print_log_progress(snap: &TelemetrySnapshot, rss_mb: Option<u64>, velocity: f64, is_stalled: bool) {
    eprintln!(
        "[HEARTBEAT] stage=\"{}\" chromosomes={}/{} bins={} snps={} \
         velocity={:.0}/s elapsed={:.0}s rss_mb={} stalled={}",
        snap.stage.as_str(),
        snap.chromosomes_done,
        snap.chromosomes_total,
        snap.bins_aggregated,
        snap.snps_aggregated,
        velocity,
        snap.elapsed_secs,
        rss_mb
            .map(|m| m.to_string())
            .unwrap_or_else(|| "?".to_string()),
        is_stalled
    );
}
