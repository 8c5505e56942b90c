//! Byte and timing counters for a pipeline run.
//!
//! One [`Stat`] tracks a single I/O stream (for example "target read" or
//! "shred write"); [`RunStats`] aggregates the whole selection. All
//! counters are atomics: the worker adds to them between chunks while the
//! progress ticker reads eventually-consistent snapshots without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Elapsed-time floor for throughput math, so a stream that finished
/// within one timer tick still reports a finite rate.
const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Counters for one I/O stream: bytes moved and time spent moving them.
#[derive(Debug, Default)]
pub struct Stat {
    bytes: AtomicU64,
    busy_ns: AtomicU64,
}

impl Stat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.busy_ns.store(0, Ordering::Relaxed);
    }

    /// Records one completed I/O step: how many bytes moved and how long
    /// the step took.
    pub fn record(&self, bytes: u64, busy: Duration) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.busy_ns
            .fetch_add(busy.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn busy(&self) -> Duration {
        Duration::from_nanos(self.busy_ns.load(Ordering::Relaxed))
    }

    /// Bytes per second over the stream's accumulated busy time.
    pub fn throughput(&self) -> f64 {
        let busy = self.busy().max(MIN_ELAPSED);
        self.bytes() as f64 / busy.as_secs_f64()
    }
}

/// Whole-run totals and running counters, shared between the worker and
/// the progress ticker.
#[derive(Debug, Default)]
pub struct RunStats {
    files_total: AtomicU64,
    files_processed: AtomicU64,
    bytes_total: AtomicU64,
    bytes_processed: AtomicU64,
    current_file_bytes: AtomicU64,
    window: Mutex<Window>,
}

#[derive(Debug, Default)]
struct Window {
    start: Option<Instant>,
    end: Option<Instant>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one selected file of `size` bytes to the run totals.
    pub fn add_selected(&self, size: u64) {
        self.files_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(size, Ordering::Relaxed);
    }

    /// Sets totals directly, for operations that know them up front.
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.files_total.store(files, Ordering::Relaxed);
        self.bytes_total.store(bytes, Ordering::Relaxed);
    }

    pub fn add_files_processed(&self, n: u64) {
        self.files_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_processed(&self, n: u64) {
        self.bytes_processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Remembers the size of the file currently in flight, for the
    /// per-file progress blend.
    pub fn set_current_file_bytes(&self, n: u64) {
        self.current_file_bytes.store(n, Ordering::Relaxed);
    }

    pub fn files_total(&self) -> u64 {
        self.files_total.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn current_file_bytes(&self) -> u64 {
        self.current_file_bytes.load(Ordering::Relaxed)
    }

    fn window(&self) -> std::sync::MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_start(&self) {
        self.window().start = Some(Instant::now());
    }

    pub fn mark_end(&self) {
        self.window().end = Some(Instant::now());
    }

    /// Wall-clock time since the run started, frozen once the run ends.
    pub fn elapsed(&self) -> Duration {
        let window = self.window();
        match window.start {
            Some(start) => window.end.unwrap_or_else(Instant::now) - start,
            None => Duration::ZERO,
        }
    }

    /// Aggregate completion over all selected bytes.
    pub fn total_percent(&self) -> u8 {
        percent(self.bytes_processed(), self.bytes_total())
    }

    /// One line announcing what is about to run, e.g.
    /// `Encrypting 3 file(s), 12.0 MB`.
    pub fn start_summary(&self, label: &str) -> String {
        format!(
            "{} {} file(s), {}",
            label,
            self.files_total(),
            format_size(self.bytes_total())
        )
    }

    /// One line closing a run: files, bytes, elapsed, rate, percentage.
    pub fn end_summary(&self) -> String {
        let elapsed = self.elapsed();
        let rate = self.bytes_processed() as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64();
        format!(
            "Finished {}/{} file(s), {} in {:.1?} ({}/s, {}%)",
            self.files_processed(),
            self.files_total(),
            format_size(self.bytes_processed()),
            elapsed,
            format_size(rate as u64),
            self.total_percent()
        )
    }
}

/// Integer percentage of `done` over `total`, clamped to 100, 0 when the
/// total is unknown.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done as f64 * 100.0 / total as f64) as u64;
    pct.min(100) as u8
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
