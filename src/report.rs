//! Output surfaces: the reporter contract every operation talks to, a
//! console implementation, and the periodic progress ticker.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// How often the progress ticker polls the run counters.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Sink for everything an operation wants a human to see.
///
/// The core produces values and text; presentation decisions stay behind
/// this trait. Implementations must be callable from the worker and the
/// ticker thread at the same time.
pub trait Reporter: Send + Sync {
    /// Free-form log line.
    fn log(&self, text: &str);

    /// Status line; `finished` marks a line that closes its phase.
    fn status(&self, text: &str, finished: bool);

    /// Error text. Errors reported here did not abort the whole run.
    fn error(&self, text: &str);

    /// Advisory progress: percent of the file in flight and of the whole
    /// selection. Called from the ticker thread.
    fn progress(&self, file_percent: u8, total_percent: u8);

    /// The operation is over; progress displays should close.
    fn finished(&self);
}

/// Discards all output. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn log(&self, _text: &str) {}
    fn status(&self, _text: &str, _finished: bool) {}
    fn error(&self, _text: &str) {}
    fn progress(&self, _file_percent: u8, _total_percent: u8) {}
    fn finished(&self) {}
}

/// Console reporter: a progress bar for the percentages, with log and
/// status lines routed through it so they print above the bar.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Self { bar }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn log(&self, text: &str) {
        self.bar.println(text);
    }

    fn status(&self, text: &str, _finished: bool) {
        self.bar.println(text);
    }

    fn error(&self, text: &str) {
        self.bar.println(format!("Error: {}", text));
    }

    fn progress(&self, file_percent: u8, total_percent: u8) {
        self.bar.set_position(total_percent as u64);
        self.bar.set_message(format!("file {}%", file_percent));
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}

/// Runs a callback at a fixed interval on its own thread until dropped.
///
/// The first tick fires immediately. Dropping the ticker wakes and joins
/// the thread, so no tick runs after the owning scope ends.
pub struct ProgressTicker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn spawn<F>(interval: Duration, tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (shutdown, wake) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            tick();
            match wake.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
