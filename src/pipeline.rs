//! The file encryption pipeline: chunked transform against a key file,
//! attribute propagation, shred pass, and the integrity-gated delete.
//!
//! Processing is strictly sequential: one file at a time, one chunk at a
//! time, with file handles scoped to a single chunk so every chunk is
//! durable on disk before the next begins. A progress ticker thread polls
//! the shared counters while the worker runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::attrs;
use crate::cipher;
use crate::control::CancelToken;
use crate::error::{BitcryptError, Result};
use crate::report::{ProgressTicker, Reporter, PROGRESS_INTERVAL};
use crate::stats::{format_size, percent, RunStats, Stat};
use crate::validate::validate_target;

/// Marker appended to encrypted files and stripped when decrypting.
pub const ENCRYPTED_SUFFIX: &str = ".bit";

/// Default chunk size for all streaming I/O.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Smallest file eligible for encryption.
const MIN_TARGET_SIZE: u64 = 1;

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Chunk size for reads and writes.
    pub buffer_size: usize,
    /// Process symlinked targets instead of skipping them.
    pub allow_symlinks: bool,
    /// List what would be processed without touching anything.
    pub dry_run: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            allow_symlinks: false,
            dry_run: false,
        }
    }
}

/// What a run did, returned to the caller after the end summary is
/// reported.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_selected: u64,
    pub files_processed: u64,
    pub bytes_total: u64,
    pub bytes_processed: u64,
    pub elapsed: Duration,
    pub stopped: bool,
}

/// The five I/O streams of one file's lifecycle, blended into the
/// per-file progress percentage.
#[derive(Debug, Default)]
struct Streams {
    read_source: Stat,
    read_key: Stat,
    write_dest: Stat,
    read_dest: Stat,
    write_source: Stat,
}

impl Streams {
    fn reset(&self) {
        self.read_source.reset();
        self.read_key.reset();
        self.write_dest.reset();
        self.read_dest.reset();
        self.write_source.reset();
    }

    fn bytes(&self) -> u64 {
        self.read_source.bytes()
            + self.read_key.bytes()
            + self.write_dest.bytes()
            + self.read_dest.bytes()
            + self.write_source.bytes()
    }
}

enum FileOutcome {
    Completed,
    Stopped,
}

/// Derives the destination path for a target: appends the marker to a
/// plain file, strips it from an already-encrypted one. The name is
/// handled as an OS string throughout, so names that are not valid UTF-8
/// round-trip unchanged.
pub fn toggle_suffix(path: &Path) -> PathBuf {
    // Path::extension treats a lone leading dot as part of the stem, so a
    // file named exactly ".bit" falls through to the append arm.
    match path.extension() {
        Some(ext) if ext == &ENCRYPTED_SUFFIX[1..] => path.with_extension(""),
        _ => {
            let mut full = path.as_os_str().to_os_string();
            full.push(ENCRYPTED_SUFFIX);
            PathBuf::from(full)
        }
    }
}

pub struct Encryptor {
    options: EncryptOptions,
    reporter: Arc<dyn Reporter>,
    control: CancelToken,
}

impl Encryptor {
    pub fn new(options: EncryptOptions, reporter: Arc<dyn Reporter>, control: CancelToken) -> Self {
        Self {
            options,
            reporter,
            control,
        }
    }

    /// Encrypts (or, for already-encrypted targets, decrypts) every
    /// eligible file in `targets` against the key file.
    ///
    /// Ineligible entries are logged and skipped. Per-file I/O errors are
    /// reported and the run continues with the next file. Configuration
    /// errors (empty key, zero buffer) fail before anything is touched.
    /// A requested stop ends the run early without treating it as an
    /// error; the summary marks it.
    pub fn encrypt_selection(&self, targets: &[PathBuf], key_path: &Path) -> Result<RunSummary> {
        if self.options.buffer_size == 0 {
            return Err(BitcryptError::InvalidBufferSize);
        }
        let key_size = fs::metadata(key_path)
            .map_err(|e| BitcryptError::file("reading key", key_path, e))?
            .len();
        if key_size == 0 {
            return Err(BitcryptError::EmptyKey(key_path.display().to_string()));
        }

        let stats = Arc::new(RunStats::new());
        let streams = Arc::new(Streams::default());

        // Pre-scan: totals cover exactly the files the loop will process,
        // so the aggregate percentage can close at 100.
        for path in targets {
            if path.as_path() == key_path {
                continue;
            }
            if validate_target(path, MIN_TARGET_SIZE, self.options.allow_symlinks, true).is_err() {
                continue;
            }
            match fs::metadata(path) {
                Ok(meta) => stats.add_selected(meta.len()),
                Err(e) => self
                    .reporter
                    .error(&format!("reading size of {}: {}", path.display(), e)),
            }
        }

        self.reporter
            .status(&stats.start_summary("Encrypting"), true);
        stats.mark_start();

        let ticker = self.spawn_ticker(&stats, &streams);

        let mut stopped = false;
        for path in targets {
            if self.control.is_stop_requested() {
                stopped = true;
                break;
            }
            if path.as_path() == key_path {
                self.reporter
                    .log(&format!("Skipping {}: selected as key", path.display()));
                continue;
            }
            if let Err(reason) =
                validate_target(path, MIN_TARGET_SIZE, self.options.allow_symlinks, true)
            {
                self.reporter
                    .log(&format!("Skipping {}: {}", path.display(), reason));
                continue;
            }

            self.reporter
                .status(&format!("Processing {}", path.display()), false);
            if self.options.dry_run {
                continue;
            }

            match self.encrypt_one(path, key_path, key_size, &stats, &streams) {
                Ok(FileOutcome::Completed) => {}
                Ok(FileOutcome::Stopped) => {
                    stopped = true;
                    break;
                }
                Err(e) => self.reporter.error(&e.to_string()),
            }
        }

        stats.mark_end();
        report_progress(self.reporter.as_ref(), &stats, &streams);
        drop(ticker);

        self.reporter.status(&stats.end_summary(), true);
        self.reporter.finished();

        Ok(RunSummary {
            files_selected: stats.files_total(),
            files_processed: stats.files_processed(),
            bytes_total: stats.bytes_total(),
            bytes_processed: stats.bytes_processed(),
            elapsed: stats.elapsed(),
            stopped,
        })
    }

    /// Runs one file through encrypt, attribute copy, shred, and the
    /// deletion gate.
    fn encrypt_one(
        &self,
        source: &Path,
        key_path: &Path,
        key_size: u64,
        stats: &RunStats,
        streams: &Streams,
    ) -> Result<FileOutcome> {
        let dest = toggle_suffix(source);
        let source_size = fs::metadata(source)
            .map_err(|e| BitcryptError::file("reading size of", source, e))?
            .len();

        streams.reset();
        stats.set_current_file_bytes(source_size);

        // A stale destination from an earlier run is replaced, never
        // appended to.
        match fs::remove_file(&dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BitcryptError::file("removing stale destination", &dest, e)),
        }

        self.reporter
            .status(&format!("Encrypting {}", source.display()), false);

        let buffer = self.options.buffer_size;
        let mut source_buf = vec![0u8; buffer];
        let mut key_buf = vec![0u8; buffer];
        let mut dest_buf = Vec::with_capacity(buffer);

        // Encrypt pass: source -> destination, chunk by chunk.
        let mut read_pos = 0u64;
        let mut key_pos = 0u64;
        loop {
            if self.control.is_stop_requested() {
                // The destination is incomplete; remove it and leave the
                // source untouched. On the first chunk it may not exist
                // yet.
                match fs::remove_file(&dest) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => self.reporter.error(&format!(
                        "removing incomplete destination {}: {}",
                        dest.display(),
                        e
                    )),
                }
                return Ok(FileOutcome::Stopped);
            }

            let started = Instant::now();
            let n = read_chunk_at(source, read_pos, &mut source_buf)
                .map_err(|e| BitcryptError::file("reading", source, e))?;
            streams.read_source.record(n as u64, started.elapsed());

            if n > 0 {
                let started = Instant::now();
                key_pos = fill_key_chunk(key_path, key_size, key_pos, &mut key_buf[..n])
                    .map_err(|e| BitcryptError::file("reading key", key_path, e))?;
                streams.read_key.record(n as u64, started.elapsed());

                cipher::transform_chunk(
                    &source_buf[..n],
                    &key_buf[..n],
                    &mut dest_buf,
                    &self.control,
                );

                let started = Instant::now();
                append_chunk(&dest, &dest_buf)
                    .map_err(|e| BitcryptError::file("writing", &dest, e))?;
                streams.write_dest.record(n as u64, started.elapsed());

                read_pos += n as u64;
                stats.add_bytes_processed((n - n / 2) as u64);
            }

            if n < buffer {
                break;
            }
        }

        attrs::copy_attributes(source, &dest, self.reporter.as_ref());

        self.reporter
            .status(&format!("Shredding {}", source.display()), false);

        // Shred pass: overwrite the plaintext in place with the encrypted
        // bytes at matching offsets.
        let mut write_pos = 0u64;
        let mut stopped_during_shred = false;
        loop {
            if self.control.is_stop_requested() {
                // The destination is already complete here, so it is never
                // deleted; the gate below still decides the source by
                // sizes.
                stopped_during_shred = true;
                break;
            }

            let started = Instant::now();
            let n = read_chunk_at(&dest, write_pos, &mut source_buf)
                .map_err(|e| BitcryptError::file("reading", &dest, e))?;
            streams.read_dest.record(n as u64, started.elapsed());

            if n > 0 {
                let started = Instant::now();
                overwrite_chunk_at(source, write_pos, &source_buf[..n])
                    .map_err(|e| BitcryptError::file("shredding", source, e))?;
                streams.write_source.record(n as u64, started.elapsed());

                write_pos += n as u64;
                stats.add_bytes_processed((n / 2) as u64);
            }

            if n < buffer {
                break;
            }
        }

        self.reporter.log(&file_status_line(source, streams));
        stats.add_files_processed(1);

        finish_target(source, &dest, self.reporter.as_ref())?;

        if stopped_during_shred {
            Ok(FileOutcome::Stopped)
        } else {
            Ok(FileOutcome::Completed)
        }
    }

    fn spawn_ticker(&self, stats: &Arc<RunStats>, streams: &Arc<Streams>) -> ProgressTicker {
        let reporter = Arc::clone(&self.reporter);
        let stats = Arc::clone(stats);
        let streams = Arc::clone(streams);
        ProgressTicker::spawn(PROGRESS_INTERVAL, move || {
            report_progress(reporter.as_ref(), &stats, &streams);
        })
    }
}

/// One progress sample: the five per-file streams blended against five
/// times the file size, plus the aggregate byte completion.
fn report_progress(reporter: &dyn Reporter, stats: &RunStats, streams: &Streams) {
    let file_pct = percent(
        streams.bytes(),
        stats.current_file_bytes().saturating_mul(5),
    );
    reporter.progress(file_pct, stats.total_percent());
}

/// Reads as much as fits into `buf` from the file at `offset`. A count
/// shorter than `buf` means end of file.
pub(crate) fn read_chunk_at(path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Fills `buf` from the key file starting at cyclic position `pos`,
/// seeking back to offset 0 as often as the key runs out. Returns the
/// position the next chunk starts at. The key must not be empty.
fn fill_key_chunk(path: &Path, key_size: u64, pos: u64, buf: &mut [u8]) -> io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(pos))?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            file.seek(SeekFrom::Start(0))?;
            continue;
        }
        filled += n;
    }
    Ok((pos + buf.len() as u64) % key_size)
}

/// Appends one encrypted chunk and syncs, so the chunk is durable before
/// the next one is attempted.
fn append_chunk(path: &Path, chunk: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(chunk)?;
    file.sync_all()
}

/// Overwrites bytes of the file at `offset` in place, synced.
fn overwrite_chunk_at(path: &Path, offset: u64, chunk: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(chunk)?;
    file.sync_all()
}

fn file_status_line(path: &Path, streams: &Streams) -> String {
    format!(
        "{}: read {}/s, key {}/s, write {}/s, shred read {}/s, shred write {}/s",
        path.display(),
        format_size(streams.read_source.throughput() as u64),
        format_size(streams.read_key.throughput() as u64),
        format_size(streams.write_dest.throughput() as u64),
        format_size(streams.read_dest.throughput() as u64),
        format_size(streams.write_source.throughput() as u64),
    )
}

/// The deletion gate: the source is deleted only when both sizes are
/// non-zero and exactly equal. Anything else keeps the source and reports
/// an error. This is the data-loss-prevention rule of the whole pipeline
/// and is never relaxed to a warning.
fn finish_target(source: &Path, dest: &Path, reporter: &dyn Reporter) -> Result<()> {
    let source_size = fs::metadata(source)
        .map_err(|e| BitcryptError::file("reading size of", source, e))?
        .len();
    // An unreadable destination counts as zero-sized: the gate refuses.
    let dest_size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);

    if source_size != 0 && dest_size != 0 && source_size == dest_size {
        fs::remove_file(source).map_err(|e| BitcryptError::file("deleting", source, e))?;
    } else {
        reporter.error(&format!(
            "keeping {}: destination {} is {} bytes, source is {} bytes",
            source.display(),
            dest.display(),
            dest_size,
            source_size
        ));
    }
    Ok(())
}
