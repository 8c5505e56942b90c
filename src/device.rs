//! Redundant key deployment onto raw block devices.
//!
//! The key file is masked with fresh OS-random bytes and written twice,
//! into two caller-addressed sector ranges, so either copy can be
//! recovered if the other is damaged. Whatever region capacity the key
//! does not use is filled with random bytes, leaving the whole region
//! indistinguishable from random data.
//!
//! Addresses are logical block addresses (LBA): non-negative values count
//! sectors from the device start, negative values from its end, which
//! addresses trailing structures without knowing the device size. The
//! device size itself is queried fresh on every call because the path may
//! point at a different (reattached) device between calls.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::cipher;
use crate::control::CancelToken;
use crate::error::{BitcryptError, Result};
use crate::pipeline::{read_chunk_at, DEFAULT_BUFFER_SIZE};
use crate::report::{ProgressTicker, Reporter, PROGRESS_INTERVAL};
use crate::stats::{format_size, RunStats, Stat};

/// Sector granularity of all LBA math.
pub const SECTOR_SIZE: u64 = 512;

/// An inclusive range of logical block addresses.
///
/// Construction validates the range, so `sectors` and `capacity` are
/// total: `last >= first`, and the byte capacity fits in `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaRange {
    first: i64,
    last: i64,
}

impl LbaRange {
    pub fn new(first: i64, last: i64) -> Result<Self> {
        let invalid = || BitcryptError::InvalidRange(format!("{}:{}", first, last));
        if last < first {
            return Err(invalid());
        }
        // The span can exceed i64 (e.g. -1 to i64::MAX), and the byte
        // capacity can exceed u64; both make the range unusable.
        let sectors = last
            .checked_sub(first)
            .map(|span| span as u64 + 1)
            .ok_or_else(invalid)?;
        if sectors > u64::MAX / SECTOR_SIZE {
            return Err(invalid());
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> i64 {
        self.first
    }

    pub fn last(&self) -> i64 {
        self.last
    }

    pub fn sectors(&self) -> u64 {
        (self.last - self.first) as u64 + 1
    }

    /// Full capacity in bytes: `(last - first + 1) * 512`.
    pub fn capacity(&self) -> u64 {
        self.sectors() * SECTOR_SIZE
    }
}

impl fmt::Display for LbaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.last)
    }
}

impl FromStr for LbaRange {
    type Err = BitcryptError;

    /// Parses `first:last`, both inclusive, e.g. `2048:4095` or `-64:-1`.
    fn from_str(s: &str) -> Result<Self> {
        let (first, last) = s
            .split_once(':')
            .ok_or_else(|| BitcryptError::InvalidRange(s.to_string()))?;
        let first = first
            .trim()
            .parse()
            .map_err(|_| BitcryptError::InvalidRange(s.to_string()))?;
        let last = last
            .trim()
            .parse()
            .map_err(|_| BitcryptError::InvalidRange(s.to_string()))?;
        Self::new(first, last)
    }
}

/// Maps an LBA to a byte offset on a device of the given size.
pub fn lba_offset(device_size: u64, lba: i64) -> Result<u64> {
    let offset = if lba >= 0 {
        lba as i128 * SECTOR_SIZE as i128
    } else {
        device_size as i128 + lba as i128 * SECTOR_SIZE as i128
    };
    if offset < 0 || offset > device_size as i128 {
        return Err(BitcryptError::LbaOutOfRange { lba, device_size });
    }
    Ok(offset as u64)
}

/// Size in bytes of a device or image file. Raw block devices report a
/// zero length through metadata, so the size comes from seeking to the
/// end instead.
pub fn device_size(path: &Path) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| BitcryptError::file("opening", path, e))?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| BitcryptError::file("sizing", path, e))?;
    Ok(size)
}

/// Reads `length` bytes starting at `lba`. The device size is queried
/// fresh for this call.
pub fn read_lba(path: &Path, lba: i64, length: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| BitcryptError::file("opening", path, e))?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| BitcryptError::file("sizing", path, e))?;
    let offset = lba_offset(size, lba)?;

    file.seek(SeekFrom::Start(offset))
        .map_err(|e| BitcryptError::file("seeking", path, e))?;
    let mut buf = vec![0u8; length];
    file.read_exact(&mut buf)
        .map_err(|e| BitcryptError::file("reading", path, e))?;
    Ok(buf)
}

/// Compares the two regions over the first `length` bytes (the mirrored
/// key extent; the filler beyond it is random per region). Returns the
/// offset of the first differing byte, or `None` when identical.
pub fn verify_mirror(
    path: &Path,
    first: LbaRange,
    second: LbaRange,
    length: u64,
) -> Result<Option<u64>> {
    for (name, range) in [("first", first), ("second", second)] {
        if range.capacity() < length {
            return Err(BitcryptError::RegionTooSmall {
                region: name,
                capacity: range.capacity(),
                key_size: length,
            });
        }
    }

    let mut file = File::open(path).map_err(|e| BitcryptError::file("opening", path, e))?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| BitcryptError::file("sizing", path, e))?;
    let off1 = lba_offset(size, first.first)?;
    let off2 = lba_offset(size, second.first)?;

    let chunk = DEFAULT_BUFFER_SIZE.min(length.max(1) as usize);
    let mut a = vec![0u8; chunk];
    let mut b = vec![0u8; chunk];

    let mut pos = 0u64;
    while pos < length {
        let n = ((length - pos).min(chunk as u64)) as usize;
        read_exact_at(&mut file, off1 + pos, &mut a[..n])
            .map_err(|e| BitcryptError::file("reading", path, e))?;
        read_exact_at(&mut file, off2 + pos, &mut b[..n])
            .map_err(|e| BitcryptError::file("reading", path, e))?;
        if let Some(i) = (0..n).find(|&i| a[i] != b[i]) {
            return Ok(Some(pos + i as u64));
        }
        pos += n as u64;
    }
    Ok(None)
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

/// Writes the key file redundantly into two regions of a device.
pub struct KeyWriter {
    buffer_size: usize,
    reporter: Arc<dyn Reporter>,
    control: CancelToken,
}

impl KeyWriter {
    pub fn new(buffer_size: usize, reporter: Arc<dyn Reporter>, control: CancelToken) -> Self {
        Self {
            buffer_size,
            reporter,
            control,
        }
    }

    /// Masks the key file with fresh random bytes and writes the masked
    /// stream into both regions, region 1 then region 2 per chunk, then
    /// fills each region's remaining capacity with random filler.
    ///
    /// Preconditions are checked before anything is written: the key must
    /// be non-empty and each region must hold it inside the live device
    /// bounds. Interruption (stop or I/O error) leaves already-written
    /// chunks in place; the operation is not transactional. Once the chunk
    /// phase has started, the end summary and `finished` are reported no
    /// matter how it ends.
    pub fn write_key(
        &self,
        key_path: &Path,
        device_path: &Path,
        first: LbaRange,
        second: LbaRange,
    ) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(BitcryptError::InvalidBufferSize);
        }
        let key_size = fs::metadata(key_path)
            .map_err(|e| BitcryptError::file("reading key", key_path, e))?
            .len();
        if key_size == 0 {
            return Err(BitcryptError::EmptyKey(key_path.display().to_string()));
        }

        let device_size = device_size(device_path)?;
        let first = resolve_region(device_size, first, "first", key_size)?;
        let second = resolve_region(device_size, second, "second", key_size)?;

        // The key is the only input consumed per chunk, so the buffer
        // shrinks to the key when the key is smaller than one chunk.
        let buffer = self
            .buffer_size
            .min(usize::try_from(key_size).unwrap_or(usize::MAX));

        let stats = Arc::new(RunStats::new());
        stats.set_totals(2, key_size * 2);
        let streams = Streams::default();

        self.reporter
            .status(&stats.start_summary("Writing"), true);
        stats.mark_start();

        let ticker = {
            let reporter = Arc::clone(&self.reporter);
            let stats = Arc::clone(&stats);
            ProgressTicker::spawn(PROGRESS_INTERVAL, move || {
                let pct = stats.total_percent();
                reporter.progress(pct, pct);
            })
        };

        let result = self.write_regions(
            key_path,
            device_path,
            key_size,
            buffer,
            first,
            second,
            &stats,
            &streams,
        );

        stats.mark_end();
        {
            let pct = stats.total_percent();
            self.reporter.progress(pct, pct);
        }
        drop(ticker);

        self.reporter.log(&format!(
            "{}: key read {}/s, region first {}/s, region second {}/s",
            device_path.display(),
            format_size(streams.read_key.throughput() as u64),
            format_size(streams.write_first.throughput() as u64),
            format_size(streams.write_second.throughput() as u64),
        ));
        // The run closes the same way on success, stop, and failure, so no
        // progress display is left hanging on an error.
        self.reporter.status(&stats.end_summary(), true);
        self.reporter.finished();

        result
    }

    /// The chunk phase of a deployment: mask and mirror the key, then pad
    /// both regions. Stops quietly; errors propagate to the caller, which
    /// still closes the run.
    fn write_regions(
        &self,
        key_path: &Path,
        device_path: &Path,
        key_size: u64,
        buffer: usize,
        first: Region,
        second: Region,
        stats: &RunStats,
        streams: &Streams,
    ) -> Result<()> {
        let mut key_buf = vec![0u8; buffer];
        let mut mask_buf = vec![0u8; buffer];
        let mut out_buf = Vec::with_capacity(buffer);

        let mut key_pos = 0u64;
        loop {
            if self.control.is_stop_requested() {
                return Ok(());
            }

            let started = Instant::now();
            let n = read_chunk_at(key_path, key_pos, &mut key_buf[..buffer])
                .map_err(|e| BitcryptError::file("reading key", key_path, e))?;
            streams.read_key.record(n as u64, started.elapsed());

            if n > 0 {
                OsRng.fill_bytes(&mut mask_buf[..n]);
                cipher::transform_chunk(&key_buf[..n], &mask_buf[..n], &mut out_buf, &self.control);

                let mut dev = OpenOptions::new()
                    .write(true)
                    .open(device_path)
                    .map_err(|e| BitcryptError::file("opening", device_path, e))?;

                write_chunk(&mut dev, first.offset + key_pos, &out_buf, &streams.write_first)
                    .map_err(|e| BitcryptError::file("writing region first on", device_path, e))?;
                stats.add_bytes_processed(n as u64);

                write_chunk(&mut dev, second.offset + key_pos, &out_buf, &streams.write_second)
                    .map_err(|e| BitcryptError::file("writing region second on", device_path, e))?;
                stats.add_bytes_processed(n as u64);

                dev.sync_all()
                    .map_err(|e| BitcryptError::file("syncing", device_path, e))?;

                key_pos += n as u64;
            }

            if n < buffer {
                break;
            }
        }

        // Pad both regions to their declared capacity so the key's true
        // extent is not observable.
        self.fill_gap(
            device_path,
            first.offset + key_size,
            first.capacity - key_size,
            &streams.write_first,
        )?;
        self.fill_gap(
            device_path,
            second.offset + key_size,
            second.capacity - key_size,
            &streams.write_second,
        )?;
        stats.add_files_processed(2);
        Ok(())
    }

    /// Writes `gap` random bytes starting at `offset`, in bounded chunks,
    /// each synced before the next.
    fn fill_gap(&self, device_path: &Path, offset: u64, gap: u64, stat: &Stat) -> Result<()> {
        if gap == 0 {
            return Ok(());
        }

        let mut dev = OpenOptions::new()
            .write(true)
            .open(device_path)
            .map_err(|e| BitcryptError::file("opening", device_path, e))?;

        let mut filler = vec![0u8; self.buffer_size.min(gap.min(usize::MAX as u64) as usize)];
        let mut pos = 0u64;
        while pos < gap {
            if self.control.is_stop_requested() {
                break;
            }
            let n = ((gap - pos).min(filler.len() as u64)) as usize;
            OsRng.fill_bytes(&mut filler[..n]);
            write_chunk(&mut dev, offset + pos, &filler[..n], stat)
                .map_err(|e| BitcryptError::file("writing filler on", device_path, e))?;
            dev.sync_all()
                .map_err(|e| BitcryptError::file("syncing", device_path, e))?;
            pos += n as u64;
        }
        Ok(())
    }
}

/// The three I/O streams of one key deployment.
#[derive(Debug, Default)]
struct Streams {
    read_key: Stat,
    write_first: Stat,
    write_second: Stat,
}

/// A region resolved against the live device size: its starting byte
/// offset and full byte capacity.
#[derive(Debug, Clone, Copy)]
struct Region {
    offset: u64,
    capacity: u64,
}

/// Validates that a region fits the key and lies inside the device, and
/// resolves its starting byte offset and capacity.
fn resolve_region(
    device_size: u64,
    range: LbaRange,
    name: &'static str,
    key_size: u64,
) -> Result<Region> {
    let offset = lba_offset(device_size, range.first)?;
    let capacity = range.capacity();
    if capacity < key_size {
        return Err(BitcryptError::RegionTooSmall {
            region: name,
            capacity,
            key_size,
        });
    }
    let end = offset
        .checked_add(capacity)
        .filter(|&end| end <= device_size)
        .ok_or(BitcryptError::RegionOutOfBounds {
            region: name,
            offset,
            end: offset.saturating_add(capacity),
            device_size,
        })?;
    debug_assert!(end <= device_size);
    Ok(Region { offset, capacity })
}

fn write_chunk(file: &mut File, offset: u64, chunk: &[u8], stat: &Stat) -> io::Result<()> {
    let started = Instant::now();
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(chunk)?;
    stat.record(chunk.len() as u64, started.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullReporter;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn image(dir: &Path, sectors: u64) -> std::path::PathBuf {
        let path = dir.join("device.img");
        fs::write(&path, vec![0u8; (sectors * SECTOR_SIZE) as usize]).unwrap();
        path
    }

    fn writer(buffer_size: usize) -> KeyWriter {
        KeyWriter::new(buffer_size, Arc::new(NullReporter), CancelToken::new())
    }

    #[test]
    fn test_lba_offset_rules() {
        assert_eq!(lba_offset(1 << 20, 0).unwrap(), 0);
        assert_eq!(lba_offset(1 << 20, 1).unwrap(), 512);
        assert_eq!(lba_offset(1 << 20, 7).unwrap(), 7 * 512);
        assert_eq!(lba_offset(1 << 20, -1).unwrap(), (1 << 20) - 512);
        assert_eq!(lba_offset(1 << 20, -2).unwrap(), (1 << 20) - 1024);
    }

    #[test]
    fn test_lba_offset_out_of_range() {
        // Before the start of a small device.
        assert!(matches!(
            lba_offset(1024, -3),
            Err(BitcryptError::LbaOutOfRange { .. })
        ));
        // Past the end.
        assert!(matches!(
            lba_offset(1024, 3),
            Err(BitcryptError::LbaOutOfRange { .. })
        ));
    }

    #[test]
    fn test_range_parsing() {
        let range: LbaRange = "2048:4095".parse().unwrap();
        assert_eq!(range, LbaRange::new(2048, 4095).unwrap());
        assert_eq!(range.first(), 2048);
        assert_eq!(range.last(), 4095);
        assert_eq!(range.sectors(), 2048);
        assert_eq!(range.capacity(), 2048 * 512);
        assert_eq!(range.to_string(), "2048:4095");

        let tail: LbaRange = "-64:-1".parse().unwrap();
        assert_eq!(tail.sectors(), 64);

        assert!("10".parse::<LbaRange>().is_err());
        assert!("a:b".parse::<LbaRange>().is_err());
        assert!("5:2".parse::<LbaRange>().is_err());
    }

    #[test]
    fn test_range_rejects_unrepresentable_spans() {
        // Spans wider than i64 and capacities wider than u64 are refused
        // at construction, so sectors() and capacity() never overflow.
        assert!(matches!(
            "-1:9223372036854775807".parse::<LbaRange>(),
            Err(BitcryptError::InvalidRange(_))
        ));
        assert!(LbaRange::new(i64::MIN, i64::MAX).is_err());

        let sector_limit = (u64::MAX / SECTOR_SIZE) as i64;
        assert!(LbaRange::new(0, sector_limit).is_err());

        let widest = LbaRange::new(0, sector_limit - 1).unwrap();
        assert_eq!(widest.sectors(), u64::MAX / SECTOR_SIZE);
        assert_eq!(widest.capacity(), (u64::MAX / SECTOR_SIZE) * SECTOR_SIZE);
    }

    #[test]
    fn test_write_key_mirrors_and_fills() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128); // 64 KiB
        let key_path = dir.path().join("key");
        let key: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        fs::write(&key_path, &key).unwrap();

        let first = LbaRange::new(0, 31).unwrap(); // 16 KiB at offset 0
        let second = LbaRange::new(64, 95).unwrap(); // 16 KiB at offset 32 KiB
        writer(256).write_key(&key_path, &device, first, second).unwrap();

        let image = fs::read(&device).unwrap();
        let r1 = &image[0..16 * 1024];
        let r2 = &image[32 * 1024..48 * 1024];

        // Mirrored over the key extent.
        assert_eq!(&r1[..1000], &r2[..1000]);
        // Never the raw key: the mask's effective byte is never zero.
        assert!((0..1000).all(|i| r1[i] != key[i]));
        // Filler reaches the end of the declared capacity.
        assert!(r1[16 * 1024 - 16..].iter().any(|&b| b != 0));
        assert!(r2[16 * 1024 - 16..].iter().any(|&b| b != 0));
        // Nothing outside the regions was touched.
        assert!(image[16 * 1024..32 * 1024].iter().all(|&b| b == 0));
        assert!(image[48 * 1024..].iter().all(|&b| b == 0));

        assert_eq!(verify_mirror(&device, first, second, 1000).unwrap(), None);
    }

    #[test]
    fn test_verify_mirror_spots_corruption() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128);
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![0x5Au8; 600]).unwrap();

        let first = LbaRange::new(0, 31).unwrap();
        let second = LbaRange::new(64, 95).unwrap();
        writer(4096).write_key(&key_path, &device, first, second).unwrap();

        let mut image = fs::read(&device).unwrap();
        image[32 * 1024 + 123] ^= 0xFF; // corrupt region 2, offset 123
        fs::write(&device, &image).unwrap();

        assert_eq!(
            verify_mirror(&device, first, second, 600).unwrap(),
            Some(123)
        );
    }

    #[test]
    fn test_negative_lba_addresses_device_tail() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128); // 64 KiB
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![0xA5u8; 512]).unwrap();

        let first = LbaRange::new(0, 1).unwrap();
        let second = LbaRange::new(-2, -1).unwrap(); // last KiB
        writer(4096).write_key(&key_path, &device, first, second).unwrap();

        let image = fs::read(&device).unwrap();
        let tail_offset = 64 * 1024 - 1024;
        assert_eq!(&image[0..512], &image[tail_offset..tail_offset + 512]);
        assert!(image[tail_offset..].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_region_too_small_fails_before_writing() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128);
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![1u8; 2000]).unwrap();

        // Two sectors hold 1024 bytes, the key needs 2000.
        let first = LbaRange::new(0, 1).unwrap();
        let second = LbaRange::new(64, 95).unwrap();
        let result = writer(4096).write_key(&key_path, &device, first, second);
        assert!(matches!(
            result,
            Err(BitcryptError::RegionTooSmall { region: "first", .. })
        ));

        // Nothing was written.
        assert!(fs::read(&device).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_region_past_device_end_fails() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 16); // 8 KiB
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![1u8; 100]).unwrap();

        let first = LbaRange::new(0, 3).unwrap();
        let second = LbaRange::new(8, 31).unwrap(); // ends at 16 KiB
        let result = writer(4096).write_key(&key_path, &device, first, second);
        assert!(matches!(
            result,
            Err(BitcryptError::RegionOutOfBounds { region: "second", .. })
        ));
    }

    #[test]
    fn test_empty_key_fails_fast() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 16);
        let key_path = dir.path().join("key");
        fs::write(&key_path, b"").unwrap();

        let first = LbaRange::new(0, 3).unwrap();
        let second = LbaRange::new(4, 7).unwrap();
        let result = writer(4096).write_key(&key_path, &device, first, second);
        assert!(matches!(result, Err(BitcryptError::EmptyKey(_))));
    }

    #[test]
    fn test_stop_before_start_writes_nothing() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128);
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![9u8; 700]).unwrap();

        let control = CancelToken::new();
        control.request_stop();
        let writer = KeyWriter::new(4096, Arc::new(NullReporter), control);
        writer
            .write_key(
                &key_path,
                &device,
                LbaRange::new(0, 31).unwrap(),
                LbaRange::new(64, 95).unwrap(),
            )
            .unwrap();

        assert!(fs::read(&device).unwrap().iter().all(|&b| b == 0));
    }

    /// Swaps the device for a directory once the run is announced, so the
    /// first chunk write fails after the preconditions have passed.
    struct DeviceSwapReporter {
        device: std::path::PathBuf,
        statuses: Mutex<Vec<String>>,
        finished: AtomicBool,
    }

    impl Reporter for DeviceSwapReporter {
        fn log(&self, _text: &str) {}
        fn status(&self, text: &str, _finished: bool) {
            if text.starts_with("Writing ") {
                fs::remove_file(&self.device).unwrap();
                fs::create_dir(&self.device).unwrap();
            }
            self.statuses.lock().unwrap().push(text.to_string());
        }
        fn error(&self, _text: &str) {}
        fn progress(&self, _file_percent: u8, _total_percent: u8) {}
        fn finished(&self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_write_key_error_still_closes_the_run() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 128);
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![3u8; 600]).unwrap();

        let reporter = Arc::new(DeviceSwapReporter {
            device: device.clone(),
            statuses: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        });
        let writer = KeyWriter::new(
            256,
            Arc::clone(&reporter) as Arc<dyn Reporter>,
            CancelToken::new(),
        );
        let result = writer.write_key(
            &key_path,
            &device,
            LbaRange::new(0, 31).unwrap(),
            LbaRange::new(64, 95).unwrap(),
        );

        assert!(matches!(
            result,
            Err(BitcryptError::File { action: "opening", .. })
        ));
        // The failed run still closed: end summary, then finished.
        assert!(reporter.finished.load(Ordering::SeqCst));
        let statuses = reporter.statuses.lock().unwrap();
        assert!(
            statuses.last().unwrap().starts_with("Finished "),
            "statuses: {:?}",
            statuses
        );
    }

    #[test]
    fn test_device_size_is_queried_per_call() {
        let dir = tempdir().unwrap();
        let device = image(dir.path(), 16); // 8 KiB
        let key_path = dir.path().join("key");
        fs::write(&key_path, vec![0x77u8; 512]).unwrap();

        let first = LbaRange::new(0, 1).unwrap();
        let tail = LbaRange::new(-2, -1).unwrap();
        let w = writer(4096);
        w.write_key(&key_path, &device, first, tail).unwrap();
        let before = fs::read(&device).unwrap();
        assert!(before[8 * 1024 - 1024..].iter().any(|&b| b != 0));

        // Grow the image; the tail region must follow the new end.
        let mut grown = before.clone();
        grown.resize(16 * 1024, 0);
        fs::write(&device, &grown).unwrap();

        w.write_key(&key_path, &device, first, tail).unwrap();
        let after = fs::read(&device).unwrap();
        assert!(after[16 * 1024 - 1024..].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_read_lba_positive_and_negative() {
        let dir = tempdir().unwrap();
        let device = dir.path().join("device.img");
        let mut bytes = vec![0u8; 4 * 512];
        bytes[0] = 0xAA;
        bytes[3 * 512] = 0xBB;
        fs::write(&device, &bytes).unwrap();

        assert_eq!(read_lba(&device, 0, 1).unwrap(), vec![0xAA]);
        assert_eq!(read_lba(&device, -1, 1).unwrap(), vec![0xBB]);
        assert!(read_lba(&device, 9, 1).is_err());
    }
}
