use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitcryptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{action} {path}: {source}")]
    File {
        action: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("Key file is empty: {0}")]
    EmptyKey(String),

    #[error("Buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("Region {region} holds {capacity} bytes, key needs {key_size}")]
    RegionTooSmall {
        region: &'static str,
        capacity: u64,
        key_size: u64,
    },

    #[error("Region {region} ({offset}..{end}) lies outside the device ({device_size} bytes)")]
    RegionOutOfBounds {
        region: &'static str,
        offset: u64,
        end: u64,
        device_size: u64,
    },

    #[error("LBA {lba} is out of range for a {device_size}-byte device")]
    LbaOutOfRange { lba: i64, device_size: u64 },

    #[error("Invalid LBA range: {0}. Expected first:last with last >= first")]
    InvalidRange(String),
}

impl BitcryptError {
    /// Wraps an I/O error with the failed operation and the path it hit.
    pub(crate) fn file(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        BitcryptError::File {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BitcryptError>;
