use std::fmt;
use std::fs;
use std::path::Path;

/// Why a candidate file was not eligible for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Directory,
    Symlink,
    TooSmall { size: u64, min: u64 },
    ReadOnly,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found"),
            SkipReason::Directory => write!(f, "is a directory"),
            SkipReason::Symlink => write!(f, "is a symlink"),
            SkipReason::TooSmall { size, min } => {
                write!(f, "{} bytes, below the {}-byte minimum", size, min)
            }
            SkipReason::ReadOnly => write!(f, "is read-only"),
        }
    }
}

/// Checks whether a path is an eligible target: it must exist, must not
/// be a directory, must meet the minimum size, must not be a symlink
/// unless allowed, and must be writable when requested.
pub fn validate_target(
    path: &Path,
    min_size: u64,
    allow_symlink: bool,
    require_writable: bool,
) -> Result<(), SkipReason> {
    let link_meta = fs::symlink_metadata(path).map_err(|_| SkipReason::NotFound)?;

    let meta = if link_meta.file_type().is_symlink() {
        if !allow_symlink {
            return Err(SkipReason::Symlink);
        }
        // Follow the link; a dangling target counts as missing.
        fs::metadata(path).map_err(|_| SkipReason::NotFound)?
    } else {
        link_meta
    };

    if meta.is_dir() {
        return Err(SkipReason::Directory);
    }

    let size = meta.len();
    if size < min_size {
        return Err(SkipReason::TooSmall {
            size,
            min: min_size,
        });
    }

    if require_writable && meta.permissions().readonly() {
        return Err(SkipReason::ReadOnly);
    }

    Ok(())
}
