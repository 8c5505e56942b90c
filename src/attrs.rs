//! Best-effort propagation of file attributes from a source file to its
//! encrypted destination.
//!
//! Attribute support varies by platform, so the known view kinds are a
//! fixed enumeration and each supported view is attempted independently.
//! A view that cannot be copied is reported and skipped; it never fails
//! the file.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::report::Reporter;

/// One family of file attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrView {
    /// Access and modification timestamps.
    Basic,
    /// DOS-style flags (readonly).
    Dos,
    /// Permission bits and ownership.
    Posix,
}

impl AttrView {
    /// The views this platform can copy.
    pub fn supported() -> &'static [AttrView] {
        #[cfg(unix)]
        {
            &[AttrView::Basic, AttrView::Posix]
        }
        #[cfg(windows)]
        {
            &[AttrView::Basic, AttrView::Dos]
        }
        #[cfg(not(any(unix, windows)))]
        {
            &[AttrView::Basic]
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttrView::Basic => "basic",
            AttrView::Dos => "dos",
            AttrView::Posix => "posix",
        }
    }
}

/// Copies every supported attribute view from `source` to `dest`. Each
/// view is attempted on its own; a failure is reported and the remaining
/// views are still tried.
pub fn copy_attributes(source: &Path, dest: &Path, reporter: &dyn Reporter) {
    for &view in AttrView::supported() {
        if let Err(e) = copy_view(view, source, dest) {
            reporter.error(&format!(
                "setting {} attributes on {}: {}",
                view.name(),
                dest.display(),
                e
            ));
        }
    }
}

fn copy_view(view: AttrView, source: &Path, dest: &Path) -> io::Result<()> {
    match view {
        AttrView::Basic => copy_basic(source, dest),
        AttrView::Dos => copy_dos(source, dest),
        AttrView::Posix => copy_posix(source, dest),
    }
}

/// Creation time is not settable on mainstream filesystems, so the basic
/// view covers access and modification times.
fn copy_basic(source: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(dest, atime, mtime)
}

#[cfg(windows)]
fn copy_dos(source: &Path, dest: &Path) -> io::Result<()> {
    let readonly = fs::metadata(source)?.permissions().readonly();
    let mut perms = fs::metadata(dest)?.permissions();
    perms.set_readonly(readonly);
    fs::set_permissions(dest, perms)
}

#[cfg(not(windows))]
fn copy_dos(_source: &Path, _dest: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn copy_posix(source: &Path, dest: &Path) -> io::Result<()> {
    use std::os::unix::fs::{chown, MetadataExt};

    let meta = fs::metadata(source)?;
    fs::set_permissions(dest, meta.permissions())?;
    chown(dest, Some(meta.uid()), Some(meta.gid()))
}

#[cfg(not(unix))]
fn copy_posix(_source: &Path, _dest: &Path) -> io::Result<()> {
    Ok(())
}
