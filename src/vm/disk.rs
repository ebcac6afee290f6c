//! VM disk artifacts.
//!
//! Each VM owns one sparse raw disk image. Resizing is grow-only; shrink
//! requests are rejected so stored data is never silently truncated.
//! Replacement stages a full copy in the VM's tmp directory and then
//! renames it over the live image, so the original disk is untouched by
//! any failure before the rename.

use crate::error::{Error, Result};
use crate::paths::VmPaths;
use std::path::Path;

/// Bytes per GB as used for disk sizing.
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Logical and allocated sizes of a disk image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSizes {
    /// File length (what the guest sees).
    pub logical_bytes: u64,

    /// Bytes actually allocated on the host filesystem.
    pub allocated_bytes: u64,
}

impl DiskSizes {
    /// Logical size in whole GB.
    pub fn logical_gb(&self) -> u64 {
        self.logical_bytes / BYTES_PER_GB
    }

    /// Allocated size as a human-readable GB string.
    pub fn allocated_gb_string(&self) -> String {
        format!("{:.1} GB", self.allocated_bytes as f64 / BYTES_PER_GB as f64)
    }
}

/// Create a sparse disk image.
pub fn create_sparse(path: &Path, size_bytes: u64) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    if size_bytes == 0 {
        return Err(Error::invalid_argument("disk size must be positive"));
    }

    tracing::info!(path = %path.display(), size_gb = size_bytes / BYTES_PER_GB, "creating sparse disk");

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

    // Seek to end and write a single byte to create sparse file
    file.seek(SeekFrom::Start(size_bytes - 1))?;
    file.write_all(&[0])?;
    file.sync_all()?;

    Ok(())
}

/// Query logical and allocated sizes of a disk image.
pub fn sizes(path: &Path) -> Result<DiskSizes> {
    let metadata = std::fs::metadata(path)?;

    #[cfg(unix)]
    let allocated_bytes = {
        use std::os::unix::fs::MetadataExt;
        metadata.blocks() * 512
    };
    #[cfg(not(unix))]
    let allocated_bytes = metadata.len();

    Ok(DiskSizes {
        logical_bytes: metadata.len(),
        allocated_bytes,
    })
}

/// Grow a disk image to `new_size_gb`.
///
/// Shrinking is forbidden; requesting the current size is a no-op.
pub fn resize(path: &Path, new_size_gb: u64) -> Result<()> {
    let current = sizes(path)?.logical_bytes;
    let requested = new_size_gb
        .checked_mul(BYTES_PER_GB)
        .ok_or_else(|| Error::invalid_argument(format!("disk size {} GB overflows", new_size_gb)))?;

    if requested < current {
        return Err(Error::invalid_argument(format!(
            "disk size {} GB is below the current {} bytes, shrinking is not supported",
            new_size_gb, current
        )));
    }
    if requested == current {
        tracing::debug!(path = %path.display(), "disk already at requested size");
        return Ok(());
    }

    tracing::info!(path = %path.display(), new_size_gb, "growing disk");

    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(requested)?;
    file.sync_all()?;

    Ok(())
}

/// Replace the VM disk with a copy of `source`.
///
/// The copy is staged into the VM's tmp directory first and then renamed
/// over the live image. The rename is the only step that touches the
/// existing disk, so an interrupted copy leaves it byte-for-byte intact;
/// the stale staging file is safe to discard.
pub fn replace(paths: &VmPaths, source: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Error::invalid_argument(format!(
            "disk source '{}' does not exist or is not a file",
            source.display()
        )));
    }

    tracing::info!(source = %source.display(), vm = %paths.name(), "replacing disk");

    let staged = stage_copy(paths, source)?;
    staged
        .persist(paths.disk_file())
        .map_err(|e| Error::Io(e.error))?;

    Ok(())
}

/// Stage a copy of `source` into the VM's tmp directory.
///
/// The staged file is deleted on drop, so an abandoned staging attempt
/// cleans up after itself.
fn stage_copy(paths: &VmPaths, source: &Path) -> Result<tempfile::NamedTempFile> {
    let tmp_dir = paths.tmp_dir();
    std::fs::create_dir_all(&tmp_dir)?;

    let staged = tempfile::NamedTempFile::new_in(&tmp_dir)?;
    std::fs::copy(source, staged.path())?;
    staged.as_file().sync_all()?;
    Ok(staged)
}
