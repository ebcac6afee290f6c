//! Filesystem layout for macvm state.
//!
//! Every VM lives in its own directory under the platform data dir:
//!
//! ```text
//! <data>/macvm/vms/<name>/
//! ├── config.json   # persisted VmRecord
//! ├── disk.img      # sparse raw disk image
//! └── tmp/          # staging area for disk replacement
//! ```
//!
//! On macOS `<data>` is `~/Library/Application Support`, on Linux
//! `~/.local/share`. The `MACVM_HOME` environment variable overrides the
//! whole root (used by tests and sandboxed callers).

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Record filename inside a VM directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Disk image filename inside a VM directory.
pub const DISK_FILENAME: &str = "disk.img";

/// Staging directory for disk replacement, inside a VM directory.
pub const TMP_DIRNAME: &str = "tmp";

/// Get the macvm data directory.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("MACVM_HOME") {
        return Ok(PathBuf::from(home));
    }

    let data_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .ok_or_else(|| Error::ConfigLoad("could not determine data directory".into()))?;

    Ok(data_dir.join("macvm"))
}

/// Get the directory holding all VM directories.
pub fn vms_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("vms"))
}

/// Check that a VM name is safe to use as a path component.
///
/// Allowed: alphanumerics, dash, underscore, dot (not leading), up to 64
/// characters. Anything else is rejected rather than silently rewritten,
/// since the name identifies on-disk state.
fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');

    if ok {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "vm name '{}' may only contain alphanumerics, '-', '_' and '.'",
            name
        )))
    }
}

/// Paths for one VM's on-disk state.
#[derive(Debug, Clone)]
pub struct VmPaths {
    name: String,
    root: PathBuf,
}

impl VmPaths {
    /// Resolve the paths for a named VM under the default data dir.
    pub fn for_name(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            root: vms_dir()?.join(name),
        })
    }

    /// Build paths rooted at an explicit directory.
    ///
    /// The VM name is taken from the final path component.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, root }
    }

    /// The VM name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The VM directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the configuration record.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    /// Path to the disk image.
    pub fn disk_file(&self) -> PathBuf {
        self.root.join(DISK_FILENAME)
    }

    /// Path to the staging directory for disk replacement.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIRNAME)
    }

    /// Check whether a configuration record exists for this VM.
    pub fn exists(&self) -> bool {
        self.config_file().exists()
    }
}
