//! Persisted VM configuration records.
//!
//! One JSON record per VM, loaded wholesale for a single mutation
//! transaction, edited in memory and rewritten atomically
//! (write-to-temp-then-rename). A crash mid-write never leaves a corrupt
//! or half-updated record behind.
//!
//! The record file and the disk image are shared mutable state identified
//! by VM name. Callers must guarantee exclusive access to the VM directory
//! for the duration of a mutation; no locking happens at this layer.

use crate::error::{Error, Result};
use crate::paths::VmPaths;
use crate::vm::identity::{self, MachineIdentity};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Memory sizes must be a multiple of this (hypervisor allocation
/// granularity).
pub const MEMORY_GRANULARITY: u64 = 1024 * 1024;

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Guest OS flavor of a VM.
///
/// Serial numbers, machine identity and hardware accelerator flags only
/// exist for macOS guests. That gating is a capability of the record, not
/// of the build: the same binary manages both flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestOs {
    /// Linux guest.
    Linux,
    /// macOS guest.
    Macos,
}

impl GuestOs {
    /// Whether this guest carries a serial number and machine identity.
    pub fn has_machine_identity(&self) -> bool {
        matches!(self, GuestOs::Macos)
    }
}

impl std::fmt::Display for GuestOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestOs::Linux => write!(f, "linux"),
            GuestOs::Macos => write!(f, "macos"),
        }
    }
}

impl std::str::FromStr for GuestOs {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linux" => Ok(GuestOs::Linux),
            "macos" => Ok(GuestOs::Macos),
            other => Err(format!("unknown guest os '{}', expected linux or macos", other)),
        }
    }
}

/// Unit a display size is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    /// Logical points.
    Point,
    /// Physical pixels.
    Pixel,
}

impl std::fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayUnit::Point => write!(f, "pt"),
            DisplayUnit::Pixel => write!(f, "px"),
        }
    }
}

/// Display configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Width in `unit` (or unitless).
    pub width: u32,

    /// Height in `unit` (or unitless).
    pub height: u32,

    /// Unit the size is expressed in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<DisplayUnit>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            unit: None,
        }
    }
}

impl std::fmt::Display for DisplayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{}x{}{}", self.width, self.height, unit),
            None => write!(f, "{}x{}", self.width, self.height),
        }
    }
}

/// Disk image format for the VM disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    /// Raw disk image.
    #[default]
    Raw,
    /// QCOW2 format (copy-on-write).
    Qcow2,
}

impl std::fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskFormat::Raw => write!(f, "raw"),
            DiskFormat::Qcow2 => write!(f, "qcow2"),
        }
    }
}

/// VM lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Record exists, VM never started.
    #[default]
    Created,
    /// VM process is running.
    Running,
    /// VM exited cleanly.
    Stopped,
    /// VM crashed or error.
    Failed,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Created => write!(f, "created"),
            RecordState::Running => write!(f, "running"),
            RecordState::Stopped => write!(f, "stopped"),
            RecordState::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted configuration for one VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    /// Record format version.
    pub version: u32,

    /// VM name.
    pub name: String,

    /// Guest OS flavor.
    pub guest_os: GuestOs,

    /// Number of vCPUs.
    pub cpu_count: u32,

    /// Memory size in bytes.
    pub memory_bytes: u64,

    /// Display configuration.
    pub display: DisplayConfig,

    /// Automatically resize the guest display to match the window.
    /// Tri-state: unset means "hypervisor default".
    #[serde(default)]
    pub display_refit: Option<bool>,

    /// VideoToolbox hardware video acceleration (macOS guests).
    #[serde(default)]
    pub video_toolbox: bool,

    /// Neural engine passthrough (macOS guests).
    #[serde(default)]
    pub neural_engine: bool,

    /// Allow neural engine model signature mismatches (macOS guests).
    #[serde(default)]
    pub neural_engine_signature_mismatch_allowed: bool,

    /// M2 scaler device (macOS guests).
    #[serde(default)]
    pub m2_scaler: bool,

    /// MAC address, colon-separated lowercase hex.
    pub mac_address: String,

    /// Serial number (macOS guests).
    #[serde(default)]
    pub serial_number: Option<String>,

    /// Machine identity bound to the serial number.
    #[serde(default)]
    pub machine_identity: Option<MachineIdentity>,

    /// Disk image format.
    #[serde(default)]
    pub disk_format: DiskFormat,

    /// VM lifecycle state.
    #[serde(default)]
    pub state: RecordState,

    /// Process ID when running.
    #[serde(default)]
    pub pid: Option<i32>,

    /// Creation timestamp (seconds since epoch).
    pub created_at: String,
}

impl VmRecord {
    /// Create a new record with a fresh MAC address.
    ///
    /// macOS guests additionally get a generated serial number and a fresh
    /// machine identity. CPU and memory go through the same validation as
    /// later updates.
    pub fn new(name: impl Into<String>, guest_os: GuestOs, cpu_count: u32, memory_bytes: u64) -> Result<Self> {
        let (serial_number, machine_identity) = if guest_os.has_machine_identity() {
            let serial = identity::generate_serial();
            let id = MachineIdentity::new(serial.as_str());
            (Some(serial), Some(id))
        } else {
            (None, None)
        };

        let mut record = Self {
            version: RECORD_VERSION,
            name: name.into(),
            guest_os,
            cpu_count: 1,
            memory_bytes: MEMORY_GRANULARITY,
            display: DisplayConfig::default(),
            display_refit: None,
            video_toolbox: false,
            neural_engine: false,
            neural_engine_signature_mismatch_allowed: false,
            m2_scaler: false,
            mac_address: identity::generate_mac(),
            serial_number,
            machine_identity,
            disk_format: DiskFormat::default(),
            state: RecordState::Created,
            pid: None,
            created_at: unix_timestamp(),
        };

        record.set_cpu_count(cpu_count)?;
        record.set_memory_bytes(memory_bytes)?;
        Ok(record)
    }

    /// Set the vCPU count.
    pub fn set_cpu_count(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(Error::invalid_argument(format!(
                "cpu count {} must be positive",
                count
            )));
        }
        self.cpu_count = count;
        Ok(())
    }

    /// Set the memory size in bytes.
    pub fn set_memory_bytes(&mut self, bytes: u64) -> Result<()> {
        if bytes == 0 || bytes % MEMORY_GRANULARITY != 0 {
            return Err(Error::invalid_argument(format!(
                "memory size {} bytes must be a positive multiple of {} bytes",
                bytes, MEMORY_GRANULARITY
            )));
        }
        self.memory_bytes = bytes;
        Ok(())
    }

    /// Fail unless this record describes a macOS guest.
    pub fn require_macos(&self, what: &str) -> Result<()> {
        if self.guest_os.has_machine_identity() {
            Ok(())
        } else {
            Err(Error::unsupported(format!(
                "{} requires a macOS guest, '{}' is {}",
                what, self.name, self.guest_os
            )))
        }
    }

    /// Load the record for a VM.
    pub fn load(paths: &VmPaths) -> Result<Self> {
        let config_file = paths.config_file();
        if !config_file.exists() {
            return Err(Error::VmNotFound(paths.name().to_string()));
        }

        let data = std::fs::read(&config_file)?;
        serde_json::from_slice(&data).map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Persist the record atomically.
    ///
    /// Writes to a temporary file in the VM directory and renames it over
    /// the record, so readers never observe a partial write. Refuses to
    /// persist a record whose identity disagrees with its serial number.
    pub fn save(&self, paths: &VmPaths) -> Result<()> {
        if !self.identity_consistent() {
            return Err(Error::ConfigSave(format!(
                "machine identity does not match serial number for vm '{}'",
                self.name
            )));
        }

        let data =
            serde_json::to_vec_pretty(self).map_err(|e| Error::ConfigSave(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(paths.root())?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(paths.config_file()).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(vm = %self.name, "record saved");
        Ok(())
    }

    /// Whether `machine_identity` agrees with `serial_number`.
    ///
    /// Both absent is consistent; both present must name the same serial.
    pub fn identity_consistent(&self) -> bool {
        match (&self.serial_number, &self.machine_identity) {
            (None, None) => true,
            (Some(serial), Some(id)) => *serial == id.serial_number,
            _ => false,
        }
    }

    /// Check if the VM process is still alive.
    pub fn is_process_alive(&self) -> bool {
        if let Some(pid) = self.pid {
            // Check if process exists by sending signal 0
            unsafe { libc::kill(pid, 0) == 0 }
        } else {
            false
        }
    }

    /// Get the actual state, checking if a running process is still alive.
    pub fn actual_state(&self) -> RecordState {
        if self.state == RecordState::Running {
            if self.is_process_alive() {
                RecordState::Running
            } else {
                RecordState::Stopped // Process died
            }
        } else {
            self.state.clone()
        }
    }
}

/// Get current timestamp as seconds since epoch.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", duration.as_secs())
}
