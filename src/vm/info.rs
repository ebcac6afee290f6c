//! Read-only projection of a VM's configuration.
//!
//! [`VmInfo`] flattens a record plus disk metadata into the shape the
//! `get` command reports. Building it has no side effects.

use crate::error::Result;
use crate::paths::VmPaths;
use crate::vm::disk::{self, DiskSizes};
use crate::vm::record::{RecordState, VmRecord};
use serde::Serialize;

/// Display projection of one VM.
#[derive(Debug, Clone, Serialize)]
pub struct VmInfo {
    /// Guest OS flavor.
    pub os: String,

    /// Number of vCPUs.
    pub cpu: u32,

    /// Memory in MB.
    pub memory_mb: u64,

    /// Logical disk size in GB.
    pub disk_gb: u64,

    /// Disk image format.
    pub disk_format: String,

    /// Allocated disk size as a GB string.
    pub size: String,

    /// Display string form (`WxH` with optional unit suffix).
    pub display: String,

    /// Whether the VM process is currently alive.
    pub running: bool,

    /// Lifecycle state.
    pub state: String,

    /// VideoToolbox flag (macOS guests only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_toolbox: Option<bool>,

    /// Neural engine flag (macOS guests only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neural_engine: Option<bool>,

    /// Neural engine signature mismatch flag (macOS guests only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neural_engine_signature_mismatch_allowed: Option<bool>,

    /// M2 scaler flag (macOS guests only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m2_scaler: Option<bool>,

    /// Serial number, when the guest has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl VmInfo {
    /// Build the projection from a record and its disk sizes.
    pub fn from_record(record: &VmRecord, sizes: DiskSizes) -> Self {
        let state = record.actual_state();
        let running = state == RecordState::Running;
        let macos = record.guest_os.has_machine_identity();

        Self {
            os: record.guest_os.to_string(),
            cpu: record.cpu_count,
            memory_mb: record.memory_bytes / (1024 * 1024),
            disk_gb: sizes.logical_gb(),
            disk_format: record.disk_format.to_string(),
            size: sizes.allocated_gb_string(),
            display: record.display.to_string(),
            running,
            state: state.to_string(),
            video_toolbox: macos.then_some(record.video_toolbox),
            neural_engine: macos.then_some(record.neural_engine),
            neural_engine_signature_mismatch_allowed: macos
                .then_some(record.neural_engine_signature_mismatch_allowed),
            m2_scaler: macos.then_some(record.m2_scaler),
            serial_number: record.serial_number.clone(),
        }
    }

    /// Load the record and disk metadata for a VM and project them.
    pub fn collect(paths: &VmPaths) -> Result<Self> {
        let record = VmRecord::load(paths)?;
        let disk_file = paths.disk_file();
        let sizes = if disk_file.exists() {
            disk::sizes(&disk_file)?
        } else {
            DiskSizes::default()
        };
        Ok(Self::from_record(&record, sizes))
    }

    /// Render as `Key: Value` lines.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut line = |key: &str, value: &str| {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        };

        line("OS", &self.os);
        line("CPU", &self.cpu.to_string());
        line("Memory", &format!("{} MB", self.memory_mb));
        line("Disk", &format!("{} GB", self.disk_gb));
        line("DiskFormat", &self.disk_format);
        line("Size", &self.size);
        line("Display", &self.display);
        line("Running", &self.running.to_string());
        line("State", &self.state);
        if let Some(value) = self.video_toolbox {
            line("VideoToolbox", &value.to_string());
        }
        if let Some(value) = self.neural_engine {
            line("NeuralEngine", &value.to_string());
        }
        if let Some(value) = self.neural_engine_signature_mismatch_allowed {
            line("NeuralEngineSignatureMismatchAllowed", &value.to_string());
        }
        if let Some(value) = self.m2_scaler {
            line("M2Scaler", &value.to_string());
        }
        if let Some(serial) = &self.serial_number {
            line("SerialNumber", serial);
        }

        out
    }
}
