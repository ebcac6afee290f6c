//! Set command implementation.

use clap::Args;
use macvm::paths::VmPaths;
use macvm::vm::record::{DisplayUnit, MEMORY_GRANULARITY};
use macvm::vm::update::{parse_bool_flag, DisplayUpdate, Tristate, UpdateRequest};
use std::path::PathBuf;

/// Parse a display spec (`WIDTHxHEIGHT` with optional `pt`/`px` suffix).
///
/// A zero width or height leaves that dimension unchanged.
fn parse_display(spec: &str) -> Result<DisplayUpdate, String> {
    let (dims, unit) = if let Some(rest) = spec.strip_suffix("px") {
        (rest, Some(DisplayUnit::Pixel))
    } else if let Some(rest) = spec.strip_suffix("pt") {
        (rest, Some(DisplayUnit::Point))
    } else {
        (spec, None)
    };

    let (w, h) = dims
        .split_once('x')
        .ok_or_else(|| format!("invalid display spec '{}', expected WIDTHxHEIGHT", spec))?;
    let width: u32 = w
        .parse()
        .map_err(|_| format!("invalid display width '{}'", w))?;
    let height: u32 = h
        .parse()
        .map_err(|_| format!("invalid display height '{}'", h))?;

    Ok(DisplayUpdate {
        width,
        height,
        unit,
    })
}

/// Change configuration of an existing VM.
#[derive(Args, Debug)]
pub struct SetCmd {
    /// VM name.
    pub name: String,

    /// Number of vCPUs.
    #[arg(long)]
    pub cpu: Option<u32>,

    /// Memory in MiB.
    #[arg(long)]
    pub memory: Option<u64>,

    /// Display resolution (WIDTHxHEIGHT, optional pt/px suffix).
    ///
    /// A zero width or height leaves that dimension unchanged.
    #[arg(long, value_parser = parse_display)]
    pub display: Option<DisplayUpdate>,

    /// Automatically resize the guest display (on, off or unset).
    #[arg(long)]
    pub display_refit: Option<Tristate>,

    /// VideoToolbox hardware video acceleration (0 or 1, macOS guests).
    #[arg(long, value_parser = parse_bool_flag)]
    pub video_toolbox: Option<bool>,

    /// Neural engine passthrough (0 or 1, macOS guests).
    #[arg(long, value_parser = parse_bool_flag)]
    pub neural_engine: Option<bool>,

    /// Allow neural engine model signature mismatches (0 or 1, macOS guests).
    #[arg(long, value_parser = parse_bool_flag)]
    pub neural_engine_signature_mismatch_allowed: Option<bool>,

    /// M2 scaler device (0 or 1, macOS guests).
    #[arg(long, value_parser = parse_bool_flag)]
    pub m2_scaler: Option<bool>,

    /// Generate a new random MAC address.
    #[arg(long)]
    pub random_mac: bool,

    /// Generate a new random serial number (macOS guests).
    #[arg(long)]
    pub random_serial_number: bool,

    /// Set an explicit serial number (macOS guests).
    #[arg(long)]
    pub serial_number: Option<String>,

    /// Replace the VM disk with a copy of this image.
    #[arg(long)]
    pub disk: Option<PathBuf>,

    /// Grow the VM disk to this size in GB.
    #[arg(long)]
    pub disk_size: Option<u64>,
}

impl SetCmd {
    /// Execute the set command.
    pub fn run(self) -> macvm::Result<()> {
        let paths = VmPaths::for_name(&self.name)?;

        let request = UpdateRequest {
            cpu_count: self.cpu,
            memory_bytes: self.memory.map(|mib| mib * MEMORY_GRANULARITY),
            display: self.display,
            display_refit: self.display_refit,
            video_toolbox: self.video_toolbox,
            neural_engine: self.neural_engine,
            neural_engine_signature_mismatch_allowed: self
                .neural_engine_signature_mismatch_allowed,
            m2_scaler: self.m2_scaler,
            random_mac: self.random_mac,
            random_serial: self.random_serial_number,
            serial_number: self.serial_number,
            replace_disk: self.disk,
            disk_size_gb: self.disk_size,
        };

        if request.is_empty() {
            tracing::debug!(vm = %self.name, "no changes requested");
            return Ok(());
        }

        request.apply(&paths)?;
        Ok(())
    }
}
