//! Sparse configuration updates.
//!
//! An [`UpdateRequest`] carries one optional change per mutable field;
//! absent fields mean "leave unchanged". Changes apply to an in-memory
//! copy of the record in a fixed order, and the record file is rewritten
//! only after every step has succeeded. An invalid request therefore
//! never leaves a partially-updated record behind.
//!
//! Disk steps run last and validate their inputs before touching the
//! artifact; the replacement itself is stage-then-rename (see
//! [`crate::vm::disk`]).

use crate::error::{Error, Result};
use crate::paths::VmPaths;
use crate::vm::disk;
use crate::vm::identity::{self, MachineIdentity};
use crate::vm::record::{DisplayUnit, VmRecord};
use std::path::PathBuf;

/// Three-valued update for an optional boolean field.
///
/// Distinct from `Option<bool>` on the request: `Unset` is an explicit
/// instruction to clear the stored value, not the absence of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate {
    /// Clear the stored value (fall back to the hypervisor default).
    Unset,
    /// Set to false.
    Off,
    /// Set to true.
    On,
}

impl Tristate {
    /// The stored form of this value.
    pub fn as_option(self) -> Option<bool> {
        match self {
            Tristate::Unset => None,
            Tristate::Off => Some(false),
            Tristate::On => Some(true),
        }
    }
}

impl std::str::FromStr for Tristate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Tristate::Unset),
            "off" => Ok(Tristate::Off),
            "on" => Ok(Tristate::On),
            other => Err(format!("invalid value '{}', expected on, off or unset", other)),
        }
    }
}

/// Parse a boolean flag value. Exactly `0` and `1` are accepted.
pub fn parse_bool_flag(value: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(Error::invalid_argument(format!(
            "flag value '{}' must be 0 or 1",
            other
        ))),
    }
}

/// Requested display change.
///
/// A width or height of zero leaves that dimension unchanged; a unit, when
/// present, always overwrites the stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayUpdate {
    /// New width, or 0 to keep the stored width.
    pub width: u32,

    /// New height, or 0 to keep the stored height.
    pub height: u32,

    /// New unit, if one was specified.
    pub unit: Option<DisplayUnit>,
}

/// A sparse set of requested configuration changes.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// New vCPU count.
    pub cpu_count: Option<u32>,

    /// New memory size in bytes.
    pub memory_bytes: Option<u64>,

    /// Display change.
    pub display: Option<DisplayUpdate>,

    /// Display refit change, including explicit unset.
    pub display_refit: Option<Tristate>,

    /// VideoToolbox flag (macOS guests).
    pub video_toolbox: Option<bool>,

    /// Neural engine flag (macOS guests).
    pub neural_engine: Option<bool>,

    /// Neural engine signature mismatch flag (macOS guests).
    pub neural_engine_signature_mismatch_allowed: Option<bool>,

    /// M2 scaler flag (macOS guests).
    pub m2_scaler: Option<bool>,

    /// Generate a fresh MAC address.
    pub random_mac: bool,

    /// Generate a fresh serial number (macOS guests).
    pub random_serial: bool,

    /// Explicit serial number (macOS guests).
    pub serial_number: Option<String>,

    /// Replace the disk with a copy of this image.
    pub replace_disk: Option<PathBuf>,

    /// Grow the disk to this size in GB.
    pub disk_size_gb: Option<u64>,
}

impl UpdateRequest {
    /// Whether the request carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.cpu_count.is_none()
            && self.memory_bytes.is_none()
            && self.display.is_none()
            && self.display_refit.is_none()
            && self.video_toolbox.is_none()
            && self.neural_engine.is_none()
            && self.neural_engine_signature_mismatch_allowed.is_none()
            && self.m2_scaler.is_none()
            && !self.random_mac
            && !self.random_serial
            && self.serial_number.is_none()
            && self.replace_disk.is_none()
            && self.disk_size_gb.is_none()
    }

    /// Apply this request to the named VM and persist the result.
    ///
    /// Steps run in a fixed order; serial handling must see the
    /// pre-update machine identity so the ECID survives. Any failure
    /// aborts before the record is rewritten.
    pub fn apply(&self, paths: &VmPaths) -> Result<VmRecord> {
        let mut record = VmRecord::load(paths)?;

        if let Some(count) = self.cpu_count {
            record.set_cpu_count(count)?;
        }
        if let Some(bytes) = self.memory_bytes {
            record.set_memory_bytes(bytes)?;
        }
        if let Some(update) = self.display {
            apply_display(&mut record, update);
        }
        if let Some(refit) = self.display_refit {
            record.display_refit = refit.as_option();
        }
        self.apply_accelerators(&mut record)?;
        if self.random_mac {
            record.mac_address = identity::generate_mac();
            tracing::debug!(vm = %record.name, mac = %record.mac_address, "mac regenerated");
        }
        self.apply_serial(&mut record)?;
        if let Some(source) = &self.replace_disk {
            disk::replace(paths, source)?;
        }
        if let Some(size_gb) = self.disk_size_gb {
            disk::resize(&paths.disk_file(), size_gb)?;
        }

        record.save(paths)?;
        Ok(record)
    }

    fn apply_accelerators(&self, record: &mut VmRecord) -> Result<()> {
        let requested = self.video_toolbox.is_some()
            || self.neural_engine.is_some()
            || self.neural_engine_signature_mismatch_allowed.is_some()
            || self.m2_scaler.is_some();
        if !requested {
            return Ok(());
        }

        record.require_macos("hardware acceleration")?;

        if let Some(value) = self.video_toolbox {
            record.video_toolbox = value;
        }
        if let Some(value) = self.neural_engine {
            record.neural_engine = value;
        }
        if let Some(value) = self.neural_engine_signature_mismatch_allowed {
            record.neural_engine_signature_mismatch_allowed = value;
        }
        if let Some(value) = self.m2_scaler {
            record.m2_scaler = value;
        }
        Ok(())
    }

    fn apply_serial(&self, record: &mut VmRecord) -> Result<()> {
        if !self.random_serial && self.serial_number.is_none() {
            return Ok(());
        }

        record.require_macos("serial number")?;

        // Last-applied-wins would silently drop one of the two requests.
        if self.random_serial && self.serial_number.is_some() {
            return Err(Error::invalid_argument(
                "an explicit serial number and a random one cannot be requested together",
            ));
        }

        let serial = match &self.serial_number {
            Some(value) => {
                identity::validate_serial(value)?;
                value.clone()
            }
            None => identity::generate_serial(),
        };

        record.machine_identity = Some(MachineIdentity::for_serial(
            serial.as_str(),
            record.machine_identity.as_ref(),
        ));
        record.serial_number = Some(serial);
        Ok(())
    }
}

/// Apply a display update. Zero dimensions leave the stored value alone.
fn apply_display(record: &mut VmRecord, update: DisplayUpdate) {
    if update.width > 0 {
        record.display.width = update.width;
    }
    if update.height > 0 {
        record.display.height = update.height;
    }
    if let Some(unit) = update.unit {
        record.display.unit = Some(unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::record::{DisplayConfig, GuestOs, MEMORY_GRANULARITY};
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn setup(guest_os: GuestOs) -> (TempDir, VmPaths) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("test-vm");
        std::fs::create_dir_all(&root).unwrap();
        let paths = VmPaths::at(root);

        let record = VmRecord::new("test-vm", guest_os, 2, 2 * GIB).unwrap();
        record.save(&paths).unwrap();
        disk::create_sparse(&paths.disk_file(), 2 * GIB).unwrap();

        (dir, paths)
    }

    #[test]
    fn test_set_cpu_round_trip() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let request = UpdateRequest {
            cpu_count: Some(6),
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        assert_eq!(VmRecord::load(&paths).unwrap().cpu_count, 6);
    }

    #[test]
    fn test_set_cpu_zero_fails_and_record_unchanged() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let request = UpdateRequest {
            cpu_count: Some(0),
            ..Default::default()
        };
        let err = request.apply(&paths).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(VmRecord::load(&paths).unwrap().cpu_count, 2);
    }

    #[test]
    fn test_set_memory_alignment() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let bad = UpdateRequest {
            memory_bytes: Some(MEMORY_GRANULARITY + 1),
            ..Default::default()
        };
        assert!(bad.apply(&paths).is_err());
        assert_eq!(VmRecord::load(&paths).unwrap().memory_bytes, 2 * GIB);

        let good = UpdateRequest {
            memory_bytes: Some(4 * GIB),
            ..Default::default()
        };
        good.apply(&paths).unwrap();
        assert_eq!(VmRecord::load(&paths).unwrap().memory_bytes, 4 * GIB);
    }

    #[test]
    fn test_display_partial_update() {
        let (_dir, paths) = setup(GuestOs::Linux);

        // Stored default is 1024x768. Width 0 means keep it.
        let request = UpdateRequest {
            display: Some(DisplayUpdate {
                width: 0,
                height: 600,
                unit: None,
            }),
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        let display = VmRecord::load(&paths).unwrap().display;
        assert_eq!(display.width, 1024);
        assert_eq!(display.height, 600);
        assert_eq!(display.unit, None);
    }

    #[test]
    fn test_display_unit_always_overwrites() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let request = UpdateRequest {
            display: Some(DisplayUpdate {
                width: 0,
                height: 0,
                unit: Some(DisplayUnit::Pixel),
            }),
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        assert_eq!(
            VmRecord::load(&paths).unwrap().display,
            DisplayConfig {
                width: 1024,
                height: 768,
                unit: Some(DisplayUnit::Pixel),
            }
        );
    }

    #[test]
    fn test_display_refit_tristate() {
        let (_dir, paths) = setup(GuestOs::Linux);

        for (requested, stored) in [
            (Tristate::On, Some(true)),
            (Tristate::Off, Some(false)),
            (Tristate::Unset, None),
        ] {
            let request = UpdateRequest {
                display_refit: Some(requested),
                ..Default::default()
            };
            request.apply(&paths).unwrap();
            assert_eq!(VmRecord::load(&paths).unwrap().display_refit, stored);
        }
    }

    #[test]
    fn test_bool_flag_parsing() {
        assert!(!parse_bool_flag("0").unwrap());
        assert!(parse_bool_flag("1").unwrap());
        for bad in ["2", "true", "yes", ""] {
            let err = parse_bool_flag(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_accelerator_flags_update_independently() {
        let (_dir, paths) = setup(GuestOs::Macos);

        let request = UpdateRequest {
            video_toolbox: Some(true),
            m2_scaler: Some(true),
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        let record = VmRecord::load(&paths).unwrap();
        assert!(record.video_toolbox);
        assert!(record.m2_scaler);
        assert!(!record.neural_engine);
        assert!(!record.neural_engine_signature_mismatch_allowed);
    }

    #[test]
    fn test_accelerators_need_macos_guest() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let request = UpdateRequest {
            neural_engine: Some(true),
            ..Default::default()
        };
        let err = request.apply(&paths).unwrap_err();
        assert!(matches!(err, Error::PlatformUnsupported(_)));
    }

    #[test]
    fn test_random_mac_is_local_unicast() {
        let (_dir, paths) = setup(GuestOs::Linux);
        let before = VmRecord::load(&paths).unwrap().mac_address;

        let request = UpdateRequest {
            random_mac: true,
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        let after = VmRecord::load(&paths).unwrap().mac_address;
        assert_ne!(before, after);
        let first = u8::from_str_radix(&after[..2], 16).unwrap();
        assert_eq!(first & 0x01, 0);
        assert_eq!(first & 0x02, 0x02);
    }

    #[test]
    fn test_explicit_serial_preserves_ecid() {
        let (_dir, paths) = setup(GuestOs::Macos);
        let before = VmRecord::load(&paths).unwrap();
        let old_ecid = before.machine_identity.as_ref().unwrap().ecid;

        let request = UpdateRequest {
            serial_number: Some("C02XL0ABHT".to_string()),
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        let after = VmRecord::load(&paths).unwrap();
        assert_eq!(after.serial_number.as_deref(), Some("C02XL0ABHT"));
        let id = after.machine_identity.unwrap();
        assert_eq!(id.serial_number, "C02XL0ABHT");
        assert_eq!(id.ecid, old_ecid);
    }

    #[test]
    fn test_random_serial_preserves_ecid() {
        let (_dir, paths) = setup(GuestOs::Macos);
        let before = VmRecord::load(&paths).unwrap();
        let old_serial = before.serial_number.clone().unwrap();
        let old_ecid = before.machine_identity.as_ref().unwrap().ecid;

        let request = UpdateRequest {
            random_serial: true,
            ..Default::default()
        };
        request.apply(&paths).unwrap();

        let after = VmRecord::load(&paths).unwrap();
        assert!(after.identity_consistent());
        assert_eq!(after.machine_identity.unwrap().ecid, old_ecid);
        // A fresh serial collides with the old one 1 in ~34^7 runs
        assert_ne!(after.serial_number.unwrap(), old_serial);
    }

    #[test]
    fn test_conflicting_serial_requests_fail() {
        let (_dir, paths) = setup(GuestOs::Macos);
        let before = VmRecord::load(&paths).unwrap();

        let request = UpdateRequest {
            random_serial: true,
            serial_number: Some("C02XL0ABHT".to_string()),
            ..Default::default()
        };
        let err = request.apply(&paths).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let after = VmRecord::load(&paths).unwrap();
        assert_eq!(after.serial_number, before.serial_number);
        assert_eq!(after.machine_identity, before.machine_identity);
    }

    #[test]
    fn test_invalid_serial_fails_with_value() {
        let (_dir, paths) = setup(GuestOs::Macos);

        let request = UpdateRequest {
            serial_number: Some("Z02XL0ABHT".to_string()),
            ..Default::default()
        };
        let err = request.apply(&paths).unwrap_err();
        assert!(err.to_string().contains("Z02XL0ABHT"));
    }

    #[test]
    fn test_serial_needs_macos_guest() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let request = UpdateRequest {
            random_serial: true,
            ..Default::default()
        };
        let err = request.apply(&paths).unwrap_err();
        assert!(matches!(err, Error::PlatformUnsupported(_)));
    }

    #[test]
    fn test_disk_resize_through_request() {
        let (_dir, paths) = setup(GuestOs::Linux);

        let shrink = UpdateRequest {
            disk_size_gb: Some(1),
            ..Default::default()
        };
        assert!(shrink.apply(&paths).is_err());

        let grow = UpdateRequest {
            disk_size_gb: Some(4),
            ..Default::default()
        };
        grow.apply(&paths).unwrap();
        assert_eq!(disk::sizes(&paths.disk_file()).unwrap().logical_gb(), 4);
    }

    #[test]
    fn test_failed_update_does_not_persist_earlier_steps() {
        let (_dir, paths) = setup(GuestOs::Macos);

        // CPU change is valid, serial is not; nothing may reach disk.
        let request = UpdateRequest {
            cpu_count: Some(8),
            serial_number: Some("bogus".to_string()),
            ..Default::default()
        };
        assert!(request.apply(&paths).is_err());

        assert_eq!(VmRecord::load(&paths).unwrap().cpu_count, 2);
    }

    #[test]
    fn test_empty_request() {
        let request = UpdateRequest::default();
        assert!(request.is_empty());

        let (_dir, paths) = setup(GuestOs::Linux);
        let before = VmRecord::load(&paths).unwrap();
        request.apply(&paths).unwrap();
        let after = VmRecord::load(&paths).unwrap();
        assert_eq!(after.cpu_count, before.cpu_count);
        assert_eq!(after.mac_address, before.mac_address);
    }

    #[test]
    fn test_tristate_parse() {
        assert_eq!("on".parse::<Tristate>().unwrap(), Tristate::On);
        assert_eq!("off".parse::<Tristate>().unwrap(), Tristate::Off);
        assert_eq!("unset".parse::<Tristate>().unwrap(), Tristate::Unset);
        assert!("maybe".parse::<Tristate>().is_err());
    }
}
