//! Machine identity: serial numbers, ECID, MAC addresses.
//!
//! A macOS guest carries a serial number plus a [`MachineIdentity`] binding
//! that serial to a stable instance id (ECID). The ECID survives serial
//! edits; it only changes when a VM gains an identity for the first time.

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters allowed in the serial-number suffix.
///
/// Uppercase alphanumerics with `I` and `O` removed, so a serial is never
/// ambiguous when read off a label.
pub const SERIAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Valid first characters of a serial number.
pub const MODEL_CODES: [char; 4] = ['C', 'D', 'F', 'G'];

/// Serial numbers are exactly this long.
pub const SERIAL_LEN: usize = 10;

// Two-digit year range used when generating serials.
const YEAR_MIN: u32 = 10;
const YEAR_MAX: u32 = 26;

/// Validate a serial number against the grammar
/// `[model code][digit][digit][7 x alphabet]`.
pub fn validate_serial(serial: &str) -> Result<()> {
    if serial.chars().count() != SERIAL_LEN {
        return Err(Error::invalid_argument(format!(
            "serial number '{}' must be exactly {} characters",
            serial, SERIAL_LEN
        )));
    }

    let mut chars = serial.chars();
    let model = chars.next().unwrap_or_default();
    if !MODEL_CODES.contains(&model) {
        return Err(Error::invalid_argument(format!(
            "serial number '{}' must start with one of {:?}",
            serial, MODEL_CODES
        )));
    }

    for c in chars.by_ref().take(2) {
        if !c.is_ascii_digit() {
            return Err(Error::invalid_argument(format!(
                "serial number '{}' must have digits in positions 2-3",
                serial
            )));
        }
    }

    for c in chars {
        if !c.is_ascii() || !SERIAL_ALPHABET.contains(&(c as u8)) {
            return Err(Error::invalid_argument(format!(
                "serial number '{}' contains '{}' outside the allowed alphabet",
                serial, c
            )));
        }
    }

    Ok(())
}

/// Generate a random serial number conforming to [`validate_serial`].
pub fn generate_serial() -> String {
    let mut rng = rand::rng();

    let model = MODEL_CODES[rng.random_range(0..MODEL_CODES.len())];
    let year = rng.random_range(YEAR_MIN..=YEAR_MAX);
    let suffix: String = (0..SERIAL_LEN - 3)
        .map(|_| SERIAL_ALPHABET[rng.random_range(0..SERIAL_ALPHABET.len())] as char)
        .collect();

    format!("{}{:02}{}", model, year, suffix)
}

/// Identity binding a serial number to a stable instance id.
///
/// Persisted inside the VM record; must always agree with the record's
/// `serial_number` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    /// Serial number this identity was built for.
    pub serial_number: String,

    /// Stable instance id, preserved across serial edits.
    pub ecid: u64,
}

impl MachineIdentity {
    /// Create a fresh identity with a random ECID.
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            ecid: rand::rng().random(),
        }
    }

    /// Create an identity with an explicit ECID.
    pub fn with_ecid(serial_number: impl Into<String>, ecid: u64) -> Self {
        Self {
            serial_number: serial_number.into(),
            ecid,
        }
    }

    /// Rebuild an identity for a new serial number.
    ///
    /// The ECID of `previous` is carried over when present; a VM only gets
    /// a new instance id when it never had one.
    pub fn for_serial(serial_number: impl Into<String>, previous: Option<&MachineIdentity>) -> Self {
        match previous {
            Some(prev) => Self::with_ecid(serial_number, prev.ecid),
            None => Self::new(serial_number),
        }
    }
}

/// Generate a random locally-administered unicast MAC address.
///
/// The first octet has the multicast bit clear and the local bit set, so
/// the address can never collide with a vendor-assigned one.
pub fn generate_mac() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 6];
    rng.fill(&mut bytes[..]);
    bytes[0] = (bytes[0] & 0xfc) | 0x02;

    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
