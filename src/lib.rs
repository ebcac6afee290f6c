//! macvm - virtual machine configuration manager.
//!
//! macvm manages per-VM configuration records and their disk artifacts.
//! Each VM is a directory under the platform data dir holding a JSON
//! record ([`vm::record::VmRecord`]) and a sparse raw disk image. The
//! record is loaded wholesale, mutated through a sparse
//! [`vm::update::UpdateRequest`], and rewritten atomically.
//!
//! Running VMs are the hypervisor's business, not ours: this crate only
//! edits persisted configuration and reports it back.

pub mod error;
pub mod paths;
pub mod vm;

pub use error::{Error, Result};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
