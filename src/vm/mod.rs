//! VM configuration records, identity and disk management.

pub mod disk;
pub mod identity;
pub mod info;
pub mod record;
pub mod update;
