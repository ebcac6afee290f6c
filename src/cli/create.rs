//! Create command implementation.

use clap::Args;
use macvm::error::Error;
use macvm::paths::VmPaths;
use macvm::vm::disk::{self, BYTES_PER_GB};
use macvm::vm::record::{GuestOs, VmRecord, MEMORY_GRANULARITY};

/// Create a VM configuration record and disk.
#[derive(Args, Debug)]
pub struct CreateCmd {
    /// VM name.
    pub name: String,

    /// Guest OS flavor (linux or macos).
    #[arg(long, default_value = "linux")]
    pub os: GuestOs,

    /// Number of vCPUs.
    #[arg(long, default_value = "1")]
    pub cpu: u32,

    /// Memory in MiB.
    #[arg(long, default_value = "512")]
    pub memory: u64,

    /// Disk size in GB.
    #[arg(long, default_value = "20")]
    pub disk_size: u64,
}

impl CreateCmd {
    /// Execute the create command.
    pub fn run(&self) -> macvm::Result<()> {
        let paths = VmPaths::for_name(&self.name)?;

        if paths.exists() {
            return Err(Error::invalid_argument(format!(
                "vm '{}' already exists",
                self.name
            )));
        }

        let record = VmRecord::new(
            &self.name,
            self.os,
            self.cpu,
            self.memory * MEMORY_GRANULARITY,
        )?;

        std::fs::create_dir_all(paths.root())?;
        disk::create_sparse(&paths.disk_file(), self.disk_size * BYTES_PER_GB)?;
        record.save(&paths)?;

        tracing::info!(vm = %self.name, os = %self.os, "vm created");
        println!("Created VM: {}", self.name);

        Ok(())
    }
}
