//! List command implementation.

use clap::Args;
use macvm::paths::{self, VmPaths};
use macvm::vm::info::VmInfo;

/// List all VMs.
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListCmd {
    /// Execute the list command.
    pub fn run(&self) -> macvm::Result<()> {
        let vms = collect_vms()?;

        if vms.is_empty() {
            if self.json {
                println!("[]");
            } else {
                println!("No VMs found");
            }
            return Ok(());
        }

        if self.json {
            let json_vms: Vec<_> = vms
                .iter()
                .map(|(name, info)| {
                    serde_json::json!({
                        "name": name,
                        "os": info.os,
                        "state": info.state,
                        "cpu": info.cpu,
                        "memory_mb": info.memory_mb,
                        "disk_gb": info.disk_gb,
                        "display": info.display,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json_vms).unwrap());
        } else {
            // Table output
            println!(
                "{:<20} {:<8} {:<10} {:<6} {:<10} {:<8}",
                "NAME", "OS", "STATE", "CPU", "MEMORY", "DISK"
            );
            println!("{}", "-".repeat(68));

            for (name, info) in &vms {
                println!(
                    "{:<20} {:<8} {:<10} {:<6} {:<10} {:<8}",
                    truncate(name, 18),
                    info.os,
                    info.state,
                    info.cpu,
                    format!("{} MB", info.memory_mb),
                    format!("{} GB", info.disk_gb),
                );
            }
        }

        Ok(())
    }
}

/// Collect projections for every VM directory, sorted by name.
fn collect_vms() -> macvm::Result<Vec<(String, VmInfo)>> {
    let vms_dir = paths::vms_dir()?;
    if !vms_dir.exists() {
        return Ok(Vec::new());
    }

    let mut vms = Vec::new();
    for entry in std::fs::read_dir(&vms_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let vm_paths = VmPaths::at(entry.path());
        if !vm_paths.exists() {
            continue;
        }

        match VmInfo::collect(&vm_paths) {
            Ok(info) => vms.push((vm_paths.name().to_string(), info)),
            Err(e) => {
                tracing::warn!(vm = %vm_paths.name(), error = %e, "skipping unreadable record");
                eprintln!("Warning: skipping '{}': {}", vm_paths.name(), e);
            }
        }
    }

    vms.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vms)
}

/// Truncate a string to max length, adding "..." if needed.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max - 3])
    }
}
