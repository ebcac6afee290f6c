//! macvm CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// macvm - virtual machine configuration manager
#[derive(Parser, Debug)]
#[command(name = "macvm")]
#[command(about = "Virtual machine configuration manager")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a VM configuration record and disk.
    Create(cli::create::CreateCmd),

    /// Change configuration of an existing VM.
    Set(cli::set::SetCmd),

    /// Show configuration of a VM.
    Get(cli::get::GetCmd),

    /// List all VMs.
    #[command(alias = "ls")]
    List(cli::list::ListCmd),

    /// Delete a VM.
    #[command(alias = "rm")]
    Delete(cli::delete::DeleteCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    tracing::debug!(version = macvm::VERSION, "starting macvm");

    let result = match cli.command {
        Commands::Create(cmd) => cmd.run(),
        Commands::Set(cmd) => cmd.run(),
        Commands::Get(cmd) => cmd.run(),
        Commands::List(cmd) => cmd.run(),
        Commands::Delete(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("macvm=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
