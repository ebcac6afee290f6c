//! Get command implementation.

use clap::{Args, ValueEnum};
use macvm::paths::VmPaths;
use macvm::vm::info::VmInfo;

/// Output format for the projection.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Key: Value lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Show configuration of a VM.
#[derive(Args, Debug)]
pub struct GetCmd {
    /// VM name.
    pub name: String,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl GetCmd {
    /// Execute the get command.
    pub fn run(&self) -> macvm::Result<()> {
        let paths = VmPaths::for_name(&self.name)?;
        let info = VmInfo::collect(&paths)?;

        match self.format {
            OutputFormat::Text => print!("{}", info.render_text()),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&info).unwrap())
            }
        }

        Ok(())
    }
}
