//! Delete command implementation.

use clap::Args;
use macvm::error::Error;
use macvm::paths::VmPaths;

/// Delete a VM.
#[derive(Args, Debug)]
pub struct DeleteCmd {
    /// VM name to delete.
    pub name: String,

    /// Force deletion without confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl DeleteCmd {
    /// Execute the delete command.
    pub fn run(&self) -> macvm::Result<()> {
        let paths = VmPaths::for_name(&self.name)?;

        if !paths.exists() {
            return Err(Error::VmNotFound(self.name.clone()));
        }

        // Confirm deletion unless --force
        if !self.force {
            eprint!("Delete VM '{}'? [y/N] ", self.name);
            let mut input = String::new();
            if std::io::stdin().read_line(&mut input).is_ok() {
                let input = input.trim().to_lowercase();
                if input != "y" && input != "yes" {
                    println!("Cancelled");
                    return Ok(());
                }
            } else {
                println!("Cancelled");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(paths.root())?;

        tracing::info!(vm = %self.name, "vm deleted");
        println!("Deleted VM '{}'", self.name);

        Ok(())
    }
}
