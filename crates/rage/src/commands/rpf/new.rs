use clap::Args;
use miette::{Context, Result};
use rage_rpf::{ArchiveOptions, RpfFile};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct NewArgs {
    /// The RPF file to create
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl NewArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", self.file.display());
        RpfFile::create(&self.file, ArchiveOptions::default())
            .context(format!("path: {}", self.file.display()))?;
        Ok(())
    }
}
