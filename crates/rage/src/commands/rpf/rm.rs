use clap::Args;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RmArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// The entry to delete
    #[arg(short, long, value_name = "PATH")]
    path: String,
}

impl RmArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;
        let (_, entry) = super::resolve(&rpf, &self.path)?;
        info!("deleting {}", rpf.entry(entry)?);
        rpf.delete_entry(entry)?;
        Ok(())
    }
}
