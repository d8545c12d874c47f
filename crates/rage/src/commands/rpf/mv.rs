use clap::Args;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct MvArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// The entry to rename
    #[arg(short, long, value_name = "PATH")]
    path: String,

    /// Its new name
    #[arg(short, long, value_name = "NAME")]
    name: String,
}

impl MvArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;
        let (_, entry) = super::resolve(&rpf, &self.path)?;
        rpf.rename_entry(entry, &self.name)?;
        info!("renamed to {}", rpf.entry(entry)?.path);
        Ok(())
    }
}
