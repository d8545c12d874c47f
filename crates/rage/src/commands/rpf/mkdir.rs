use clap::Args;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct MkdirArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// The directory to create, missing parents are created too
    #[arg(short, long, value_name = "PATH")]
    path: String,
}

impl MkdirArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;
        let (_, dir) = super::create_directories(&mut rpf, &self.path)?;
        info!("created {}", rpf.entry(dir)?.path);
        Ok(())
    }
}
