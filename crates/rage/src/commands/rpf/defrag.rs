use clap::Args;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct DefragArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl DefragArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;
        let before = rpf.archive(rpf.root())?.file_size;

        // children before their parents
        for archive in rpf.archives().into_iter().rev() {
            info!("defragmenting {}", rpf.archive(archive)?.path);
            rpf.defragment(archive)?;
        }

        let after = rpf.archive(rpf.root())?.file_size;
        println!("{}: {} -> {} bytes", self.file.display(), before, after);
        Ok(())
    }
}
