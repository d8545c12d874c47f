use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::{fs::File, io::Write, path::PathBuf};
use tracing::{info, warn};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Write files as they are stored instead of decompressing them
    #[arg(long, default_value_t = false)]
    raw: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;
        let prefix = format!("{}/", rpf.archive(rpf.root())?.path.to_lowercase());

        for archive in rpf.archives() {
            for id in rpf.get_files(archive, "", true)? {
                // nested archives are written out as directories of their own
                if rpf.find_child_archive(archive, id).is_some() {
                    continue;
                }

                let path = rpf.entry(id)?.path.clone();
                let data = if self.raw {
                    rpf.extract_file_raw(id)?
                } else {
                    rpf.extract_file(id)?
                };
                let Some(data) = data else {
                    warn!("{} has no data", path);
                    continue;
                };

                let p = self
                    .directory
                    .join(path.strip_prefix(&prefix).unwrap_or(&path));
                info!("writing {}", p.display());

                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)
                        .into_diagnostic()
                        .context(format!("creating {}", parent.display()))?;
                }
                let mut out = if !self.overwrite {
                    File::create_new(&p)
                        .into_diagnostic()
                        .context(format!("creating {}", &p.display()))?
                } else {
                    File::create(&p)
                        .into_diagnostic()
                        .context(format!("creating {}", &p.display()))?
                };

                out.write_all(&data).into_diagnostic()?;
            }
        }

        Ok(())
    }
}
