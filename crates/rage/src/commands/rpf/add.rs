use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Args)]
pub struct AddArgs {
    /// A target RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A file or a directory to add
    #[arg(short, long, value_name = "PATH")]
    source: PathBuf,

    /// Directory inside the archive, created when missing
    #[arg(short, long, value_name = "PATH", default_value = "")]
    path: String,

    /// Replace files that already exist
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or(miette!("unable to convert {} to a string", path.display()))
}

impl AddArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = super::open(&self.file)?;

        if self.source.is_file() {
            let (_, dir) = super::create_directories(&mut rpf, &self.path)?;
            let data = std::fs::read(&self.source)
                .into_diagnostic()
                .context(format!("path: {}", self.source.display()))?;
            info!("adding {}", self.source.display());
            rpf.create_file(dir, file_name(&self.source)?, &data, self.overwrite)?;
            return Ok(());
        }

        let files = WalkDir::new(&self.source)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(miette!("directory is empty"));
        }

        for file in files {
            let name = file
                .path()
                .strip_prefix(&self.source)
                .into_diagnostic()?;
            let parent = name
                .parent()
                .map(|parent| parent.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            info!("adding {}", name.display());

            let (_, dir) = super::create_directories(&mut rpf, &format!("{}/{}", self.path, parent))?;
            let data = std::fs::read(file.path())
                .into_diagnostic()
                .context(format!("opening {}", file.path().display()))?;
            rpf.create_file(dir, file_name(file.path())?, &data, self.overwrite)
                .context(format!("adding {}", name.display()))?;
        }

        Ok(())
    }
}
