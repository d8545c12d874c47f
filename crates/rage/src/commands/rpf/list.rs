use clap::Args;
use itertools::Itertools;
use miette::Result;
use owo_colors::OwoColorize;
use rage_rpf::{ArchiveId, EntryId, EntryKind, RpfFile};
use std::{fs::File, path::PathBuf};

#[derive(Args)]
pub struct ListArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Directory to list, nested archives can be part of the path
    #[arg(short, long, value_name = "PATH", default_value = "")]
    path: String,

    /// List everything below the directory
    #[arg(short, long, default_value_t = false)]
    recursive: bool,
}

impl ListArgs {
    fn list(
        &self,
        rpf: &RpfFile<File>,
        archive: ArchiveId,
        dir: EntryId,
        depth: usize,
    ) -> Result<()> {
        let directory = rpf.directory(dir)?;
        let children = directory
            .directories
            .iter()
            .chain(&directory.files)
            .map(|id| rpf.entry(*id).map(|entry| (*id, entry)))
            .collect::<rage_rpf::error::Result<Vec<_>>>()?
            .into_iter()
            .sorted_by(|a, b| a.1.name_lower.cmp(&b.1.name_lower));

        let indent = "  ".repeat(depth);
        for (id, entry) in children {
            match &entry.kind {
                EntryKind::Directory(_) => {
                    println!("{}{}/", indent, entry.name.blue());
                    if self.recursive {
                        self.list(rpf, archive, id, depth + 1)?;
                    }
                }
                EntryKind::Binary(_) => {
                    let name = format!("{}{}", indent, entry.name);
                    println!("{:<64} {:>12}", name, entry.stored_size());

                    if self.recursive {
                        if let Some(child) = rpf.find_child_archive(archive, id) {
                            self.list(rpf, child, rpf.root_directory(child)?, depth + 1)?;
                        }
                    }
                }
                EntryKind::Resource(resource) => {
                    let name = format!(
                        "{}{} {}",
                        indent,
                        entry.name,
                        format!(
                            "(v{}, system {}, graphics {})",
                            resource.version(),
                            resource.system_flags.size(),
                            resource.graphics_flags.size()
                        )
                        .dimmed()
                    );
                    println!("{:<64} {:>12}", name, entry.stored_size());
                }
            }
        }

        Ok(())
    }

    pub fn handle(&self) -> Result<()> {
        let rpf = super::open(&self.file)?;
        let (archive, dir) = super::resolve_directory(&rpf, &self.path)?;
        self.list(&rpf, archive, dir, 0)
    }
}
