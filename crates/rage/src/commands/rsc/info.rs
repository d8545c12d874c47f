use clap::Args;
use itertools::Itertools;
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use rage_rsc::{read_header, PageFlags};
use std::path::PathBuf;

#[derive(Args)]
pub struct InfoArgs {
    /// An input resource file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

fn print_heap(name: &str, flags: PageFlags) {
    println!(
        "{} {:#010X}: {} bytes in {} pages",
        name.blue(),
        flags.value(),
        flags.size(),
        flags.count()
    );

    let buckets = flags
        .page_counts()
        .iter()
        .zip(flags.base_sizes())
        .filter(|(count, _)| **count > 0)
        .map(|(count, size)| format!("{} x {:#X}", count, size))
        .join(", ");
    if !buckets.is_empty() {
        println!("  {}", buckets);
    }

    for page in flags.pages() {
        println!("  {:#010X} {:#X}", page.offset, page.size);
    }
}

impl InfoArgs {
    pub fn handle(&self) -> Result<()> {
        let data = std::fs::read(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", self.file.display()))?;
        let header = read_header(&data)?;

        println!("{} {}", "version".blue(), header.version);
        if header.flags_version() != header.version {
            println!(
                "{} page flags are tagged with version {}",
                "warning:".yellow(),
                header.flags_version()
            );
        }
        print_heap("system", header.system_page_flags());
        print_heap("graphics", header.graphics_page_flags());
        println!("{} {} bytes", "stored".blue(), data.len());

        Ok(())
    }
}
