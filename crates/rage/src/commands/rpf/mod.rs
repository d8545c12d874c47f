pub mod add;
pub mod defrag;
pub mod extract;
pub mod list;
pub mod mkdir;
pub mod mv;
pub mod new;
pub mod rm;

use std::{fs::File, path::Path};

use miette::{miette, Context, Result};
use rage_rpf::{error::EntryNotFoundError, ArchiveId, EntryId, RpfFile};

#[derive(clap::Subcommand)]
pub enum RpfCommands {
    /// Create an empty RPF file
    New(new::NewArgs),
    /// List the entries of an RPF file
    List(list::ListArgs),
    /// Extract an RPF file, nested archives included, into a directory
    Extract(extract::ExtractArgs),
    /// Add a file or a directory tree to an RPF file
    Add(add::AddArgs),
    /// Create a directory inside an RPF file
    Mkdir(mkdir::MkdirArgs),
    /// Delete an entry from an RPF file
    Rm(rm::RmArgs),
    /// Rename an entry of an RPF file
    Mv(mv::MvArgs),
    /// Remove the holes between files of an RPF file
    Defrag(defrag::DefragArgs),
    /// Extract every file in memory and report the ones that fail
    Test(test::TestArgs),
}

impl RpfCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            RpfCommands::New(new) => new.handle(),
            RpfCommands::List(list) => list.handle(),
            RpfCommands::Extract(extract) => extract.handle(),
            RpfCommands::Add(add) => add.handle(),
            RpfCommands::Mkdir(mkdir) => mkdir.handle(),
            RpfCommands::Rm(rm) => rm.handle(),
            RpfCommands::Mv(mv) => mv.handle(),
            RpfCommands::Defrag(defrag) => defrag.handle(),
            RpfCommands::Test(test) => test.handle(),
        }
    }
}

pub(crate) fn open(path: &Path) -> Result<RpfFile<File>> {
    RpfFile::open(path).context(format!("path: {}", path.display()))
}

fn parts(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|part| !part.is_empty())
}

/// Steps into the archive stored in `entry`, if there is one
fn enter(rpf: &RpfFile<File>, archive: ArchiveId, entry: EntryId) -> Result<(ArchiveId, EntryId)> {
    match rpf.find_child_archive(archive, entry) {
        Some(child) => Ok((child, rpf.root_directory(child)?)),
        None => Ok((archive, entry)),
    }
}

/// Finds an entry by a path that may cross into nested archives
pub(crate) fn resolve(rpf: &RpfFile<File>, path: &str) -> Result<(ArchiveId, EntryId)> {
    let mut archive = rpf.root();
    let mut current = rpf.root_directory(archive)?;

    for part in parts(path) {
        (archive, current) = enter(rpf, archive, current)?;
        current = child(rpf, current, part)?
            .ok_or(rage_rpf::error::Error::from(EntryNotFoundError::Path(path.to_owned())))?;
    }

    Ok((archive, current))
}

/// Like [`resolve`], but a path naming a nested archive gives that archive's root directory
pub(crate) fn resolve_directory(rpf: &RpfFile<File>, path: &str) -> Result<(ArchiveId, EntryId)> {
    let (archive, entry) = resolve(rpf, path)?;
    enter(rpf, archive, entry)
}

fn child(rpf: &RpfFile<File>, dir: EntryId, name: &str) -> Result<Option<EntryId>> {
    let name = name.to_lowercase();
    let dir = rpf.directory(dir)?;
    for id in dir.directories.iter().chain(&dir.files) {
        if rpf.entry(*id)?.name_lower == name {
            return Ok(Some(*id));
        }
    }
    Ok(None)
}

/// Resolves a directory path, creating whatever is missing along the way
pub(crate) fn create_directories(
    rpf: &mut RpfFile<File>,
    path: &str,
) -> Result<(ArchiveId, EntryId)> {
    let mut archive = rpf.root();
    let mut current = rpf.root_directory(archive)?;

    for part in parts(path) {
        (archive, current) = enter(rpf, archive, current)?;
        current = match child(rpf, current, part)? {
            Some(next) => next,
            None => rpf.create_directory(current, part)?,
        };
    }

    let (archive, current) = enter(rpf, archive, current)?;
    if !rpf.entry(current)?.is_directory() {
        return Err(miette!("{} is a file", rpf.entry(current)?.path));
    }
    Ok((archive, current))
}
