//! Archives, their entry tables and the package holding them.

use std::{
    fs::{File, OpenOptions},
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
};

use binrw::BinRead;
use bon::Builder;
use tracing::{debug, instrument, warn};

use crate::{
    entry::{ArchiveId, BinaryEntry, DirectoryEntry, EntryId, EntryKind, ResourceEntry, RpfEntry},
    error::{EntryNotFoundError, Error, Result},
    types::{
        block_count, EntryRecord, RpfEncryption, RpfHeader, BLOCK_SIZE, ENTRY_SIZE, MAX_U24,
    },
};
use rage_rsc::PageFlags;

/// Backing store of a package
///
/// Every archive of a package, nested ones included, lives in the same storage.
pub trait ArchiveStorage: Read + Write + Seek {
    /// Truncates or extends the storage to `len` bytes
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl ArchiveStorage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl ArchiveStorage for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

/// Options used when creating a new archive
#[derive(Debug, Clone, Copy, Builder)]
pub struct ArchiveOptions {
    /// Encryption written to the header
    #[builder(default)]
    pub encryption: RpfEncryption,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Entry counts gathered while scanning
///
/// `total_*` counts cover a single entry table. `grand_total_*` counts include every nested
/// archive and count each archive as one rpf and one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub total_file_count: u32,
    pub total_folder_count: u32,
    pub total_resource_count: u32,
    pub total_binary_count: u32,
    pub grand_total_rpf_count: u32,
    pub grand_total_file_count: u32,
    pub grand_total_folder_count: u32,
    pub grand_total_resource_count: u32,
    pub grand_total_binary_count: u32,
}

impl ArchiveStats {
    fn add_grand_totals(&mut self, other: &ArchiveStats) {
        self.grand_total_rpf_count += other.grand_total_rpf_count;
        self.grand_total_file_count += other.grand_total_file_count;
        self.grand_total_folder_count += other.grand_total_folder_count;
        self.grand_total_resource_count += other.grand_total_resource_count;
        self.grand_total_binary_count += other.grand_total_binary_count;
    }
}

/// One entry table and the blocks it manages
#[derive(Debug, Clone)]
pub struct RpfArchive {
    pub name: String,
    pub path: String,
    /// Absolute position of the archive header in the storage
    pub start_pos: u64,
    /// Bytes reserved for the archive, always a whole number of blocks once written
    pub file_size: u64,
    pub encryption: RpfEncryption,
    pub entry_count: u32,
    pub names_length: u32,
    pub root: EntryId,
    /// Entry table order, the root first
    pub all_entries: Vec<EntryId>,
    pub parent: Option<ArchiveId>,
    /// Binary entry in the parent that holds this archive
    pub parent_entry: Option<EntryId>,
    pub children: Vec<ArchiveId>,
    pub stats: ArchiveStats,
    pub last_error: Option<String>,
    pub extracted_byte_count: u64,
}

impl RpfArchive {
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    /// Blocks taken by the header, entry table and name table
    pub fn header_block_count(&self) -> u64 {
        block_count(
            RpfHeader::SIZE
                + self.entry_count as u64 * ENTRY_SIZE as u64
                + self.names_length as u64,
        )
    }
}

/// An RPF7 package, the top-level archive and everything nested in it
///
/// ```
/// # fn doit() -> rage_rpf::error::Result<()>
/// # {
/// use std::io::Cursor;
/// use rage_rpf::{ArchiveOptions, RpfFile};
///
/// let mut rpf = RpfFile::new(Cursor::new(Vec::new()), "update.rpf", ArchiveOptions::default())?;
/// let root = rpf.root_directory(rpf.root())?;
/// let entry = rpf.create_file(root, "a.txt", b"hello", false)?;
///
/// assert_eq!(rpf.extract_file(entry)?, Some(b"hello".to_vec()));
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug)]
pub struct RpfFile<S> {
    pub(crate) storage: S,
    pub(crate) archives: Vec<Option<RpfArchive>>,
    pub(crate) entries: Vec<Option<RpfEntry>>,
    pub(crate) root: ArchiveId,
}

impl RpfFile<File> {
    /// Creates a new, empty archive file, failing if `path` already exists
    #[instrument(skip(path), err, fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => {
                    Error::AlreadyExists(format!("file {}", path.display()))
                }
                _ => e.into(),
            })?;

        Self::new(file, &file_name(path), options)
    }

    /// Opens an existing archive file for reading and editing
    #[instrument(skip(path), err, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::read(file, &file_name(path))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl<S: ArchiveStorage> RpfFile<S> {
    /// Writes a new, empty archive at the start of `storage`
    #[instrument(skip(storage), err)]
    pub fn new(storage: S, name: &str, options: ArchiveOptions) -> Result<Self> {
        let mut rpf = Self::empty(storage);
        let archive = rpf.alloc_archive(name, name, 0, 0, None, None);
        rpf.root = archive;
        rpf.write_new_archive(archive, options.encryption, 0)?;
        Ok(rpf)
    }

    /// Reads the archive at the start of `storage`, including every nested archive
    #[instrument(skip(storage), err)]
    pub fn read(storage: S, name: &str) -> Result<Self> {
        let mut rpf = Self::empty(storage);
        let len = rpf.storage.seek(SeekFrom::End(0))?;
        let archive = rpf.alloc_archive(name, name, 0, len, None, None);
        rpf.root = archive;
        rpf.scan_structure(archive)?;
        Ok(rpf)
    }

    fn empty(storage: S) -> Self {
        Self {
            storage,
            archives: Vec::new(),
            entries: Vec::new(),
            root: ArchiveId(0),
        }
    }

    pub(crate) fn alloc_archive(
        &mut self,
        name: &str,
        path: &str,
        start_pos: u64,
        file_size: u64,
        parent: Option<ArchiveId>,
        parent_entry: Option<EntryId>,
    ) -> ArchiveId {
        let id = ArchiveId(self.archives.len());

        let mut root = RpfEntry::new(id, "", EntryKind::Directory(DirectoryEntry::default()));
        root.path = path.to_lowercase();
        let root = self.push_entry(root);

        self.archives.push(Some(RpfArchive {
            name: name.to_owned(),
            path: path.to_owned(),
            start_pos,
            file_size,
            encryption: RpfEncryption::default(),
            entry_count: 0,
            names_length: 0,
            root,
            all_entries: Vec::new(),
            parent,
            parent_entry,
            children: Vec::new(),
            stats: ArchiveStats::default(),
            last_error: None,
            extracted_byte_count: 0,
        }));

        id
    }

    /// Frees an archive, its entries and everything nested in it
    pub(crate) fn drop_archive(&mut self, archive: ArchiveId) {
        let Some(removed) = self.archives.get_mut(archive.0).and_then(Option::take) else {
            return;
        };

        for child in removed.children {
            self.drop_archive(child);
        }
        for id in removed.all_entries.into_iter().chain([removed.root]) {
            if let Some(slot) = self.entries.get_mut(id.0) {
                *slot = None;
            }
        }
    }

    #[instrument(skip(self), err)]
    fn read_header(&mut self, archive: ArchiveId) -> Result<()> {
        let (start_pos, root, path) = {
            let a = self.archive(archive)?;
            (a.start_pos, a.root, a.path.clone())
        };

        let storage_len = self.storage.seek(SeekFrom::End(0))?;
        self.storage.seek(SeekFrom::Start(start_pos))?;
        let header = RpfHeader::read(&mut self.storage).map_err(|e| match e {
            binrw::Error::BadMagic { .. } => {
                Error::InvalidArchive(format!("{} does not start with RPF7", path))
            }
            e => e.into(),
        })?;

        let encryption = RpfEncryption::try_from(header.encryption)?;
        if !encryption.is_supported() {
            return Err(Error::UnsupportedEncryption(encryption.to_string()));
        }

        let table_len = header.entry_count as u64 * ENTRY_SIZE as u64;
        if header.entry_count == 0
            || start_pos + RpfHeader::SIZE + table_len + header.names_length as u64 > storage_len
        {
            return Err(Error::InvalidArchive(format!(
                "{} has a header for {} entries that does not fit the file",
                path, header.entry_count
            )));
        }

        let mut entries_data = vec![0; table_len as usize];
        self.storage.read_exact(&mut entries_data)?;
        let mut names_data = vec![0; header.names_length as usize];
        self.storage.read_exact(&mut names_data)?;

        let mut stats = ArchiveStats::default();
        let mut parsed = Vec::with_capacity(header.entry_count as usize);
        for (index, data) in entries_data.chunks_exact(ENTRY_SIZE).enumerate() {
            let (name_offset, kind) = match EntryRecord::parse(data)? {
                EntryRecord::Directory(record) => {
                    stats.total_folder_count += 1;
                    let dir = DirectoryEntry {
                        entries_index: record.entries_index,
                        entries_count: record.entries_count,
                        ..Default::default()
                    };
                    (record.name_offset, EntryKind::Directory(dir))
                }
                EntryRecord::Binary(record) => {
                    stats.total_binary_count += 1;
                    stats.total_file_count += 1;
                    let is_encrypted = match record.word_12 {
                        0 => false,
                        1 => true,
                        other => {
                            return Err(Error::InvalidArchive(format!(
                                "entry {} of {} has encryption type {}",
                                index, path, other
                            )))
                        }
                    };
                    let file = BinaryEntry {
                        file_offset: record.offset(),
                        file_size: record.size(),
                        uncompressed_size: record.word_8,
                        is_encrypted,
                    };
                    (record.name_offset as u32, EntryKind::Binary(file))
                }
                EntryRecord::Resource(record) => {
                    stats.total_resource_count += 1;
                    stats.total_file_count += 1;
                    let file_offset = record.offset() & 0x7F_FFFF;
                    let mut file_size = record.size();
                    if file_size == MAX_U24 {
                        file_size = self.read_large_resource_size(
                            start_pos + file_offset as u64 * BLOCK_SIZE,
                        )?;
                    }
                    let file = ResourceEntry {
                        file_offset,
                        file_size,
                        system_flags: PageFlags::new(record.word_8),
                        graphics_flags: PageFlags::new(record.word_12),
                        is_encrypted: false,
                    };
                    (record.name_offset as u32, EntryKind::Resource(file))
                }
            };

            let name = read_name(&names_data, name_offset).ok_or_else(|| {
                Error::InvalidArchive(format!(
                    "entry {} of {} has a name outside the name table",
                    index, path
                ))
            })?;

            let mut entry = RpfEntry::new(archive, &name, kind);
            entry.name_offset = name_offset;
            if let EntryKind::Resource(file) = &mut entry.kind {
                file.is_encrypted = entry.name_lower.ends_with(".ysc");
            }
            parsed.push(entry);
        }

        if !parsed.first().is_some_and(RpfEntry::is_directory) {
            return Err(Error::InvalidArchive(format!(
                "first entry of {} is not a directory",
                path
            )));
        }

        let mut ids = Vec::with_capacity(parsed.len());
        for (index, mut entry) in parsed.into_iter().enumerate() {
            if index == 0 {
                entry.path = path.to_lowercase();
                self.entries[root.0] = Some(entry);
                ids.push(root);
            } else {
                ids.push(self.push_entry(entry));
            }
        }

        {
            let a = self.archive_mut(archive)?;
            a.encryption = encryption;
            a.entry_count = header.entry_count;
            a.names_length = header.names_length;
            a.all_entries = ids.clone();
            a.stats = stats;
        }

        self.link_entries(&ids)?;

        debug!(
            "read {} entries of {} at {:#X}",
            header.entry_count, path, start_pos
        );

        Ok(())
    }

    /// Rebuilds the directory tree from the child ranges of the entry table
    fn link_entries(&mut self, ids: &[EntryId]) -> Result<()> {
        let mut linked = vec![false; ids.len()];
        linked[0] = true;
        let mut stack = vec![ids[0]];

        while let Some(dir_id) = stack.pop() {
            let (index, count, dir_path) = {
                let entry = self.entry(dir_id)?;
                let dir = self.directory(dir_id)?;
                (
                    dir.entries_index as usize,
                    dir.entries_count as usize,
                    entry.path.clone(),
                )
            };

            let end = index
                .checked_add(count)
                .filter(|end| *end <= ids.len())
                .ok_or_else(|| {
                    Error::InvalidArchive(format!(
                        "directory {} lists entries past the end of the table",
                        dir_path
                    ))
                })?;

            for (position, child) in ids.iter().copied().enumerate().take(end).skip(index) {
                if linked[position] {
                    return Err(Error::InvalidArchive(format!(
                        "entry {} is listed twice",
                        position
                    )));
                }
                linked[position] = true;

                let entry = self.entry_mut(child)?;
                entry.parent = Some(dir_id);
                entry.path = format!("{}/{}", dir_path, entry.name_lower);
                let is_directory = entry.is_directory();

                let dir = self.directory_mut(dir_id)?;
                if is_directory {
                    dir.directories.push(child);
                    stack.push(child);
                } else {
                    dir.files.push(child);
                }
            }
        }

        Ok(())
    }

    /// Size of a resource too large for its entry, packed into bytes of its stored header
    fn read_large_resource_size(&mut self, position: u64) -> Result<u32> {
        let mut header = [0; 16];
        self.storage.seek(SeekFrom::Start(position))?;
        self.storage.read_exact(&mut header)?;

        Ok(header[7] as u32
            | (header[14] as u32) << 8
            | (header[5] as u32) << 16
            | (header[2] as u32) << 24)
    }

    /// Reads the entry table and scans every nested archive
    ///
    /// Nested archives that fail to scan are logged, recorded in `last_error` and left out.
    #[instrument(skip(self), err)]
    pub(crate) fn scan_structure(&mut self, archive: ArchiveId) -> Result<()> {
        self.read_header(archive)?;

        let mut stats = self.archive(archive)?.stats;
        stats.grand_total_rpf_count = 1;
        stats.grand_total_file_count = 1;

        let start_pos = self.archive(archive)?.start_pos;
        let all_entries = self.archive(archive)?.all_entries.clone();
        for id in all_entries {
            let entry = self.entry(id)?;
            match &entry.kind {
                EntryKind::Binary(file) if entry.name_lower.ends_with(".rpf") => {
                    let name = entry.name.clone();
                    let path = entry.path.clone();
                    let size = entry.stored_size();
                    let child_start = start_pos + file.file_offset as u64 * BLOCK_SIZE;

                    let child = self.alloc_archive(
                        &name,
                        &path,
                        child_start,
                        size,
                        Some(archive),
                        Some(id),
                    );

                    match self.scan_structure(child) {
                        Ok(()) => {
                            stats.add_grand_totals(&self.archive(child)?.stats);
                            self.archive_mut(archive)?.children.push(child);
                        }
                        Err(e) => {
                            warn!("unable to scan nested archive {}: {}", path, e);
                            self.archive_mut(archive)?.last_error = Some(e.to_string());
                            self.drop_archive(child);
                        }
                    }
                }
                EntryKind::Binary(_) => {
                    stats.grand_total_binary_count += 1;
                    stats.grand_total_file_count += 1;
                }
                EntryKind::Resource(_) => {
                    stats.grand_total_resource_count += 1;
                    stats.grand_total_file_count += 1;
                }
                EntryKind::Directory(_) => {
                    stats.grand_total_folder_count += 1;
                }
            }
        }

        self.archive_mut(archive)?.stats = stats;

        Ok(())
    }

    /// Unwrap and return the storage
    pub fn into_inner(self) -> S {
        self.storage
    }

    pub fn get_ref(&self) -> &S {
        &self.storage
    }
}

fn read_name(names: &[u8], offset: u32) -> Option<String> {
    let rest = names.get(offset as usize..)?;
    let end = rest.iter().position(|b| *b == 0)?;
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Lookups, available for any storage
impl<S> RpfFile<S> {
    /// The top-level archive
    pub fn root(&self) -> ArchiveId {
        self.root
    }

    pub fn archive(&self, id: ArchiveId) -> Result<&RpfArchive> {
        self.archives
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::EntryNotFound(EntryNotFoundError::Archive(id)))
    }

    pub(crate) fn archive_mut(&mut self, id: ArchiveId) -> Result<&mut RpfArchive> {
        self.archives
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::EntryNotFound(EntryNotFoundError::Archive(id)))
    }

    /// Every archive of the package, parents before their children
    pub fn archives(&self) -> Vec<ArchiveId> {
        let mut archives = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Ok(archive) = self.archive(id) {
                archives.push(id);
                stack.extend(archive.children.iter().rev().copied());
            }
        }
        archives
    }

    pub fn children(&self, archive: ArchiveId) -> Result<&[ArchiveId]> {
        Ok(&self.archive(archive)?.children)
    }

    /// Entries of an archive in entry table order
    pub fn entries(&self, archive: ArchiveId) -> Result<&[EntryId]> {
        Ok(&self.archive(archive)?.all_entries)
    }

    pub fn root_directory(&self, archive: ArchiveId) -> Result<EntryId> {
        Ok(self.archive(archive)?.root)
    }

    pub fn entry(&self, id: EntryId) -> Result<&RpfEntry> {
        self.entries
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::EntryNotFound(EntryNotFoundError::Id(id)))
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Result<&mut RpfEntry> {
        self.entries
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::EntryNotFound(EntryNotFoundError::Id(id)))
    }

    pub(crate) fn push_entry(&mut self, entry: RpfEntry) -> EntryId {
        self.entries.push(Some(entry));
        EntryId(self.entries.len() - 1)
    }

    pub fn directory(&self, id: EntryId) -> Result<&DirectoryEntry> {
        let entry = self.entry(id)?;
        entry
            .directory()
            .ok_or_else(|| Error::InvalidOperation(format!("{} is not a directory", entry.path)))
    }

    pub(crate) fn directory_mut(&mut self, id: EntryId) -> Result<&mut DirectoryEntry> {
        let entry = self.entry_mut(id)?;
        let path = entry.path.clone();
        entry
            .directory_mut()
            .ok_or_else(|| Error::InvalidOperation(format!("{} is not a directory", path)))
    }

    /// Nested archive stored in `entry`, if it has been scanned
    pub fn find_child_archive(&self, archive: ArchiveId, entry: EntryId) -> Option<ArchiveId> {
        self.archive(archive).ok()?.children.iter().copied().find(|child| {
            matches!(self.archive(*child), Ok(child) if child.parent_entry == Some(entry))
        })
    }

    fn find_child(&self, list: &[EntryId], name_lower: &str) -> Option<EntryId> {
        list.iter()
            .copied()
            .find(|id| matches!(self.entry(*id), Ok(entry) if entry.name_lower == name_lower))
    }

    /// Looks up an entry by its path below the archive root, ignoring case
    ///
    /// Both `/` and `\` separate path parts. An empty path is the root directory.
    pub fn find_entry(&self, archive: ArchiveId, path: &str) -> Result<Option<EntryId>> {
        let mut current = self.root_directory(archive)?;
        for part in split_path(path) {
            let Some(dir) = self.entry(current)?.directory() else {
                return Ok(None);
            };
            let part = part.to_lowercase();
            match self
                .find_child(&dir.directories, &part)
                .or_else(|| self.find_child(&dir.files, &part))
            {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Files of `folder`, and of all folders below it when `recurse` is set
    ///
    /// An unknown folder has no files.
    pub fn get_files(&self, archive: ArchiveId, folder: &str, recurse: bool) -> Result<Vec<EntryId>> {
        let mut dir = self.root_directory(archive)?;
        for part in split_path(folder) {
            let part = part.to_lowercase();
            match self.find_child(&self.directory(dir)?.directories, &part) {
                Some(next) => dir = next,
                None => return Ok(Vec::new()),
            }
        }

        let mut files = Vec::new();
        self.collect_files(dir, recurse, &mut files)?;
        Ok(files)
    }

    fn collect_files(&self, dir: EntryId, recurse: bool, files: &mut Vec<EntryId>) -> Result<()> {
        let dir = self.directory(dir)?;
        files.extend_from_slice(&dir.files);
        if recurse {
            for sub in &dir.directories {
                self.collect_files(*sub, recurse, files)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(|c| c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
}
