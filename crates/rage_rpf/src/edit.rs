//! Structural changes to archives.
//!
//! Every change rebuilds the entry table and rewrites the header of the archive it touches.

use std::{borrow::Cow, io::SeekFrom};

use byteorder::{ByteOrder, LE};
use rage_rsc::{compression::deflate, types::RESOURCE_IDENT, PageFlags};
use tracing::{debug, instrument, warn};

use crate::{
    archive::{ArchiveOptions, ArchiveStorage, RpfFile},
    entry::{ArchiveId, BinaryEntry, DirectoryEntry, EntryId, EntryKind, ResourceEntry, RpfEntry},
    error::{Error, Result},
    types::{RpfEncryption, BLOCK_SIZE, MAX_U24, RPF_IDENT},
};

impl<S: ArchiveStorage> RpfFile<S> {
    fn new_child(&self, dir: EntryId, name: &str, kind: EntryKind) -> Result<RpfEntry> {
        let parent = self.entry(dir)?;
        self.directory(dir)?;

        let mut entry = RpfEntry::new(parent.archive, name, kind);
        entry.parent = Some(dir);
        entry.path = format!("{}/{}", parent.path, entry.name_lower);
        Ok(entry)
    }

    fn find_file(&self, dir: EntryId, name_lower: &str) -> Result<Option<EntryId>> {
        Ok(self.directory(dir)?.files.iter().copied().find(
            |id| matches!(self.entry(*id), Ok(entry) if entry.name_lower == name_lower),
        ))
    }

    /// Adds a directory to `dir`
    #[instrument(skip(self), err)]
    pub fn create_directory(&mut self, dir: EntryId, name: &str) -> Result<EntryId> {
        let entry = self.new_child(dir, name, EntryKind::Directory(DirectoryEntry::default()))?;
        let archive = entry.archive;

        let exists = self.directory(dir)?.directories.iter().any(
            |id| matches!(self.entry(*id), Ok(other) if other.name_lower == entry.name_lower),
        );
        if exists {
            return Err(Error::AlreadyExists(format!("directory {}", entry.path)));
        }

        let id = self.push_entry(entry);
        self.directory_mut(dir)?.directories.push(id);

        self.ensure_all_entries(archive)?;
        self.write_header(archive)?;

        Ok(id)
    }

    /// Adds a file to `dir`
    ///
    /// Data starting with an RSC7 header is stored as a resource. Archives with an `.rpf` name
    /// and `.awc` audio are stored as they are, anything else is deflated. An imported archive is
    /// scanned and becomes a nested archive. With `overwrite` an existing file of the same name
    /// is deleted first, otherwise it is an error.
    #[instrument(skip(self, data), err, fields(size = data.len()))]
    pub fn create_file(
        &mut self,
        dir: EntryId,
        name: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<EntryId> {
        let name_lower = name.to_lowercase();
        if overwrite {
            if let Some(existing) = self.find_file(dir, &name_lower)? {
                self.delete_entry(existing)?;
            }
        }

        let len = u32::try_from(data.len()).map_err(|_| {
            Error::InvalidOperation(format!("{} is too large for an archive", name))
        })?;
        let ident = if data.len() >= 16 {
            LE::read_u32(&data[0..4])
        } else {
            0
        };
        let is_rpf = name_lower.ends_with(".rpf") && ident == RPF_IDENT;
        let is_awc = name_lower.ends_with(".awc");

        let mut stored = Cow::Borrowed(data);
        let kind = if ident == RESOURCE_IDENT {
            if len >= MAX_U24 {
                let bytes = stored.to_mut();
                bytes[7] = len as u8;
                bytes[14] = (len >> 8) as u8;
                bytes[5] = (len >> 16) as u8;
                bytes[2] = (len >> 24) as u8;
            }
            EntryKind::Resource(ResourceEntry {
                file_offset: 0,
                file_size: len,
                system_flags: PageFlags::new(LE::read_u32(&data[8..12])),
                graphics_flags: PageFlags::new(LE::read_u32(&data[12..16])),
                is_encrypted: false,
            })
        } else {
            let mut file_size = 0;
            if !is_rpf && !is_awc {
                let compressed = deflate(data)?;
                if compressed.len() <= MAX_U24 as usize {
                    file_size = compressed.len() as u32;
                    stored = Cow::Owned(compressed);
                }
            }
            EntryKind::Binary(BinaryEntry {
                file_offset: 0,
                file_size,
                uncompressed_size: len,
                is_encrypted: false,
            })
        };

        let entry = self.new_child(dir, name, kind)?;
        let archive = entry.archive;
        let path = entry.path.clone();
        if self.find_file(dir, &entry.name_lower)?.is_some() {
            return Err(Error::AlreadyExists(format!("file {}", path)));
        }

        let id = self.push_entry(entry);
        self.directory_mut(dir)?.files.push(id);
        self.insert_file_space(archive, id)?;

        let (offset, blocks) = {
            let entry = self.entry(id)?;
            (entry.file_offset().unwrap_or(0) as u64, entry.block_count())
        };
        let begin = self.archive(archive)?.start_pos + offset * BLOCK_SIZE;
        self.storage.seek(SeekFrom::Start(begin))?;
        self.storage.write_all(&stored)?;
        self.write_padding(begin + blocks * BLOCK_SIZE)?;

        debug!("stored {} at block {}", path, offset);

        if is_rpf {
            let child = self.alloc_archive(
                name,
                &path,
                begin,
                data.len() as u64,
                Some(archive),
                Some(id),
            );
            match self.scan_structure(child) {
                Ok(()) => self.archive_mut(archive)?.children.push(child),
                Err(e) => {
                    warn!("unable to scan nested archive {}: {}", path, e);
                    self.archive_mut(archive)?.last_error = Some(e.to_string());
                    self.drop_archive(child);
                }
            }
        }

        Ok(id)
    }

    /// Adds a new, empty archive to `dir`
    #[instrument(skip(self), err)]
    pub fn create_archive(
        &mut self,
        dir: EntryId,
        name: &str,
        options: ArchiveOptions,
    ) -> Result<ArchiveId> {
        let file = BinaryEntry {
            file_offset: 0,
            file_size: 0,
            uncompressed_size: BLOCK_SIZE as u32,
            is_encrypted: false,
        };
        let entry = self.new_child(dir, name, EntryKind::Binary(file))?;
        let parent = entry.archive;
        let path = entry.path.clone();
        if self.find_file(dir, &entry.name_lower)?.is_some() {
            return Err(Error::AlreadyExists(format!("file {}", path)));
        }

        let id = self.push_entry(entry);
        self.directory_mut(dir)?.files.push(id);

        let child = self.alloc_archive(name, &path, 0, BLOCK_SIZE, Some(parent), Some(id));
        self.archive_mut(parent)?.children.push(child);

        self.insert_file_space(parent, id)?;

        let offset = self.entry(id)?.file_offset().unwrap_or(0) as u64;
        let start_pos = self.archive(parent)?.start_pos + offset * BLOCK_SIZE;
        self.write_new_archive(child, options.encryption, start_pos)?;

        Ok(child)
    }

    /// Removes an entry, and everything in it for directories
    ///
    /// The space it used becomes a hole. Any archive stored in a removed entry is dropped.
    #[instrument(skip(self), err)]
    pub fn delete_entry(&mut self, entry: EntryId) -> Result<()> {
        let (archive, parent, path) = {
            let e = self.entry(entry)?;
            (e.archive, e.parent, e.path.clone())
        };
        if parent.is_none() {
            return Err(Error::InvalidOperation(format!(
                "cannot delete {}: it is the root directory",
                path
            )));
        }

        self.detach_entry(entry)?;
        self.ensure_all_entries(archive)?;
        self.write_header(archive)
    }

    fn detach_entry(&mut self, entry: EntryId) -> Result<()> {
        let (archive, parent, children) = {
            let e = self.entry(entry)?;
            let children = match e.directory() {
                Some(dir) => dir.directories.iter().chain(&dir.files).copied().collect(),
                None => Vec::new(),
            };
            (e.archive, e.parent, children)
        };

        for child in children {
            self.detach_entry(child)?;
        }

        let parent = parent.ok_or_else(|| {
            Error::InvalidOperation(format!("entry {} has no parent directory", entry))
        })?;
        let dir = self.directory_mut(parent)?;
        dir.directories.retain(|id| *id != entry);
        dir.files.retain(|id| *id != entry);

        if let Some(child) = self.find_child_archive(archive, entry) {
            self.archive_mut(archive)?.children.retain(|id| *id != child);
            self.drop_archive(child);
        }

        self.entries[entry.0] = None;
        Ok(())
    }

    /// Renames an entry, updating its hashes and the paths below it
    #[instrument(skip(self), err)]
    pub fn rename_entry(&mut self, entry: EntryId, name: &str) -> Result<()> {
        let (archive, parent) = {
            let e = self.entry(entry)?;
            (e.archive, e.parent)
        };
        let Some(parent) = parent else {
            return Err(Error::InvalidOperation(
                "the root directory is renamed with its archive".to_owned(),
            ));
        };

        let name_lower = name.to_lowercase();
        let parent_dir = self.directory(parent)?;
        let taken = parent_dir
            .directories
            .iter()
            .chain(&parent_dir.files)
            .any(|id| {
                *id != entry
                    && matches!(self.entry(*id), Ok(other) if other.name_lower == name_lower)
            });
        if taken {
            return Err(Error::AlreadyExists(format!("entry {}", name)));
        }

        let parent_path = self.entry(parent)?.path.clone();
        let e = self.entry_mut(entry)?;
        e.set_name(name);
        e.path = format!("{}/{}", parent_path, e.name_lower);

        self.ensure_all_entries(archive)?;
        self.write_header(archive)?;

        if let Some(child) = self.find_child_archive(archive, entry) {
            self.archive_mut(child)?.name = name.to_owned();
        }
        self.update_entry_paths(archive, entry)
    }

    /// Renames an archive in memory, its container entry is left alone
    #[instrument(skip(self), err)]
    pub fn rename_archive(&mut self, archive: ArchiveId, name: &str) -> Result<()> {
        let a = self.archive_mut(archive)?;
        let parent_path = match a.path.rfind('/') {
            Some(index) => a.path[..=index].to_owned(),
            None => String::new(),
        };
        a.name = name.to_owned();
        a.path = format!("{}{}", parent_path, name);

        self.update_paths(archive)
    }

    /// Changes the encryption recorded in the header
    #[instrument(skip(self), err)]
    pub fn set_encryption_type(
        &mut self,
        archive: ArchiveId,
        encryption: RpfEncryption,
    ) -> Result<()> {
        if !encryption.is_supported() {
            return Err(Error::UnsupportedEncryption(encryption.to_string()));
        }
        self.archive_mut(archive)?.encryption = encryption;
        self.write_header(archive)
    }

    /// Recomputes every path of an archive from its own path
    pub(crate) fn update_paths(&mut self, archive: ArchiveId) -> Result<()> {
        let (root, path) = {
            let a = self.archive(archive)?;
            (a.root, a.path.to_lowercase())
        };
        self.entry_mut(root)?.path = path;
        self.update_directory_paths(archive, root)
    }

    fn update_entry_paths(&mut self, archive: ArchiveId, entry: EntryId) -> Result<()> {
        if self.entry(entry)?.is_directory() {
            return self.update_directory_paths(archive, entry);
        }

        if let Some(child) = self.find_child_archive(archive, entry) {
            let path = self.entry(entry)?.path.clone();
            self.archive_mut(child)?.path = path;
            self.update_paths(child)?;
        }
        Ok(())
    }

    fn update_directory_paths(&mut self, archive: ArchiveId, dir: EntryId) -> Result<()> {
        let (path, children) = {
            let d = self.directory(dir)?;
            let children: Vec<EntryId> = d.files.iter().chain(&d.directories).copied().collect();
            (self.entry(dir)?.path.clone(), children)
        };

        for child in children {
            let e = self.entry_mut(child)?;
            e.path = format!("{}/{}", path, e.name_lower);
            self.update_entry_paths(archive, child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use crate::{
        archive::{ArchiveOptions, RpfFile},
        entry::EntryKind,
        error::{Error, Result},
        hash::joaat,
        types::RpfEncryption,
    };

    fn new_archive() -> Result<RpfFile<Cursor<Vec<u8>>>> {
        RpfFile::new(Cursor::new(Vec::new()), "edit.rpf", ArchiveOptions::default())
    }

    #[test]
    fn duplicate_directory_fails() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        rpf.create_directory(root, "Data")?;

        assert!(matches!(
            rpf.create_directory(root, "data"),
            Err(Error::AlreadyExists(_))
        ));

        Ok(())
    }

    #[test]
    fn duplicate_file_without_overwrite_fails() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        rpf.create_file(root, "a.txt", b"one", false)?;

        assert!(matches!(
            rpf.create_file(root, "A.TXT", b"two", false),
            Err(Error::AlreadyExists(_))
        ));

        let replaced = rpf.create_file(root, "A.TXT", b"two", true)?;
        assert_eq!(rpf.get_files(rpf.root(), "", false)?, vec![replaced]);
        assert_eq!(rpf.extract_file(replaced)?, Some(b"two".to_vec()));

        Ok(())
    }

    #[test]
    fn awc_is_stored_raw() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let id = rpf.create_file(root, "voice.awc", &[7; 100], false)?;

        let EntryKind::Binary(file) = &rpf.entry(id)?.kind else {
            panic!("expected a binary entry");
        };
        assert_eq!(file.file_size, 0);
        assert_eq!(file.uncompressed_size, 100);

        Ok(())
    }

    #[test]
    fn resource_keeps_its_flags() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;

        #[rustfmt::skip]
        let mut data = vec![
            0x52, 0x53, 0x43, 0x37,
            0x2B, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x02, 0x20,
            0x00, 0x00, 0x00, 0xB0,
        ];
        data.extend_from_slice(&[0xAB; 40]);
        let id = rpf.create_file(root, "thing.ydr", &data, false)?;

        let EntryKind::Resource(file) = &rpf.entry(id)?.kind else {
            panic!("expected a resource entry");
        };
        assert_eq!(file.file_size, 56);
        assert_eq!(file.system_flags.value(), 0x20020000);
        assert_eq!(file.graphics_flags.value(), 0xB0000000);
        assert_eq!(file.version(), 0x2B);

        Ok(())
    }

    #[test]
    fn rename_updates_paths_and_hashes() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let dir = rpf.create_directory(root, "old")?;
        let file = rpf.create_file(dir, "Inner.txt", b"x", false)?;

        rpf.rename_entry(dir, "New")?;

        let renamed = rpf.entry(dir)?;
        assert_eq!(renamed.name, "New");
        assert_eq!(renamed.path, "edit.rpf/new");
        assert_eq!(renamed.name_hash, joaat("new"));
        assert_eq!(rpf.entry(file)?.path, "edit.rpf/new/inner.txt");
        assert_eq!(rpf.find_entry(rpf.root(), "new/inner.txt")?, Some(file));

        Ok(())
    }

    #[test]
    fn rename_archive_changes_paths_only() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let file = rpf.create_file(root, "a.txt", b"x", false)?;
        let before = rpf.get_ref().get_ref().clone();

        rpf.rename_archive(rpf.root(), "Other.rpf")?;

        assert_eq!(rpf.archive(rpf.root())?.name, "Other.rpf");
        assert_eq!(rpf.entry(file)?.path, "other.rpf/a.txt");
        assert_eq!(rpf.get_ref().get_ref(), &before);

        Ok(())
    }

    #[test]
    fn root_cannot_be_deleted() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;

        assert!(matches!(
            rpf.delete_entry(root),
            Err(Error::InvalidOperation(_))
        ));

        Ok(())
    }

    #[test]
    fn deleting_a_directory_removes_its_contents() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let dir = rpf.create_directory(root, "dir")?;
        let sub = rpf.create_directory(dir, "sub")?;
        let file = rpf.create_file(sub, "f.bin", &[1, 2, 3], false)?;

        rpf.delete_entry(dir)?;

        assert_eq!(rpf.archive(rpf.root())?.entry_count, 1);
        assert!(rpf.entry(file).is_err());
        assert!(rpf.get_files(rpf.root(), "", true)?.is_empty());

        Ok(())
    }

    #[test]
    fn aes_encryption_is_rejected() -> Result<()> {
        let mut rpf = new_archive()?;

        assert!(matches!(
            rpf.set_encryption_type(rpf.root(), RpfEncryption::Aes),
            Err(Error::UnsupportedEncryption(_))
        ));
        rpf.set_encryption_type(rpf.root(), RpfEncryption::None)?;

        let data = rpf.into_inner().into_inner();
        assert_eq!(&data[12..16], &[0, 0, 0, 0]);

        Ok(())
    }
}
