//! In-memory model of archive entries.

use std::fmt;

use rage_rsc::PageFlags;

use crate::{
    hash::{joaat, short_name},
    types::{block_count, to_u24, DirectoryRecord, EntryRecord, FileRecord, MAX_U24},
};

/// Index of an archive inside an [`crate::RpfFile`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(pub(crate) usize);

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an entry inside an [`crate::RpfFile`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    /// Position of the first child in the entry table
    pub entries_index: u32,
    pub entries_count: u32,
    pub directories: Vec<EntryId>,
    pub files: Vec<EntryId>,
}

/// A plain or deflated file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryEntry {
    /// Offset in blocks from the start of the archive
    pub file_offset: u32,
    /// Stored size, `0` when the data is stored uncompressed
    pub file_size: u32,
    pub uncompressed_size: u32,
    pub is_encrypted: bool,
}

/// A resource container, stored with its 16-byte header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceEntry {
    /// Offset in blocks from the start of the archive
    pub file_offset: u32,
    /// Stored size including the header, `0` means the sum of the page sizes
    pub file_size: u32,
    pub system_flags: PageFlags,
    pub graphics_flags: PageFlags,
    pub is_encrypted: bool,
}

impl ResourceEntry {
    /// Resource version recovered from the tags of both flag words
    pub fn version(&self) -> i32 {
        PageFlags::version_from_tags(self.system_flags, self.graphics_flags)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Directory(DirectoryEntry),
    Binary(BinaryEntry),
    Resource(ResourceEntry),
}

/// A directory or file of an archive
#[derive(Debug, Clone, PartialEq)]
pub struct RpfEntry {
    /// Archive whose entry table holds this entry
    pub archive: ArchiveId,
    /// Containing directory, `None` for the root
    pub parent: Option<EntryId>,
    pub name: String,
    pub name_lower: String,
    /// Lowercase path from the top-level archive
    pub path: String,
    pub name_hash: u32,
    pub short_name_hash: u32,
    /// Offset into the name table, assigned whenever the header is written
    pub name_offset: u32,
    pub kind: EntryKind,
}

impl RpfEntry {
    pub fn new(archive: ArchiveId, name: &str, kind: EntryKind) -> Self {
        let mut entry = Self {
            archive,
            parent: None,
            name: String::new(),
            name_lower: String::new(),
            path: String::new(),
            name_hash: 0,
            short_name_hash: 0,
            name_offset: 0,
            kind,
        };
        entry.set_name(name);
        entry
    }

    /// Sets the name and recomputes the lowercase name and both hashes
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
        self.name_lower = name.to_lowercase();
        self.name_hash = joaat(&self.name_lower);
        self.short_name_hash = joaat(short_name(&self.name_lower));
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn directory(&self) -> Option<&DirectoryEntry> {
        match &self.kind {
            EntryKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn directory_mut(&mut self) -> Option<&mut DirectoryEntry> {
        match &mut self.kind {
            EntryKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Offset in blocks, `None` for directories
    pub fn file_offset(&self) -> Option<u32> {
        match &self.kind {
            EntryKind::Directory(_) => None,
            EntryKind::Binary(file) => Some(file.file_offset),
            EntryKind::Resource(file) => Some(file.file_offset),
        }
    }

    pub(crate) fn set_file_offset(&mut self, offset: u32) {
        match &mut self.kind {
            EntryKind::Directory(_) => {}
            EntryKind::Binary(file) => file.file_offset = offset,
            EntryKind::Resource(file) => file.file_offset = offset,
        }
    }

    /// Number of bytes the entry occupies in the archive
    pub fn stored_size(&self) -> u64 {
        match &self.kind {
            EntryKind::Directory(_) => 0,
            EntryKind::Binary(file) if file.file_size == 0 => file.uncompressed_size as u64,
            EntryKind::Binary(file) => file.file_size as u64,
            EntryKind::Resource(file) if file.file_size == 0 => {
                file.system_flags.size() + file.graphics_flags.size()
            }
            EntryKind::Resource(file) => file.file_size as u64,
        }
    }

    pub fn block_count(&self) -> u64 {
        block_count(self.stored_size())
    }

    pub(crate) fn record(&self) -> EntryRecord {
        match &self.kind {
            EntryKind::Directory(dir) => EntryRecord::Directory(DirectoryRecord {
                name_offset: self.name_offset,
                entries_index: dir.entries_index,
                entries_count: dir.entries_count,
            }),
            EntryKind::Binary(file) => EntryRecord::Binary(FileRecord {
                name_offset: self.name_offset as u16,
                file_size: to_u24(file.file_size),
                file_offset: to_u24(file.file_offset),
                word_8: file.uncompressed_size,
                word_12: file.is_encrypted as u32,
            }),
            EntryKind::Resource(file) => {
                let mut file_offset = to_u24(file.file_offset);
                file_offset[2] |= 0x80;
                EntryRecord::Resource(FileRecord {
                    name_offset: self.name_offset as u16,
                    file_size: to_u24(file.file_size.min(MAX_U24)),
                    file_offset,
                    word_8: file.system_flags.value(),
                    word_12: file.graphics_flags.value(),
                })
            }
        }
    }
}

impl fmt::Display for RpfEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EntryKind::Directory(_) => "Directory",
            EntryKind::Binary(_) => "Binary file",
            EntryKind::Resource(_) => "Resource file",
        };
        write!(f, "{}: {}", kind, self.path)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rage_rsc::PageFlags;

    use super::{ArchiveId, BinaryEntry, EntryKind, ResourceEntry, RpfEntry};
    use crate::{hash::joaat, types::EntryRecord};

    #[test]
    fn names_and_hashes() {
        let entry = RpfEntry::new(
            ArchiveId(0),
            "Model.YDR",
            EntryKind::Binary(BinaryEntry::default()),
        );

        assert_eq!(entry.name, "Model.YDR");
        assert_eq!(entry.name_lower, "model.ydr");
        assert_eq!(entry.name_hash, joaat("model.ydr"));
        assert_eq!(entry.short_name_hash, joaat("model"));
    }

    #[test]
    fn stored_size_of_raw_binary() {
        let entry = RpfEntry::new(
            ArchiveId(0),
            "raw.awc",
            EntryKind::Binary(BinaryEntry {
                file_offset: 4,
                file_size: 0,
                uncompressed_size: 1025,
                is_encrypted: false,
            }),
        );

        assert_eq!(entry.stored_size(), 1025);
        assert_eq!(entry.block_count(), 3);
    }

    #[test]
    fn stored_size_of_resource_without_size() {
        let entry = RpfEntry::new(
            ArchiveId(0),
            "a.ydr",
            EntryKind::Resource(ResourceEntry {
                system_flags: PageFlags::new(0x20000),
                ..Default::default()
            }),
        );

        assert_eq!(entry.stored_size(), 0x2000);
    }

    #[test]
    fn resource_record_sets_marker_bit() {
        let entry = RpfEntry::new(
            ArchiveId(0),
            "big.ytd",
            EntryKind::Resource(ResourceEntry {
                file_offset: 0x12,
                file_size: 0x0100_0000,
                ..Default::default()
            }),
        );

        let EntryRecord::Resource(record) = entry.record() else {
            panic!("expected a resource record");
        };
        assert_eq!(record.file_offset, [0x12, 0x00, 0x80]);
        assert_eq!(record.size(), 0xFF_FFFF);
    }
}
