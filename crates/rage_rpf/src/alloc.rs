//! Block allocation inside an archive.
//!
//! File data is placed in 512-byte blocks after the header. Whenever something needs more room,
//! the entries in the way are moved into the smallest hole that fits them or to the end of the
//! archive. A nested archive that grows asks its parent for room in the same way.

use std::io::{self, Read, SeekFrom};

use binrw::BinWrite;
use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::{
    archive::{ArchiveStorage, RpfFile},
    entry::{ArchiveId, EntryId, EntryKind},
    error::{Error, Result},
    types::{block_count, RpfEncryption, RpfHeader, BLOCK_SIZE},
};

/// Bytes copied at a time when moving file data
pub const COPY_BUFFER_SIZE: usize = 16384;

/// Largest block offset a file entry can record
const MAX_FILE_OFFSET: u64 = 0x7F_FFFF;

/// Blocks occupied by one file entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub id: EntryId,
    pub offset: u64,
    pub blocks: u64,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.offset + self.blocks
    }
}

impl<S> RpfFile<S> {
    /// Blocks used by every file entry of the archive, in entry table order
    pub fn extents(&self, archive: ArchiveId) -> Result<Vec<Extent>> {
        let mut extents = Vec::new();
        for id in &self.archive(archive)?.all_entries {
            let entry = self.entry(*id)?;
            if let Some(offset) = entry.file_offset() {
                extents.push(Extent {
                    id: *id,
                    offset: offset as u64,
                    blocks: entry.block_count(),
                });
            }
        }
        Ok(extents)
    }

    /// The file with the lowest offset strictly after `block`
    pub fn find_first_file_after(&self, archive: ArchiveId, block: u64) -> Result<Option<Extent>> {
        Ok(self
            .extents(archive)?
            .into_iter()
            .filter(|extent| extent.offset > block)
            .min_by_key(|extent| extent.offset))
    }

    /// Start of the smallest gap between files that holds `required` blocks
    ///
    /// Gaps overlapping `ignore_start..ignore_end` are skipped. Returns 0, the header block,
    /// when nothing fits.
    pub fn find_hole(
        &self,
        archive: ArchiveId,
        required: u64,
        ignore_start: u64,
        ignore_end: u64,
    ) -> Result<u64> {
        let mut extents = self.extents(archive)?;
        extents.sort_by_key(|extent| extent.offset);

        let mut found = 0;
        let mut found_size = u64::MAX;
        for pair in extents.windows(2) {
            let end = pair[0].end();
            let next = pair[1].offset;
            if next > ignore_start && end < ignore_end {
                continue;
            }
            if end < next {
                let space = next - end;
                if space >= required && space < found_size {
                    found = end;
                    found_size = space;
                }
            }
        }

        Ok(found)
    }

    /// First block after every file, or after the header when there are none
    pub fn find_end_block(&self, archive: ArchiveId) -> Result<u64> {
        let end = self
            .extents(archive)?
            .iter()
            .map(Extent::end)
            .max()
            .unwrap_or(0);

        match end {
            0 => Ok(self.archive(archive)?.header_block_count()),
            end => Ok(end),
        }
    }

    /// Size of the archive once every hole is removed
    pub fn defragmented_file_size(&self, archive: ArchiveId) -> Result<u64> {
        let blocks: u64 = self.extents(archive)?.iter().map(|e| e.blocks).sum();
        Ok((self.archive(archive)?.header_block_count() + blocks) * BLOCK_SIZE)
    }

    /// Recomputes the entry table order and each directory's child range
    ///
    /// Children of a directory are sorted by the bytes of their names.
    pub(crate) fn ensure_all_entries(&mut self, archive: ArchiveId) -> Result<()> {
        let root = self.archive(archive)?.root;
        let mut all_entries = vec![root];
        let mut stack = vec![root];

        while let Some(dir_id) = stack.pop() {
            let index = all_entries.len() as u32;
            let count = {
                let dir = self.directory(dir_id)?;
                let mut children = dir
                    .directories
                    .iter()
                    .chain(dir.files.iter())
                    .map(|id| Ok((self.entry(*id)?.name.as_str(), *id)))
                    .collect::<Result<Vec<_>>>()?;
                children.sort_by(|a, b| a.0.cmp(b.0));

                for (_, id) in &children {
                    all_entries.push(*id);
                    if self.entry(*id)?.is_directory() {
                        stack.push(*id);
                    }
                }
                children.len() as u32
            };

            let dir = self.directory_mut(dir_id)?;
            dir.entries_index = index;
            dir.entries_count = count;
        }

        let a = self.archive_mut(archive)?;
        a.entry_count = all_entries.len() as u32;
        a.all_entries = all_entries;

        Ok(())
    }

    /// Builds the name table, assigning every entry its name offset
    fn names_data(&mut self, archive: ArchiveId) -> Result<Vec<u8>> {
        let all_entries = self.archive(archive)?.all_entries.clone();

        let mut offsets: IndexMap<String, u32> = IndexMap::new();
        let mut length = 0;
        for id in all_entries {
            let entry = self.entry_mut(id)?;
            let offset = *offsets.entry(entry.name.clone()).or_insert_with(|| {
                let offset = length;
                length += entry.name.len() as u32 + 1;
                offset
            });

            if entry.is_file() && offset > u16::MAX as u32 {
                return Err(Error::InvalidOperation(format!(
                    "name table is too large to reference {}",
                    entry.path
                )));
            }
            entry.name_offset = offset;
        }

        let mut data = Vec::with_capacity(length as usize);
        for name in offsets.keys() {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }
        data.resize(data.len().next_multiple_of(16), 0);

        self.archive_mut(archive)?.names_length = data.len() as u32;
        Ok(data)
    }
}

impl<S: ArchiveStorage> RpfFile<S> {
    /// Rewrites the header, entry table and name table, making room for them first
    #[instrument(skip(self), err)]
    pub(crate) fn write_header(&mut self, archive: ArchiveId) -> Result<()> {
        let encryption = self.archive(archive)?.encryption;
        if !encryption.is_supported() {
            return Err(Error::UnsupportedEncryption(encryption.to_string()));
        }

        let names = self.names_data(archive)?;
        let header_size = self.archive(archive)?.header_block_count() * BLOCK_SIZE;
        self.ensure_space(archive, None, header_size)?;

        let mut entries = Vec::new();
        for id in &self.archive(archive)?.all_entries {
            entries.extend(self.entry(*id)?.record().to_bytes()?);
        }

        let a = self.archive(archive)?;
        let header = RpfHeader {
            entry_count: a.entry_count,
            names_length: a.names_length,
            encryption: a.encryption.value(),
        };
        let start_pos = a.start_pos;

        self.storage.seek(SeekFrom::Start(start_pos))?;
        header.write(&mut self.storage)?;
        self.storage.write_all(&entries)?;
        self.storage.write_all(&names)?;
        self.write_padding(start_pos + header_size)?;

        trace!(
            "wrote header of {} entries at {:#X}",
            header.entry_count,
            start_pos
        );

        Ok(())
    }

    /// Writes zeros from the current position up to `end`
    pub(crate) fn write_padding(&mut self, end: u64) -> Result<()> {
        let position = self.storage.stream_position()?;
        if end > position {
            io::copy(&mut io::repeat(0).take(end - position), &mut self.storage)?;
        }
        Ok(())
    }

    /// Copies `length` bytes front to back, returning where writing stopped
    fn copy_data(&mut self, mut source: u64, mut dest: u64, mut length: u64) -> Result<u64> {
        let mut buffer = vec![0; COPY_BUFFER_SIZE];
        while length > 0 {
            let chunk = length.min(COPY_BUFFER_SIZE as u64) as usize;
            self.storage.seek(SeekFrom::Start(source))?;
            let read = self.storage.read(&mut buffer[..chunk])?;
            if read == 0 {
                break;
            }
            self.storage.seek(SeekFrom::Start(dest))?;
            self.storage.write_all(&buffer[..read])?;

            source += read as u64;
            dest += read as u64;
            length -= read as u64;
        }
        Ok(dest)
    }

    /// Makes the archive at least `blocks` long, growing its container when nested
    #[instrument(skip(self), err)]
    pub(crate) fn grow_archive(&mut self, archive: ArchiveId, blocks: u64) -> Result<()> {
        let new_size = blocks * BLOCK_SIZE;
        let a = self.archive_mut(archive)?;
        if new_size <= a.file_size {
            return Ok(());
        }

        a.file_size = new_size;
        debug!("growing {} to {} bytes", a.path, new_size);

        let Some(parent) = a.parent else {
            return Ok(());
        };
        let Some(parent_entry) = a.parent_entry else {
            return Err(Error::InvalidOperation(format!(
                "cannot grow archive {}: its container entry is missing",
                a.path
            )));
        };

        let size = u32::try_from(new_size).map_err(|_| {
            Error::InvalidOperation(format!("nested archive cannot grow to {} bytes", new_size))
        })?;

        let entry = self.entry_mut(parent_entry)?;
        let EntryKind::Binary(file) = &mut entry.kind else {
            return Err(Error::InvalidOperation(format!(
                "container {} is not a binary entry",
                entry.path
            )));
        };
        file.uncompressed_size = size;
        file.file_size = 0;

        self.ensure_space(parent, Some(parent_entry), new_size)
    }

    /// Moves a file's blocks to `new_block` without touching the header
    #[instrument(skip(self), err)]
    pub(crate) fn relocate_file(
        &mut self,
        archive: ArchiveId,
        entry: EntryId,
        new_block: u64,
    ) -> Result<()> {
        let (begin, blocks, path) = {
            let e = self.entry(entry)?;
            (e.file_offset().unwrap_or(0) as u64, e.block_count(), e.path.clone())
        };
        let end = begin + blocks;
        if new_block + blocks > begin && new_block < end {
            return Err(Error::InvalidOperation(format!(
                "unable to relocate file {}: new position was inside the original",
                path
            )));
        }
        if new_block > MAX_FILE_OFFSET {
            return Err(Error::InvalidOperation(format!(
                "unable to relocate file {}: archive is full",
                path
            )));
        }

        let start_pos = self.archive(archive)?.start_pos;
        let dest = start_pos + new_block * BLOCK_SIZE;
        let length = blocks * BLOCK_SIZE;
        let reached = self.copy_data(start_pos + begin * BLOCK_SIZE, dest, length)?;
        self.storage.seek(SeekFrom::Start(reached))?;
        self.write_padding(dest + length)?;

        self.entry_mut(entry)?.set_file_offset(new_block as u32);
        trace!("moved {} from block {} to {}", path, begin, new_block);

        if let Some(child) = self.find_child_archive(archive, entry) {
            self.update_start_pos(child, dest)?;
        }

        Ok(())
    }

    /// Moves other files out of the way until `bytes` fit at the entry, or after the header
    /// when `entry` is `None`
    #[instrument(skip(self), err)]
    pub(crate) fn ensure_space(
        &mut self,
        archive: ArchiveId,
        entry: Option<EntryId>,
        bytes: u64,
    ) -> Result<()> {
        let blocks = block_count(bytes);
        let start = match entry {
            Some(id) => self.entry(id)?.file_offset().unwrap_or(0) as u64,
            None => 0,
        };
        let end = start + blocks;

        let mut next = self.find_first_file_after(archive, start)?;
        while let Some(extent) = next {
            if extent.offset >= end {
                break;
            }

            let mut new_block = self.find_hole(archive, extent.blocks, start, end)?;
            if new_block == 0 {
                new_block = self.find_end_block(archive)?;
                self.grow_archive(archive, new_block + extent.blocks)?;
            }

            self.relocate_file(archive, extent.id, new_block)?;
            next = self.find_first_file_after(archive, start)?;
        }

        if next.is_none() {
            let end_block = self.find_end_block(archive)?;
            let needed = if entry.is_some() { blocks } else { 0 };
            self.grow_archive(archive, end_block + needed)?;
        }

        if entry.is_some() {
            self.write_header(archive)?;
        }

        Ok(())
    }

    /// Assigns a new file entry its blocks and rewrites the header
    pub(crate) fn insert_file_space(&mut self, archive: ArchiveId, entry: EntryId) -> Result<()> {
        let blocks = self.entry(entry)?.block_count();
        let mut offset = self.find_hole(archive, blocks, 0, 0)?;
        if offset == 0 {
            offset = self.find_end_block(archive)?;
            self.grow_archive(archive, offset + blocks)?;
        }
        if offset > MAX_FILE_OFFSET {
            return Err(Error::InvalidOperation(format!(
                "no room for {} blocks in a full archive",
                blocks
            )));
        }

        self.entry_mut(entry)?.set_file_offset(offset as u32);
        self.ensure_all_entries(archive)?;
        self.write_header(archive)
    }

    /// Writes an archive with only a root directory at `start_pos`
    pub(crate) fn write_new_archive(
        &mut self,
        archive: ArchiveId,
        encryption: RpfEncryption,
        start_pos: u64,
    ) -> Result<()> {
        {
            let a = self.archive_mut(archive)?;
            a.encryption = encryption;
            a.start_pos = start_pos;
        }

        self.ensure_all_entries(archive)?;
        self.write_header(archive)?;

        let end = self.storage.stream_position()?;
        self.archive_mut(archive)?.file_size = end - start_pos;

        Ok(())
    }

    /// Moves an archive and every archive nested in it
    pub(crate) fn update_start_pos(&mut self, archive: ArchiveId, start_pos: u64) -> Result<()> {
        let children = {
            let a = self.archive_mut(archive)?;
            a.start_pos = start_pos;
            a.children.clone()
        };

        for child in children {
            let Some(parent_entry) = self.archive(child)?.parent_entry else {
                continue;
            };
            let offset = self.entry(parent_entry)?.file_offset().unwrap_or(0) as u64;
            self.update_start_pos(child, start_pos + offset * BLOCK_SIZE)?;
        }

        Ok(())
    }

    /// Moves every file towards the start, removing the holes between them
    ///
    /// A top-level archive is truncated afterwards. A nested one updates its container entry.
    #[instrument(skip(self), err)]
    pub fn defragment(&mut self, archive: ArchiveId) -> Result<()> {
        let (start_pos, mut dest) = {
            let a = self.archive(archive)?;
            (a.start_pos, a.header_block_count())
        };

        let mut extents = self.extents(archive)?;
        extents.sort_by_key(|extent| extent.offset);

        for extent in extents {
            if extent.offset > dest {
                self.copy_data(
                    start_pos + extent.offset * BLOCK_SIZE,
                    start_pos + dest * BLOCK_SIZE,
                    extent.blocks * BLOCK_SIZE,
                )?;
                self.entry_mut(extent.id)?.set_file_offset(dest as u32);

                if let Some(child) = self.find_child_archive(archive, extent.id) {
                    self.update_start_pos(child, start_pos + dest * BLOCK_SIZE)?;
                }
            }
            dest += extent.blocks;
        }

        let file_size = dest * BLOCK_SIZE;
        self.archive_mut(archive)?.file_size = file_size;
        self.write_header(archive)?;

        let (parent, parent_entry) = {
            let a = self.archive(archive)?;
            (a.parent, a.parent_entry)
        };

        if let Some(parent_entry) = parent_entry {
            if let EntryKind::Binary(file) = &mut self.entry_mut(parent_entry)?.kind {
                file.uncompressed_size = file_size as u32;
                file.file_size = 0;
            }
            if let Some(parent) = parent {
                self.write_header(parent)?;
            }
        }

        if parent.is_none() {
            self.storage.set_len(file_size)?;
        }

        debug!("defragmented archive {} to {} bytes", archive, file_size);

        Ok(())
    }
}
