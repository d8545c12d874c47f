//! Decoding blocks out of the two decompressed heaps.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    io::{self, Read, Seek, SeekFrom},
};

use byteorder::{ReadBytesExt, LE};
use tracing::trace;

use crate::{
    block::{BlockId, Handle, ResourceArena, ResourceBlock},
    error::{Error, Result},
    types::{Heap, VirtualAddress},
};

/// Blocks already decoded during one load, keyed by the address they were read from
#[derive(Debug, Default)]
pub struct BlockCache {
    blocks: HashMap<VirtualAddress, (BlockId, TypeId)>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn lookup(&self, address: VirtualAddress) -> Option<(BlockId, TypeId)> {
        self.blocks.get(&address).copied()
    }

    fn insert(&mut self, address: VirtualAddress, id: BlockId, type_id: TypeId) {
        self.blocks.insert(address, (id, type_id));
    }
}

/// Cursor over the system and graphics heaps of a single resource
///
/// Reads happen in the heap of the current [`VirtualAddress`]; seeking stays inside that heap.
pub struct ResourceReader<'a> {
    system: &'a [u8],
    graphics: &'a [u8],
    position: VirtualAddress,
    cache: &'a mut BlockCache,
    arena: ResourceArena,
}

impl<'a> ResourceReader<'a> {
    pub fn new(system: &'a [u8], graphics: &'a [u8], cache: &'a mut BlockCache) -> Self {
        Self {
            system,
            graphics,
            position: VirtualAddress::system(0),
            cache,
            arena: ResourceArena::new(),
        }
    }

    pub fn position(&self) -> VirtualAddress {
        self.position
    }

    pub fn set_position(&mut self, position: VirtualAddress) {
        self.position = position;
    }

    /// Advances the position without reading
    pub fn skip(&mut self, count: u64) {
        self.position = self.position.add(count);
    }

    fn heap_data(&self, heap: Heap) -> &'a [u8] {
        match heap {
            Heap::System => self.system,
            Heap::Graphics => self.graphics,
        }
    }

    /// Reads exactly `count` bytes, failing if that runs past the end of the heap
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let data = self.heap_data(self.position.heap);
        let start = self.position.offset as usize;
        let bytes = start
            .checked_add(count)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| {
                Error::CorruptData(format!(
                    "read of {} bytes at {} runs past the end of the {} heap",
                    count, self.position, self.position.heap
                ))
            })?;

        self.skip(count as u64);
        Ok(bytes.to_vec())
    }

    /// Reads a NUL-terminated string
    pub fn read_string(&mut self) -> Result<String> {
        let data = self.heap_data(self.position.heap);
        let start = self.position.offset as usize;
        let tail = data.get(start..).unwrap_or_default();
        let length = tail.iter().position(|b| *b == 0).ok_or_else(|| {
            Error::CorruptData(format!("unterminated string at {}", self.position))
        })?;

        let value = String::from_utf8_lossy(&tail[..length]).into_owned();
        self.skip(length as u64 + 1);
        Ok(value)
    }

    /// Reads a 64-bit tagged pointer
    pub fn read_pointer(&mut self) -> Result<Option<VirtualAddress>> {
        let pointer = self.read_u64::<LE>().map_err(|_| {
            Error::CorruptData(format!("pointer at {} is out of range", self.position))
        })?;
        VirtualAddress::from_pointer(pointer)
    }

    /// Decodes a `T` at the current position, sharing it with earlier reads of the same address
    ///
    /// The arena slot is claimed before `T::read` runs, so a block that points back at one of its
    /// ancestors resolves to the ancestor's handle instead of recursing forever.
    pub fn read_block<T: ResourceBlock>(&mut self, args: T::Args) -> Result<Handle<T>> {
        let address = self.position;
        let mut cached = !T::NO_CACHE;

        if cached {
            if let Some((id, type_id)) = self.cache.lookup(address) {
                if type_id == TypeId::of::<T>() {
                    let length = self
                        .arena
                        .try_block(id)
                        .map(|block| block.block_length())
                        .unwrap_or_default();
                    self.skip(length);
                    return Ok(Handle::new(id));
                }

                trace!(
                    "{} at {} was already read as another type, decoding a fresh copy",
                    type_name::<T>(),
                    address
                );
                cached = false;
            }
        }

        let id = self.arena.reserve();
        if cached {
            self.cache.insert(address, id, TypeId::of::<T>());
        }

        let block = T::read(self, args)?;
        self.arena.fill(id, block);

        Ok(Handle::new(id))
    }

    /// Decodes a `T` at `address` and restores the current position afterwards
    pub fn read_block_at<T: ResourceBlock>(
        &mut self,
        address: Option<VirtualAddress>,
        args: T::Args,
    ) -> Result<Option<Handle<T>>> {
        let Some(address) = address else {
            return Ok(None);
        };

        let saved = self.position;
        self.position = address;
        let result = self.read_block::<T>(args);
        self.position = saved;

        result.map(Some)
    }

    pub fn arena(&self) -> &ResourceArena {
        &self.arena
    }

    pub fn into_arena(self) -> ResourceArena {
        self.arena
    }
}

impl Read for ResourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.heap_data(self.position.heap);
        let start = (self.position.offset as usize).min(data.len());
        let count = buf.len().min(data.len() - start);

        buf[..count].copy_from_slice(&data[start..start + count]);
        self.skip(count as u64);

        Ok(count)
    }
}

impl Seek for ResourceReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let length = self.heap_data(self.position.heap).len() as i64;
        let offset = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position.offset as i64 + delta,
            SeekFrom::End(delta) => length + delta,
        };

        if offset < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the heap",
            ));
        }

        self.position.offset = offset as u64;
        Ok(self.position.offset)
    }
}
