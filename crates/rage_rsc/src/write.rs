//! Encoding blocks into the two heaps.

use std::io::{self, Seek, SeekFrom, Write};

use crate::{
    block::{BlockId, ResourceArena},
    error::{Error, Result},
    layout::Layout,
    types::{Heap, VirtualAddress},
};

/// Cursor over the system and graphics heaps being written
///
/// Writing past the end of a heap grows it with zeros.
pub struct ResourceWriter<'a> {
    system: Vec<u8>,
    graphics: Vec<u8>,
    position: VirtualAddress,
    arena: &'a ResourceArena,
    layout: &'a Layout,
}

impl<'a> ResourceWriter<'a> {
    pub fn new(arena: &'a ResourceArena, layout: &'a Layout) -> Self {
        Self {
            system: Vec::new(),
            graphics: Vec::new(),
            position: VirtualAddress::system(0),
            arena,
            layout,
        }
    }

    pub fn position(&self) -> VirtualAddress {
        self.position
    }

    pub fn set_position(&mut self, position: VirtualAddress) {
        self.position = position;
    }

    /// The arena the blocks being written live in
    pub fn arena(&self) -> &'a ResourceArena {
        self.arena
    }

    fn heap_data_mut(&mut self, heap: Heap) -> &mut Vec<u8> {
        match heap {
            Heap::System => &mut self.system,
            Heap::Graphics => &mut self.graphics,
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        Ok(())
    }

    pub fn write_zeros(&mut self, count: u64) -> Result<()> {
        self.write_bytes(&vec![0; count as usize])
    }

    /// Pads with zeros up to the next multiple of `alignment`
    pub fn write_padding(&mut self, alignment: u64) -> Result<()> {
        let padding = (alignment - self.position.offset % alignment) % alignment;
        self.write_zeros(padding)
    }

    /// Writes the bytes of `value` followed by a NUL terminator
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_bytes(&[0])
    }

    /// The tagged pointer of an allocated block, or `0` for none
    pub fn pointer_to(&self, id: Option<BlockId>) -> Result<u64> {
        let Some(id) = id else {
            return Ok(0);
        };

        self.layout
            .position(id)
            .map(VirtualAddress::to_pointer)
            .ok_or_else(|| Error::Allocation(format!("block {} was never assigned a position", id)))
    }

    pub fn write_pointer(&mut self, id: Option<BlockId>) -> Result<()> {
        let pointer = self.pointer_to(id)?;
        self.write_bytes(&pointer.to_le_bytes())
    }

    /// Writes an inline part at the current position
    pub fn write_part(&mut self, id: BlockId) -> Result<()> {
        let arena = self.arena;
        arena.block(id)?.write(self)
    }

    pub fn heap_len(&self, heap: Heap) -> usize {
        match heap {
            Heap::System => self.system.len(),
            Heap::Graphics => self.graphics.len(),
        }
    }

    pub(crate) fn into_heaps(self) -> (Vec<u8>, Vec<u8>) {
        (self.system, self.graphics)
    }
}

impl Write for ResourceWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let VirtualAddress { heap, offset } = self.position;
        let start = offset as usize;
        let end = start + buf.len();

        let data = self.heap_data_mut(heap);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);

        self.position = self.position.add(buf.len() as u64);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ResourceWriter<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let length = self.heap_len(self.position.heap) as i64;
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

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::ResourceWriter;
    use crate::{
        block::{BlockId, ResourceArena},
        error::Result,
        layout::Layout,
        types::VirtualAddress,
    };

    #[test]
    fn writes_grow_each_heap_independently() -> Result<()> {
        let arena = ResourceArena::new();
        let layout = Layout::default();
        let mut writer = ResourceWriter::new(&arena, &layout);

        writer.set_position(VirtualAddress::system(4));
        writer.write_string("ab")?;
        writer.write_padding(16)?;
        writer.set_position(VirtualAddress::graphics(2));
        writer.write_bytes(&[0xFF])?;

        let (system, graphics) = writer.into_heaps();
        assert_eq!(system, vec![0, 0, 0, 0, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(graphics, vec![0, 0, 0xFF]);

        Ok(())
    }

    #[test]
    fn pointers_come_from_the_layout() -> Result<()> {
        let arena = ResourceArena::new();
        let mut layout = Layout::default();
        layout.assign(BlockId(3), VirtualAddress::graphics(0x20));
        let writer = ResourceWriter::new(&arena, &layout);

        assert_eq!(writer.pointer_to(None)?, 0);
        assert_eq!(writer.pointer_to(Some(BlockId(3)))?, 0x6000_0020);
        assert!(writer.pointer_to(Some(BlockId(4))).is_err());

        Ok(())
    }
}
