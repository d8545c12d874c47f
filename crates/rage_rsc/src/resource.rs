//! Building a block graph into a resource container and loading it back.

use std::{collections::HashSet, io::Cursor};

use binrw::{BinRead, BinWrite};
use bon::Builder;
use tracing::{debug, instrument};

use crate::{
    block::{BlockId, Handle, ResourceArena, ResourceBlock},
    compression::{deflate, inflate},
    containers::FileBase,
    error::{Error, Result},
    layout::{assign_positions, Layout, LayoutBlock},
    read::{BlockCache, ResourceReader},
    types::{Heap, ResourceHeader, VirtualAddress, RESOURCE_IDENT},
    write::ResourceWriter,
};

/// Options for how a resource should be built
#[derive(Debug, Clone, Copy, Builder)]
pub struct BuildOptions {
    /// Deflate the heaps after the header
    #[builder(default = true)]
    pub compress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A loaded resource: its header, every decoded block and the root
#[derive(Debug)]
pub struct Resource<T> {
    pub header: ResourceHeader,
    pub arena: ResourceArena,
    pub root: Handle<T>,
}

impl<T: ResourceBlock> Resource<T> {
    pub fn root(&self) -> Result<&T> {
        self.arena.get(self.root)
    }
}

/// Blocks of each heap in discovery order, root first
#[derive(Debug, Default)]
struct BlockSets {
    system: Vec<BlockId>,
    graphics: Vec<BlockId>,
    seen: HashSet<BlockId>,
    processed: HashSet<BlockId>,
}

impl BlockSets {
    fn add(&mut self, arena: &ResourceArena, id: BlockId) -> Result<()> {
        if self.seen.insert(id) {
            match arena.block(id)?.heap() {
                Heap::System => self.system.push(id),
                Heap::Graphics => self.graphics.push(id),
            }
        }
        Ok(())
    }

    fn add_children(&mut self, arena: &ResourceArena, id: BlockId) -> Result<()> {
        let block = arena.block(id)?;

        for reference in block.references() {
            if self.processed.insert(reference) {
                self.add(arena, reference)?;
                self.add_children(arena, reference)?;
            }
        }

        for (_, part) in block.parts() {
            self.add_children(arena, part)?;
        }

        Ok(())
    }

    fn collect(arena: &ResourceArena, root: BlockId) -> Result<Self> {
        let mut sets = Self::default();
        sets.add(arena, root)?;
        sets.add_children(arena, root)?;
        Ok(sets)
    }
}

fn layout_blocks(arena: &ResourceArena, ids: &[BlockId]) -> Result<Vec<LayoutBlock>> {
    ids.iter()
        .map(|id| {
            Ok(LayoutBlock {
                id: *id,
                length: arena.block(*id)?.block_length(),
            })
        })
        .collect()
}

fn assign_with_parts(
    arena: &ResourceArena,
    layout: &mut Layout,
    id: BlockId,
    address: VirtualAddress,
) -> Result<()> {
    layout.assign(id, address);
    for (offset, part) in arena.block(id)?.parts() {
        assign_with_parts(arena, layout, part, address.add(offset))?;
    }
    Ok(())
}

/// Lays out and serializes the graph reachable from `root`
///
/// If the root is a [`FileBase`] with a [`crate::containers::PagesInfo`], the page counts of both
/// heaps are stored in it before writing.
#[instrument(skip(arena, options), err)]
pub fn build(
    arena: &mut ResourceArena,
    root: BlockId,
    version: i32,
    options: BuildOptions,
) -> Result<Vec<u8>> {
    let sets = BlockSets::collect(arena, root)?;

    let system = assign_positions(&layout_blocks(arena, &sets.system)?, Heap::System)?;
    let graphics = assign_positions(&layout_blocks(arena, &sets.graphics)?, Heap::Graphics)?;

    let pages_info = arena
        .handle::<FileBase>(root)
        .and_then(|handle| arena.get(handle).ok())
        .and_then(|file| file.pages_info);
    if let Some(pages_info) = pages_info {
        let info = arena.get_mut(pages_info)?;
        info.system_pages_count = system.flags.count() as u8;
        info.graphics_pages_count = graphics.flags.count() as u8;
    }

    let arena = &*arena;
    let mut layout = Layout::default();
    for (heap, heap_layout) in [(Heap::System, &system), (Heap::Graphics, &graphics)] {
        for (id, offset) in &heap_layout.positions {
            assign_with_parts(arena, &mut layout, *id, VirtualAddress::new(heap, *offset))?;
        }
    }

    let mut writer = ResourceWriter::new(arena, &layout);
    for (heap, ids) in [(Heap::System, &sets.system), (Heap::Graphics, &sets.graphics)] {
        for id in ids {
            let address = layout
                .position(*id)
                .ok_or_else(|| Error::Allocation(format!("block {} was not placed", id)))?;
            let block = arena.block(*id)?;

            writer.set_position(address);
            block.write(&mut writer)?;

            if writer.position().offset - address.offset != block.block_length() {
                return Err(Error::BlockLengthMismatch(heap));
            }
        }
    }

    let (mut system_data, mut graphics_data) = writer.into_heaps();
    for (heap, data, flags) in [
        (Heap::System, &mut system_data, system.flags),
        (Heap::Graphics, &mut graphics_data, graphics.flags),
    ] {
        let size = flags.size() as usize;
        if data.len() > size {
            return Err(Error::Allocation(format!(
                "{} heap holds {} bytes but its pages only cover {}",
                heap,
                data.len(),
                size
            )));
        }
        data.resize(size, 0);
    }

    debug!("system {}, graphics {}", system.flags, graphics.flags);

    let mut body = system_data;
    body.extend_from_slice(&graphics_data);
    if options.compress {
        body = deflate(&body)?;
    }

    let header = ResourceHeader::new(version, system.flags, graphics.flags);
    let mut output = Cursor::new(Vec::with_capacity(ResourceHeader::SIZE + body.len()));
    header.write(&mut output)?;

    let mut output = output.into_inner();
    output.extend_from_slice(&body);
    Ok(output)
}

/// Parses the header of a resource container
pub fn read_header(data: &[u8]) -> Result<ResourceHeader> {
    if data.len() < ResourceHeader::SIZE {
        return Err(Error::InvalidFormat("truncated header".into()));
    }

    if data[..4] != RESOURCE_IDENT.to_le_bytes() {
        return Err(Error::InvalidFormat("bad magic".into()));
    }

    Ok(ResourceHeader::read(&mut Cursor::new(data))?)
}

/// Loads a compressed resource container, decoding its root as a `T`
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn load<T: ResourceBlock<Args = ()>>(data: &[u8]) -> Result<Resource<T>> {
    let header = read_header(data)?;
    let body = inflate(&data[ResourceHeader::SIZE..])?;
    load_decompressed(header, &body)
}

/// Loads already decompressed heap data described by `header`
///
/// This is the entry point for resources extracted from an archive, where the page flags come
/// from the archive entry instead of a header.
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn load_decompressed<T: ResourceBlock<Args = ()>>(
    header: ResourceHeader,
    data: &[u8],
) -> Result<Resource<T>> {
    let system_size = header.system_page_flags().size() as usize;
    let graphics_size = header.graphics_page_flags().size() as usize;

    let system = data.get(..system_size);
    let graphics = data.get(system_size..system_size + graphics_size);
    let (Some(system), Some(graphics)) = (system, graphics) else {
        return Err(Error::CorruptData(format!(
            "{} bytes of heap data but the page flags describe {}",
            data.len(),
            system_size + graphics_size
        )));
    };

    let mut cache = BlockCache::new();
    let mut reader = ResourceReader::new(system, graphics, &mut cache);
    reader.set_position(VirtualAddress::system(0));

    let root = reader.read_block::<T>(())?;
    let arena = reader.into_arena();
    debug!("loaded {} blocks, {} shared", arena.len(), cache.len());

    Ok(Resource {
        header,
        arena,
        root,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::{build, load, read_header, BuildOptions};
    use crate::{
        block::ResourceArena,
        containers::{DataBlock, FileBase, PagesInfo, StringBlock},
        error::{Error, Result},
        types::Heap,
    };

    #[traced_test]
    #[test]
    fn string_root() -> Result<()> {
        let mut arena = ResourceArena::new();
        let root = arena.insert(StringBlock::new("hello"));

        let data = build(&mut arena, root.id(), 2, BuildOptions::default())?;
        let header = read_header(&data)?;
        assert_eq!(header.version, 2);
        assert_eq!(header.system_page_flags().size(), 8192);

        let resource = load::<StringBlock>(&data)?;
        assert_eq!(resource.root()?.value, "hello");

        Ok(())
    }

    #[test]
    fn uncompressed_body_is_raw_heaps() -> Result<()> {
        let mut arena = ResourceArena::new();
        let root = arena.insert(DataBlock::new(Heap::System, vec![0xAB; 32]));

        let options = BuildOptions::builder().compress(false).build();
        let data = build(&mut arena, root.id(), 0, options)?;

        assert_eq!(data.len(), 16 + 8192);
        assert_eq!(&data[16..48], &[0xAB; 32]);
        assert!(data[48..].iter().all(|b| *b == 0));

        Ok(())
    }

    #[test]
    fn pages_info_receives_page_counts() -> Result<()> {
        let mut arena = ResourceArena::new();
        let info = arena.insert(PagesInfo::default());
        let root = arena.insert(FileBase::new(0x4000_0000, Some(info)));
        arena.insert(DataBlock::new(Heap::Graphics, vec![1; 4]));

        build(&mut arena, root.id(), 1, BuildOptions::default())?;

        assert_eq!(arena.get(info)?.system_pages_count, 1);
        assert_eq!(arena.get(info)?.graphics_pages_count, 0);

        Ok(())
    }

    #[test]
    fn bad_magic() {
        let data = b"RSC8\0\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        assert!(matches!(
            load::<StringBlock>(&data),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(read_header(b"RS"), Err(Error::InvalidFormat(_))));
    }
}
