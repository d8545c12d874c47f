//! Generic blocks shared by most resource types.

use std::{any::Any, fmt};

use binrw::{BinRead, BinWrite};
use byteorder::{ReadBytesExt, LE};

use crate::{
    block::{Block, BlockId, Handle, ResourceArena, ResourceBlock},
    error::Result,
    read::ResourceReader,
    types::{Heap, VirtualAddress},
    write::ResourceWriter,
};

macro_rules! any_block {
    () => {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

/// Raw bytes in either heap
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub heap: Heap,
    pub data: Vec<u8>,
}

impl DataBlock {
    pub fn new(heap: Heap, data: Vec<u8>) -> Self {
        Self { heap, data }
    }
}

impl Block for DataBlock {
    fn block_length(&self) -> u64 {
        self.data.len() as u64
    }

    fn heap(&self) -> Heap {
        self.heap
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        writer.write_bytes(&self.data)
    }

    any_block!();
}

impl ResourceBlock for DataBlock {
    /// Number of bytes
    type Args = usize;
    const NO_CACHE: bool = true;

    fn read(reader: &mut ResourceReader<'_>, length: usize) -> Result<Self> {
        let heap = reader.position().heap;
        let data = reader.read_bytes(length)?;
        Ok(Self { heap, data })
    }
}

/// A NUL-terminated string
#[derive(Debug, Clone, PartialEq)]
pub struct StringBlock {
    pub value: String,
}

impl StringBlock {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Block for StringBlock {
    fn block_length(&self) -> u64 {
        self.value.len() as u64 + 1
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        writer.write_string(&self.value)
    }

    any_block!();
}

impl ResourceBlock for StringBlock {
    type Args = ();

    fn read(reader: &mut ResourceReader<'_>, _args: ()) -> Result<Self> {
        Ok(Self {
            value: reader.read_string()?,
        })
    }
}

/// A fixed-size little-endian value stored in a [`SimpleArray`]
pub trait ArrayElement:
    for<'a> BinRead<Args<'a> = ()>
    + for<'a> BinWrite<Args<'a> = ()>
    + Clone
    + fmt::Debug
    + PartialEq
    + 'static
{
    const SIZE: u64;
}

macro_rules! array_element {
    ($($ty:ty),*) => {
        $(
            impl ArrayElement for $ty {
                const SIZE: u64 = std::mem::size_of::<$ty>() as u64;
            }
        )*
    };
}

array_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Consecutive plain values
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleArray<T> {
    pub items: Vec<T>,
}

impl<T> SimpleArray<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T: ArrayElement> Block for SimpleArray<T> {
    fn block_length(&self) -> u64 {
        self.items.len() as u64 * T::SIZE
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        for item in &self.items {
            item.write_le(writer)?;
        }
        Ok(())
    }

    any_block!();
}

impl<T: ArrayElement> ResourceBlock for SimpleArray<T> {
    /// Number of elements
    type Args = usize;
    const NO_CACHE: bool = true;

    fn read(reader: &mut ResourceReader<'_>, count: usize) -> Result<Self> {
        let items = (0..count)
            .map(|_| T::read_le(reader))
            .collect::<binrw::BinResult<Vec<_>>>()?;
        Ok(Self { items })
    }
}

/// Consecutive blocks embedded inline
///
/// The length of each item is recorded when it is added, so items must not change length
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockArray<T> {
    items: Vec<(Handle<T>, u64)>,
}

impl<T: Block> BlockArray<T> {
    pub fn new(arena: &mut ResourceArena, items: impl IntoIterator<Item = T>) -> Self {
        let items = items
            .into_iter()
            .map(|item| {
                let length = item.block_length();
                (arena.insert(item), length)
            })
            .collect();
        Self { items }
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.items.iter().map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Block> Block for BlockArray<T> {
    fn block_length(&self) -> u64 {
        self.items.iter().map(|(_, length)| length).sum()
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        for (handle, _) in &self.items {
            writer.write_part(handle.id())?;
        }
        Ok(())
    }

    fn parts(&self) -> Vec<(u64, BlockId)> {
        let mut offset = 0;
        self.items
            .iter()
            .map(|(handle, length)| {
                let part = (offset, handle.id());
                offset += length;
                part
            })
            .collect()
    }

    any_block!();
}

impl<T: ResourceBlock<Args = ()>> ResourceBlock for BlockArray<T> {
    /// Number of elements
    type Args = usize;
    const NO_CACHE: bool = true;

    fn read(reader: &mut ResourceReader<'_>, count: usize) -> Result<Self> {
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let start = reader.position();
            let handle = reader.read_block::<T>(())?;
            items.push((handle, reader.position().offset - start.offset));
        }
        Ok(Self { items })
    }
}

/// A table of 64-bit pointers to other blocks
#[derive(Debug, Clone, PartialEq)]
pub struct PointerArray<T> {
    pub items: Vec<Option<Handle<T>>>,
}

impl<T> PointerArray<T> {
    pub fn new(items: Vec<Option<Handle<T>>>) -> Self {
        Self { items }
    }
}

impl<T: Block> Block for PointerArray<T> {
    fn block_length(&self) -> u64 {
        self.items.len() as u64 * 8
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        for item in &self.items {
            writer.write_pointer(item.map(Handle::id))?;
        }
        Ok(())
    }

    fn references(&self) -> Vec<BlockId> {
        self.items.iter().flatten().map(|handle| handle.id()).collect()
    }

    any_block!();
}

impl<T: ResourceBlock<Args = ()>> ResourceBlock for PointerArray<T> {
    /// Number of pointers
    type Args = usize;

    fn read(reader: &mut ResourceReader<'_>, count: usize) -> Result<Self> {
        let pointers = (0..count)
            .map(|_| reader.read_pointer())
            .collect::<Result<Vec<_>>>()?;

        let items = pointers
            .into_iter()
            .map(|pointer| reader.read_block_at::<T>(pointer, ()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { items })
    }
}

fn read_list_header(reader: &mut ResourceReader<'_>) -> Result<(Option<VirtualAddress>, u16)> {
    let pointer = reader.read_pointer()?;
    let count = reader.read_u16::<LE>()?;
    let _capacity = reader.read_u16::<LE>()?;
    reader.skip(4);
    Ok((pointer, count))
}

fn write_list_header(
    writer: &mut ResourceWriter<'_>,
    entries: Option<BlockId>,
    count: usize,
) -> Result<()> {
    let count = count as u16;
    writer.write_pointer(entries)?;
    writer.write_bytes(&count.to_le_bytes())?;
    writer.write_bytes(&count.to_le_bytes())?;
    writer.write_zeros(4)
}

/// `{ pointer, count: u16, capacity: u16, pad: u32 }` header for an array of plain values
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleList64<T> {
    pub entries: Option<Handle<SimpleArray<T>>>,
}

impl<T: ArrayElement> SimpleList64<T> {
    /// Stores `items` in a new array, leaving the list empty when there are none
    pub fn new(arena: &mut ResourceArena, items: Vec<T>) -> Self {
        let entries = (!items.is_empty()).then(|| arena.insert(SimpleArray::new(items)));
        Self { entries }
    }

    pub fn items<'a>(&self, arena: &'a ResourceArena) -> Result<&'a [T]> {
        match self.entries {
            Some(entries) => Ok(&arena.get(entries)?.items),
            None => Ok(&[]),
        }
    }
}

impl<T: ArrayElement> Block for SimpleList64<T> {
    fn block_length(&self) -> u64 {
        16
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        let count = self.items(writer.arena())?.len();
        write_list_header(writer, self.entries.map(Handle::id), count)
    }

    fn references(&self) -> Vec<BlockId> {
        self.entries.map(Handle::id).into_iter().collect()
    }

    any_block!();
}

impl<T: ArrayElement> ResourceBlock for SimpleList64<T> {
    type Args = ();
    const NO_CACHE: bool = true;

    fn read(reader: &mut ResourceReader<'_>, _args: ()) -> Result<Self> {
        let (pointer, count) = read_list_header(reader)?;
        let pointer = pointer.filter(|_| count > 0);
        let entries = reader.read_block_at::<SimpleArray<T>>(pointer, count as usize)?;
        Ok(Self { entries })
    }
}

/// `{ pointer, count: u16, capacity: u16, pad: u32 }` header for a table of block pointers
#[derive(Debug, Clone, PartialEq)]
pub struct PointerList64<T> {
    pub entries: Option<Handle<PointerArray<T>>>,
}

impl<T: Block> PointerList64<T> {
    pub fn new(arena: &mut ResourceArena, items: Vec<Option<Handle<T>>>) -> Self {
        let entries = (!items.is_empty()).then(|| arena.insert(PointerArray::new(items)));
        Self { entries }
    }

    pub fn items<'a>(&self, arena: &'a ResourceArena) -> Result<&'a [Option<Handle<T>>]> {
        match self.entries {
            Some(entries) => Ok(&arena.get(entries)?.items),
            None => Ok(&[]),
        }
    }
}

impl<T: Block> Block for PointerList64<T> {
    fn block_length(&self) -> u64 {
        16
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        let count = self.items(writer.arena())?.len();
        write_list_header(writer, self.entries.map(Handle::id), count)
    }

    fn references(&self) -> Vec<BlockId> {
        self.entries.map(Handle::id).into_iter().collect()
    }

    any_block!();
}

impl<T: ResourceBlock<Args = ()>> ResourceBlock for PointerList64<T> {
    type Args = ();

    fn read(reader: &mut ResourceReader<'_>, _args: ()) -> Result<Self> {
        let (pointer, count) = read_list_header(reader)?;
        let pointer = pointer.filter(|_| count > 0);
        let entries = reader.read_block_at::<PointerArray<T>>(pointer, count as usize)?;
        Ok(Self { entries })
    }
}

/// Page statistics stored after the root of most resource files
#[derive(BinRead, BinWrite, Debug, Default, Clone, PartialEq)]
#[brw(little)]
pub struct PagesInfo {
    pub unknown_0h: u32,
    pub unknown_4h: u32,
    pub system_pages_count: u8,
    pub graphics_pages_count: u8,
    pub unknown_ah: u16,
    pub unknown_ch: u32,
    pub unknown_10h: u32,
}

impl PagesInfo {
    /// Zeroed page table written after the fixed fields
    pub const TABLE_SIZE: u64 = 4096;
}

impl Block for PagesInfo {
    fn block_length(&self) -> u64 {
        20 + Self::TABLE_SIZE
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        self.write_le(writer)?;
        writer.write_zeros(Self::TABLE_SIZE)
    }

    any_block!();
}

impl ResourceBlock for PagesInfo {
    type Args = ();

    fn read(reader: &mut ResourceReader<'_>, _args: ()) -> Result<Self> {
        let info = PagesInfo::read_le(reader)?;
        reader.skip(Self::TABLE_SIZE);
        Ok(info)
    }
}

/// Common root of resource files
///
/// When a resource is built with one of these as its root, its [`PagesInfo`] receives the final
/// page counts of both heaps.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBase {
    pub file_vft: u32,
    pub file_unknown: u32,
    pub pages_info: Option<Handle<PagesInfo>>,
}

impl FileBase {
    pub fn new(file_vft: u32, pages_info: Option<Handle<PagesInfo>>) -> Self {
        Self {
            file_vft,
            file_unknown: 1,
            pages_info,
        }
    }
}

impl Block for FileBase {
    fn block_length(&self) -> u64 {
        16
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()> {
        writer.write_bytes(&self.file_vft.to_le_bytes())?;
        writer.write_bytes(&self.file_unknown.to_le_bytes())?;
        writer.write_pointer(self.pages_info.map(Handle::id))
    }

    fn references(&self) -> Vec<BlockId> {
        self.pages_info.map(Handle::id).into_iter().collect()
    }

    any_block!();
}

impl ResourceBlock for FileBase {
    type Args = ();

    fn read(reader: &mut ResourceReader<'_>, _args: ()) -> Result<Self> {
        let file_vft = reader.read_u32::<LE>()?;
        let file_unknown = reader.read_u32::<LE>()?;
        let pointer = reader.read_pointer()?;
        let pages_info = reader.read_block_at::<PagesInfo>(pointer, ())?;

        Ok(Self {
            file_vft,
            file_unknown,
            pages_info,
        })
    }
}
