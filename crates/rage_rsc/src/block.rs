//! Blocks and the arena that owns them.
//!
//! A resource is a graph of blocks. Blocks refer to each other through [`BlockId`]s that index into
//! a [`ResourceArena`], so shared and cyclic pointers never need shared ownership.

use std::{any::Any, fmt, hash, marker::PhantomData};

use crate::{
    error::{Error, Result},
    read::ResourceReader,
    types::Heap,
    write::ResourceWriter,
};

/// Index of a block inside a [`ResourceArena`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A [`BlockId`] that remembers the concrete block type it points at
pub struct Handle<T> {
    id: BlockId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(self) -> BlockId {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> hash::Hash for Handle<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id.0).finish()
    }
}

impl<T> From<Handle<T>> for BlockId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}

/// A contiguous run of bytes inside one heap
///
/// Two kinds of edges leave a block:
///
/// * `parts` are embedded inline at a fixed offset from the owner and take their address from it
/// * `references` are pointed to and get their own address from the page allocator
pub trait Block: Any + fmt::Debug {
    /// Exact number of bytes [`Block::write`] emits
    fn block_length(&self) -> u64;

    /// The heap this block is stored in
    fn heap(&self) -> Heap {
        Heap::System
    }

    fn write(&self, writer: &mut ResourceWriter<'_>) -> Result<()>;

    /// Inline sub-blocks with their offsets from the start of this block
    fn parts(&self) -> Vec<(u64, BlockId)> {
        Vec::new()
    }

    /// Blocks this block points to
    fn references(&self) -> Vec<BlockId> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A block that can be decoded from a [`ResourceReader`]
pub trait ResourceBlock: Block + Sized {
    /// Extra information needed to decode the block, such as an element count
    type Args: Clone;

    /// Blocks that are re-read on every pointer instead of being shared by address
    const NO_CACHE: bool = false;

    /// Decodes the block at the reader's position, leaving the reader after it
    fn read(reader: &mut ResourceReader<'_>, args: Self::Args) -> Result<Self>;
}

/// Owner of every block in a resource graph
#[derive(Debug, Default)]
pub struct ResourceArena {
    blocks: Vec<Option<Box<dyn Block>>>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Block>(&mut self, block: T) -> Handle<T> {
        self.blocks.push(Some(Box::new(block)));
        Handle::new(BlockId(self.blocks.len() - 1))
    }

    /// Claims an id before the block is decoded so cycles can resolve to it
    pub(crate) fn reserve(&mut self) -> BlockId {
        self.blocks.push(None);
        BlockId(self.blocks.len() - 1)
    }

    pub(crate) fn fill<T: Block>(&mut self, id: BlockId, block: T) {
        if let Some(slot) = self.blocks.get_mut(id.0) {
            *slot = Some(Box::new(block));
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Looks up a block without knowing its type
    pub fn block(&self, id: BlockId) -> Result<&dyn Block> {
        self.try_block(id).ok_or(Error::UnknownBlock(id))
    }

    pub(crate) fn try_block(&self, id: BlockId) -> Option<&dyn Block> {
        self.blocks.get(id.0).and_then(|slot| slot.as_deref())
    }

    pub fn get<T: Block>(&self, handle: Handle<T>) -> Result<&T> {
        let id = handle.id();
        self.block(id)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or(Error::TypeMismatch(id, std::any::type_name::<T>()))
    }

    pub fn get_mut<T: Block>(&mut self, handle: Handle<T>) -> Result<&mut T> {
        let id = handle.id();
        self.blocks
            .get_mut(id.0)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(Error::UnknownBlock(id))?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(Error::TypeMismatch(id, std::any::type_name::<T>()))
    }

    /// Returns a typed handle if the block stored at `id` is a `T`
    pub fn handle<T: Block>(&self, id: BlockId) -> Option<Handle<T>> {
        self.try_block(id)
            .filter(|block| block.as_any().is::<T>())
            .map(|_| Handle::new(id))
    }
}
