//! Base types for the structure of a resource container.

use std::fmt;

use binrw::{BinRead, BinWrite};

use crate::{
    error::{Error, Result},
    page_flags::PageFlags,
};

/// Magic value at the start of every resource container ("RSC7")
pub const RESOURCE_IDENT: u32 = 0x3743_5352;

/// Virtual address where the system heap begins
pub const SYSTEM_BASE: u64 = 0x5000_0000;

/// Virtual address where the graphics heap begins
pub const GRAPHICS_BASE: u64 = 0x6000_0000;

/// One of the two independent address spaces a resource is split across
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Heap {
    /// Structures, pointer tables and most metadata
    System,

    /// Bulk data uploaded to the GPU (vertex buffers, texture pixels)
    Graphics,
}

impl Heap {
    /// The virtual address this heap is mapped to
    pub const fn base(self) -> u64 {
        match self {
            Heap::System => SYSTEM_BASE,
            Heap::Graphics => GRAPHICS_BASE,
        }
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heap::System => write!(f, "system"),
            Heap::Graphics => write!(f, "graphics"),
        }
    }
}

/// A position inside one of the two heaps
///
/// Pointers stored in block data carry the heap in their high bits. That tagging only exists on
/// the wire: [`VirtualAddress::from_pointer`] and [`VirtualAddress::to_pointer`] are the only
/// places the two representations meet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualAddress {
    /// The heap the address points into
    pub heap: Heap,

    /// Byte offset from the start of the heap
    pub offset: u64,
}

impl VirtualAddress {
    pub const fn new(heap: Heap, offset: u64) -> Self {
        Self { heap, offset }
    }

    pub const fn system(offset: u64) -> Self {
        Self::new(Heap::System, offset)
    }

    pub const fn graphics(offset: u64) -> Self {
        Self::new(Heap::Graphics, offset)
    }

    /// Returns the address `delta` bytes further into the same heap
    pub const fn add(self, delta: u64) -> Self {
        Self::new(self.heap, self.offset + delta)
    }

    /// Encodes the address as a tagged pointer
    pub const fn to_pointer(self) -> u64 {
        self.heap.base() + self.offset
    }

    /// Decodes a tagged pointer, with `0` meaning "no block"
    ///
    /// The system tag is tested first, matching how the game resolves pointers.
    pub fn from_pointer(pointer: u64) -> Result<Option<Self>> {
        if pointer == 0 {
            return Ok(None);
        }

        if pointer & SYSTEM_BASE == SYSTEM_BASE {
            return Ok(Some(Self::system(pointer & !SYSTEM_BASE)));
        }

        if pointer & GRAPHICS_BASE == GRAPHICS_BASE {
            return Ok(Some(Self::graphics(pointer & !GRAPHICS_BASE)));
        }

        Err(Error::CorruptData(format!("illegal position {:#X}", pointer)))
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.to_pointer())
    }
}

/// Resource container header
///
/// The high nibble of each page flag word carries half of the resource version.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(magic = b"RSC7", little)]
pub struct ResourceHeader {
    /// The resource type version
    pub version: i32,

    /// Page flags of the system heap, tagged with `(version >> 4) & 0xF`
    pub system_flags: u32,

    /// Page flags of the graphics heap, tagged with `version & 0xF`
    pub graphics_flags: u32,
}

impl ResourceHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 16;

    /// Creates a header, tagging both flag words with the version
    pub fn new(version: i32, system: PageFlags, graphics: PageFlags) -> Self {
        let version_bits = version as u32;
        Self {
            version,
            system_flags: system.with_version_tag((version_bits >> 4) & 0xF).value(),
            graphics_flags: graphics.with_version_tag(version_bits & 0xF).value(),
        }
    }

    pub fn system_page_flags(&self) -> PageFlags {
        PageFlags::new(self.system_flags)
    }

    pub fn graphics_page_flags(&self) -> PageFlags {
        PageFlags::new(self.graphics_flags)
    }

    /// The version recovered from the tags of the two flag words
    pub fn flags_version(&self) -> i32 {
        PageFlags::version_from_tags(self.system_page_flags(), self.graphics_page_flags())
    }
}
