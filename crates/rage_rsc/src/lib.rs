//! A library for building and loading paged RSC7 resource containers.
//!
//! A resource is a graph of [`block::Block`]s spread over two heaps. Building a resource assigns
//! every block an address inside a set of power-of-two pages, patches the pointers between
//! blocks, and deflates the result. Loading reverses this, sharing blocks that are pointed to from
//! several places.
//!
//! # Container Format
//!
//! ```text
//! ┌──────────────────────┐
//! │ Header (16 bytes)    │
//! ├──────────────────────┤
//! │ System heap pages    │ ┐
//! ├──────────────────────┤ ├─ raw DEFLATE
//! │ Graphics heap pages  │ ┘
//! └──────────────────────┘
//! ```
//!
//! ## Header
//!
//! | Offset | Type  | Description                                               |
//! |--------|-------|-----------------------------------------------------------|
//! | 0x00   | u32   | Magic, `"RSC7"`                                           |
//! | 0x04   | i32   | Version                                                   |
//! | 0x08   | u32   | System page flags, high nibble is `(version >> 4) & 0xF`  |
//! | 0x0C   | u32   | Graphics page flags, high nibble is `version & 0xF`       |
//!
//! See [`page_flags`] for the layout of the flag words.
//!
//! ## Pointers
//!
//! Pointers are 64-bit. System heap addresses start at `0x50000000` and graphics heap addresses
//! at `0x60000000`. A null pointer is `0`. Every block starts on a 16-byte boundary and no block
//! crosses a page boundary.
//!
//! # Example
//!
//! ```
//! # fn doit() -> rage_rsc::error::Result<()>
//! # {
//! use rage_rsc::{build, load, BuildOptions, ResourceArena, StringBlock};
//!
//! let mut arena = ResourceArena::new();
//! let root = arena.insert(StringBlock::new("hello"));
//!
//! let data = build(&mut arena, root.id(), 1, BuildOptions::default())?;
//! let resource = load::<StringBlock>(&data)?;
//!
//! assert_eq!(resource.root()?.value, "hello");
//! # Ok(())
//! # }
//! # doit().unwrap();
//! ```

pub mod block;
pub mod compression;
pub mod containers;
pub mod error;
pub mod layout;
pub mod page_flags;
pub mod read;
pub mod resource;
pub mod types;
pub mod write;

pub use block::{Block, BlockId, Handle, ResourceArena, ResourceBlock};
pub use containers::{
    ArrayElement, BlockArray, DataBlock, FileBase, PagesInfo, PointerArray, PointerList64,
    SimpleArray, SimpleList64, StringBlock,
};
pub use page_flags::PageFlags;
pub use read::ResourceReader;
pub use resource::{build, load, load_decompressed, read_header, BuildOptions, Resource};
pub use types::{Heap, ResourceHeader, VirtualAddress};
pub use write::ResourceWriter;
