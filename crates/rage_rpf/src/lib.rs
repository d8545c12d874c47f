//! This library reads, creates and edits **RPF7** archives in place.
//!
//! # RPF7 Archive Format
//!
//! An archive is a sequence of 512-byte blocks. The first blocks hold the header, the entry table
//! and the name table. File data follows, every file starting on a block boundary. Files can be
//! archives themselves, nested archives are edited inside the blocks of their container.
//!
//! ## Header
//!
//! | Offset (bytes) | Field         | Description                                          |
//! |----------------|---------------|------------------------------------------------------|
//! | 0x0000         | Magic number  | 4 bytes: 0x52504637 ("RPF7")                         |
//! | 0x0004         | Entry Count   | 4 bytes: Number of 16-byte records in the table      |
//! | 0x0008         | Names Length  | 4 bytes: Size of the name table, a multiple of 16    |
//! | 0x000C         | Encryption    | 4 bytes: `0`, `OPEN`, AES or NG                      |
//!
//! ## Entry Table
//!
//! The first record is always the root directory. The children of a directory are the records
//! `entries_index..entries_index + entries_count`, sorted by name. The second word of a record
//! tells its kind apart:
//!
//! - `0x7FFFFF00`: directory
//! - high bit clear: binary file
//! - high bit set: resource file
//!
//! | Offset (bytes) | Directory       | Binary                | Resource                     |
//! |----------------|-----------------|-----------------------|------------------------------|
//! | 0x0000         | Name offset u32 | Name offset u16       | Name offset u16              |
//! | 0x0002         |                 | Stored size u24       | Stored size u24              |
//! | 0x0004         | `0x7FFFFF00`    |                       |                              |
//! | 0x0005         |                 | Block offset u24      | Block offset u24 \| 0x800000 |
//! | 0x0008         | Entries index   | Uncompressed size u32 | System page flags            |
//! | 0x000C         | Entries count   | Encrypted u32         | Graphics page flags          |
//!
//! A binary with a stored size of `0` is stored uncompressed, otherwise it is raw DEFLATE. A
//! resource too large for 24 bits stores `0xFFFFFF` and packs its real size into bytes 2, 5, 7
//! and 14 of the container header stored with it.
//!
//! ## Name Table
//!
//! NUL-terminated names in entry table order, each distinct name stored once, padded with zeros
//! to 16 bytes.
//!
//! # Example
//!
//! ```
//! # fn doit() -> rage_rpf::error::Result<()>
//! # {
//! use std::io::Cursor;
//! use rage_rpf::{ArchiveOptions, RpfFile};
//!
//! let mut rpf = RpfFile::new(Cursor::new(Vec::new()), "dlc.rpf", ArchiveOptions::default())?;
//! let root = rpf.root_directory(rpf.root())?;
//! let data = rpf.create_directory(root, "data")?;
//! rpf.create_file(data, "notes.txt", b"hello", false)?;
//!
//! let found = rpf.find_entry(rpf.root(), "DATA/notes.txt")?;
//! assert!(found.is_some());
//! assert_eq!(rpf.get_files(rpf.root(), "data", false)?.len(), 1);
//! # Ok(())
//! # }
//! # doit().unwrap();
//! ```

pub mod alloc;
pub mod archive;
mod edit;
pub mod entry;
pub mod error;
mod extract;
pub mod hash;
pub mod types;

pub use alloc::Extent;
pub use archive::{ArchiveOptions, ArchiveStats, ArchiveStorage, RpfArchive, RpfFile};
pub use entry::{
    ArchiveId, BinaryEntry, DirectoryEntry, EntryId, EntryKind, ResourceEntry, RpfEntry,
};
pub use hash::joaat;
pub use types::RpfEncryption;
