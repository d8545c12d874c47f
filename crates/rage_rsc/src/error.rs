//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::{block::BlockId, types::Heap};

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// data is not a valid resource container
    #[error("data is not a valid resource container: {0}")]
    #[diagnostic(code(rage_rsc::invalid_format))]
    InvalidFormat(String),

    /// resource data is corrupt
    #[error("resource data is corrupt: {0}")]
    #[diagnostic(code(rage_rsc::corrupt_data))]
    CorruptData(String),

    /// A block wrote a different number of bytes than it reported as its length
    #[error("error in {0} length")]
    #[diagnostic(
        code(rage_rsc::block_length),
        help("the block's `block_length` must match exactly what its `write` emits")
    )]
    BlockLengthMismatch(Heap),

    /// The page layout could not be expressed in page flags
    #[error("unable to allocate resource pages: {0}")]
    #[diagnostic(code(rage_rsc::allocation))]
    Allocation(String),

    /// The arena has no block stored for the id
    #[error("block {0} does not exist")]
    UnknownBlock(BlockId),

    /// A handle resolved to a block of another type
    #[error("block {0} is not a {1}")]
    TypeMismatch(BlockId, &'static str),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
