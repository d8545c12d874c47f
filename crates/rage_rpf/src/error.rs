//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::entry::{ArchiveId, EntryId};

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid rpf archive
    #[error("file is an invalid rpf archive: {0}")]
    #[diagnostic(code(rage_rpf::invalid_archive))]
    InvalidArchive(String),

    /// archive data is corrupt
    #[error("archive data is corrupt: {0}")]
    #[diagnostic(code(rage_rpf::corrupt_data))]
    CorruptData(String),

    /// The archive or entry uses encryption that is not implemented
    #[error("{0} encryption is not supported")]
    #[diagnostic(
        code(rage_rpf::unsupported_encryption),
        help("only unencrypted and OPEN archives can be read or written")
    )]
    UnsupportedEncryption(String),

    /// unable to find requested entry
    #[error("unable to find requested entry")]
    EntryNotFound(#[from] EntryNotFoundError),

    /// An entry with the same name already exists
    #[error("{0} already exists")]
    #[diagnostic(code(rage_rpf::already_exists))]
    AlreadyExists(String),

    /// The operation cannot be applied to the archive in its current state
    #[error("invalid operation: {0}")]
    #[diagnostic(code(rage_rpf::invalid_operation))]
    InvalidOperation(String),

    /// Failure in the embedded resource codec
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] rage_rsc::error::Error),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when an entry has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested entry")]
pub enum EntryNotFoundError {
    /// by path {0}
    #[error("by path {0}")]
    Path(String),

    /// by id {0}
    #[error("by id {0}")]
    Id(EntryId),

    /// archive {0}
    #[error("archive {0}")]
    Archive(ArchiveId),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
