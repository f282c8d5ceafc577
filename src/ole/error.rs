//! Error types for compound file operations.
//!
//! Errors fall into a few families:
//!
//! - **Format**: the input is not a compound file at all ([`OleError::EmptyFile`],
//!   [`OleError::NotOleFile`], [`OleError::InvalidFormat`]). Raised at open time.
//! - **Corruption**: the container is structurally damaged ([`OleError::CorruptedFile`],
//!   [`OleError::ChainLoop`]). Fatal for the operation that hit it.
//! - **Range**: a block or table index beyond what is allocated ([`OleError::OutOfRange`]).
//! - **Usage**: lookups and creations that cannot be satisfied. Deleting and renaming
//!   report their expected failures as `Ok(false)` instead of an error.
//! - **Resource**: I/O failures and access to a closed or read-only store.

use crate::common::detection::FileMagic;
use std::io;
use thiserror::Error;

/// Error types for OLE compound file handling
#[derive(Debug, Error)]
pub enum OleError {
    /// IO error from the backing store
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The supplied input has no bytes at all
    #[error("The supplied file was empty (zero bytes long)")]
    EmptyFile,

    /// The input is not a compound file; carries what it looks like instead
    #[error("Not an OLE file: {0}")]
    NotOleFile(FileMagic),

    /// The header is present but describes an unsupported layout
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Structural damage inside an otherwise valid container
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// A block chain revisits a block it already passed through
    #[error("Corrupted file: block {block} is referenced more than once in a chain")]
    ChainLoop { block: u32 },

    /// A block or table slot index beyond the allocated range
    #[error("Index {index} is out of range (limit {limit})")]
    OutOfRange { index: u32, limit: u32 },

    /// No entry with the requested name or path
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// An entry with the same name already exists in the directory
    #[error("Duplicate name \"{0}\"")]
    AlreadyExists(String),

    /// The name cannot be stored in a property record
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    /// A directory operation was attempted on a document
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A document operation was attempted on a directory
    #[error("Not a document: {0}")]
    NotADocument(String),

    /// The backing store cannot be written
    #[error("The backing store is read-only")]
    ReadOnly,

    /// The filesystem has been closed
    #[error("The filesystem has been closed")]
    Closed,
}

/// Result type for compound file operations.
pub type Result<T> = std::result::Result<T, OleError>;
