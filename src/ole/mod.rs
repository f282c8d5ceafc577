/// Constants for the compound file format
pub mod consts;

/// Error types
pub mod error;

/// Big block size classes
pub mod block_size;

/// Byte-level backing stores (memory and file)
pub mod device;

/// Header block codec
pub mod header;

/// Paged allocation tables and chain loop detection
pub mod fat;

/// Big block store: BAT and DIFAT management
pub mod store;

/// Mini block store: mini-FAT and mini stream management
pub mod ministore;

/// Block chains as logical byte streams
pub mod stream;

/// Property records and the directory tree
pub mod property;

/// Read-only views over directory entries
pub mod entry;

/// Streaming document readers and writers
pub mod document;

/// The filesystem facade
///
/// Opens, creates, mutates and persists complete compound files.
pub mod filesystem;

#[cfg(test)]
mod tests;

// Re-export public types for convenient access
pub use block_size::BlockSize;
pub use device::{BlockDevice, FileDevice, MemoryDevice, OpenMode};
pub use document::{DocumentReader, DocumentWriter};
pub use entry::{DirectoryNode, DocumentNode, Entries, Entry};
pub use error::{OleError, Result};
pub use filesystem::{AllocationReport, FsState, OleFileSystem};
pub use property::{EntryId, Property, PropertyKind, PropertyTable};
pub use store::BlockStore;
pub use stream::ChainStream;

/// Returns true if `data` starts with the compound file signature.
pub fn is_ole_file(data: &[u8]) -> bool {
    data.starts_with(consts::MAGIC)
}
