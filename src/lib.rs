//! Longan - an OLE2 compound file storage engine
//!
//! Reads, mutates and writes OLE2 compound files (also known as Compound
//! File Binary, CFB, or POIFS), the container format behind legacy Microsoft
//! Office documents (.doc, .xls, .ppt, .msg).
//!
//! # Features
//!
//! - **Both block sizes**: 512-byte (version 3) and 4096-byte (version 4) files
//! - **Full mutation**: create, replace, rename and delete entries in place
//! - **Block reuse**: freed blocks are handed out again, lowest index first
//! - **Mini stream**: small documents are packed into 64-byte mini blocks
//! - **Corruption checks**: cyclic chains and broken tables are reported as errors
//! - **File backing**: open large files with positioned reads and write them back in place
//!
//! # Example - Creating a filesystem
//!
//! ```
//! use longan::ole::OleFileSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut fs = OleFileSystem::new()?;
//! let root = fs.root_id();
//! let dir = fs.create_directory(root, "Objects")?;
//! fs.create_document(dir, "Contents", &[0u8; 5000])?;
//!
//! let mut bytes = Vec::new();
//! fs.write_filesystem(&mut bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Reading an existing file
//!
//! ```no_run
//! use longan::ole::{OleFileSystem, OpenMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut fs = OleFileSystem::open_file("document.doc", OpenMode::ReadOnly)?;
//! for path in fs.list_streams()? {
//!     println!("{}", path.join("/"));
//! }
//! let word = fs.open_stream(&["WordDocument"])?;
//! println!("WordDocument is {} bytes", word.len());
//! # Ok(())
//! # }
//! ```

/// Shared helpers: binary codecs and format detection
pub mod common;

/// OLE2 compound file engine
pub mod ole;

pub use common::FileMagic;
pub use ole::{OleError, OleFileSystem};
