//! The compound filesystem facade.
//!
//! [`OleFileSystem`] ties the big block store, the mini store and the property
//! table together. It creates, opens, mutates and persists a complete
//! filesystem. Every mutation is applied to the in-memory tables right away
//! and written back by [`OleFileSystem::write_filesystem`] or
//! [`OleFileSystem::write_in_place`].
//!
//! # Persisting
//!
//! Writing syncs in a fixed order: the mini-FAT, then the property table
//! (whose chain may grow the BAT), then the header, BAT and DIFAT blocks. The
//! device then holds the complete file.

use super::block_size::BlockSize;
use super::consts::*;
use super::device::{BlockDevice, FileDevice, MemoryDevice, OpenMode};
use super::document::{DocumentReader, DocumentWriter};
use super::entry::{DirectoryNode, Entry};
use super::error::{OleError, Result};
use super::fat::AllocationTable;
use super::header::HeaderBlock;
use super::ministore::MiniStore;
use super::property::{EntryId, Property, PropertyRecord, PropertyTable, validate_name};
use super::store::{BigBlockStore, BlockStore};
use super::stream::ChainStream;
use chrono::{DateTime, Utc};
use fixedbitset::FixedBitSet;
use std::io::{Read, Write};
use std::path::Path;

/// Lifecycle state of a filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsState {
    Open,
    Closed,
}

/// Block accounting produced by [`OleFileSystem::audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// Blocks marked as holding the BAT
    pub bat_blocks: usize,
    /// Blocks marked as holding the DIFAT
    pub difat_blocks: usize,
    /// Blocks owned by exactly one chain
    pub chained_blocks: usize,
    /// Blocks marked free
    pub free_blocks: usize,
    /// Mini blocks owned by exactly one chain
    pub chained_mini_blocks: usize,
    /// Mini blocks marked free
    pub free_mini_blocks: usize,
}

/// An OLE2 compound filesystem.
///
/// # Examples
///
/// ```
/// use longan::ole::OleFileSystem;
///
/// let mut fs = OleFileSystem::new().unwrap();
/// let root = fs.root_id();
/// fs.create_document(root, "Foo", b"bar").unwrap();
///
/// let bytes = fs.to_bytes().unwrap();
/// let mut reopened = OleFileSystem::open_bytes(bytes).unwrap();
/// assert_eq!(reopened.open_stream(&["Foo"]).unwrap(), b"bar");
/// ```
#[derive(Debug)]
pub struct OleFileSystem {
    store: BigBlockStore,
    mini: MiniStore,
    properties: PropertyTable,
    property_stream: ChainStream,
    read_only: bool,
    state: FsState,
}

impl OleFileSystem {
    /// Create an empty filesystem with 512-byte blocks.
    pub fn new() -> Result<Self> {
        Self::with_block_size(BlockSize::Small)
    }

    /// Create an empty filesystem with the given block size.
    pub fn with_block_size(block_size: BlockSize) -> Result<Self> {
        Ok(Self {
            store: BigBlockStore::create(block_size)?,
            mini: MiniStore::new(block_size),
            properties: PropertyTable::new(),
            property_stream: ChainStream::empty(),
            read_only: false,
            state: FsState::Open,
        })
    }

    /// Open a filesystem held in memory.
    pub fn open_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::open_device(Box::new(MemoryDevice::new(data.into())))
    }

    /// Read a whole stream into memory and open it.
    pub fn open_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::open_bytes(data)
    }

    /// Open a file with positioned access, reading blocks on demand.
    pub fn open_file<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let device = FileDevice::open(path, mode)?;
        Self::open_device(Box::new(device))
    }

    /// Open a filesystem stored on an arbitrary device.
    pub fn open_device(device: Box<dyn BlockDevice>) -> Result<Self> {
        let read_only = device.is_read_only();
        let mut store = BigBlockStore::open(device)?;
        let block_size = store.size_class();

        let property_start = store.header().property_start();
        if !is_regular_sector(property_start) {
            return Err(OleError::CorruptedFile(format!(
                "Header names no property table (start {:#010X})",
                property_start
            )));
        }
        let property_stream = ChainStream::new(property_start);
        let data = property_stream.read_to_vec(&mut store, None)?;
        let records = PropertyRecord::decode_all(&data, block_size)?;
        let properties = PropertyTable::from_records(records)?;

        let root = properties.root_property();
        let mini = MiniStore::load(&mut store, root.start_block())?;
        if root.size() > mini.stream_size() {
            log::warn!(
                "Root entry declares a mini stream of {} bytes but its chain holds {}",
                root.size(),
                mini.stream_size()
            );
        }

        log::debug!("Loaded {} properties", properties.len());
        Ok(Self {
            store,
            mini,
            properties,
            property_stream,
            read_only,
            state: FsState::Open,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> FsState {
        self.state
    }

    /// Returns true until [`OleFileSystem::close`] is called
    pub fn is_open(&self) -> bool {
        self.state == FsState::Open
    }

    /// Returns true if the filesystem was opened from a read-only file
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state {
            FsState::Open => Ok(()),
            FsState::Closed => Err(OleError::Closed),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(OleError::ReadOnly);
        }
        Ok(())
    }

    /// Big block size class
    pub fn block_size(&self) -> BlockSize {
        self.store.size_class()
    }

    /// Big block size in bytes
    pub fn big_block_size(&self) -> usize {
        self.store.block_size()
    }

    /// Header block
    pub fn header(&self) -> &HeaderBlock {
        self.store.header()
    }

    /// Big block allocation table
    pub fn bat(&self) -> &AllocationTable {
        self.store.bat()
    }

    /// Directory tree arena
    pub fn property_table(&self) -> &PropertyTable {
        &self.properties
    }

    /// Mini-FAT and mini stream bookkeeping
    pub fn mini_store(&self) -> &MiniStore {
        &self.mini
    }

    /// BAT slot for big block `index`.
    pub fn next_block(&self, index: u32) -> Result<u32> {
        self.ensure_open()?;
        self.store.next_block(index)
    }

    /// Overwrite the BAT slot for big block `index`.
    pub fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
        self.ensure_writable()?;
        self.store.set_next_block(index, next)
    }

    /// Lowest free big block, growing the BAT if needed. The block is not marked.
    pub fn free_block(&mut self) -> Result<u32> {
        self.ensure_writable()?;
        self.store.free_block()
    }

    /// Raw contents of big block `index`.
    pub fn read_block(&mut self, index: u32) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.store.read_block(index)
    }

    /// Handle of the root storage
    pub fn root_id(&self) -> EntryId {
        self.properties.root()
    }

    /// View of the root storage.
    pub fn root(&self) -> Result<DirectoryNode<'_>> {
        self.ensure_open()?;
        Ok(DirectoryNode::root(&self.properties))
    }

    /// View of the entry `id`.
    pub fn entry(&self, id: EntryId) -> Result<Entry<'_>> {
        self.ensure_open()?;
        Entry::new(&self.properties, id)
    }

    /// Child of `parent` named `name` (case-insensitive).
    pub fn get_entry(&self, parent: EntryId, name: &str) -> Result<EntryId> {
        self.ensure_open()?;
        let property = self.properties.property(parent)?;
        if !property.is_directory() {
            return Err(OleError::NotADirectory(property.name().to_string()));
        }
        self.properties
            .find_child(parent, name)
            .ok_or_else(|| OleError::NotFound(name.to_string()))
    }

    /// Resolve a path of names from the root; the empty path is the root.
    pub fn entry_by_path(&self, path: &[&str]) -> Result<EntryId> {
        self.ensure_open()?;
        let mut current = self.root_id();
        for (depth, name) in path.iter().enumerate() {
            current = self
                .properties
                .find_child(current, name)
                .ok_or_else(|| OleError::NotFound(path[..=depth].join("/")))?;
        }
        Ok(current)
    }

    /// Returns true if `path` names an existing entry of an open filesystem
    pub fn exists(&self, path: &[&str]) -> bool {
        self.entry_by_path(path).is_ok()
    }

    /// Paths of every document, depth-first in directory order.
    pub fn list_streams(&self) -> Result<Vec<Vec<String>>> {
        self.ensure_open()?;
        Ok(self
            .properties
            .walk()
            .into_iter()
            .filter(|&id| {
                self.properties
                    .get(id)
                    .is_some_and(|property| property.is_document())
            })
            .map(|id| self.names_to(id))
            .collect())
    }

    /// Names from the root down to `id`, excluding the root.
    pub fn path_of(&self, id: EntryId) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.properties.property(id)?;
        Ok(self.names_to(id))
    }

    fn names_to(&self, id: EntryId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.properties.get(id);
        while let Some(property) = current {
            if property.is_root() {
                break;
            }
            path.push(property.name().to_string());
            current = property.parent().and_then(|p| self.properties.get(p));
        }
        path.reverse();
        path
    }

    fn check_new_child(&self, parent: EntryId, name: &str) -> Result<()> {
        validate_name(name)?;
        let property = self.properties.property(parent)?;
        if !property.is_directory() {
            return Err(OleError::NotADirectory(property.name().to_string()));
        }
        if self.properties.find_child(parent, name).is_some() {
            return Err(OleError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Create an empty storage under `parent`.
    pub fn create_directory(&mut self, parent: EntryId, name: &str) -> Result<EntryId> {
        self.ensure_writable()?;
        self.check_new_child(parent, name)?;
        self.properties.insert(parent, Property::directory(name))
    }

    /// Create a document under `parent` holding `data`.
    pub fn create_document(&mut self, parent: EntryId, name: &str, data: &[u8]) -> Result<EntryId> {
        self.ensure_writable()?;
        self.check_new_child(parent, name)?;

        let start = self.write_contents(ENDOFCHAIN, is_small_size(data.len()), data)?;
        self.properties
            .insert(parent, Property::document(name, start, data.len() as u64))
    }

    /// Replace the document named `name` under `parent`, creating it if needed.
    pub fn create_or_update_document(
        &mut self,
        parent: EntryId,
        name: &str,
        data: &[u8],
    ) -> Result<EntryId> {
        match self.properties.find_child(parent, name) {
            Some(id) => {
                self.replace_contents(id, data)?;
                Ok(id)
            },
            None => self.create_document(parent, name, data),
        }
    }

    /// Create a document at `path`, creating missing storages on the way.
    pub fn create_stream(&mut self, path: &[&str], data: &[u8]) -> Result<EntryId> {
        let Some((name, storages)) = path.split_last() else {
            return Err(OleError::InvalidName(String::new()));
        };
        let mut parent = self.root_id();
        for storage in storages {
            parent = match self.properties.find_child(parent, storage) {
                Some(id) => {
                    let property = self.properties.property(id)?;
                    if !property.is_directory() {
                        return Err(OleError::NotADirectory(property.name().to_string()));
                    }
                    id
                },
                None => self.create_directory(parent, storage)?,
            };
        }
        self.create_or_update_document(parent, name, data)
    }

    /// Replace the contents of a document.
    ///
    /// Contents crossing the mini stream cutoff move to the other store.
    pub fn replace_contents(&mut self, id: EntryId, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let property = self.properties.property(id)?;
        if !property.is_document() {
            return Err(OleError::NotADocument(property.name().to_string()));
        }
        let (old_start, was_small) = (property.start_block(), property.is_small());
        let now_small = is_small_size(data.len());

        let start = if was_small == now_small {
            self.write_contents(old_start, now_small, data)?
        } else {
            log::trace!(
                "Moving {:?} to the {} store",
                property.name(),
                if now_small { "mini" } else { "big block" }
            );
            let start = self.write_contents(ENDOFCHAIN, now_small, data)?;
            self.free_contents(old_start, was_small)?;
            start
        };

        self.properties
            .property_mut(id)?
            .set_contents(start, data.len() as u64);
        Ok(())
    }

    /// Delete a document or an empty storage.
    ///
    /// Returns false for the root and for storages that still have children.
    pub fn delete(&mut self, id: EntryId) -> Result<bool> {
        self.ensure_writable()?;
        let property = self.properties.property(id)?;
        if property.is_root() || !property.children().is_empty() {
            return Ok(false);
        }
        if property.is_document() {
            let (start, small) = (property.start_block(), property.is_small());
            self.free_contents(start, small)?;
        }
        self.properties.remove(id);
        Ok(true)
    }

    /// Rename an entry.
    ///
    /// Returns false for the root, for invalid names, and when a sibling
    /// already uses the name.
    pub fn rename(&mut self, id: EntryId, new_name: &str) -> Result<bool> {
        self.ensure_writable()?;
        let property = self.properties.property(id)?;
        if property.is_root() || validate_name(new_name).is_err() {
            return Ok(false);
        }
        Ok(self.properties.rename(id, new_name))
    }

    /// Set the class id of a storage (or document).
    pub fn set_clsid(&mut self, id: EntryId, clsid: [u8; 16]) -> Result<()> {
        self.ensure_writable()?;
        self.properties.property_mut(id)?.set_clsid(clsid);
        Ok(())
    }

    /// Set or clear the creation and modification times of an entry.
    pub fn set_times(
        &mut self,
        id: EntryId,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.properties.property_mut(id)?.set_times(created, modified);
        Ok(())
    }

    /// Read the full contents of a document.
    pub fn read_document(&mut self, id: EntryId) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let property = self.properties.property(id)?;
        if !property.is_document() {
            return Err(OleError::NotADocument(property.name().to_string()));
        }
        let (start, small, size) = (property.start_block(), property.is_small(), property.size());
        let stream = ChainStream::new(start);
        if small {
            stream.read_to_vec(&mut self.mini.view(&mut self.store), Some(size))
        } else {
            stream.read_to_vec(&mut self.store, Some(size))
        }
    }

    /// Read the document at `path`.
    pub fn open_stream(&mut self, path: &[&str]) -> Result<Vec<u8>> {
        let id = self.entry_by_path(path)?;
        self.read_document(id)
    }

    /// Streaming reader over a document.
    pub fn document_reader(&mut self, id: EntryId) -> Result<DocumentReader<'_>> {
        DocumentReader::new(self, id)
    }

    /// Streaming writer that stores a document under `parent` when closed.
    pub fn document_writer(&mut self, parent: EntryId, name: &str) -> Result<DocumentWriter<'_>> {
        self.ensure_writable()?;
        validate_name(name)?;
        let property = self.properties.property(parent)?;
        if !property.is_directory() {
            return Err(OleError::NotADirectory(property.name().to_string()));
        }
        Ok(DocumentWriter::new(self, parent, name))
    }

    fn write_contents(&mut self, start: u32, small: bool, data: &[u8]) -> Result<u32> {
        let mut stream = ChainStream::new(start);
        if small {
            stream.update_contents(&mut self.mini.view(&mut self.store), data)?;
        } else {
            stream.update_contents(&mut self.store, data)?;
        }
        Ok(stream.start())
    }

    fn free_contents(&mut self, start: u32, small: bool) -> Result<()> {
        let mut stream = ChainStream::new(start);
        if small {
            stream.free(&mut self.mini.view(&mut self.store))
        } else {
            stream.free(&mut self.store)
        }
    }

    pub(crate) fn chain_addresses(&mut self, small: bool, start: u32) -> Result<Vec<u32>> {
        let stream = ChainStream::new(start);
        if small {
            stream.addresses(&self.mini.view(&mut self.store))
        } else {
            stream.addresses(&self.store)
        }
    }

    pub(crate) fn read_unit(&mut self, small: bool, block: u32) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if small {
            self.mini.view(&mut self.store).read_block(block)
        } else {
            self.store.read_block(block)
        }
    }

    fn sync(&mut self) -> Result<()> {
        self.mini.sync(&mut self.store)?;
        let (mini_start, mini_size) = (self.mini.stream_start(), self.mini.stream_size());
        self.properties
            .root_property_mut()
            .set_contents(mini_start, mini_size);

        let table = self.properties.serialize(self.store.size_class());
        self.property_stream
            .update_contents(&mut self.store, &table)?;
        let directory_blocks = self.property_stream.addresses(&self.store)?.len();

        let header = self.store.header_mut();
        header.set_property_start(self.property_stream.start());
        header.set_dir_sector_count(directory_blocks as u32);
        self.store.sync()
    }

    /// Write the complete filesystem to `out`.
    ///
    /// A filesystem opened read-only cannot have changed, so its file is copied
    /// as is.
    pub fn write_filesystem<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.ensure_open()?;
        if !self.read_only {
            self.sync()?;
        }
        self.store.copy_to(out)?;
        log::debug!(
            "Wrote filesystem: {} properties, {} BAT blocks",
            self.properties.len(),
            self.store.bat().pages().len()
        );
        Ok(())
    }

    /// Serialize the complete filesystem into a buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_filesystem(&mut out)?;
        Ok(out)
    }

    /// Persist all changes to the backing device.
    pub fn write_in_place(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.sync()
    }

    /// Release the backing device. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == FsState::Closed {
            return Ok(());
        }
        self.state = FsState::Closed;
        log::debug!("Closing filesystem");
        self.store.release()
    }

    /// Check that every block is accounted for exactly once.
    ///
    /// Walks every chain (property table, mini-FAT, mini stream and all
    /// documents) and cross-checks the allocation tables: each block is either
    /// free, holds the BAT or DIFAT, or belongs to exactly one chain.
    pub fn audit(&mut self) -> Result<AllocationReport> {
        self.ensure_open()?;
        let mut report = AllocationReport::default();
        let bs = self.big_block_size() as u64;

        let mut owned = FixedBitSet::with_capacity(self.store.bat().slot_count() as usize);
        let fixed_chains = [
            ("property table", self.property_stream.start()),
            ("mini-FAT", self.store.header().sbat_start()),
            ("mini stream", self.mini.stream_start()),
        ];
        for (what, start) in fixed_chains {
            let blocks = ChainStream::new(start).addresses(&self.store)?;
            claim_blocks(&mut owned, &blocks, what)?;
        }

        let documents: Vec<(String, u32, u64, bool)> = self
            .properties
            .iter()
            .filter(|(_, p)| p.is_document())
            .map(|(_, p)| (p.name().to_string(), p.start_block(), p.size(), p.is_small()))
            .collect();

        let mut owned_mini = FixedBitSet::with_capacity(self.mini.table().slot_count() as usize);
        for (name, start, size, small) in documents {
            let (blocks, unit) = if small {
                (self.chain_addresses(true, start)?, MINI_BLOCK_SIZE as u64)
            } else {
                (self.chain_addresses(false, start)?, bs)
            };
            if (blocks.len() as u64) * unit < size {
                return Err(OleError::CorruptedFile(format!(
                    "Document {:?} declares {} bytes but its chain holds {}",
                    name,
                    size,
                    blocks.len() as u64 * unit
                )));
            }
            if small {
                if let Some(&beyond) = blocks.iter().find(|&&b| b >= self.mini.capacity()) {
                    return Err(OleError::CorruptedFile(format!(
                        "Document {:?} uses mini block {} beyond the mini stream",
                        name, beyond
                    )));
                }
                claim_blocks(&mut owned_mini, &blocks, &name)?;
            } else {
                claim_blocks(&mut owned, &blocks, &name)?;
            }
        }

        let bat_locations = self.store.bat().locations();
        let xbat_locations = self.store.xbat_locations();
        for (index, value) in self.store.bat().iter() {
            let claimed = owned.contains(index as usize);
            match value {
                FREESECT if !claimed => report.free_blocks += 1,
                FATSECT if bat_locations.contains(&index) => report.bat_blocks += 1,
                DIFSECT if xbat_locations.contains(&index) => report.difat_blocks += 1,
                v if claimed && (v == ENDOFCHAIN || is_regular_sector(v)) => {
                    report.chained_blocks += 1
                },
                v => {
                    return Err(OleError::CorruptedFile(format!(
                        "Block {} is marked {:#010X} but does not match any chain or table",
                        index, v
                    )));
                },
            }
        }
        if report.bat_blocks != self.store.header().bat_count() as usize
            || report.difat_blocks != self.store.header().xbat_count() as usize
        {
            return Err(OleError::CorruptedFile(format!(
                "Header counts {} BAT and {} DIFAT blocks; the BAT marks {} and {}",
                self.store.header().bat_count(),
                self.store.header().xbat_count(),
                report.bat_blocks,
                report.difat_blocks
            )));
        }

        for (index, value) in self.mini.table().iter() {
            let claimed = owned_mini.contains(index as usize);
            match value {
                FREESECT if !claimed => report.free_mini_blocks += 1,
                v if claimed && (v == ENDOFCHAIN || is_regular_sector(v)) => {
                    report.chained_mini_blocks += 1
                },
                v => {
                    return Err(OleError::CorruptedFile(format!(
                        "Mini block {} is marked {:#010X} but belongs to no document",
                        index, v
                    )));
                },
            }
        }

        Ok(report)
    }
}

fn is_small_size(len: usize) -> bool {
    (len as u64) < MINI_STREAM_CUTOFF as u64
}

fn claim_blocks(owned: &mut FixedBitSet, blocks: &[u32], owner: &str) -> Result<()> {
    for &block in blocks {
        let bit = block as usize;
        if bit >= owned.len() {
            owned.grow(bit + 1);
        }
        if owned.put(bit) {
            return Err(OleError::CorruptedFile(format!(
                "Block {} of {} also belongs to another chain",
                block, owner
            )));
        }
    }
    Ok(())
}
