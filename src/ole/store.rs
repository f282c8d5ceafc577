//! Block stores: chain-addressable units over a backing device.
//!
//! [`BlockStore`] is the seam the stream engine works against. Two stores
//! implement it: [`BigBlockStore`] addresses the big blocks of the file through
//! the BAT, and [`super::ministore::MiniBlockStore`] addresses 64-byte mini
//! blocks inside the mini stream through the mini-FAT.
//!
//! # BAT growth
//!
//! Free blocks are found by scanning the BAT in ascending order. When no slot
//! is free the table grows by one block: the new BAT block is placed in the
//! first slot it covers (marked [`FATSECT`]), and the slot after it is handed
//! out. Once more than 109 BAT blocks exist their locations spill into DIFAT
//! blocks, which are allocated the same way (marked [`DIFSECT`]).

use super::block_size::BlockSize;
use super::consts::*;
use super::device::{BlockDevice, MemoryDevice};
use super::error::{OleError, Result};
use super::fat::{AllocationTable, ChainLoopDetector};
use super::header::HeaderBlock;
use crate::common::binary::{read_u32_array_le, write_u32_array_le};
use std::io::Write;

/// Chain-addressable storage units backed by an allocation table.
pub trait BlockStore {
    /// Size of one unit in bytes
    fn block_size(&self) -> usize;

    /// Allocation table slot for `index`: the next unit, or a sentinel.
    fn next_block(&self, index: u32) -> Result<u32>;

    /// Overwrite the allocation table slot for `index`.
    ///
    /// The table must already cover `index`.
    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()>;

    /// Find a free unit, growing the table if every slot is taken.
    ///
    /// The returned unit is not marked; callers link it into a chain before
    /// asking for another.
    fn free_block(&mut self) -> Result<u32>;

    /// Read the unit at `index`.
    fn read_block(&mut self, index: u32) -> Result<Vec<u8>>;

    /// Write the unit at `index`, creating backing space if needed.
    ///
    /// `data` shorter than a unit is zero-padded.
    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<()>;

    /// Fresh loop detector sized for this store.
    fn loop_detector(&self) -> ChainLoopDetector;
}

/// Big block store: the device, its header, and the BAT / DIFAT.
#[derive(Debug)]
pub struct BigBlockStore {
    device: Box<dyn BlockDevice>,
    header: HeaderBlock,
    bat: AllocationTable,
    /// Blocks holding the DIFAT, in chain order
    xbat_locations: Vec<u32>,
}

impl BigBlockStore {
    /// Create the store of an empty filesystem.
    ///
    /// The device starts with just the header block and a single BAT block at
    /// block 0.
    pub fn create(block_size: BlockSize) -> Result<Self> {
        let device = Box::new(MemoryDevice::with_len(block_size.bytes()));
        let mut bat = AllocationTable::new(block_size.table_entries_per_block());
        bat.push_empty_page(0);
        bat.set(0, FATSECT)?;

        let mut store = Self {
            device,
            header: HeaderBlock::new(block_size),
            bat,
            xbat_locations: Vec::new(),
        };
        store.refresh_header();
        Ok(store)
    }

    /// Read the header, BAT and DIFAT of an existing file.
    pub fn open(mut device: Box<dyn BlockDevice>) -> Result<Self> {
        let head_len = (device.len() as usize).min(HEADER_SIZE);
        let mut head = vec![0u8; head_len];
        device.read_at(0, &mut head)?;
        let header = HeaderBlock::parse(&head)?;
        let block_size = header.block_size();

        let mut store = Self {
            device,
            bat: AllocationTable::new(block_size.table_entries_per_block()),
            header,
            xbat_locations: Vec::new(),
        };
        store.load_tables()?;

        log::debug!(
            "Opened compound file: {}-byte blocks, {} BAT blocks, {} DIFAT blocks, {} blocks on disk",
            block_size.bytes(),
            store.bat.pages().len(),
            store.xbat_locations.len(),
            store.block_count()
        );
        Ok(store)
    }

    fn load_tables(&mut self) -> Result<()> {
        let declared = self.header.bat_count() as usize;
        let per_difat = self.header.block_size().difat_entries_per_block();
        let mut detector = self.loop_detector();

        let mut locations: Vec<u32> = self.header.bat_array().to_vec();

        let mut remaining = declared.saturating_sub(locations.len());
        let mut next = self.header.xbat_start();
        for i in 0..self.header.xbat_count() {
            if !is_regular_sector(next) {
                return Err(OleError::CorruptedFile(format!(
                    "DIFAT chain ends after {} of {} blocks",
                    i,
                    self.header.xbat_count()
                )));
            }
            let values = read_u32_array_le(&self.read_table_block(next)?);
            detector.claim(next)?;
            self.xbat_locations.push(next);

            let take = remaining.min(per_difat);
            locations.extend(
                values[..take]
                    .iter()
                    .take_while(|&&v| v != FREESECT && v != ENDOFCHAIN),
            );
            remaining -= take;
            next = values[per_difat];
        }

        if locations.len() < declared {
            return Err(OleError::CorruptedFile(format!(
                "Header declares {} BAT blocks but only {} are reachable",
                declared,
                locations.len()
            )));
        }

        for location in locations {
            if !is_regular_sector(location) {
                return Err(OleError::CorruptedFile(format!(
                    "BAT block location {:#010X} is not a block index",
                    location
                )));
            }
            let data = self.read_table_block(location)?;
            detector.claim(location)?;
            self.bat.push_page_bytes(location, &data);
        }
        Ok(())
    }

    fn read_table_block(&mut self, location: u32) -> Result<Vec<u8>> {
        self.read_block(location).map_err(|err| match err {
            OleError::OutOfRange { index, limit } => OleError::CorruptedFile(format!(
                "Allocation table block {} lies beyond the end of the file ({} blocks)",
                index, limit
            )),
            other => other,
        })
    }

    /// Big block size class
    pub fn size_class(&self) -> BlockSize {
        self.header.block_size()
    }

    /// Header as it will be written on the next sync
    pub fn header(&self) -> &HeaderBlock {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut HeaderBlock {
        &mut self.header
    }

    /// Big block allocation table
    pub fn bat(&self) -> &AllocationTable {
        &self.bat
    }

    /// Blocks holding the DIFAT
    pub fn xbat_locations(&self) -> &[u32] {
        &self.xbat_locations
    }

    /// Number of big blocks present on the device (a trailing partial block counts)
    pub fn block_count(&self) -> u32 {
        let bs = self.block_size() as u64;
        let len = self.device.len();
        if len <= bs {
            0
        } else {
            (len - bs).div_ceil(bs) as u32
        }
    }

    /// Returns true if the backing device rejects writes
    pub fn is_read_only(&self) -> bool {
        self.device.is_read_only()
    }

    #[inline]
    fn block_offset(&self, index: u32) -> u64 {
        (index as u64 + 1) * self.block_size() as u64
    }

    /// Read `buf.len()` bytes starting `offset` bytes into block `index`.
    ///
    /// Bytes missing from a truncated trailing block read as zero.
    pub fn read_range(&mut self, index: u32, offset: usize, buf: &mut [u8]) -> Result<()> {
        let count = self.block_count();
        if index >= count {
            return Err(OleError::OutOfRange {
                index,
                limit: count,
            });
        }
        let start = self.block_offset(index) + offset as u64;
        let available = self.device.len().saturating_sub(start).min(buf.len() as u64) as usize;
        buf[available..].fill(0);
        self.device.read_at(start, &mut buf[..available])
    }

    /// Write `data` starting `offset` bytes into block `index`, growing the device.
    pub fn write_range(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<()> {
        let start = self.block_offset(index) + offset as u64;
        self.device.write_at(start, data)
    }

    /// Mirror the BAT and DIFAT layout into the header.
    fn refresh_header(&mut self) {
        let locations = self.bat.locations();
        self.header.set_bat_locations(&locations);
        let xbat_start = self
            .xbat_locations
            .first()
            .copied()
            .unwrap_or(ENDOFCHAIN);
        self.header
            .set_xbat(xbat_start, self.xbat_locations.len() as u32);
    }

    /// Write the header, every BAT block and every DIFAT block to the device.
    pub fn sync(&mut self) -> Result<()> {
        self.refresh_header();

        let size = self.size_class();
        let per_difat = size.difat_entries_per_block();
        let locations = self.bat.locations();
        let overflow = &locations[locations.len().min(HEADER_BAT_SLOTS)..];
        if overflow.len() > self.xbat_locations.len() * per_difat {
            return Err(OleError::CorruptedFile(format!(
                "{} BAT blocks do not fit in {} DIFAT blocks",
                locations.len(),
                self.xbat_locations.len()
            )));
        }

        let xbat_locations = self.xbat_locations.clone();
        for (i, &location) in xbat_locations.iter().enumerate() {
            let mut values = vec![FREESECT; size.table_entries_per_block()];
            let chunk = overflow.chunks(per_difat).nth(i).unwrap_or(&[]);
            values[..chunk.len()].copy_from_slice(chunk);
            values[per_difat] = xbat_locations.get(i + 1).copied().unwrap_or(ENDOFCHAIN);

            let mut data = vec![0u8; size.bytes()];
            write_u32_array_le(&values, &mut data);
            self.write_block(location, &data)?;
        }

        let header = self.header.to_bytes();
        self.device.write_at(0, &header)?;

        for page in self.bat.pages().to_vec() {
            self.write_block(page.location(), &page.to_bytes())?;
        }

        self.device.flush()
    }

    /// Copy the raw device contents to a sink.
    pub fn copy_to(&mut self, sink: &mut dyn Write) -> Result<()> {
        self.device.copy_to(sink)
    }

    /// Flush and drop the backing device, releasing any file handle.
    pub fn release(&mut self) -> Result<()> {
        let result = self.device.flush();
        self.device = Box::new(MemoryDevice::default());
        result
    }
}

impl BlockStore for BigBlockStore {
    fn block_size(&self) -> usize {
        self.header.block_size().bytes()
    }

    fn next_block(&self, index: u32) -> Result<u32> {
        self.bat.get(index)
    }

    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
        self.bat.set(index, next)
    }

    fn free_block(&mut self) -> Result<u32> {
        if let Some(free) = self.bat.first_free() {
            return Ok(free);
        }

        // The new BAT block lives in the first slot it covers
        let offset = self.bat.slot_count();
        self.bat.push_empty_page(offset);
        self.bat.set(offset, FATSECT)?;
        log::trace!("Added BAT block {} at block {}", self.bat.pages().len(), offset);

        let mut next_free = offset + 1;
        let per_difat = self.size_class().difat_entries_per_block();
        let overflow = self.bat.pages().len().saturating_sub(HEADER_BAT_SLOTS);
        if overflow > self.xbat_locations.len() * per_difat {
            self.bat.set(next_free, DIFSECT)?;
            self.xbat_locations.push(next_free);
            log::trace!(
                "Added DIFAT block {} at block {}",
                self.xbat_locations.len(),
                next_free
            );
            next_free += 1;
        }

        self.refresh_header();
        Ok(next_free)
    }

    fn read_block(&mut self, index: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size()];
        self.read_range(index, 0, &mut buf)?;
        Ok(buf)
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<()> {
        let bs = self.block_size();
        if data.len() == bs {
            return self.write_range(index, 0, data);
        }
        let mut padded = data[..data.len().min(bs)].to_vec();
        padded.resize(bs, 0);
        self.write_range(index, 0, &padded)
    }

    fn loop_detector(&self) -> ChainLoopDetector {
        ChainLoopDetector::new(self.bat.slot_count().max(self.block_count()) as usize)
    }
}
