//! Allocation tables for OLE2 files
//!
//! The same paged table of `u32` slots backs both the big block allocation
//! table (BAT) and the mini block allocation table (SBAT / mini-FAT). Each
//! slot holds one of:
//! - the index of the next block in a chain
//! - [`ENDOFCHAIN`] for the last block of a chain
//! - [`FREESECT`] for an unallocated block
//! - [`FATSECT`] / [`DIFSECT`] for blocks holding the BAT and DIFAT themselves
//!
//! # Implementation Notes
//!
//! Based on Apache POI's BATBlock. Slots are grouped in pages of one big block
//! each; every page remembers the big block it is persisted in.

use super::consts::*;
use super::error::{OleError, Result};
use crate::common::binary::{read_u32_array_le, write_u32_array_le};
use fixedbitset::FixedBitSet;

/// One big block worth of allocation table slots
#[derive(Debug, Clone)]
pub struct TablePage {
    /// Big block this page is stored in
    location: u32,
    /// Slot values
    values: Vec<u32>,
    /// Number of slots currently holding [`FREESECT`]
    free: usize,
}

impl TablePage {
    fn empty(location: u32, entries: usize) -> Self {
        Self {
            location,
            values: vec![FREESECT; entries],
            free: entries,
        }
    }

    fn from_bytes(location: u32, data: &[u8], entries: usize) -> Self {
        let mut values = read_u32_array_le(data);
        values.resize(entries, FREESECT);
        let free = values.iter().filter(|&&v| v == FREESECT).count();
        Self {
            location,
            values,
            free,
        }
    }

    /// Big block holding this page
    pub fn location(&self) -> u32 {
        self.location
    }

    /// Slot values of this page
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Serialize the page as little-endian slots.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0xFFu8; self.values.len() * 4];
        write_u32_array_le(&self.values, &mut data);
        data
    }
}

/// Paged chain table shared by the BAT and the mini-FAT
#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries_per_page: usize,
    pages: Vec<TablePage>,
}

impl AllocationTable {
    /// Create an empty table whose pages hold `entries_per_page` slots.
    pub fn new(entries_per_page: usize) -> Self {
        Self {
            entries_per_page,
            pages: Vec::new(),
        }
    }

    /// Append a page decoded from its persisted bytes.
    pub fn push_page_bytes(&mut self, location: u32, data: &[u8]) {
        self.pages
            .push(TablePage::from_bytes(location, data, self.entries_per_page));
    }

    /// Append an all-free page stored at `location`.
    ///
    /// Returns the index of the first slot the new page covers.
    pub fn push_empty_page(&mut self, location: u32) -> u32 {
        let first = self.slot_count();
        self.pages
            .push(TablePage::empty(location, self.entries_per_page));
        first
    }

    /// Look up the slot for `index`.
    pub fn get(&self, index: u32) -> Result<u32> {
        let (page, slot) = self.locate(index)?;
        Ok(self.pages[page].values[slot])
    }

    /// Overwrite the slot for `index`. The page covering it must already exist.
    pub fn set(&mut self, index: u32, value: u32) -> Result<()> {
        let (page, slot) = self.locate(index)?;
        let page = &mut self.pages[page];
        let old = page.values[slot];
        if old == FREESECT && value != FREESECT {
            page.free -= 1;
        } else if old != FREESECT && value == FREESECT {
            page.free += 1;
        }
        page.values[slot] = value;
        Ok(())
    }

    /// Lowest free slot, skipping pages known to be full.
    pub fn first_free(&self) -> Option<u32> {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.free > 0)
            .find_map(|(page_idx, page)| {
                page.values
                    .iter()
                    .position(|&v| v == FREESECT)
                    .map(|slot| (page_idx * self.entries_per_page + slot) as u32)
            })
    }

    /// Total number of slots across all pages
    pub fn slot_count(&self) -> u32 {
        (self.pages.len() * self.entries_per_page) as u32
    }

    /// One past the highest non-free slot
    pub fn used_slots(&self) -> u32 {
        self.iter()
            .filter(|&(_, v)| v != FREESECT)
            .map(|(i, _)| i + 1)
            .last()
            .unwrap_or(0)
    }

    /// Number of slots holding exactly `value`
    pub fn count(&self, value: u32) -> usize {
        self.iter().filter(|&(_, v)| v == value).count()
    }

    /// All `(index, value)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pages
            .iter()
            .flat_map(|page| page.values.iter().copied())
            .enumerate()
            .map(|(i, v)| (i as u32, v))
    }

    /// Pages in table order
    pub fn pages(&self) -> &[TablePage] {
        &self.pages
    }

    /// Big blocks holding the pages, in table order
    pub fn locations(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.location).collect()
    }

    /// Slots per page
    pub fn entries_per_page(&self) -> usize {
        self.entries_per_page
    }

    fn locate(&self, index: u32) -> Result<(usize, usize)> {
        let page = index as usize / self.entries_per_page;
        if page >= self.pages.len() {
            return Err(OleError::OutOfRange {
                index,
                limit: self.slot_count(),
            });
        }
        Ok((page, index as usize % self.entries_per_page))
    }
}

/// Tracks the blocks visited by one chain walk.
///
/// A chain that reaches a block a second time is cyclic; walking it further
/// would never terminate.
#[derive(Debug, Clone)]
pub struct ChainLoopDetector {
    seen: FixedBitSet,
}

impl ChainLoopDetector {
    /// Create a detector pre-sized for `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: FixedBitSet::with_capacity(capacity),
        }
    }

    /// Mark `block` as visited, failing if it was visited before.
    pub fn claim(&mut self, block: u32) -> Result<()> {
        let bit = block as usize;
        if bit >= self.seen.len() {
            self.seen.grow(bit + 1);
        }
        if self.seen.put(bit) {
            return Err(OleError::ChainLoop { block });
        }
        Ok(())
    }

    /// Returns true if `block` has been claimed
    pub fn is_claimed(&self, block: u32) -> bool {
        self.seen.contains(block as usize)
    }
}
