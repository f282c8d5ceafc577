//! Block chains as logical byte streams.
//!
//! A [`ChainStream`] is nothing more than a start block; the chain itself lives
//! in the allocation table of whichever [`BlockStore`] it is used with. The same
//! code therefore serves the property table, the mini-FAT, the mini stream and
//! every document, whether it sits in big blocks or mini blocks.
//!
//! Every walk claims the blocks it passes in a [`ChainLoopDetector`], so a
//! cyclic chain is reported as [`OleError::ChainLoop`] instead of looping
//! forever, both when reading and when rewriting.

use super::consts::*;
use super::error::{OleError, Result};
use super::fat::ChainLoopDetector;
use super::store::BlockStore;

fn check_link(block: u32) -> Result<()> {
    if is_regular_sector(block) {
        Ok(())
    } else {
        Err(OleError::CorruptedFile(format!(
            "Block chain reaches reserved marker {:#010X}",
            block
        )))
    }
}

/// Lazy walk over the blocks of one chain.
///
/// Yields `(block index, block contents)` pairs. After the first error the
/// iterator is exhausted.
pub struct ChainIter<'a, S: BlockStore + ?Sized> {
    store: &'a mut S,
    next: u32,
    detector: ChainLoopDetector,
    done: bool,
}

impl<'a, S: BlockStore + ?Sized> ChainIter<'a, S> {
    fn new(store: &'a mut S, start: u32) -> Self {
        let detector = store.loop_detector();
        Self {
            store,
            next: start,
            detector,
            done: start == ENDOFCHAIN,
        }
    }

    fn step(&mut self, block: u32) -> Result<(Vec<u8>, u32)> {
        check_link(block)?;
        let next = self.store.next_block(block)?;
        self.detector.claim(block)?;
        let data = self.store.read_block(block)?;
        Ok((data, next))
    }
}

impl<S: BlockStore + ?Sized> Iterator for ChainIter<'_, S> {
    type Item = Result<(u32, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let block = self.next;
        match self.step(block) {
            Ok((data, next)) => {
                self.next = next;
                self.done = next == ENDOFCHAIN;
                Some(Ok((block, data)))
            },
            Err(err) => {
                self.done = true;
                Some(Err(err))
            },
        }
    }
}

/// A chain of blocks read and written as one logical byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStream {
    start: u32,
}

impl ChainStream {
    /// Stream beginning at `start`; [`ENDOFCHAIN`] denotes an empty stream.
    pub fn new(start: u32) -> Self {
        Self { start }
    }

    /// Stream with no blocks
    pub fn empty() -> Self {
        Self::new(ENDOFCHAIN)
    }

    /// First block, or [`ENDOFCHAIN`] when empty
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Iterate the blocks of the chain in order.
    pub fn blocks<'a, S: BlockStore + ?Sized>(&self, store: &'a mut S) -> ChainIter<'a, S> {
        ChainIter::new(store, self.start)
    }

    /// Block indices of the chain in order, without reading block contents.
    pub fn addresses<S: BlockStore + ?Sized>(&self, store: &S) -> Result<Vec<u32>> {
        let mut detector = store.loop_detector();
        let mut addresses = Vec::new();
        let mut block = self.start;
        while block != ENDOFCHAIN {
            check_link(block)?;
            let next = store.next_block(block)?;
            detector.claim(block)?;
            addresses.push(block);
            block = next;
        }
        Ok(addresses)
    }

    /// Concatenate the chain's blocks.
    ///
    /// With `size` given, the result is truncated to it; a chain too short to
    /// hold `size` bytes is corrupt.
    pub fn read_to_vec<S: BlockStore + ?Sized>(
        &self,
        store: &mut S,
        size: Option<u64>,
    ) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        for block in self.blocks(store) {
            let (_, contents) = block?;
            data.extend_from_slice(&contents);
            if size.is_some_and(|size| data.len() as u64 >= size) {
                break;
            }
        }

        if let Some(size) = size {
            if (data.len() as u64) < size {
                return Err(OleError::CorruptedFile(format!(
                    "Block chain starting at {} holds {} bytes, expected {}",
                    self.start,
                    data.len(),
                    size
                )));
            }
            data.truncate(size as usize);
        }
        Ok(data)
    }

    /// Replace the stream contents with `data`.
    ///
    /// Blocks of the existing chain are reused in order. Extra blocks are taken
    /// from the store's free list and linked on; blocks left over are freed.
    /// The final block is zero-padded. Empty data leaves an empty stream.
    pub fn update_contents<S: BlockStore + ?Sized>(
        &mut self,
        store: &mut S,
        data: &[u8],
    ) -> Result<()> {
        let unit = store.block_size();
        let mut detector = store.loop_detector();
        let mut first = ENDOFCHAIN;
        let mut prev = ENDOFCHAIN;
        let mut existing = self.start;

        for chunk in data.chunks(unit) {
            let block = if existing == ENDOFCHAIN {
                let fresh = store.free_block()?;
                store.set_next_block(fresh, ENDOFCHAIN)?;
                if prev != ENDOFCHAIN {
                    store.set_next_block(prev, fresh)?;
                }
                fresh
            } else {
                let reused = existing;
                check_link(reused)?;
                existing = store.next_block(reused)?;
                reused
            };
            detector.claim(block)?;

            store.write_block(block, chunk)?;
            if first == ENDOFCHAIN {
                first = block;
            }
            prev = block;
        }

        // Release whatever the old chain had beyond the new length
        let mut surplus = existing;
        while surplus != ENDOFCHAIN {
            check_link(surplus)?;
            let next = store.next_block(surplus)?;
            detector.claim(surplus)?;
            store.set_next_block(surplus, FREESECT)?;
            surplus = next;
        }
        if prev != ENDOFCHAIN {
            store.set_next_block(prev, ENDOFCHAIN)?;
        }

        self.start = first;
        Ok(())
    }

    /// Mark every block of the chain free and leave the stream empty.
    pub fn free<S: BlockStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        for block in self.addresses(store)? {
            store.set_next_block(block, FREESECT)?;
        }
        self.start = ENDOFCHAIN;
        Ok(())
    }
}
