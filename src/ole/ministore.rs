//! Mini block store.
//!
//! Documents smaller than [`MINI_STREAM_CUTOFF`] bytes are stored in 64-byte
//! mini blocks. The mini blocks are packed into the *mini stream*, an ordinary
//! big block chain starting at the root entry's start block, and chained
//! through the mini-FAT (SBAT), which is itself stored in a big block chain
//! starting at the header's `sbat_start`.
//!
//! Both chains grow on demand: a new mini-FAT block is linked onto the SBAT
//! chain when every mini slot is taken, and a new big block is linked onto the
//! mini stream when a write reaches past its current extent.

use super::block_size::BlockSize;
use super::consts::*;
use super::error::{OleError, Result};
use super::fat::{AllocationTable, ChainLoopDetector};
use super::store::{BigBlockStore, BlockStore};
use super::stream::ChainStream;

/// Mini-FAT plus the layout of the mini stream.
#[derive(Debug, Clone)]
pub struct MiniStore {
    table: AllocationTable,
    /// Big blocks holding the mini stream, in stream order
    stream_blocks: Vec<u32>,
    block_size: BlockSize,
}

impl MiniStore {
    /// Store with no mini blocks.
    pub fn new(block_size: BlockSize) -> Self {
        Self {
            table: AllocationTable::new(block_size.table_entries_per_block()),
            stream_blocks: Vec::new(),
            block_size,
        }
    }

    /// Load the mini-FAT named by the header and locate the mini stream.
    ///
    /// `root_start` is the start block of the root property. The mini stream
    /// itself is only read when mini blocks are accessed.
    pub fn load(big: &mut BigBlockStore, root_start: u32) -> Result<Self> {
        let block_size = big.size_class();
        let mut store = Self::new(block_size);

        let sbat = ChainStream::new(big.header().sbat_start());
        for block in sbat.blocks(big) {
            let (location, data) = block?;
            store.table.push_page_bytes(location, &data);
        }
        let declared = big.header().sbat_count() as usize;
        if store.table.pages().len() != declared {
            log::warn!(
                "Header declares {} mini-FAT blocks but the chain holds {}",
                declared,
                store.table.pages().len()
            );
        }

        store.stream_blocks = ChainStream::new(root_start).addresses(big)?;
        log::debug!(
            "Loaded mini store: {} mini-FAT blocks, mini stream of {} big blocks",
            store.table.pages().len(),
            store.stream_blocks.len()
        );
        Ok(store)
    }

    /// Borrow the store together with the big block store that backs it.
    pub fn view<'a>(&'a mut self, big: &'a mut BigBlockStore) -> MiniBlockStore<'a> {
        MiniBlockStore { mini: self, big }
    }

    /// The mini-FAT
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Big blocks holding the mini stream
    pub fn stream_blocks(&self) -> &[u32] {
        &self.stream_blocks
    }

    /// First big block of the mini stream, or [`ENDOFCHAIN`]
    pub fn stream_start(&self) -> u32 {
        self.stream_blocks.first().copied().unwrap_or(ENDOFCHAIN)
    }

    /// Size in bytes recorded for the mini stream in the root entry.
    ///
    /// Covers every big block of the mini stream, so the size is zero exactly
    /// when the stream has no blocks.
    pub fn stream_size(&self) -> u64 {
        (self.stream_blocks.len() * self.block_size.bytes()) as u64
    }

    /// Number of mini blocks the mini stream can currently hold
    pub fn capacity(&self) -> u32 {
        (self.stream_blocks.len() * self.block_size.mini_blocks_per_block()) as u32
    }

    /// Write the mini-FAT blocks and record the SBAT chain in the header.
    pub fn sync(&self, big: &mut BigBlockStore) -> Result<()> {
        for page in self.table.pages() {
            big.write_block(page.location(), &page.to_bytes())?;
        }
        let start = self
            .table
            .pages()
            .first()
            .map(|page| page.location())
            .unwrap_or(ENDOFCHAIN);
        big.header_mut()
            .set_sbat(start, self.table.pages().len() as u32);
        Ok(())
    }
}

/// A [`MiniStore`] paired with its backing [`BigBlockStore`].
#[derive(Debug)]
pub struct MiniBlockStore<'a> {
    mini: &'a mut MiniStore,
    big: &'a mut BigBlockStore,
}

impl MiniBlockStore<'_> {
    /// Big block and byte offset holding mini block `index`.
    fn locate(&self, index: u32) -> Result<(u32, usize)> {
        let per_block = self.mini.block_size.mini_blocks_per_block();
        let capacity = self.mini.capacity();
        if index >= capacity {
            return Err(OleError::OutOfRange {
                index,
                limit: capacity,
            });
        }
        let big_block = self.mini.stream_blocks[index as usize / per_block];
        let offset = (index as usize % per_block) * MINI_BLOCK_SIZE;
        Ok((big_block, offset))
    }

    /// Extend the mini stream until it covers mini block `index`.
    fn create_block_if_needed(&mut self, index: u32) -> Result<()> {
        while index >= self.mini.capacity() {
            let block = self.big.free_block()?;
            self.big.set_next_block(block, ENDOFCHAIN)?;
            if let Some(&last) = self.mini.stream_blocks.last() {
                self.big.set_next_block(last, block)?;
            }
            self.big.write_block(block, &[])?;
            self.mini.stream_blocks.push(block);
            log::trace!(
                "Extended mini stream to {} big blocks (added block {})",
                self.mini.stream_blocks.len(),
                block
            );
        }
        Ok(())
    }

    /// Chain a new mini-FAT block onto the SBAT and return its first slot.
    fn grow_table(&mut self) -> Result<u32> {
        let location = self.big.free_block()?;
        self.big.set_next_block(location, ENDOFCHAIN)?;
        if let Some(last) = self.mini.table.pages().last() {
            self.big.set_next_block(last.location(), location)?;
        }
        let first = self.mini.table.push_empty_page(location);
        let pages = self.mini.table.pages();
        let page = pages[pages.len() - 1].to_bytes();
        let sbat_start = pages[0].location();
        let sbat_count = pages.len() as u32;
        self.big.write_block(location, &page)?;
        self.big.header_mut().set_sbat(sbat_start, sbat_count);
        log::trace!(
            "Added mini-FAT block {} at block {}",
            sbat_count,
            location
        );
        Ok(first)
    }
}

impl BlockStore for MiniBlockStore<'_> {
    fn block_size(&self) -> usize {
        MINI_BLOCK_SIZE
    }

    fn next_block(&self, index: u32) -> Result<u32> {
        self.mini.table.get(index)
    }

    fn set_next_block(&mut self, index: u32, next: u32) -> Result<()> {
        self.mini.table.set(index, next)
    }

    /// Lowest free mini block, growing the mini-FAT and the mini stream so
    /// that the returned block can be written.
    fn free_block(&mut self) -> Result<u32> {
        let free = match self.mini.table.first_free() {
            Some(free) => free,
            None => self.grow_table()?,
        };
        self.create_block_if_needed(free)?;
        Ok(free)
    }

    fn read_block(&mut self, index: u32) -> Result<Vec<u8>> {
        let (big_block, offset) = self.locate(index)?;
        let mut buf = vec![0u8; MINI_BLOCK_SIZE];
        self.big.read_range(big_block, offset, &mut buf)?;
        Ok(buf)
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<()> {
        let (big_block, offset) = self.locate(index)?;
        let mut unit = [0u8; MINI_BLOCK_SIZE];
        let len = data.len().min(MINI_BLOCK_SIZE);
        unit[..len].copy_from_slice(&data[..len]);
        self.big.write_range(big_block, offset, &unit)
    }

    fn loop_detector(&self) -> ChainLoopDetector {
        ChainLoopDetector::new(self.mini.table.slot_count() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_mini_allocation_grows_both_chains() {
        let mut big = BigBlockStore::create(BlockSize::Small).unwrap();
        let mut mini = MiniStore::new(BlockSize::Small);

        let mut stream = ChainStream::empty();
        stream
            .update_contents(&mut mini.view(&mut big), &[7u8; 100])
            .unwrap();

        // Mini-FAT block first, then the mini stream block
        assert_eq!(stream.start(), 0);
        assert_eq!(mini.table().locations(), vec![1]);
        assert_eq!(mini.stream_blocks(), &[2]);
        assert_eq!(big.header().sbat_start(), 1);
        assert_eq!(big.header().sbat_count(), 1);
        assert_eq!(mini.table().get(0).unwrap(), 1);
        assert_eq!(mini.table().get(1).unwrap(), ENDOFCHAIN);

        let data = stream
            .read_to_vec(&mut mini.view(&mut big), Some(100))
            .unwrap();
        assert_eq!(data, vec![7u8; 100]);
    }

    #[test]
    fn test_mini_stream_extends_across_big_blocks() {
        let mut big = BigBlockStore::create(BlockSize::Small).unwrap();
        let mut mini = MiniStore::new(BlockSize::Small);

        let mut stream = ChainStream::empty();
        stream
            .update_contents(&mut mini.view(&mut big), &[1u8; 640])
            .unwrap();

        // Ten mini blocks need two big blocks of the mini stream
        assert_eq!(mini.capacity(), 16);
        assert_eq!(mini.stream_blocks(), &[2, 3]);
        assert_eq!(big.next_block(2).unwrap(), 3);
        assert_eq!(big.next_block(3).unwrap(), ENDOFCHAIN);
        assert_eq!(mini.stream_size(), 1024);
    }

    #[test]
    fn test_read_beyond_mini_stream() {
        let mut big = BigBlockStore::create(BlockSize::Small).unwrap();
        let mut mini = MiniStore::new(BlockSize::Small);
        assert!(matches!(
            mini.view(&mut big).read_block(0),
            Err(OleError::OutOfRange { index: 0, limit: 0 })
        ));
    }

    #[test]
    fn test_write_beyond_mini_stream() {
        let mut big = BigBlockStore::create(BlockSize::Small).unwrap();
        let mut mini = MiniStore::new(BlockSize::Small);
        let mut view = mini.view(&mut big);
        assert!(matches!(
            view.write_block(0, &[1u8; 64]),
            Err(OleError::OutOfRange { index: 0, limit: 0 })
        ));

        // Allocation backs the block it hands out
        let block = view.free_block().unwrap();
        assert_eq!(block, 0);
        view.write_block(block, &[1u8; 64]).unwrap();
        assert!(matches!(
            view.write_block(8, &[1u8; 64]),
            Err(OleError::OutOfRange { index: 8, limit: 8 })
        ));
        assert_eq!(mini.capacity(), 8);
        assert_eq!(mini.stream_blocks(), &[2]);
    }

    #[test]
    fn test_sync_and_load() {
        let mut big = BigBlockStore::create(BlockSize::Small).unwrap();
        let mut mini = MiniStore::new(BlockSize::Small);
        let mut stream = ChainStream::empty();
        stream
            .update_contents(&mut mini.view(&mut big), b"mini contents")
            .unwrap();
        mini.sync(&mut big).unwrap();

        let loaded = MiniStore::load(&mut big, mini.stream_start()).unwrap();
        assert_eq!(loaded.stream_blocks(), mini.stream_blocks());
        assert_eq!(loaded.table().get(0).unwrap(), ENDOFCHAIN);
        assert_eq!(loaded.table().count(FREESECT), 127);
    }
}
