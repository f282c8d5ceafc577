//! Big block size classes.

use super::consts::MINI_BLOCK_SIZE;
use super::error::{OleError, Result};

/// Size class of the big blocks in a compound file.
///
/// Version 3 files use 512-byte blocks, version 4 files use 4096-byte blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockSize {
    /// 512-byte blocks (major version 3)
    #[default]
    Small,
    /// 4096-byte blocks (major version 4)
    Large,
}

impl BlockSize {
    /// Resolve a block size from the header's sector shift.
    pub fn from_shift(shift: u16) -> Result<Self> {
        match shift {
            9 => Ok(BlockSize::Small),
            12 => Ok(BlockSize::Large),
            other => Err(OleError::InvalidFormat(format!(
                "Unsupported block size (2^{})",
                other
            ))),
        }
    }

    /// Block size in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            BlockSize::Small => 512,
            BlockSize::Large => 4096,
        }
    }

    /// log2 of the block size, as stored in the header.
    #[inline]
    pub const fn shift(self) -> u16 {
        match self {
            BlockSize::Small => 9,
            BlockSize::Large => 12,
        }
    }

    /// Major version written alongside this block size.
    #[inline]
    pub const fn major_version(self) -> u16 {
        match self {
            BlockSize::Small => 3,
            BlockSize::Large => 4,
        }
    }

    /// Number of u32 slots held by one allocation table block.
    #[inline]
    pub const fn table_entries_per_block(self) -> usize {
        self.bytes() / 4
    }

    /// Number of BAT locations held by one DIFAT block (the last slot chains to the next block).
    #[inline]
    pub const fn difat_entries_per_block(self) -> usize {
        self.table_entries_per_block() - 1
    }

    /// Number of property records held by one big block.
    #[inline]
    pub const fn properties_per_block(self) -> usize {
        self.bytes() / super::consts::DIRENTRY_SIZE
    }

    /// Number of mini blocks covered by one big block of the mini stream.
    #[inline]
    pub const fn mini_blocks_per_block(self) -> usize {
        self.bytes() / MINI_BLOCK_SIZE
    }
}
