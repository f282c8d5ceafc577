//! Compound file header block.
//!
//! The header is always 512 bytes on disk. For 4096-byte block files the first
//! big block still begins at offset 4096, so the header is zero-padded to a
//! whole block when written.

use super::block_size::BlockSize;
use super::consts::*;
use super::error::{OleError, Result};
use crate::common::detection::FileMagic;
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout,
};

/// Raw OLE header structure (512 bytes)
///
/// This represents the on-disk format of the header.
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawHeader {
    /// Magic bytes
    signature: [u8; 8],
    /// Header CLSID, normally all zeros
    clsid: [u8; 16],
    /// Minor version (0x003E)
    minor_version: U16<LE>,
    /// Major version (3 or 4)
    major_version: U16<LE>,
    /// Byte order mark (0xFFFE)
    byte_order: U16<LE>,
    /// log2 of the big block size
    sector_shift: U16<LE>,
    /// log2 of the mini block size
    mini_sector_shift: U16<LE>,
    /// Reserved, must be zero
    reserved: [u8; 6],
    /// Number of directory sectors (only meaningful for 4096-byte blocks)
    dir_sector_count: U32<LE>,
    /// Number of BAT sectors
    bat_count: U32<LE>,
    /// First sector of the property table
    property_start: U32<LE>,
    /// Transaction signature, unused
    transaction_signature: U32<LE>,
    /// Mini stream cutoff size
    mini_stream_cutoff: U32<LE>,
    /// First sector of the mini-FAT (SBAT)
    sbat_start: U32<LE>,
    /// Number of mini-FAT sectors
    sbat_count: U32<LE>,
    /// First DIFAT (XBAT) sector
    xbat_start: U32<LE>,
    /// Number of DIFAT sectors
    xbat_count: U32<LE>,
    /// First 109 BAT sector locations
    bat_array: [U32<LE>; HEADER_BAT_SLOTS],
}

/// Parsed header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    block_size: BlockSize,
    clsid: [u8; 16],
    bat_count: u32,
    /// Inline BAT locations (at most 109)
    bat_array: Vec<u32>,
    property_start: u32,
    sbat_start: u32,
    sbat_count: u32,
    xbat_start: u32,
    xbat_count: u32,
    dir_sector_count: u32,
}

impl HeaderBlock {
    /// Create the header of an empty filesystem.
    pub fn new(block_size: BlockSize) -> Self {
        Self {
            block_size,
            clsid: [0; 16],
            bat_count: 0,
            bat_array: Vec::new(),
            property_start: ENDOFCHAIN,
            sbat_start: ENDOFCHAIN,
            sbat_count: 0,
            xbat_start: ENDOFCHAIN,
            xbat_count: 0,
            dir_sector_count: 0,
        }
    }

    /// Parse the header from the leading bytes of a file.
    ///
    /// Classifies non-compound inputs so the caller learns what it was given.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(OleError::EmptyFile);
        }
        if !data.starts_with(MAGIC) {
            return Err(OleError::NotOleFile(FileMagic::from_bytes(data)));
        }
        if data.len() < HEADER_SIZE {
            return Err(OleError::CorruptedFile(format!(
                "Header truncated: {} of {} bytes",
                data.len(),
                HEADER_SIZE
            )));
        }

        let raw = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| OleError::InvalidFormat("Failed to parse header".to_string()))?;

        if raw.byte_order.get() != BYTE_ORDER_LE {
            return Err(OleError::InvalidFormat("Invalid byte order".to_string()));
        }

        let block_size = BlockSize::from_shift(raw.sector_shift.get())?;
        let major_version = raw.major_version.get();
        if major_version != block_size.major_version() {
            return Err(OleError::InvalidFormat(format!(
                "Sector size mismatch: major version {} with {}-byte blocks",
                major_version,
                block_size.bytes()
            )));
        }

        if raw.mini_sector_shift.get() != MINI_BLOCK_SHIFT {
            return Err(OleError::InvalidFormat(format!(
                "Unsupported mini block size (2^{})",
                raw.mini_sector_shift.get()
            )));
        }

        let cutoff = raw.mini_stream_cutoff.get();
        if cutoff != MINI_STREAM_CUTOFF {
            log::warn!(
                "Header declares a mini stream cutoff of {} bytes; using {}",
                cutoff,
                MINI_STREAM_CUTOFF
            );
        }

        let bat_count = raw.bat_count.get();
        let inline = (bat_count as usize).min(HEADER_BAT_SLOTS);
        let bat_array = raw.bat_array[..inline].iter().map(|v| v.get()).collect();

        Ok(Self {
            block_size,
            clsid: raw.clsid,
            bat_count,
            bat_array,
            property_start: raw.property_start.get(),
            sbat_start: raw.sbat_start.get(),
            sbat_count: raw.sbat_count.get(),
            xbat_start: raw.xbat_start.get(),
            xbat_count: raw.xbat_count.get(),
            dir_sector_count: raw.dir_sector_count.get(),
        })
    }

    /// Generate the header block, padded to one big block.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bat_array = [U32::<LE>::new(FREESECT); HEADER_BAT_SLOTS];
        for (slot, &location) in bat_array.iter_mut().zip(&self.bat_array) {
            *slot = U32::new(location);
        }

        let dir_sector_count = match self.block_size {
            // Must be zero for version 3 files
            BlockSize::Small => 0,
            BlockSize::Large => self.dir_sector_count,
        };

        let raw = RawHeader {
            signature: *MAGIC,
            clsid: self.clsid,
            minor_version: U16::new(MINOR_VERSION),
            major_version: U16::new(self.block_size.major_version()),
            byte_order: U16::new(BYTE_ORDER_LE),
            sector_shift: U16::new(self.block_size.shift()),
            mini_sector_shift: U16::new(MINI_BLOCK_SHIFT),
            reserved: [0; 6],
            dir_sector_count: U32::new(dir_sector_count),
            bat_count: U32::new(self.bat_count),
            property_start: U32::new(self.property_start),
            transaction_signature: U32::new(0),
            mini_stream_cutoff: U32::new(MINI_STREAM_CUTOFF),
            sbat_start: U32::new(self.sbat_start),
            sbat_count: U32::new(self.sbat_count),
            xbat_start: U32::new(self.xbat_start),
            xbat_count: U32::new(self.xbat_count),
            bat_array,
        };

        let mut block = vec![0u8; self.block_size.bytes()];
        block[..HEADER_SIZE].copy_from_slice(raw.as_bytes());
        block
    }

    /// Big block size class
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Header CLSID
    pub fn clsid(&self) -> [u8; 16] {
        self.clsid
    }

    /// Number of BAT sectors
    pub fn bat_count(&self) -> u32 {
        self.bat_count
    }

    /// Inline BAT sector locations (at most 109)
    pub fn bat_array(&self) -> &[u32] {
        &self.bat_array
    }

    /// Record all BAT locations; only the first 109 are kept inline.
    pub fn set_bat_locations(&mut self, locations: &[u32]) {
        self.bat_count = locations.len() as u32;
        self.bat_array = locations.iter().take(HEADER_BAT_SLOTS).copied().collect();
    }

    /// First block of the property table
    pub fn property_start(&self) -> u32 {
        self.property_start
    }

    pub fn set_property_start(&mut self, start: u32) {
        self.property_start = start;
    }

    /// First block of the mini-FAT
    pub fn sbat_start(&self) -> u32 {
        self.sbat_start
    }

    /// Number of mini-FAT blocks
    pub fn sbat_count(&self) -> u32 {
        self.sbat_count
    }

    pub fn set_sbat(&mut self, start: u32, count: u32) {
        self.sbat_start = start;
        self.sbat_count = count;
    }

    /// First DIFAT block
    pub fn xbat_start(&self) -> u32 {
        self.xbat_start
    }

    /// Number of DIFAT blocks
    pub fn xbat_count(&self) -> u32 {
        self.xbat_count
    }

    pub fn set_xbat(&mut self, start: u32, count: u32) {
        self.xbat_start = start;
        self.xbat_count = count;
    }

    /// Directory sector count (csectDir)
    pub fn dir_sector_count(&self) -> u32 {
        self.dir_sector_count
    }

    pub fn set_dir_sector_count(&mut self, count: u32) {
        self.dir_sector_count = count;
    }
}
