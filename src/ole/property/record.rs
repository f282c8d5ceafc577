//! On-disk property records (128 bytes each).

use crate::common::binary::{parse_utf16le_string, write_utf16le_string};
use crate::ole::block_size::BlockSize;
use crate::ole::consts::*;
use crate::ole::error::{OleError, Result};
use zerocopy::{FromBytes, IntoBytes, LE, U16, U32, U64};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout,
};

/// Raw OLE directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawProperty {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// Decoded property record, with sibling and child links as record indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub name: String,
    pub entry_type: u8,
    pub color: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    pub created: u64,
    pub modified: u64,
    pub start_block: u32,
    pub size: u64,
}

impl PropertyRecord {
    /// An unused record slot
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            entry_type: STGTY_EMPTY,
            color: COLOR_RED,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            clsid: [0; 16],
            state_bits: 0,
            created: 0,
            modified: 0,
            start_block: 0,
            size: 0,
        }
    }

    /// Returns true for unused slots
    pub fn is_empty(&self) -> bool {
        self.entry_type == STGTY_EMPTY
    }

    /// Decode one 128-byte record.
    pub fn decode(data: &[u8], block_size: BlockSize) -> Result<Self> {
        let raw = RawProperty::read_from_bytes(data)
            .map_err(|_| OleError::CorruptedFile("Failed to parse property record".to_string()))?;

        let name_len = raw.name_len.get() as usize;
        let name = parse_utf16le_string(&raw.name[..name_len.saturating_sub(2).min(64)]);

        // 512-byte block files only use the low 32 bits of the size
        let size = match block_size {
            BlockSize::Small => raw.stream_size.get() & 0xFFFF_FFFF,
            BlockSize::Large => raw.stream_size.get(),
        };

        Ok(Self {
            name,
            entry_type: raw.entry_type,
            color: raw.node_color,
            left: raw.sid_left.get(),
            right: raw.sid_right.get(),
            child: raw.sid_child.get(),
            clsid: raw.clsid,
            state_bits: raw.state_bits.get(),
            created: raw.creation_time.get(),
            modified: raw.modified_time.get(),
            start_block: raw.start_sector.get(),
            size,
        })
    }

    /// Decode a whole property table stream.
    ///
    /// Unused slots, and slots of a type this engine does not model, come back
    /// as `None`.
    pub fn decode_all(data: &[u8], block_size: BlockSize) -> Result<Vec<Option<Self>>> {
        data.chunks_exact(DIRENTRY_SIZE)
            .enumerate()
            .map(|(index, chunk)| {
                let record = Self::decode(chunk, block_size)?;
                Ok(match record.entry_type {
                    STGTY_STORAGE | STGTY_STREAM | STGTY_ROOT => Some(record),
                    STGTY_EMPTY => None,
                    other => {
                        log::warn!(
                            "Property {} has unsupported type {}; treating it as unused",
                            index,
                            other
                        );
                        None
                    },
                })
            })
            .collect()
    }

    /// Encode as a 128-byte record.
    pub fn encode(&self) -> Vec<u8> {
        let mut name = [0u8; 64];
        let units = write_utf16le_string(&self.name, &mut name[..MAX_NAME_UNITS * 2]);
        let name_len = if self.is_empty() { 0 } else { (units + 1) * 2 };

        let raw = RawProperty {
            name,
            name_len: U16::new(name_len as u16),
            entry_type: self.entry_type,
            node_color: self.color,
            sid_left: U32::new(self.left),
            sid_right: U32::new(self.right),
            sid_child: U32::new(self.child),
            clsid: self.clsid,
            state_bits: U32::new(self.state_bits),
            creation_time: U64::new(self.created),
            modified_time: U64::new(self.modified),
            start_sector: U32::new(self.start_block),
            stream_size: U64::new(self.size),
        };
        raw.as_bytes().to_vec()
    }
}
