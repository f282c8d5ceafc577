//! Property (directory entry) model.
//!
//! Every entry of the filesystem, the root storage included, is a
//! [`Property`]. Storages know their children; every entry knows its parent.
//! Properties live in the arena of a [`PropertyTable`] and are addressed by
//! [`EntryId`].

mod record;
mod table;

pub use record::PropertyRecord;
pub use table::PropertyTable;

use super::consts::*;
use super::error::{OleError, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// 100-nanosecond intervals between 1601-01-01 and 1970-01-01
const WINDOWS_EPOCH_OFFSET: i64 = 116_444_736_000_000_000;

/// Handle of an entry in a [`PropertyTable`].
///
/// Handles stay valid until the entry is deleted. Entries loaded from a file
/// keep the index of their on-disk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    /// Position in the property arena
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of entry a property is, with the children of storages.
///
/// Children are kept in directory order (see [`compare_names`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Root { children: Vec<EntryId> },
    Directory { children: Vec<EntryId> },
    Document,
}

/// One directory entry.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    parent: Option<EntryId>,
    start_block: u32,
    size: u64,
    clsid: [u8; 16],
    state_bits: u32,
    created: u64,
    modified: u64,
}

impl Property {
    fn with_kind(name: String, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            parent: None,
            start_block: ENDOFCHAIN,
            size: 0,
            clsid: [0; 16],
            state_bits: 0,
            created: 0,
            modified: 0,
        }
    }

    /// The root storage property
    pub fn root() -> Self {
        Self::with_kind(
            ROOT_NAME.to_string(),
            PropertyKind::Root {
                children: Vec::new(),
            },
        )
    }

    /// An empty storage
    pub fn directory(name: impl Into<String>) -> Self {
        Self::with_kind(
            name.into(),
            PropertyKind::Directory {
                children: Vec::new(),
            },
        )
    }

    /// A document whose contents start at `start_block`
    pub fn document(name: impl Into<String>, start_block: u32, size: u64) -> Self {
        let mut property = Self::with_kind(name.into(), PropertyKind::Document);
        property.start_block = start_block;
        property.size = size;
        property
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, PropertyKind::Root { .. })
    }

    /// Returns true for the root and every other storage
    pub fn is_directory(&self) -> bool {
        !self.is_document()
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, PropertyKind::Document)
    }

    /// Children in directory order; empty for documents
    pub fn children(&self) -> &[EntryId] {
        match &self.kind {
            PropertyKind::Root { children } | PropertyKind::Directory { children } => children,
            PropertyKind::Document => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<EntryId>> {
        match &mut self.kind {
            PropertyKind::Root { children } | PropertyKind::Directory { children } => {
                Some(children)
            },
            PropertyKind::Document => None,
        }
    }

    /// First block of the contents; [`ENDOFCHAIN`] when empty.
    ///
    /// For the root this is the first block of the mini stream.
    pub fn start_block(&self) -> u32 {
        self.start_block
    }

    /// Contents size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns true for documents stored in the mini stream
    pub fn is_small(&self) -> bool {
        self.is_document() && self.size < MINI_STREAM_CUTOFF as u64
    }

    pub(crate) fn set_contents(&mut self, start_block: u32, size: u64) {
        self.start_block = start_block;
        self.size = size;
    }

    pub fn clsid(&self) -> [u8; 16] {
        self.clsid
    }

    pub(crate) fn set_clsid(&mut self, clsid: [u8; 16]) {
        self.clsid = clsid;
    }

    pub fn state_bits(&self) -> u32 {
        self.state_bits
    }

    /// Creation time, if one is recorded
    pub fn created(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.created)
    }

    /// Last modification time, if one is recorded
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.modified)
    }

    pub(crate) fn set_times(
        &mut self,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
    ) {
        self.created = created.map_or(0, datetime_to_filetime);
        self.modified = modified.map_or(0, datetime_to_filetime);
    }
}

/// Directory order of entry names.
///
/// Shorter names (in UTF-16 code units) sort first; names of equal length
/// compare by their uppercased characters.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let len_a = a.encode_utf16().count();
    let len_b = b.encode_utf16().count();
    len_a.cmp(&len_b).then_with(|| {
        a.chars()
            .flat_map(char::to_uppercase)
            .cmp(b.chars().flat_map(char::to_uppercase))
    })
}

/// Returns true if two names would occupy the same slot in one directory.
pub fn names_collide(a: &str, b: &str) -> bool {
    compare_names(a, b) == Ordering::Equal
}

/// Check that `name` can be stored in a property record.
pub fn validate_name(name: &str) -> Result<()> {
    let units = name.encode_utf16().count();
    if units == 0 || units > MAX_NAME_UNITS {
        return Err(OleError::InvalidName(name.to_string()));
    }
    if name.contains(ILLEGAL_NAME_CHARS) {
        return Err(OleError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Convert a FILETIME (100 ns ticks since 1601) to a UTC timestamp; zero means unset.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let unix_ticks = i64::try_from(filetime).ok()? - WINDOWS_EPOCH_OFFSET;
    DateTime::from_timestamp(
        unix_ticks.div_euclid(10_000_000),
        (unix_ticks.rem_euclid(10_000_000) * 100) as u32,
    )
}

/// Convert a UTC timestamp to FILETIME, clamping times before 1601 to zero.
pub fn datetime_to_filetime(datetime: DateTime<Utc>) -> u64 {
    let ticks = datetime
        .timestamp()
        .saturating_mul(10_000_000)
        .saturating_add(i64::from(datetime.timestamp_subsec_nanos() / 100))
        .saturating_add(WINDOWS_EPOCH_OFFSET);
    ticks.max(0) as u64
}
