/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// On-disk size of the header structure, regardless of the big block size
pub const HEADER_SIZE: usize = 512;

/// Size of a directory entry (property record) in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Size of a mini block in bytes
pub const MINI_BLOCK_SIZE: usize = 64;

/// log2 of [`MINI_BLOCK_SIZE`], as stored in the header
pub const MINI_BLOCK_SHIFT: u16 = 6;

/// Documents strictly smaller than this live in the mini stream
pub const MINI_STREAM_CUTOFF: u32 = 4096;

/// Number of BAT sector locations stored inline in the header
pub const HEADER_BAT_SLOTS: usize = 109;

/// Longest entry name, in UTF-16 code units (excluding the terminator)
pub const MAX_NAME_UNITS: usize = 31;

/// Name of the root property
pub const ROOT_NAME: &str = "Root Entry";

/// Minor version written into new headers
pub const MINOR_VERSION: u16 = 0x003E;

/// Little-endian byte order marker
pub const BYTE_ORDER_LE: u16 = 0xFFFE;

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

/// Unallocated directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

/// Red node in the directory red-black tree
pub const COLOR_RED: u8 = 0;
/// Black node in the directory red-black tree
pub const COLOR_BLACK: u8 = 1;

/// Characters that may not appear in an entry name
pub const ILLEGAL_NAME_CHARS: [char; 4] = ['/', '\\', ':', '!'];

/// Returns true if `value` is a chain pointer rather than a sentinel
#[inline]
pub const fn is_regular_sector(value: u32) -> bool {
    value <= MAXREGSECT
}
