//! Binary data helpers shared by the header, allocation table and property codecs.
//!
//! All compound file structures are little-endian.

/// Decode a whole buffer as consecutive little-endian u32 values.
///
/// Trailing bytes that do not form a full value are ignored.
pub fn read_u32_array_le(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Encode u32 values as little-endian bytes into `out`, which must be large enough.
pub fn write_u32_array_le(values: &[u32], out: &mut [u8]) {
    for (slot, value) in out.chunks_exact_mut(4).zip(values) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
}

/// Decode UTF-16LE code units, stopping at the first NUL.
///
/// Unpaired surrogates are replaced rather than dropped so that names keep
/// their length.
///
/// # Examples
///
/// ```
/// use longan::common::binary::parse_utf16le_string;
/// let data = vec![0x48, 0x00, 0x65, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F, 0x00, 0x00, 0x00];
/// assert_eq!(parse_utf16le_string(&data), "Hello");
/// ```
pub fn parse_utf16le_string(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode a string as UTF-16LE into `out`, truncating to whole code units.
///
/// Returns the number of code units written.
pub fn write_utf16le_string(text: &str, out: &mut [u8]) -> usize {
    let mut written = 0;
    for (slot, unit) in out.chunks_exact_mut(2).zip(text.encode_utf16()) {
        slot.copy_from_slice(&unit.to_le_bytes());
        written += 1;
    }
    written
}
