//! File signature sniffing.
//!
//! Used to explain *why* an input was rejected: a compound file opener that is
//! handed a ZIP package or a raw XML document should say so instead of simply
//! reporting a bad signature.

use crate::ole::consts::MAGIC;
use std::fmt;
use std::io::{self, BufRead};

/// ZIP local file header signature (OOXML packages)
const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
/// PDF signature
const PDF_SIGNATURE: &[u8; 5] = b"%PDF-";
/// RTF signature
const RTF_SIGNATURE: &[u8; 5] = b"{\\rtf";

/// Coarse file type recognized from the leading bytes of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMagic {
    /// OLE2 compound file
    Ole2,
    /// ZIP container, e.g. an Office 2007+ XML package
    Ooxml,
    /// Raw XML document (Office 2003 XML and friends)
    Xml,
    /// HTML document
    Html,
    /// PDF document
    Pdf,
    /// Rich Text Format document
    Rtf,
    /// Nothing recognizable
    Unknown,
}

impl FileMagic {
    /// Classify a buffer by its leading bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use longan::common::detection::FileMagic;
    ///
    /// assert_eq!(FileMagic::from_bytes(b"<?xml version=\"1.0\"?>"), FileMagic::Xml);
    /// assert_eq!(FileMagic::from_bytes(b"PK\x03\x04rest"), FileMagic::Ooxml);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Self {
        if data.starts_with(MAGIC) {
            return FileMagic::Ole2;
        }
        if data.starts_with(ZIP_SIGNATURE) {
            return FileMagic::Ooxml;
        }
        if data.starts_with(PDF_SIGNATURE) {
            return FileMagic::Pdf;
        }
        if data.starts_with(RTF_SIGNATURE) {
            return FileMagic::Rtf;
        }

        let text = strip_text_preamble(data);
        if starts_with_ignore_case(&text, b"<?xml") {
            return FileMagic::Xml;
        }
        if starts_with_ignore_case(&text, b"<!doctype html") || starts_with_ignore_case(&text, b"<html") {
            return FileMagic::Html;
        }

        FileMagic::Unknown
    }

    /// Classify a buffered reader without consuming any of its bytes.
    ///
    /// Only the bytes already available from `fill_buf` are inspected, so a
    /// source that buffers less than a signature's worth reports
    /// [`FileMagic::Unknown`].
    pub fn peek<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let buf = reader.fill_buf()?;
        Ok(Self::from_bytes(buf))
    }

    /// Human readable explanation used when rejecting an input.
    pub fn describe(&self) -> &'static str {
        match self {
            FileMagic::Ole2 => "the data is an OLE2 compound file",
            FileMagic::Ooxml => {
                "the supplied data appears to be in the Office 2007+ XML (ZIP) format, \
                 not an OLE2 compound file"
            },
            FileMagic::Xml => {
                "the supplied data appears to be a raw XML file; formats such as \
                 Office 2003 XML are not supported"
            },
            FileMagic::Html => "the supplied data appears to be an HTML document",
            FileMagic::Pdf => "the supplied data appears to be a PDF document",
            FileMagic::Rtf => "the supplied data appears to be a Rich Text Format document",
            FileMagic::Unknown => "invalid header signature",
        }
    }
}

impl fmt::Display for FileMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Decode an optional BOM and leading whitespace into ASCII-comparable bytes.
///
/// UTF-16 input is narrowed by dropping the zero half of each code unit, which
/// is enough to recognize ASCII markup prefixes.
fn strip_text_preamble(data: &[u8]) -> Vec<u8> {
    const PREFIX_LEN: usize = 32;

    let narrowed: Vec<u8> = if let Some(rest) = data.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        rest.iter().take(PREFIX_LEN).copied().collect()
    } else if let Some(rest) = data.strip_prefix(&[0xFF, 0xFE]) {
        rest.chunks_exact(2).take(PREFIX_LEN).map(|c| c[0]).collect()
    } else if let Some(rest) = data.strip_prefix(&[0xFE, 0xFF]) {
        rest.chunks_exact(2).take(PREFIX_LEN).map(|c| c[1]).collect()
    } else {
        data.iter().take(PREFIX_LEN).copied().collect()
    };

    let start = narrowed
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(narrowed.len());
    narrowed[start..].to_vec()
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    #[test]
    fn test_detect_ole2() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(FileMagic::from_bytes(&data), FileMagic::Ole2);
    }

    #[test]
    fn test_detect_xml_with_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"  <?XML version=\"1.0\"?><root/>");
        assert_eq!(FileMagic::from_bytes(&data), FileMagic::Xml);
    }

    #[test]
    fn test_detect_utf16_xml() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "<?xml version".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(FileMagic::from_bytes(&data), FileMagic::Xml);
    }

    #[test]
    fn test_detect_other_formats() {
        assert_eq!(FileMagic::from_bytes(b"%PDF-1.7"), FileMagic::Pdf);
        assert_eq!(FileMagic::from_bytes(b"{\\rtf1\\ansi"), FileMagic::Rtf);
        assert_eq!(FileMagic::from_bytes(b"<!DOCTYPE html>"), FileMagic::Html);
        assert_eq!(FileMagic::from_bytes(b"hello"), FileMagic::Unknown);
        assert_eq!(FileMagic::from_bytes(b""), FileMagic::Unknown);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = BufReader::new(Cursor::new(b"<?xml version=\"1.0\"?>".to_vec()));
        assert_eq!(FileMagic::peek(&mut reader).unwrap(), FileMagic::Xml);

        let mut all = String::new();
        reader.read_to_string(&mut all).unwrap();
        assert!(all.starts_with("<?xml"));
    }
}
