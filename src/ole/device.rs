//! Byte-level backing stores for a compound file.
//!
//! A device is a flat, growable byte space. Big block `n` lives at byte offset
//! `(n + 1) * block_size`; the leading block holds the header.

use super::error::{OleError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Access mode for file-backed filesystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Reads only; any attempt to write fails with [`OleError::ReadOnly`]
    #[default]
    ReadOnly,
    /// Reads and in-place writes
    ReadWrite,
}

/// Positioned byte storage underneath the block stores.
pub trait BlockDevice: std::fmt::Debug {
    /// Current size in bytes
    fn len(&self) -> u64;

    /// Returns true if the device holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`. Reading past the end is an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` at `offset`, growing the device with zeros if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Copy the whole device to a sink.
    fn copy_to(&mut self, sink: &mut dyn Write) -> Result<()>;

    /// Flush pending writes to the underlying medium.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns true if writes are rejected
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Device backed by an in-memory buffer
#[derive(Debug, Default)]
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    /// Wrap an existing buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Create a zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Consume the device and return its bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(OleError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} exceeds buffer of {} bytes",
                    buf.len(),
                    offset,
                    self.data.len()
                ),
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn copy_to(&mut self, sink: &mut dyn Write) -> Result<()> {
        sink.write_all(&self.data)?;
        Ok(())
    }
}

/// Device backed by a file handle using positioned reads and writes
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    len: u64,
    mode: OpenMode,
}

impl FileDevice {
    /// Open an existing file.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::ReadWrite)
            .open(path)?;
        Self::from_file(file, mode)
    }

    /// Wrap an already opened file.
    pub fn from_file(file: File, mode: OpenMode) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len, mode })
    }

    /// Access mode of this device
    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

impl BlockDevice for FileDevice {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset + buf.len() as u64 > self.len {
            return Err(OleError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} exceeds file of {} bytes",
                    buf.len(),
                    offset,
                    self.len
                ),
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(OleError::ReadOnly);
        }
        // Seeking past the end and writing leaves a zero-filled gap
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.len = self.len.max(offset + buf.len() as u64);
        Ok(())
    }

    fn copy_to(&mut self, sink: &mut dyn Write) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let copied = io::copy(&mut (&mut self.file).take(self.len), sink)?;
        if copied != self.len {
            return Err(OleError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backing file shrank while copying",
            )));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.mode == OpenMode::ReadWrite {
            self.file.flush()?;
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_grows_on_write() {
        let mut device = MemoryDevice::with_len(4);
        device.write_at(6, &[1, 2]).unwrap();
        assert_eq!(device.len(), 8);
        assert_eq!(device.into_inner(), vec![0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_memory_device_read_past_end() {
        let mut device = MemoryDevice::new(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        device.read_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
        assert!(device.read_at(2, &mut buf).is_err());
    }

    #[test]
    fn test_file_device_read_write() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9u8; 16]).unwrap();
        tmp.flush().unwrap();

        let mut device = FileDevice::open(tmp.path(), OpenMode::ReadWrite).unwrap();
        assert_eq!(device.len(), 16);
        device.write_at(20, &[7, 7]).unwrap();
        assert_eq!(device.len(), 22);

        let mut buf = [0u8; 6];
        device.read_at(16, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 7, 7]);

        let mut out = Vec::new();
        device.copy_to(&mut out).unwrap();
        assert_eq!(out.len(), 22);
    }

    #[test]
    fn test_file_device_read_only() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut device = FileDevice::open(tmp.path(), OpenMode::ReadOnly).unwrap();
        assert!(device.is_read_only());
        assert!(matches!(device.write_at(0, &[1]), Err(OleError::ReadOnly)));
    }
}
