//! Streaming access to document contents.

use super::consts::MINI_BLOCK_SIZE;
use super::error::{OleError, Result};
use super::filesystem::OleFileSystem;
use super::property::EntryId;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Reads a document block by block.
///
/// The chain is resolved up front; block contents are fetched as the reader
/// advances.
#[derive(Debug)]
pub struct DocumentReader<'a> {
    fs: &'a mut OleFileSystem,
    blocks: Vec<u32>,
    small: bool,
    unit: usize,
    size: u64,
    position: u64,
    cached: Option<(usize, Vec<u8>)>,
}

impl<'a> DocumentReader<'a> {
    pub(crate) fn new(fs: &'a mut OleFileSystem, id: EntryId) -> Result<Self> {
        fs.ensure_open()?;
        let property = fs.property_table().property(id)?;
        if !property.is_document() {
            return Err(OleError::NotADocument(property.name().to_string()));
        }
        let (start, small, size) = (property.start_block(), property.is_small(), property.size());

        let blocks = fs.chain_addresses(small, start)?;
        let unit = if small {
            MINI_BLOCK_SIZE
        } else {
            fs.big_block_size()
        };
        if (blocks.len() as u64) * (unit as u64) < size {
            return Err(OleError::CorruptedFile(format!(
                "Document declares {} bytes but its chain holds {} blocks of {}",
                size,
                blocks.len(),
                unit
            )));
        }

        Ok(Self {
            fs,
            blocks,
            small,
            unit,
            size,
            position: 0,
            cached: None,
        })
    }

    /// Document size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Read for DocumentReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        let index = (self.position / self.unit as u64) as usize;
        let within = (self.position % self.unit as u64) as usize;
        if self.cached.as_ref().is_none_or(|(cached, _)| *cached != index) {
            let data = self
                .fs
                .read_unit(self.small, self.blocks[index])
                .map_err(io::Error::other)?;
            self.cached = Some((index, data));
        }
        let Some((_, data)) = &self.cached else {
            return Ok(0);
        };

        let n = (buf.len() as u64)
            .min((self.unit - within) as u64)
            .min(self.size - self.position) as usize;
        buf[..n].copy_from_slice(&data[within..within + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for DocumentReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            },
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

/// Buffers written bytes and stores them as a document when closed.
///
/// Dropping an unclosed writer stores the document too, logging any failure.
/// Use [`DocumentWriter::close`] to observe errors.
#[derive(Debug)]
pub struct DocumentWriter<'a> {
    fs: &'a mut OleFileSystem,
    parent: EntryId,
    name: String,
    buffer: Vec<u8>,
    committed: bool,
}

impl<'a> DocumentWriter<'a> {
    pub(crate) fn new(fs: &'a mut OleFileSystem, parent: EntryId, name: &str) -> Self {
        Self {
            fs,
            parent,
            name: name.to_string(),
            buffer: Vec::new(),
            committed: false,
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Store the document, replacing any document of the same name.
    pub fn close(mut self) -> Result<EntryId> {
        self.commit()
    }

    fn commit(&mut self) -> Result<EntryId> {
        self.committed = true;
        let data = std::mem::take(&mut self.buffer);
        self.fs
            .create_or_update_document(self.parent, &self.name, &data)
    }
}

impl Write for DocumentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DocumentWriter<'_> {
    fn drop(&mut self) {
        if !self.committed
            && let Err(err) = self.commit()
        {
            log::warn!("Failed to store document {:?}: {}", self.name, err);
        }
    }
}
