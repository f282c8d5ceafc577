//! Read-only views over the directory tree.
//!
//! Views borrow the filesystem's property table; they are cheap to copy and
//! never outlive the filesystem they came from.

use super::error::{OleError, Result};
use super::property::{EntryId, Property, PropertyTable};
use chrono::{DateTime, Utc};

/// A directory tree entry: either a storage or a document.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Directory(DirectoryNode<'a>),
    Document(DocumentNode<'a>),
}

impl<'a> Entry<'a> {
    pub(crate) fn new(table: &'a PropertyTable, id: EntryId) -> Result<Self> {
        let property = table.property(id)?;
        Ok(if property.is_document() {
            Entry::Document(DocumentNode { table, id, property })
        } else {
            Entry::Directory(DirectoryNode { table, id, property })
        })
    }

    fn property(&self) -> &'a Property {
        match self {
            Entry::Directory(dir) => dir.property,
            Entry::Document(doc) => doc.property,
        }
    }

    pub fn id(&self) -> EntryId {
        match self {
            Entry::Directory(dir) => dir.id,
            Entry::Document(doc) => doc.id,
        }
    }

    pub fn name(&self) -> &'a str {
        self.property().name()
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Entry::Document(_))
    }

    /// Contents size; zero for storages
    pub fn size(&self) -> u64 {
        match self {
            Entry::Directory(_) => 0,
            Entry::Document(doc) => doc.size(),
        }
    }

    pub fn clsid(&self) -> [u8; 16] {
        self.property().clsid()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.property().created()
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.property().modified()
    }

    pub fn as_directory(&self) -> Option<DirectoryNode<'a>> {
        match self {
            Entry::Directory(dir) => Some(*dir),
            Entry::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<DocumentNode<'a>> {
        match self {
            Entry::Document(doc) => Some(*doc),
            Entry::Directory(_) => None,
        }
    }
}

/// A storage: the root or a named directory.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryNode<'a> {
    table: &'a PropertyTable,
    id: EntryId,
    property: &'a Property,
}

impl<'a> DirectoryNode<'a> {
    pub(crate) fn root(table: &'a PropertyTable) -> Self {
        Self {
            table,
            id: table.root(),
            property: table.root_property(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        self.property.name()
    }

    pub fn is_root(&self) -> bool {
        self.property.is_root()
    }

    /// Containing storage; `None` for the root
    pub fn parent(&self) -> Option<DirectoryNode<'a>> {
        let parent = self.property.parent()?;
        Entry::new(self.table, parent).ok()?.as_directory()
    }

    /// Children in directory order.
    ///
    /// Each call starts a fresh iteration.
    pub fn entries(&self) -> Entries<'a> {
        Entries {
            table: self.table,
            ids: self.property.children().iter(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.property.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.property.children().is_empty()
    }

    /// Child named `name`, compared case-insensitively.
    pub fn entry(&self, name: &str) -> Result<Entry<'a>> {
        let id = self
            .table
            .find_child(self.id, name)
            .ok_or_else(|| OleError::NotFound(name.to_string()))?;
        Entry::new(self.table, id)
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.table.find_child(self.id, name).is_some()
    }

    /// Names of the children in directory order
    pub fn entry_names(&self) -> Vec<&'a str> {
        self.entries().map(|e| e.name()).collect()
    }

    pub fn clsid(&self) -> [u8; 16] {
        self.property.clsid()
    }
}

/// A document: a named byte stream.
#[derive(Debug, Clone, Copy)]
pub struct DocumentNode<'a> {
    table: &'a PropertyTable,
    id: EntryId,
    property: &'a Property,
}

impl<'a> DocumentNode<'a> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        self.property.name()
    }

    pub fn size(&self) -> u64 {
        self.property.size()
    }

    /// Returns true if the contents live in the mini stream
    pub fn is_small(&self) -> bool {
        self.property.is_small()
    }

    pub fn parent(&self) -> Option<DirectoryNode<'a>> {
        let parent = self.property.parent()?;
        Entry::new(self.table, parent).ok()?.as_directory()
    }
}

/// Iterator over the children of a storage.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    table: &'a PropertyTable,
    ids: std::slice::Iter<'a, EntryId>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Children always refer to live properties
        self.ids.find_map(|&id| Entry::new(self.table, id).ok())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}
