//! The property table: an arena of properties forming the directory tree.
//!
//! # Implementation Notes
//!
//! On disk, the children of a storage form a binary search tree threaded
//! through the sibling links of their records. Loading walks those trees and
//! keeps each storage's children as a sorted list instead. Writing assigns
//! record indices depth-first and rebuilds each tree as a degenerate one: the
//! middle child becomes the storage's child link, smaller children hang off
//! its left link in a chain, larger ones off its right link. All nodes are
//! written black.

use super::record::PropertyRecord;
use super::{EntryId, Property, PropertyKind, compare_names, names_collide};
use crate::ole::block_size::BlockSize;
use crate::ole::consts::*;
use crate::ole::error::{OleError, Result};
use fixedbitset::FixedBitSet;
use std::cmp::Ordering;

/// Arena of properties with the root at index 0.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    root: Property,
    /// Every other property; slot 0 is always vacant
    nodes: Vec<Option<Property>>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTable {
    /// Table holding only the root.
    pub fn new() -> Self {
        Self {
            root: Property::root(),
            nodes: vec![None],
        }
    }

    /// Build the tree from decoded records.
    ///
    /// Record 0 must be the root. Links to missing or unused records are
    /// skipped with a warning, as are records linked from more than one place.
    /// Records unreachable from the root are dropped.
    pub fn from_records(records: Vec<Option<PropertyRecord>>) -> Result<Self> {
        match records.first() {
            Some(Some(root)) if root.entry_type == STGTY_ROOT => {},
            _ => {
                return Err(OleError::CorruptedFile(
                    "Property table has no root entry".to_string(),
                ));
            },
        }

        let count = records.len();
        let links: Vec<Option<(u32, u32, u32)>> = records
            .iter()
            .map(|r| r.as_ref().map(|r| (r.left, r.right, r.child)))
            .collect();

        let mut nodes: Vec<Option<Property>> = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| record.map(|r| Self::property_from_record(index == 0, r)))
            .collect();
        let Some(root) = nodes[0].take() else {
            return Err(OleError::CorruptedFile(
                "Property table has no root entry".to_string(),
            ));
        };
        let mut table = Self { root, nodes };

        let mut attached = FixedBitSet::with_capacity(count);
        attached.insert(0);
        let mut storages = vec![0usize];

        while let Some(storage) = storages.pop() {
            let mut pending = match links[storage] {
                Some((_, _, child)) => vec![child],
                None => Vec::new(),
            };
            while let Some(sid) = pending.pop() {
                if sid == NOSTREAM {
                    continue;
                }
                let index = sid as usize;
                let Some((left, right, _)) = links.get(index).copied().flatten() else {
                    log::warn!(
                        "Property {} links to record {}, outside the valid range 0..{}",
                        storage,
                        sid,
                        count
                    );
                    continue;
                };
                if attached.put(index) {
                    log::warn!("Property {} is linked more than once; ignoring the repeat", sid);
                    continue;
                }
                table.attach(EntryId(storage as u32), EntryId(sid));
                if table
                    .get(EntryId(sid))
                    .is_some_and(|node| node.is_directory())
                {
                    storages.push(index);
                }
                pending.push(right);
                pending.push(left);
            }
        }

        let mut dropped = 0;
        for (index, node) in table.nodes.iter_mut().enumerate() {
            if node.is_some() && !attached.contains(index) {
                *node = None;
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::warn!("Dropped {} properties unreachable from the root", dropped);
        }

        Ok(table)
    }

    /// Records typed as root anywhere but index 0 load as plain storages.
    fn property_from_record(is_root: bool, record: PropertyRecord) -> Property {
        let kind = match record.entry_type {
            _ if is_root => PropertyKind::Root {
                children: Vec::new(),
            },
            STGTY_STREAM => PropertyKind::Document,
            _ => PropertyKind::Directory {
                children: Vec::new(),
            },
        };
        let (start_block, size) = match kind {
            PropertyKind::Directory { .. } => (ENDOFCHAIN, 0),
            // Empty documents own no chain, whatever start the writer left
            PropertyKind::Document if record.size == 0 => (ENDOFCHAIN, 0),
            _ => (record.start_block, record.size),
        };
        Property {
            name: record.name,
            kind,
            parent: None,
            start_block,
            size,
            clsid: record.clsid,
            state_bits: record.state_bits,
            created: record.created,
            modified: record.modified,
        }
    }

    /// Link `child` under `parent` at its sorted position.
    ///
    /// Equal names keep insertion order.
    fn attach(&mut self, parent: EntryId, child: EntryId) {
        let Some(name) = self.get(child).map(|p| p.name.clone()) else {
            return;
        };
        let position = self.get(parent).map(|p| {
            p.children().partition_point(|&sibling| {
                self.get(sibling)
                    .is_some_and(|s| compare_names(&s.name, &name) != Ordering::Greater)
            })
        });
        if let (Some(position), Some(children)) = (
            position,
            self.get_mut(parent).and_then(|p| p.children_mut()),
        ) {
            children.insert(position, child);
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    fn detach(&mut self, id: EntryId) {
        let parent = self.get(id).and_then(|p| p.parent);
        if let Some(children) = parent
            .and_then(|parent| self.get_mut(parent))
            .and_then(|p| p.children_mut())
        {
            children.retain(|&c| c != id);
        }
    }

    /// The root entry
    pub fn root(&self) -> EntryId {
        EntryId(0)
    }

    pub fn root_property(&self) -> &Property {
        &self.root
    }

    pub(crate) fn root_property_mut(&mut self) -> &mut Property {
        &mut self.root
    }

    /// Property for `id`, if it exists
    pub fn get(&self, id: EntryId) -> Option<&Property> {
        if id.0 == 0 {
            return Some(&self.root);
        }
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Property> {
        if id.0 == 0 {
            return Some(&mut self.root);
        }
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Property for `id`, or [`OleError::NotFound`]
    pub fn property(&self, id: EntryId) -> Result<&Property> {
        self.get(id)
            .ok_or_else(|| OleError::NotFound(format!("entry #{}", id.0)))
    }

    pub(crate) fn property_mut(&mut self, id: EntryId) -> Result<&mut Property> {
        self.get_mut(id)
            .ok_or_else(|| OleError::NotFound(format!("entry #{}", id.0)))
    }

    /// Child of `parent` whose name matches `name` case-insensitively.
    pub fn find_child(&self, parent: EntryId, name: &str) -> Option<EntryId> {
        let parent = self.get(parent)?;
        parent
            .children()
            .iter()
            .copied()
            .find(|&c| self.get(c).is_some_and(|p| names_collide(&p.name, name)))
    }

    /// Add `property` as a child of the storage `parent`.
    ///
    /// Name validation is the caller's responsibility.
    pub fn insert(&mut self, parent: EntryId, property: Property) -> Result<EntryId> {
        let parent_property = self.property(parent)?;
        if !parent_property.is_directory() {
            return Err(OleError::NotADirectory(parent_property.name.clone()));
        }
        if self.find_child(parent, &property.name).is_some() {
            return Err(OleError::AlreadyExists(property.name));
        }

        let id = EntryId(self.nodes.len() as u32);
        self.nodes.push(Some(property));
        self.attach(parent, id);
        Ok(id)
    }

    /// Remove an entry from the tree.
    ///
    /// The root cannot be removed. Children of a removed storage are removed
    /// with it.
    pub fn remove(&mut self, id: EntryId) -> Option<Property> {
        if id == self.root() {
            return None;
        }
        self.detach(id);
        let removed = self.nodes.get_mut(id.index())?.take()?;
        for &child in removed.children() {
            self.remove_subtree(child);
        }
        Some(removed)
    }

    fn remove_subtree(&mut self, id: EntryId) {
        if let Some(removed) = self.nodes.get_mut(id.index()).and_then(Option::take) {
            for &child in removed.children() {
                self.remove_subtree(child);
            }
        }
    }

    /// Rename an entry and move it to its new sorted position.
    ///
    /// Returns false if the entry does not exist, is the root, or a sibling
    /// already uses the name.
    pub fn rename(&mut self, id: EntryId, name: &str) -> bool {
        let Some(parent) = self.get(id).and_then(|p| p.parent) else {
            return false;
        };
        if self
            .find_child(parent, name)
            .is_some_and(|existing| existing != id)
        {
            return false;
        }
        self.detach(id);
        if let Some(node) = self.get_mut(id) {
            node.name = name.to_string();
        }
        self.attach(parent, id);
        true
    }

    /// Number of live properties, the root included
    pub fn len(&self) -> usize {
        1 + self.nodes.iter().flatten().count()
    }

    /// Always false: the root is always present
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Live properties in arena order, the root first
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Property)> + '_ {
        std::iter::once((self.root(), &self.root)).chain(
            self.nodes
                .iter()
                .enumerate()
                .filter_map(|(i, node)| node.as_ref().map(|p| (EntryId(i as u32), p))),
        )
    }

    /// Entries in depth-first directory order, the root first.
    pub fn walk(&self) -> Vec<EntryId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(property) = self.get(id) {
                stack.extend(property.children().iter().rev());
            }
        }
        order
    }

    /// Produce the records to persist, in record index order.
    pub fn to_records(&self) -> Vec<PropertyRecord> {
        let order = self.walk();
        let mut sids = vec![NOSTREAM; self.nodes.len()];
        for (sid, id) in order.iter().enumerate() {
            sids[id.index()] = sid as u32;
        }

        let mut records: Vec<PropertyRecord> = order
            .iter()
            .filter_map(|&id| self.get(id))
            .map(Self::record_for)
            .collect();

        for (sid, &id) in order.iter().enumerate() {
            if let Some(property) = self.get(id)
                && property.is_directory()
            {
                let children: Vec<u32> =
                    property.children().iter().map(|c| sids[c.index()]).collect();
                link_children(sid, &children, &mut records);
            }
        }
        records
    }

    fn record_for(property: &Property) -> PropertyRecord {
        let entry_type = match property.kind {
            PropertyKind::Root { .. } => STGTY_ROOT,
            PropertyKind::Directory { .. } => STGTY_STORAGE,
            PropertyKind::Document => STGTY_STREAM,
        };
        PropertyRecord {
            name: property.name.clone(),
            entry_type,
            color: COLOR_BLACK,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            clsid: property.clsid,
            state_bits: property.state_bits,
            created: property.created,
            modified: property.modified,
            start_block: property.start_block,
            size: property.size,
        }
    }

    /// Serialize the table, padding the last block with unused records.
    pub fn serialize(&self, block_size: BlockSize) -> Vec<u8> {
        let records = self.to_records();
        let per_block = block_size.properties_per_block();
        let slots = records.len().div_ceil(per_block) * per_block;

        let mut data = Vec::with_capacity(slots * DIRENTRY_SIZE);
        for record in &records {
            data.extend_from_slice(&record.encode());
        }
        let unused = PropertyRecord::empty().encode();
        for _ in records.len()..slots {
            data.extend_from_slice(&unused);
        }
        data
    }
}

/// Thread already sorted children through their sibling links.
fn link_children(parent_sid: usize, sorted: &[u32], records: &mut [PropertyRecord]) {
    if sorted.is_empty() {
        records[parent_sid].child = NOSTREAM;
        return;
    }

    let midpoint = sorted.len() / 2;
    records[parent_sid].child = sorted[midpoint];

    for (j, &sid) in sorted.iter().enumerate() {
        let record = &mut records[sid as usize];
        match j.cmp(&midpoint) {
            Ordering::Less => {
                record.left = if j > 0 { sorted[j - 1] } else { NOSTREAM };
                record.right = NOSTREAM;
            },
            Ordering::Equal => {
                record.left = if j > 0 { sorted[j - 1] } else { NOSTREAM };
                record.right = sorted.get(j + 1).copied().unwrap_or(NOSTREAM);
            },
            Ordering::Greater => {
                record.left = NOSTREAM;
                record.right = sorted.get(j + 1).copied().unwrap_or(NOSTREAM);
            },
        }
    }
}
