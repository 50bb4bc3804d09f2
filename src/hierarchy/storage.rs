//! storage.rs
//! Columnar location table with per-slot child lists.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// External location identifier, as delivered by the geographic metadata source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub i64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense index of a location inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Slot(pub u32);

impl Slot {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// One row of the flat hierarchy table.
///
/// The root is either marked by a missing `parent_id` or, following the GBD
/// convention, by naming itself as its own parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    pub location_id: LocationId,
    #[serde(default)]
    pub parent_id: Option<LocationId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
}

impl LocationRow {
    pub fn new(location_id: i64, parent_id: Option<i64>, name: &str) -> Self {
        Self {
            location_id: LocationId(location_id),
            parent_id: parent_id.map(LocationId),
            name: Some(name.to_string()),
            level: None,
        }
    }

    /// True when the row declares no parent of its own.
    pub fn is_root_row(&self) -> bool {
        match self.parent_id {
            None => true,
            Some(parent) => parent == self.location_id,
        }
    }
}

pub type ChildList = SmallVec<[Slot; 8]>;

#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    // Columnar arrays, one entry per slot
    pub ids: Vec<LocationId>,
    pub names: Vec<Option<String>>,
    pub declared_levels: Vec<Option<u32>>,
    pub parents: Vec<Option<Slot>>,
    pub levels: Vec<u32>,
    pub children: Vec<ChildList>,

    pub slot_of: HashMap<LocationId, Slot>,
}

impl LocationRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.ids.len() }

    /// Appends a location without linking it. Returns `None` if the id is already present.
    pub fn push_location(&mut self, row: &LocationRow) -> Option<Slot> {
        if self.slot_of.contains_key(&row.location_id) {
            return None;
        }
        let slot = Slot::new(self.ids.len());
        self.ids.push(row.location_id);
        self.names.push(row.name.clone());
        self.declared_levels.push(row.level);
        self.parents.push(None);
        self.levels.push(0);
        self.children.push(ChildList::new());
        self.slot_of.insert(row.location_id, slot);
        Some(slot)
    }

    pub fn link(&mut self, child: Slot, parent: Slot) {
        self.parents[child.index()] = Some(parent);
        self.children[parent.index()].push(child);
    }

    /// Orders every child list by external id so traversals are deterministic.
    pub fn sort_children(&mut self) {
        let ids = &self.ids;
        for list in self.children.iter_mut() {
            list.sort_by_key(|slot| ids[slot.index()]);
        }
    }

    #[inline(always)]
    pub fn slot(&self, id: LocationId) -> Option<Slot> {
        self.slot_of.get(&id).copied()
    }

    #[inline(always)]
    pub fn id(&self, slot: Slot) -> LocationId {
        self.ids[slot.index()]
    }

    #[inline(always)]
    pub fn get_children(&self, slot: Slot) -> &[Slot] {
        &self.children[slot.index()]
    }
}
