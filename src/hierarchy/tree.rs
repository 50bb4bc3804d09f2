//! tree.rs
//! Wraps the location registry with the read-only queries the cascade needs.

use super::error::{HierarchyError, LevelError, MalformedHierarchyError};
use super::storage::{LocationId, LocationRegistry, LocationRow, Slot};
use super::topology;
use std::collections::{BTreeSet, VecDeque};

/// Where a drill starts, counted the way the settings form counts levels
/// (1 is the global root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillStart {
    Level(i64),
    MostDetailed,
}

/// A single rooted tree of locations. Immutable after [`LocationHierarchy::build`].
#[derive(Debug, Clone)]
pub struct LocationHierarchy {
    store: LocationRegistry,
    root: Slot,
}

impl LocationHierarchy {
    /// Builds the tree from a flat table, rejecting dangling parents, cycles,
    /// duplicate ids and anything other than exactly one root.
    pub fn build(rows: &[LocationRow]) -> Result<Self, MalformedHierarchyError> {
        let mut store = LocationRegistry::new();
        for row in rows {
            if store.push_location(row).is_none() {
                return Err(MalformedHierarchyError::DuplicateLocation { location: row.location_id });
            }
        }

        let mut roots = Vec::new();
        for row in rows {
            let child = store.slot(row.location_id).ok_or(MalformedHierarchyError::NoRoot)?;
            if row.is_root_row() {
                roots.push(child);
                continue;
            }
            let parent_id = row.parent_id.ok_or(MalformedHierarchyError::NoRoot)?;
            let parent = store.slot(parent_id).ok_or(MalformedHierarchyError::MissingParent {
                location: row.location_id,
                parent: parent_id,
            })?;
            store.link(child, parent);
        }

        let root = match roots.as_slice() {
            [] => return Err(MalformedHierarchyError::NoRoot),
            [single] => *single,
            many => {
                return Err(MalformedHierarchyError::MultipleRoots {
                    roots: many.iter().map(|s| store.id(*s)).collect(),
                })
            }
        };

        topology::check_acyclic(&store)?;
        store.sort_children();
        topology::assign_levels(&mut store, root);

        for i in 0..store.count() {
            if let Some(declared) = store.declared_levels[i] {
                let actual = store.levels[i];
                if declared != actual {
                    return Err(MalformedHierarchyError::LevelMismatch {
                        location: store.ids[i],
                        declared,
                        actual,
                    });
                }
            }
        }

        Ok(Self { store, root })
    }

    pub fn root(&self) -> LocationId { self.store.id(self.root) }
    pub fn len(&self) -> usize { self.store.count() }
    pub fn is_empty(&self) -> bool { self.store.count() == 0 }

    pub fn contains(&self, location: LocationId) -> bool {
        self.store.slot(location).is_some()
    }

    fn slot(&self, location: LocationId) -> Result<Slot, HierarchyError> {
        self.store.slot(location).ok_or(HierarchyError::UnknownLocation(location))
    }

    pub fn name_of(&self, location: LocationId) -> Result<Option<&str>, HierarchyError> {
        let slot = self.slot(location)?;
        Ok(self.store.names[slot.index()].as_deref())
    }

    pub fn parent_of(&self, location: LocationId) -> Result<Option<LocationId>, HierarchyError> {
        let slot = self.slot(location)?;
        Ok(self.store.parents[slot.index()].map(|p| self.store.id(p)))
    }

    /// Depth below the root; the root is level 0.
    pub fn level_of(&self, location: LocationId) -> Result<u32, HierarchyError> {
        let slot = self.slot(location)?;
        Ok(self.store.levels[slot.index()])
    }

    /// Direct children in ascending id order.
    pub fn children_of(&self, location: LocationId) -> Result<Vec<LocationId>, HierarchyError> {
        let slot = self.slot(location)?;
        Ok(self.store.get_children(slot).iter().map(|c| self.store.id(*c)).collect())
    }

    pub fn is_leaf(&self, location: LocationId) -> Result<bool, HierarchyError> {
        let slot = self.slot(location)?;
        Ok(self.store.get_children(slot).is_empty())
    }

    pub fn descendants_of(
        &self,
        location: LocationId,
        include_self: bool,
    ) -> Result<BTreeSet<LocationId>, HierarchyError> {
        self.descendants(location, false, include_self)
    }

    /// Children only, or the whole subtree, with or without the location itself.
    pub fn descendants(
        &self,
        location: LocationId,
        children_only: bool,
        include_self: bool,
    ) -> Result<BTreeSet<LocationId>, HierarchyError> {
        let start = self.slot(location)?;
        let mut found = BTreeSet::new();
        if include_self {
            found.insert(location);
        }
        let mut queue: VecDeque<Slot> = self.store.get_children(start).iter().copied().collect();
        while let Some(slot) = queue.pop_front() {
            found.insert(self.store.id(slot));
            if !children_only {
                queue.extend(self.store.get_children(slot).iter().copied());
            }
        }
        Ok(found)
    }

    /// The path from the location at `from_level` down to `location`, inclusive.
    ///
    /// `from_level` is a depth (root = 0). Asking to start below the location
    /// itself is a [`LevelError`].
    pub fn ancestors_path(
        &self,
        location: LocationId,
        from_level: u32,
    ) -> Result<Vec<LocationId>, HierarchyError> {
        let slot = self.slot(location)?;
        let own_level = self.store.levels[slot.index()];
        if from_level > own_level {
            return Err(LevelError::AboveLocation {
                location,
                location_level: own_level,
                requested: from_level,
            }
            .into());
        }

        let mut path = Vec::with_capacity(own_level as usize + 1);
        let mut cursor = Some(slot);
        while let Some(current) = cursor {
            path.push(self.store.id(current));
            cursor = self.store.parents[current.index()];
        }
        path.reverse();
        Ok(path.split_off(from_level as usize))
    }

    /// Drill path for the settings-level description of where a drill starts.
    pub fn drill_path(
        &self,
        location: LocationId,
        start: DrillStart,
    ) -> Result<Vec<LocationId>, HierarchyError> {
        match start {
            DrillStart::MostDetailed => {
                let children = self.children_of(location)?;
                if children.is_empty() {
                    Ok(vec![location])
                } else {
                    Err(LevelError::NotMostDetailed { location, children }.into())
                }
            }
            DrillStart::Level(level) => {
                if level <= 0 {
                    return Err(LevelError::NonPositive(level).into());
                }
                // Settings count the global root as level 1.
                let depth = u32::try_from(level - 1).unwrap_or(u32::MAX);
                self.ancestors_path(location, depth)
            }
        }
    }

    /// Every location, breadth first from the root with siblings in id order.
    pub fn node_order(&self) -> Vec<LocationId> {
        topology::breadth_first(&self.store, self.root)
            .into_iter()
            .map(|s| self.store.id(s))
            .collect()
    }
}
