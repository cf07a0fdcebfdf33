//! Per-node forwarding state
//!
//! A [`ForwardingTable`] is immutable once built. The
//! [`ForwardingStateStore`] holds the current table behind an `Arc` and
//! swaps it wholesale, so a decision that pinned a table keeps a consistent
//! view even while a reload installs the next one.

use std::sync::Arc;

use parking_lot::RwLock;
use satnet_core::{NextHop, NodeId, NodeLayout, SimTime, ValidationError};
use tracing::{debug, trace};

use crate::error::{RoutingError, RoutingResult};

/// One immutable version of a node's forwarding table
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingTable {
    owner: NodeId,
    version: u64,
    loaded_at: SimTime,
    entries: Vec<NextHop>,
    distances: Vec<Option<u32>>,
}

impl ForwardingTable {
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Monotonic version, 1 for the first installed table
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> SimTime {
        self.loaded_at
    }

    /// Entry for `target`; ids outside the table resolve to a drop
    pub fn lookup(&self, target: NodeId) -> NextHop {
        self.entries
            .get(target.index())
            .copied()
            .unwrap_or(NextHop::Drop)
    }

    /// Distance weight toward `target`, when the snapshot carried one
    pub fn distance(&self, target: NodeId) -> Option<u32> {
        self.distances.get(target.index()).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NextHop)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, hop)| (NodeId(i as u32), *hop))
    }
}

/// Staging area for the next table of one node
///
/// Snapshots after the first only list changed entries, so staging starts
/// from a copy of the current table.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    owner: NodeId,
    entries: Vec<NextHop>,
    distances: Vec<Option<u32>>,
}

impl TableBuilder {
    /// Seed for a node that has never loaded a snapshot.
    ///
    /// Only ground stations are routable destinations: the owner's own slot
    /// and every satellite target start as drops, ground-station targets
    /// start unset and must be filled by the snapshot.
    pub fn first(owner: NodeId, layout: &NodeLayout) -> Self {
        let entries = layout
            .nodes()
            .map(|target| {
                if target == owner || layout.is_satellite(target) {
                    NextHop::Drop
                } else {
                    NextHop::Unset
                }
            })
            .collect();
        Self {
            owner,
            entries,
            distances: vec![None; layout.num_nodes() as usize],
        }
    }

    /// Seed from the currently installed table
    pub fn from_table(table: &ForwardingTable) -> Self {
        Self {
            owner: table.owner,
            entries: table.entries.clone(),
            distances: table.distances.clone(),
        }
    }

    /// Write one entry from a raw triple
    pub fn set_entry(
        &mut self,
        target: NodeId,
        next_hop: i64,
        local_if: i64,
        remote_if: i64,
    ) -> Result<(), ValidationError> {
        let hop = NextHop::from_triple(next_hop, local_if, remote_if)?;
        self.set_hop(target, hop)
    }

    pub fn set_hop(&mut self, target: NodeId, hop: NextHop) -> Result<(), ValidationError> {
        if hop.is_unset() {
            return Err(ValidationError::UnsetSentinel);
        }
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(target.index())
            .ok_or(ValidationError::NodeOutOfRange {
                node: target.0 as i64,
                min: 0,
                max: len as i64,
            })?;
        *slot = hop;
        Ok(())
    }

    pub fn set_distance(&mut self, target: NodeId, distance: u32) {
        if let Some(slot) = self.distances.get_mut(target.index()) {
            *slot = Some(distance);
        }
    }

    /// Seal the staged entries, rejecting a table that still holds unset slots
    pub fn finish(self, loaded_at: SimTime) -> Result<ForwardingTable, ValidationError> {
        if let Some(target) = self.entries.iter().position(NextHop::is_unset) {
            return Err(ValidationError::IncompleteSnapshot {
                node: self.owner,
                target: NodeId(target as u32),
            });
        }
        Ok(ForwardingTable {
            owner: self.owner,
            version: 0,
            loaded_at,
            entries: self.entries,
            distances: self.distances,
        })
    }
}

/// The forwarding table a node routes with
///
/// Empty at construction; every reload replaces the whole table in one step.
#[derive(Debug)]
pub struct ForwardingStateStore {
    owner: NodeId,
    layout: NodeLayout,
    current: RwLock<Option<Arc<ForwardingTable>>>,
}

impl ForwardingStateStore {
    pub fn new(owner: NodeId, layout: NodeLayout) -> Self {
        Self {
            owner,
            layout,
            current: RwLock::new(None),
        }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Pin the current table for the duration of one decision
    pub fn current(&self) -> Option<Arc<ForwardingTable>> {
        self.current.read().clone()
    }

    /// Entry for `target`; [`NextHop::Unset`] only before the first load
    pub fn lookup(&self, target: NodeId) -> NextHop {
        match self.current.read().as_ref() {
            Some(table) => table.lookup(target),
            None => NextHop::Unset,
        }
    }

    /// Start staging the next table
    pub fn stage(&self) -> TableBuilder {
        match self.current.read().as_ref() {
            Some(table) => TableBuilder::from_table(table),
            None => TableBuilder::first(self.owner, &self.layout),
        }
    }

    /// Install a finished table, returning its version
    pub fn replace(&self, mut table: ForwardingTable) -> u64 {
        let mut current = self.current.write();
        table.version = current.as_ref().map_or(1, |t| t.version + 1);
        let version = table.version;
        debug!(
            node = %self.owner,
            version,
            at = %table.loaded_at,
            "Installed forwarding table"
        );
        *current = Some(Arc::new(table));
        version
    }

    /// Overwrite a single entry of the installed table.
    ///
    /// The change is applied to a copy that replaces the table as a whole.
    pub fn set_entry(
        &self,
        target: NodeId,
        next_hop: i64,
        local_if: i64,
        remote_if: i64,
    ) -> RoutingResult<()> {
        let mut current = self.current.write();
        let table = current.as_ref().ok_or(RoutingError::NotLoaded(self.owner))?;
        let mut builder = TableBuilder::from_table(table);
        builder.set_entry(target, next_hop, local_if, remote_if)?;
        let mut next = builder.finish(table.loaded_at)?;
        next.version = table.version + 1;
        trace!(node = %self.owner, target = %target, next_hop, "Updated forwarding entry");
        *current = Some(Arc::new(next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> NodeLayout {
        NodeLayout::new(2, 2, 2)
    }

    fn loaded_store(owner: u32) -> ForwardingStateStore {
        let store = ForwardingStateStore::new(NodeId(owner), layout());
        let mut builder = store.stage();
        builder.set_entry(NodeId(4), 1, 0, 2).unwrap();
        builder.set_entry(NodeId(5), -1, -1, -1).unwrap();
        store.replace(builder.finish(SimTime(0)).unwrap());
        store
    }

    #[test]
    fn test_empty_store_is_unset() {
        let store = ForwardingStateStore::new(NodeId(0), layout());
        assert!(!store.is_loaded());
        assert_eq!(store.lookup(NodeId(4)), NextHop::Unset);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_first_load_seeds_satellite_targets() {
        let store = loaded_store(0);
        assert!(store.lookup(NodeId(0)).is_drop());
        assert!(store.lookup(NodeId(3)).is_drop());
        assert_eq!(store.lookup(NodeId(4)), NextHop::forward(NodeId(1), 0, 2));
        assert!(store.lookup(NodeId(5)).is_drop());
        assert!(store.lookup(NodeId(99)).is_drop());
    }

    #[test]
    fn test_incomplete_first_snapshot_rejected() {
        let store = ForwardingStateStore::new(NodeId(0), layout());
        let mut builder = store.stage();
        builder.set_entry(NodeId(4), 1, 0, 2).unwrap();
        let err = builder.finish(SimTime(0)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::IncompleteSnapshot {
                node: NodeId(0),
                target: NodeId(5)
            }
        );
    }

    #[test]
    fn test_set_entry_rejects_unset_sentinel() {
        let store = loaded_store(0);
        let err = store.set_entry(NodeId(4), -2, -2, -2).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::Validation(ValidationError::UnsetSentinel)
        ));
        assert_eq!(store.lookup(NodeId(4)), NextHop::forward(NodeId(1), 0, 2));
    }

    #[test]
    fn test_set_entry_before_load() {
        let store = ForwardingStateStore::new(NodeId(0), layout());
        assert!(matches!(
            store.set_entry(NodeId(4), 1, 0, 2),
            Err(RoutingError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_replace_bumps_version_and_keeps_pinned_view() {
        let store = loaded_store(0);
        let pinned = store.current().unwrap();
        assert_eq!(pinned.version(), 1);

        let mut builder = store.stage();
        builder.set_entry(NodeId(4), 2, 1, 3).unwrap();
        let version = store.replace(builder.finish(SimTime(100)).unwrap());

        assert_eq!(version, 2);
        assert_eq!(pinned.lookup(NodeId(4)), NextHop::forward(NodeId(1), 0, 2));
        assert_eq!(store.lookup(NodeId(4)), NextHop::forward(NodeId(2), 1, 3));
        // delta snapshot kept the untouched entry
        assert!(store.lookup(NodeId(5)).is_drop());
    }

    #[test]
    fn test_distance_weights() {
        let store = ForwardingStateStore::new(NodeId(0), layout());
        let mut builder = store.stage();
        builder.set_entry(NodeId(4), 1, 0, 2).unwrap();
        builder.set_distance(NodeId(4), 3);
        builder.set_entry(NodeId(5), 1, 0, 2).unwrap();
        store.replace(builder.finish(SimTime(0)).unwrap());
        let table = store.current().unwrap();
        assert_eq!(table.distance(NodeId(4)), Some(3));
        assert_eq!(table.distance(NodeId(5)), None);
    }
}
