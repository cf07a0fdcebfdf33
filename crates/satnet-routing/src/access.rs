//! Access satellites of each ground station
//!
//! A satellite is an access point for a ground station while its snapshot
//! entry for that ground station points straight at it. The set is rebuilt
//! incrementally from each reload and shared read-only with every arbiter.

use std::collections::BTreeSet;

use satnet_core::{NextHop, NodeId, NodeLayout};

/// Per ground station, the satellites currently serving it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationSatelliteSet {
    per_ground_station: Vec<BTreeSet<NodeId>>,
}

impl DestinationSatelliteSet {
    pub fn new(num_ground_stations: usize) -> Self {
        Self {
            per_ground_station: vec![BTreeSet::new(); num_ground_stations],
        }
    }

    /// Fold one forwarding record into the set.
    ///
    /// Returns `true` when membership changed.
    pub fn observe(
        &mut self,
        layout: &NodeLayout,
        current: NodeId,
        target: NodeId,
        hop: &NextHop,
    ) -> bool {
        if !layout.is_satellite(current) {
            return false;
        }
        let Some(gs) = layout.gs_index(target) else {
            return false;
        };
        let Some(members) = self.per_ground_station.get_mut(gs) else {
            return false;
        };
        if hop.next_node() == Some(target) {
            members.insert(current)
        } else {
            members.remove(&current)
        }
    }

    pub fn access_points(&self, gs_index: usize) -> impl Iterator<Item = NodeId> + '_ {
        self.per_ground_station
            .get(gs_index)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn is_access_point(&self, satellite: NodeId, gs_index: usize) -> bool {
        self.per_ground_station
            .get(gs_index)
            .is_some_and(|set| set.contains(&satellite))
    }

    /// Ground stations that `satellite` currently serves
    pub fn served_by(&self, satellite: NodeId) -> impl Iterator<Item = usize> + '_ {
        self.per_ground_station
            .iter()
            .enumerate()
            .filter(move |(_, set)| set.contains(&satellite))
            .map(|(gs, _)| gs)
    }

    pub fn num_ground_stations(&self) -> usize {
        self.per_ground_station.len()
    }
}
