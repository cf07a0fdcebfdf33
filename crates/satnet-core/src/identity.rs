//! Node identities and constellation layout
//!
//! Satellites are numbered first (`0..orbits * sats_per_orbit`), followed by
//! a fixed-size block of ground stations. [`NodeLayout`] owns that numbering
//! and converts between node ids, ground-station indices and torus slots.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier of a satellite or ground station
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("{_0}")]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Whether a node is in orbit or on the ground
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    #[display("satellite")]
    Satellite,
    #[display("ground_station")]
    GroundStation,
}

/// Numbering of a constellation: satellites first, then ground stations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLayout {
    pub num_orbits: u32,
    pub sats_per_orbit: u32,
    pub num_ground_stations: u32,
}

impl NodeLayout {
    pub fn new(num_orbits: u32, sats_per_orbit: u32, num_ground_stations: u32) -> Self {
        Self {
            num_orbits,
            sats_per_orbit,
            num_ground_stations,
        }
    }

    /// Number of satellites in the shell
    pub fn num_satellites(&self) -> u32 {
        self.num_orbits * self.sats_per_orbit
    }

    /// Total number of nodes, satellites and ground stations
    pub fn num_nodes(&self) -> u32 {
        self.num_satellites() + self.num_ground_stations
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < self.num_nodes()
    }

    pub fn is_satellite(&self, node: NodeId) -> bool {
        node.0 < self.num_satellites()
    }

    pub fn is_ground_station(&self, node: NodeId) -> bool {
        !self.is_satellite(node) && self.contains(node)
    }

    pub fn role(&self, node: NodeId) -> NodeRole {
        if self.is_satellite(node) {
            NodeRole::Satellite
        } else {
            NodeRole::GroundStation
        }
    }

    /// Position of a ground station inside the ground-station block
    pub fn gs_index(&self, node: NodeId) -> Option<usize> {
        if self.is_ground_station(node) {
            Some((node.0 - self.num_satellites()) as usize)
        } else {
            None
        }
    }

    /// Node id of the `index`-th ground station
    pub fn gs_node(&self, index: usize) -> Option<NodeId> {
        if index < self.num_ground_stations as usize {
            Some(NodeId(self.num_satellites() + index as u32))
        } else {
            None
        }
    }

    /// Orbit and in-orbit slot of a satellite
    pub fn orbit_slot(&self, node: NodeId) -> Option<(u32, u32)> {
        if self.is_satellite(node) && self.sats_per_orbit > 0 {
            Some((node.0 / self.sats_per_orbit, node.0 % self.sats_per_orbit))
        } else {
            None
        }
    }

    /// Satellite at `(orbit, slot)`, both wrapped onto the torus
    pub fn satellite_at(&self, orbit: i64, slot: i64) -> NodeId {
        let orbit = orbit.rem_euclid(self.num_orbits as i64) as u32;
        let slot = slot.rem_euclid(self.sats_per_orbit as i64) as u32;
        NodeId(orbit * self.sats_per_orbit + slot)
    }

    pub fn satellites(&self) -> impl Iterator<Item = NodeId> {
        (0..self.num_satellites()).map(NodeId)
    }

    pub fn ground_stations(&self) -> impl Iterator<Item = NodeId> {
        (self.num_satellites()..self.num_nodes()).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.num_nodes()).map(NodeId)
    }

    /// Range-check a raw node id taken from an external record
    pub fn check_node(&self, raw: i64) -> Result<NodeId, ValidationError> {
        if raw < 0 || raw >= self.num_nodes() as i64 {
            return Err(ValidationError::NodeOutOfRange {
                node: raw,
                min: 0,
                max: self.num_nodes() as i64,
            });
        }
        Ok(NodeId(raw as u32))
    }
}

/// Simulated time in nanoseconds
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[display("{_0}ns")]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e9).round().max(0.0) as u64)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn saturating_add(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }
}
