//! Link devices and the fixed four-way neighbourhood of a satellite

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::geometry::Step;
use crate::identity::NodeId;

/// One of the four inter-satellite link directions.
///
/// The discriminant is the slot index in a [`NeighborSet`]. Left and right
/// cross orbital planes (alpha), up and down move along the plane (gamma).
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Direction {
    #[display("left")]
    Left = 0,
    #[display("down")]
    Down = 1,
    #[display("up")]
    Up = 2,
    #[display("right")]
    Right = 3,
}

impl Direction {
    /// All directions in slot order
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Down,
        Direction::Up,
        Direction::Right,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn from_slot(slot: usize) -> Option<Self> {
        Self::ALL.get(slot).copied()
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Cross-plane move for an alpha step, if any
    pub fn along_alpha(step: Step) -> Option<Self> {
        match step {
            Step::Increase => Some(Direction::Right),
            Step::Decrease => Some(Direction::Left),
            Step::Hold => None,
        }
    }

    /// In-plane move for a gamma step, if any
    pub fn along_gamma(step: Step) -> Option<Self> {
        match step {
            Step::Increase => Some(Direction::Up),
            Step::Decrease => Some(Direction::Down),
            Step::Hold => None,
        }
    }

    pub fn is_cross_plane(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// A neighbour reachable in one hop over a fixed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborSlot {
    pub node: NodeId,
    pub local_if: u32,
    pub remote_if: u32,
}

impl NeighborSlot {
    pub fn new(node: NodeId, local_if: u32, remote_if: u32) -> Self {
        Self {
            node,
            local_if,
            remote_if,
        }
    }
}

/// The four inter-satellite neighbours of a satellite.
///
/// Adjacency never changes over a node's lifetime; only the geometry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborSet {
    slots: [NeighborSlot; 4],
}

impl NeighborSet {
    /// Slots must be given in [`Direction::ALL`] order
    pub fn new(slots: [NeighborSlot; 4]) -> Self {
        Self { slots }
    }

    pub fn get(&self, direction: Direction) -> &NeighborSlot {
        &self.slots[direction.slot()]
    }

    /// Direction whose link leaves through `local_if`
    pub fn direction_of_port(&self, local_if: u32) -> Option<Direction> {
        self.iter()
            .find(|(_, slot)| slot.local_if == local_if)
            .map(|(direction, _)| direction)
    }

    /// Direction that leads to `node`
    pub fn direction_of_node(&self, node: NodeId) -> Option<Direction> {
        self.iter()
            .find(|(_, slot)| slot.node == node)
            .map(|(direction, _)| direction)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &NeighborSlot)> {
        Direction::ALL.into_iter().zip(self.slots.iter())
    }
}

/// Kind of network device behind an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// Ground-to-satellite link
    Gsl,
    /// Point-to-point laser link wired to `peer`'s `peer_interface`
    Isl { peer: NodeId, peer_interface: u32 },
    /// Anything else (loopback, management)
    Other,
}

impl Device {
    pub fn is_gsl(&self) -> bool {
        matches!(self, Device::Gsl)
    }

    pub fn is_isl(&self) -> bool {
        matches!(self, Device::Isl { .. })
    }
}

/// Read-only view of the devices installed on every node
pub trait InterfaceCatalog: Send + Sync {
    /// Number of interfaces on `node`
    fn interface_count(&self, node: NodeId) -> usize;

    /// Device behind `interface` on `node`, if the interface exists
    fn device(&self, node: NodeId, interface: u32) -> Option<Device>;
}
