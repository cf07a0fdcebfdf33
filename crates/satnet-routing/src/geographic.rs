//! Greedy torus forwarding on in-band destination cells
//!
//! A satellite knows only its own phase. The destination ground station's
//! cells travel with the packet in a [`GeoHeader`]; every hop moves the
//! packet to the neighbour that brings it closer on the torus.
//!
//! ## Step rule
//!
//! Distances are compared lexicographically, alpha first:
//!
//! - a cross-plane move (left/right) is taken only if it strictly shortens
//!   the alpha distance
//! - an in-plane move (up/down) is taken only if it strictly shortens the
//!   gamma distance
//!
//! Each hop therefore strictly decreases `(alpha distance, gamma distance)`,
//! so a packet never revisits a satellite and the walk ends after at most
//! `orbits + sats_per_orbit` hops. When no neighbour is closer the packet is
//! dropped.

use std::sync::Arc;

use satnet_core::{
    Cell, Direction, GeoHeader, NeighborSet, NextHop, NextHopEntry, NodeId, NodeLayout,
    OrbitalFeedError, PhaseOracle, PhasePair, SimTime, Step, TorusDims,
};
use tracing::{debug, trace};

use crate::config::RoutingConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::phase::OrbitalPhaseTracker;
use crate::registry::{pack_cell, SlotHandle};
use crate::store::ForwardingStateStore;

/// Result of one greedy step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreedyOutcome {
    /// Current cell is the destination cell
    Arrived,
    /// Forward to the neighbour in this direction
    Forward(Direction),
    /// No neighbour is closer to the destination
    Unreachable,
}

/// Pure greedy step on the routing torus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorusNavigator {
    dims: TorusDims,
    left_gamma_deg: f64,
    right_gamma_deg: f64,
}

impl TorusNavigator {
    pub fn new(dims: TorusDims, left_gamma_deg: f64, right_gamma_deg: f64) -> Self {
        Self {
            dims,
            left_gamma_deg,
            right_gamma_deg,
        }
    }

    pub fn from_config(dims: TorusDims, config: &RoutingConfig) -> Self {
        let (left, right) = config.neighbor_gamma_offsets(dims.sats_per_orbit);
        Self::new(dims, left, right)
    }

    pub fn dims(&self) -> &TorusDims {
        &self.dims
    }

    /// Phase of the neighbour in `direction`
    pub fn neighbor_phase(&self, phase: PhasePair, direction: Direction) -> PhasePair {
        let plane = self.dims.plane_spacing_deg();
        let slot = self.dims.slot_spacing_deg();
        match direction {
            Direction::Left => phase.offset(-plane, self.left_gamma_deg),
            Direction::Right => phase.offset(plane, self.right_gamma_deg),
            Direction::Up => phase.offset(0.0, slot),
            Direction::Down => phase.offset(0.0, -slot),
        }
    }

    pub fn neighbor_cell(&self, phase: PhasePair, direction: Direction) -> Cell {
        self.dims.cell_of(self.neighbor_phase(phase, direction))
    }

    /// Pick the ascending or descending representation needing fewer plane
    /// crossings; ties go to the ascending one.
    ///
    /// A representation outside the torus is never picked; `None` when
    /// neither fits.
    pub fn select_destination(&self, here: Cell, header: &GeoHeader) -> Option<Cell> {
        let base = self.dims.alpha_base();
        let crossings = |cell: &Cell| satnet_core::modular_distance(here.alpha, cell.alpha, base);
        [header.ascending(), header.descending()]
            .into_iter()
            .filter(|cell| self.dims.contains(*cell))
            .min_by_key(crossings)
    }

    /// Direction of the next hop from `phase` toward `dest`
    pub fn next_direction(&self, phase: PhasePair, dest: Cell) -> GreedyOutcome {
        let here = self.dims.cell_of(phase);
        if here == dest {
            return GreedyOutcome::Arrived;
        }

        if self.dims.in_window(here, dest) {
            let sa = self.dims.alpha_step(here, dest);
            let sg = self.dims.gamma_step(here, dest);
            for direction in window_preference(sa, sg) {
                if self.improves(phase, here, dest, *direction) {
                    return GreedyOutcome::Forward(*direction);
                }
            }
        }

        if let Some(direction) =
            self.best_of(phase, here, dest, [Direction::Right, Direction::Left])
        {
            return GreedyOutcome::Forward(direction);
        }
        if let Some(direction) = self.best_of(phase, here, dest, [Direction::Up, Direction::Down]) {
            return GreedyOutcome::Forward(direction);
        }
        GreedyOutcome::Unreachable
    }

    /// Of two opposite moves, the improving one that ends closer; the first wins ties
    fn best_of(
        &self,
        phase: PhasePair,
        here: Cell,
        dest: Cell,
        pair: [Direction; 2],
    ) -> Option<Direction> {
        pair.into_iter()
            .filter(|d| self.improves(phase, here, dest, *d))
            .min_by_key(|d| self.dims.distance(self.neighbor_cell(phase, *d), dest))
    }

    fn improves(&self, phase: PhasePair, here: Cell, dest: Cell, direction: Direction) -> bool {
        let now = self.dims.distance(here, dest);
        let next = self.dims.distance(self.neighbor_cell(phase, direction), dest);
        if direction.is_cross_plane() {
            next.alpha < now.alpha
        } else {
            next.alpha <= now.alpha && next.gamma < now.gamma
        }
    }
}

/// Order in which moves are tried when the destination is within one
/// satellite spacing. Diagonal targets prefer the move that does not undo
/// the dominant axis.
fn window_preference(sa: Step, sg: Step) -> &'static [Direction] {
    use Direction::*;
    match (sa, sg) {
        (Step::Hold, Step::Hold) => &[],
        (Step::Hold, Step::Increase) => &[Up],
        (Step::Hold, Step::Decrease) => &[Down],
        (Step::Increase, Step::Hold) => &[Right],
        (Step::Increase, Step::Increase) => &[Right, Up],
        (Step::Increase, Step::Decrease) => &[Down, Right],
        (Step::Decrease, Step::Hold) => &[Left],
        (Step::Decrease, Step::Increase) => &[Up, Left],
        (Step::Decrease, Step::Decrease) => &[Left, Down],
    }
}

/// Per-satellite geographic arbiter
#[derive(Debug)]
pub struct GeographicArbiter {
    node: NodeId,
    layout: NodeLayout,
    neighbors: NeighborSet,
    navigator: TorusNavigator,
    tracker: OrbitalPhaseTracker,
    store: Arc<ForwardingStateStore>,
    registry: Option<SlotHandle>,
}

impl GeographicArbiter {
    pub fn new(
        node: NodeId,
        layout: NodeLayout,
        neighbors: NeighborSet,
        navigator: TorusNavigator,
        store: Arc<ForwardingStateStore>,
        registry: Option<SlotHandle>,
    ) -> Self {
        let tracker = OrbitalPhaseTracker::new(node, *navigator.dims());
        Self {
            node,
            layout,
            neighbors,
            navigator,
            tracker,
            store,
            registry,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn store(&self) -> &Arc<ForwardingStateStore> {
        &self.store
    }

    pub fn tracker(&self) -> &OrbitalPhaseTracker {
        &self.tracker
    }

    pub fn navigator(&self) -> &TorusNavigator {
        &self.navigator
    }

    /// Recompute this satellite's phase and publish its cell
    pub fn update_phase(
        &mut self,
        oracle: &dyn PhaseOracle,
        at: SimTime,
    ) -> Result<Cell, OrbitalFeedError> {
        let phase = oracle.phase_at(self.node, at)?;
        Ok(self.set_phase(phase, at))
    }

    pub fn set_phase(&mut self, phase: PhasePair, at: SimTime) -> Cell {
        let cell = self.tracker.set_phase(phase, at);
        if let Some(slot) = &self.registry {
            slot.set(pack_cell(cell));
        }
        cell
    }

    /// Forwarding decision for a packet to `target` carrying `header`
    pub fn decide(&self, target: NodeId, header: Option<&GeoHeader>) -> RoutingResult<NextHopEntry> {
        let table = self
            .store
            .current()
            .ok_or(RoutingError::NotLoaded(self.node))?;
        let baseline = NextHopEntry::new(target, table.lookup(target));

        let hands_to_ground = baseline
            .hop
            .next_node()
            .is_some_and(|n| n == target || self.layout.is_ground_station(n));
        if hands_to_ground || !self.layout.is_ground_station(target) {
            return Ok(baseline);
        }

        let Some(header) = header else {
            trace!(node = %self.node, target = %target, "No geographic header, using table");
            return Ok(baseline);
        };
        if header.is_unreachable() {
            debug!(node = %self.node, target = %target, "Destination marked unreachable");
            return Ok(NextHopEntry::dropped(target));
        }
        let Some(phase) = self.tracker.phase() else {
            debug!(node = %self.node, "Phase unknown, using table");
            return Ok(baseline);
        };

        let here = self.navigator.dims().cell_of(phase);
        let Some(dest) = self.navigator.select_destination(here, header) else {
            debug!(
                node = %self.node,
                target = %target,
                header = ?header,
                "Header cells outside the torus"
            );
            return Ok(NextHopEntry::dropped(target));
        };
        match self.navigator.next_direction(phase, dest) {
            GreedyOutcome::Forward(direction) => {
                let slot = self.neighbors.get(direction);
                trace!(
                    node = %self.node,
                    target = %target,
                    here = %here,
                    dest = %dest,
                    direction = %direction,
                    "Greedy step"
                );
                Ok(NextHopEntry::new(
                    target,
                    NextHop::forward(slot.node, slot.local_if, slot.remote_if),
                ))
            }
            GreedyOutcome::Arrived => {
                debug!(
                    node = %self.node,
                    target = %target,
                    cell = %here,
                    "Reached destination cell without a ground link"
                );
                Ok(NextHopEntry::dropped(target))
            }
            GreedyOutcome::Unreachable => {
                debug!(
                    node = %self.node,
                    target = %target,
                    here = %here,
                    dest = %dest,
                    "No neighbour closer to destination"
                );
                Ok(NextHopEntry::dropped(target))
            }
        }
    }
}
