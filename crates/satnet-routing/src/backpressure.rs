//! Congestion-adaptive forwarding
//!
//! A satellite that is not directly attached to the destination ground
//! station looks at its four neighbours and sends the packet to the one
//! reporting the lowest queue-distance toward that ground station. A
//! neighbour that would take the packet outside the rectangle spanned by
//! the source and destination positions is only used when every neighbour
//! is outside it.
//!
//! ## Core Components
//!
//! - [`QueueLedger`]: per-ground-station queue counters of this node
//! - [`PermittedRegion`]: the source/destination rectangle, antimeridian aware
//! - [`BackpressureArbiter`]: the decision itself

use std::cmp::Ordering;
use std::sync::Arc;

use satnet_core::{
    Direction, GeoPosition, NeighborSet, NextHop, NextHopEntry, NodeId, NodeLayout,
    PositionOracle, QueueDistanceVector, SimTime, TelemetrySidecar,
};
use tracing::{debug, trace};

use crate::access::DestinationSatelliteSet;
use crate::error::{RoutingError, RoutingResult};
use crate::store::{ForwardingStateStore, ForwardingTable};
use crate::telemetry::NeighborTelemetryExchange;

/// Packets queued at this node, per destination ground station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLedger {
    node: NodeId,
    counts: Vec<u64>,
}

impl QueueLedger {
    pub fn new(node: NodeId, num_ground_stations: usize) -> Self {
        Self {
            node,
            counts: vec![0; num_ground_stations],
        }
    }

    /// A packet for `gs_index` was queued for egress
    pub fn enqueue(&mut self, gs_index: usize) {
        if let Some(count) = self.counts.get_mut(gs_index) {
            *count += 1;
        }
    }

    /// A packet for `gs_index` left the queue; never goes below zero
    pub fn dequeue(&mut self, gs_index: usize) {
        if let Some(count) = self.counts.get_mut(gs_index) {
            if *count == 0 {
                debug!(node = %self.node, gs_index, "Queue counter already zero on dequeue");
            } else {
                *count -= 1;
            }
        }
    }

    pub fn count(&self, gs_index: usize) -> u64 {
        self.counts.get(gs_index).copied().unwrap_or(0)
    }

    /// Queue length scaled by the distance weight toward the ground station
    pub fn queue_distance(&self, gs_index: usize, weight: u32) -> u64 {
        self.count(gs_index).saturating_mul(weight as u64)
    }
}

/// Latitude/longitude rectangle between a source and a destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermittedRegion {
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    across_antimeridian: bool,
}

impl PermittedRegion {
    /// Rectangle spanned by `a` and `b`.
    ///
    /// When the two longitudes have opposite signs the shorter arc between
    /// them crosses either the prime meridian or the antimeridian; in the
    /// latter case the longitude band wraps around 180.
    pub fn spanning(a: GeoPosition, b: GeoPosition) -> Self {
        let opposite_signs = (a.lon_deg < 0.0) != (b.lon_deg < 0.0);
        let through_zero = a.lon_deg.abs() + b.lon_deg.abs() <= 180.0;
        Self {
            lat_min: a.lat_deg.min(b.lat_deg),
            lat_max: a.lat_deg.max(b.lat_deg),
            lon_min: a.lon_deg.min(b.lon_deg),
            lon_max: a.lon_deg.max(b.lon_deg),
            across_antimeridian: opposite_signs && !through_zero,
        }
    }

    pub fn contains(&self, p: GeoPosition) -> bool {
        let lat_ok = p.lat_deg >= self.lat_min && p.lat_deg <= self.lat_max;
        let lon_ok = if self.across_antimeridian {
            p.lon_deg <= self.lon_min || p.lon_deg >= self.lon_max
        } else {
            p.lon_deg >= self.lon_min && p.lon_deg <= self.lon_max
        };
        lat_ok && lon_ok
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.across_antimeridian
    }
}

/// A neighbour under evaluation
#[derive(Debug, Clone, Copy)]
struct Candidate {
    direction: Direction,
    queue_distance: u64,
    remaining_deg: f64,
    in_region: bool,
}

impl Candidate {
    fn rank(&self, other: &Candidate) -> Ordering {
        self.queue_distance
            .cmp(&other.queue_distance)
            .then(self.remaining_deg.total_cmp(&other.remaining_deg))
            .then(self.direction.cmp(&other.direction))
    }
}

/// Per-satellite backpressure arbiter
pub struct BackpressureArbiter {
    node: NodeId,
    layout: NodeLayout,
    neighbors: NeighborSet,
    store: Arc<ForwardingStateStore>,
    positions: Option<Arc<dyn PositionOracle>>,
    ledger: QueueLedger,
    telemetry: NeighborTelemetryExchange,
    access: Arc<DestinationSatelliteSet>,
    batched: bool,
}

impl BackpressureArbiter {
    pub fn new(
        node: NodeId,
        layout: NodeLayout,
        neighbors: NeighborSet,
        store: Arc<ForwardingStateStore>,
        positions: Option<Arc<dyn PositionOracle>>,
    ) -> Self {
        let num_gs = layout.num_ground_stations as usize;
        Self {
            node,
            layout,
            neighbors,
            store,
            positions,
            ledger: QueueLedger::new(node, num_gs),
            telemetry: NeighborTelemetryExchange::new(node, neighbors),
            access: Arc::new(DestinationSatelliteSet::new(num_gs)),
            batched: false,
        }
    }

    /// Piggyback the full vector instead of a single flow
    pub fn with_batched_telemetry(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn store(&self) -> &Arc<ForwardingStateStore> {
        &self.store
    }

    pub fn ledger(&self) -> &QueueLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut QueueLedger {
        &mut self.ledger
    }

    pub fn telemetry(&self) -> &NeighborTelemetryExchange {
        &self.telemetry
    }

    pub fn access(&self) -> &DestinationSatelliteSet {
        &self.access
    }

    pub fn set_access(&mut self, access: Arc<DestinationSatelliteSet>) {
        self.access = access;
    }

    /// Forwarding decision for a packet from `source` to `target` at `at`
    pub fn decide(&self, source: NodeId, target: NodeId, at: SimTime) -> RoutingResult<NextHopEntry> {
        let table = self
            .store
            .current()
            .ok_or(RoutingError::NotLoaded(self.node))?;

        let Some(gs_index) = self.layout.gs_index(target) else {
            trace!(node = %self.node, target = %target, "Satellite-addressed packet dropped");
            return Ok(NextHopEntry::dropped(target));
        };

        let baseline = NextHopEntry::new(target, table.lookup(target));
        // a table drop is re-routed through the neighbours like any other entry
        if baseline.is_direct() || self.access.is_access_point(self.node, gs_index) {
            return Ok(baseline);
        }

        let region = self.region(source, target, at);
        let dest_pos = self.position(target, at);
        let candidates: Vec<Candidate> = self
            .neighbors
            .iter()
            .map(|(direction, slot)| {
                let pos = self.position(slot.node, at);
                Candidate {
                    direction,
                    queue_distance: self.telemetry.reported_for(direction, gs_index as u32),
                    remaining_deg: match (pos, dest_pos) {
                        (Some(p), Some(d)) => p.angular_distance_deg(&d),
                        _ => f64::INFINITY,
                    },
                    in_region: match (region, pos) {
                        (Some(r), Some(p)) => r.contains(p),
                        (Some(_), None) => false,
                        (None, _) => true,
                    },
                }
            })
            .collect();

        let best = candidates
            .iter()
            .filter(|c| c.in_region)
            .min_by(|a, b| a.rank(b))
            .or_else(|| {
                debug!(
                    node = %self.node,
                    source = %source,
                    target = %target,
                    "No neighbour inside permitted region, using global minimum"
                );
                candidates.iter().min_by(|a, b| a.rank(b))
            });

        let Some(best) = best else {
            return Ok(baseline);
        };
        let slot = self.neighbors.get(best.direction);
        trace!(
            node = %self.node,
            target = %target,
            direction = %best.direction,
            queue_distance = best.queue_distance,
            "Backpressure choice"
        );
        Ok(NextHopEntry::new(
            target,
            NextHop::forward(slot.node, slot.local_if, slot.remote_if),
        ))
    }

    /// Account for a packet queued toward `target`
    pub fn on_enqueue(&mut self, target: NodeId) {
        if let Some(gs) = self.layout.gs_index(target) {
            self.ledger.enqueue(gs);
        }
    }

    /// Account for a packet toward `target` leaving the queue
    pub fn on_dequeue(&mut self, target: NodeId) {
        if let Some(gs) = self.layout.gs_index(target) {
            self.ledger.dequeue(gs);
        }
    }

    /// File a telemetry sidecar that arrived on `local_if`
    pub fn on_telemetry(&self, local_if: u32, sidecar: &TelemetrySidecar) {
        self.telemetry.ingest(local_if, sidecar);
    }

    /// This node's queue-distance toward ground station `gs_index`
    pub fn queue_distance(&self, gs_index: usize) -> u64 {
        let weight = self
            .store
            .current()
            .and_then(|t| self.weight(&t, gs_index))
            .unwrap_or(1);
        self.ledger.queue_distance(gs_index, weight)
    }

    /// Sidecar to piggyback on a frame carrying a packet for `target`
    pub fn outgoing_telemetry(&self, target: NodeId) -> Option<TelemetrySidecar> {
        if self.batched {
            let values = (0..self.layout.num_ground_stations as usize)
                .map(|gs| self.queue_distance(gs))
                .collect();
            return Some(TelemetrySidecar::Vector(QueueDistanceVector::from_vec(values)));
        }
        let gs = self.layout.gs_index(target)?;
        Some(TelemetrySidecar::Flow {
            flow_id: gs as u32,
            distance: self.queue_distance(gs),
        })
    }

    fn weight(&self, table: &ForwardingTable, gs_index: usize) -> Option<u32> {
        self.layout
            .gs_node(gs_index)
            .and_then(|gs| table.distance(gs))
    }

    fn position(&self, node: NodeId, at: SimTime) -> Option<GeoPosition> {
        self.positions.as_ref().and_then(|p| p.position(node, at))
    }

    fn region(&self, source: NodeId, target: NodeId, at: SimTime) -> Option<PermittedRegion> {
        Some(PermittedRegion::spanning(
            self.position(source, at)?,
            self.position(target, at)?,
        ))
    }
}

impl std::fmt::Debug for BackpressureArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureArbiter")
            .field("node", &self.node)
            .field("ledger", &self.ledger)
            .field("batched", &self.batched)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use satnet_core::NeighborSlot;

    use super::*;

    #[test]
    fn test_ledger_floors_at_zero() {
        let mut ledger = QueueLedger::new(NodeId(0), 2);
        ledger.dequeue(0);
        assert_eq!(ledger.count(0), 0);
        ledger.enqueue(0);
        ledger.enqueue(0);
        ledger.dequeue(0);
        assert_eq!(ledger.count(0), 1);
        assert_eq!(ledger.queue_distance(0, 7), 7);
        ledger.enqueue(9);
        assert_eq!(ledger.count(9), 0);
    }

    #[test]
    fn test_region_same_hemisphere() {
        let r = PermittedRegion::spanning(GeoPosition::new(10.0, 20.0), GeoPosition::new(40.0, 60.0));
        assert!(!r.crosses_antimeridian());
        assert!(r.contains(GeoPosition::new(20.0, 30.0)));
        assert!(!r.contains(GeoPosition::new(50.0, 30.0)));
        assert!(!r.contains(GeoPosition::new(20.0, 70.0)));
    }

    #[test]
    fn test_region_through_prime_meridian() {
        let r = PermittedRegion::spanning(GeoPosition::new(0.0, -30.0), GeoPosition::new(20.0, 40.0));
        assert!(!r.crosses_antimeridian());
        assert!(r.contains(GeoPosition::new(10.0, 0.0)));
        assert!(!r.contains(GeoPosition::new(10.0, 170.0)));
    }

    #[test]
    fn test_region_through_antimeridian() {
        let r = PermittedRegion::spanning(GeoPosition::new(0.0, 170.0), GeoPosition::new(20.0, -160.0));
        assert!(r.crosses_antimeridian());
        assert!(r.contains(GeoPosition::new(10.0, 179.0)));
        assert!(r.contains(GeoPosition::new(10.0, -175.0)));
        assert!(!r.contains(GeoPosition::new(10.0, 0.0)));
        assert!(!r.contains(GeoPosition::new(30.0, 179.0)));
    }

    struct FixedPositions(HashMap<NodeId, GeoPosition>);

    impl PositionOracle for FixedPositions {
        fn position(&self, node: NodeId, _at: SimTime) -> Option<GeoPosition> {
            self.0.get(&node).copied()
        }
    }

    // Satellite 0 of a 3x3 shell with one ground station (node 9)
    fn layout() -> NodeLayout {
        NodeLayout::new(3, 3, 1)
    }

    fn neighbors() -> NeighborSet {
        NeighborSet::new([
            NeighborSlot::new(NodeId(6), 0, 3),
            NeighborSlot::new(NodeId(2), 1, 2),
            NeighborSlot::new(NodeId(1), 2, 1),
            NeighborSlot::new(NodeId(3), 3, 0),
        ])
    }

    fn store(line: &str) -> Arc<ForwardingStateStore> {
        let store = Arc::new(ForwardingStateStore::new(NodeId(0), layout()));
        let record = satnet_core::SnapshotRecord::parse_line(1, line).unwrap();
        let mut builder = store.stage();
        builder.set_hop(NodeId(9), record.hop().unwrap()).unwrap();
        if let Some(d) = record.distance {
            builder.set_distance(NodeId(9), d);
        }
        store.replace(builder.finish(SimTime::ZERO).unwrap());
        store
    }

    fn positions() -> Arc<dyn PositionOracle> {
        Arc::new(FixedPositions(HashMap::from([
            (NodeId(0), GeoPosition::new(0.0, 0.0)),
            (NodeId(9), GeoPosition::new(30.0, 30.0)),
            (NodeId(10), GeoPosition::new(-5.0, -5.0)),
            (NodeId(6), GeoPosition::new(0.0, -20.0)),
            (NodeId(2), GeoPosition::new(-20.0, 0.0)),
            (NodeId(1), GeoPosition::new(20.0, 0.0)),
            (NodeId(3), GeoPosition::new(0.0, 20.0)),
        ])))
    }

    fn report(arbiter: &BackpressureArbiter, local_if: u32, distance: u64) {
        arbiter.on_telemetry(
            local_if,
            &TelemetrySidecar::Flow {
                flow_id: 0,
                distance,
            },
        );
    }

    #[test]
    fn test_picks_lower_queue_distance_inside_region() {
        let arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1,3"), Some(positions()));
        // up (if 2) and right (if 3) are inside the region spanned by 0 and 9
        report(&arbiter, 2, 40);
        report(&arbiter, 3, 15);
        report(&arbiter, 0, 1);
        report(&arbiter, 1, 1);
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert_eq!(entry.hop, NextHop::forward(NodeId(3), 3, 0));
    }

    #[test]
    fn test_tie_goes_to_neighbor_closer_to_destination() {
        let positions: Arc<dyn PositionOracle> = Arc::new(FixedPositions(HashMap::from([
            (NodeId(0), GeoPosition::new(0.0, 0.0)),
            (NodeId(9), GeoPosition::new(30.0, 30.0)),
            (NodeId(1), GeoPosition::new(5.0, 1.0)),
            (NodeId(3), GeoPosition::new(10.0, 10.0)),
        ])));
        let arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1"), Some(positions));
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert_eq!(entry.hop.next_node(), Some(NodeId(3)));
    }

    #[test]
    fn test_falls_back_to_global_minimum_outside_region() {
        // source at 10 puts every neighbour outside the rectangle
        let positions: Arc<dyn PositionOracle> = Arc::new(FixedPositions(HashMap::from([
            (NodeId(9), GeoPosition::new(-1.0, -1.0)),
            (NodeId(10), GeoPosition::new(-2.0, -2.0)),
            (NodeId(6), GeoPosition::new(0.0, -20.0)),
            (NodeId(2), GeoPosition::new(-20.0, 0.0)),
            (NodeId(1), GeoPosition::new(20.0, 0.0)),
            (NodeId(3), GeoPosition::new(0.0, 20.0)),
        ])));
        let layout = NodeLayout::new(3, 3, 2);
        let store = Arc::new(ForwardingStateStore::new(NodeId(0), layout));
        let mut builder = store.stage();
        builder.set_entry(NodeId(9), 1, 2, 1).unwrap();
        builder.set_entry(NodeId(10), 1, 2, 1).unwrap();
        store.replace(builder.finish(SimTime::ZERO).unwrap());

        let arbiter = BackpressureArbiter::new(NodeId(0), layout, neighbors(), store, Some(positions));
        report(&arbiter, 0, 9);
        report(&arbiter, 1, 2);
        report(&arbiter, 2, 5);
        report(&arbiter, 3, 7);
        let entry = arbiter.decide(NodeId(10), NodeId(9), SimTime::ZERO).unwrap();
        assert_eq!(entry.hop.next_node(), Some(NodeId(2)));
    }

    #[test]
    fn test_direct_entry_is_kept() {
        let arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,9,4,0,1"), Some(positions()));
        report(&arbiter, 0, 0);
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert!(entry.is_direct());
    }

    #[test]
    fn test_access_point_keeps_table_entry() {
        let mut arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1"), Some(positions()));
        let mut access = DestinationSatelliteSet::new(1);
        access.observe(&layout(), NodeId(0), NodeId(9), &NextHop::forward(NodeId(9), 4, 0));
        arbiter.set_access(Arc::new(access));
        report(&arbiter, 3, 0);
        report(&arbiter, 2, 50);
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert_eq!(entry.hop, NextHop::forward(NodeId(1), 2, 1));
    }

    #[test]
    fn test_table_drop_is_rerouted() {
        let arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,-1,-1,-1"), Some(positions()));
        report(&arbiter, 2, 30);
        report(&arbiter, 3, 4);
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert!(!entry.is_drop());
        assert_eq!(entry.hop, NextHop::forward(NodeId(3), 3, 0));
    }

    #[test]
    fn test_satellite_target_dropped() {
        let arbiter = BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1"), None);
        assert!(arbiter.decide(NodeId(0), NodeId(4), SimTime::ZERO).unwrap().is_drop());
    }

    #[test]
    fn test_without_positions_every_neighbor_is_permitted() {
        let arbiter = BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1"), None);
        report(&arbiter, 0, 3);
        report(&arbiter, 1, 8);
        report(&arbiter, 2, 8);
        report(&arbiter, 3, 8);
        let entry = arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO).unwrap();
        assert_eq!(entry.hop.next_node(), Some(NodeId(6)));
    }

    #[test]
    fn test_outgoing_telemetry_scales_by_weight() {
        let mut arbiter =
            BackpressureArbiter::new(NodeId(0), layout(), neighbors(), store("0,9,1,2,1,3"), None);
        arbiter.on_enqueue(NodeId(9));
        arbiter.on_enqueue(NodeId(9));
        arbiter.on_enqueue(NodeId(4));
        assert_eq!(
            arbiter.outgoing_telemetry(NodeId(9)),
            Some(TelemetrySidecar::Flow {
                flow_id: 0,
                distance: 6
            })
        );
        arbiter.on_dequeue(NodeId(9));
        let batched = arbiter.with_batched_telemetry(true);
        assert_eq!(
            batched.outgoing_telemetry(NodeId(9)),
            Some(TelemetrySidecar::Vector(QueueDistanceVector::from_vec(vec![3])))
        );
    }

    #[test]
    fn test_decide_before_load() {
        let arbiter = BackpressureArbiter::new(
            NodeId(0),
            layout(),
            neighbors(),
            Arc::new(ForwardingStateStore::new(NodeId(0), layout())),
            None,
        );
        assert!(matches!(
            arbiter.decide(NodeId(0), NodeId(9), SimTime::ZERO),
            Err(RoutingError::NotLoaded(_))
        ));
    }
}
