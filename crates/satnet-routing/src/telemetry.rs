//! Neighbour queue-distance telemetry
//!
//! Every data-plane frame may carry a [`TelemetrySidecar`] describing the
//! sender's congestion toward one ground station (or all of them in batched
//! mode). The receiver files the value under the interface the frame came
//! in on, where the backpressure arbiter picks it up for its next decision.

use dashmap::DashMap;
use satnet_core::{Direction, NeighborSet, NodeId, TelemetrySidecar};
use tracing::trace;

/// Last distances reported by each neighbour, keyed by `(local_if, flow_id)`
#[derive(Debug)]
pub struct NeighborTelemetryExchange {
    node: NodeId,
    neighbors: NeighborSet,
    reported: DashMap<(u32, u32), u64>,
}

impl NeighborTelemetryExchange {
    pub fn new(node: NodeId, neighbors: NeighborSet) -> Self {
        Self {
            node,
            neighbors,
            reported: DashMap::new(),
        }
    }

    /// Record a sidecar that arrived on `local_if`
    pub fn ingest(&self, local_if: u32, sidecar: &TelemetrySidecar) {
        match sidecar {
            TelemetrySidecar::Flow { flow_id, distance } => {
                trace!(
                    node = %self.node,
                    local_if,
                    flow_id,
                    distance,
                    "Neighbour queue distance"
                );
                self.reported.insert((local_if, *flow_id), *distance);
            }
            TelemetrySidecar::Vector(vector) => {
                trace!(node = %self.node, local_if, flows = vector.len(), "Neighbour queue vector");
                for (flow, distance) in vector.iter() {
                    self.reported.insert((local_if, flow as u32), distance);
                }
            }
        }
    }

    /// Last distance reported on `local_if` for `flow_id`; zero if none yet
    pub fn reported(&self, local_if: u32, flow_id: u32) -> u64 {
        self.reported
            .get(&(local_if, flow_id))
            .map(|entry| *entry)
            .unwrap_or(0)
    }

    /// Last distance reported by the neighbour in `direction`
    pub fn reported_for(&self, direction: Direction, flow_id: u32) -> u64 {
        self.reported(self.neighbors.get(direction).local_if, flow_id)
    }

    pub fn neighbors(&self) -> &NeighborSet {
        &self.neighbors
    }

    pub fn len(&self) -> usize {
        self.reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use satnet_core::{NeighborSlot, QueueDistanceVector};

    use super::*;

    // B's four neighbours; A (node 7) sits on the right, local port 3
    fn exchange() -> NeighborTelemetryExchange {
        NeighborTelemetryExchange::new(
            NodeId(1),
            NeighborSet::new([
                NeighborSlot::new(NodeId(4), 0, 3),
                NeighborSlot::new(NodeId(2), 1, 2),
                NeighborSlot::new(NodeId(3), 2, 1),
                NeighborSlot::new(NodeId(7), 3, 0),
            ]),
        )
    }

    #[test]
    fn test_flow_sidecar_updates_incoming_interface() {
        let b = exchange();
        b.ingest(
            3,
            &TelemetrySidecar::Flow {
                flow_id: 5,
                distance: 120,
            },
        );
        assert_eq!(b.reported(3, 5), 120);
        assert_eq!(b.reported_for(Direction::Right, 5), 120);
        assert_eq!(b.reported(0, 5), 0);
        assert_eq!(b.reported(3, 4), 0);
    }

    #[test]
    fn test_later_report_overwrites() {
        let b = exchange();
        for distance in [10, 30, 20] {
            b.ingest(
                1,
                &TelemetrySidecar::Flow {
                    flow_id: 0,
                    distance,
                },
            );
        }
        assert_eq!(b.reported_for(Direction::Down, 0), 20);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_vector_sidecar_updates_every_flow() {
        let b = exchange();
        let vector = QueueDistanceVector::from_vec(vec![4, 0, 9]);
        b.ingest(2, &TelemetrySidecar::Vector(vector));
        assert_eq!(b.reported_for(Direction::Up, 0), 4);
        assert_eq!(b.reported_for(Direction::Up, 2), 9);
        assert_eq!(b.len(), 3);
    }
}
