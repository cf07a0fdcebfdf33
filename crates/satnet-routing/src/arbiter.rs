//! Node-level forwarding arbiters
//!
//! Each node gets exactly one [`Arbiter`], picked at construction time from
//! the configured [`RoutingScheme`]. Ground stations always follow their
//! forwarding table.

use std::sync::Arc;

use satnet_core::{
    NeighborSet, NextHopEntry, NodeId, NodeLayout, PacketSidecar, PhaseOracle, PositionOracle,
    SimTime, TelemetrySidecar, TorusDims,
};
use tracing::debug;

use crate::access::DestinationSatelliteSet;
use crate::backpressure::{BackpressureArbiter, PermittedRegion};
use crate::config::{RoutingConfig, RoutingScheme};
use crate::error::{RoutingError, RoutingResult};
use crate::geographic::{GeographicArbiter, TorusNavigator};
use crate::registry::SharedPhaseRegistry;
use crate::store::ForwardingStateStore;

/// Inputs to one forwarding decision
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub source: NodeId,
    pub target: NodeId,
    pub at: SimTime,
    pub sidecar: Option<&'a PacketSidecar>,
}

impl<'a> DecisionRequest<'a> {
    pub fn new(source: NodeId, target: NodeId, at: SimTime) -> Self {
        Self {
            source,
            target,
            at,
            sidecar: None,
        }
    }

    pub fn with_sidecar(mut self, sidecar: &'a PacketSidecar) -> Self {
        self.sidecar = Some(sidecar);
        self
    }
}

/// Follows the forwarding table, auditing hops against the permitted region
pub struct StaticArbiter {
    node: NodeId,
    store: Arc<ForwardingStateStore>,
    positions: Option<Arc<dyn PositionOracle>>,
}

impl StaticArbiter {
    pub fn new(
        node: NodeId,
        store: Arc<ForwardingStateStore>,
        positions: Option<Arc<dyn PositionOracle>>,
    ) -> Self {
        Self {
            node,
            store,
            positions,
        }
    }

    pub fn decide(&self, request: &DecisionRequest<'_>) -> RoutingResult<NextHopEntry> {
        let table = self
            .store
            .current()
            .ok_or(RoutingError::NotLoaded(self.node))?;
        let entry = NextHopEntry::new(request.target, table.lookup(request.target));

        if let (Some(oracle), Some(next)) = (&self.positions, entry.hop.next_node())
            && let (Some(src), Some(dst), Some(hop)) = (
                oracle.position(request.source, request.at),
                oracle.position(request.target, request.at),
                oracle.position(next, request.at),
            )
            && !PermittedRegion::spanning(src, dst).contains(hop)
        {
            debug!(
                node = %self.node,
                source = %request.source,
                target = %request.target,
                next_hop = %next,
                "Next hop outside permitted region"
            );
        }
        Ok(entry)
    }
}

/// The forwarding strategy of one node
pub enum Arbiter {
    StaticSnapshot(StaticArbiter),
    Geographic(GeographicArbiter),
    Backpressure(BackpressureArbiter),
}

impl Arbiter {
    pub fn scheme(&self) -> RoutingScheme {
        match self {
            Arbiter::StaticSnapshot(_) => RoutingScheme::StaticSnapshot,
            Arbiter::Geographic(_) => RoutingScheme::Geographic,
            Arbiter::Backpressure(_) => RoutingScheme::Backpressure,
        }
    }

    pub fn store(&self) -> &Arc<ForwardingStateStore> {
        match self {
            Arbiter::StaticSnapshot(a) => &a.store,
            Arbiter::Geographic(a) => a.store(),
            Arbiter::Backpressure(a) => a.store(),
        }
    }

    /// Forwarding decision for one packet
    pub fn decide(&self, request: &DecisionRequest<'_>) -> RoutingResult<NextHopEntry> {
        match self {
            Arbiter::StaticSnapshot(a) => a.decide(request),
            Arbiter::Geographic(a) => {
                let header = request.sidecar.and_then(|s| s.geo.as_ref());
                a.decide(request.target, header)
            }
            Arbiter::Backpressure(a) => a.decide(request.source, request.target, request.at),
        }
    }

    /// Receive the access-satellite set broadcast after a reload
    pub fn apply_access(&mut self, access: Arc<DestinationSatelliteSet>) {
        if let Arbiter::Backpressure(a) = self {
            a.set_access(access);
        }
    }

    /// Refresh the node's phase; only geographic arbiters track one
    pub fn update_phase(&mut self, oracle: &dyn PhaseOracle, at: SimTime) -> RoutingResult<()> {
        if let Arbiter::Geographic(a) = self {
            a.update_phase(oracle, at)?;
        }
        Ok(())
    }

    /// A packet for `target` was queued at this node
    pub fn on_enqueue(&mut self, target: NodeId) {
        if let Arbiter::Backpressure(a) = self {
            a.on_enqueue(target);
        }
    }

    /// A packet for `target` was sent from this node
    pub fn on_dequeue(&mut self, target: NodeId) {
        if let Arbiter::Backpressure(a) = self {
            a.on_dequeue(target);
        }
    }

    /// A frame arrived on `local_if` carrying telemetry
    pub fn ingest_telemetry(&self, local_if: u32, sidecar: &TelemetrySidecar) {
        if let Arbiter::Backpressure(a) = self {
            a.on_telemetry(local_if, sidecar);
        }
    }

    /// Telemetry to attach to a frame carrying a packet for `target`
    pub fn outgoing_telemetry(&self, target: NodeId) -> Option<TelemetrySidecar> {
        match self {
            Arbiter::Backpressure(a) => a.outgoing_telemetry(target),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node = self.store().owner();
        write!(f, "Arbiter::{:?}({})", self.scheme(), node)
    }
}

/// Builds the arbiter of every node from one configuration
pub struct ArbiterFactory {
    layout: NodeLayout,
    config: RoutingConfig,
    positions: Option<Arc<dyn PositionOracle>>,
    registry: Arc<SharedPhaseRegistry>,
}

impl ArbiterFactory {
    pub fn new(layout: NodeLayout, config: RoutingConfig) -> Self {
        let registry = SharedPhaseRegistry::new(layout.num_satellites() as usize);
        Self {
            layout,
            config,
            positions: None,
            registry,
        }
    }

    pub fn with_positions(mut self, positions: Arc<dyn PositionOracle>) -> Self {
        self.positions = Some(positions);
        self
    }

    pub fn registry(&self) -> &Arc<SharedPhaseRegistry> {
        &self.registry
    }

    pub fn dims(&self) -> TorusDims {
        TorusDims::new(
            self.layout.num_orbits,
            self.layout.sats_per_orbit,
            self.config.cell_scale,
        )
    }

    /// Arbiter for `node`; satellites need their neighbour set under the
    /// geographic and backpressure schemes
    pub fn build(
        &self,
        node: NodeId,
        neighbors: Option<NeighborSet>,
        store: Arc<ForwardingStateStore>,
    ) -> RoutingResult<Arbiter> {
        if !self.layout.contains(node) {
            return Err(RoutingError::UnknownNode(node));
        }
        if self.layout.is_ground_station(node) || self.config.scheme == RoutingScheme::StaticSnapshot {
            return Ok(Arbiter::StaticSnapshot(StaticArbiter::new(
                node,
                store,
                self.positions.clone(),
            )));
        }

        let neighbors = neighbors.ok_or_else(|| {
            RoutingError::Config(format!("satellite {} has no neighbour set", node))
        })?;

        match self.config.scheme {
            RoutingScheme::Geographic => Ok(Arbiter::Geographic(GeographicArbiter::new(
                node,
                self.layout,
                neighbors,
                TorusNavigator::from_config(self.dims(), &self.config),
                store,
                self.registry.attach(node),
            ))),
            RoutingScheme::Backpressure => Ok(Arbiter::Backpressure(
                BackpressureArbiter::new(node, self.layout, neighbors, store, self.positions.clone())
                    .with_batched_telemetry(self.config.batched_telemetry),
            )),
            RoutingScheme::StaticSnapshot => Ok(Arbiter::StaticSnapshot(StaticArbiter::new(
                node,
                store,
                self.positions.clone(),
            ))),
        }
    }
}
