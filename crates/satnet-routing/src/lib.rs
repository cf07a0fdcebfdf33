//! # Satnet Routing
//!
//! Per-node forwarding arbiters for a LEO constellation.
//!
//! Every node owns a forwarding table that is reloaded from timestamped
//! snapshots. On top of that table a satellite runs one of three
//! strategies, chosen once for the whole constellation.
//!
//! ## Core Components
//!
//! - [`ForwardingStateStore`]: Versioned, atomically swapped next-hop table of one node
//! - [`StateReloadService`]: Validates snapshots and installs them on every node at once
//! - [`OrbitalPhaseTracker`]: Continuous phase and discrete cell of a satellite
//! - [`TorusNavigator`] / [`GeographicArbiter`]: Greedy walk on the phase torus
//! - [`BackpressureArbiter`]: Queue-distance driven forwarding with a permitted region
//! - [`NeighborTelemetryExchange`]: Queue-distances reported by the four neighbours
//! - [`SharedPhaseRegistry`]: Constellation-wide published cells
//! - [`Arbiter`]: The single decision interface a node calls per packet
//!
//! ## Routing Schemes
//!
//! 1. **STATIC**: Follow the loaded table verbatim
//! 2. **GEOGRAPHIC**: Walk toward the destination cell carried in the packet
//!    header; hand over to the table once the next hop is a ground link
//! 3. **BACKPRESSURE**: Pick the neighbour reporting the shortest queue-distance,
//!    preferring those inside the source/destination rectangle
//!
//! Ground stations always run the static scheme.
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_routing::{ArbiterFactory, DecisionRequest, RoutingConfig, RoutingScheme};
//!
//! let config = RoutingConfig::default().with_scheme(RoutingScheme::Geographic);
//! let factory = ArbiterFactory::new(layout, config);
//! let arbiter = factory.build(node, Some(neighbors), store)?;
//!
//! let entry = arbiter.decide(&DecisionRequest::new(source, target, now).with_sidecar(&sidecar))?;
//! ```

pub mod access;
pub mod arbiter;
pub mod backpressure;
pub mod config;
pub mod error;
pub mod geographic;
pub mod phase;
pub mod registry;
pub mod reload;
pub mod store;
pub mod telemetry;

// Re-export main types
pub use access::DestinationSatelliteSet;
pub use arbiter::{Arbiter, ArbiterFactory, DecisionRequest, StaticArbiter};
pub use backpressure::{BackpressureArbiter, PermittedRegion, QueueLedger};
pub use config::{RoutingConfig, RoutingScheme};
pub use error::{RoutingError, RoutingResult};
pub use geographic::{GeographicArbiter, GreedyOutcome, TorusNavigator};
pub use phase::{GroundStationDirectory, OrbitalElements, OrbitalPhaseTracker, TleFeed};
pub use registry::{SharedPhaseRegistry, SlotHandle, pack_cell, unpack_cell};
pub use reload::{
    FileRouteSource, MemoryRouteSource, ReloadBatch, ReloadSchedule, SnapshotValidator,
    StateReloadService, ValidatedRecord,
};
pub use store::{ForwardingStateStore, ForwardingTable, TableBuilder};
pub use telemetry::NeighborTelemetryExchange;

// Re-export core types for convenience
pub use satnet_core::{NextHop, NextHopEntry, NodeId, NodeLayout};
