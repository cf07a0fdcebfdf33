//! # Satnet Core
//!
//! Core types, geometry, and errors shared by the constellation routing
//! arbiters and the simulation harness.
//!
//! ## Key Traits
//!
//! - [`RouteSource`]: Supplier of timestamped forwarding snapshots
//! - [`PhaseOracle`]: Continuous orbital phase of each satellite
//! - [`PositionOracle`]: Geodetic positions for permitted-region checks
//! - [`InterfaceCatalog`]: Devices installed on every node
//!
//! ## Key Types
//!
//! - [`NodeId`] / [`NodeLayout`]: Satellites first, then ground stations
//! - [`NextHop`]: Forwarding triple with explicit drop and unset states
//! - [`Cell`] / [`TorusDims`]: Discretised routing torus
//! - [`GeoHeader`] / [`TelemetrySidecar`]: In-band packet metadata

pub mod error;
pub mod forwarding;
pub mod geometry;
pub mod header;
pub mod identity;
pub mod interface;
pub mod traits;

// Re-export main types
pub use error::*;
pub use forwarding::*;
pub use geometry::*;
pub use header::*;
pub use identity::*;
pub use interface::*;
pub use traits::*;
