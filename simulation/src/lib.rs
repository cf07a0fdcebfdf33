//! # Constellation routing simulation
//!
//! A discrete-event harness that runs one routing arbiter per node of a
//! satellite shell and moves packets between ground stations hop by hop.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): torus shell, ground-station attachments,
//!   shortest-path snapshot generation
//! - **Events** (`event.rs`): min-heap event queue
//! - **Simulation** (`simulation.rs`): reload ticks, phase ticks, packet hops
//! - **Scenarios** (`scenarios.rs`): replayable setups and seeded random traffic
//!
//! ## Example
//!
//! ```rust,ignore
//! use satnet_simulation::scenarios;
//! use satnet_routing::RoutingScheme;
//!
//! let scenario = scenarios::handover(RoutingScheme::Geographic)?;
//! for (scheme, stats) in scenario.compare()? {
//!     println!("{:?}: {:.2} delivered", scheme, stats.delivery_ratio());
//! }
//! ```

pub mod event;
pub mod scenarios;
pub mod simulation;
pub mod topology;

// Re-export main types
pub use event::{Event, EventQueue, Packet, ScheduledEvent, SequenceNumber};
pub use scenarios::{Scenario, Transmission};
pub use simulation::{SimConfig, SimStats, Simulation};
pub use topology::{GROUND_GSL_IF, SATELLITE_GSL_IF, TopologyBuilder, TorusTopology, sub_satellite_point};
