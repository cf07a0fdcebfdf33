//! Routing error types
//!
//! Wraps the core error families and adds routing-specific errors.

use thiserror::Error;

pub use satnet_core::{HeaderError, OrbitalFeedError, SnapshotError, ValidationError};

use satnet_core::NodeId;

/// Errors raised by the routing crate
///
/// Every variant is fatal to a run: forwarding cannot continue safely on a
/// partial or missing table.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Snapshot record failed topology validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Snapshot could not be read
    #[error("Snapshot unavailable: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Orbital elements could not be read
    #[error("Orbital feed unavailable: {0}")]
    OrbitalFeed(#[from] OrbitalFeedError),

    /// In-band header could not be decoded
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Decision requested before any snapshot was installed
    #[error("Node {0} has no forwarding table loaded")]
    NotLoaded(NodeId),

    /// Node has no arbiter
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

impl From<satnet_core::SatnetError> for RoutingError {
    fn from(err: satnet_core::SatnetError) -> Self {
        match err {
            satnet_core::SatnetError::Validation(e) => Self::Validation(e),
            satnet_core::SatnetError::Snapshot(e) => Self::Snapshot(e),
            satnet_core::SatnetError::OrbitalFeed(e) => Self::OrbitalFeed(e),
            satnet_core::SatnetError::Header(e) => Self::Header(e),
        }
    }
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
