//! Error types for constellation routing

use std::path::PathBuf;

use thiserror::Error;

use crate::identity::NodeId;

/// Top-level error type for satnet
#[derive(Debug, Error)]
pub enum SatnetError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Orbital feed error: {0}")]
    OrbitalFeed(#[from] OrbitalFeedError),

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
}

/// Errors raised while checking a forwarding record against the topology
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Node id {node} out of range [{min}, {max})")]
    NodeOutOfRange { node: i64, min: i64, max: i64 },

    #[error("Interface {interface} out of range on node {node} ({count} interfaces)")]
    InterfaceOutOfRange {
        node: NodeId,
        interface: i64,
        count: usize,
    },

    #[error("Partial drop triple ({next_hop}, {local_if}, {remote_if}): all or none must be -1")]
    PartialDrop {
        next_hop: i64,
        local_if: i64,
        remote_if: i64,
    },

    #[error("Unset sentinel -2 cannot be written into a forwarding table")]
    UnsetSentinel,

    #[error("Interface {interface} on node {node} is neither a GSL nor an ISL device")]
    UnsupportedDevice { node: NodeId, interface: u32 },

    #[error("GSL interface {local_if} on {node} cannot reach non-GSL interface {remote_if} on {next_hop}")]
    GslMismatch {
        node: NodeId,
        local_if: u32,
        next_hop: NodeId,
        remote_if: u32,
    },

    #[error("ISL interface {local_if} on {node} cannot reach non-ISL interface {remote_if} on {next_hop}")]
    IslMismatch {
        node: NodeId,
        local_if: u32,
        next_hop: NodeId,
        remote_if: u32,
    },

    #[error(
        "ISL far end mismatch on {node} if {local_if}: declared {declared_node}/{declared_if}, wired to {actual_node}/{actual_if}"
    )]
    IslPeerMismatch {
        node: NodeId,
        local_if: u32,
        declared_node: NodeId,
        declared_if: u32,
        actual_node: NodeId,
        actual_if: u32,
    },

    #[error("Forwarding table for node {node} has no entry for target {target} after first load")]
    IncompleteSnapshot { node: NodeId, target: NodeId },

    #[error("Record for {node} -> {target} carries no distance weight")]
    MissingDistance { node: NodeId, target: NodeId },
}

/// Errors related to reading forwarding snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Snapshot I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("No snapshot available for t={0}ns")]
    NotScheduled(u64),
}

/// Errors related to the orbital element feed
#[derive(Debug, Error)]
pub enum OrbitalFeedError {
    #[error("Orbital element file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Orbital element I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed orbital element record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("No orbital elements for satellite {0}")]
    UnknownSatellite(NodeId),
}

/// Errors decoding in-band sidecar metadata
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Geographic header truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Cell coordinate {value} does not fit a header field")]
    CellOutOfRange { value: u32 },

    #[error("Sidecar encoding failed: {0}")]
    Encode(String),

    #[error("Sidecar decoding failed: {0}")]
    Decode(String),
}

/// Result type for core operations
pub type SatnetResult<T> = Result<T, SatnetError>;
