//! Collaborator interfaces
//!
//! The arbiters never compute orbits, read files or build topologies
//! themselves. These traits are the seams through which they are fed.
//!
//! ## Key Traits
//!
//! - [`RouteSource`]: timestamped forwarding snapshots
//! - [`PhaseOracle`]: continuous orbital phase of each satellite
//! - [`PositionOracle`]: geodetic position of any node

use serde::{Deserialize, Serialize};

use crate::error::{OrbitalFeedError, SnapshotError};
use crate::forwarding::SnapshotRecord;
use crate::geometry::PhasePair;
use crate::identity::{NodeId, SimTime};

/// Supplier of externally computed forwarding snapshots
pub trait RouteSource: Send {
    /// Records for the reload tick at `at`
    fn snapshot(&mut self, at: SimTime) -> Result<Vec<SnapshotRecord>, SnapshotError>;
}

/// Supplier of satellite phase angles
pub trait PhaseOracle: Send + Sync {
    fn phase_at(&self, satellite: NodeId, at: SimTime) -> Result<PhasePair, OrbitalFeedError>;
}

/// Geodetic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

impl GeoPosition {
    pub fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self { lat_deg, lon_deg }
    }

    /// Great-circle angle to `other`, in degrees
    pub fn angular_distance_deg(&self, other: &GeoPosition) -> f64 {
        let (lat1, lat2) = (self.lat_deg.to_radians(), other.lat_deg.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon_deg - self.lon_deg).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        (2.0 * h.sqrt().min(1.0).asin()).to_degrees()
    }
}

/// Supplier of node positions for plausibility checks
pub trait PositionOracle: Send + Sync {
    fn position(&self, node: NodeId, at: SimTime) -> Option<GeoPosition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angular_distance() {
        let a = GeoPosition::new(0.0, 0.0);
        assert!((a.angular_distance_deg(&GeoPosition::new(0.0, 90.0)) - 90.0).abs() < 1e-9);
        assert!((a.angular_distance_deg(&GeoPosition::new(0.0, -170.0)) - 170.0).abs() < 1e-9);
        assert!(a.angular_distance_deg(&a).abs() < 1e-12);
    }
}
