//! Routing configuration
//!
//! Loaded from TOML and handed to every arbiter at construction time.
//!
//! ```toml
//! scheme = "geographic"
//! routes_dir = "routes/starlink_550"
//! update_interval_ns = 100000000
//! end_time_ns = 200000000000
//! cell_scale = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RoutingError, RoutingResult};

/// Forwarding strategy run by satellites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingScheme {
    /// Follow the loaded forwarding table only
    #[default]
    StaticSnapshot,
    /// Greedy torus routing on in-band destination cells
    Geographic,
    /// Table baseline adjusted by neighbour queue-distance telemetry
    Backpressure,
}

/// Main routing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Strategy for satellite arbiters; ground stations always use the table
    pub scheme: RoutingScheme,

    /// Directory holding `fstate_<t>.txt` snapshots
    pub routes_dir: PathBuf,

    /// Orbital element file for phase tracking
    pub tle_path: Option<PathBuf>,

    /// Interval between reload and phase ticks
    pub update_interval_ns: u64,

    /// Simulation horizon; no tick is scheduled at or after it
    pub end_time_ns: u64,

    /// Load the snapshot at t=0 only
    pub force_static: bool,

    /// Cells per satellite spacing on both torus axes
    pub cell_scale: u32,

    /// Gamma offset of the left-plane neighbour, defaults to `+360 / (2 * sats_per_orbit)`
    pub left_gamma_offset_deg: Option<f64>,

    /// Gamma offset of the right-plane neighbour, defaults to `-360 / (2 * sats_per_orbit)`
    pub right_gamma_offset_deg: Option<f64>,

    /// Piggyback the whole queue-distance vector instead of one flow
    pub batched_telemetry: bool,

    /// Hop limit enforced by the simulation harness
    pub max_hops: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            scheme: RoutingScheme::default(),
            routes_dir: PathBuf::from("./routes"),
            tle_path: None,
            update_interval_ns: 100_000_000,
            end_time_ns: 200_000_000_000,
            force_static: false,
            cell_scale: satnet_core::DEFAULT_CELL_SCALE,
            left_gamma_offset_deg: None,
            right_gamma_offset_deg: None,
            batched_telemetry: false,
            max_hops: 256,
        }
    }
}

impl RoutingConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> RoutingResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RoutingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> RoutingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RoutingError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn with_scheme(mut self, scheme: RoutingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_cell_scale(mut self, scale: u32) -> Self {
        self.cell_scale = scale;
        self
    }

    pub fn with_neighbor_offsets(mut self, left_deg: f64, right_deg: f64) -> Self {
        self.left_gamma_offset_deg = Some(left_deg);
        self.right_gamma_offset_deg = Some(right_deg);
        self
    }

    pub fn validate(&self) -> RoutingResult<()> {
        if self.update_interval_ns == 0 {
            return Err(RoutingError::Config(
                "update_interval_ns must be positive".to_string(),
            ));
        }
        if self.cell_scale == 0 {
            return Err(RoutingError::Config("cell_scale must be positive".to_string()));
        }
        if self.end_time_ns == 0 {
            return Err(RoutingError::Config("end_time_ns must be positive".to_string()));
        }
        if self.max_hops == 0 {
            return Err(RoutingError::Config("max_hops must be positive".to_string()));
        }
        Ok(())
    }

    /// Gamma offsets of the (left, right) plane neighbours
    pub fn neighbor_gamma_offsets(&self, sats_per_orbit: u32) -> (f64, f64) {
        let half_slot = 360.0 / (2.0 * sats_per_orbit.max(1) as f64);
        (
            self.left_gamma_offset_deg.unwrap_or(half_slot),
            self.right_gamma_offset_deg.unwrap_or(-half_slot),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RoutingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheme, RoutingScheme::StaticSnapshot);
        assert_eq!(config.cell_scale, 5);
    }

    #[test]
    fn test_from_toml() {
        let config = RoutingConfig::from_toml_str(
            r#"
            scheme = "backpressure"
            routes_dir = "/tmp/routes"
            update_interval_ns = 1000
            force_static = true
            "#,
        )
        .unwrap();
        assert_eq!(config.scheme, RoutingScheme::Backpressure);
        assert_eq!(config.routes_dir, PathBuf::from("/tmp/routes"));
        assert_eq!(config.update_interval_ns, 1000);
        assert!(config.force_static);
        assert_eq!(config.max_hops, 256);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = RoutingConfig::from_toml_str("update_interval_ns = 0").unwrap_err();
        assert!(matches!(err, RoutingError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(RoutingConfig::from_toml_str("scheme = \"flooding\"").is_err());
    }

    #[test]
    fn test_neighbor_offsets() {
        let config = RoutingConfig::default();
        assert_eq!(config.neighbor_gamma_offsets(22), (360.0 / 44.0, -360.0 / 44.0));
        let config = config.with_neighbor_offsets(0.0, 0.0);
        assert_eq!(config.neighbor_gamma_offsets(22), (0.0, 0.0));
    }
}
