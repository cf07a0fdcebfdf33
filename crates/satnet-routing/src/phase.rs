//! Orbital phase tracking
//!
//! Satellites are placed on the routing torus from their two-line element
//! sets: `alpha` follows the right ascension of the ascending node in an
//! earth-fixed frame, `gamma` the mean argument of latitude.
//!
//! ## Core Components
//!
//! - [`OrbitalElements`]: the four element fields routing needs
//! - [`TleFeed`]: element sets for a whole shell, parsed from a TLE file
//! - [`OrbitalPhaseTracker`]: a satellite's current phase and cell
//! - [`GroundStationDirectory`]: destination headers for every ground station

use std::collections::BTreeMap;
use std::path::Path;

use satnet_core::{
    ground_station_phases, Cell, GeoHeader, GeoPosition, HeaderError, NodeId, OrbitalFeedError,
    PhaseOracle, PhasePair, SimTime, TorusDims,
};
use tracing::{debug, trace};

/// Seconds in the day used for mean motion and earth rotation
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Element fields taken from line 2 of a TLE
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub mean_anomaly_deg: f64,
    /// Revolutions per day
    pub mean_motion: f64,
}

impl OrbitalElements {
    /// Orbital period in seconds
    pub fn period_secs(&self) -> f64 {
        SECONDS_PER_DAY / self.mean_motion
    }

    /// Phase pair `t` after epoch
    pub fn phase_at(&self, at: SimTime) -> PhasePair {
        let t = at.as_secs_f64();
        let alpha = self.raan_deg - 360.0 * t / SECONDS_PER_DAY;
        let gamma = self.mean_anomaly_deg + 360.0 * t / self.period_secs();
        PhasePair::new(alpha, gamma).normalized()
    }

    /// Fixed-column TLE line 2 for satellite `id`; only the fields read
    /// back by [`OrbitalElements::from_line2`] carry data
    pub fn to_line2(&self, id: u32) -> String {
        format!(
            "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:5}0",
            id % 100_000,
            self.inclination_deg,
            self.raan_deg,
            0,
            0.0,
            self.mean_anomaly_deg,
            self.mean_motion,
            0
        )
    }

    /// Parse the fixed columns of TLE line 2
    pub fn from_line2(line: usize, text: &str) -> Result<Self, OrbitalFeedError> {
        let field = |name: &str, range: std::ops::Range<usize>| -> Result<f64, OrbitalFeedError> {
            let raw = text.get(range.clone()).ok_or_else(|| OrbitalFeedError::Malformed {
                line,
                reason: format!("line too short for {} at columns {:?}", name, range),
            })?;
            raw.trim()
                .parse::<f64>()
                .map_err(|e| OrbitalFeedError::Malformed {
                    line,
                    reason: format!("{} ({:?}): {}", name, raw, e),
                })
        };

        if !text.starts_with('2') {
            return Err(OrbitalFeedError::Malformed {
                line,
                reason: "expected TLE line 2".to_string(),
            });
        }

        let elements = Self {
            inclination_deg: field("inclination", 8..16)?,
            raan_deg: field("raan", 17..25)?,
            mean_anomaly_deg: field("mean anomaly", 43..51)?,
            mean_motion: field("mean motion", 52..63)?,
        };
        if elements.mean_motion <= 0.0 {
            return Err(OrbitalFeedError::Malformed {
                line,
                reason: format!("non-positive mean motion {}", elements.mean_motion),
            });
        }
        Ok(elements)
    }
}

/// Element sets for one shell
///
/// File layout: a header line `<orbits> <sats_per_orbit>`, then one
/// title/line1/line2 triple per satellite. The satellite id is the token after
/// the first space of the title.
#[derive(Debug, Clone, Default)]
pub struct TleFeed {
    pub orbits: u32,
    pub sats_per_orbit: u32,
    elements: BTreeMap<NodeId, OrbitalElements>,
}

impl TleFeed {
    pub fn new(orbits: u32, sats_per_orbit: u32) -> Self {
        Self {
            orbits,
            sats_per_orbit,
            elements: BTreeMap::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, OrbitalFeedError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end()))
            .filter(|(_, l)| !l.trim().is_empty());

        let (header_no, header) = lines.next().ok_or(OrbitalFeedError::Malformed {
            line: 1,
            reason: "empty element file".to_string(),
        })?;
        let mut dims = header.split_whitespace().map(str::parse::<u32>);
        let (orbits, sats_per_orbit) = match (dims.next(), dims.next()) {
            (Some(Ok(o)), Some(Ok(s))) => (o, s),
            _ => {
                return Err(OrbitalFeedError::Malformed {
                    line: header_no,
                    reason: format!("expected '<orbits> <sats_per_orbit>', got {:?}", header),
                });
            }
        };

        let mut elements = BTreeMap::new();
        while let Some((title_no, title)) = lines.next() {
            let id = title
                .split_once(' ')
                .and_then(|(_, rest)| rest.trim().parse::<u32>().ok())
                .ok_or_else(|| OrbitalFeedError::Malformed {
                    line: title_no,
                    reason: format!("title {:?} carries no satellite id", title),
                })?;
            let missing = |line| OrbitalFeedError::Malformed {
                line,
                reason: "truncated element set".to_string(),
            };
            let (_, _line1) = lines.next().ok_or_else(|| missing(title_no + 1))?;
            let (line2_no, line2) = lines.next().ok_or_else(|| missing(title_no + 2))?;
            elements.insert(NodeId(id), OrbitalElements::from_line2(line2_no, line2)?);
        }

        debug!(orbits, sats_per_orbit, satellites = elements.len(), "Parsed element feed");
        Ok(Self {
            orbits,
            sats_per_orbit,
            elements,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrbitalFeedError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                OrbitalFeedError::Missing(path.to_path_buf())
            } else {
                OrbitalFeedError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse(&text)
    }

    /// Element file readable by [`TleFeed::parse`]
    pub fn to_text(&self) -> String {
        let mut text = format!("{} {}\n", self.orbits, self.sats_per_orbit);
        for (id, elements) in &self.elements {
            text.push_str(&format!("Satellite {}\n", id.0));
            text.push_str("1 00000U 00000A   00001.00000000  .00000000  00000-0  00000-0 0    00\n");
            text.push_str(&elements.to_line2(id.0));
            text.push('\n');
        }
        text
    }

    pub fn insert(&mut self, satellite: NodeId, elements: OrbitalElements) {
        self.elements.insert(satellite, elements);
    }

    pub fn elements(&self, satellite: NodeId) -> Option<&OrbitalElements> {
        self.elements.get(&satellite)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Shell inclination, taken from the first satellite
    pub fn inclination_deg(&self) -> Option<f64> {
        self.elements.values().next().map(|e| e.inclination_deg)
    }

    /// Ascending node of the first satellite's plane at epoch
    pub fn skew_deg(&self) -> Option<f64> {
        self.elements.values().next().map(|e| e.raan_deg)
    }
}

impl PhaseOracle for TleFeed {
    fn phase_at(&self, satellite: NodeId, at: SimTime) -> Result<PhasePair, OrbitalFeedError> {
        self.elements
            .get(&satellite)
            .map(|e| e.phase_at(at))
            .ok_or(OrbitalFeedError::UnknownSatellite(satellite))
    }
}

/// Current phase and torus cell of one satellite
#[derive(Debug, Clone)]
pub struct OrbitalPhaseTracker {
    satellite: NodeId,
    dims: TorusDims,
    phase: Option<PhasePair>,
    cell: Option<Cell>,
    updated_at: Option<SimTime>,
}

impl OrbitalPhaseTracker {
    pub fn new(satellite: NodeId, dims: TorusDims) -> Self {
        Self {
            satellite,
            dims,
            phase: None,
            cell: None,
            updated_at: None,
        }
    }

    /// Recompute the phase for `at` from the oracle
    pub fn update(&mut self, oracle: &dyn PhaseOracle, at: SimTime) -> Result<Cell, OrbitalFeedError> {
        let phase = oracle.phase_at(self.satellite, at)?;
        Ok(self.set_phase(phase, at))
    }

    /// Install a phase computed elsewhere
    pub fn set_phase(&mut self, phase: PhasePair, at: SimTime) -> Cell {
        let phase = phase.normalized();
        let cell = self.dims.cell_of(phase);
        trace!(
            satellite = %self.satellite,
            alpha = phase.alpha_deg,
            gamma = phase.gamma_deg,
            cell = %cell,
            "Phase updated"
        );
        self.phase = Some(phase);
        self.cell = Some(cell);
        self.updated_at = Some(at);
        cell
    }

    pub fn satellite(&self) -> NodeId {
        self.satellite
    }

    pub fn dims(&self) -> &TorusDims {
        &self.dims
    }

    pub fn phase(&self) -> Option<PhasePair> {
        self.phase
    }

    pub fn cell(&self) -> Option<Cell> {
        self.cell
    }

    pub fn updated_at(&self) -> Option<SimTime> {
        self.updated_at
    }
}

/// Geographic headers for every ground station, indexed by ground-station index
#[derive(Debug, Clone, Default)]
pub struct GroundStationDirectory {
    headers: Vec<GeoHeader>,
}

impl GroundStationDirectory {
    pub fn new(headers: Vec<GeoHeader>) -> Self {
        Self { headers }
    }

    /// Convert geodetic positions under a shell of the given inclination
    pub fn from_positions(
        positions: &[GeoPosition],
        inclination_deg: f64,
        skew_deg: f64,
        dims: &TorusDims,
    ) -> Result<Self, HeaderError> {
        let headers = positions
            .iter()
            .map(|p| {
                let phases = ground_station_phases(p.lat_deg, p.lon_deg, inclination_deg, skew_deg);
                GeoHeader::from_phases(&phases, dims)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers })
    }

    /// Header to stamp on packets for ground station `gs_index`
    pub fn header_for(&self, gs_index: usize) -> GeoHeader {
        self.headers
            .get(gs_index)
            .copied()
            .unwrap_or_else(GeoHeader::unreachable)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line2(inclination: f64, raan: f64, anomaly: f64, mean_motion: f64) -> String {
        OrbitalElements {
            inclination_deg: inclination,
            raan_deg: raan,
            mean_anomaly_deg: anomaly,
            mean_motion,
        }
        .to_line2(1)
    }

    fn feed_text() -> String {
        let mut text = String::from("2 2\n");
        for (id, (raan, anomaly)) in [(0.0, 0.0), (0.0, 180.0), (180.0, 0.0), (180.0, 180.0)]
            .into_iter()
            .enumerate()
        {
            text.push_str(&format!("Starlink-550 {}\n", id));
            text.push_str("1 00001U 00000ABC 00001.00000000  .00000000  00000-0  00000-0 0    04\n");
            text.push_str(&line2(53.0, raan, anomaly, 15.0));
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_line2_columns() {
        let text = line2(53.05, 295.5, 12.25, 15.19);
        let e = OrbitalElements::from_line2(3, &text).unwrap();
        assert_eq!(e.inclination_deg, 53.05);
        assert_eq!(e.raan_deg, 295.5);
        assert_eq!(e.mean_anomaly_deg, 12.25);
        assert_eq!(e.mean_motion, 15.19);
    }

    #[test]
    fn test_line2_rejects_short_line() {
        let err = OrbitalElements::from_line2(3, "2 00001  53.0000").unwrap_err();
        assert!(matches!(err, OrbitalFeedError::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_phase_advances_in_degrees() {
        let e = OrbitalElements {
            inclination_deg: 53.0,
            raan_deg: 10.0,
            mean_anomaly_deg: 0.0,
            mean_motion: 16.0,
        };
        // a quarter orbit later the mean anomaly moved by 90 degrees
        let quarter = SimTime::from_secs_f64(e.period_secs() / 4.0);
        let phase = e.phase_at(quarter);
        assert!((phase.gamma_deg - 90.0).abs() < 1e-6);
        let earth_turn = 360.0 * quarter.as_secs_f64() / SECONDS_PER_DAY;
        assert!((phase.alpha_deg - (10.0 - earth_turn)).abs() < 1e-6);
    }

    #[test]
    fn test_parse_feed() {
        let feed = TleFeed::parse(&feed_text()).unwrap();
        assert_eq!((feed.orbits, feed.sats_per_orbit), (2, 2));
        assert_eq!(feed.len(), 4);
        assert_eq!(feed.elements(NodeId(2)).unwrap().raan_deg, 180.0);
        assert_eq!(feed.inclination_deg(), Some(53.0));
        let phase = feed.phase_at(NodeId(3), SimTime::ZERO).unwrap();
        assert_eq!(phase, PhasePair::new(180.0, 180.0));
        assert!(matches!(
            feed.phase_at(NodeId(9), SimTime::ZERO),
            Err(OrbitalFeedError::UnknownSatellite(NodeId(9)))
        ));
    }

    #[test]
    fn test_parse_feed_rejects_truncated_set() {
        let mut text = feed_text();
        text.push_str("Starlink-550 4\n");
        assert!(matches!(
            TleFeed::parse(&text),
            Err(OrbitalFeedError::Malformed { .. })
        ));
        assert!(TleFeed::parse("two two\n").is_err());
    }

    #[test]
    fn test_feed_text_reparses() {
        let feed = TleFeed::parse(&feed_text()).unwrap();
        let again = TleFeed::parse(&feed.to_text()).unwrap();
        assert_eq!((again.orbits, again.sats_per_orbit), (2, 2));
        for id in 0..4 {
            assert_eq!(again.elements(NodeId(id)), feed.elements(NodeId(id)));
        }
    }

    #[test]
    fn test_feed_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TleFeed::from_file(dir.path().join("tles.txt")).unwrap_err();
        assert!(matches!(err, OrbitalFeedError::Missing(_)));

        let path = dir.path().join("tles.txt");
        std::fs::write(&path, feed_text()).unwrap();
        assert_eq!(TleFeed::from_file(&path).unwrap().len(), 4);
    }

    #[test]
    fn test_tracker_update() {
        let feed = TleFeed::parse(&feed_text()).unwrap();
        let mut tracker = OrbitalPhaseTracker::new(NodeId(1), TorusDims::new(2, 2, 1));
        assert!(tracker.cell().is_none());
        let cell = tracker.update(&feed, SimTime::ZERO).unwrap();
        assert_eq!(cell, Cell::new(0, 1));
        assert_eq!(tracker.updated_at(), Some(SimTime::ZERO));
    }

    #[test]
    fn test_ground_station_directory() {
        let dims = TorusDims::new(4, 4, 5);
        let dir = GroundStationDirectory::from_positions(
            &[GeoPosition::new(0.0, 90.0)],
            53.0,
            0.0,
            &dims,
        )
        .unwrap();
        assert_eq!(dir.header_for(0).ascending(), Cell::new(5, 0));
        assert!(dir.header_for(1).is_unreachable());
    }
}
