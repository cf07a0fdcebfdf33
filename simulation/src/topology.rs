//! Torus constellation fixture
//!
//! Builds a Walker-style shell of `orbits × sats_per_orbit` satellites, each
//! wired to its four torus neighbours, plus ground stations hanging off one
//! satellite each. The fixture answers the questions the arbiters ask of the
//! outside world:
//!
//! - which device sits behind an interface ([`InterfaceCatalog`])
//! - where a node is ([`PositionOracle`])
//! - what phase a satellite has ([`PhaseOracle`])
//!
//! and generates shortest-path forwarding snapshots for every reload tick.
//!
//! Satellite interfaces 0..=3 are the ISLs in direction-slot order (Left,
//! Down, Up, Right), interface 4 is the ground link. Ground stations have a
//! single ground link on interface 0.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use anyhow::{Context, bail, ensure};
use satnet_core::{
    Device, Direction, GeoPosition, InterfaceCatalog, NeighborSet, NeighborSlot, NextHop, NodeId,
    NodeLayout, OrbitalFeedError, PhaseOracle, PhasePair, PositionOracle, SimTime, SnapshotRecord,
};
use satnet_routing::{FileRouteSource, MemoryRouteSource, OrbitalElements, ReloadSchedule, TleFeed};
use tracing::debug;

/// Ground link interface on a satellite
pub const SATELLITE_GSL_IF: u32 = 4;
/// Ground link interface on a ground station
pub const GROUND_GSL_IF: u32 = 0;

/// A satellite shell with attached ground stations
#[derive(Debug, Clone)]
pub struct TorusTopology {
    layout: NodeLayout,
    feed: TleFeed,
    sites: Vec<GeoPosition>,
    /// Per ground station: `(from, satellite)` sorted by time
    attachments: Vec<Vec<(SimTime, NodeId)>>,
}

impl TorusTopology {
    pub fn builder(orbits: u32, sats_per_orbit: u32) -> TopologyBuilder {
        TopologyBuilder::new(orbits, sats_per_orbit)
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    /// Element sets of every satellite
    pub fn feed(&self) -> &TleFeed {
        &self.feed
    }

    pub fn ground_positions(&self) -> &[GeoPosition] {
        &self.sites
    }

    pub fn inclination_deg(&self) -> f64 {
        self.feed.inclination_deg().unwrap_or(0.0)
    }

    pub fn skew_deg(&self) -> f64 {
        self.feed.skew_deg().unwrap_or(0.0)
    }

    /// Torus neighbours of a satellite
    pub fn neighbors(&self, satellite: NodeId) -> Option<NeighborSet> {
        let (orbit, slot) = self.layout.orbit_slot(satellite)?;
        let slots = Direction::ALL.map(|direction| {
            NeighborSlot::new(
                self.peer_at(orbit, slot, direction),
                direction.slot() as u32,
                direction.opposite().slot() as u32,
            )
        });
        Some(NeighborSet::new(slots))
    }

    fn isl_peer(&self, satellite: NodeId, direction: Direction) -> Option<NodeId> {
        let (orbit, slot) = self.layout.orbit_slot(satellite)?;
        Some(self.peer_at(orbit, slot, direction))
    }

    fn peer_at(&self, orbit: u32, slot: u32, direction: Direction) -> NodeId {
        let (o, s) = (orbit as i64, slot as i64);
        match direction {
            Direction::Left => self.layout.satellite_at(o - 1, s),
            Direction::Right => self.layout.satellite_at(o + 1, s),
            Direction::Down => self.layout.satellite_at(o, s - 1),
            Direction::Up => self.layout.satellite_at(o, s + 1),
        }
    }

    /// Satellite serving ground station `gs_index` at `at`
    pub fn attachment_at(&self, gs_index: usize, at: SimTime) -> Option<NodeId> {
        self.attachments
            .get(gs_index)?
            .iter()
            .take_while(|(from, _)| *from <= at)
            .last()
            .map(|(_, sat)| *sat)
    }

    /// Satellite closest to `position` at `at`
    pub fn nearest_satellite(&self, position: GeoPosition, at: SimTime) -> Option<NodeId> {
        self.layout
            .satellites()
            .filter_map(|sat| {
                self.satellite_position(sat, at)
                    .map(|p| (sat, p.angular_distance_deg(&position)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(sat, _)| sat)
    }

    fn satellite_position(&self, satellite: NodeId, at: SimTime) -> Option<GeoPosition> {
        let elements = self.feed.elements(satellite)?;
        let phase = elements.phase_at(at);
        Some(sub_satellite_point(phase, elements.inclination_deg))
    }

    /// Complete shortest-path snapshot for `at`.
    ///
    /// Ground stations are leaves: paths never transit another ground
    /// station. Unreachable destinations become drops.
    pub fn snapshot(&self, at: SimTime) -> Vec<SnapshotRecord> {
        let mut records = Vec::new();
        for gs in self.layout.ground_stations() {
            let tree = self.paths_toward(gs, at);
            for node in self.layout.nodes() {
                if node == gs {
                    continue;
                }
                let record = match tree.get(&node) {
                    Some(&(hop, distance)) => SnapshotRecord::from_hop(node, gs, hop, Some(distance)),
                    None => SnapshotRecord::from_hop(node, gs, NextHop::Drop, None),
                };
                records.push(record);
            }
        }
        records
    }

    /// Breadth-first tree rooted at `gs`: next hop and hop count of every
    /// node that can reach it
    fn paths_toward(&self, gs: NodeId, at: SimTime) -> BTreeMap<NodeId, (NextHop, u32)> {
        let mut tree = BTreeMap::new();
        let Some(gs_index) = self.layout.gs_index(gs) else {
            return tree;
        };
        let Some(access) = self.attachment_at(gs_index, at) else {
            return tree;
        };

        let mut queue = VecDeque::new();
        tree.insert(
            access,
            (NextHop::forward(gs, SATELLITE_GSL_IF, GROUND_GSL_IF), 1),
        );
        queue.push_back(access);

        while let Some(sat) = queue.pop_front() {
            let distance = tree.get(&sat).map_or(0, |(_, d)| *d);
            for direction in Direction::ALL {
                let Some(peer) = self.isl_peer(sat, direction) else {
                    continue;
                };
                if tree.contains_key(&peer) {
                    continue;
                }
                // the peer reaches `sat` through its opposite-facing ISL
                let back = direction.opposite();
                let hop = NextHop::forward(sat, back.slot() as u32, direction.slot() as u32);
                tree.insert(peer, (hop, distance + 1));
                queue.push_back(peer);
            }
        }

        // other ground stations enter through their own access satellite
        for other in self.layout.ground_stations() {
            if other == gs {
                continue;
            }
            let Some(index) = self.layout.gs_index(other) else {
                continue;
            };
            if let Some(sat) = self.attachment_at(index, at)
                && let Some(&(_, distance)) = tree.get(&sat)
            {
                let hop = NextHop::forward(sat, GROUND_GSL_IF, SATELLITE_GSL_IF);
                tree.insert(other, (hop, distance + 1));
            }
        }
        tree
    }

    /// In-memory snapshots for every tick of `schedule`: the first complete,
    /// later ones only listing entries that changed
    pub fn route_source(&self, schedule: ReloadSchedule) -> MemoryRouteSource {
        let mut source = MemoryRouteSource::new();
        let mut previous: BTreeMap<(i64, i64), SnapshotRecord> = BTreeMap::new();
        for at in schedule {
            let full = self.snapshot(at);
            let delta: Vec<SnapshotRecord> = full
                .iter()
                .filter(|r| previous.get(&(r.current, r.target)) != Some(*r))
                .copied()
                .collect();
            debug!(at = %at, records = delta.len(), "Generated snapshot");
            previous.extend(full.into_iter().map(|r| ((r.current, r.target), r)));
            source.insert(at, delta);
        }
        source
    }

    /// Write the snapshots of `schedule` as `fstate_<t>.txt` files under `dir`
    pub fn write_snapshots(&self, dir: &Path, schedule: ReloadSchedule) -> anyhow::Result<usize> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        let mut written = 0;
        for at in schedule {
            let text: String = self
                .snapshot(at)
                .iter()
                .map(|r| r.to_line() + "\n")
                .collect();
            let path = FileRouteSource::file_path(dir, at);
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            written += 1;
        }
        Ok(written)
    }

    /// Write the element sets as a TLE file
    pub fn write_elements(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.feed.to_text())
            .with_context(|| format!("writing {}", path.display()))
    }
}

/// Sub-satellite point of a circular orbit at `phase`
pub fn sub_satellite_point(phase: PhasePair, inclination_deg: f64) -> GeoPosition {
    let incl = inclination_deg.to_radians();
    let gamma = phase.gamma_deg.to_radians();
    let lat = (incl.sin() * gamma.sin()).asin().to_degrees();
    let lon = phase.alpha_deg + (incl.cos() * gamma.sin()).atan2(gamma.cos()).to_degrees();
    GeoPosition::new(lat, (lon + 180.0).rem_euclid(360.0) - 180.0)
}

impl InterfaceCatalog for TorusTopology {
    fn interface_count(&self, node: NodeId) -> usize {
        if self.layout.is_satellite(node) {
            5
        } else if self.layout.is_ground_station(node) {
            1
        } else {
            0
        }
    }

    fn device(&self, node: NodeId, interface: u32) -> Option<Device> {
        if self.layout.is_ground_station(node) {
            return (interface == GROUND_GSL_IF).then_some(Device::Gsl);
        }
        if !self.layout.is_satellite(node) {
            return None;
        }
        if interface == SATELLITE_GSL_IF {
            return Some(Device::Gsl);
        }
        let direction = Direction::from_slot(interface as usize)?;
        Some(Device::Isl {
            peer: self.isl_peer(node, direction)?,
            peer_interface: direction.opposite().slot() as u32,
        })
    }
}

impl PositionOracle for TorusTopology {
    fn position(&self, node: NodeId, at: SimTime) -> Option<GeoPosition> {
        match self.layout.gs_index(node) {
            Some(index) => self.sites.get(index).copied(),
            None => self.satellite_position(node, at),
        }
    }
}

impl PhaseOracle for TorusTopology {
    fn phase_at(&self, satellite: NodeId, at: SimTime) -> Result<PhasePair, OrbitalFeedError> {
        self.feed.phase_at(satellite, at)
    }
}

/// Builder for [`TorusTopology`]
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    orbits: u32,
    sats_per_orbit: u32,
    inclination_deg: f64,
    mean_motion: f64,
    stagger_deg: f64,
    sites: Vec<(GeoPosition, Option<NodeId>)>,
    handovers: Vec<(usize, SimTime, NodeId)>,
}

impl TopologyBuilder {
    pub fn new(orbits: u32, sats_per_orbit: u32) -> Self {
        Self {
            orbits,
            sats_per_orbit,
            inclination_deg: 53.0,
            mean_motion: 15.05,
            stagger_deg: 0.0,
            sites: Vec::new(),
            handovers: Vec::new(),
        }
    }

    pub fn inclination(mut self, degrees: f64) -> Self {
        self.inclination_deg = degrees;
        self
    }

    /// Revolutions per day
    pub fn mean_motion(mut self, revs_per_day: f64) -> Self {
        self.mean_motion = revs_per_day;
        self
    }

    /// Mean-anomaly shift between adjacent planes
    pub fn stagger(mut self, degrees: f64) -> Self {
        self.stagger_deg = degrees;
        self
    }

    /// Ground station attached to the nearest satellite at epoch
    pub fn ground_station(mut self, lat_deg: f64, lon_deg: f64) -> Self {
        self.sites.push((GeoPosition::new(lat_deg, lon_deg), None));
        self
    }

    pub fn ground_station_on(mut self, lat_deg: f64, lon_deg: f64, satellite: NodeId) -> Self {
        self.sites
            .push((GeoPosition::new(lat_deg, lon_deg), Some(satellite)));
        self
    }

    /// Move ground station `gs_index` to `satellite` from `at` on
    pub fn handover(mut self, gs_index: usize, at: SimTime, satellite: NodeId) -> Self {
        self.handovers.push((gs_index, at, satellite));
        self
    }

    pub fn build(self) -> anyhow::Result<TorusTopology> {
        ensure!(
            self.orbits >= 2 && self.sats_per_orbit >= 2,
            "torus needs at least 2x2 satellites, got {}x{}",
            self.orbits,
            self.sats_per_orbit
        );
        ensure!(self.mean_motion > 0.0, "mean motion must be positive");

        let layout = NodeLayout::new(self.orbits, self.sats_per_orbit, self.sites.len() as u32);
        let mut feed = TleFeed::new(self.orbits, self.sats_per_orbit);
        let plane = 360.0 / self.orbits as f64;
        let slot = 360.0 / self.sats_per_orbit as f64;
        for sat in layout.satellites() {
            let Some((o, s)) = layout.orbit_slot(sat) else {
                continue;
            };
            feed.insert(
                sat,
                OrbitalElements {
                    inclination_deg: self.inclination_deg,
                    raan_deg: o as f64 * plane,
                    mean_anomaly_deg: (s as f64 * slot + o as f64 * self.stagger_deg)
                        .rem_euclid(360.0),
                    mean_motion: self.mean_motion,
                },
            );
        }

        let mut topology = TorusTopology {
            layout,
            feed,
            sites: self.sites.iter().map(|(p, _)| *p).collect(),
            attachments: vec![Vec::new(); self.sites.len()],
        };

        for (index, (position, fixed)) in self.sites.iter().enumerate() {
            let sat = match fixed {
                Some(sat) => *sat,
                None => topology
                    .nearest_satellite(*position, SimTime::ZERO)
                    .context("constellation has no satellites")?,
            };
            if !layout.is_satellite(sat) {
                bail!("ground station {} attached to non-satellite {}", index, sat);
            }
            topology.attachments[index].push((SimTime::ZERO, sat));
        }

        for (index, at, sat) in self.handovers {
            if !layout.is_satellite(sat) {
                bail!("handover of ground station {} to non-satellite {}", index, sat);
            }
            let list = topology
                .attachments
                .get_mut(index)
                .with_context(|| format!("handover for unknown ground station {}", index))?;
            list.push((at, sat));
            list.sort_by_key(|(t, _)| *t);
        }

        Ok(topology)
    }
}
