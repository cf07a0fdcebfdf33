//! Pre-defined simulation scenarios
//!
//! Each scenario bundles a constellation, a configuration and a traffic
//! plan, and can be replayed under any routing scheme.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use satnet_core::{NodeId, PhasePair, SimTime};
use satnet_routing::{RoutingConfig, RoutingResult, RoutingScheme};
use tracing::info;

use crate::simulation::{SimConfig, SimStats, Simulation};
use crate::topology::{TorusTopology, sub_satellite_point};

/// One packet of a traffic plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission {
    pub at: SimTime,
    pub from_gs: usize,
    pub to_gs: usize,
}

/// A replayable simulation setup
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub topology: Arc<TorusTopology>,
    pub config: SimConfig,
    pub traffic: Vec<Transmission>,
}

impl Scenario {
    pub fn with_scheme(mut self, scheme: RoutingScheme) -> Self {
        self.config.routing.scheme = scheme;
        self
    }

    /// Build a fresh simulation, inject the traffic and run to completion
    pub fn run(&self) -> RoutingResult<SimStats> {
        info!(
            scenario = %self.name,
            scheme = ?self.config.routing.scheme,
            packets = self.traffic.len(),
            "Running scenario"
        );
        let mut sim = Simulation::new(self.topology.clone(), self.config.clone())?;
        for send in &self.traffic {
            sim.send(send.at, send.from_gs, send.to_gs)?;
        }
        sim.run().cloned()
    }

    /// Run once per scheme
    pub fn compare(&self) -> RoutingResult<Vec<(RoutingScheme, SimStats)>> {
        [
            RoutingScheme::StaticSnapshot,
            RoutingScheme::Geographic,
            RoutingScheme::Backpressure,
        ]
        .into_iter()
        .map(|scheme| Ok((scheme, self.clone().with_scheme(scheme).run()?)))
        .collect()
    }
}

fn short_run(scheme: RoutingScheme) -> SimConfig {
    let mut routing = RoutingConfig::default()
        .with_scheme(scheme)
        .with_cell_scale(1)
        .with_neighbor_offsets(0.0, 0.0);
    routing.update_interval_ns = 10_000_000;
    routing.end_time_ns = 100_000_000;
    routing.max_hops = 64;
    SimConfig::with_routing(routing)
}

/// Two ground stations below satellites 1 and 9 of an 8×8 shell
/// exchanging a few packets
pub fn ground_pair(scheme: RoutingScheme) -> anyhow::Result<Scenario> {
    let under = |orbit: u32| sub_satellite_point(PhasePair::new(orbit as f64 * 45.0, 45.0), 53.0);
    let (a, b) = (under(0), under(1));
    let topology = TorusTopology::builder(8, 8)
        .ground_station(a.lat_deg, a.lon_deg)
        .ground_station(b.lat_deg, b.lon_deg)
        .build()?;

    let traffic = (0..10)
        .map(|i| Transmission {
            at: SimTime(i * 1_000_000),
            from_gs: (i % 2) as usize,
            to_gs: ((i + 1) % 2) as usize,
        })
        .collect();

    let mut config = short_run(scheme);
    config.routing = config.routing.with_cell_scale(5);
    Ok(Scenario {
        name: "ground_pair".to_string(),
        topology: Arc::new(topology),
        config,
        traffic,
    })
}

/// A ground station handed from satellite 14 to satellite 15 mid-run,
/// with steady traffic towards it across the change
pub fn handover(scheme: RoutingScheme) -> anyhow::Result<Scenario> {
    let topology = TorusTopology::builder(4, 6)
        .ground_station_on(10.0, 0.0, NodeId(0))
        .ground_station_on(-10.0, 120.0, NodeId(14))
        .handover(1, SimTime(50_000_000), NodeId(15))
        .build()?;

    let traffic = (0..40)
        .map(|i| Transmission {
            at: SimTime(i * 2_000_000),
            from_gs: 0,
            to_gs: 1,
        })
        .collect();

    Ok(Scenario {
        name: "handover".to_string(),
        topology: Arc::new(topology),
        config: short_run(scheme),
        traffic,
    })
}

/// Random ground stations and random traffic on an `orbits × sats_per_orbit`
/// shell, reproducible from `seed`
pub fn random_traffic(
    orbits: u32,
    sats_per_orbit: u32,
    ground_stations: usize,
    packets: usize,
    seed: u64,
) -> anyhow::Result<Scenario> {
    anyhow::ensure!(ground_stations >= 2, "random traffic needs two ground stations");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut builder = TorusTopology::builder(orbits, sats_per_orbit);
    for _ in 0..ground_stations {
        let lat = rng.random_range(-50.0..50.0);
        let lon = rng.random_range(-180.0..180.0);
        builder = builder.ground_station(lat, lon);
    }
    let topology = builder.build()?;

    let config = short_run(RoutingScheme::StaticSnapshot);
    let horizon = config.routing.end_time_ns;
    let mut traffic: Vec<Transmission> = (0..packets)
        .map(|_| {
            let from_gs = rng.random_range(0..ground_stations);
            let to_gs = (from_gs + rng.random_range(1..ground_stations)) % ground_stations;
            Transmission {
                at: SimTime(rng.random_range(0..horizon)),
                from_gs,
                to_gs,
            }
        })
        .collect();
    traffic.sort_by_key(|s| s.at);

    Ok(Scenario {
        name: format!("random_traffic_{}", seed),
        topology: Arc::new(topology),
        config,
        traffic,
    })
}
