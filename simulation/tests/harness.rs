//! End-to-end runs of the simulation harness

use std::sync::Arc;

use satnet_core::{NodeId, SimTime};
use satnet_logging::{MemoryWriter, NodeContextLayer, jsonl_file_layer};
use satnet_routing::{FileRouteSource, RoutingConfig, RoutingError, RoutingScheme};
use satnet_simulation::{SimConfig, Simulation, TorusTopology, scenarios};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;

fn shell() -> Arc<TorusTopology> {
    Arc::new(
        TorusTopology::builder(4, 6)
            .ground_station_on(10.0, 0.0, NodeId(0))
            .ground_station_on(-10.0, 120.0, NodeId(14))
            .handover(1, SimTime(20_000_000), NodeId(15))
            .build()
            .unwrap(),
    )
}

fn config(scheme: RoutingScheme) -> SimConfig {
    let mut routing = RoutingConfig::default().with_scheme(scheme).with_cell_scale(1);
    routing.update_interval_ns = 10_000_000;
    routing.end_time_ns = 40_000_000;
    SimConfig::with_routing(routing)
}

#[test]
fn test_file_snapshots_drive_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let topology = shell();
    let config = config(RoutingScheme::StaticSnapshot);

    let written = topology
        .write_snapshots(dir.path(), config.reload_schedule())
        .unwrap();
    assert_eq!(written, 4);

    let source = FileRouteSource::new(dir.path());
    let mut sim = Simulation::with_source(topology, config, source).unwrap();
    for i in 0..6 {
        sim.send(SimTime(i * 5_000_000), 0, 1).unwrap();
    }
    let stats = sim.run().unwrap();

    assert_eq!(stats.reloads, 4);
    assert_eq!(stats.delivered, 6);
}

#[test]
fn test_config_paths_drive_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let topology = shell();
    let mut config = config(RoutingScheme::Geographic);
    topology
        .write_snapshots(dir.path(), config.reload_schedule())
        .unwrap();
    let tle_path = dir.path().join("elements.tle");
    topology.write_elements(&tle_path).unwrap();
    config.routing.routes_dir = dir.path().to_path_buf();
    config.routing.tle_path = Some(tle_path);

    let mut sim = Simulation::from_config(topology, config).unwrap();
    for i in 0..4 {
        sim.send(SimTime(i * 5_000_000), 0, 1).unwrap();
    }
    let stats = sim.run().unwrap();

    assert_eq!(stats.reloads, 4);
    assert_eq!(stats.phase_updates, 4);
    assert_eq!(stats.packets_sent, 4);
    assert_eq!(stats.in_flight(), 0);
}

#[test]
fn test_missing_element_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(RoutingScheme::Geographic);
    config.routing.routes_dir = dir.path().to_path_buf();
    config.routing.tle_path = Some(dir.path().join("absent.tle"));

    assert!(matches!(
        Simulation::from_config(shell(), config),
        Err(RoutingError::OrbitalFeed(_))
    ));
}

#[test]
fn test_missing_snapshot_file_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let topology = shell();
    let config = config(RoutingScheme::StaticSnapshot);
    topology
        .write_snapshots(dir.path(), config.reload_schedule())
        .unwrap();
    std::fs::remove_file(FileRouteSource::file_path(dir.path(), SimTime(20_000_000))).unwrap();

    let mut sim =
        Simulation::with_source(topology, config, FileRouteSource::new(dir.path())).unwrap();
    assert!(matches!(sim.run(), Err(RoutingError::Snapshot(_))));
}

#[test]
fn test_backpressure_run_over_handover() {
    let mut sim = Simulation::new(shell(), config(RoutingScheme::Backpressure)).unwrap();
    for i in 0..20 {
        sim.send(SimTime(i * 1_500_000), 0, 1).unwrap();
    }
    let stats = sim.run().unwrap();

    assert_eq!(stats.packets_sent, 20);
    assert_eq!(stats.in_flight(), 0);
    assert!(stats.max_hops_seen <= 256);
}

#[test]
fn test_delivery_logged_with_node_context() {
    let writer = MemoryWriter::new();
    let subscriber = Registry::default()
        .with(NodeContextLayer::new())
        .with(jsonl_file_layer(writer.clone(), false, false));

    let instance_id = tracing::subscriber::with_default(subscriber, || {
        let mut sim = Simulation::new(shell(), config(RoutingScheme::StaticSnapshot)).unwrap();
        sim.send(SimTime(1_000), 0, 1).unwrap();
        sim.run().unwrap();
        sim.instance_id(NodeId(25)).unwrap()
    });

    let delivered: Vec<serde_json::Value> = writer
        .lines()
        .iter()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|v| v["message"] == "Delivered")
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["span"]["node_id"], "25");
    assert_eq!(delivered[0]["span"]["node_role"], "ground_station");
    // one instance per node for the whole run
    assert_eq!(delivered[0]["span"]["instance_id"], instance_id.to_string());
}

#[test]
fn test_compare_schemes_on_random_traffic() {
    let scenario = scenarios::random_traffic(5, 6, 3, 20, 42).unwrap();
    let results = scenario.compare().unwrap();
    assert_eq!(results.len(), 3);
    for (scheme, stats) in results {
        assert_eq!(stats.packets_sent, 20, "{:?}", scheme);
        assert_eq!(stats.delivered + stats.dropped, 20, "{:?}", scheme);
        if scheme == RoutingScheme::StaticSnapshot {
            assert_eq!(stats.delivered, 20);
        }
    }
}
