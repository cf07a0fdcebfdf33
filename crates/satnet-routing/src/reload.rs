//! Periodic loading of forwarding snapshots
//!
//! ## Core Components
//!
//! - [`ReloadSchedule`]: the ticks at which snapshots are loaded
//! - [`SnapshotValidator`]: checks each record against the installed devices
//! - [`FileRouteSource`] / [`MemoryRouteSource`]: where snapshots come from
//! - [`StateReloadService`]: turns one snapshot into a [`ReloadBatch`] of
//!   finished tables plus the refreshed [`DestinationSatelliteSet`]
//!
//! A batch is built completely before anything is installed. A record that
//! fails validation aborts the whole tick and nothing is swapped in.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use satnet_core::{
    Device, InterfaceCatalog, NextHop, NodeId, NodeLayout, RouteSource, SimTime, SnapshotError,
    SnapshotRecord, ValidationError,
};
use tracing::{debug, error, info, instrument};

use crate::access::DestinationSatelliteSet;
use crate::error::RoutingResult;
use crate::store::{ForwardingStateStore, ForwardingTable, TableBuilder};

/// Reload ticks: `0, interval, 2 * interval, ...` while below the horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSchedule {
    next: Option<SimTime>,
    interval_ns: u64,
    end: SimTime,
    force_static: bool,
}

impl ReloadSchedule {
    pub fn new(interval_ns: u64, end: SimTime, force_static: bool) -> Self {
        Self {
            next: Some(SimTime::ZERO),
            interval_ns,
            end,
            force_static,
        }
    }

    /// Tick that will be yielded next, if any
    pub fn peek(&self) -> Option<SimTime> {
        self.next
    }
}

impl Iterator for ReloadSchedule {
    type Item = SimTime;

    fn next(&mut self) -> Option<SimTime> {
        let current = self.next?;
        self.next = if self.force_static || self.interval_ns == 0 {
            None
        } else {
            let following = current.saturating_add(self.interval_ns);
            (following < self.end).then_some(following)
        };
        Some(current)
    }
}

/// A record that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRecord {
    pub current: NodeId,
    pub target: NodeId,
    pub hop: NextHop,
    pub distance: Option<u32>,
}

/// Checks snapshot records against node numbering and installed devices
pub struct SnapshotValidator<'a> {
    layout: &'a NodeLayout,
    catalog: &'a dyn InterfaceCatalog,
    require_distance: bool,
}

impl<'a> SnapshotValidator<'a> {
    pub fn new(layout: &'a NodeLayout, catalog: &'a dyn InterfaceCatalog) -> Self {
        Self {
            layout,
            catalog,
            require_distance: false,
        }
    }

    /// Demand the distance column on every forwarding record
    pub fn requiring_distance(mut self, require: bool) -> Self {
        self.require_distance = require;
        self
    }

    pub fn validate(&self, record: &SnapshotRecord) -> Result<ValidatedRecord, ValidationError> {
        let current = self.layout.check_node(record.current)?;
        let target = self.layout.check_node(record.target)?;
        let hop = record.hop()?;

        if let NextHop::Forward {
            node,
            local_if,
            remote_if,
        } = hop
        {
            let next_hop = self.layout.check_node(node.0 as i64)?;
            self.check_interface(current, local_if)?;
            self.check_interface(next_hop, remote_if)?;
            self.check_link(current, local_if, next_hop, remote_if)?;
            if self.require_distance && record.distance.is_none() {
                return Err(ValidationError::MissingDistance {
                    node: current,
                    target,
                });
            }
        }

        Ok(ValidatedRecord {
            current,
            target,
            hop,
            distance: record.distance,
        })
    }

    fn check_interface(&self, node: NodeId, interface: u32) -> Result<(), ValidationError> {
        let count = self.catalog.interface_count(node);
        if interface as usize >= count {
            return Err(ValidationError::InterfaceOutOfRange {
                node,
                interface: interface as i64,
                count,
            });
        }
        Ok(())
    }

    fn check_link(
        &self,
        node: NodeId,
        local_if: u32,
        next_hop: NodeId,
        remote_if: u32,
    ) -> Result<(), ValidationError> {
        let local = self.catalog.device(node, local_if).unwrap_or(Device::Other);
        let remote = self
            .catalog
            .device(next_hop, remote_if)
            .unwrap_or(Device::Other);

        match local {
            Device::Gsl if remote.is_gsl() => Ok(()),
            Device::Gsl => Err(ValidationError::GslMismatch {
                node,
                local_if,
                next_hop,
                remote_if,
            }),
            Device::Isl { .. } if !remote.is_isl() => Err(ValidationError::IslMismatch {
                node,
                local_if,
                next_hop,
                remote_if,
            }),
            Device::Isl {
                peer,
                peer_interface,
            } => {
                if peer == next_hop && peer_interface == remote_if {
                    Ok(())
                } else {
                    Err(ValidationError::IslPeerMismatch {
                        node,
                        local_if,
                        declared_node: next_hop,
                        declared_if: remote_if,
                        actual_node: peer,
                        actual_if: peer_interface,
                    })
                }
            }
            Device::Other => Err(ValidationError::UnsupportedDevice {
                node,
                interface: local_if,
            }),
        }
    }
}

/// Snapshots stored as `<dir>/fstate_<t>.txt`, one file per tick
#[derive(Debug, Clone)]
pub struct FileRouteSource {
    dir: PathBuf,
}

impl FileRouteSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, at: SimTime) -> PathBuf {
        Self::file_path(&self.dir, at)
    }

    pub fn file_path(dir: &Path, at: SimTime) -> PathBuf {
        dir.join(format!("fstate_{}.txt", at.as_nanos()))
    }
}

impl RouteSource for FileRouteSource {
    fn snapshot(&mut self, at: SimTime) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        let path = self.path_for(at);
        let text = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SnapshotError::Missing(path.clone())
            } else {
                SnapshotError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        SnapshotRecord::parse_all(&text)
    }
}

/// Snapshots held in memory, keyed by tick
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteSource {
    snapshots: BTreeMap<SimTime, Vec<SnapshotRecord>>,
}

impl MemoryRouteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, at: SimTime, records: Vec<SnapshotRecord>) {
        self.snapshots.insert(at, records);
    }

    pub fn with_snapshot(mut self, at: SimTime, records: Vec<SnapshotRecord>) -> Self {
        self.insert(at, records);
        self
    }
}

impl RouteSource for MemoryRouteSource {
    fn snapshot(&mut self, at: SimTime) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        self.snapshots
            .get(&at)
            .cloned()
            .ok_or(SnapshotError::NotScheduled(at.as_nanos()))
    }
}

/// Everything one reload tick produced, ready to install
#[derive(Debug)]
pub struct ReloadBatch {
    pub at: SimTime,
    pub tables: HashMap<NodeId, ForwardingTable>,
    pub access: Arc<DestinationSatelliteSet>,
    pub records: usize,
}

impl ReloadBatch {
    /// Install every table into the store of its owner.
    ///
    /// `stores` is indexed by node id.
    pub fn install(self, stores: &[Arc<ForwardingStateStore>]) -> Arc<DestinationSatelliteSet> {
        for (node, table) in self.tables {
            if let Some(store) = stores.get(node.index()) {
                store.replace(table);
            }
        }
        self.access
    }
}

/// Turns the snapshots of a [`RouteSource`] into installable batches
pub struct StateReloadService<S: RouteSource> {
    layout: NodeLayout,
    catalog: Arc<dyn InterfaceCatalog>,
    source: S,
    schedule: ReloadSchedule,
    require_distance: bool,
    access: DestinationSatelliteSet,
    loaded: bool,
}

impl<S: RouteSource> StateReloadService<S> {
    pub fn new(
        layout: NodeLayout,
        catalog: Arc<dyn InterfaceCatalog>,
        source: S,
        schedule: ReloadSchedule,
    ) -> Self {
        Self {
            layout,
            catalog,
            source,
            schedule,
            require_distance: false,
            access: DestinationSatelliteSet::new(layout.num_ground_stations as usize),
            loaded: false,
        }
    }

    /// Require the distance-weight column (backpressure routing)
    pub fn requiring_distance(mut self, require: bool) -> Self {
        self.require_distance = require;
        self
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    /// Next scheduled tick without consuming it
    pub fn next_tick(&self) -> Option<SimTime> {
        self.schedule.peek()
    }

    /// Consume the next tick of the schedule
    pub fn advance(&mut self) -> Option<SimTime> {
        self.schedule.next()
    }

    pub fn access(&self) -> &DestinationSatelliteSet {
        &self.access
    }

    /// Load and validate the snapshot for `at`.
    ///
    /// `stage` hands out the staging table for a node, seeded from whatever
    /// that node has installed. On the first tick every node is staged so
    /// that incomplete tables are caught.
    #[instrument(skip_all, fields(at = %at))]
    pub fn prepare<F>(&mut self, at: SimTime, mut stage: F) -> RoutingResult<ReloadBatch>
    where
        F: FnMut(NodeId) -> TableBuilder,
    {
        let records = self.source.snapshot(at).inspect_err(|e| {
            error!(error = %e, "Forwarding snapshot unavailable");
        })?;

        let validator = SnapshotValidator::new(&self.layout, self.catalog.as_ref())
            .requiring_distance(self.require_distance);

        let mut builders: BTreeMap<NodeId, TableBuilder> = BTreeMap::new();
        if !self.loaded {
            for node in self.layout.nodes() {
                builders.insert(node, stage(node));
            }
        }

        let mut access = self.access.clone();
        for record in &records {
            let valid = validator.validate(record).inspect_err(|e| {
                error!(error = %e, record = %record.to_line(), "Invalid forwarding record");
            })?;
            let builder = builders
                .entry(valid.current)
                .or_insert_with(|| stage(valid.current));
            builder.set_hop(valid.target, valid.hop)?;
            if let Some(distance) = valid.distance {
                builder.set_distance(valid.target, distance);
            }
            if access.observe(&self.layout, valid.current, valid.target, &valid.hop) {
                debug!(
                    satellite = %valid.current,
                    ground_station = %valid.target,
                    serving = valid.hop.next_node() == Some(valid.target),
                    "Access point changed"
                );
            }
        }

        let mut tables = HashMap::with_capacity(builders.len());
        for (node, builder) in builders {
            let table = builder.finish(at).inspect_err(|e| {
                error!(error = %e, "Forwarding table incomplete");
            })?;
            tables.insert(node, table);
        }

        self.access = access;
        self.loaded = true;
        info!(records = records.len(), tables = tables.len(), "Prepared forwarding snapshot");

        Ok(ReloadBatch {
            at,
            tables,
            access: Arc::new(self.access.clone()),
            records: records.len(),
        })
    }

    /// Prepare the snapshot for `at` and install it into `stores`
    pub fn reload_into(
        &mut self,
        at: SimTime,
        stores: &[Arc<ForwardingStateStore>],
    ) -> RoutingResult<Arc<DestinationSatelliteSet>> {
        let layout = self.layout;
        let batch = self.prepare(at, |node| match stores.get(node.index()) {
            Some(store) => store.stage(),
            None => TableBuilder::first(node, &layout),
        })?;
        Ok(batch.install(stores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;

    /// Two satellites joined by one ISL (if 0 each) with a GSL on if 1;
    /// two ground stations with a single GSL.
    struct PairCatalog;

    impl InterfaceCatalog for PairCatalog {
        fn interface_count(&self, node: NodeId) -> usize {
            if node.0 < 2 { 3 } else { 1 }
        }

        fn device(&self, node: NodeId, interface: u32) -> Option<Device> {
            match (node.0, interface) {
                (0, 0) => Some(Device::Isl {
                    peer: NodeId(1),
                    peer_interface: 0,
                }),
                (1, 0) => Some(Device::Isl {
                    peer: NodeId(0),
                    peer_interface: 0,
                }),
                (0 | 1, 1) => Some(Device::Gsl),
                (0 | 1, 2) => Some(Device::Other),
                (2 | 3, 0) => Some(Device::Gsl),
                _ => None,
            }
        }
    }

    fn layout() -> NodeLayout {
        NodeLayout::new(1, 2, 2)
    }

    fn rec(line: &str) -> SnapshotRecord {
        SnapshotRecord::parse_line(1, line).unwrap()
    }

    fn full_snapshot() -> Vec<SnapshotRecord> {
        [
            "0,2,2,1,0",
            "0,3,1,0,0",
            "1,2,0,0,0",
            "1,3,3,1,0",
            "2,3,0,0,1",
            "3,2,1,0,1",
        ]
        .into_iter()
        .map(rec)
        .collect()
    }

    fn stores() -> Vec<Arc<ForwardingStateStore>> {
        layout()
            .nodes()
            .map(|n| Arc::new(ForwardingStateStore::new(n, layout())))
            .collect()
    }

    fn service(source: MemoryRouteSource) -> StateReloadService<MemoryRouteSource> {
        StateReloadService::new(
            layout(),
            Arc::new(PairCatalog),
            source,
            ReloadSchedule::new(100, SimTime(1_000), false),
        )
    }

    #[test]
    fn test_schedule_ticks() {
        let ticks: Vec<u64> = ReloadSchedule::new(100, SimTime(350), false)
            .map(SimTime::as_nanos)
            .collect();
        assert_eq!(ticks, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_schedule_force_static() {
        let ticks: Vec<SimTime> = ReloadSchedule::new(100, SimTime(350), true).collect();
        assert_eq!(ticks, vec![SimTime::ZERO]);
    }

    #[test]
    fn test_schedule_stops_before_horizon() {
        let ticks: Vec<u64> = ReloadSchedule::new(100, SimTime(300), false)
            .map(SimTime::as_nanos)
            .collect();
        assert_eq!(ticks, vec![0, 100, 200]);
    }

    #[test]
    fn test_validator_accepts_consistent_links() {
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &PairCatalog);
        for record in full_snapshot() {
            assert!(validator.validate(&record).is_ok(), "{:?}", record);
        }
        assert!(validator.validate(&rec("0,3,-1,-1,-1")).is_ok());
    }

    #[test]
    fn test_validator_rejects_out_of_range() {
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &PairCatalog);
        assert!(matches!(
            validator.validate(&rec("4,2,2,1,0")),
            Err(ValidationError::NodeOutOfRange { node: 4, .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,9,1,0")),
            Err(ValidationError::NodeOutOfRange { node: 9, .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,2,5,0")),
            Err(ValidationError::InterfaceOutOfRange { interface: 5, .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,2,1,1")),
            Err(ValidationError::InterfaceOutOfRange { interface: 1, .. })
        ));
    }

    #[test]
    fn test_validator_rejects_partial_drop() {
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &PairCatalog);
        assert!(matches!(
            validator.validate(&rec("0,2,-1,1,-1")),
            Err(ValidationError::PartialDrop { .. })
        ));
    }

    #[test]
    fn test_validator_rejects_device_mismatches() {
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &PairCatalog);
        assert!(matches!(
            validator.validate(&rec("0,2,1,1,0")),
            Err(ValidationError::GslMismatch { .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,2,0,0")),
            Err(ValidationError::IslMismatch { .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,1,0,1")),
            Err(ValidationError::IslMismatch { .. })
        ));
        assert!(matches!(
            validator.validate(&rec("0,2,1,2,0")),
            Err(ValidationError::UnsupportedDevice { interface: 2, .. })
        ));
    }

    #[test]
    fn test_validator_rejects_far_end_mismatch() {
        struct CrossedCatalog;
        impl InterfaceCatalog for CrossedCatalog {
            fn interface_count(&self, _node: NodeId) -> usize {
                2
            }
            fn device(&self, _node: NodeId, interface: u32) -> Option<Device> {
                Some(Device::Isl {
                    peer: NodeId(1),
                    peer_interface: 1 - interface.min(1),
                })
            }
        }
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &CrossedCatalog);
        assert!(validator.validate(&rec("0,2,1,0,1")).is_ok());
        assert!(matches!(
            validator.validate(&rec("0,2,1,0,0")),
            Err(ValidationError::IslPeerMismatch {
                actual_node: NodeId(1),
                actual_if: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_validator_requires_distance() {
        let layout = layout();
        let validator = SnapshotValidator::new(&layout, &PairCatalog).requiring_distance(true);
        assert!(matches!(
            validator.validate(&rec("0,2,2,1,0")),
            Err(ValidationError::MissingDistance { .. })
        ));
        assert!(validator.validate(&rec("0,2,2,1,0,1")).is_ok());
        assert!(validator.validate(&rec("0,2,-1,-1,-1")).is_ok());
    }

    #[test]
    fn test_reload_installs_tables_and_access() {
        let stores = stores();
        let mut service =
            service(MemoryRouteSource::new().with_snapshot(SimTime(0), full_snapshot()));
        let access = service.reload_into(SimTime(0), &stores).unwrap();

        assert_eq!(stores[0].lookup(NodeId(2)), NextHop::forward(NodeId(2), 1, 0));
        assert_eq!(stores[0].lookup(NodeId(3)), NextHop::forward(NodeId(1), 0, 0));
        assert!(stores[2].lookup(NodeId(2)).is_drop());
        assert!(access.is_access_point(NodeId(0), 0));
        assert!(access.is_access_point(NodeId(1), 1));
        assert!(!access.is_access_point(NodeId(1), 0));
    }

    #[test]
    fn test_delta_reload_updates_access() {
        let stores = stores();
        let source = MemoryRouteSource::new()
            .with_snapshot(SimTime(0), full_snapshot())
            .with_snapshot(SimTime(100), vec![rec("0,2,1,0,0"), rec("1,2,2,1,0")]);
        let mut service = service(source);
        service.reload_into(SimTime(0), &stores).unwrap();
        let access = service.reload_into(SimTime(100), &stores).unwrap();

        assert!(!access.is_access_point(NodeId(0), 0));
        assert!(access.is_access_point(NodeId(1), 0));
        assert_eq!(stores[0].lookup(NodeId(3)), NextHop::forward(NodeId(1), 0, 0));
        assert_eq!(stores[0].current().unwrap().version(), 2);
        // untouched nodes keep their first table
        assert_eq!(stores[2].current().unwrap().version(), 1);
    }

    #[test]
    fn test_invalid_record_installs_nothing() {
        let stores = stores();
        let source = MemoryRouteSource::new()
            .with_snapshot(SimTime(0), full_snapshot())
            .with_snapshot(SimTime(100), vec![rec("0,2,1,0,0"), rec("1,2,2,0,0")]);
        let mut service = service(source);
        service.reload_into(SimTime(0), &stores).unwrap();

        let err = service.reload_into(SimTime(100), &stores).unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
        assert_eq!(stores[0].lookup(NodeId(2)), NextHop::forward(NodeId(2), 1, 0));
        assert!(service.access().is_access_point(NodeId(0), 0));
    }

    #[test]
    fn test_incomplete_first_snapshot_is_fatal() {
        let stores = stores();
        let mut snapshot = full_snapshot();
        snapshot.pop();
        let mut service = service(MemoryRouteSource::new().with_snapshot(SimTime(0), snapshot));
        let err = service.reload_into(SimTime(0), &stores).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::Validation(ValidationError::IncompleteSnapshot { node: NodeId(3), .. })
        ));
        assert!(!stores[0].is_loaded());
    }

    #[test]
    fn test_missing_snapshot_is_fatal() {
        let stores = stores();
        let mut service = service(MemoryRouteSource::new());
        assert!(matches!(
            service.reload_into(SimTime(0), &stores),
            Err(RoutingError::Snapshot(SnapshotError::NotScheduled(0)))
        ));
    }

    #[test]
    fn test_file_route_source() {
        let dir = tempfile::tempdir().unwrap();
        let text: Vec<String> = full_snapshot().iter().map(|r| r.to_line()).collect();
        std::fs::write(dir.path().join("fstate_0.txt"), text.join("\n")).unwrap();

        let mut source = FileRouteSource::new(dir.path());
        assert_eq!(source.snapshot(SimTime(0)).unwrap(), full_snapshot());
        assert!(matches!(
            source.snapshot(SimTime(100)),
            Err(SnapshotError::Missing(path)) if path.ends_with("fstate_100.txt")
        ));
    }
}
