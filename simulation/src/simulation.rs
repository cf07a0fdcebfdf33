//! Discrete-event simulation engine
//!
//! Drives one arbiter per node over a [`TorusTopology`]:
//! - reload ticks install forwarding snapshots into every store
//! - phase ticks refresh the cells of geographic arbiters
//! - packets hop from node to node, one decision per hop, with queue and
//!   telemetry bookkeeping for backpressure arbiters

use std::sync::Arc;

use satnet_core::{
    InterfaceCatalog, NextHop, NodeId, NodeLayout, PacketSidecar, PhaseOracle, PositionOracle,
    RouteSource, SimTime,
};
use satnet_logging::NodeContextGuard;
use satnet_routing::{
    Arbiter, ArbiterFactory, DecisionRequest, FileRouteSource, ForwardingStateStore,
    GroundStationDirectory, MemoryRouteSource, ReloadSchedule, RoutingConfig, RoutingError,
    RoutingResult, RoutingScheme, StateReloadService, TleFeed,
};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::event::{Event, EventQueue, Packet};
use crate::topology::TorusTopology;

/// Configuration for the simulation
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Arbiter configuration shared by every node
    pub routing: RoutingConfig,
    /// Latency of every link, including ground links
    pub hop_delay_ns: u64,
    /// Interval between phase refreshes
    pub phase_interval_ns: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            hop_delay_ns: 1_000_000,
            phase_interval_ns: 100_000_000,
        }
    }
}

impl SimConfig {
    pub fn with_routing(routing: RoutingConfig) -> Self {
        Self {
            phase_interval_ns: routing.update_interval_ns,
            routing,
            ..Self::default()
        }
    }

    /// Reload ticks implied by the routing configuration
    pub fn reload_schedule(&self) -> ReloadSchedule {
        ReloadSchedule::new(
            self.routing.update_interval_ns,
            SimTime(self.routing.end_time_ns),
            self.routing.force_static,
        )
    }

    pub fn validate(&self) -> RoutingResult<()> {
        self.routing.validate()?;
        if self.phase_interval_ns == 0 {
            return Err(RoutingError::Config(
                "phase_interval_ns must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub packets_sent: u64,
    pub delivered: u64,
    /// All drops, including hop-limit drops
    pub dropped: u64,
    pub dropped_hop_limit: u64,
    /// Hops of delivered packets
    pub total_hops: u64,
    /// Source-to-target latency of delivered packets
    pub total_latency_ns: u64,
    pub max_hops_seen: u32,
    pub reloads: u64,
    pub phase_updates: u64,
}

impl SimStats {
    pub fn delivery_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.packets_sent as f64
    }

    pub fn mean_hops(&self) -> f64 {
        if self.delivered == 0 {
            return 0.0;
        }
        self.total_hops as f64 / self.delivered as f64
    }

    /// Packets that were neither delivered nor dropped
    pub fn in_flight(&self) -> u64 {
        self.packets_sent - self.delivered - self.dropped
    }
}

/// The simulation state
pub struct Simulation<S: RouteSource = MemoryRouteSource> {
    topology: Arc<TorusTopology>,
    config: SimConfig,
    stores: Vec<Arc<ForwardingStateStore>>,
    arbiters: Vec<Arbiter>,
    reload: StateReloadService<S>,
    directory: GroundStationDirectory,
    phases: Arc<dyn PhaseOracle>,
    /// Log identity of each node for this run
    instance_ids: Vec<Uuid>,
    queue: EventQueue,
    now: SimTime,
    next_packet: u64,
    stats: SimStats,
}

impl Simulation<MemoryRouteSource> {
    /// Simulation fed with shortest-path snapshots generated from `topology`
    pub fn new(topology: Arc<TorusTopology>, config: SimConfig) -> RoutingResult<Self> {
        let source = topology.route_source(config.reload_schedule());
        Self::with_source(topology, config, source)
    }
}

impl Simulation<FileRouteSource> {
    /// Simulation reading `fstate_<t>.txt` snapshots from `routes_dir`
    pub fn from_config(topology: Arc<TorusTopology>, config: SimConfig) -> RoutingResult<Self> {
        let source = FileRouteSource::new(config.routing.routes_dir.clone());
        Self::with_source(topology, config, source)
    }
}

impl<S: RouteSource> Simulation<S> {
    pub fn with_source(
        topology: Arc<TorusTopology>,
        config: SimConfig,
        source: S,
    ) -> RoutingResult<Self> {
        config.validate()?;
        let layout = *topology.layout();

        let stores: Vec<Arc<ForwardingStateStore>> = layout
            .nodes()
            .map(|node| Arc::new(ForwardingStateStore::new(node, layout)))
            .collect();

        let positions: Arc<dyn PositionOracle> = topology.clone();
        let factory = ArbiterFactory::new(layout, config.routing.clone()).with_positions(positions);
        let arbiters = layout
            .nodes()
            .zip(&stores)
            .map(|(node, store)| factory.build(node, topology.neighbors(node), store.clone()))
            .collect::<RoutingResult<Vec<_>>>()?;

        let catalog: Arc<dyn InterfaceCatalog> = topology.clone();
        let reload = StateReloadService::new(layout, catalog, source, config.reload_schedule())
            .requiring_distance(config.routing.scheme == RoutingScheme::Backpressure);

        let directory = GroundStationDirectory::from_positions(
            topology.ground_positions(),
            topology.inclination_deg(),
            topology.skew_deg(),
            &factory.dims(),
        )?;

        // element sets from `tle_path` replace the fixture's own orbits
        let phases: Arc<dyn PhaseOracle> = match &config.routing.tle_path {
            Some(path) => Arc::new(TleFeed::from_file(path)?),
            None => topology.clone(),
        };
        let instance_ids = layout.nodes().map(|_| Uuid::new_v4()).collect();

        let mut queue = EventQueue::new();
        if let Some(first) = reload.next_tick() {
            queue.schedule(first, Event::Reload);
        }
        if config.routing.scheme == RoutingScheme::Geographic {
            queue.schedule(SimTime::ZERO, Event::PhaseTick);
        }

        info!(
            scheme = ?config.routing.scheme,
            satellites = layout.num_satellites(),
            ground_stations = layout.num_ground_stations,
            "Simulation created"
        );

        Ok(Self {
            topology,
            config,
            stores,
            arbiters,
            reload,
            directory,
            phases,
            instance_ids,
            queue,
            now: SimTime::ZERO,
            next_packet: 0,
            stats: SimStats::default(),
        })
    }

    pub fn layout(&self) -> &NodeLayout {
        self.topology.layout()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn arbiter(&self, node: NodeId) -> Option<&Arbiter> {
        self.arbiters.get(node.index())
    }

    pub fn store(&self, node: NodeId) -> Option<&Arc<ForwardingStateStore>> {
        self.stores.get(node.index())
    }

    /// Instance id stamped on every log line of `node`
    pub fn instance_id(&self, node: NodeId) -> Option<Uuid> {
        self.instance_ids.get(node.index()).copied()
    }

    /// Queue a packet from ground station `from_gs` to ground station `to_gs`
    pub fn send(&mut self, at: SimTime, from_gs: usize, to_gs: usize) -> RoutingResult<()> {
        let layout = self.topology.layout();
        let (Some(source), Some(target)) = (layout.gs_node(from_gs), layout.gs_node(to_gs)) else {
            return Err(RoutingError::Config(format!(
                "no ground station pair ({}, {})",
                from_gs, to_gs
            )));
        };
        self.queue.schedule(at, Event::Inject { source, target });
        Ok(())
    }

    /// Process events until the queue is empty
    #[instrument(skip(self))]
    pub fn run(&mut self) -> RoutingResult<&SimStats> {
        while let Some(scheduled) = self.queue.pop() {
            self.now = scheduled.time;
            self.process(scheduled.event)?;
        }
        info!(
            sent = self.stats.packets_sent,
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            reloads = self.stats.reloads,
            "Simulation finished"
        );
        Ok(&self.stats)
    }

    fn process(&mut self, event: Event) -> RoutingResult<()> {
        match event {
            Event::Reload => self.on_reload(),
            Event::PhaseTick => self.on_phase_tick(),
            Event::Inject { source, target } => self.on_inject(source, target),
            Event::Arrival {
                node,
                on_if,
                packet,
            } => self.on_arrival(node, on_if, packet),
            Event::Depart { node, target } => {
                self.arbiter_mut(node)?.on_dequeue(target);
                Ok(())
            }
        }
    }

    fn arbiter_mut(&mut self, node: NodeId) -> RoutingResult<&mut Arbiter> {
        self.arbiters
            .get_mut(node.index())
            .ok_or(RoutingError::UnknownNode(node))
    }

    fn on_reload(&mut self) -> RoutingResult<()> {
        let access = self.reload.reload_into(self.now, &self.stores)?;
        for arbiter in &mut self.arbiters {
            arbiter.apply_access(access.clone());
        }
        self.stats.reloads += 1;

        self.reload.advance();
        if let Some(next) = self.reload.next_tick() {
            self.queue.schedule(next, Event::Reload);
        }
        Ok(())
    }

    fn on_phase_tick(&mut self) -> RoutingResult<()> {
        let oracle = self.phases.as_ref();
        for arbiter in &mut self.arbiters {
            arbiter.update_phase(oracle, self.now)?;
        }
        self.stats.phase_updates += 1;

        let next = self.now.saturating_add(self.config.phase_interval_ns);
        if next.as_nanos() < self.config.routing.end_time_ns {
            self.queue.schedule(next, Event::PhaseTick);
        }
        Ok(())
    }

    fn on_inject(&mut self, source: NodeId, target: NodeId) -> RoutingResult<()> {
        let header = self
            .topology
            .layout()
            .gs_index(target)
            .map(|index| self.directory.header_for(index))
            .ok_or(RoutingError::UnknownNode(target))?;

        let packet = Packet {
            id: self.next_packet,
            source,
            target,
            sidecar: PacketSidecar::with_geo(header),
            hops: 0,
            created_at: self.now,
        };
        self.next_packet += 1;
        self.stats.packets_sent += 1;
        self.on_arrival(source, None, packet)
    }

    fn on_arrival(&mut self, node: NodeId, on_if: Option<u32>, mut packet: Packet) -> RoutingResult<()> {
        let now = self.now;
        let hop_delay = self.config.hop_delay_ns;
        let max_hops = self.config.routing.max_hops;

        let instance_id = self
            .instance_id(node)
            .ok_or(RoutingError::UnknownNode(node))?;
        let guard =
            NodeContextGuard::with_instance_id(node, self.topology.layout().role(node), instance_id);
        let span = guard.span();
        let _entered = span.enter();

        let arbiter = self
            .arbiters
            .get_mut(node.index())
            .ok_or(RoutingError::UnknownNode(node))?;

        if let Some(local_if) = on_if
            && let Some(telemetry) = packet.sidecar.take_telemetry()
        {
            arbiter.ingest_telemetry(local_if, &telemetry);
        }

        if node == packet.target {
            let latency = now.as_nanos() - packet.created_at.as_nanos();
            debug!(packet = packet.id, hops = packet.hops, latency_ns = latency, "Delivered");
            self.stats.delivered += 1;
            self.stats.total_hops += packet.hops as u64;
            self.stats.total_latency_ns += latency;
            self.stats.max_hops_seen = self.stats.max_hops_seen.max(packet.hops);
            return Ok(());
        }

        if packet.hops >= max_hops {
            warn!(packet = packet.id, hops = packet.hops, target = %packet.target, "Hop limit reached");
            self.stats.dropped += 1;
            self.stats.dropped_hop_limit += 1;
            return Ok(());
        }

        let entry = {
            let request = DecisionRequest::new(packet.source, packet.target, now)
                .with_sidecar(&packet.sidecar);
            arbiter.decide(&request)?
        };

        let NextHop::Forward {
            node: next,
            remote_if,
            ..
        } = entry.hop
        else {
            debug!(packet = packet.id, target = %packet.target, "Dropped");
            self.stats.dropped += 1;
            return Ok(());
        };

        arbiter.on_enqueue(packet.target);
        if let Some(telemetry) = arbiter.outgoing_telemetry(packet.target) {
            packet.sidecar.telemetry = Some(telemetry);
        }
        trace!(packet = packet.id, next = %next, "Forwarding");

        let target = packet.target;
        packet.hops += 1;
        let at = now.saturating_add(hop_delay);
        self.queue.schedule(at, Event::Depart { node, target });
        self.queue.schedule(
            at,
            Event::Arrival {
                node: next,
                on_if: Some(remote_if),
                packet,
            },
        );
        Ok(())
    }
}
