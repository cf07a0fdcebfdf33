//! Events and priority queue for the discrete-event loop

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use satnet_core::{NodeId, PacketSidecar, SimTime};

/// Tie-breaker for events scheduled at the same instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A packet in flight between two ground stations
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: u64,
    pub source: NodeId,
    pub target: NodeId,
    pub sidecar: PacketSidecar,
    /// Links traversed so far
    pub hops: u32,
    pub created_at: SimTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Load the forwarding snapshot for the current tick
    Reload,
    /// Refresh satellite phases
    PhaseTick,
    /// A ground station originates a packet
    Inject { source: NodeId, target: NodeId },
    /// A packet reaches `node`; `on_if` is `None` at the originating station
    Arrival {
        node: NodeId,
        on_if: Option<u32>,
        packet: Packet,
    },
    /// A packet for `target` leaves the queue of `node`
    Depart { node: NodeId, target: NodeId },
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: SimTime,
    pub seq: SequenceNumber,
    pub event: Event,
}

// BinaryHeap is a max-heap; reverse so the earliest event pops first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending events, FIFO among equal times
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, time: SimTime, event: Event) -> SequenceNumber {
        let seq = SequenceNumber(self.next_seq);
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, event });
        seq
    }

    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
