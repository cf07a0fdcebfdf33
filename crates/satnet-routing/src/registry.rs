//! Process-wide phase registry shared by all satellite arbiters
//!
//! One `i64` slot per satellite behind a single mutex. Each satellite holds
//! a [`SlotHandle`] bound to its own slot and is the only writer of it; any
//! holder may read any slot.
//!
//! Locking contract: the mutex is held for exactly one slot read or write
//! and never across a call back into routing code, so the registry stays
//! correct if arbiters are ever driven from several threads.

use std::sync::Arc;

use parking_lot::Mutex;
use satnet_core::{Cell, NodeId};
use tracing::trace;

/// Shared array of per-satellite values
#[derive(Debug)]
pub struct SharedPhaseRegistry {
    slots: Mutex<Vec<i64>>,
}

impl SharedPhaseRegistry {
    pub fn new(num_satellites: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![0; num_satellites]),
        })
    }

    /// Bind `owner` to its slot, zeroing it.
    ///
    /// Returns `None` when `owner` has no slot (ground stations).
    pub fn attach(self: &Arc<Self>, owner: NodeId) -> Option<SlotHandle> {
        let slot = owner.index();
        {
            let mut slots = self.slots.lock();
            *slots.get_mut(slot)? = 0;
        }
        Some(SlotHandle {
            registry: Arc::clone(self),
            slot,
        })
    }

    /// Value in `slot`, `None` when out of range
    pub fn read(&self, slot: usize) -> Option<i64> {
        self.slots.lock().get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, slot: usize, value: i64) {
        if let Some(entry) = self.slots.lock().get_mut(slot) {
            *entry = value;
        }
    }
}

/// Write access to one satellite's slot
#[derive(Debug, Clone)]
pub struct SlotHandle {
    registry: Arc<SharedPhaseRegistry>,
    slot: usize,
}

impl SlotHandle {
    pub fn owner(&self) -> NodeId {
        NodeId(self.slot as u32)
    }

    pub fn set(&self, value: i64) {
        trace!(slot = self.slot, value, "Registry slot written");
        self.registry.write(self.slot, value);
    }

    /// Current value of the owner's slot
    pub fn get_own(&self) -> i64 {
        self.registry.read(self.slot).unwrap_or_default()
    }

    /// Value of any satellite's slot
    pub fn get(&self, slot: usize) -> Option<i64> {
        self.registry.read(slot)
    }
}

/// Pack a cell into a registry value
pub fn pack_cell(cell: Cell) -> i64 {
    ((cell.alpha as i64) << 32) | cell.gamma as i64
}

/// Inverse of [`pack_cell`]
pub fn unpack_cell(value: i64) -> Cell {
    Cell::new((value >> 32) as u32, (value & 0xffff_ffff) as u32)
}
