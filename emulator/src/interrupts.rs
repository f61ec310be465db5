use std::collections::VecDeque;

use common::constants::{INTERRUPT_VECTOR_BASE, NUM_INTERRUPT_LEVELS};
use log::{debug, trace, warn};

use crate::EmulatorState;

/// A device's request for service on one level (0 highest, 5 lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub level: u8,
    pub device: u8,
    // Snapshot of the level status word bits this request contributes.
    pub status: u16,
}

/// Handle to a pooled interrupt. The generation makes a handle to a recycled
/// slot compare unequal to the handle of its new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterruptId {
    slot: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    interrupt: Option<Interrupt>,
}

/// Reusable storage for interrupts. An interrupt is either in use (and then
/// owned by exactly one level queue) or free, never both.
#[derive(Debug, Default)]
pub struct InterruptPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl InterruptPool {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = InterruptPool {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
        };
        for slot in 0..capacity {
            pool.slots.push(Slot::default());
            pool.free.push(slot as u32);
        }
        pool.free.reverse();
        pool
    }

    pub fn acquire(&mut self, interrupt: Interrupt) -> InterruptId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.interrupt = Some(interrupt);
        InterruptId { slot, generation: entry.generation }
    }

    pub fn release(&mut self, id: InterruptId) -> Option<Interrupt> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let interrupt = entry.interrupt.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        Some(interrupt)
    }

    pub fn get(&self, id: InterruptId) -> Option<&Interrupt> {
        self.slots
            .get(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.interrupt.as_ref())
    }

    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}


/// Six priority queues of pending interrupts, plus the stack of interrupts
/// being serviced. The top of the stack is the current level.
#[derive(Debug, Default)]
pub struct InterruptController {
    pool: InterruptPool,
    queues: [VecDeque<InterruptId>; NUM_INTERRUPT_LEVELS],
    serviced: Vec<InterruptId>,
    active: usize,
}

impl InterruptController {
    pub fn new(pool: InterruptPool) -> Self {
        InterruptController {
            pool,
            queues: Default::default(),
            serviced: Vec::new(),
            active: 0,
        }
    }

    pub fn raise(&mut self, device: u8, level: u8, status: u16) -> Option<InterruptId> {
        if level as usize >= NUM_INTERRUPT_LEVELS {
            warn!("Device {device:#04x} raised an interrupt on invalid level {level}");
            return None;
        }
        let id = self.pool.acquire(Interrupt { level, device, status });
        self.queues[level as usize].push_back(id);
        self.active += 1;
        debug!("Interrupt raised by device {device:#04x} on level {level}, status {status:#06x}");
        Some(id)
    }

    /// Vectors to the highest priority pending level if it outranks the level
    /// being serviced. Returns whether control was redirected.
    pub fn handle(&mut self, state: &mut EmulatorState) -> bool {
        if self.active == 0 {
            return false;
        }
        let Some(level) = self.queues.iter().position(|q| !q.is_empty()) else {
            return false;
        };
        if self.current_level().is_some_and(|current| current as usize <= level) {
            return false;
        }

        let id = self.queues[level][0];
        self.serviced.push(id);

        // Same as a BSI indirect through the level's vector cell.
        let vector = state.mem_read(INTERRUPT_VECTOR_BASE + level as u16);
        let old_iar = state.iar();
        state.mem_write(vector, old_iar);
        state.set_iar(vector.wrapping_add(1));
        debug!("Interrupt on level {level}; saving IAR {old_iar:#06x} at {vector:#06x}");
        true
    }

    /// Ends service of the current level. `still_active` reports whether the
    /// causing device still holds this interrupt as its active one; if so the
    /// interrupt stays queued and will be serviced again.
    pub fn clear(&mut self, still_active: impl FnOnce(InterruptId, &Interrupt) -> bool) {
        let Some(id) = self.serviced.pop() else {
            warn!("Interrupt clear with no level being serviced");
            return;
        };
        let Some(interrupt) = self.pool.get(id).copied() else {
            warn!("Serviced interrupt {id:?} is no longer pooled");
            return;
        };

        if still_active(id, &interrupt) {
            trace!("Level {} cleared; device {:#04x} still requesting", interrupt.level, interrupt.device);
            return;
        }

        let queue = &mut self.queues[interrupt.level as usize];
        if let Some(pos) = queue.iter().position(|queued| *queued == id) {
            queue.remove(pos);
        }
        self.pool.release(id);
        self.active -= 1;
        debug!("Level {} cleared; interrupt from device {:#04x} released", interrupt.level, interrupt.device);
    }

    pub fn current(&self) -> Option<InterruptId> {
        self.serviced.last().copied()
    }

    pub fn current_level(&self) -> Option<u8> {
        self.current()
            .and_then(|id| self.pool.get(id))
            .map(|interrupt| interrupt.level)
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn service_depth(&self) -> usize {
        self.serviced.len()
    }

    pub fn queue_len(&self, level: u8) -> usize {
        self.queues.get(level as usize).map_or(0, VecDeque::len)
    }

    pub fn is_queued(&self, id: InterruptId) -> bool {
        self.queues.iter().any(|q| q.contains(&id))
    }

    pub fn get(&self, id: InterruptId) -> Option<&Interrupt> {
        self.pool.get(id)
    }

    /// The level status word: status bits of every request queued on `level`.
    pub fn level_status(&self, level: u8) -> u16 {
        let Some(queue) = self.queues.get(level as usize) else {
            return 0;
        };
        queue
            .iter()
            .filter_map(|id| self.pool.get(*id))
            .fold(0, |acc, interrupt| acc | interrupt.status)
    }

    pub fn pool(&self) -> &InterruptPool {
        &self.pool
    }

    // Returns everything to the pool.
    pub fn reset(&mut self) {
        self.serviced.clear();
        for queue in self.queues.iter_mut() {
            for id in queue.drain(..) {
                self.pool.release(id);
            }
        }
        self.active = 0;
    }
}
