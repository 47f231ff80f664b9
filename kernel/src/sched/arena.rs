//! Scheduling-context arena
//!
//! Slot map of scheduling contexts owned by one CPU. Queues link entities by
//! [`SchedId`] instead of pointers; a freed slot bumps its generation so an
//! id kept past `free` no longer resolves.

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use super::context::SchedContext;

/// Stable handle to a scheduling context inside its CPU's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedId {
    index: u32,
    generation: u32,
}

impl SchedId {
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

enum Slot {
    Occupied { generation: u32, sc: SchedContext },
    Free { generation: u32, next_free: Option<u32> },
}

/// Per-CPU slot map of scheduling contexts.
pub struct SchedArena {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    len: usize,
}

impl SchedArena {
    pub const fn new() -> Self {
        Self { slots: Vec::new(), free_head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `sc` and return its handle.
    pub fn insert(&mut self, sc: SchedContext) -> SchedId {
        self.len += 1;
        match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let Slot::Free { generation, next_free } = *slot else {
                    unreachable!("free list points at an occupied slot");
                };
                self.free_head = next_free;
                *slot = Slot::Occupied { generation, sc };
                SchedId { index, generation }
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("sched arena exhausted");
                self.slots.push(Slot::Occupied { generation: 0, sc });
                SchedId { index, generation: 0 }
            }
        }
    }

    /// Release the slot behind `id`, returning its context.
    ///
    /// The caller must have taken the context off every queue first.
    pub fn remove(&mut self, id: SchedId) -> Option<SchedContext> {
        let slot = self.slots.get_mut(id.index as usize)?;
        let generation = match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => *generation,
            _ => return None,
        };
        let freed = Slot::Free {
            generation: generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let Slot::Occupied { sc, .. } = core::mem::replace(slot, freed) else {
            unreachable!();
        };
        debug_assert!(!sc.in_ready_list(), "freeing an enqueued scheduling context");
        self.free_head = Some(id.index);
        self.len -= 1;
        Some(sc)
    }

    pub fn get(&self, id: SchedId) -> Option<&SchedContext> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, sc } if *generation == id.generation => Some(sc),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: SchedId) -> Option<&mut SchedContext> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, sc } if *generation == id.generation => Some(sc),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, id: SchedId) -> bool {
        self.get(id).is_some()
    }

    /// Mutable access to two distinct contexts at once.
    pub fn pair_mut(&mut self, a: SchedId, b: SchedId) -> (&mut SchedContext, &mut SchedContext) {
        assert_ne!(a.index, b.index, "pair_mut on the same slot");
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.slots.split_at_mut(hi.index as usize);
        let first = match &mut head[lo.index as usize] {
            Slot::Occupied { generation, sc } if *generation == lo.generation => sc,
            _ => panic!("stale sched id {:?}", lo),
        };
        let second = match &mut tail[0] {
            Slot::Occupied { generation, sc } if *generation == hi.generation => sc,
            _ => panic!("stale sched id {:?}", hi),
        };
        if swapped { (second, first) } else { (first, second) }
    }
}

impl Default for SchedArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<SchedId> for SchedArena {
    type Output = SchedContext;

    fn index(&self, id: SchedId) -> &SchedContext {
        self.get(id).unwrap_or_else(|| panic!("stale sched id {:?}", id))
    }
}

impl IndexMut<SchedId> for SchedArena {
    fn index_mut(&mut self, id: SchedId) -> &mut SchedContext {
        self.get_mut(id).unwrap_or_else(|| panic!("stale sched id {:?}", id))
    }
}
