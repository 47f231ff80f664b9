//! Fixed-priority ready queue
//!
//! One cyclic FIFO ring per priority level, linked through the entities'
//! [`FpLinks`]. `prio_highest` caches the highest non-empty level, so
//! `next_to_run` and `dequeue` are O(1) in the common case.
//!
//! Ring invariants:
//!   - empty level: `heads[p].is_none()`
//!   - single entity: its `next == prev == self`
//!   - FIFO: the head runs first, `push_back` inserts just before the head

use super::arena::{SchedArena, SchedId};
use super::context::FpLinks;
use crate::config::PRIO_LEVELS;

pub struct ReadyQueueFp {
    heads: [Option<SchedId>; PRIO_LEVELS],
    prio_highest: u8,
    count: usize,
}

fn links(arena: &SchedArena, id: SchedId) -> FpLinks {
    arena[id]
        .fp_links()
        .unwrap_or_else(|| panic!("{:?} is not in a priority ring", id))
}

fn set_next(arena: &mut SchedArena, id: SchedId, next: SchedId) {
    let prev = links(arena, id).prev;
    arena[id].set_fp_links(Some(FpLinks { next, prev }));
}

fn set_prev(arena: &mut SchedArena, id: SchedId, prev: SchedId) {
    let next = links(arena, id).next;
    arena[id].set_fp_links(Some(FpLinks { next, prev }));
}

impl ReadyQueueFp {
    pub const fn new() -> Self {
        Self { heads: [None; PRIO_LEVELS], prio_highest: 0, count: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn prio_highest(&self) -> u8 {
        self.prio_highest
    }

    /// Head of the highest non-empty priority level.
    #[inline]
    pub fn next_to_run(&self) -> Option<SchedId> {
        self.heads[self.prio_highest as usize]
    }

    /// Insert `id` at its priority. The running entity goes to the front of
    /// its level so it keeps the CPU; everyone else queues behind their peers.
    pub fn enqueue(&mut self, arena: &mut SchedArena, id: SchedId, is_current: bool) {
        if arena[id].in_ready_list() {
            return;
        }

        let prio = arena[id].prio();
        if prio > self.prio_highest {
            self.prio_highest = prio;
        }

        let level = prio as usize;
        match self.heads[level] {
            None => {
                arena[id].set_fp_links(Some(FpLinks { next: id, prev: id }));
                self.heads[level] = Some(id);
            }
            Some(head) => {
                let tail = links(arena, head).prev;
                arena[id].set_fp_links(Some(FpLinks { next: head, prev: tail }));
                set_next(arena, tail, id);
                set_prev(arena, head, id);
                if is_current {
                    self.heads[level] = Some(id);
                }
            }
        }

        self.count += 1;
    }

    /// Remove `id` from its ring. Absent entities are ignored.
    pub fn dequeue(&mut self, arena: &mut SchedArena, id: SchedId) {
        let Some(FpLinks { next, prev }) = arena[id].fp_links() else {
            return;
        };
        let level = arena[id].prio() as usize;

        if next == id {
            // Last one on this level
            self.heads[level] = None;
            if level == self.prio_highest as usize {
                while self.prio_highest > 0 && self.heads[self.prio_highest as usize].is_none() {
                    self.prio_highest -= 1;
                }
            }
        } else {
            set_next(arena, prev, next);
            set_prev(arena, next, prev);
            if self.heads[level] == Some(id) {
                self.heads[level] = Some(next);
            }
        }

        arena[id].set_fp_links(None);
        self.count -= 1;
    }

    /// Rotate `id`'s level so the entity after it becomes the head, moving
    /// `id` behind its peers. Enqueues at the back if it was not queued.
    pub fn requeue(&mut self, arena: &mut SchedArena, id: SchedId) {
        match arena[id].fp_links() {
            None => self.enqueue(arena, id, false),
            Some(FpLinks { next, .. }) => {
                let level = arena[id].prio() as usize;
                self.heads[level] = Some(next);
            }
        }
    }

    /// Fixed-priority entities keep their budget across a block.
    #[inline]
    pub fn deblock_refill(&mut self, _arena: &mut SchedArena, _id: SchedId) {}

    /// Ids on one level, head first.
    pub fn level(&self, arena: &SchedArena, prio: u8) -> alloc::vec::Vec<SchedId> {
        let mut out = alloc::vec::Vec::new();
        let Some(head) = self.heads[prio as usize] else {
            return out;
        };
        let mut cur = head;
        loop {
            out.push(cur);
            cur = links(arena, cur).next;
            if cur == head {
                break;
            }
        }
        out
    }
}

impl Default for ReadyQueueFp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::context::SchedContext;
    use libl4::SchedParam;

    fn entity(arena: &mut SchedArena, prio: u32) -> SchedId {
        let mut sc = SchedContext::new();
        sc.set(&SchedParam::fixed_prio(prio, 0)).unwrap();
        arena.insert(sc)
    }

    #[test]
    fn test_highest_priority_first() {
        let mut arena = SchedArena::new();
        let mut rq = ReadyQueueFp::new();
        let a = entity(&mut arena, 50);
        let b = entity(&mut arena, 90);
        let c = entity(&mut arena, 10);
        for id in [a, b, c] {
            rq.enqueue(&mut arena, id, false);
        }
        assert_eq!(rq.len(), 3);
        assert_eq!(rq.next_to_run(), Some(b));
        rq.dequeue(&mut arena, b);
        assert_eq!(rq.next_to_run(), Some(a));
        rq.dequeue(&mut arena, a);
        assert_eq!(rq.next_to_run(), Some(c));
        rq.dequeue(&mut arena, c);
        assert_eq!(rq.next_to_run(), None);
        assert!(rq.is_empty());
        assert_eq!(rq.prio_highest(), 0);
    }

    #[test]
    fn test_fifo_within_level_and_current_in_front() {
        let mut arena = SchedArena::new();
        let mut rq = ReadyQueueFp::new();
        let a = entity(&mut arena, 5);
        let b = entity(&mut arena, 5);
        let c = entity(&mut arena, 5);
        rq.enqueue(&mut arena, a, false);
        rq.enqueue(&mut arena, b, false);
        assert_eq!(rq.level(&arena, 5), [a, b]);

        rq.enqueue(&mut arena, c, true);
        assert_eq!(rq.level(&arena, 5), [c, a, b]);

        rq.dequeue(&mut arena, a);
        assert_eq!(rq.level(&arena, 5), [c, b]);
    }

    #[test]
    fn test_requeue_rotates_behind_peers() {
        let mut arena = SchedArena::new();
        let mut rq = ReadyQueueFp::new();
        let a = entity(&mut arena, 7);
        let b = entity(&mut arena, 7);
        let c = entity(&mut arena, 7);
        for id in [a, b, c] {
            rq.enqueue(&mut arena, id, false);
        }
        rq.requeue(&mut arena, a);
        assert_eq!(rq.level(&arena, 7), [b, c, a]);

        let d = entity(&mut arena, 7);
        rq.requeue(&mut arena, d);
        assert_eq!(rq.level(&arena, 7), [b, c, a, d]);
    }

    #[test]
    fn test_double_enqueue_and_absent_dequeue_are_noops() {
        let mut arena = SchedArena::new();
        let mut rq = ReadyQueueFp::new();
        let a = entity(&mut arena, 3);
        let b = entity(&mut arena, 3);
        rq.enqueue(&mut arena, a, false);
        rq.enqueue(&mut arena, a, true);
        assert_eq!(rq.len(), 1);
        rq.dequeue(&mut arena, b);
        assert_eq!(rq.len(), 1);
        assert!(arena[a].in_ready_list());
        assert!(!arena[b].in_ready_list());
    }

    #[test]
    fn test_prio_highest_skips_empty_levels() {
        let mut arena = SchedArena::new();
        let mut rq = ReadyQueueFp::new();
        let lo = entity(&mut arena, 2);
        let hi = entity(&mut arena, 200);
        rq.enqueue(&mut arena, lo, false);
        rq.enqueue(&mut arena, hi, false);
        assert_eq!(rq.prio_highest(), 200);
        rq.dequeue(&mut arena, hi);
        assert_eq!(rq.prio_highest(), 2);
        assert_eq!(rq.next_to_run(), Some(lo));
    }
}
