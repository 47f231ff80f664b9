//! Weighted-fair-queueing ready queue
//!
//! Binary min-heap on virtual deadline. Each queued entity records its heap
//! slot in its [`WfqLink`], which makes removal by identity O(log n). The
//! idle entity is resident but never stored in the heap: it is what runs
//! when the heap is empty, and it inherits the deadline of the WFQ entity
//! last activated so it never looks earlier than real work.

use alloc::vec::Vec;

use super::arena::{SchedArena, SchedId};
use super::context::WfqLink;
use crate::config::WFQ_QUEUE_CAPACITY;

pub struct ReadyQueueWfq {
    heap: Vec<SchedId>,
    idle: Option<SchedId>,
    current_sched: Option<SchedId>,
}

impl ReadyQueueWfq {
    pub const fn new() -> Self {
        Self { heap: Vec::new(), idle: None, current_sched: None }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn idle(&self) -> Option<SchedId> {
        self.idle
    }

    /// WFQ entity last activated on this CPU.
    #[inline]
    pub fn current_sched(&self) -> Option<SchedId> {
        self.current_sched
    }

    #[inline]
    pub fn activate(&mut self, id: Option<SchedId>) {
        self.current_sched = id;
    }

    /// Register `id` as the idle entity. The caller has already turned it
    /// into an idle WFQ context.
    pub fn set_idle(&mut self, arena: &mut SchedArena, id: SchedId) {
        let w = arena[id].wfq_mut();
        w.idle = true;
        w.link = Some(WfqLink::Idle);
        self.idle = Some(id);
    }

    /// Earliest deadline, else the idle entity.
    pub fn next_to_run(&self, arena: &mut SchedArena) -> Option<SchedId> {
        if let Some(&head) = self.heap.first() {
            return Some(head);
        }

        let idle = self.idle?;
        if let Some(cur) = self.current_sched.filter(|&c| c != idle) {
            if let Some(dl) = arena.get(cur).and_then(|sc| sc.deadline()) {
                arena[idle].wfq_mut().deadline = dl;
            }
        }
        Some(idle)
    }

    pub fn enqueue(&mut self, arena: &mut SchedArena, id: SchedId, _is_current: bool) {
        if arena[id].in_ready_list() {
            return;
        }
        assert!(self.heap.len() < WFQ_QUEUE_CAPACITY, "WFQ ready queue overflow");

        let n = self.heap.len();
        self.heap.push(id);
        arena[id].wfq_mut().link = Some(WfqLink::Heap(n as u32));
        self.heap_up(arena, n);
    }

    pub fn dequeue(&mut self, arena: &mut SchedArena, id: SchedId) {
        let Some(WfqLink::Heap(x)) = arena[id].wfq().link else {
            // Not queued, or the idle entity which never leaves.
            return;
        };
        let x = x as usize;
        let last = self.heap.len() - 1;

        if x != last {
            self.swap(arena, x, last);
        }
        self.heap.pop();
        arena[id].wfq_mut().link = None;

        if x != last {
            // The moved element may belong above or below its new slot.
            self.heap_up(arena, x);
            self.heap_down(arena, x);
        }
    }

    /// Restore heap order after `id`'s deadline grew; enqueue it if absent.
    pub fn requeue(&mut self, arena: &mut SchedArena, id: SchedId) {
        if !arena[id].in_ready_list() {
            self.enqueue(arena, id, false);
        }
        if let Some(WfqLink::Heap(x)) = arena[id].wfq().link {
            self.heap_down(arena, x as usize);
        }
    }

    /// Lift a stale deadline up to the running WFQ entity's deadline and
    /// credit the budget for the skipped virtual time, capped at one quantum.
    pub fn deblock_refill(&mut self, arena: &mut SchedArena, id: SchedId) {
        let da = self
            .current_sched
            .and_then(|cur| arena.get(cur))
            .and_then(|sc| sc.deadline())
            .unwrap_or(0);

        let sc = &mut arena[id];
        let quantum = sc.quantum() as u64;
        let w = sc.wfq();
        if w.deadline >= da {
            return;
        }
        let credit = (da - w.deadline).saturating_mul(w.weight as u64);
        let left = sc.left().saturating_add(credit).min(quantum);
        sc.set_left(left);
        sc.wfq_mut().deadline = da;
    }

    /// Queued ids in heap order (not sorted).
    pub fn queued(&self) -> &[SchedId] {
        &self.heap
    }

    fn deadline(&self, arena: &SchedArena, slot: usize) -> u64 {
        arena[self.heap[slot]].wfq().deadline
    }

    fn swap(&mut self, arena: &mut SchedArena, a: usize, b: usize) {
        arena[self.heap[a]].wfq_mut().link = Some(WfqLink::Heap(b as u32));
        arena[self.heap[b]].wfq_mut().link = Some(WfqLink::Heap(a as u32));
        self.heap.swap(a, b);
    }

    fn heap_up(&mut self, arena: &mut SchedArena, mut a: usize) {
        while a > 0 {
            let p = (a - 1) / 2;
            if self.deadline(arena, p) < self.deadline(arena, a) {
                return;
            }
            self.swap(arena, p, a);
            a = p;
        }
    }

    fn heap_down(&mut self, arena: &mut SchedArena, mut a: usize) {
        let cnt = self.heap.len();
        loop {
            let mut c = 2 * a + 1;
            let c2 = 2 * a + 2;
            if c >= cnt {
                return;
            }
            if c2 < cnt && self.deadline(arena, c2) <= self.deadline(arena, c) {
                c = c2;
            }
            if self.deadline(arena, a) <= self.deadline(arena, c) {
                return;
            }
            self.swap(arena, c, a);
            a = c;
        }
    }
}

impl Default for ReadyQueueWfq {
    fn default() -> Self {
        Self::new()
    }
}
