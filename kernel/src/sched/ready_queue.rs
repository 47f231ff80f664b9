//! Per-CPU Ready Queue
//!
//! Объединяет очередь фиксированных приоритетов и очередь WFQ за одним
//! интерфейсом. Фиксированный приоритет всегда вытесняет WFQ.
//! Joins the fixed-priority and WFQ sub-queues behind one interface.
//! Fixed priority always beats WFQ.
//!
//! The queue also owns this CPU's [`SchedArena`]; every entity homed on the
//! CPU lives there. All operations expect the caller to hold the CPU's
//! scheduling lock and none of them blocks.

use libl4::{Result, SchedParam};

use super::arena::{SchedArena, SchedId};
use super::context::SchedContext;
use super::fp::ReadyQueueFp;
use super::wfq::ReadyQueueWfq;

pub struct ReadyQueue {
    arena: SchedArena,
    fp_rq: ReadyQueueFp,
    wfq_rq: ReadyQueueWfq,
    current_sched: Option<SchedId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            arena: SchedArena::new(),
            fp_rq: ReadyQueueFp::new(),
            wfq_rq: ReadyQueueWfq::new(),
            current_sched: None,
        }
    }

    // -- Entity storage

    /// Store a new scheduling context homed on this CPU.
    pub fn insert(&mut self, sc: SchedContext) -> SchedId {
        self.arena.insert(sc)
    }

    /// Take `id` off every queue and release it.
    pub fn remove(&mut self, id: SchedId) -> Option<SchedContext> {
        if !self.arena.contains(id) {
            return None;
        }
        assert!(!self.arena[id].is_idle(), "removing the idle entity");
        self.dequeue(id);
        if self.current_sched == Some(id) {
            self.invalidate_sched();
        }
        if self.wfq_rq.current_sched() == Some(id) {
            self.wfq_rq.activate(None);
        }
        self.arena.remove(id)
    }

    #[inline]
    pub fn context(&self, id: SchedId) -> &SchedContext {
        &self.arena[id]
    }

    /// Direct access for budget accounting. Changing the discipline must go
    /// through [`ReadyQueue::set_params`].
    #[inline]
    pub fn context_mut(&mut self, id: SchedId) -> &mut SchedContext {
        &mut self.arena[id]
    }

    #[inline]
    pub fn contains(&self, id: SchedId) -> bool {
        self.arena.contains(id)
    }

    #[inline]
    pub fn arena(&self) -> &SchedArena {
        &self.arena
    }

    // -- Discipline dispatch

    /// Insert by discipline. A running entity (`is_current`) keeps its place
    /// ahead of its fixed-priority peers.
    pub fn enqueue(&mut self, id: SchedId, is_current: bool) {
        if self.arena[id].is_wfq() {
            self.wfq_rq.enqueue(&mut self.arena, id, is_current);
        } else {
            self.fp_rq.enqueue(&mut self.arena, id, is_current);
        }
    }

    pub fn dequeue(&mut self, id: SchedId) {
        if self.arena[id].is_wfq() {
            self.wfq_rq.dequeue(&mut self.arena, id);
        } else {
            self.fp_rq.dequeue(&mut self.arena, id);
        }
    }

    /// Move `id` behind the entities it competes with.
    pub fn requeue(&mut self, id: SchedId) {
        if self.arena[id].is_wfq() {
            self.wfq_rq.requeue(&mut self.arena, id);
        } else {
            self.fp_rq.requeue(&mut self.arena, id);
        }
    }

    /// Fixed-priority head, else the earliest WFQ deadline, else the idle
    /// entity. `None` only before `set_idle`.
    pub fn next_to_run(&mut self) -> Option<SchedId> {
        self.fp_rq
            .next_to_run()
            .or_else(|| self.wfq_rq.next_to_run(&mut self.arena))
    }

    /// Prepare an entity leaving the blocked state. Only WFQ needs work:
    /// a deadline that went stale while sleeping is lifted first.
    pub fn deblock_refill(&mut self, id: SchedId) {
        if self.arena[id].is_wfq() {
            self.wfq_rq.deblock_refill(&mut self.arena, id);
            // Still in the heap from a lazy block: its key just grew.
            if self.arena[id].in_ready_list() {
                self.wfq_rq.requeue(&mut self.arena, id);
            }
        } else {
            self.fp_rq.deblock_refill(&mut self.arena, id);
        }
    }

    #[inline]
    pub fn current_sched(&self) -> Option<SchedId> {
        self.current_sched
    }

    /// Record the entity owning the CPU's timeslice.
    pub fn activate(&mut self, id: Option<SchedId>) {
        if id.map_or(true, |s| self.arena[s].is_wfq()) {
            self.wfq_rq.activate(id);
        }
        self.current_sched = id;
    }

    /// Turn `id` into this CPU's idle entity: WFQ, priority and weight 0,
    /// permanently resident.
    pub fn set_idle(&mut self, id: SchedId) {
        self.dequeue(id);
        self.arena[id].make_idle();
        self.wfq_rq.set_idle(&mut self.arena, id);
    }

    #[inline]
    pub fn idle(&self) -> Option<SchedId> {
        self.wfq_rq.idle()
    }

    // -- Scheduler front end

    /// Enqueue unless already queued; the entity is treated as running.
    pub fn ready_enqueue(&mut self, id: SchedId) {
        if self.arena[id].in_ready_list() {
            return;
        }
        self.enqueue(id, true);
    }

    /// Dequeue unless absent.
    pub fn ready_dequeue(&mut self, id: SchedId) {
        if !self.arena[id].in_ready_list() {
            return;
        }
        self.dequeue(id);
    }

    /// Make `sc` ready and report whether it should preempt.
    ///
    /// `crs` is the entity of the context running right now, which may
    /// differ from `current_sched` while a timeslice is donated. With
    /// `lazy` set and preemption due, `sc` is left off the queue: the caller
    /// switches to it directly and the switch enqueues it.
    pub fn deblock(&mut self, sc: SchedId, crs: Option<SchedId>, lazy: bool) -> bool {
        let cs = self.current_sched;
        let mut res = true;

        if Some(sc) == cs {
            if let Some(crs) = crs {
                if self.arena[crs].dominates(&self.arena[sc]) {
                    res = false;
                }
            }
        } else {
            self.deblock_refill(sc);

            let target = &self.arena[sc];
            let cs_wins = cs.map_or(false, |cs| self.arena[cs].dominates(target));
            let crs_wins = crs.map_or(false, |crs| self.arena[crs].dominates(target));
            if cs_wins || crs_wins {
                res = false;
            }
        }

        if res && lazy {
            return true;
        }

        self.ready_enqueue(sc);
        res
    }

    /// Load `id`'s timeslice. The outgoing one keeps its remaining budget,
    /// or is replenished if it ran dry.
    pub fn set_current_sched(&mut self, id: SchedId) {
        if let Some(prev) = self.current_sched.filter(|&p| self.arena.contains(p)) {
            let sc = &mut self.arena[prev];
            if sc.left() == 0 {
                sc.replenish();
                if sc.in_ready_list() {
                    self.requeue(prev);
                }
                let sc = &self.arena[prev];
                log::trace!("sched: replenish {:?} prio={} left={}", prev, sc.prio(), sc.left());
            } else {
                log::trace!("sched: save {:?} prio={} left={}", prev, sc.prio(), sc.left());
            }
        }

        self.activate(Some(id));
        log::trace!(
            "sched: load {:?} prio={} left={}/{}",
            id,
            self.arena[id].prio(),
            self.arena[id].left(),
            self.arena[id].quantum()
        );
    }

    /// Drop the current timeslice so the next pass selects a fresh one.
    pub fn invalidate_sched(&mut self) {
        self.activate(None);
    }

    /// Hand the CPU over from `from` to `to`.
    pub fn switch_sched(&mut self, from: SchedId, to: SchedId) {
        if Some(from) == self.current_sched {
            self.invalidate_sched();
        }
        if self.arena[from].in_ready_list() {
            self.dequeue(from);
        }
        self.enqueue(to, false);
    }

    /// Reconfigure `id`. An enqueued entity is taken off its queue, changed
    /// and put back, so a discipline switch never leaves stale links. On
    /// error nothing changes.
    pub fn set_params(&mut self, id: SchedId, params: &SchedParam) -> Result<()> {
        let was_queued = self.arena[id].in_ready_list();
        if was_queued {
            self.dequeue(id);
        }

        let res = self.arena[id].set(params);
        match &res {
            Ok(()) => log::debug!("sched: {:?} set to {:?}", id, params),
            Err(e) => log::debug!("sched: {:?} rejected {:?}: {}", id, params, e),
        }

        if self.current_sched == Some(id) {
            // Keep the WFQ sub-queue's view of the running entity in sync.
            self.activate(Some(id));
        }
        if was_queued {
            self.enqueue(id, false);
        }
        res
    }

    /// Charge `elapsed` to the current timeslice. At the end of the slice
    /// the entity is replenished and moved behind its peers; returns whether
    /// a reschedule is due.
    pub fn tick(&mut self, elapsed: u64) -> bool {
        let Some(cur) = self.current_sched else {
            return false;
        };
        let sc = &mut self.arena[cur];
        let left = sc.left().saturating_sub(elapsed);
        sc.set_left(left);
        if left > 0 {
            return false;
        }

        sc.replenish();
        if self.arena[cur].in_ready_list() {
            self.requeue(cur);
        }
        true
    }

    /// Number of queued entities, idle excluded.
    pub fn len(&self) -> usize {
        self.fp_rq.len() + self.wfq_rq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libl4::Error;

    fn fp(rq: &mut ReadyQueue, prio: u32) -> SchedId {
        let id = rq.insert(SchedContext::new());
        rq.set_params(id, &SchedParam::fixed_prio(prio, 0)).unwrap();
        id
    }

    fn wfq(rq: &mut ReadyQueue, quantum: u32, weight: u32) -> SchedId {
        let id = rq.insert(SchedContext::new());
        rq.set_params(id, &SchedParam::wfq(quantum, weight)).unwrap();
        id
    }

    fn with_idle() -> (ReadyQueue, SchedId) {
        let mut rq = ReadyQueue::new();
        let idle = rq.insert(SchedContext::new());
        rq.set_idle(idle);
        rq.activate(Some(idle));
        (rq, idle)
    }

    #[test]
    fn test_fixed_prio_dominates_wfq() {
        let (mut rq, idle) = with_idle();
        let w = wfq(&mut rq, 10, 1);
        let f = fp(&mut rq, 0);
        rq.enqueue(w, false);
        assert_eq!(rq.next_to_run(), Some(w));
        rq.enqueue(f, false);
        assert_eq!(rq.next_to_run(), Some(f));
        rq.dequeue(f);
        rq.dequeue(w);
        assert_eq!(rq.next_to_run(), Some(idle));
        assert!(rq.is_empty());
    }

    #[test]
    fn test_set_params_moves_between_queues() {
        let (mut rq, _) = with_idle();
        let a = fp(&mut rq, 20);
        rq.enqueue(a, false);
        rq.set_params(a, &SchedParam::wfq(10, 2)).unwrap();
        assert!(rq.context(a).is_wfq());
        assert!(rq.context(a).in_ready_list());
        assert_eq!(rq.len(), 1);

        assert_eq!(rq.set_params(a, &SchedParam::wfq(10, 0)), Err(Error::EInval));
        assert!(rq.context(a).is_wfq());
        assert!(rq.context(a).in_ready_list());

        rq.set_params(a, &SchedParam::fixed_prio(33, 0)).unwrap();
        assert_eq!(rq.context(a).prio(), 33);
        assert_eq!(rq.next_to_run(), Some(a));
    }

    #[test]
    fn test_deblock_against_current_and_running() {
        let (mut rq, _) = with_idle();
        let hi = fp(&mut rq, 80);
        let lo = fp(&mut rq, 10);
        rq.enqueue(hi, true);
        rq.set_current_sched(hi);

        // Lower priority than the owner of the timeslice: queue, no preemption.
        assert!(!rq.deblock(lo, Some(hi), false));
        assert!(rq.context(lo).in_ready_list());

        let top = fp(&mut rq, 99);
        // Lazy and dominating: left off the queue for a direct switch.
        assert!(rq.deblock(top, Some(hi), true));
        assert!(!rq.context(top).in_ready_list());
        assert!(rq.deblock(top, Some(hi), false));
        assert!(rq.context(top).in_ready_list());
    }

    #[test]
    fn test_deblock_of_current_sched_checks_running_context() {
        let (mut rq, _) = with_idle();
        let donor = fp(&mut rq, 50);
        let runner = fp(&mut rq, 70);
        rq.set_current_sched(donor);
        // donor's timeslice, runner on the CPU: donor does not preempt runner.
        assert!(!rq.deblock(donor, Some(runner), false));
        assert!(rq.context(donor).in_ready_list());
    }

    #[test]
    fn test_set_current_sched_saves_or_replenishes() {
        let (mut rq, _) = with_idle();
        let a = fp(&mut rq, 5);
        let b = fp(&mut rq, 5);
        rq.set_current_sched(a);
        rq.context_mut(a).set_left(123);
        rq.set_current_sched(b);
        assert_eq!(rq.context(a).left(), 123);
        assert_eq!(rq.current_sched(), Some(b));

        rq.context_mut(b).set_left(0);
        rq.set_current_sched(a);
        assert_eq!(rq.context(b).left(), rq.context(b).quantum() as u64);
    }

    #[test]
    fn test_tick_rotates_at_slice_end() {
        let (mut rq, _) = with_idle();
        let a = fp(&mut rq, 5);
        let b = fp(&mut rq, 5);
        rq.enqueue(a, false);
        rq.enqueue(b, false);
        rq.set_current_sched(a);
        rq.context_mut(a).set_left(100);

        assert!(!rq.tick(60));
        assert_eq!(rq.context(a).left(), 40);
        assert_eq!(rq.next_to_run(), Some(a));

        assert!(rq.tick(60));
        assert_eq!(rq.context(a).left(), rq.context(a).quantum() as u64);
        assert_eq!(rq.next_to_run(), Some(b));
    }

    #[test]
    fn test_switch_sched() {
        let (mut rq, _) = with_idle();
        let a = fp(&mut rq, 5);
        let b = fp(&mut rq, 6);
        rq.enqueue(a, true);
        rq.set_current_sched(a);
        rq.switch_sched(a, b);
        assert_eq!(rq.current_sched(), None);
        assert!(!rq.context(a).in_ready_list());
        assert_eq!(rq.next_to_run(), Some(b));
    }

    #[test]
    fn test_remove_invalidates_current() {
        let (mut rq, idle) = with_idle();
        let a = fp(&mut rq, 9);
        rq.enqueue(a, false);
        rq.set_current_sched(a);
        assert!(rq.remove(a).is_some());
        assert!(!rq.contains(a));
        assert_eq!(rq.current_sched(), None);
        assert_eq!(rq.next_to_run(), Some(idle));
    }
    #[test]
    fn test_wfq_weight_two_runs_twice_as_often() {
        let (mut rq, _) = with_idle();
        let w1 = wfq(&mut rq, 10, 1);
        let w2 = wfq(&mut rq, 10, 2);
        assert_eq!(rq.context(w1).quantum_per_weight(), Some(10));
        assert_eq!(rq.context(w2).quantum_per_weight(), Some(5));
        rq.enqueue(w1, false);
        rq.enqueue(w2, false);

        let (mut n1, mut n2) = (0i64, 0i64);
        for _ in 0..60 {
            let next = rq.next_to_run().unwrap();
            if next == w1 {
                n1 += 1;
            } else {
                assert_eq!(next, w2);
                n2 += 1;
            }
            rq.context_mut(next).replenish();
            rq.requeue(next);
        }
        assert_eq!(n1 + n2, 60);
        assert!((n2 - 2 * n1).abs() <= 2, "w1={} w2={}", n1, n2);
        // Deadlines advance at quantum / weight per slice.
        assert_eq!(rq.context(w1).deadline(), Some(10 * n1 as u64));
        assert_eq!(rq.context(w2).deadline(), Some(5 * n2 as u64));
    }

    #[test]
    fn test_wfq_deblock_lifts_deadline_before_enqueue() {
        let (mut rq, _) = with_idle();
        let running = wfq(&mut rq, 10, 1);
        rq.context_mut(running).wfq_mut().deadline = 500;
        rq.enqueue(running, true);
        rq.set_current_sched(running);

        let sleeper = wfq(&mut rq, 10, 1);
        rq.context_mut(sleeper).wfq_mut().deadline = 120;
        rq.context_mut(sleeper).set_left(0);

        // Lifted to the running deadline, so neither dominates the other.
        assert!(rq.deblock(sleeper, Some(running), false));
        assert_eq!(rq.context(sleeper).deadline(), Some(500));
        assert_eq!(rq.context(sleeper).left(), 10);
        assert!(rq.context(sleeper).in_ready_list());

        // A later deadline than the runner's does not preempt.
        let late = wfq(&mut rq, 10, 1);
        rq.context_mut(late).wfq_mut().deadline = 700;
        assert!(!rq.deblock(late, Some(running), false));
        assert_eq!(rq.context(late).deadline(), Some(700));
    }

    #[test]
    fn test_refill_of_lazily_queued_entity_keeps_heap_order() {
        let (mut rq, _) = with_idle();
        let running = wfq(&mut rq, 10, 1);
        rq.context_mut(running).wfq_mut().deadline = 500;
        rq.enqueue(running, true);
        rq.set_current_sched(running);

        let other = wfq(&mut rq, 10, 1);
        rq.context_mut(other).wfq_mut().deadline = 300;
        rq.enqueue(other, false);

        // Blocked without leaving the heap, still at its old deadline.
        let sleeper = wfq(&mut rq, 10, 1);
        rq.context_mut(sleeper).wfq_mut().deadline = 100;
        rq.enqueue(sleeper, false);
        assert_eq!(rq.next_to_run(), Some(sleeper));

        rq.deblock_refill(sleeper);
        assert_eq!(rq.context(sleeper).deadline(), Some(500));
        assert_eq!(rq.next_to_run(), Some(other));
    }

    #[test]
    fn test_enqueue_dequeue_membership() {
        let (mut rq, _) = with_idle();
        let f = fp(&mut rq, 7);
        let w = wfq(&mut rq, 10, 1);
        for id in [f, w] {
            assert!(!rq.context(id).in_ready_list());
            rq.enqueue(id, false);
            assert!(rq.context(id).in_ready_list());
            rq.dequeue(id);
            assert!(!rq.context(id).in_ready_list());
            rq.ready_dequeue(id);
            assert!(!rq.context(id).in_ready_list());
        }
    }
}
