//! Per-CPU dispatcher
//!
//! Состояние каждого CPU (очередь готовности, текущий поток, idle-поток)
//! под своей блокировкой. Две блокировки CPU никогда не берутся
//! одновременно.
//! Each CPU's state (ready queue, running thread, idle thread) sits behind
//! its own lock. No path ever holds two CPU locks at once.
//!
//! Блокировка очереди отправителей может быть взята раньше блокировки
//! CPU, но не наоборот.
//! A sender-queue lock may be taken before a CPU lock, never after.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use libl4::{Error, Result, SchedParam};
use spin::{Mutex, MutexGuard};

use super::arena::SchedId;
use super::context::SchedContext;
use super::ready_queue::ReadyQueue;
use crate::config::{IPC_SHORTCUT, MAX_CPUS};
use crate::ipc::SenderRef;
use crate::thread::{Thread, ThreadState};

/// Номер логического CPU / Logical CPU number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuId(u32);

impl CpuId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Runtime scheduler options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Let a same-CPU send switch straight into a waiting receiver.
    pub ipc_shortcut: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self { ipc_shortcut: IPC_SHORTCUT }
    }
}

// ── Per-CPU state ─────────────────────────────────────────────────────────────

pub struct CpuState {
    rq: ReadyQueue,
    current: Arc<Thread>,
    idle: Arc<Thread>,
    schedule_in_progress: bool,
}

impl CpuState {
    #[inline]
    pub fn rq(&self) -> &ReadyQueue {
        &self.rq
    }

    #[inline]
    pub fn rq_mut(&mut self) -> &mut ReadyQueue {
        &mut self.rq
    }

    /// Thread executing on this CPU. It may run on a donated timeslice.
    #[inline]
    pub fn current(&self) -> &Arc<Thread> {
        &self.current
    }

    #[inline]
    pub fn idle(&self) -> &Arc<Thread> {
        &self.idle
    }

    /// A scheduling pass is underway on this CPU.
    #[inline]
    pub fn schedule_in_progress(&self) -> bool {
        self.schedule_in_progress
    }

    /// Scheduling context of the running thread, unless it was destroyed.
    pub fn running_sched(&self) -> Option<SchedId> {
        Some(self.current.sched()).filter(|&s| self.rq.contains(s))
    }

    /// Make `t` ready on this, its home CPU; `true` if it should preempt
    /// the running thread.
    pub fn deblock(&mut self, t: &Thread) -> bool {
        let crs = self.running_sched();
        self.rq.deblock(t.sched(), crs, false)
    }

    /// Enqueue `t` on behalf of another CPU. No preemption decision is made
    /// here; this CPU notices on its next pass.
    pub fn remote_enqueue(&mut self, t: &Thread) {
        self.rq.deblock_refill(t.sched());
        self.rq.ready_enqueue(t.sched());
    }

    /// Run `to` right away on the current timeslice. `to` is enqueued if
    /// a lazy deblock left it out.
    pub fn switch_to_locked(&mut self, to: Arc<Thread>) {
        self.rq.ready_enqueue(to.sched());
        log::trace!("switch {:?} -> {:?} (donated)", self.current.id(), to.id());
        self.current = to;
    }
}

pub struct Cpu {
    id: CpuId,
    state: Mutex<CpuState>,
}

impl Cpu {
    fn new(id: CpuId) -> Self {
        let mut rq = ReadyQueue::new();
        let idle = new_thread(&mut rq, id, SchedContext::new());
        let sched = idle.sched();
        rq.set_idle(sched);
        rq.activate(Some(sched));
        idle.state_add_dirty(ThreadState::READY);

        Self {
            id,
            state: Mutex::new(CpuState {
                rq,
                current: idle.clone(),
                idle,
                schedule_in_progress: false,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> CpuId {
        self.id
    }

    /// Take this CPU's scheduling lock.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, CpuState> {
        self.state.lock()
    }

    pub fn current(&self) -> Arc<Thread> {
        self.state.lock().current.clone()
    }

    /// Mark a scheduling pass as running until the guard drops. Panics if
    /// one is already running: the pass does not nest.
    pub fn begin_schedule(&self) -> SchedulePass<'_> {
        let mut st = self.state.lock();
        assert!(!st.schedule_in_progress, "{}: nested schedule", self.id);
        st.schedule_in_progress = true;
        SchedulePass { cpu: self }
    }

    /// Pick the next thread and make it current.
    ///
    /// Entities whose thread is no longer ready are dropped from the queue
    /// on the way. The idle thread is always ready, so the loop ends.
    pub fn schedule(&self) -> Arc<Thread> {
        let _pass = self.begin_schedule();
        let mut st = self.state.lock();
        st.current.state_del_dirty(ThreadState::NEED_RESCHED);

        loop {
            let Some(next) = st.rq.next_to_run() else {
                log::error!("{}: no idle entity", self.id);
                return st.idle.clone();
            };

            match st.rq.context(next).context() {
                Some(t) if t.is_ready() => {
                    if st.rq.current_sched() != Some(next) {
                        st.rq.set_current_sched(next);
                    }
                    if !Arc::ptr_eq(&st.current, &t) {
                        log::trace!("{}: switch {:?} -> {:?}", self.id, st.current.id(), t.id());
                    }
                    st.current = t.clone();
                    return t;
                }
                _ => st.rq.ready_dequeue(next),
            }
        }
    }

    /// Charge `elapsed` microseconds to the running timeslice. Returns
    /// whether the slice ran out.
    pub fn tick(&self, elapsed: u64) -> bool {
        let mut st = self.state.lock();
        let expired = st.rq.tick(elapsed);
        if expired {
            st.current.state_add_dirty(ThreadState::NEED_RESCHED);
        }
        expired
    }
}

/// Scheduling pass marker, see [`Cpu::begin_schedule`].
pub struct SchedulePass<'a> {
    cpu: &'a Cpu,
}

impl Drop for SchedulePass<'_> {
    fn drop(&mut self) {
        self.cpu.state.lock().schedule_in_progress = false;
    }
}

fn new_thread(rq: &mut ReadyQueue, home: CpuId, sc: SchedContext) -> Arc<Thread> {
    Arc::new_cyclic(|weak| {
        let mut sc = sc;
        sc.set_owner(weak.clone());
        let sched = rq.insert(sc);
        Thread::new(home, sched, rq.context(sched))
    })
}

// ── CPU set ───────────────────────────────────────────────────────────────────

/// All CPUs of the machine.
pub struct CpuSet {
    cpus: Vec<Cpu>,
    config: SchedConfig,
}

impl CpuSet {
    /// Bring up `count` CPUs, each with its idle thread running.
    pub fn new(count: usize, config: SchedConfig) -> Self {
        assert!(count >= 1 && count <= MAX_CPUS, "unsupported CPU count {}", count);
        let cpus = (0..count as u32).map(|i| Cpu::new(CpuId::new(i))).collect();
        log::debug!("sched: {} CPUs up, ipc shortcut {}", count, config.ipc_shortcut);
        Self { cpus, config }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    #[inline]
    pub fn config(&self) -> SchedConfig {
        self.config
    }

    #[inline]
    pub fn get(&self, id: CpuId) -> Option<&Cpu> {
        self.cpus.get(id.as_usize())
    }

    /// # Panics
    ///
    /// Panics on a CPU number out of range.
    #[inline]
    pub fn cpu(&self, id: CpuId) -> &Cpu {
        &self.cpus[id.as_usize()]
    }

    // ── Thread lifecycle ──────────────────────────────────────────────────────

    /// New thread homed on `home`. It is not ready until
    /// [`CpuSet::activate`].
    pub fn create_thread(&self, home: CpuId, params: &SchedParam) -> Result<Arc<Thread>> {
        let cpu = self.get(home).ok_or(Error::EInval)?;
        let mut sc = SchedContext::new();
        sc.set(params)?;

        let mut st = cpu.lock();
        let t = new_thread(&mut st.rq, home, sc);
        log::debug!("{}: thread {:?} created with {:?}", home, t.id(), params);
        Ok(t)
    }

    /// Make a new or stopped thread ready, behind its peers.
    pub fn activate(&self, t: &Thread) {
        let mut st = self.cpu(t.home_cpu()).lock();
        t.state_add_dirty(ThreadState::READY);
        st.rq.enqueue(t.sched(), false);
    }

    /// Reconfigure `t`'s scheduling.
    pub fn set_sched_params(&self, t: &Thread, params: &SchedParam) -> Result<()> {
        let mut st = self.cpu(t.home_cpu()).lock();
        if st.idle.id() == t.id() {
            return Err(Error::EInval);
        }
        st.rq.set_params(t.sched(), params)?;
        t.update_sender_prio(st.rq.context(t.sched()));
        Ok(())
    }

    /// Ready `t` after a wait ended. Called from `acting`; `true` when `t`
    /// should preempt there.
    pub fn wake(&self, acting: CpuId, t: &Thread) -> bool {
        let home = t.home_cpu();
        let mut st = self.cpu(home).lock();
        if home == acting {
            st.deblock(t)
        } else {
            st.remote_enqueue(t);
            false
        }
    }

    /// Tear `t` down: cancel every sender waiting on it, withdraw its own
    /// send, and release its scheduling context. If `t` is running, its
    /// CPU must reschedule. A CPU's idle thread cannot be destroyed.
    pub fn destroy_thread(&self, acting: CpuId, t: &Arc<Thread>) -> Result<()> {
        if self.cpu(t.home_cpu()).lock().idle.id() == t.id() {
            return Err(Error::EInval);
        }
        t.state_change_dirty(ThreadState::empty(), ThreadState::DEAD);

        let list = t.receiver().sender_list();
        let aborted: Vec<SenderRef> = {
            let mut q = list.lock();
            let mut out = Vec::new();
            while let Some(head) = q.first_id() {
                let s = q.remove(head);
                // A node the sender no longer owns was already aborted.
                if s.sender().node() == Some(head) {
                    s.ipc_receiver_aborted();
                    out.push(s);
                }
            }
            list.sync_pending(&q);
            out
        };
        for s in &aborted {
            s.finish_send(self, acting);
        }

        if let Some(r) = t.send_partner() {
            SenderRef::Thread(t.clone()).sender_dequeue(r.receiver().sender_list());
            t.set_send_partner(None);
        }
        t.receiver().reset_timeout();

        let mut st = self.cpu(t.home_cpu()).lock();
        st.rq.remove(t.sched());
        log::debug!(
            "{}: thread {:?} destroyed, {} senders canceled",
            t.home_cpu(),
            t.id(),
            aborted.len()
        );
        Ok(())
    }
}
