//! Schedulable Entity
//!
//! Параметры планирования одного потока: либо фиксированный приоритет,
//! либо взвешенная справедливая очередь (WFQ). Активна ровно одна дисциплина.
//! Scheduling parameters of one thread: either fixed priority or weighted
//! fair queueing. Exactly one discipline is active at a time.
//!
//! Ready-queue linkage lives in the discipline variant, so the variant and
//! not the queue decides how the link is read.

use alloc::sync::Weak;

use libl4::{Error, Result, SchedParam};

use super::arena::SchedId;
use crate::config::{DEFAULT_PRIO, DEFAULT_TIME_SLICE, MAX_PRIO};
use crate::thread::Thread;

/// Links of a fixed-priority entity inside its priority ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpLinks {
    pub next: SchedId,
    pub prev: SchedId,
}

/// Position of a WFQ entity in its CPU's deadline heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfqLink {
    Heap(u32),
    /// The idle entity: permanently resident, never stored in the heap.
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPrio {
    pub(super) prio: u8,
    pub(super) links: Option<FpLinks>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wfq {
    pub(super) weight: u32,
    pub(super) quantum_per_weight: u64,
    pub(super) deadline: u64,
    pub(super) idle: bool,
    pub(super) link: Option<WfqLink>,
}

/// Active discipline together with its ready-queue linkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedKind {
    FixedPrio(FixedPrio),
    Wfq(Wfq),
}

/// Scheduling context of a thread.
#[derive(Debug, Clone)]
pub struct SchedContext {
    kind: SchedKind,
    quantum: u32,
    left: u64,
    owner: Weak<Thread>,
}

impl SchedContext {
    /// Default fixed-priority configuration.
    pub fn new() -> Self {
        Self {
            kind: SchedKind::FixedPrio(FixedPrio { prio: DEFAULT_PRIO, links: None }),
            quantum: DEFAULT_TIME_SLICE,
            left: DEFAULT_TIME_SLICE as u64,
            owner: Weak::new(),
        }
    }

    pub fn with_owner(owner: Weak<Thread>) -> Self {
        Self { owner, ..Self::new() }
    }

    pub(crate) fn set_owner(&mut self, owner: Weak<Thread>) {
        self.owner = owner;
    }

    /// Thread this context schedules, if it is still alive.
    pub fn context(&self) -> Option<alloc::sync::Arc<Thread>> {
        self.owner.upgrade()
    }

    #[inline]
    pub fn kind(&self) -> &SchedKind {
        &self.kind
    }

    #[inline]
    pub fn is_wfq(&self) -> bool {
        matches!(self.kind, SchedKind::Wfq(_))
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.kind, SchedKind::Wfq(Wfq { idle: true, .. }))
    }

    /// Fixed priority; WFQ entities report 0.
    #[inline]
    pub fn prio(&self) -> u8 {
        match &self.kind {
            SchedKind::FixedPrio(fp) => fp.prio,
            SchedKind::Wfq(_) => 0,
        }
    }

    #[inline]
    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    #[inline]
    pub fn weight(&self) -> Option<u32> {
        match &self.kind {
            SchedKind::Wfq(w) => Some(w.weight),
            SchedKind::FixedPrio(_) => None,
        }
    }

    #[inline]
    pub fn quantum_per_weight(&self) -> Option<u64> {
        match &self.kind {
            SchedKind::Wfq(w) => Some(w.quantum_per_weight),
            SchedKind::FixedPrio(_) => None,
        }
    }

    /// Virtual deadline of a WFQ entity.
    #[inline]
    pub fn deadline(&self) -> Option<u64> {
        match &self.kind {
            SchedKind::Wfq(w) => Some(w.deadline),
            SchedKind::FixedPrio(_) => None,
        }
    }

    /// Whether the entity sits in a ready queue (the idle entity always does).
    #[inline]
    pub fn in_ready_list(&self) -> bool {
        match &self.kind {
            SchedKind::FixedPrio(fp) => fp.links.is_some(),
            SchedKind::Wfq(w) => w.link.is_some(),
        }
    }

    /// Reconfigure discipline and parameters.
    ///
    /// Fixed priority clamps the priority to 255 and substitutes the default
    /// quantum for zero. The remaining budget is cut to the new quantum.
    /// WFQ rejects a zero quantum or weight with `EInval`,
    /// leaving the previous configuration untouched. Must not be called while
    /// the entity is enqueued; [`super::ReadyQueue::set_params`] handles that.
    pub fn set(&mut self, params: &SchedParam) -> Result<()> {
        debug_assert!(!self.in_ready_list(), "reconfiguring an enqueued entity");

        match *params {
            SchedParam::FixedPrio { prio, quantum } => {
                self.kind = SchedKind::FixedPrio(FixedPrio {
                    prio: prio.min(MAX_PRIO as u32) as u8,
                    links: None,
                });
                self.quantum = if quantum == 0 { DEFAULT_TIME_SLICE } else { quantum };
            }
            SchedParam::Wfq { quantum, weight } => {
                if quantum == 0 || weight == 0 {
                    return Err(Error::EInval);
                }
                let deadline = self.deadline().unwrap_or(0);
                self.kind = SchedKind::Wfq(Wfq {
                    weight,
                    quantum_per_weight: (quantum / weight) as u64,
                    deadline,
                    idle: false,
                    link: None,
                });
                self.quantum = quantum;
            }
        }
        self.left = self.left.min(self.quantum as u64);
        Ok(())
    }

    /// Refill the budget; a WFQ entity also moves its deadline back by one
    /// quantum per weight.
    #[inline]
    pub fn replenish(&mut self) {
        self.left = self.quantum as u64;
        if let SchedKind::Wfq(w) = &mut self.kind {
            w.deadline = w.deadline.saturating_add(w.quantum_per_weight);
        }
    }

    #[inline]
    pub fn left(&self) -> u64 {
        self.left
    }

    #[inline]
    pub fn set_left(&mut self, left: u64) {
        self.left = left;
    }

    /// Preemption order used by the ready queue.
    ///
    /// Fixed priority compares priorities (WFQ counts as 0); a WFQ entity
    /// never beats a fixed-priority one; two WFQ entities compare deadlines.
    /// The idle entity dominates nothing.
    pub fn dominates(&self, other: &SchedContext) -> bool {
        match (&self.kind, &other.kind) {
            (SchedKind::FixedPrio(fp), _) => fp.prio > other.prio(),
            (SchedKind::Wfq(w), _) if w.idle => false,
            (SchedKind::Wfq(_), SchedKind::FixedPrio(_)) => false,
            (SchedKind::Wfq(a), SchedKind::Wfq(b)) => a.deadline < b.deadline,
        }
    }

    // -- Queue-side accessors

    pub(super) fn fp_links(&self) -> Option<FpLinks> {
        match &self.kind {
            SchedKind::FixedPrio(fp) => fp.links,
            SchedKind::Wfq(_) => None,
        }
    }

    pub(super) fn set_fp_links(&mut self, links: Option<FpLinks>) {
        match &mut self.kind {
            SchedKind::FixedPrio(fp) => fp.links = links,
            SchedKind::Wfq(_) => panic!("fixed-priority link on a WFQ entity"),
        }
    }

    pub(super) fn wfq(&self) -> &Wfq {
        match &self.kind {
            SchedKind::Wfq(w) => w,
            SchedKind::FixedPrio(_) => panic!("WFQ access on a fixed-priority entity"),
        }
    }

    pub(super) fn wfq_mut(&mut self) -> &mut Wfq {
        match &mut self.kind {
            SchedKind::Wfq(w) => w,
            SchedKind::FixedPrio(_) => panic!("WFQ access on a fixed-priority entity"),
        }
    }

    /// Turn this entity into a CPU's idle entity.
    pub(super) fn make_idle(&mut self) {
        self.kind = SchedKind::Wfq(Wfq {
            weight: 0,
            quantum_per_weight: 0,
            deadline: 0,
            idle: true,
            link: Some(WfqLink::Idle),
        });
    }
}

impl Default for SchedContext {
    fn default() -> Self {
        Self::new()
    }
}
