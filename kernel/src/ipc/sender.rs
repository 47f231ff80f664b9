//! Sender role
//!
//! Отправитель, ожидающий в очереди получателя. Узел в очереди меняется
//! только под её блокировкой; `wait_queue` ставит сам отправитель, а
//! сбросить может и другая сторона.
//! A sender waiting in a receiver's queue. The node changes only under the
//! queue's lock; `wait_queue` is set by the sender itself, and the other
//! party may clear it but never set it.
//!
//! Отправитель — либо поток, либо источник прерывания; диспетчеризация
//! через [`SenderRef`] статическая.
//! A sender is either a thread or an interrupt source; [`SenderRef`]
//! dispatches statically.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::irq::IrqSender;
use super::prio_list::{NodeId, PrioList};
use super::receiver::{Delivery, SenderList, WaitQueueId};
use super::Message;
use crate::config::IRQ_SENDER_PRIO;
use crate::sched::{CpuId, CpuSet};
use crate::thread::{Thread, ThreadState};

/// Идентификатор отправителя / Sender identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(u64);

impl SenderId {
    fn alloc() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

const NO_QUEUE: u64 = 0;
const NO_NODE: u32 = u32::MAX;

/// Membership record of one sender.
pub struct Sender {
    id: SenderId,
    wait_queue: AtomicU64,
    node: AtomicU32,
}

impl Sender {
    pub fn new() -> Self {
        Self {
            id: SenderId::alloc(),
            wait_queue: AtomicU64::new(NO_QUEUE),
            node: AtomicU32::new(NO_NODE),
        }
    }

    #[inline]
    pub fn id(&self) -> SenderId {
        self.id
    }

    /// Queue this sender intends to wait in, or is waiting in.
    #[inline]
    pub fn wait_queue(&self) -> Option<WaitQueueId> {
        match self.wait_queue.load(Ordering::Acquire) {
            NO_QUEUE => None,
            id => Some(WaitQueueId::from_raw(id)),
        }
    }

    #[inline]
    pub fn set_wait_queue(&self, wq: Option<WaitQueueId>) {
        self.wait_queue.store(wq.map_or(NO_QUEUE, WaitQueueId::as_u64), Ordering::Release);
    }

    /// Whether this sender holds a node in a sender queue.
    #[inline]
    pub fn in_sender_list(&self) -> bool {
        self.node.load(Ordering::Acquire) != NO_NODE
    }

    #[inline]
    pub(crate) fn node(&self) -> Option<NodeId> {
        match self.node.load(Ordering::Acquire) {
            NO_NODE => None,
            n => Some(NodeId::from_raw(n)),
        }
    }

    fn set_node(&self, node: Option<NodeId>) {
        self.node.store(node.map_or(NO_NODE, NodeId::index), Ordering::Release);
    }

    fn take_node(&self) -> Option<NodeId> {
        match self.node.swap(NO_NODE, Ordering::AcqRel) {
            NO_NODE => None,
            n => Some(NodeId::from_raw(n)),
        }
    }

    /// Clear `wait_queue` if it still names `wq`.
    fn clear_wait_queue(&self, wq: WaitQueueId) {
        let _ = self.wait_queue.compare_exchange(
            wq.as_u64(),
            NO_QUEUE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread or interrupt in the sender role.
#[derive(Clone)]
pub enum SenderRef {
    Thread(Arc<Thread>),
    Irq(Arc<IrqSender>),
}

impl SenderRef {
    #[inline]
    pub fn sender(&self) -> &Sender {
        match self {
            Self::Thread(t) => t.sender(),
            Self::Irq(i) => i.sender(),
        }
    }

    #[inline]
    pub fn id(&self) -> SenderId {
        self.sender().id()
    }

    /// Queue priority. Interrupts use the reserved top level.
    #[inline]
    pub fn ipc_prio(&self) -> u8 {
        match self {
            Self::Thread(t) => t.sender_prio(),
            Self::Irq(_) => IRQ_SENDER_PRIO,
        }
    }

    // ── Queue membership ──────────────────────────────────────────────────────

    /// Insert into `list` at `prio`. Returns `false` without inserting if
    /// `wait_queue` no longer names `list`: the receiver went away in the
    /// meantime.
    pub fn sender_enqueue(&self, list: &SenderList, prio: u8) -> bool {
        let mut q = list.lock();
        self.enqueue_locked(list, &mut q, prio)
    }

    pub(crate) fn enqueue_locked(
        &self,
        list: &SenderList,
        q: &mut PrioList<SenderRef>,
        prio: u8,
    ) -> bool {
        let s = self.sender();
        if s.wait_queue() != Some(list.id()) {
            return false;
        }
        debug_assert!(!s.in_sender_list(), "sender queued twice");

        let node = q.insert(self.clone(), prio);
        s.set_node(Some(node));
        list.sync_pending(q);
        true
    }

    /// Leave `list`. A sender that does not wait there is left alone, and
    /// that is decided before taking the lock.
    pub fn sender_dequeue(&self, list: &SenderList) {
        if self.sender().wait_queue() != Some(list.id()) {
            return;
        }
        let mut q = list.lock();
        self.dequeue_locked(list, &mut q);
    }

    pub(crate) fn dequeue_locked(&self, list: &SenderList, q: &mut PrioList<SenderRef>) {
        let s = self.sender();
        if let Some(node) = s.take_node() {
            q.remove(node);
        }
        s.clear_wait_queue(list.id());
        list.sync_pending(q);
    }

    /// Whether this sender is the next one `list` would hand out.
    pub fn is_head_of(&self, list: &SenderList) -> bool {
        let q = list.lock();
        self.is_head_locked(&q)
    }

    pub(crate) fn is_head_locked(&self, q: &PrioList<SenderRef>) -> bool {
        match (self.sender().node(), q.first_id()) {
            (Some(mine), Some(head)) => mine == head,
            _ => false,
        }
    }

    /// The receiver dropped this sender. Only the sender's own record is
    /// cleared; the queue belongs to the receiver, which has already taken
    /// the node out or will discard it. Pending interrupt hits die with
    /// the receiver.
    pub fn ipc_receiver_aborted(&self) {
        let s = self.sender();
        s.set_wait_queue(None);
        s.set_node(None);
        match self {
            Self::Thread(t) => {
                t.state_add_dirty(ThreadState::CANCEL);
            }
            Self::Irq(i) => i.reset(),
        }
    }

    // ── Rendezvous hooks ──────────────────────────────────────────────────────

    /// Take the message this sender offers.
    pub(crate) fn transfer_msg(&self) -> Delivery {
        let msg = match self {
            Self::Thread(t) => t.out_msg(),
            Self::Irq(i) => Message::new(i.label(), 0),
        };
        Delivery { from: self.id(), msg }
    }

    /// After a transfer: leave the queue (`true`) or stay queued for the
    /// next occurrence (`false`).
    pub(crate) fn dequeue_sender(&self) -> bool {
        match self {
            Self::Thread(_) => true,
            Self::Irq(i) => i.consume() < 1,
        }
    }

    /// A queued send finished, by transfer or by abort. Wakes a blocked
    /// thread sender through its home CPU.
    pub(crate) fn finish_send(&self, cpus: &CpuSet, acting: CpuId) {
        if let Self::Thread(t) = self {
            t.set_send_partner(None);
            t.state_change_dirty(!ThreadState::SEND_WAIT, ThreadState::READY);
            cpus.wake(acting, t);
        }
    }
}

impl PartialEq for SenderRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for SenderRef {}

impl core::fmt::Debug for SenderRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Thread(t) => write!(f, "Thread({:?})", t.id()),
            Self::Irq(i) => write!(f, "Irq({:#x})", i.label()),
        }
    }
}
