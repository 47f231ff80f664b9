//! Receiver role
//!
//! Получатель владеет очередью отправителей и решает, кого принять.
//! Блокировка очереди сериализует встречу: решение `sender_ok`,
//! передача и удаление из очереди выполняются под ней.
//! The receiver owns the sender queue and decides whom to accept. The
//! queue's lock serializes the rendezvous: the `sender_ok` decision, the
//! transfer and the dequeue all happen under it.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

use super::prio_list::PrioList;
use super::sender::{SenderId, SenderRef};
use super::Message;
use crate::thread::{ThreadState, Timeout};

/// Identity of a sender queue, as recorded in a sender's `wait_queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitQueueId(u64);

impl WaitQueueId {
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

/// A receiver's queue of waiting senders.
pub struct SenderList {
    id: WaitQueueId,
    queue: Mutex<PrioList<SenderRef>>,
    pending: AtomicBool,
}

impl SenderList {
    pub fn new() -> Self {
        Self {
            id: WaitQueueId::alloc(),
            queue: Mutex::new(PrioList::new()),
            pending: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> WaitQueueId {
        self.id
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, PrioList<SenderRef>> {
        self.queue.lock()
    }

    /// Lock-free hint that someone is queued.
    #[inline]
    pub fn has_senders(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn sync_pending(&self, q: &PrioList<SenderRef>) {
        self.pending.store(!q.is_empty(), Ordering::Release);
    }
}

impl Default for SenderList {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer of [`Receiver::sender_ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcvState {
    /// Not waiting for this sender; it has to queue.
    NotReceiving,
    /// Blocked in an explicit receive and accepting this sender.
    IpcReceive,
}

impl RcvState {
    #[inline]
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::NotReceiving)
    }

    /// Explicit IPC wait, the only state a direct switch may target.
    #[inline]
    pub fn is_ipc(self) -> bool {
        matches!(self, Self::IpcReceive)
    }
}

/// Outcome of [`Receiver::abort_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortState {
    /// Nothing queued: the message was already taken, or never queued.
    Done,
    /// Removed from the queue before any transfer.
    Canceled,
}

/// A delivered message and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub from: SenderId,
    pub msg: Message,
}

pub struct Receiver {
    senders: SenderList,
    /// Closed wait: the only sender accepted. `0` means open wait.
    partner: AtomicU64,
    timeout: Mutex<Option<Arc<Timeout>>>,
    inbox: Mutex<Option<Delivery>>,
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            senders: SenderList::new(),
            partner: AtomicU64::new(0),
            timeout: Mutex::new(None),
            inbox: Mutex::new(None),
        }
    }

    #[inline]
    pub fn sender_list(&self) -> &SenderList {
        &self.senders
    }

    #[inline]
    pub fn partner(&self) -> Option<SenderId> {
        match self.partner.load(Ordering::Acquire) {
            0 => None,
            raw => Some(SenderId::from_raw(raw)),
        }
    }

    /// Restrict the next receive to `partner`, or open it to anyone.
    pub fn set_partner(&self, partner: Option<SenderId>) {
        self.partner.store(partner.map_or(0, SenderId::as_u64), Ordering::Release);
    }

    /// Arm a timeout for the current receive.
    pub fn set_timeout(&self, timeout: Option<Arc<Timeout>>) {
        *self.timeout.lock() = timeout;
    }

    /// Disarm the receive timeout, if one is set.
    pub fn reset_timeout(&self) {
        if let Some(t) = self.timeout.lock().take() {
            t.reset();
        }
    }

    /// Decide whether `sender` may transfer now. `state` is the receiving
    /// thread's state; call with `queue` locked.
    ///
    /// Open wait accepts the queue's head, or anyone if the queue is empty.
    /// Closed wait accepts its partner only.
    pub fn sender_ok(
        &self,
        state: ThreadState,
        queue: &PrioList<SenderRef>,
        sender: &SenderRef,
    ) -> RcvState {
        if state & ThreadState::IPC_MASK != ThreadState::RECEIVE_WAIT {
            return RcvState::NotReceiving;
        }

        let accepted = match self.partner() {
            None => queue.is_empty() || sender.is_head_locked(queue),
            Some(p) => p == sender.id(),
        };
        if accepted {
            RcvState::IpcReceive
        } else {
            RcvState::NotReceiving
        }
    }

    /// Withdraw `sender` from this receiver's queue if no transfer took it
    /// yet. Transfers happen under the queue lock, so none is half done.
    pub fn abort_send(&self, sender: &SenderRef) -> AbortState {
        let mut q = self.senders.lock();
        let s = sender.sender();
        if s.wait_queue() != Some(self.senders.id()) || !s.in_sender_list() {
            return AbortState::Done;
        }
        sender.dequeue_locked(&self.senders, &mut q);
        AbortState::Canceled
    }

    pub(crate) fn deliver(&self, d: Delivery) {
        *self.inbox.lock() = Some(d);
    }

    /// Take the last delivered message.
    pub fn take_delivery(&self) -> Option<Delivery> {
        self.inbox.lock().take()
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}
