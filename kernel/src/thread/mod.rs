//! Threads
//!
//! Поток — единица планирования и участник IPC. Роли отправителя и
//! получателя встроены в поток; контекст планирования лежит в арене
//! домашнего CPU и адресуется через `SchedId`.
//! A thread is the unit of scheduling and an IPC party. The sender and
//! receiver roles are embedded in it; its scheduling context lives in the
//! home CPU's arena and is addressed by `SchedId`.

pub mod state;
pub mod timeout;

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use crate::config::MAX_SENDER_PRIO;
use crate::ipc::{Message, RcvState, Receiver, Sender, SenderRef};
use crate::ipc::prio_list::PrioList;
use crate::sched::{CpuId, SchedContext, SchedId};

pub use state::{AtomicThreadState, ThreadState};
pub use timeout::Timeout;

/// Идентификатор потока / Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    fn alloc() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

pub struct Thread {
    id: ThreadId,
    home_cpu: CpuId,
    sched: SchedId,
    /// Position in receivers' sender queues; mirrors the scheduling context.
    sender_prio: AtomicU8,
    state: AtomicThreadState,
    sender: Sender,
    receiver: Receiver,
    /// Message handed over when a receiver takes this thread's send.
    out_msg: Mutex<Message>,
    /// Receiver this thread is currently sending to.
    send_partner: Mutex<Option<Weak<Thread>>>,
}

impl Thread {
    pub(crate) fn new(home_cpu: CpuId, sched: SchedId, sc: &SchedContext) -> Self {
        Self {
            id: ThreadId::alloc(),
            home_cpu,
            sched,
            sender_prio: AtomicU8::new(sender_prio_of(sc)),
            state: AtomicThreadState::new(ThreadState::empty()),
            sender: Sender::new(),
            receiver: Receiver::new(),
            out_msg: Mutex::new(Message::default()),
            send_partner: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn home_cpu(&self) -> CpuId {
        self.home_cpu
    }

    /// Scheduling context in the home CPU's ready queue.
    #[inline]
    pub fn sched(&self) -> SchedId {
        self.sched
    }

    // ── State ─────────────────────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state.load()
    }

    /// Set bits. "Dirty": ordered only by the lock the caller holds.
    #[inline]
    pub fn state_add_dirty(&self, bits: ThreadState) {
        self.state.add(bits);
    }

    #[inline]
    pub fn state_del_dirty(&self, bits: ThreadState) {
        self.state.del(bits);
    }

    /// `state = (state & mask) | add`.
    #[inline]
    pub fn state_change_dirty(&self, mask: ThreadState, add: ThreadState) -> ThreadState {
        self.state.change(mask, add)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state().intersects(ThreadState::READY_MASK)
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.state().contains(ThreadState::DEAD)
    }

    // ── IPC roles ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    #[inline]
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Priority this thread queues at when it sends. Never reaches the
    /// level reserved for interrupts.
    #[inline]
    pub fn sender_prio(&self) -> u8 {
        self.sender_prio.load(Ordering::Relaxed)
    }

    pub(crate) fn update_sender_prio(&self, sc: &SchedContext) {
        self.sender_prio.store(sender_prio_of(sc), Ordering::Relaxed);
    }

    /// Whether this thread accepts `sender` right now. Call with the sender
    /// queue locked.
    pub fn sender_ok(&self, queue: &PrioList<SenderRef>, sender: &SenderRef) -> RcvState {
        self.receiver.sender_ok(self.state(), queue, sender)
    }

    pub(crate) fn set_out_msg(&self, msg: Message) {
        *self.out_msg.lock() = msg;
    }

    pub(crate) fn out_msg(&self) -> Message {
        *self.out_msg.lock()
    }

    pub(crate) fn set_send_partner(&self, receiver: Option<&Arc<Thread>>) {
        *self.send_partner.lock() = receiver.map(Arc::downgrade);
    }

    pub(crate) fn send_partner(&self) -> Option<Arc<Thread>> {
        self.send_partner.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("home_cpu", &self.home_cpu)
            .field("sched", &self.sched)
            .field("state", &self.state())
            .finish()
    }
}

fn sender_prio_of(sc: &SchedContext) -> u8 {
    if sc.is_wfq() {
        0
    } else {
        sc.prio().min(MAX_SENDER_PRIO)
    }
}
