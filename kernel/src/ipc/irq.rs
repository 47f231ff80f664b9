//! Interrupt sender
//!
//! Прерывание, привязанное к потоку, отправляет ему сообщение. Пока
//! предыдущее не принято, новые срабатывания только считаются.
//! An interrupt bound to a thread sends it a message. Until the previous
//! one is taken, further hits are only counted.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicIsize, Ordering};

use spin::Mutex;

use super::receiver::AbortState;
use super::send::{send_msg, SendResult};
use super::sender::{Sender, SenderRef};
use crate::sched::{CpuId, CpuSet};
use crate::thread::Thread;

pub struct IrqSender {
    sender: Sender,
    label: u64,
    /// Hits not yet delivered.
    queued: AtomicIsize,
    thread: Mutex<Option<Arc<Thread>>>,
}

impl IrqSender {
    pub fn new(label: u64) -> Arc<Self> {
        Arc::new(Self {
            sender: Sender::new(),
            label,
            queued: AtomicIsize::new(0),
            thread: Mutex::new(None),
        })
    }

    #[inline]
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    #[inline]
    pub fn label(&self) -> u64 {
        self.label
    }

    #[inline]
    pub fn queued(&self) -> isize {
        self.queued.load(Ordering::Acquire)
    }

    /// Deliver future hits to `thread`. A message still queued on the
    /// previous handler moves to the new one; with no live previous
    /// handler the pending count starts over. Returns the result of
    /// moving the message, if one was moved.
    pub fn bind(
        self: &Arc<Self>,
        cpus: &CpuSet,
        cpu: CpuId,
        thread: &Arc<Thread>,
    ) -> Option<SendResult> {
        let old = {
            let mut slot = self.thread.lock();
            if slot.as_ref().is_some_and(|o| Arc::ptr_eq(o, thread)) {
                return None;
            }
            slot.replace(thread.clone())
        };

        let me = SenderRef::Irq(self.clone());
        let reinject = match &old {
            Some(o) if !o.is_dead() => o.receiver().abort_send(&me) == AbortState::Canceled,
            _ => {
                self.reset();
                false
            }
        };
        log::debug!("irq {:#x}: bound to {:?}, reinject {}", self.label, thread.id(), reinject);
        if !reinject {
            return None;
        }
        let res = send_msg(cpus, cpu, &me, thread);
        self.settle(res);
        Some(res)
    }

    /// Stop delivering. A pending message is withdrawn.
    pub fn unbind(self: &Arc<Self>) {
        let Some(t) = self.thread.lock().take() else {
            return;
        };
        SenderRef::Irq(self.clone()).sender_dequeue(t.receiver().sender_list());
        self.reset();
    }

    pub fn bound(&self) -> Option<Arc<Thread>> {
        self.thread.lock().clone()
    }

    /// The interrupt fired; `cpu` took it. Sends only when nothing is
    /// pending, otherwise the hit is counted for a later receive.
    pub fn hit(self: &Arc<Self>, cpus: &CpuSet, cpu: CpuId) -> Option<SendResult> {
        let thread = self.bound()?;
        if self.queue() != 0 {
            return None;
        }
        let res = send_msg(cpus, cpu, &SenderRef::Irq(self.clone()), &thread);
        self.settle(res);
        Some(res)
    }

    /// A send that found no receiver leaves nothing pending.
    fn settle(&self, res: SendResult) {
        if res == SendResult::Aborted {
            self.reset();
        }
    }

    /// Forget all pending hits.
    pub(crate) fn reset(&self) {
        self.queued.store(0, Ordering::Release);
    }

    /// Count a hit; returns the count before it.
    fn queue(&self) -> isize {
        self.queued.fetch_add(1, Ordering::AcqRel)
    }

    /// Take one hit; returns the count left.
    pub(crate) fn consume(&self) -> isize {
        self.queued.fetch_sub(1, Ordering::AcqRel) - 1
    }
}
