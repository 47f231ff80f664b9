//! Send protocol
//!
//! Отправка в одну сторону. Решение, передача и выход из очереди — под
//! блокировкой очереди получателя; пробуждение — после неё, под
//! блокировкой домашнего CPU получателя.
//! One-way send. Decision, transfer and dequeue run under the receiver's
//! queue lock; the wakeup follows under the receiver's home CPU lock.
//!
//! Пути пробуждения / Wakeup paths:
//!   Switched  — тот же CPU, прямое переключение / same CPU, direct switch
//!   Deblocked — тот же CPU, через очередь готовности / same CPU, ready queue
//!   Remote    — другой CPU / another CPU

use alloc::sync::Arc;

use super::receiver::AbortState;
use super::recv::discard_aborted;
use super::sender::SenderRef;
use super::{IpcError, Message};
use crate::sched::{CpuId, CpuSet, CpuState};
use crate::thread::{Thread, ThreadState};

/// What a send did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// The receiver was not waiting; the sender is queued.
    Queued,
    /// Delivered; the acting CPU now runs the receiver on the sender's
    /// timeslice.
    Switched,
    /// Delivered; the receiver is ready on the acting CPU. `resched` tells
    /// whether it should preempt the running thread.
    Deblocked { resched: bool },
    /// Delivered; the receiver was enqueued on its own, different CPU.
    Remote,
    /// The receiver vanished before the sender could queue.
    Aborted,
}

impl SendResult {
    #[inline]
    pub fn delivered(self) -> bool {
        matches!(self, Self::Switched | Self::Deblocked { .. } | Self::Remote)
    }
}

/// Offer `sender`'s message to `receiver`. `cpu` is the CPU running this
/// code; its lock must not be held.
pub fn send_msg(
    cpus: &CpuSet,
    cpu: CpuId,
    sender: &SenderRef,
    receiver: &Arc<Thread>,
) -> SendResult {
    let list = receiver.receiver().sender_list();
    sender.sender().set_wait_queue(Some(list.id()));

    let rcv = {
        let mut q = list.lock();

        if receiver.is_dead() {
            sender.dequeue_locked(list, &mut q);
            return SendResult::Aborted;
        }

        discard_aborted(list, &mut q);
        let rcv = receiver.sender_ok(&q, sender);
        if !rcv.is_ready() {
            let prio = sender.ipc_prio();
            if !sender.enqueue_locked(list, &mut q, prio) {
                return SendResult::Aborted;
            }
            log::trace!("ipc: {:?} queued on {:?} at {}", sender, receiver.id(), prio);
            return SendResult::Queued;
        }

        receiver.receiver().deliver(sender.transfer_msg());
        if sender.dequeue_sender() {
            sender.dequeue_locked(list, &mut q);
        } else {
            // More hits pending: stay queued for the next receive.
            let prio = sender.ipc_prio();
            sender.enqueue_locked(list, &mut q, prio);
        }
        // Cleared under the lock so a second sender cannot see the wait.
        receiver.state_change_dirty(!ThreadState::IPC_MASK, ThreadState::empty());
        rcv
    };

    receiver.receiver().reset_timeout();

    if receiver.home_cpu() == cpu {
        let mut st = cpus.cpu(cpu).lock();
        if cpus.config().ipc_shortcut && rcv.is_ipc() && handle_shortcut(&mut st, receiver) {
            return SendResult::Switched;
        }
        receiver.state_add_dirty(ThreadState::READY);
        let resched = st.deblock(receiver);
        return SendResult::Deblocked { resched };
    }

    let mut st = cpus.cpu(receiver.home_cpu()).lock();
    receiver.state_add_dirty(ThreadState::READY);
    st.remote_enqueue(receiver);
    log::trace!("ipc: {:?} woken on {} from {}", receiver.id(), receiver.home_cpu(), cpu);
    SendResult::Remote
}

/// Switch straight into `receiver` when it would preempt anyway and
/// nothing else needs the full path.
fn handle_shortcut(st: &mut CpuState, receiver: &Arc<Thread>) -> bool {
    if Arc::ptr_eq(st.current(), receiver) {
        return false;
    }
    if receiver.state().intersects(
        ThreadState::DRQ_WAIT
            | ThreadState::READY_MASK
            | ThreadState::ALIEN
            | ThreadState::SWITCH_HAZARDS,
    ) {
        return false;
    }
    if st.schedule_in_progress() {
        return false;
    }
    let crs = st.running_sched();
    if !st.rq_mut().deblock(receiver.sched(), crs, true) {
        return false;
    }

    receiver.state_add_dirty(ThreadState::READY);
    st.switch_to_locked(receiver.clone());
    true
}

// ── Thread senders ────────────────────────────────────────────────────────────

/// Send `msg` from thread `sender`, running on `cpu`, to `receiver`.
///
/// On [`SendResult::Queued`] the sender is blocked; once it runs again,
/// [`send_status`] tells how the send ended.
pub fn send(
    cpus: &CpuSet,
    cpu: CpuId,
    sender: &Arc<Thread>,
    receiver: &Arc<Thread>,
    msg: Message,
) -> Result<SendResult, IpcError> {
    if receiver.is_dead() {
        return Err(IpcError::Dead);
    }

    sender.set_out_msg(msg);
    sender.set_send_partner(Some(receiver));
    sender.state_del_dirty(ThreadState::CANCEL);
    // Blocked before the sender is visible in the queue, so a receiver on
    // another CPU can wake it right after.
    sender.state_change_dirty(!ThreadState::READY, ThreadState::SEND_WAIT);

    let res = send_msg(cpus, cpu, &SenderRef::Thread(sender.clone()), receiver);
    if res == SendResult::Queued {
        return Ok(res);
    }

    sender.set_send_partner(None);
    sender.state_change_dirty(!ThreadState::SEND_WAIT, ThreadState::READY);
    match res {
        SendResult::Aborted => Err(IpcError::Canceled),
        _ => Ok(res),
    }
}

/// Outcome of a queued send: `None` while still waiting.
pub fn send_status(sender: &Thread) -> Option<Result<(), IpcError>> {
    let state = sender.state();
    if state.contains(ThreadState::SEND_WAIT) {
        return None;
    }
    if state.contains(ThreadState::CANCEL) {
        sender.state_del_dirty(ThreadState::CANCEL);
        return Some(Err(IpcError::Canceled));
    }
    Some(Ok(()))
}

/// Withdraw `sender`'s queued send, e.g. on timeout. The sender is made
/// ready again unless a receiver already took the message.
pub fn cancel_send(cpus: &CpuSet, cpu: CpuId, sender: &Arc<Thread>) -> AbortState {
    let Some(receiver) = sender.send_partner() else {
        return AbortState::Done;
    };
    let res = receiver.receiver().abort_send(&SenderRef::Thread(sender.clone()));
    if res == AbortState::Canceled {
        sender.set_send_partner(None);
        sender.state_change_dirty(
            !ThreadState::SEND_WAIT,
            ThreadState::READY | ThreadState::CANCEL,
        );
        cpus.wake(cpu, sender);
    }
    res
}
