//! Receive
//!
//! Получатель берёт первого подходящего отправителя из своей очереди или
//! засыпает в RECEIVE_WAIT. Засыпание — под блокировкой очереди, так что
//! отправитель не может проскочить между проверкой и ожиданием.
//! The receiver takes the first eligible sender from its queue or sleeps
//! in RECEIVE_WAIT. Going to sleep happens under the queue lock, so no
//! sender slips in between the check and the wait.

use alloc::sync::Arc;

use super::prio_list::{NodeId, PrioList};
use super::receiver::{Delivery, SenderList};
use super::sender::{SenderId, SenderRef};
use crate::sched::{CpuId, CpuSet};
use crate::thread::{Thread, ThreadState, Timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvResult {
    /// A queued sender was taken.
    Received(Delivery),
    /// Nobody eligible; the receiver is blocked. Its next delivery is left
    /// in the inbox by the waking sender.
    Blocked,
}

/// Receive on `receiver`, running on `cpu`. `partner` restricts the wait
/// to one sender.
pub fn receive(
    cpus: &CpuSet,
    cpu: CpuId,
    receiver: &Arc<Thread>,
    partner: Option<SenderId>,
    timeout: Option<Arc<Timeout>>,
) -> RecvResult {
    let rcv = receiver.receiver();
    let list = rcv.sender_list();
    rcv.set_partner(partner);

    let taken = {
        let mut q = list.lock();
        discard_aborted(list, &mut q);

        let found = match partner {
            None => q.first().cloned(),
            Some(p) => q
                .iter()
                .find(|(node, s)| s.id() == p && s.sender().node() == Some(*node))
                .map(|(_, s)| s.clone()),
        };

        match found {
            Some(s) => {
                let d = s.transfer_msg();
                if s.dequeue_sender() {
                    s.dequeue_locked(list, &mut q);
                }
                Some((s, d))
            }
            None => {
                rcv.set_timeout(timeout);
                receiver.state_change_dirty(!ThreadState::READY, ThreadState::RECEIVE_WAIT);
                None
            }
        }
    };

    match taken {
        Some((s, d)) => {
            log::trace!("ipc: {:?} took from {:?}", receiver.id(), s);
            s.finish_send(cpus, cpu);
            RecvResult::Received(d)
        }
        None => RecvResult::Blocked,
    }
}

/// Drop head entries left behind by senders whose receiver aborted them.
pub(crate) fn discard_aborted(list: &SenderList, q: &mut PrioList<SenderRef>) {
    while let Some(head) = q.first_id() {
        if owns(q, head) {
            break;
        }
        q.remove(head);
    }
    list.sync_pending(q);
}

fn owns(q: &PrioList<SenderRef>, node: NodeId) -> bool {
    q.get(node).map_or(false, |s| s.sender().node() == Some(node))
}
