//! Synchronous IPC
//!
//! Встреча отправителя и получателя. Отправитель либо передаёт сразу,
//! либо ждёт в очереди получателя по приоритету; получатель будится
//! через очередь готовности своего CPU.
//! Sender/receiver rendezvous. A sender either transfers at once or waits
//! in the receiver's queue by priority; the receiver is woken through its
//! home CPU's ready queue.
//!
//! Модули / Modules:
//!   prio_list — очередь отправителей / sender wait queue
//!   sender    — роль отправителя / sender role
//!   receiver  — роль получателя / receiver role
//!   send      — протокол отправки / send protocol
//!   recv      — приём / receive
//!   irq       — прерывание как отправитель / interrupt as a sender

pub mod irq;
pub mod prio_list;
pub mod receiver;
pub mod recv;
pub mod send;
pub mod sender;

use core::fmt;

pub use irq::IrqSender;
pub use receiver::{AbortState, Delivery, RcvState, Receiver, SenderList, WaitQueueId};
pub use recv::{receive, RecvResult};
pub use send::{cancel_send, send, send_msg, send_status, SendResult};
pub use sender::{Sender, SenderId, SenderRef};

/// Сообщение / Message
///
/// Only the label and one data word travel; the register layout belongs to
/// the system-call layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Message {
    pub label: u64,
    pub data: u64,
}

impl Message {
    pub const fn new(label: u64, data: u64) -> Self {
        Self { label, data }
    }
}

/// Ошибки IPC / IPC errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// The partner went away or withdrew before the transfer.
    Canceled,
    /// The receiver is dead.
    Dead,
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => write!(f, "IPC canceled"),
            Self::Dead => write!(f, "IPC partner dead"),
        }
    }
}

impl From<IpcError> for libl4::Error {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::Canceled => libl4::Error::ECanceled,
            IpcError::Dead => libl4::Error::ENoent,
        }
    }
}
