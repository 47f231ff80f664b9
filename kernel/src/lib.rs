//! l4core — ready-queue scheduler and synchronous IPC rendezvous
//!
//! Ядро планировщика микроядра: очереди готовности по CPU и протокол
//! синхронной отправки, который будит получателей через них.
//! Scheduler core of the microkernel: per-CPU ready queues and the
//! synchronous send protocol that wakes receivers through them.
//!
//! Слои / Layers (leaves first):
//!   ipc::prio_list — priority-sorted wait queue of senders
//!   sched::context — Schedulable Entity (fixed priority or WFQ)
//!   sched::ready_queue — per-CPU ready queue over both disciplines
//!   ipc::sender    — sender role (wait-queue membership)
//!   ipc::send      — send rendezvous, shortcut and cross-CPU deblock
//!   sched::cpu     — per-CPU dispatcher state
//!
//! Все операции выполняются под блокировкой планирования своего CPU;
//! ни одна из них не блокируется.
//! Every operation runs under its CPU's scheduling lock; none of them blocks.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod ipc;
pub mod logging;
pub mod sched;
pub mod thread;

pub use ipc::{IpcError, IrqSender, SendResult, SenderRef};
pub use sched::{CpuId, CpuSet, ReadyQueue, SchedConfig, SchedContext, SchedId};
pub use thread::{Thread, ThreadId, ThreadState};
