//! System-wide constants
//!
//! Фиксированные параметры системы, не опции вызова.
//! Fixed system parameters, not per-call options.

/// Priority of a freshly created scheduling context.
pub const DEFAULT_PRIO: u8 = 1;

/// Default timeslice length in microseconds.
pub const DEFAULT_TIME_SLICE: u32 = 10_000;

/// Highest fixed priority.
pub const MAX_PRIO: u8 = 255;

/// Number of fixed priority levels.
pub const PRIO_LEVELS: usize = MAX_PRIO as usize + 1;

/// Maximum number of logical CPUs.
pub const MAX_CPUS: usize = 8;

/// Capacity of the WFQ deadline heap per CPU.
pub const WFQ_QUEUE_CAPACITY: usize = 1024;

/// Wait-queue priority of interrupt senders. Reserved: thread senders never reach it.
pub const IRQ_SENDER_PRIO: u8 = 255;

/// Highest wait-queue priority a thread sender can have.
pub const MAX_SENDER_PRIO: u8 = IRQ_SENDER_PRIO - 1;

/// Whether same-CPU sends may switch straight into the receiver.
pub const IPC_SHORTCUT: bool = !cfg!(feature = "no-ipc-shortcut");
