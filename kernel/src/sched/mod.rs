//! Scheduler
//!
//! Планировщик с двумя дисциплинами: фиксированные приоритеты и WFQ.
//! Scheduler with two disciplines: fixed priorities and WFQ.
//!
//! Модули / Modules:
//!   arena       — хранилище контекстов по CPU / per-CPU context storage
//!   context     — Schedulable Entity
//!   fp          — очередь фиксированных приоритетов / fixed-priority queue
//!   wfq         — очередь по виртуальным дедлайнам / virtual-deadline heap
//!   ready_queue — обе очереди за одним интерфейсом / both behind one interface
//!   cpu         — диспетчер по CPU / per-CPU dispatcher

pub mod arena;
pub mod context;
pub mod cpu;
pub mod fp;
pub mod ready_queue;
pub mod wfq;

pub use arena::{SchedArena, SchedId};
pub use context::{SchedContext, SchedKind};
pub use cpu::{Cpu, CpuId, CpuSet, CpuState, SchedConfig, SchedulePass};
pub use ready_queue::ReadyQueue;
