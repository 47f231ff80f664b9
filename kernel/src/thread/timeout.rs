//! IPC timeout handle
//!
//! Таймер ожидания получателя. Срабатывание таймеров вне ядра
//! планировщика; здесь только взвод и сброс.
//! Receive-wait timer. Expiry is driven by the platform timer code; this
//! handle only tracks arming and resets.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct Timeout {
    deadline: u64,
    armed: AtomicBool,
    resets: AtomicU32,
}

impl Timeout {
    /// Armed timeout firing at `deadline` (absolute, in microseconds).
    pub const fn new(deadline: u64) -> Self {
        Self { deadline, armed: AtomicBool::new(true), resets: AtomicU32::new(0) }
    }

    #[inline]
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Disarm. Counts every call, armed or not.
    pub fn reset(&self) {
        self.armed.store(false, Ordering::Release);
        self.resets.fetch_add(1, Ordering::AcqRel);
    }

    /// How many times [`Timeout::reset`] ran.
    #[inline]
    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::Acquire)
    }
}
