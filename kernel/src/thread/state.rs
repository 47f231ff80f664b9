//! Thread state bits
//!
//! Битовая маска состояния потока. Биты меняются атомарно, но без
//! синхронизации с другими полями: вызывающий держит нужную блокировку.
//! Thread state bitmask. Bits change atomically, but are not ordered
//! against other fields: the caller holds whatever lock protects those.

use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThreadState: u32 {
        /// Может быть выбран планировщиком / Can be scheduled.
        const READY               = 0x1;
        /// Pending cross-CPU request.
        const DRQ_READY           = 0x2;
        const READY_MASK          = Self::READY.bits() | Self::DRQ_READY.bits();

        /// Waiting in a receiver's sender queue.
        const SEND_WAIT           = 0x4;
        /// Waiting for a message.
        const RECEIVE_WAIT        = 0x8;
        /// A sender is transferring into this thread right now.
        const RECEIVE_IN_PROGRESS = 0x10;
        const IPC_MASK            = Self::SEND_WAIT.bits()
                                  | Self::RECEIVE_WAIT.bits()
                                  | Self::RECEIVE_IN_PROGRESS.bits();

        const IPC_TRANSFER        = 0x20;
        /// The receiver aborted the transfer.
        const TRANSFER_FAILED     = 0x40;
        /// The pending operation was canceled by the other side.
        const CANCEL              = 0x80;
        const TIMEOUT             = 0x100;

        /// Inactive and in no queue.
        const DEAD                = 0x200;
        const FINISH_MIGRATION    = 0x1000;
        const NEED_RESCHED        = 0x2000;
        /// Work that must happen on the normal switch path.
        const SWITCH_HAZARDS      = Self::FINISH_MIGRATION.bits() | Self::NEED_RESCHED.bits();

        /// Not allowed to enter the kernel directly.
        const ALIEN               = 0x10000;
        /// Polling for cross-CPU requests.
        const DRQ_WAIT            = 0x100000;
    }
}

/// Atomically updated [`ThreadState`].
pub struct AtomicThreadState(AtomicU32);

impl AtomicThreadState {
    pub const fn new(state: ThreadState) -> Self {
        Self(AtomicU32::new(state.bits()))
    }

    #[inline]
    pub fn load(&self) -> ThreadState {
        ThreadState::from_bits_retain(self.0.load(Ordering::Acquire))
    }

    /// Set `bits`.
    #[inline]
    pub fn add(&self, bits: ThreadState) {
        self.0.fetch_or(bits.bits(), Ordering::AcqRel);
    }

    /// Clear `bits`.
    #[inline]
    pub fn del(&self, bits: ThreadState) {
        self.0.fetch_and(!bits.bits(), Ordering::AcqRel);
    }

    /// `state = (state & mask) | add`, as one step.
    pub fn change(&self, mask: ThreadState, add: ThreadState) -> ThreadState {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let new = (cur & mask.bits()) | add.bits();
            match self.0.compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return ThreadState::from_bits_retain(new),
                Err(seen) => cur = seen,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_match_abi() {
        assert_eq!(ThreadState::READY_MASK.bits(), 0x3);
        assert_eq!(ThreadState::IPC_MASK.bits(), 0x1c);
        assert_eq!(ThreadState::SWITCH_HAZARDS.bits(), 0x3000);
        assert_eq!(ThreadState::DRQ_WAIT.bits(), 0x100000);
    }

    #[test]
    fn test_change_masks_then_adds() {
        let s = AtomicThreadState::new(ThreadState::RECEIVE_WAIT | ThreadState::CANCEL);
        let new = s.change(!ThreadState::IPC_MASK, ThreadState::READY);
        assert_eq!(new, ThreadState::READY | ThreadState::CANCEL);
        assert_eq!(s.load(), new);

        s.del(ThreadState::CANCEL);
        s.add(ThreadState::NEED_RESCHED);
        assert!(s.load().intersects(ThreadState::SWITCH_HAZARDS));
        assert!(!s.load().contains(ThreadState::CANCEL));
    }
}
