//! Scheduling parameters
//!
//! Параметры планирования, передаваемые в ядро.
//! Scheduling parameters handed to the kernel.
//!
//! Классы / Classes:
//!   >= 0 — legacy fixed priority (a = prio, b = quantum)
//!   -1   — fixed priority        (a = prio, b = quantum)
//!   -2   — weighted fair queueing (a = quantum, b = weight)

use crate::{Error, Result};

/// Class tag of the fixed-priority encoding.
pub const CLASS_FIXED_PRIO: i64 = -1;
/// Class tag of the WFQ encoding.
pub const CLASS_WFQ: i64 = -2;

/// Raw parameter block as it arrives from a system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RawSchedParam {
    pub sched_class: i64,
    pub a: u64,
    pub b: u64,
}

impl RawSchedParam {
    pub const fn legacy(prio: u64, quantum: u64) -> Self {
        Self { sched_class: 0, a: prio, b: quantum }
    }

    pub const fn fixed_prio(prio: u64, quantum: u64) -> Self {
        Self { sched_class: CLASS_FIXED_PRIO, a: prio, b: quantum }
    }

    pub const fn wfq(quantum: u64, weight: u64) -> Self {
        Self { sched_class: CLASS_WFQ, a: quantum, b: weight }
    }
}

/// Decoded scheduling parameters.
///
/// Values are still unchecked: clamping and the zero checks happen when the
/// kernel applies them to a scheduling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedParam {
    /// Static priority, higher wins. A zero quantum selects the system default.
    FixedPrio { prio: u32, quantum: u32 },
    /// Weighted fair queueing. Both fields must be non-zero.
    Wfq { quantum: u32, weight: u32 },
}

impl SchedParam {
    pub const fn fixed_prio(prio: u32, quantum: u32) -> Self {
        Self::FixedPrio { prio, quantum }
    }

    pub const fn wfq(quantum: u32, weight: u32) -> Self {
        Self::Wfq { quantum, weight }
    }
}

fn narrow(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl TryFrom<RawSchedParam> for SchedParam {
    type Error = Error;

    fn try_from(raw: RawSchedParam) -> Result<Self> {
        match raw.sched_class {
            c if c >= 0 || c == CLASS_FIXED_PRIO => Ok(Self::FixedPrio {
                prio:    narrow(raw.a),
                quantum: narrow(raw.b),
            }),
            CLASS_WFQ => Ok(Self::Wfq {
                quantum: narrow(raw.a),
                weight:  narrow(raw.b),
            }),
            _ => Err(Error::ERange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_classes() {
        assert_eq!(
            SchedParam::try_from(RawSchedParam::legacy(7, 100)),
            Ok(SchedParam::fixed_prio(7, 100))
        );
        assert_eq!(
            SchedParam::try_from(RawSchedParam::fixed_prio(300, 0)),
            Ok(SchedParam::fixed_prio(300, 0))
        );
        assert_eq!(
            SchedParam::try_from(RawSchedParam::wfq(10, 2)),
            Ok(SchedParam::wfq(10, 2))
        );
    }

    #[test]
    fn test_unknown_class_is_out_of_range() {
        let raw = RawSchedParam { sched_class: -3, a: 1, b: 1 };
        assert_eq!(SchedParam::try_from(raw), Err(Error::ERange));
    }

    #[test]
    fn test_oversized_values_saturate() {
        let raw = RawSchedParam::fixed_prio(u64::MAX, 1);
        assert_eq!(
            SchedParam::try_from(raw),
            Ok(SchedParam::fixed_prio(u32::MAX, 1))
        );
    }
}
