//! libl4 — ABI shared between the kernel and user space
//!
//! Коды ошибок и параметры планирования, как их видит системный вызов.
//! Error codes and scheduling parameters as a system call sees them.
//!
//! Использование / Usage:
//!   use libl4::{SchedParam, RawSchedParam};
//!   let p = SchedParam::try_from(RawSchedParam::wfq(10_000, 2))?;

#![no_std]

pub mod sched;

pub use sched::{RawSchedParam, SchedParam};

/// Ошибки ядра / Kernel errors
///
/// Значения совпадают с номерами L4 (errno-совместимые).
/// Values match the L4 error numbers (errno compatible).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Object not found.
    ENoent,
    /// Invalid argument.
    EInval,
    /// Argument out of range.
    ERange,
    /// Operation canceled by the other party.
    ECanceled,
}

impl Error {
    /// Negative error code as returned in the syscall result register.
    pub const fn code(self) -> isize {
        -(self.errno() as isize)
    }

    /// Positive error number.
    pub const fn errno(self) -> u32 {
        match self {
            Self::ENoent    => 2,
            Self::EInval    => 22,
            Self::ERange    => 34,
            Self::ECanceled => 125,
        }
    }

    /// Decode a negative syscall result.
    pub const fn from_code(code: isize) -> Option<Self> {
        match code {
            -2   => Some(Self::ENoent),
            -22  => Some(Self::EInval),
            -34  => Some(Self::ERange),
            -125 => Some(Self::ECanceled),
            _    => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::ENoent    => "ENOENT",
            Self::EInval    => "EINVAL",
            Self::ERange    => "ERANGE",
            Self::ECanceled => "ECANCELED",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
