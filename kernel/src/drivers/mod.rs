//! Kernel-space drivers
//!
//! Минимально необходимые для отладки / Minimum required for debugging:
//!   - Console — отладочный вывод в зарегистрированный приёмник
//!     debug output into the registered sink

pub mod console;

/// Макрос для отладочного вывода.
/// Debug print macro.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::drivers::console::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    ()           => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}
