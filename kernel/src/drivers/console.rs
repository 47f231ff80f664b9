//! Debug console
//!
//! Платформа регистрирует приёмник один раз при загрузке (UART, буфер
//! трассировки, в тестах — память). До регистрации вывод отбрасывается.
//! The platform registers a sink once at boot (UART, trace buffer, memory
//! in tests). Output before registration is dropped.

use core::fmt;
use spin::{Mutex, Once};

/// Приёмник отладочного вывода / Debug output sink
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Зарегистрировать консоль. Повторные вызовы игнорируются.
/// Register the console. Later calls are ignored.
pub fn set_console(console: &'static dyn Console) -> bool {
    let mut installed = false;
    CONSOLE.call_once(|| {
        installed = true;
        console
    });
    installed
}

/// Отправить строку в консоль.
/// Send string to the console.
pub fn print(s: &str) {
    if let Some(console) = CONSOLE.get() {
        console.write_str(s);
    }
}

// ── fmt::Write для использования с format_args! ───────────────────────────────

struct ConsoleWriter;

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print(s);
        Ok(())
    }
}

// Serializes whole lines from concurrent CPUs.
static CONSOLE_LOCK: Mutex<ConsoleWriter> = Mutex::new(ConsoleWriter);

/// Внутренняя функция для макроса kprint!
/// Internal function for kprint! macro
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    CONSOLE_LOCK.lock().write_fmt(args).ok();
}
