//! Kernel logger
//!
//! Реализация `log::Log`, пишущая в отладочную консоль.
//! `log::Log` implementation writing to the debug console.
//!
//! Формат / Format:
//!   [LEVEL target] message

use core::sync::atomic::{AtomicBool, Ordering};

use log::{LevelFilter, Log, Metadata, Record};

use crate::kprintln;

pub struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;
static INSTALLED: AtomicBool = AtomicBool::new(false);

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        kprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Установить логгер ядра. Повторный вызов только меняет уровень.
/// Install the kernel logger. A second call only adjusts the level.
pub fn init(level: LevelFilter) {
    if !INSTALLED.swap(true, Ordering::AcqRel) && log::set_logger(&LOGGER).is_err() {
        // Someone else owns the facade; keep theirs.
        return;
    }
    log::set_max_level(level);
}
