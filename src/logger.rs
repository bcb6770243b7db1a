//! `log` backend that hands each formatted record to the kernel log

use crate::MODULE_NAME;
use core::fmt::{self, Write};
use heapless::String;
use log::{Level, Metadata, Record};

/// Longest line handed to the sink, longer records are cut short.
pub const LINE_CAPACITY: usize = 256;

/// Receives one complete, newline-terminated log line.
pub type Sink = fn(Level, &str);

pub struct KernelLogger {
    sink: Sink,
}

impl KernelLogger {
    pub const fn new(sink: Sink) -> Self {
        KernelLogger { sink }
    }

    fn format(record: &Record<'_>) -> String<LINE_CAPACITY> {
        let mut line = String::new();
        let _ = write!(Truncating(&mut line), "[{}] {}", MODULE_NAME, record.args());
        // Truncating always leaves room for this
        let _ = line.push('\n');
        line
    }
}

/// Fills the line up to one byte short of capacity, dropping the rest.
struct Truncating<'a>(&'a mut String<LINE_CAPACITY>);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.len() + c.len_utf8() >= LINE_CAPACITY {
                return Err(fmt::Error);
            }
            self.0.push(c).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let line = KernelLogger::format(record);
            (self.sink)(record.level(), &line);
        }
    }

    fn flush(&self) {}
}
