use crate::domains::logger::{DomainLogger, DynLogger};
use std::sync::Arc;

/// Writes domain messages to stderr; stdout carries command output.
struct StderrLogger {
    prefix: &'static str,
}

impl DomainLogger for StderrLogger {
    fn info(&self, msg: &str) {
        eprintln!("{}{}", self.prefix, msg);
    }
    fn warn(&self, msg: &str) {
        eprintln!("{}warning: {}", self.prefix, msg);
    }
    fn error(&self, msg: &str) {
        eprintln!("{}error: {}", self.prefix, msg);
    }
}

pub fn init_console_logger() -> DynLogger {
    Arc::new(StderrLogger { prefix: "routefan: " })
}
