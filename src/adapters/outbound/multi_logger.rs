use crate::adapters::outbound::{init_console_logger, init_file_logger};
use crate::domains::logger::{DomainLogger, DynLogger};
use std::sync::Arc;
use tracing::warn;

/// Forwards every message to each sink in order.
pub struct MultiLogger {
    sinks: Vec<DynLogger>,
}

impl MultiLogger {
    pub fn new(sinks: Vec<DynLogger>) -> Self {
        Self { sinks }
    }
}

impl DomainLogger for MultiLogger {
    fn info(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.info(msg));
    }

    fn warn(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.warn(msg));
    }

    fn error(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.error(msg));
    }
}

/// Console plus, when `path` is given and the file backend starts, a request log file.
pub fn init_combined_logger(path: Option<&str>) -> DynLogger {
    let console = init_console_logger();
    let Some(path) = path else {
        return console;
    };
    match init_file_logger(path) {
        Ok(file) => Arc::new(MultiLogger::new(vec![file, console])),
        Err(e) => {
            warn!(error = %e, "Domain log file unavailable, using console only");
            console
        }
    }
}
