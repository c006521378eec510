use crate::domains::logger::{DynLogger, FileLogger};
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Install `fast_log` on `path` and return the file-backed domain logger.
/// Fails if another `log` backend is already installed.
pub fn init_file_logger(path: &str) -> Result<DynLogger> {
    FileLogger::init(path).map_err(|e| anyhow!("failed to initialize fast_log at {}: {}", path, e))?;
    Ok(Arc::new(FileLogger))
}
