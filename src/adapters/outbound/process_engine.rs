use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domains::routing::{EngineDescriptor, EngineInvoker, InvocationError, RawEngineOutput};

/// Runs an engine as a local child process: no arguments, query on stdin,
/// path on stdout, free-form diagnostics on stderr.
pub struct ProcessEngine {
    descriptor: EngineDescriptor,
}

impl ProcessEngine {
    pub fn new(descriptor: EngineDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl EngineInvoker for ProcessEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: Arc<[u8]>, deadline: Instant) -> Result<RawEngineOutput, InvocationError> {
        let name = self.descriptor.name.as_str();
        debug!(engine = name, path = %self.descriptor.path.display(), "Starting engine process");

        let mut child = Command::new(&self.descriptor.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvocationError::Launch(format!("{}: {}", self.descriptor.path.display(), e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stdin is fed while stdout and stderr drain; sequencing them can stall on a full pipe
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&input).await {
                    // exit status decides the outcome
                    debug!(engine = name, error = %e, "Engine stopped reading its input");
                }
                // dropping stdin closes the pipe and signals end of input
            }
        };

        let run = async {
            let (_, out, err, status) = tokio::join!(feed, drain(stdout), drain(stderr), child.wait());
            (out, err, status)
        };

        match tokio::time::timeout_at(deadline, run).await {
            Ok((out, err, status)) => {
                let status = status.map_err(|e| InvocationError::Launch(format!("waiting for engine: {}", e)))?;
                Ok(RawEngineOutput {
                    success: status.success(),
                    exit_code: status.code(),
                    stdout: out,
                    stderr: err,
                })
            }
            Err(_) => {
                warn!(engine = name, "Deadline reached, killing engine");
                // kill() also reaps the child
                if let Err(e) = child.kill().await {
                    warn!(engine = name, error = %e, "Failed to kill engine process");
                }
                Err(InvocationError::TimedOut)
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Engine output stream closed with an error");
        }
    }
    buf
}
