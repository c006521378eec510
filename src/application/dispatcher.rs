use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domains::routing::{
    decode_path, EncodedQuery, EngineFailure, EngineInvoker, EngineOutcome, EngineResult,
    InvocationError, RawEngineOutput,
};

/// Backstop beyond the deadline for backends that do not honour it themselves.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(1);

/// Runs every engine against the same serialized query concurrently.
///
/// All invocations are spawned before any is awaited; results come back in the order the
/// engines were given. There is no retry and no shared deadline: each engine gets its own
/// budget and its own failure.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    kill_grace: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    pub async fn run(
        &self,
        query: &EncodedQuery,
        engines: Vec<Arc<dyn EngineInvoker>>,
        time_budget: Duration,
    ) -> Vec<EngineOutcome> {
        info!(engines = engines.len(), bytes = query.len(), budget_secs = time_budget.as_secs_f64(), "Dispatching query");

        let handles: Vec<_> = engines
            .into_iter()
            .map(|engine| {
                let input = query.bytes();
                let kill_grace = self.kill_grace;
                let descriptor = engine.descriptor().clone();
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let deadline = started + time_budget;
                    let result = match tokio::time::timeout_at(deadline + kill_grace, engine.invoke(input, deadline)).await {
                        Ok(Ok(raw)) => interpret(&engine.descriptor().name, raw),
                        Ok(Err(InvocationError::TimedOut)) => EngineResult::TimedOut,
                        Ok(Err(InvocationError::Launch(reason))) => EngineResult::Failure(EngineFailure::Launch(reason)),
                        Err(_) => {
                            warn!(engine = %engine.descriptor().name, "Engine ignored its deadline; abandoned");
                            EngineResult::TimedOut
                        }
                    };
                    (result, started.elapsed())
                });
                (descriptor, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (descriptor, handle) in handles {
            let (result, elapsed) = match handle.await {
                Ok(done) => done,
                Err(e) => (
                    EngineResult::Failure(EngineFailure::Launch(format!("invocation task failed: {}", e))),
                    Duration::ZERO,
                ),
            };
            log_outcome(&descriptor.name, &result, elapsed);
            outcomes.push(EngineOutcome {
                engine: descriptor,
                result,
                elapsed,
            });
        }
        outcomes
    }
}

fn interpret(engine: &str, raw: RawEngineOutput) -> EngineResult {
    let diagnostics = String::from_utf8_lossy(&raw.stderr).trim().to_string();
    if !raw.success {
        return EngineResult::Failure(EngineFailure::Exit {
            code: raw.exit_code,
            diagnostics,
        });
    }
    match decode_path(&raw.stdout) {
        Ok(path) => EngineResult::Success { path, diagnostics },
        Err(e) => {
            debug!(engine, error = %e, "Engine output rejected");
            EngineResult::Failure(EngineFailure::Protocol(e.to_string()))
        }
    }
}

fn log_outcome(engine: &str, result: &EngineResult, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match result {
        EngineResult::Success { path, diagnostics } => {
            info!(engine, elapsed_ms, nodes = path.len(), "Engine completed");
            if !diagnostics.is_empty() {
                info!(engine, "Extra info from engine: {}", diagnostics);
            }
        }
        EngineResult::Failure(failure) => warn!(engine, elapsed_ms, "Engine failed: {}", failure),
        EngineResult::TimedOut => warn!(engine, elapsed_ms, "Engine timed out"),
    }
}
