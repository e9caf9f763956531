//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the ordered bootstrap stages, one at a time
//! - Retry a failing stage until the shared deadline expires
//! - Give up at once on errors a retry cannot fix (container misuse, bad config)
//! - Abort on cancellation, checked before every attempt and during retry sleeps
//!
//! # Design Decisions
//! - No backtracking: a stage that succeeded is never invoked again
//! - Only the failing stage is retried, never the chain from the start
//! - No rollback: stages that already succeeded are left as they are
//! - The container is sealed once every stage has succeeded

use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use crate::di::DependencyContainer;
use crate::lifecycle::timer::Waited;
use crate::lifecycle::{BootstrapHandler, CancelSignal, StartupTimer};

/// Fatal bootstrap failure. The service must not start serving.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("stage '{stage}' failed {attempts} time(s) and the boot deadline passed after {elapsed:?}: {last_error}")]
    DeadlineExceeded {
        stage: String,
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },

    #[error("stage '{stage}' failed with a non-retryable error on attempt {attempts}: {error}")]
    Fatal {
        stage: String,
        attempts: u32,
        error: String,
    },

    #[error("bootstrap cancelled during stage '{stage}' after {attempts} attempt(s)")]
    Cancelled { stage: String, attempts: u32 },
}

impl BootstrapError {
    /// Name of the stage that was running when bootstrap aborted.
    pub fn stage(&self) -> &str {
        match self {
            BootstrapError::DeadlineExceeded { stage, .. }
            | BootstrapError::Fatal { stage, .. }
            | BootstrapError::Cancelled { stage, .. } => stage,
        }
    }
}

/// Attempts spent on one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub attempts: u32,
}

/// Summary of a successful bootstrap.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

/// Per-stage state machine.
enum StageState {
    Running { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded { attempts: u32 },
    FatalFailed(BootstrapError),
}

/// Run `handlers` in order against the shared timer and container.
///
/// Returns once every stage has succeeded, or with the first fatal failure.
pub async fn run(
    handlers: &[Box<dyn BootstrapHandler>],
    timer: &StartupTimer,
    container: &DependencyContainer,
    cancel: &CancelSignal,
) -> Result<BootstrapReport, BootstrapError> {
    tracing::info!(
        stages = handlers.len(),
        timeout_ms = timer.remaining().as_millis() as u64,
        retry_interval_ms = timer.retry_interval().as_millis() as u64,
        "Bootstrap starting"
    );

    let mut report = BootstrapReport::default();
    for handler in handlers {
        let name = handler.name().to_string();
        let attempts = run_stage(handler.as_ref(), timer, container, cancel)
            .instrument(tracing::info_span!("bootstrap_stage", stage = %name))
            .await?;
        report.stages.push(StageReport { name, attempts });
    }

    container.seal();
    report.elapsed = timer.elapsed();
    tracing::info!(elapsed_ms = report.elapsed.as_millis() as u64, "Bootstrap completed");
    Ok(report)
}

async fn run_stage(
    handler: &dyn BootstrapHandler,
    timer: &StartupTimer,
    container: &DependencyContainer,
    cancel: &CancelSignal,
) -> Result<u32, BootstrapError> {
    let stage = handler.name();
    let cancelled = |attempts| BootstrapError::Cancelled {
        stage: stage.to_string(),
        attempts,
    };

    let mut state = StageState::Running { attempt: 1 };
    loop {
        state = match state {
            StageState::Running { attempt } => {
                if cancel.is_cancelled() {
                    StageState::FatalFailed(cancelled(attempt - 1))
                } else {
                    metrics::counter!("bootstrap_stage_attempts_total", "stage" => stage.to_string())
                        .increment(1);
                    match handler.bootstrap(container, timer, cancel).await {
                        Ok(()) => StageState::Succeeded { attempts: attempt },
                        Err(e) if cancel.is_cancelled() => {
                            tracing::warn!(attempt, error = %e, "Stage failed after cancellation");
                            StageState::FatalFailed(cancelled(attempt))
                        }
                        Err(e) if e.is_fatal() => StageState::FatalFailed(BootstrapError::Fatal {
                            stage: stage.to_string(),
                            attempts: attempt,
                            error: e.to_string(),
                        }),
                        Err(e) if !timer.has_time_remaining() => {
                            StageState::FatalFailed(BootstrapError::DeadlineExceeded {
                                stage: stage.to_string(),
                                attempts: attempt,
                                elapsed: timer.elapsed(),
                                last_error: e.to_string(),
                            })
                        }
                        Err(e) => {
                            tracing::warn!(
                                attempt,
                                error = %e,
                                remaining_ms = timer.remaining().as_millis() as u64,
                                "Stage failed, will retry"
                            );
                            StageState::Retrying { attempt }
                        }
                    }
                }
            }
            StageState::Retrying { attempt } => match timer.wait(cancel).await {
                Waited::Elapsed => StageState::Running { attempt: attempt + 1 },
                Waited::Cancelled => StageState::FatalFailed(cancelled(attempt)),
            },
            StageState::Succeeded { attempts } => {
                tracing::info!(attempts, "Stage succeeded");
                return Ok(attempts);
            }
            StageState::FatalFailed(err) => {
                tracing::error!(error = %err, "Stage failed fatally");
                return Err(err);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceKey;
    use crate::lifecycle::{stage, StageError};

    #[tokio::test(start_paused = true)]
    async fn test_empty_chain_succeeds_and_seals() {
        let container = DependencyContainer::new();
        let timer = StartupTimer::from_secs(1, 5);
        let report = run(&[], &timer, &container, &CancelSignal::never()).await.unwrap();
        assert!(report.stages.is_empty());
        assert!(container.is_sealed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_container_open() {
        let container = DependencyContainer::new();
        let timer = StartupTimer::from_secs(1, 1);
        let handlers = vec![stage("never", |_, _, _| async {
            Err(StageError::Other("nope".into()))
        })];

        let err = run(&handlers, &timer, &container, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "never");
        assert!(!container.is_sealed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_sees_entries_of_earlier_stages() {
        const SECRET: ServiceKey = ServiceKey::from_static("secret");
        let container = DependencyContainer::new();
        let timer = StartupTimer::from_secs(1, 5);
        let handlers = vec![
            stage("secrets", |c: DependencyContainer, _, _| async move {
                c.register_instance(SECRET, String::from("s3cr3t"))?;
                Ok::<(), StageError>(())
            }),
            stage("database", |c: DependencyContainer, _, _| async move {
                let secret = c.get_as::<String>(&SECRET).await?;
                assert_eq!(secret, "s3cr3t");
                Ok::<(), StageError>(())
            }),
        ];

        let report = run(&handlers, &timer, &container, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(
            report.stages,
            vec![
                StageReport { name: "secrets".into(), attempts: 1 },
                StageReport { name: "database".into(), attempts: 1 },
            ]
        );
    }
}
