//! Bootstrap stage abstraction.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::di::{ContainerError, DependencyContainer};
use crate::lifecycle::{CancelSignal, StartupTimer};

/// Why a stage did not complete on this attempt.
///
/// Container misuse and misconfiguration are fatal: retrying cannot change
/// the outcome, so the orchestrator gives up on the first one. Everything
/// else is transient and retried until the shared deadline.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{dependency} unavailable: {reason}")]
    Unavailable {
        dependency: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn unavailable(dependency: &'static str, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            dependency,
            reason: reason.to_string(),
        }
    }

    pub fn misconfigured(reason: impl fmt::Display) -> Self {
        Self::Misconfigured(reason.to_string())
    }

    /// Whether retrying the stage is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Container(_) | StageError::Misconfigured(_))
    }
}

/// One ordered stage of service startup.
///
/// Implementations must be safe to call again after a failure: acquire
/// everything first and register container entries last, so a failed attempt
/// leaves nothing behind that breaks the retry.
#[async_trait]
pub trait BootstrapHandler: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    async fn bootstrap(
        &self,
        container: &DependencyContainer,
        timer: &StartupTimer,
        cancel: &CancelSignal,
    ) -> Result<(), StageError>;
}

/// Adapter turning an async closure into a [`BootstrapHandler`].
///
/// The closure receives owned clones of the container, timer and signal.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(DependencyContainer, StartupTimer, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StageError>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> BootstrapHandler for FnHandler<F>
where
    F: Fn(DependencyContainer, StartupTimer, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StageError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn bootstrap(
        &self,
        container: &DependencyContainer,
        timer: &StartupTimer,
        cancel: &CancelSignal,
    ) -> Result<(), StageError> {
        (self.f)(container.clone(), *timer, cancel.clone()).await
    }
}

/// Box a closure as a stage, ready for the handler list.
pub fn stage<F, Fut>(name: impl Into<String>, f: F) -> Box<dyn BootstrapHandler>
where
    F: Fn(DependencyContainer, StartupTimer, CancelSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StageError>> + Send + 'static,
{
    Box::new(FnHandler::new(name, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceKey;

    #[test]
    fn test_fatal_classification() {
        let key = ServiceKey::from_static("k");
        assert!(StageError::from(ContainerError::DuplicateKey(key.clone())).is_fatal());
        assert!(StageError::from(ContainerError::UnknownKey(key)).is_fatal());
        assert!(StageError::misconfigured("bad address").is_fatal());

        assert!(!StageError::unavailable("database", "refused").is_fatal());
        assert!(!StageError::Other("nope".into()).is_fatal());
        assert!(!StageError::Io(std::io::Error::other("reset")).is_fatal());
    }
}
