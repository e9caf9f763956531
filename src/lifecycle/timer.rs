//! Bootstrap deadline and retry-interval policy.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::lifecycle::CancelSignal;

/// Result of [`StartupTimer::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waited {
    /// The full retry interval elapsed.
    Elapsed,
    /// The cancel signal fired before the interval elapsed.
    Cancelled,
}

/// Shared deadline for one bootstrap attempt.
///
/// The deadline is fixed at construction and never extended. Running out of
/// time is reported through [`has_time_remaining`](Self::has_time_remaining),
/// never as an error.
#[derive(Debug, Clone, Copy)]
pub struct StartupTimer {
    started: Instant,
    deadline: Instant,
    retry_interval: Duration,
}

impl StartupTimer {
    /// Start the clock now.
    pub fn new(retry_interval: Duration, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            retry_interval,
        }
    }

    /// Convenience constructor taking whole seconds, as the config does.
    pub fn from_secs(retry_secs: u64, timeout_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(retry_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    /// True while now < deadline.
    pub fn has_time_remaining(&self) -> bool {
        Instant::now() < self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Sleep for one full retry interval, or until `cancel` fires.
    ///
    /// The sleep is not clamped to the deadline.
    pub async fn wait(&self, cancel: &CancelSignal) -> Waited {
        if cancel.is_cancelled() {
            return Waited::Cancelled;
        }
        tokio::select! {
            _ = sleep(self.retry_interval) => Waited::Elapsed,
            _ = cancel.cancelled() => Waited::Cancelled,
        }
    }
}
