//! Shutdown coordination and cancellation signals.

use tokio::sync::watch;

/// Coordinator for process-wide cancellation.
///
/// Holds the sending half of a watch channel. Every long-running piece of the
/// service (the bootstrap orchestrator, the HTTP listener, the event
/// dispatcher) holds a [`CancelSignal`] obtained from [`Shutdown::subscribe`].
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new, untriggered coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Obtain a signal that observes this coordinator.
    pub fn subscribe(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a [`Shutdown`].
///
/// Unlike a broadcast receiver, a signal subscribed after the trigger still
/// observes it, so late subscribers never miss cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender leaves the value at `false` forever.
        drop(tx);
        Self { rx }
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires.
    ///
    /// If the owning [`Shutdown`] is dropped without triggering, this never
    /// resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_subscribers() {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let late = shutdown.subscribe();
        assert!(late.is_cancelled());
        late.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_stays_pending() {
        let signal = CancelSignal::never();
        let res = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(res.is_err());
        assert!(!signal.is_cancelled());
    }
}
