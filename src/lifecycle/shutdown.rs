//! Single-shot stop signals.

use tokio::sync::watch;

/// A one-way, single-shot signal.
///
/// Once triggered it stays triggered. Any number of tasks may wait on it;
/// waiters that arrive after the trigger return immediately.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Trigger the signal. Triggering twice is a no-op.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        self.subscribe().fired().await;
    }

    /// Detach a waiter that does not borrow the signal.
    pub fn subscribe(&self) -> SignalListener {
        SignalListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// A detached waiter on a [`Signal`].
#[derive(Debug)]
pub struct SignalListener {
    rx: watch::Receiver<bool>,
}

impl SignalListener {
    /// Resolve once the signal fires or its owner is dropped.
    pub async fn fired(mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn trigger_is_sticky() {
        let signal = Signal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn wait_wakes_on_trigger() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Late waiters return immediately.
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listener_resolves_when_owner_dropped() {
        let signal = Signal::new();
        let listener = signal.subscribe();
        drop(signal);
        tokio::time::timeout(Duration::from_millis(50), listener.fired())
            .await
            .unwrap();
    }
}
