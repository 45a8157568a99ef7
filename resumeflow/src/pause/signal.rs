//! Two-state pause signal with broadcast wake-up.

use std::time::Duration;
use tokio::sync::watch;

/// State carried by the pause signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalState {
    /// Stages may start.
    #[default]
    Running,
    /// Stages must wait.
    Paused,
}

/// Blocks stage execution while the workflow is suspended.
///
/// Every waiter holds its own receiver, so a release wakes all of them,
/// and a pause and a release landing back to back are both observed in
/// order because each send bumps the channel version.
#[derive(Debug)]
pub struct PauseSignal {
    tx: watch::Sender<SignalState>,
}

impl PauseSignal {
    /// Creates a signal in the running state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SignalState::Running);
        Self { tx }
    }

    /// Switches to paused.
    pub fn pause(&self) {
        self.tx.send_replace(SignalState::Paused);
    }

    /// Switches to running and wakes every waiter.
    pub fn release(&self) {
        self.tx.send_replace(SignalState::Running);
    }

    /// Returns the current state.
    pub fn state(&self) -> SignalState {
        *self.tx.borrow()
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.state() == SignalState::Paused
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SignalState> {
        self.tx.subscribe()
    }

    /// Waits until running. Returns false if `timeout` elapses first.
    pub async fn wait_until_running(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.tx.subscribe();
        let wait = async move {
            loop {
                if *rx.borrow_and_update() == SignalState::Running {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }
}

impl Default for PauseSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_running_returns_immediately() {
        let signal = PauseSignal::new();
        assert!(signal.wait_until_running(Some(Duration::from_millis(1))).await);
    }

    #[tokio::test]
    async fn test_timeout_while_paused() {
        let signal = PauseSignal::new();
        signal.pause();
        assert!(signal.is_paused());
        assert!(!signal.wait_until_running(Some(Duration::from_millis(20))).await);
    }

    #[tokio::test]
    async fn test_release_wakes_all_waiters() {
        let signal = Arc::new(PauseSignal::new());
        signal.pause();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait_until_running(Some(Duration::from_secs(5))).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.release();

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_pause_release_pause_is_not_lost() {
        let signal = PauseSignal::new();
        let mut rx = signal.subscribe();
        signal.pause();
        signal.release();
        signal.pause();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SignalState::Paused);
    }
}
