//! Cooperative cancellation for the background experiment task.
//!
//! The controller holds the handle, the execution engine holds the listener.
//! Cancellation never interrupts an in-flight remote call; it is observed at
//! the loop levels and at every sleep.

use std::time::Duration;

use tokio::sync::watch;

/// Create a linked cancellation handle/listener pair.
pub fn cancel_pair() -> (CancelHandle, CancelListener) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelListener { rx })
}

/// Requests cancellation of the task holding the matching listener.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cancellation flag observed by the execution engine.
#[derive(Debug, Clone)]
pub struct CancelListener {
    rx: watch::Receiver<bool>,
}

impl CancelListener {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. A dropped handle counts as
    /// cancellation so the task can never outlive its controller slot.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration`, waking early on cancellation.
    /// Returns true when cancellation was requested.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let timer = tokio::time::sleep(duration);
        tokio::pin!(timer);
        tokio::select! {
            _ = &mut timer => false,
            _ = self.cancelled() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_flag_observed_after_cancel() {
        let (handle, listener) = cancel_pair();
        assert!(!listener.is_cancelled());
        handle.cancel();
        assert!(listener.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_wakes_early_on_cancel() {
        let (handle, mut listener) = cancel_pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let started = Instant::now();
        let cancelled = listener.sleep(Duration::from_secs(30)).await;
        assert!(cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_runs_to_completion_without_cancel() {
        let (_handle, mut listener) = cancel_pair();
        let cancelled = listener.sleep(Duration::from_millis(10)).await;
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_cancelled() {
        let (handle, mut listener) = cancel_pair();
        drop(handle);
        listener.cancelled().await;
    }
}
