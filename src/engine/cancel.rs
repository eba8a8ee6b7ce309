use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Latched cancellation flag that can also be awaited.
#[derive(Debug, Default)]
pub(crate) struct CancelSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Latch the flag and wake every waiter. Returns `true` only for the call
    /// that actually flipped it.
    pub fn cancel(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            let mut notified = std::pin::pin!(notified);
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn only_first_cancel_flips() {
        let s = CancelSignal::default();
        assert!(!s.is_cancelled());
        assert!(s.cancel());
        assert!(!s.cancel());
        assert!(s.is_cancelled());
    }

    #[tokio::test]
    async fn waiter_wakes_on_cancel() {
        let s = Arc::new(CancelSignal::default());
        let s2 = s.clone();
        let waiter = tokio::spawn(async move { s2.cancelled().await });
        tokio::task::yield_now().await;
        s.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let s = CancelSignal::default();
        s.cancel();
        s.cancelled().await;
    }
}
