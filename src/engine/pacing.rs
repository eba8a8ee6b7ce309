use crate::engine::cancel::CancelSignal;
use std::time::Duration;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Count down `secs` seconds, reporting the remaining seconds before every tick
/// and `0` at the end. Each tick races the cancel signal, so a cancel cuts the
/// wait short without waiting for the tick to finish.
pub(crate) async fn countdown<F>(secs: u64, cancel: &CancelSignal, mut on_tick: F) -> WaitOutcome
where
    F: FnMut(u64),
{
    for remaining in (1..=secs).rev() {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        on_tick(remaining);
        tokio::select! {
            _ = tokio::time::sleep(TICK) => {}
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
        }
    }
    if cancel.is_cancelled() {
        return WaitOutcome::Cancelled;
    }
    on_tick(0);
    WaitOutcome::Elapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn ticks_down_to_zero() {
        let cancel = CancelSignal::default();
        let mut seen = Vec::new();
        let t0 = Instant::now();
        let out = countdown(3, &cancel, |s| seen.push(s)).await;
        assert_eq!(out, WaitOutcome::Elapsed);
        assert_eq!(seen, vec![3, 2, 1, 0]);
        assert_eq!(t0.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_seconds_does_not_sleep() {
        let cancel = CancelSignal::default();
        let t0 = Instant::now();
        let mut seen = Vec::new();
        assert_eq!(
            countdown(0, &cancel, |s| seen.push(s)).await,
            WaitOutcome::Elapsed
        );
        assert_eq!(seen, vec![0]);
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_mid_tick() {
        let cancel = Arc::new(CancelSignal::default());
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            c2.cancel();
        });
        let t0 = Instant::now();
        let out = countdown(10, &cancel, |_| {}).await;
        assert_eq!(out, WaitOutcome::Cancelled);
        assert!(t0.elapsed() < Duration::from_secs(3));
    }
}
