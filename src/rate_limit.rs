use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelHandle;
use crate::error::LLMError;

/// Waits out a vendor-requested delay before dispatching.
///
/// `None` and zero return immediately. Otherwise sleeps for exactly `delay` unless the
/// caller cancels first, in which case [`LLMError::Cancelled`] is returned and nothing
/// should be dispatched. No retry or backoff happens here.
pub async fn wait_rate_limit(
    delay: Option<Duration>,
    cancel: &CancelHandle,
) -> Result<(), LLMError> {
    let Some(delay) = delay.filter(|delay| !delay.is_zero()) else {
        return Ok(());
    };

    debug!(delay_ms = delay.as_millis() as u64, "waiting for rate limit");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LLMError::cancelled("during rate-limit delay")),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_exactly_the_requested_delay() {
        let cancel = CancelHandle::new();
        let started = Instant::now();
        wait_rate_limit(Some(Duration::from_millis(1500)), &cancel)
            .await
            .expect("not cancelled");
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_or_missing_delay_returns_immediately() {
        let cancel = CancelHandle::new();
        let started = Instant::now();
        wait_rate_limit(None, &cancel).await.expect("no delay");
        wait_rate_limit(Some(Duration::ZERO), &cancel)
            .await
            .expect("zero delay");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = wait_rate_limit(Some(Duration::from_secs(10)), &cancel)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
