// ABOUTME: Catch-up protocol that waits for a replica to drain the primary's change stream
// ABOUTME: Polls subscription progress until positions match, or fails on deadline/cancel

use super::subscription::{Subscriber, SubscriptionProgress};
use crate::config::{VerifyConfig, DEFAULT_POLL_INTERVAL};
use crate::error::{ReplicationError, WaitInterrupt};
use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a catch-up wait samples progress and when it gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Reject the log-origin sentinel as evidence of catch-up
    pub strict: bool,
}

impl CatchUpOptions {
    pub fn effective_poll_interval(&self) -> Duration {
        if self.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.poll_interval
        }
    }
}

impl From<&VerifyConfig> for CatchUpOptions {
    fn from(verify: &VerifyConfig) -> Self {
        Self {
            poll_interval: verify.poll_interval(),
            timeout: verify.timeout(),
            strict: verify.strict_lsn_match,
        }
    }
}

/// Whether one progress sample proves the replica has applied everything.
///
/// Both positions must be present and identical. In strict mode the `0/0`
/// origin never counts, even when both sides report it.
pub fn is_caught_up(progress: &SubscriptionProgress, strict: bool) -> bool {
    let (received, latest_end) = (&progress.received, &progress.latest_end);
    if received.is_empty() || latest_end.is_empty() {
        return false;
    }
    if strict && (received.is_origin() || latest_end.is_origin()) {
        return false;
    }
    received == latest_end
}

impl<'a> Subscriber<'a> {
    /// Block until `subscription_name` is caught up, returning the final snapshot.
    ///
    /// Every wait is bounded by `options.timeout` and by `cancel`; either one
    /// firing fails with `CatchUpTimeout` carrying the last sample observed.
    /// Errors reading progress fail immediately.
    pub async fn wait_until_caught_up(
        &self,
        subscription_name: &str,
        options: &CatchUpOptions,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionProgress> {
        let poll = options.effective_poll_interval();
        let deadline = deadline_after(options.timeout);
        let mut last = SubscriptionProgress {
            subscription_name: subscription_name.to_string(),
            ..Default::default()
        };
        let mut samples = 0u64;

        tracing::info!(
            "Waiting for subscription '{}' to catch up (poll {:?}, timeout {:?}, strict={})...",
            subscription_name,
            poll,
            options.timeout,
            options.strict
        );

        loop {
            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(interrupted(subscription_name, WaitInterrupt::Cancelled, last));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(interrupted(subscription_name, WaitInterrupt::DeadlineElapsed, last));
                }
                sample = self.progress(subscription_name) => sample?,
            };
            samples += 1;

            if is_caught_up(&sample, options.strict) {
                tracing::info!(
                    "✓ Subscription '{}' caught up at {} after {} sample(s)",
                    subscription_name,
                    sample.latest_end,
                    samples
                );
                return Ok(sample);
            }

            tracing::debug!(
                "Subscription '{}' behind: received={} latest_end={} pid={}",
                subscription_name,
                sample.received,
                sample.latest_end,
                sample.pid
            );
            last = sample;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(interrupted(subscription_name, WaitInterrupt::Cancelled, last));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(interrupted(subscription_name, WaitInterrupt::DeadlineElapsed, last));
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

/// Far enough ahead to never fire in practice
const UNBOUNDED_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Instant `timeout` from now; a timeout too large to represent waits unbounded
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + UNBOUNDED_WAIT)
}

fn interrupted(
    subscription_name: &str,
    reason: WaitInterrupt,
    last: SubscriptionProgress,
) -> anyhow::Error {
    tracing::warn!(
        "⚠ Subscription '{}' not caught up ({}): received={} latest_end={} pid={}",
        subscription_name,
        reason,
        last.received,
        last.latest_end,
        last.pid
    );
    ReplicationError::CatchUpTimeout {
        subscription: subscription_name.to_string(),
        reason,
        last,
    }
    .into()
}
