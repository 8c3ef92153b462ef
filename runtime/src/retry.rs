// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retry with optional linear backoff, also used as a condition poll.

use std::future::Future;
use std::time::Duration;

/// How often and how patiently to retry an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Multiply the delay by the attempt number.
    pub backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: bool) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff,
        }
    }

    /// Fixed-interval polling until `timeout` has elapsed.
    pub fn poll(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms).max(1);
        Self {
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            base_delay: interval,
            backoff: false,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff {
            self.base_delay.saturating_mul(attempt)
        } else {
            self.base_delay
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_notify(policy, op, |_, _| {}).await
}

/// Like [`with_retry`], calling `on_retry(attempt, &err)` after every failed
/// attempt including the last one.
pub async fn with_retry_notify<T, E, F, Fut, N>(
    policy: RetryPolicy,
    mut op: F,
    mut on_retry: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(u32, &E),
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_retry(attempt, &err);
                if attempt >= attempts {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}
