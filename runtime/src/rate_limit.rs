// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Minimum-spacing limiter for calls to rate-limited services.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Lets one caller through per `interval`, process-wide for the instance.
///
/// Callers reserve the next free slot under the lock and sleep outside it,
/// so waiting callers queue up in order.
#[derive(Debug)]
pub struct MinIntervalLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl MinIntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller's slot arrives.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            debug!(wait_ms = (slot - Instant::now()).as_millis() as u64, "rate limiter waiting");
            sleep_until(slot).await;
        }
    }
}
