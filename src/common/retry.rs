// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Attempt budget and first backoff step for idempotent RPC reads.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub const RPC_READ: RetryPolicy = RetryPolicy {
        attempts: 3,
        initial_delay: Duration::from_millis(100),
    };
}

/// Retry an async operation with exponential backoff. `op` gets the 1-based
/// attempt number.
pub async fn retry_async<F, Fut, T, E>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.attempts => {
                tracing::debug!(target: "rpc", call = label, attempt, error = %e, ?delay, "Retrying");
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
