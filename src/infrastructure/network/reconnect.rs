// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Bounded reconnect policy for streaming (WebSocket) transports.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub urls: Vec<String>,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub debounce: Duration,
}

/// Drives one reconnect episode after another. The attempt counter survives
/// between episodes until a connect succeeds.
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempt: u32,
    next_url: usize,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            next_url: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Retry `connect` against the rotating URL list until it succeeds, the
    /// attempt budget runs out, or shutdown is requested. Returns the URL that
    /// connected.
    pub async fn reconnect<F, Fut>(
        &mut self,
        mut connect: F,
        shutdown: &CancellationToken,
    ) -> Result<String, AppError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        if self.policy.urls.is_empty() {
            return Err(AppError::Config("No reconnect URLs configured".into()));
        }

        loop {
            if self.attempt >= self.policy.max_attempts {
                return Err(AppError::Connection(format!(
                    "Reconnect gave up after {} attempts",
                    self.attempt
                )));
            }
            self.attempt += 1;

            let wait = self.policy.backoff_unit.saturating_mul(self.attempt);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Err(AppError::Connection("Shutdown during reconnect".into()));
                }
                _ = sleep(wait) => {}
            }

            let url = self.policy.urls[self.next_url % self.policy.urls.len()].clone();
            self.next_url = self.next_url.wrapping_add(1);
            tracing::info!(target: "reconnect", attempt = self.attempt, url = %url, "Reconnecting");

            match connect(url.clone()).await {
                Ok(()) => {
                    tracing::info!(target: "reconnect", url = %url, "Reconnected");
                    self.attempt = 0;
                    // Re-arm after a short pause so a flapping endpoint cannot storm us.
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = sleep(self.policy.debounce) => {}
                    }
                    return Ok(url);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "reconnect",
                        attempt = self.attempt,
                        max = self.policy.max_attempts,
                        url = %url,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            urls: vec!["ws://a".into(), "ws://b".into()],
            max_attempts,
            backoff_unit: Duration::from_millis(1),
            debounce: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn rotates_urls_and_resets_on_success() {
        let tried = Mutex::new(Vec::new());
        let mut reconnector = Reconnector::new(policy(5));
        let url = reconnector
            .reconnect(
                |url| {
                    let mut guard = tried.lock().unwrap();
                    guard.push(url.clone());
                    let ok = guard.len() == 3;
                    async move {
                        if ok {
                            Ok(())
                        } else {
                            Err(AppError::Connection("refused".into()))
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(url, "ws://a");
        assert_eq!(
            *tried.lock().unwrap(),
            vec!["ws://a".to_string(), "ws://b".into(), "ws://a".into()]
        );
        assert_eq!(reconnector.attempts(), 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Mutex::new(0u32);
        let mut reconnector = Reconnector::new(policy(3));
        let res = reconnector
            .reconnect(
                |_| {
                    *calls.lock().unwrap() += 1;
                    async { Err(AppError::Connection("refused".into())) }
                },
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(res, Err(AppError::Connection(_))));
        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
