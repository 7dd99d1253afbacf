// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::domain::request::{Operation, claimed_topic, executed_topic};
use crate::infrastructure::chain::{PendingLog, PendingLogProvider};
use crate::network::txpool::{PendingTransactionSource, PoolEntry, TxPool};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(2);

/// Watches the pending block's Claimed/Executed logs.
pub struct LogSubscriptionSource {
    provider: Arc<dyn PendingLogProvider>,
}

impl LogSubscriptionSource {
    pub fn new(provider: Arc<dyn PendingLogProvider>) -> Self {
        Self { provider }
    }

    fn classify(log: &PendingLog) -> Operation {
        match log.topics.first() {
            Some(topic) if *topic == claimed_topic() => Operation::Claim,
            Some(topic) if *topic == executed_topic() => Operation::Execute,
            _ => Operation::Other,
        }
    }

    async fn ingest(&self, pool: &TxPool, log: PendingLog) {
        let operation = Self::classify(&log);
        if operation == Operation::Other {
            return;
        }
        match self.provider.transaction(log.tx_hash).await {
            Ok(Some(tx)) => {
                let to = tx.to.unwrap_or(log.address);
                pool.insert(log.tx_hash, PoolEntry::new(to, tx.gas_price, operation));
            }
            Ok(None) => {
                // Not yet visible through the provider; the log will not repeat.
                tracing::debug!(target: "txpool", tx_hash = %log.tx_hash, "Pending tx not found");
            }
            Err(e) => {
                tracing::debug!(target: "txpool", tx_hash = %log.tx_hash, error = %e, "Pending tx lookup failed");
            }
        }
    }
}

#[async_trait]
impl PendingTransactionSource for LogSubscriptionSource {
    fn name(&self) -> &'static str {
        "pending-logs"
    }

    async fn run(&self, pool: &TxPool, shutdown: &CancellationToken) -> Result<(), AppError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self
                .provider
                .subscribe_pending_logs(vec![claimed_topic(), executed_topic()])
                .await
            {
                Ok(mut logs) => {
                    tracing::info!(target: "txpool", "Subscribed to pending Claimed/Executed logs");
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => return Ok(()),
                            maybe_log = logs.recv() => match maybe_log {
                                Some(log) => self.ingest(pool, log).await,
                                None => break,
                            }
                        }
                    }
                    tracing::warn!(target: "txpool", "Pending log subscription ended, retrying after backoff");
                }
                Err(e) => {
                    tracing::warn!(target: "txpool", error = %e, "Pending log subscription failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(RESUBSCRIBE_BACKOFF) => {}
            }
        }
    }
}
