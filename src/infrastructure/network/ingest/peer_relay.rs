// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::common::seen_cache::SeenSet;
use crate::domain::request::Operation;
use crate::infrastructure::chain::RawTransactionFeed;
use crate::network::txpool::{PendingTransactionSource, PoolEntry, TxPool};
use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
const SEEN_MAX: usize = 4;
#[cfg(not(test))]
const SEEN_MAX: usize = 50_000;

/// Decodes transactions relayed by gossip peers, for endpoints that expose no
/// pending feed of their own.
pub struct PeerRelaySource {
    feed: Arc<dyn RawTransactionFeed>,
    seen: SeenSet<B256>,
}

impl PeerRelaySource {
    pub fn new(feed: Arc<dyn RawTransactionFeed>) -> Self {
        Self {
            feed,
            seen: SeenSet::new(SEEN_MAX),
        }
    }

    /// Hash and pool entry for a raw claim/execute call, `None` for anything
    /// else (undecodable, contract creation, unrelated selector).
    pub fn decode_relayed(raw: &[u8]) -> Option<(B256, PoolEntry)> {
        let mut buf = raw;
        let envelope = TxEnvelope::decode_2718(&mut buf).ok()?;
        let to = envelope.to()?;
        let operation = Operation::from_call_data(envelope.input());
        if operation == Operation::Other {
            return None;
        }
        let gas_price = envelope
            .gas_price()
            .unwrap_or_else(|| envelope.max_fee_per_gas());
        Some((
            *envelope.tx_hash(),
            PoolEntry::new(to, U256::from(gas_price), operation),
        ))
    }
}

#[async_trait]
impl PendingTransactionSource for PeerRelaySource {
    fn name(&self) -> &'static str {
        "peer-relay"
    }

    async fn run(&self, pool: &TxPool, shutdown: &CancellationToken) -> Result<(), AppError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            match self.feed.subscribe_raw_transactions().await {
                Ok(mut relayed) => loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        maybe_raw = relayed.recv() => {
                            let Some(raw) = maybe_raw else { break };
                            if let Some((hash, entry)) = Self::decode_relayed(&raw)
                                && self.seen.remember(hash).await
                            {
                                pool.insert(hash, entry);
                            }
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(target: "txpool", error = %e, "Peer relay subscription failed");
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(Duration::from_secs(2)) => {}
            }
        }
    }
}
