// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Pending claim/execute calls seen on the network, so the node does not race
//! a call that is already in flight.

use crate::common::error::AppError;
use crate::domain::request::Operation;
use crate::network::gas::GasPriceSource;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq)]
pub struct PoolEntry {
    pub to: Address,
    pub gas_price: U256,
    pub operation: Operation,
    pub timestamp: Instant,
}

impl PoolEntry {
    pub fn new(to: Address, gas_price: U256, operation: Operation) -> Self {
        Self {
            to,
            gas_price,
            operation,
            timestamp: Instant::now(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TxPoolConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    /// Percent below the network price a pending call may sit and still count.
    pub gas_price_spread_pct: u64,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5),
            gas_price_spread_pct: 30,
        }
    }
}

/// A backend that feeds observed pending calls into the pool.
#[async_trait]
pub trait PendingTransactionSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs until `shutdown` fires or the backend fails for good.
    async fn run(&self, pool: &TxPool, shutdown: &CancellationToken) -> Result<(), AppError>;
}

pub struct TxPool {
    entries: DashMap<B256, PoolEntry>,
    gas: Arc<dyn GasPriceSource>,
    config: TxPoolConfig,
}

impl TxPool {
    pub fn new(gas: Arc<dyn GasPriceSource>, config: TxPoolConfig) -> Self {
        Self {
            entries: DashMap::new(),
            gas,
            config,
        }
    }

    /// Entries are never mutated once observed; a repeated hash is ignored.
    pub fn insert(&self, hash: B256, entry: PoolEntry) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        tracing::debug!(
            target: "txpool",
            tx_hash = %hash,
            to = %entry.to,
            operation = %entry.operation,
            gas_price = %entry.gas_price,
            "Pending call observed"
        );
        self.entries.insert(hash, entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a call of `operation` against `address` is already pending at a
    /// price that will plausibly be mined. Without `min_gas_price` the bar is
    /// the network price minus the configured spread.
    pub async fn has_pending(
        &self,
        address: Address,
        operation: Operation,
        min_gas_price: Option<U256>,
    ) -> Result<bool, AppError> {
        let prices: Vec<U256> = self
            .entries
            .iter()
            .filter(|e| e.to == address && e.operation == operation)
            .map(|e| e.gas_price)
            .collect();
        if prices.is_empty() {
            return Ok(false);
        }

        let threshold = match min_gas_price {
            Some(min) => min,
            None => {
                let network = self.gas.network_gas_price().await?;
                let keep = 100u64.saturating_sub(self.config.gas_price_spread_pct.min(100));
                network * U256::from(keep) / U256::from(100u64)
            }
        };
        Ok(prices.iter().any(|p| *p >= threshold))
    }

    /// Drops entries older than the TTL as of `now`; returns how many went.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.timestamp) < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.sweep_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = pool.evict_expired(Instant::now());
                        if evicted > 0 {
                            tracing::debug!(target: "txpool", evicted, remaining = pool.len(), "Swept expired entries");
                        }
                    }
                }
            }
        })
    }

    pub fn spawn_source(
        self: &Arc<Self>,
        source: Arc<dyn PendingTransactionSource>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(target: "txpool", source = source.name(), "Pending transaction source started");
            if let Err(e) = source.run(&pool, &shutdown).await {
                tracing::error!(target: "txpool", source = source.name(), error = %e, "Pending transaction source stopped");
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::network::gas::{AdvancedGasPrice, GasTier};

    /// Gas source returning one flat price for every tier.
    pub struct FixedGas(pub U256);

    #[async_trait]
    impl GasPriceSource for FixedGas {
        async fn advanced_network_gas_price(&self) -> Result<AdvancedGasPrice, AppError> {
            let tier = GasTier {
                price: self.0,
                wait_minutes: 1.0,
            };
            Ok(AdvancedGasPrice {
                safe_low: tier,
                average: tier,
                fast: tier,
                fastest: tier,
            })
        }
    }
}
