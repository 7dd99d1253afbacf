// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::{RetryPolicy, retry_async};
use crate::domain::constants::get_block_time;
use crate::network::provider::HttpProvider;
use alloy::primitives::U256;
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use alloy::rpc::types::eth::FeeHistory;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One price tier of the market with the wait the market advertises for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GasTier {
    pub price: U256,
    pub wait_minutes: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdvancedGasPrice {
    pub safe_low: GasTier,
    pub average: GasTier,
    pub fast: GasTier,
    pub fastest: GasTier,
}

impl AdvancedGasPrice {
    /// Tiers from cheapest to most expensive.
    pub fn tiers(&self) -> [GasTier; 4] {
        [self.safe_low, self.average, self.fast, self.fastest]
    }
}

#[async_trait]
pub trait GasPriceSource: Send + Sync {
    /// Plain network price, equivalent to the average tier.
    async fn network_gas_price(&self) -> Result<U256, AppError> {
        Ok(self.advanced_network_gas_price().await?.average.price)
    }

    async fn advanced_network_gas_price(&self) -> Result<AdvancedGasPrice, AppError>;
}

// Blocks a transaction priced at each tier is expected to wait.
const SAFE_LOW_WAIT_BLOCKS: f64 = 20.0;
const AVERAGE_WAIT_BLOCKS: f64 = 6.0;
const FAST_WAIT_BLOCKS: f64 = 2.0;
const FASTEST_WAIT_BLOCKS: f64 = 1.0;

#[derive(Clone)]
pub struct GasOracle {
    provider: HttpProvider,
    chain_id: u64,
    station_url: Option<String>,
    client: reqwest::Client,
    last_good: Arc<Mutex<Option<AdvancedGasPrice>>>,
}

impl GasOracle {
    pub fn new(provider: HttpProvider, chain_id: u64, station_url: Option<String>) -> Self {
        Self {
            provider,
            chain_id,
            station_url,
            client: reqwest::Client::new(),
            last_good: Arc::new(Mutex::new(None)),
        }
    }

    async fn estimate(&self) -> Result<AdvancedGasPrice, AppError> {
        if let Some(url) = &self.station_url {
            match self.gas_station(url).await {
                Ok(prices) => return Ok(prices),
                Err(e) => {
                    tracing::debug!(target: "gas", error = %e, "Gas station unavailable; using fee history");
                }
            }
        }
        match self.with_retry_history().await {
            Ok(history) => Self::tiers_from_history(&history, get_block_time(self.chain_id)),
            Err(_) => self.fallback_estimate().await,
        }
    }

    async fn with_retry_history(&self) -> Result<FeeHistory, AppError> {
        let provider = self.provider.clone();
        retry_async(RetryPolicy::RPC_READ, "fee_history", move |_| {
            let provider = provider.clone();
            async move {
                provider
                    .get_fee_history(
                        10,
                        BlockNumberOrTag::Latest,
                        &[10.0f64, 50.0f64, 75.0f64, 95.0f64],
                    )
                    .await
            }
        })
        .await
        .map_err(|e| AppError::Connection(format!("Fee History failed: {}", e)))
    }

    pub(crate) fn tiers_from_history(
        history: &FeeHistory,
        block_time_secs: u64,
    ) -> Result<AdvancedGasPrice, AppError> {
        let latest_base_fee = history
            .latest_block_base_fee()
            .or_else(|| history.base_fee_per_gas.iter().rev().nth(1).copied())
            .ok_or(AppError::Initialization("No base fee history".into()))?;

        let raw_next_base = history.next_block_base_fee().unwrap_or(latest_base_fee);
        // Nodes that return zero get a 12.5% buffer over the latest base fee.
        let next_base_fee = if raw_next_base == 0 {
            (latest_base_fee.saturating_mul(1125)) / 1000
        } else {
            raw_next_base
        };

        let mut sums = [0u128; 4];
        let mut counts = [0u128; 4];
        if let Some(rewards) = &history.reward {
            for block_reward in rewards {
                for (idx, r) in block_reward.iter().take(4).enumerate() {
                    sums[idx] = sums[idx].saturating_add(*r);
                    counts[idx] = counts[idx].saturating_add(1);
                }
            }
        }
        let mut tips = [0u128; 4];
        let mut floor = 1_000_000_000u128;
        for idx in 0..4 {
            let avg = if counts[idx] > 0 {
                sums[idx] / counts[idx]
            } else {
                floor
            };
            // Higher percentiles never price below lower ones.
            tips[idx] = avg.max(if idx == 0 { 0 } else { tips[idx - 1] });
            floor = tips[idx];
        }

        let minutes = |blocks: f64| blocks * block_time_secs as f64 / 60.0;
        let tier = |tip: u128, blocks: f64| GasTier {
            price: U256::from(next_base_fee.saturating_add(tip)),
            wait_minutes: minutes(blocks),
        };
        Ok(AdvancedGasPrice {
            safe_low: tier(tips[0], SAFE_LOW_WAIT_BLOCKS),
            average: tier(tips[1], AVERAGE_WAIT_BLOCKS),
            fast: tier(tips[2], FAST_WAIT_BLOCKS),
            fastest: tier(tips[3], FASTEST_WAIT_BLOCKS),
        })
    }

    async fn fallback_estimate(&self) -> Result<AdvancedGasPrice, AppError> {
        // Fallback path for nodes that disable feeHistory (common on some public RPCs).
        let price: u128 = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| AppError::Connection(format!("Gas price fetch failed: {}", e)))?;
        let block_time = get_block_time(self.chain_id) as f64;
        let tier = |pct: u128, blocks: f64| GasTier {
            price: U256::from(price.saturating_mul(pct) / 100),
            wait_minutes: blocks * block_time / 60.0,
        };
        Ok(AdvancedGasPrice {
            safe_low: tier(90, SAFE_LOW_WAIT_BLOCKS),
            average: tier(100, AVERAGE_WAIT_BLOCKS),
            fast: tier(120, FAST_WAIT_BLOCKS),
            fastest: tier(150, FASTEST_WAIT_BLOCKS),
        })
    }

    async fn gas_station(&self, url: &str) -> Result<AdvancedGasPrice, AppError> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Gas station request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AppError::Connection(format!(
                "Gas station responded with {}",
                resp.status()
            )));
        }
        let parsed: GasStationResponse = resp.json().await.map_err(|e| {
            AppError::Initialization(format!("Gas station decode failed: {e}"))
        })?;
        Ok(parsed.into_prices())
    }
}

#[async_trait]
impl GasPriceSource for GasOracle {
    async fn advanced_network_gas_price(&self) -> Result<AdvancedGasPrice, AppError> {
        match self.estimate().await {
            Ok(prices) => {
                if let Ok(mut guard) = self.last_good.lock() {
                    *guard = Some(prices);
                }
                Ok(prices)
            }
            Err(e) => {
                if let Ok(guard) = self.last_good.lock()
                    && let Some(prices) = *guard
                {
                    tracing::warn!(target: "gas", error = %e, "Gas estimate failed; reusing last good prices");
                    return Ok(prices);
                }
                Err(e)
            }
        }
    }
}

/// Gas-station style payload: prices in tenths of gwei, waits in minutes.
#[derive(Debug, Deserialize)]
struct GasStationResponse {
    #[serde(rename = "safeLow")]
    safe_low: f64,
    average: f64,
    fast: f64,
    fastest: f64,
    #[serde(rename = "safeLowWait")]
    safe_low_wait: f64,
    #[serde(rename = "avgWait")]
    avg_wait: f64,
    #[serde(rename = "fastWait")]
    fast_wait: f64,
    #[serde(rename = "fastestWait")]
    fastest_wait: f64,
}

impl GasStationResponse {
    fn into_prices(self) -> AdvancedGasPrice {
        // 1 unit = 0.1 gwei = 1e8 wei
        let wei = |v: f64| U256::from((v.max(0.0) * 1e8_f64) as u128);
        AdvancedGasPrice {
            safe_low: GasTier {
                price: wei(self.safe_low),
                wait_minutes: self.safe_low_wait,
            },
            average: GasTier {
                price: wei(self.average),
                wait_minutes: self.avg_wait,
            },
            fast: GasTier {
                price: wei(self.fast),
                wait_minutes: self.fast_wait,
            },
            fastest: GasTier {
                price: wei(self.fastest),
                wait_minutes: self.fastest_wait,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_station_units_convert_to_wei() {
        let body = r#"{"safeLow":10,"average":20,"fast":40,"fastest":100,
            "safeLowWait":12.5,"avgWait":3.1,"fastWait":0.6,"fastestWait":0.5}"#;
        let parsed: GasStationResponse = serde_json::from_str(body).unwrap();
        let prices = parsed.into_prices();
        assert_eq!(prices.safe_low.price, U256::from(1_000_000_000u64));
        assert_eq!(prices.fastest.price, U256::from(10_000_000_000u64));
        assert_eq!(prices.average.wait_minutes, 3.1);
    }

    #[test]
    fn fee_history_tiers_are_monotonic() {
        let history = FeeHistory {
            oldest_block: 100,
            base_fee_per_gas: vec![10_000_000_000, 11_000_000_000],
            gas_used_ratio: vec![0.5],
            reward: Some(vec![vec![
                1_000_000_000,
                500_000_000,
                3_000_000_000,
                4_000_000_000,
            ]]),
            ..Default::default()
        };
        let prices = GasOracle::tiers_from_history(&history, 12).unwrap();
        let tiers = prices.tiers();
        for pair in tiers.windows(2) {
            assert!(pair[0].price <= pair[1].price);
            assert!(pair[0].wait_minutes >= pair[1].wait_minutes);
        }
        assert_eq!(prices.fastest.price, U256::from(15_000_000_000u64));
        assert_eq!(prices.fastest.wait_minutes, 0.2);
    }
}
