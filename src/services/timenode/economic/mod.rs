// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod profitability;

use crate::common::error::AppError;
use crate::domain::request::{TemporalUnit, TransactionRequest};
use crate::network::gas::GasPriceSource;
use crate::services::timenode::cache::Cache;
use crate::services::timenode::wallet::Wallet;
use alloy::primitives::{Address, I256, U256};
use profitability::{ProfitabilityCalculator, to_signed};
use std::fmt;
use std::sync::Arc;

/// Operator limits, fixed for the life of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EconomicStrategy {
    pub max_deposit: U256,
    pub min_balance: U256,
    pub min_profitability: U256,
    /// Percent added to each projected execution cost in the balance check.
    pub max_gas_subsidy: u64,
    pub min_claim_window: Option<u64>,
    pub min_claim_window_block: Option<u64>,
    pub min_execution_window: Option<u64>,
    pub min_execution_window_block: Option<u64>,
    pub using_smart_gas_estimation: bool,
}

impl Default for EconomicStrategy {
    fn default() -> Self {
        Self {
            max_deposit: U256::MAX,
            min_balance: U256::ZERO,
            min_profitability: U256::ZERO,
            max_gas_subsidy: 100,
            min_claim_window: None,
            min_claim_window_block: None,
            min_execution_window: None,
            min_execution_window_block: None,
            using_smart_gas_estimation: false,
        }
    }
}

impl EconomicStrategy {
    fn min_claim_window_for(&self, unit: TemporalUnit) -> Option<u64> {
        match unit {
            TemporalUnit::Block => self.min_claim_window_block,
            TemporalUnit::Timestamp => self.min_claim_window,
        }
    }

    fn min_execution_window_for(&self, unit: TemporalUnit) -> Option<u64> {
        match unit {
            TemporalUnit::Block => self.min_execution_window_block,
            TemporalUnit::Timestamp => self.min_execution_window,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimDecision {
    NotProfitable,
    InsufficientBalance,
    DepositTooHigh,
    TooShortReserved,
    TooShortClaimWindow,
    Claim,
}

impl fmt::Display for ClaimDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimDecision::NotProfitable => "not profitable",
            ClaimDecision::InsufficientBalance => "insufficient balance",
            ClaimDecision::DepositTooHigh => "deposit too high",
            ClaimDecision::TooShortReserved => "reserved window too short",
            ClaimDecision::TooShortClaimWindow => "claim window too short",
            ClaimDecision::Claim => "claim",
        };
        f.write_str(s)
    }
}

pub struct EconomicStrategyManager {
    strategy: EconomicStrategy,
    calculator: ProfitabilityCalculator,
    gas: Arc<dyn GasPriceSource>,
    cache: Arc<Cache>,
    wallet: Arc<Wallet>,
    block_time_secs: u64,
}

impl EconomicStrategyManager {
    pub fn new(
        strategy: EconomicStrategy,
        gas: Arc<dyn GasPriceSource>,
        cache: Arc<Cache>,
        wallet: Arc<Wallet>,
        block_time_secs: u64,
    ) -> Self {
        Self {
            strategy,
            calculator: ProfitabilityCalculator::new(gas.clone()),
            gas,
            cache,
            wallet,
            block_time_secs: block_time_secs.max(1),
        }
    }

    pub fn strategy(&self) -> &EconomicStrategy {
        &self.strategy
    }

    pub fn calculator(&self) -> &ProfitabilityCalculator {
        &self.calculator
    }

    pub async fn should_claim_tx(
        &self,
        request: &TransactionRequest,
        account: Address,
        gas_price: U256,
    ) -> Result<ClaimDecision, AppError> {
        let profitability = self
            .calculator
            .claiming_profitability(request, gas_price)
            .await?;
        // A claim must earn something, even with no configured minimum.
        if profitability <= I256::ZERO
            || profitability < to_signed(self.strategy.min_profitability)
        {
            tracing::debug!(
                target: "economic",
                address = %request.address(),
                profitability = %profitability,
                "Claim not profitable"
            );
            return Ok(ClaimDecision::NotProfitable);
        }

        if !self.has_sufficient_balance(account).await? {
            return Ok(ClaimDecision::InsufficientBalance);
        }

        if request.required_deposit() > self.strategy.max_deposit {
            return Ok(ClaimDecision::DepositTooHigh);
        }

        let unit = request.temporal_unit();
        if let Some(min) = self.strategy.min_execution_window_for(unit)
            && request.params().reserved_window_size < min
        {
            return Ok(ClaimDecision::TooShortReserved);
        }
        if let Some(min) = self.strategy.min_claim_window_for(unit)
            && request.remaining_claim_window() < min
        {
            return Ok(ClaimDecision::TooShortClaimWindow);
        }

        Ok(ClaimDecision::Claim)
    }

    /// Balance must cover the floor plus the padded execution cost of every
    /// record the account claimed and has not executed yet.
    async fn has_sufficient_balance(&self, account: Address) -> Result<bool, AppError> {
        let balance = self.wallet.balance_of(account).await?;
        let pad = U256::from(100u64.saturating_add(self.strategy.max_gas_subsidy));
        let liabilities = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|(_, r)| r.claimed_by == Some(account) && !r.was_called)
            .fold(U256::ZERO, |acc, (_, r)| {
                acc.saturating_add(
                    r.execution_gas_amount().saturating_mul(r.gas_price).saturating_mul(pad)
                        / U256::from(100u64),
                )
            });
        let required = self.strategy.min_balance.saturating_add(liabilities);
        if balance <= required {
            tracing::debug!(
                target: "economic",
                account = %account,
                balance = %balance,
                required = %required,
                "Balance below claim requirement"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Gas price to execute `request` at. Never below the price the request
    /// reimburses.
    pub async fn get_execution_gas_price(
        &self,
        request: &TransactionRequest,
    ) -> Result<U256, AppError> {
        let price = if self.strategy.using_smart_gas_estimation {
            self.smart_gas_price(request).await?
        } else {
            self.gas.network_gas_price().await?
        };
        Ok(price.max(request.gas_price()))
    }

    async fn smart_gas_price(&self, request: &TransactionRequest) -> Result<U256, AppError> {
        let prices = self.gas.advanced_network_gas_price().await?;
        let deadline = if request.in_reserved_window() {
            request.reserved_window_end()
        } else {
            request.execution_window_end()
        };
        let remaining = deadline.saturating_sub(request.now) as f64;
        let unit = request.temporal_unit();
        let fits = prices.tiers().into_iter().find(|tier| {
            let wait_secs = tier.wait_minutes * 60.0;
            let wait = match unit {
                TemporalUnit::Timestamp => wait_secs,
                TemporalUnit::Block => wait_secs / self.block_time_secs as f64,
            };
            wait <= remaining
        });
        Ok(fits.map(|t| t.price).unwrap_or(prices.average.price))
    }

    pub fn execution_profitability(&self, request: &TransactionRequest, gas_price: U256) -> I256 {
        let ours = request
            .claimed_by()
            .is_some_and(|a| self.wallet.is_known_account(a));
        self.calculator
            .execution_profitability(request, gas_price, ours)
    }

    pub fn should_execute_tx(&self, request: &TransactionRequest, gas_price: U256) -> bool {
        self.execution_profitability(request, gas_price) >= I256::ZERO
    }
}
