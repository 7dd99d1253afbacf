// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::constants::{CLAIMING_GAS_ESTIMATE, execution_gas_amount};
use crate::domain::request::TransactionRequest;
use crate::network::gas::GasPriceSource;
use alloy::primitives::{I256, U256};
use std::sync::Arc;

pub(crate) fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// Gas the execute call of `request` is sent with.
pub fn request_gas_amount(request: &TransactionRequest) -> U256 {
    U256::from(execution_gas_amount(request.params().call_gas))
}

/// Bounty share a claim submitted now would earn.
pub fn claim_reward(request: &TransactionRequest) -> U256 {
    request
        .bounty()
        .saturating_mul(U256::from(request.claim_payment_modifier()))
        / U256::from(100u64)
}

/// Wei this node pays out of pocket when executing at `gas_price` while the
/// request only reimburses its own fixed price.
pub fn execution_subsidy(request: &TransactionRequest, gas_price: U256) -> U256 {
    gas_price
        .saturating_sub(request.gas_price())
        .saturating_mul(request_gas_amount(request))
}

pub struct ProfitabilityCalculator {
    gas: Arc<dyn GasPriceSource>,
}

impl ProfitabilityCalculator {
    pub fn new(gas: Arc<dyn GasPriceSource>) -> Self {
        Self { gas }
    }

    /// Expected gain of claiming at `claiming_gas_price`, net of the claim gas
    /// and of the subsidy execution would need at today's average price.
    pub async fn claiming_profitability(
        &self,
        request: &TransactionRequest,
        claiming_gas_price: U256,
    ) -> Result<I256, AppError> {
        let average = self.gas.network_gas_price().await?;
        let subsidy = execution_subsidy(request, average);
        let claim_cost = claiming_gas_price.saturating_mul(U256::from(CLAIMING_GAS_ESTIMATE));
        Ok(to_signed(claim_reward(request)) - to_signed(claim_cost) - to_signed(subsidy))
    }

    /// Expected gain of executing at `gas_price`. `claimer_is_ours` adds the
    /// claim deposit, refunded to the claimer on execution.
    pub fn execution_profitability(
        &self,
        request: &TransactionRequest,
        gas_price: U256,
        claimer_is_ours: bool,
    ) -> I256 {
        to_signed(Self::execution_reward(request, claimer_is_ours))
            - to_signed(execution_subsidy(request, gas_price))
    }

    /// Highest execution gas price at which profitability stays non-negative.
    pub fn execution_break_even_gas_price(
        &self,
        request: &TransactionRequest,
        claimer_is_ours: bool,
    ) -> U256 {
        let reward = Self::execution_reward(request, claimer_is_ours);
        let gas_amount = request_gas_amount(request);
        request.gas_price().saturating_add(reward / gas_amount)
    }

    fn execution_reward(request: &TransactionRequest, claimer_is_ours: bool) -> U256 {
        let bounty = request
            .bounty()
            .saturating_mul(U256::from(request.execution_payment_modifier()))
            / U256::from(100u64);
        if claimer_is_ours {
            bounty.saturating_add(request.required_deposit())
        } else {
            bounty
        }
    }
}
