// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Scheduled request model: the data the scheduler contract stores for a
//! request and the window arithmetic derived from it.

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

sol! {
    interface ITransactionRequest {
        function claim() external payable;
        function execute() external returns (bool);
        function cancel() external;

        event Claimed();
        event Executed(uint256 bounty, uint256 fee, uint256 measuredGasConsumption);
        event Aborted(uint8 reason);
        event Cancelled(uint256 rewardPayment, uint256 measuredGasConsumption);
    }
}

pub fn claim_selector() -> [u8; 4] {
    ITransactionRequest::claimCall::SELECTOR
}

pub fn execute_selector() -> [u8; 4] {
    ITransactionRequest::executeCall::SELECTOR
}

pub fn claimed_topic() -> B256 {
    ITransactionRequest::Claimed::SIGNATURE_HASH
}

pub fn executed_topic() -> B256 {
    ITransactionRequest::Executed::SIGNATURE_HASH
}

pub fn aborted_topic() -> B256 {
    ITransactionRequest::Aborted::SIGNATURE_HASH
}

pub fn claim_call_data() -> Vec<u8> {
    ITransactionRequest::claimCall {}.abi_encode()
}

pub fn execute_call_data() -> Vec<u8> {
    ITransactionRequest::executeCall {}.abi_encode()
}

pub fn cancel_call_data() -> Vec<u8> {
    ITransactionRequest::cancelCall {}.abi_encode()
}

/// Unit a request's windows are denominated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalUnit {
    Block,
    Timestamp,
}

impl fmt::Display for TemporalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalUnit::Block => f.write_str("block"),
            TemporalUnit::Timestamp => f.write_str("timestamp"),
        }
    }
}

/// Which call a send or a pending transaction represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Claim,
    Execute,
    Cancel,
    Other,
}

impl Operation {
    /// Classify call data by its 4-byte selector.
    pub fn from_call_data(input: &[u8]) -> Self {
        match input.get(..4) {
            Some(sel) if sel == claim_selector() => Operation::Claim,
            Some(sel) if sel == execute_selector() => Operation::Execute,
            _ => Operation::Other,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Claim => f.write_str("claim"),
            Operation::Execute => f.write_str("execute"),
            Operation::Cancel => f.write_str("cancel"),
            Operation::Other => f.write_str("other"),
        }
    }
}

/// Reason code carried by the `Aborted(uint8)` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    WasCancelled,
    AlreadyCalled,
    OutsideCallWindow,
    ReservedForClaimer,
    InsufficientGas,
    TooLowGasPrice,
    Unknown(u8),
}

impl From<u8> for AbortReason {
    fn from(code: u8) -> Self {
        match code {
            0 => AbortReason::WasCancelled,
            1 => AbortReason::AlreadyCalled,
            2 | 3 => AbortReason::OutsideCallWindow,
            4 => AbortReason::ReservedForClaimer,
            5 => AbortReason::InsufficientGas,
            6 => AbortReason::TooLowGasPrice,
            other => AbortReason::Unknown(other),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::WasCancelled => f.write_str("request was cancelled"),
            AbortReason::AlreadyCalled => f.write_str("request already called"),
            AbortReason::OutsideCallWindow => f.write_str("outside call window"),
            AbortReason::ReservedForClaimer => f.write_str("reserved for claimer"),
            AbortReason::InsufficientGas => f.write_str("insufficient gas"),
            AbortReason::TooLowGasPrice => f.write_str("gas price too low"),
            AbortReason::Unknown(code) => write!(f, "unknown reason {code}"),
        }
    }
}

/// Window parameters of a request as emitted at creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestParams {
    pub temporal_unit: TemporalUnit,
    pub window_start: u64,
    pub window_size: u64,
    pub freeze_period: u64,
    pub claim_window_size: u64,
    pub reserved_window_size: u64,
    pub bounty: U256,
    pub fee: U256,
    pub gas_price: U256,
    pub call_gas: u64,
    pub required_deposit: U256,
}

impl RequestParams {
    pub fn claim_window_start(&self) -> u64 {
        self.window_start
            .saturating_sub(self.freeze_period)
            .saturating_sub(self.claim_window_size)
    }

    pub fn claim_window_end(&self) -> u64 {
        self.window_start.saturating_sub(self.freeze_period)
    }

    pub fn execution_window_end(&self) -> u64 {
        self.window_start.saturating_add(self.window_size)
    }

    pub fn reserved_window_end(&self) -> u64 {
        self.window_start.saturating_add(self.reserved_window_size)
    }
}

/// Full on-chain state of a request, as refreshed through the chain adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestData {
    pub address: Address,
    pub params: RequestParams,
    pub claimed_by: Option<Address>,
    /// Payment modifier locked in when the request was claimed.
    pub claim_payment_modifier: Option<u8>,
    pub is_cancelled: bool,
    pub was_called: bool,
}

/// A request together with the chain's current reading of its temporal unit.
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    pub data: RequestData,
    pub now: u64,
}

impl TransactionRequest {
    pub fn new(data: RequestData, now: u64) -> Self {
        Self { data, now }
    }

    pub fn address(&self) -> Address {
        self.data.address
    }

    pub fn params(&self) -> &RequestParams {
        &self.data.params
    }

    pub fn temporal_unit(&self) -> TemporalUnit {
        self.data.params.temporal_unit
    }

    pub fn bounty(&self) -> U256 {
        self.data.params.bounty
    }

    pub fn gas_price(&self) -> U256 {
        self.data.params.gas_price
    }

    pub fn required_deposit(&self) -> U256 {
        self.data.params.required_deposit
    }

    pub fn window_start(&self) -> u64 {
        self.data.params.window_start
    }

    pub fn claim_window_start(&self) -> u64 {
        self.data.params.claim_window_start()
    }

    pub fn claim_window_end(&self) -> u64 {
        self.data.params.claim_window_end()
    }

    pub fn execution_window_end(&self) -> u64 {
        self.data.params.execution_window_end()
    }

    pub fn reserved_window_end(&self) -> u64 {
        self.data.params.reserved_window_end()
    }

    pub fn is_cancelled(&self) -> bool {
        self.data.is_cancelled
    }

    pub fn was_called(&self) -> bool {
        self.data.was_called
    }

    pub fn claimed_by(&self) -> Option<Address> {
        self.data.claimed_by.filter(|a| !a.is_zero())
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by().is_some()
    }

    pub fn is_claimed_by(&self, account: Address) -> bool {
        self.claimed_by() == Some(account)
    }

    pub fn before_claim_window(&self) -> bool {
        self.now < self.claim_window_start()
    }

    pub fn in_claim_window(&self) -> bool {
        self.claim_window_start() <= self.now && self.now < self.claim_window_end()
    }

    pub fn in_freeze_period(&self) -> bool {
        self.claim_window_end() <= self.now && self.now < self.window_start()
    }

    pub fn in_execution_window(&self) -> bool {
        self.window_start() <= self.now && self.now <= self.execution_window_end()
    }

    pub fn in_reserved_window(&self) -> bool {
        self.window_start() <= self.now && self.now < self.reserved_window_end()
    }

    pub fn after_execution_window(&self) -> bool {
        self.now > self.execution_window_end()
    }

    /// Remaining length of the claim window, zero once it closed.
    pub fn remaining_claim_window(&self) -> u64 {
        self.claim_window_end().saturating_sub(self.now)
    }

    /// Payment modifier a claim submitted now would lock in (0..=100).
    pub fn claim_payment_modifier(&self) -> u64 {
        let size = self.data.params.claim_window_size;
        if size == 0 {
            return 100;
        }
        let elapsed = self.now.saturating_sub(self.claim_window_start());
        (elapsed.saturating_mul(100) / size).min(100)
    }

    /// Payment modifier applied to the bounty at execution time.
    pub fn execution_payment_modifier(&self) -> u64 {
        match (self.is_claimed(), self.data.claim_payment_modifier) {
            (true, Some(modifier)) => u64::from(modifier).min(100),
            _ => 100,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn params(window_start: u64) -> RequestParams {
        RequestParams {
            temporal_unit: TemporalUnit::Block,
            window_start,
            window_size: 255,
            freeze_period: 10,
            claim_window_size: 255,
            reserved_window_size: 16,
            bounty: U256::from(10_000_000_000_000_000u64),
            fee: U256::ZERO,
            gas_price: U256::from(1_000_000_000u64),
            call_gas: 100_000,
            required_deposit: U256::from(1_000_000_000_000_000u64),
        }
    }

    pub fn request(address: Address, window_start: u64, now: u64) -> TransactionRequest {
        TransactionRequest::new(
            RequestData {
                address,
                params: params(window_start),
                claimed_by: None,
                claim_payment_modifier: None,
                is_cancelled: false,
                was_called: false,
            },
            now,
        )
    }
}
