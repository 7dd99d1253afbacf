// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::constants::{CLAIM_GAS_LIMIT, execution_gas_amount};
use crate::domain::request::{AbortReason, Operation, TransactionRequest};
use crate::infrastructure::chain::ChainAdapter;
use crate::network::txpool::TxPool;
use crate::services::timenode::ledger::{ExecutionResult, Ledger};
use crate::services::timenode::wallet::{SendOptions, SendOutcome, Wallet};
use alloy::primitives::{Address, U256};
use std::sync::Arc;

/// How a claim or execute attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Failed,
    Aborted(AbortReason),
    WalletBusy,
    InProgress,
    /// Someone else's call for the same request is already in the pool.
    Pending,
    MinedInUncle,
    /// The send never reached a verdict (RPC failure, dropped or unconfirmed
    /// broadcast, shutdown). Worth another try next cycle.
    Retry,
}

pub struct Actions {
    chain: Arc<dyn ChainAdapter>,
    wallet: Arc<Wallet>,
    ledger: Ledger,
    txpool: Option<Arc<TxPool>>,
}

impl Actions {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        wallet: Arc<Wallet>,
        ledger: Ledger,
        txpool: Option<Arc<TxPool>>,
    ) -> Self {
        Self {
            chain,
            wallet,
            ledger,
            txpool,
        }
    }

    async fn pending_in_pool(
        &self,
        request: &TransactionRequest,
        operation: Operation,
        min_gas_price: U256,
    ) -> bool {
        let Some(pool) = &self.txpool else {
            return false;
        };
        match pool
            .has_pending(request.address(), operation, Some(min_gas_price))
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::debug!(target: "router", address = %request.address(), error = %e, "Tx pool check failed");
                false
            }
        }
    }

    pub async fn claim(
        &self,
        request: &TransactionRequest,
        account: Address,
        gas_price: U256,
    ) -> ActionStatus {
        if self.pending_in_pool(request, Operation::Claim, gas_price).await {
            return ActionStatus::Pending;
        }
        let opts = SendOptions {
            to: request.address(),
            value: request.required_deposit(),
            gas_limit: CLAIM_GAS_LIMIT,
            gas_price,
            data: self.chain.claim_data(),
            operation: Operation::Claim,
        };
        match self.wallet.send_from_account(account, opts).await {
            Ok(SendOutcome::Mined { from, receipt }) => {
                if self.ledger.account_claiming(from, request, &receipt) {
                    tracing::info!(target: "router", address = %request.address(), account = %from, tx_hash = %receipt.hash, "Claimed");
                    ActionStatus::Success
                } else {
                    tracing::warn!(target: "router", address = %request.address(), account = %from, tx_hash = %receipt.hash, "Claim reverted");
                    ActionStatus::Failed
                }
            }
            Ok(SendOutcome::WalletBusy) => ActionStatus::WalletBusy,
            Ok(SendOutcome::InProgress) => ActionStatus::InProgress,
            Err(e) => self.send_failed(request, account, Operation::Claim, e),
        }
    }

    /// Executes from the claiming account when it is ours, otherwise from the
    /// next account in rotation.
    pub async fn execute(&self, request: &TransactionRequest, gas_price: U256) -> ActionStatus {
        if self
            .pending_in_pool(request, Operation::Execute, request.gas_price())
            .await
        {
            return ActionStatus::Pending;
        }
        let account = match request
            .claimed_by()
            .filter(|a| self.wallet.is_known_account(*a))
            .or_else(|| self.wallet.next_account())
        {
            Some(a) => a,
            None => return ActionStatus::Failed,
        };
        let opts = SendOptions {
            to: request.address(),
            value: U256::ZERO,
            gas_limit: execution_gas_amount(request.params().call_gas),
            gas_price,
            data: self.chain.execute_data(),
            operation: Operation::Execute,
        };
        match self.wallet.send_from_account(account, opts).await {
            Ok(SendOutcome::Mined { from, receipt }) => {
                match self.ledger.account_execution(from, request, &receipt) {
                    ExecutionResult::Executed { bounty } => {
                        tracing::info!(target: "router", address = %request.address(), account = %from, bounty = %bounty, "Executed");
                        ActionStatus::Success
                    }
                    ExecutionResult::Aborted(reason) => {
                        tracing::warn!(target: "router", address = %request.address(), reason = %reason, "Execution aborted");
                        ActionStatus::Aborted(reason)
                    }
                    ExecutionResult::Failed => ActionStatus::Failed,
                }
            }
            Ok(SendOutcome::WalletBusy) => ActionStatus::WalletBusy,
            Ok(SendOutcome::InProgress) => ActionStatus::InProgress,
            Err(e) => self.send_failed(request, account, Operation::Execute, e),
        }
    }

    fn send_failed(
        &self,
        request: &TransactionRequest,
        account: Address,
        operation: Operation,
        error: AppError,
    ) -> ActionStatus {
        if let AppError::MinedInUncle { hash, block } = &error {
            tracing::warn!(target: "router", address = %request.address(), tx_hash = %hash, block, "Mined in uncle; will resubmit");
            return ActionStatus::MinedInUncle;
        }
        if matches!(error, AppError::Connection(_) | AppError::Transaction { .. }) {
            tracing::warn!(
                target: "router",
                address = %request.address(),
                account = %account,
                operation = %operation,
                error = %error,
                "Send did not complete; retrying next cycle"
            );
            return ActionStatus::Retry;
        }
        tracing::error!(
            target: "router",
            address = %request.address(),
            account = %account,
            operation = %operation,
            error = %error,
            "Send failed"
        );
        if operation == Operation::Claim {
            self.ledger.account_failed_claim(account, request);
        }
        ActionStatus::Failed
    }
}
