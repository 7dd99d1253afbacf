// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::common::retry::{RetryPolicy, retry_async};
use crate::network::provider::HttpProvider;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogInfo {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub success: bool,
    pub logs: Vec<LogInfo>,
}

impl ReceiptInfo {
    /// Total wei paid for gas.
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

/// The slice of RPC the wallet needs to sign, broadcast and confirm sends.
#[async_trait]
pub trait AccountTransport: Send + Sync {
    async fn chain_id(&self) -> Result<u64, AppError>;
    /// Pending transaction count of `account`.
    async fn transaction_count(&self, account: Address) -> Result<u64, AppError>;
    async fn balance(&self, account: Address) -> Result<U256, AppError>;
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, AppError>;
    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, AppError>;
    async fn block_number(&self) -> Result<u64, AppError>;
    /// Canonical hash at `number`, `None` if the node does not know the block.
    async fn block_hash(&self, number: u64) -> Result<Option<B256>, AppError>;
}

#[async_trait]
impl AccountTransport for HttpProvider {
    async fn chain_id(&self) -> Result<u64, AppError> {
        self.get_chain_id()
            .await
            .map_err(|e| AppError::Connection(format!("chain_id failed: {e}")))
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, AppError> {
        let provider = self.clone();
        retry_async(RetryPolicy::RPC_READ, "transaction_count", move |_| {
            let provider = provider.clone();
            async move { provider.get_transaction_count(account).pending().await }
        })
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch nonce: {}", e)))
    }

    async fn balance(&self, account: Address) -> Result<U256, AppError> {
        let provider = self.clone();
        retry_async(RetryPolicy::RPC_READ, "balance", move |_| {
            let provider = provider.clone();
            async move { provider.get_balance(account).await }
        })
        .await
        .map_err(|e| AppError::Connection(format!("Balance check failed: {}", e)))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, AppError> {
        let pending = Provider::send_raw_transaction(self, raw)
            .await
            .map_err(|e| AppError::Connection(format!("Raw tx send failed: {}", e)))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, AppError> {
        let receipt = self
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| AppError::Connection(format!("Receipt lookup failed: {}", e)))?;
        let Some(rcpt) = receipt else {
            return Ok(None);
        };
        // Receipts for transactions still in the pending block carry no block yet.
        let (Some(block_number), Some(block_hash)) = (rcpt.block_number, rcpt.block_hash) else {
            return Ok(None);
        };
        let logs = rcpt
            .inner
            .logs()
            .iter()
            .map(|log| LogInfo {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
            })
            .collect();
        Ok(Some(ReceiptInfo {
            hash,
            block_number,
            block_hash,
            gas_used: rcpt.gas_used as u64,
            effective_gas_price: rcpt.effective_gas_price as u128,
            success: rcpt.status(),
            logs,
        }))
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        self.get_block_number()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to fetch block number: {}", e)))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>, AppError> {
        let block = self
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| AppError::Connection(format!("Block {number} fetch failed: {}", e)))?;
        Ok(block.map(|b| b.header.hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_cost_multiplies_used_by_price() {
        let receipt = ReceiptInfo {
            hash: B256::ZERO,
            block_number: 1,
            block_hash: B256::ZERO,
            gas_used: 21_000,
            effective_gas_price: 2_000_000_000,
            success: true,
            logs: Vec::new(),
        };
        assert_eq!(receipt.gas_cost(), U256::from(42_000_000_000_000u64));
    }
}
