// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Operator accounts: round-robin selection, nonce tracking, single-flight
//! sends and confirmation polling.

pub mod account_state;

use crate::common::error::AppError;
use crate::domain::constants::CONFIRMATION_BLOCKS;
use crate::domain::request::Operation;
use crate::network::transport::{AccountTransport, ReceiptInfo};
use account_state::{AccountState, Reservation, TxStatus};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct Account {
    pub address: Address,
    signer: PrivateKeySigner,
}

impl Account {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SendOptions {
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub data: Bytes,
    pub operation: Operation,
}

#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// Included and buried under the confirmation depth. The receipt may
    /// still report a revert.
    Mined { from: Address, receipt: ReceiptInfo },
    WalletBusy,
    InProgress,
}

#[derive(Clone, Debug)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub confirmations: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            // ~30 minutes of polling
            max_polls: 360,
            confirmations: CONFIRMATION_BLOCKS,
        }
    }
}

pub struct Wallet {
    accounts: Vec<Account>,
    index: HashMap<Address, usize>,
    next: AtomicUsize,
    state: AccountState,
    last_nonce: DashMap<Address, u64>,
    transport: Arc<dyn AccountTransport>,
    chain_id: u64,
    policy: ConfirmationPolicy,
    shutdown: CancellationToken,
}

impl Wallet {
    pub fn new(
        signers: Vec<PrivateKeySigner>,
        transport: Arc<dyn AccountTransport>,
        chain_id: u64,
        policy: ConfirmationPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let accounts: Vec<Account> = signers.into_iter().map(Account::new).collect();
        let index = accounts
            .iter()
            .enumerate()
            .map(|(i, a)| (a.address, i))
            .collect();
        Self {
            accounts,
            index,
            next: AtomicUsize::new(0),
            state: AccountState::new(),
            last_nonce: DashMap::new(),
            transport,
            chain_id,
            policy,
            shutdown,
        }
    }

    pub fn from_private_keys(
        keys: &[String],
        transport: Arc<dyn AccountTransport>,
        chain_id: u64,
        policy: ConfirmationPolicy,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let signers = keys
            .iter()
            .map(|k| {
                PrivateKeySigner::from_str(k.trim())
                    .map_err(|e| AppError::Config(format!("Invalid wallet key: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if signers.is_empty() {
            return Err(AppError::Config("No wallet keys configured".into()));
        }
        Ok(Self::new(signers, transport, chain_id, policy, shutdown))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(|a| a.address).collect()
    }

    pub fn is_known_account(&self, address: Address) -> bool {
        self.index.contains_key(&address)
    }

    pub fn account_state(&self) -> &AccountState {
        &self.state
    }

    /// Advances the round-robin counter.
    pub fn next_account(&self) -> Option<Address> {
        if self.accounts.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.accounts.len();
        Some(self.accounts[i].address)
    }

    pub fn is_waiting_for_confirmation(&self, to: Address, operation: Operation) -> bool {
        self.state.is_pending(to, operation)
    }

    pub async fn balance_of(&self, account: Address) -> Result<U256, AppError> {
        self.transport.balance(account).await
    }

    pub async fn send_from_next(&self, opts: SendOptions) -> Result<SendOutcome, AppError> {
        let account = self
            .next_account()
            .ok_or_else(|| AppError::Initialization("Wallet has no accounts".into()))?;
        self.send_from_account(account, opts).await
    }

    pub async fn send_from_index(
        &self,
        index: usize,
        opts: SendOptions,
    ) -> Result<SendOutcome, AppError> {
        let account = self
            .accounts
            .get(index)
            .ok_or(AppError::IndexOutOfRange {
                index,
                len: self.accounts.len(),
            })?
            .address;
        self.send_from_account(account, opts).await
    }

    pub async fn send_from_account(
        &self,
        from: Address,
        opts: SendOptions,
    ) -> Result<SendOutcome, AppError> {
        let idx = *self
            .index
            .get(&from)
            .ok_or_else(|| AppError::NotFound(format!("account {from:#x}")))?;

        match self.state.try_reserve(from, opts.to, opts.operation) {
            Reservation::Reserved => {}
            Reservation::Busy => {
                tracing::debug!(target: "wallet", account = %from, "Account busy; skipping send");
                return Ok(SendOutcome::WalletBusy);
            }
            Reservation::InProgress => {
                tracing::debug!(target: "wallet", to = %opts.to, operation = %opts.operation, "Send already in progress");
                return Ok(SendOutcome::InProgress);
            }
        }

        let result = self.sign_and_confirm(&self.accounts[idx], &opts).await;
        let status = match &result {
            Ok(receipt) if receipt.success => TxStatus::Confirmed,
            Ok(_) => TxStatus::Sent,
            Err(_) => {
                self.resync_nonce(from);
                TxStatus::Error
            }
        };
        self.state.set(from, opts.to, opts.operation, status);

        let receipt = result?;
        Ok(SendOutcome::Mined { from, receipt })
    }

    async fn sign_and_confirm(
        &self,
        account: &Account,
        opts: &SendOptions,
    ) -> Result<ReceiptInfo, AppError> {
        let nonce = self.next_nonce(account.address).await?;
        let (raw, local_hash) = sign_legacy(&account.signer, self.chain_id, nonce, opts)?;
        let hash = self.transport.send_raw_transaction(&raw).await?;
        if hash != local_hash {
            tracing::warn!(target: "wallet", local = %local_hash, remote = %hash, "Node reported a different tx hash");
        }
        self.last_nonce.insert(account.address, nonce);
        tracing::info!(
            target: "wallet",
            account = %account.address,
            to = %opts.to,
            operation = %opts.operation,
            nonce,
            tx_hash = %hash,
            "Transaction broadcast"
        );
        self.await_confirmation(hash).await
    }

    /// On-chain pending count, never below the last nonce this process issued + 1.
    async fn next_nonce(&self, account: Address) -> Result<u64, AppError> {
        let on_chain = self.transport.transaction_count(account).await?;
        let floor = self
            .last_nonce
            .get(&account)
            .map(|n| n.saturating_add(1))
            .unwrap_or(0);
        Ok(on_chain.max(floor))
    }

    /// Drops the local floor so the next send starts from the chain's pending
    /// count. A broadcast that was uncled or dropped never used its nonce.
    fn resync_nonce(&self, account: Address) {
        if let Some((_, last)) = self.last_nonce.remove(&account) {
            tracing::debug!(target: "wallet", account = %account, last_nonce = last, "Nonce floor reset");
        }
    }

    async fn await_confirmation(&self, hash: B256) -> Result<ReceiptInfo, AppError> {
        let mut ticker = tokio::time::interval(self.policy.poll_interval);
        for _ in 0..self.policy.max_polls {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(AppError::Transaction {
                        hash: format!("{hash:#x}"),
                        reason: "shutdown before confirmation".into(),
                    });
                }
                _ = ticker.tick() => {}
            }

            let receipt = match self.transport.receipt(hash).await {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(target: "wallet", tx_hash = %hash, error = %e, "Receipt poll failed");
                    continue;
                }
            };
            let canonical = match self.transport.block_hash(receipt.block_number).await {
                Ok(h) => h,
                Err(e) => {
                    tracing::debug!(target: "wallet", tx_hash = %hash, error = %e, "Canonical hash lookup failed");
                    continue;
                }
            };
            if canonical != Some(receipt.block_hash) {
                return Err(AppError::MinedInUncle {
                    hash: format!("{hash:#x}"),
                    block: receipt.block_number,
                });
            }
            let head = match self.transport.block_number().await {
                Ok(h) => h,
                Err(_) => continue,
            };
            if head >= receipt.block_number.saturating_add(self.policy.confirmations) {
                return Ok(receipt);
            }
        }
        Err(AppError::Transaction {
            hash: format!("{hash:#x}"),
            reason: format!("not confirmed after {} polls", self.policy.max_polls),
        })
    }
}

/// Signs `opts` as a legacy (EIP-155) transaction. Returns raw bytes and hash.
pub fn sign_legacy(
    signer: &PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    opts: &SendOptions,
) -> Result<(Vec<u8>, B256), AppError> {
    let gas_price = u128::try_from(opts.gas_price).map_err(|_| AppError::Validation {
        field: "gas_price".into(),
        message: format!("{} does not fit u128", opts.gas_price),
    })?;
    let mut tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price,
        gas_limit: opts.gas_limit,
        to: TxKind::Call(opts.to),
        value: opts.value,
        input: opts.data.clone(),
    };
    let sig = TxSignerSync::sign_transaction_sync(signer, &mut tx)
        .map_err(|e| AppError::Strategy(format!("Sign failed: {}", e)))?;
    let signed: TxEnvelope = tx.into_signed(sig).into();
    Ok((signed.encoded_2718(), *signed.tx_hash()))
}
