// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::request::Operation;
use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Error,
    Pending,
    Sent,
    Confirmed,
}

/// Result of trying to reserve a send slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    /// The account already has a send outstanding.
    Busy,
    /// Some account is already sending this call.
    InProgress,
}

type SendKey = (Address, Operation);

/// Per-account status of sends, keyed by counterparty and operation. An account
/// with any `Pending` entry is busy.
#[derive(Default)]
pub struct AccountState {
    accounts: DashMap<Address, HashMap<SendKey, TxStatus>>,
    reserve_lock: Mutex<()>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, account: Address, to: Address, operation: Operation, status: TxStatus) {
        self.accounts
            .entry(account)
            .or_default()
            .insert((to, operation), status);
    }

    pub fn status(&self, account: Address, to: Address, operation: Operation) -> Option<TxStatus> {
        self.accounts
            .get(&account)
            .and_then(|m| m.get(&(to, operation)).copied())
    }

    pub fn has_pending(&self, account: Address) -> bool {
        self.accounts
            .get(&account)
            .is_some_and(|m| m.values().any(|s| *s == TxStatus::Pending))
    }

    /// Whether any account has `(to, operation)` outstanding.
    pub fn is_pending(&self, to: Address, operation: Operation) -> bool {
        self.accounts.iter().any(|entry| {
            entry.value().get(&(to, operation)).copied() == Some(TxStatus::Pending)
        })
    }

    /// Checks both guards and marks the send `Pending` in one step, so two
    /// concurrent callers cannot both pass.
    pub fn try_reserve(&self, account: Address, to: Address, operation: Operation) -> Reservation {
        let _guard = self
            .reserve_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.has_pending(account) {
            return Reservation::Busy;
        }
        if self.is_pending(to, operation) {
            return Reservation::InProgress;
        }
        self.set(account, to, operation, TxStatus::Pending);
        Reservation::Reserved
    }
}
