// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, rendered by the metrics endpoint.
#[derive(Debug, Default)]
pub struct TimeNodeStats {
    pub discovered: AtomicU64,
    pub claims_succeeded: AtomicU64,
    pub claims_failed: AtomicU64,
    pub executions_succeeded: AtomicU64,
    pub executions_failed: AtomicU64,
    pub route_errors: AtomicU64,
    pub reconnects: AtomicU64,
    pub active_buckets: AtomicU64,
}

impl TimeNodeStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatAction {
    Discover,
    Claim,
    Execute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatEntry {
    pub address: Address,
    pub action: StatAction,
    pub cost: U256,
    pub bounty: U256,
    pub success: bool,
}

/// Outcome sink for discoveries, claims and executions, per operator account.
pub trait StatsSink: Send + Sync {
    fn discovered(&self, account: Address, address: Address);
    fn claimed(&self, account: Address, address: Address, cost: U256, success: bool);
    fn executed(&self, account: Address, address: Address, cost: U256, bounty: U256, success: bool);
    /// Requests `account` tried and failed to claim.
    fn failed_claims(&self, account: Address) -> Vec<Address>;
}

#[derive(Default)]
pub struct InMemoryStats {
    entries: DashMap<Address, Vec<StatEntry>>,
    counters: Arc<TimeNodeStats>,
}

impl InMemoryStats {
    pub fn new(counters: Arc<TimeNodeStats>) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
        }
    }

    pub fn counters(&self) -> &Arc<TimeNodeStats> {
        &self.counters
    }

    fn push(&self, account: Address, entry: StatEntry) {
        self.entries.entry(account).or_default().push(entry);
    }

    pub fn entries(&self, account: Address) -> Vec<StatEntry> {
        self.entries
            .get(&account)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// `(bounties earned, wei spent)` for `account`.
    pub fn totals(&self, account: Address) -> (U256, U256) {
        self.entries(account)
            .iter()
            .fold((U256::ZERO, U256::ZERO), |(bounty, cost), e| {
                (bounty.saturating_add(e.bounty), cost.saturating_add(e.cost))
            })
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}

impl StatsSink for InMemoryStats {
    fn discovered(&self, account: Address, address: Address) {
        self.push(
            account,
            StatEntry {
                address,
                action: StatAction::Discover,
                cost: U256::ZERO,
                bounty: U256::ZERO,
                success: true,
            },
        );
    }

    fn claimed(&self, account: Address, address: Address, cost: U256, success: bool) {
        TimeNodeStats::bump(if success {
            &self.counters.claims_succeeded
        } else {
            &self.counters.claims_failed
        });
        self.push(
            account,
            StatEntry {
                address,
                action: StatAction::Claim,
                cost,
                bounty: U256::ZERO,
                success,
            },
        );
    }

    fn executed(&self, account: Address, address: Address, cost: U256, bounty: U256, success: bool) {
        TimeNodeStats::bump(if success {
            &self.counters.executions_succeeded
        } else {
            &self.counters.executions_failed
        });
        self.push(
            account,
            StatEntry {
                address,
                action: StatAction::Execute,
                cost,
                bounty,
                success,
            },
        );
    }

    fn failed_claims(&self, account: Address) -> Vec<Address> {
        self.entries(account)
            .into_iter()
            .filter(|e| e.action == StatAction::Claim && !e.success)
            .map(|e| e.address)
            .collect()
    }
}
