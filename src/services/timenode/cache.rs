// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::domain::constants::execution_gas_amount;
use crate::domain::request::{RequestParams, TemporalUnit};
use crate::services::timenode::router::RequestStatus;
use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Tracking state of one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedRecord {
    pub bounty: U256,
    pub temporal_unit: TemporalUnit,
    pub claimed_by: Option<Address>,
    pub was_called: bool,
    pub window_start: u64,
    pub claim_window_start: u64,
    pub status: RequestStatus,
    pub gas_price: U256,
    pub call_gas: u64,
}

impl CachedRecord {
    /// Fresh entry for a request the scanner has just observed.
    pub fn discovered(params: &RequestParams) -> Self {
        Self {
            bounty: params.bounty,
            temporal_unit: params.temporal_unit,
            claimed_by: None,
            was_called: false,
            window_start: params.window_start,
            claim_window_start: params.claim_window_start(),
            status: RequestStatus::BeforeClaimWindow,
            gas_price: params.gas_price,
            call_gas: params.call_gas,
        }
    }

    /// Gas the execute call is sent with.
    pub fn execution_gas_amount(&self) -> U256 {
        U256::from(execution_gas_amount(self.call_gas))
    }
}

#[derive(Default)]
pub struct Cache {
    records: RwLock<BTreeMap<Address, CachedRecord>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Address, CachedRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Address, CachedRecord>> {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: Address, value: CachedRecord) {
        self.write().insert(key, value);
    }

    /// Inserts only if `key` is not tracked yet.
    pub fn set_if_absent(&self, key: Address, value: CachedRecord) -> bool {
        let mut guard = self.write();
        if guard.contains_key(&key) {
            return false;
        }
        guard.insert(key, value);
        true
    }

    pub fn get(&self, key: &Address) -> Result<CachedRecord, AppError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{key:#x}")))
    }

    pub fn get_or(&self, key: &Address, fallback: CachedRecord) -> CachedRecord {
        self.read().get(key).cloned().unwrap_or(fallback)
    }

    pub fn has(&self, key: &Address) -> bool {
        self.read().contains_key(key)
    }

    pub fn del(&self, key: &Address) -> Option<CachedRecord> {
        self.write().remove(key)
    }

    /// Mutates an entry in place.
    pub fn update<F>(&self, key: &Address, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut CachedRecord),
    {
        let mut guard = self.write();
        let record = guard
            .get_mut(key)
            .ok_or_else(|| AppError::NotFound(format!("{key:#x}")))?;
        f(record);
        Ok(())
    }

    pub fn stored(&self) -> Vec<Address> {
        self.read().keys().copied().collect()
    }

    pub fn snapshot(&self) -> Vec<(Address, CachedRecord)> {
        self.read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
