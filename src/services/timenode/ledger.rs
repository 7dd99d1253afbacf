// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::request::{AbortReason, TransactionRequest, aborted_topic, executed_topic};
use crate::network::transport::{LogInfo, ReceiptInfo};
use crate::services::timenode::stats::StatsSink;
use alloy::primitives::{Address, B256, U256};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    Executed { bounty: U256 },
    Aborted(AbortReason),
    Failed,
}

fn first_topic_is(log: &LogInfo, request: Address, topic: B256) -> bool {
    log.address == request && log.topics.first() == Some(&topic)
}

/// `Aborted(uint8)` reason from the receipt, if the request emitted one.
pub fn abort_reason(receipt: &ReceiptInfo, request: Address) -> Option<AbortReason> {
    receipt
        .logs
        .iter()
        .find(|l| first_topic_is(l, request, aborted_topic()))
        .and_then(|l| l.data.get(31).copied())
        .map(AbortReason::from)
}

/// Bounty paid by the `Executed` event, if the request emitted one.
pub fn executed_bounty(receipt: &ReceiptInfo, request: Address) -> Option<U256> {
    receipt
        .logs
        .iter()
        .find(|l| first_topic_is(l, request, executed_topic()))
        .map(|l| match l.data.get(..32) {
            Some(word) => U256::from_be_slice(word),
            None => U256::ZERO,
        })
}

/// Turns receipts into stats entries.
pub struct Ledger {
    stats: Arc<dyn StatsSink>,
}

impl Ledger {
    pub fn new(stats: Arc<dyn StatsSink>) -> Self {
        Self { stats }
    }

    /// Records a mined claim. The deposit counts as spent while it is locked.
    pub fn account_claiming(
        &self,
        from: Address,
        request: &TransactionRequest,
        receipt: &ReceiptInfo,
    ) -> bool {
        let success = receipt.success;
        let mut cost = receipt.gas_cost();
        if success {
            cost = cost.saturating_add(request.required_deposit());
        }
        self.stats.claimed(from, request.address(), cost, success);
        success
    }

    pub fn account_failed_claim(&self, from: Address, request: &TransactionRequest) {
        self.stats.claimed(from, request.address(), U256::ZERO, false);
    }

    pub fn account_execution(
        &self,
        from: Address,
        request: &TransactionRequest,
        receipt: &ReceiptInfo,
    ) -> ExecutionResult {
        let address = request.address();
        let result = match (
            receipt.success,
            abort_reason(receipt, address),
            executed_bounty(receipt, address),
        ) {
            (true, Some(reason), _) => ExecutionResult::Aborted(reason),
            (true, None, Some(bounty)) => ExecutionResult::Executed { bounty },
            _ => ExecutionResult::Failed,
        };
        let (bounty, success) = match result {
            ExecutionResult::Executed { bounty } => (bounty, true),
            _ => (U256::ZERO, false),
        };
        self.stats
            .executed(from, address, receipt.gas_cost(), bounty, success);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::fixtures::request;
    use crate::services::timenode::stats::InMemoryStats;
    use alloy::primitives::Bytes;

    fn receipt(success: bool, logs: Vec<LogInfo>) -> ReceiptInfo {
        ReceiptInfo {
            hash: B256::ZERO,
            block_number: 1,
            block_hash: B256::ZERO,
            gas_used: 100,
            effective_gas_price: 2,
            success,
            logs,
        }
    }

    fn word(value: u64) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn execution_receipts_are_classified_by_event() {
        let stats = Arc::new(InMemoryStats::default());
        let ledger = Ledger::new(stats.clone());
        let me = Address::repeat_byte(0x01);
        let addr = Address::repeat_byte(0x0e);
        let req = request(addr, 1_000, 1_001);

        let mut data = word(777);
        data.extend(word(1));
        data.extend(word(50_000));
        let executed = LogInfo {
            address: addr,
            topics: vec![executed_topic()],
            data: Bytes::from(data),
        };
        assert_eq!(
            ledger.account_execution(me, &req, &receipt(true, vec![executed])),
            ExecutionResult::Executed {
                bounty: U256::from(777u64)
            }
        );

        let aborted = LogInfo {
            address: addr,
            topics: vec![aborted_topic()],
            data: Bytes::from(word(4)),
        };
        assert_eq!(
            ledger.account_execution(me, &req, &receipt(true, vec![aborted])),
            ExecutionResult::Aborted(AbortReason::ReservedForClaimer)
        );
        assert_eq!(
            ledger.account_execution(me, &req, &receipt(false, Vec::new())),
            ExecutionResult::Failed
        );
        assert_eq!(stats.totals(me), (U256::from(777u64), U256::from(600u64)));
    }

    #[test]
    fn successful_claim_cost_includes_deposit() {
        let stats = Arc::new(InMemoryStats::default());
        let ledger = Ledger::new(stats.clone());
        let me = Address::repeat_byte(0x01);
        let req = request(Address::repeat_byte(0x0f), 1_000, 800);

        assert!(ledger.account_claiming(me, &req, &receipt(true, Vec::new())));
        assert!(!ledger.account_claiming(me, &req, &receipt(false, Vec::new())));
        let (_, cost) = stats.totals(me);
        assert_eq!(cost, req.required_deposit() + U256::from(400u64));
        assert_eq!(stats.failed_claims(me), vec![req.address()]);
    }
}
