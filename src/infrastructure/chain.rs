// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Capabilities the TimeNode needs from the chain. Contract bindings and the
//! RPC transport behind them live outside this crate.

use crate::domain::constants::{BLOCK_BUCKET_SIZE, TIMESTAMP_BUCKET_SIZE};
use crate::domain::error::AppError;
use crate::domain::request::{
    RequestData, RequestParams, TemporalUnit, TransactionRequest, cancel_call_data,
    claim_call_data, execute_call_data,
};
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

pub type BucketId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKind {
    Block,
    Timestamp,
}

impl BucketKind {
    pub fn width(self) -> u64 {
        match self {
            BucketKind::Block => BLOCK_BUCKET_SIZE,
            BucketKind::Timestamp => TIMESTAMP_BUCKET_SIZE,
        }
    }
}

/// Bucket a block number or timestamp falls into. Block buckets are negated,
/// which still leaves bucket 0 shared by both kinds.
pub fn calc_bucket(value: u64, kind: BucketKind) -> BucketId {
    let width = kind.width();
    let start = i64::try_from(value - value % width).unwrap_or(i64::MAX);
    match kind {
        BucketKind::Block => -start,
        BucketKind::Timestamp => start,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Number(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
    pub hash: B256,
}

/// A request announced by an active bucket watch. The address is forwarded
/// exactly as decoded from the log so discovery can validate it.
#[derive(Clone, Debug)]
pub struct BucketEvent {
    pub address: String,
    pub params: RequestParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn get_block(&self, block: BlockRef) -> Result<BlockInfo, AppError>;

    fn calc_bucket(&self, value: u64, kind: BucketKind) -> BucketId {
        calc_bucket(value, kind)
    }

    /// Start forwarding requests scheduled in `bucket` to `sink`.
    async fn watch_requests_by_bucket(
        &self,
        bucket: BucketId,
        sink: mpsc::UnboundedSender<BucketEvent>,
    ) -> Result<WatchHandle, AppError>;

    async fn stop_watch(&self, handle: WatchHandle) -> Result<(), AppError>;

    /// Fresh on-chain state for a request.
    async fn request(&self, address: Address) -> Result<RequestData, AppError>;

    async fn now(&self, unit: TemporalUnit) -> Result<u64, AppError> {
        let block = self.get_block(BlockRef::Latest).await?;
        Ok(match unit {
            TemporalUnit::Block => block.number,
            TemporalUnit::Timestamp => block.timestamp,
        })
    }

    async fn transaction_request(&self, address: Address) -> Result<TransactionRequest, AppError> {
        let data = self.request(address).await?;
        let now = self.now(data.params.temporal_unit).await?;
        Ok(TransactionRequest::new(data, now))
    }

    fn claim_data(&self) -> Bytes {
        Bytes::from(claim_call_data())
    }

    fn execute_data(&self) -> Bytes {
        Bytes::from(execute_call_data())
    }

    fn cancel_data(&self) -> Bytes {
        Bytes::from(cancel_call_data())
    }

    /// Disconnect notifications for streaming transports. `None` for transports
    /// that never drop.
    fn disconnects(&self) -> Option<broadcast::Receiver<()>> {
        None
    }

    async fn reconnect(&self, url: &str) -> Result<(), AppError> {
        let _ = url;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingLog {
    pub tx_hash: B256,
    pub address: Address,
    pub topics: Vec<B256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTxDetails {
    pub to: Option<Address>,
    pub gas_price: U256,
}

/// Pending-log stream of a node that exposes one (e.g. `eth_subscribe("logs")`
/// against the pending block).
#[async_trait]
pub trait PendingLogProvider: Send + Sync {
    async fn subscribe_pending_logs(
        &self,
        topics: Vec<B256>,
    ) -> Result<mpsc::Receiver<PendingLog>, AppError>;

    async fn transaction(&self, hash: B256) -> Result<Option<PendingTxDetails>, AppError>;
}

/// Raw EIP-2718 transactions relayed by peers on the gossip network.
#[async_trait]
pub trait RawTransactionFeed: Send + Sync {
    async fn subscribe_raw_transactions(&self) -> Result<mpsc::Receiver<Bytes>, AppError>;
}
