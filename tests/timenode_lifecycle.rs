// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use timenode::domain::error::AppError;
use timenode::domain::request::{RequestData, RequestParams, TemporalUnit, executed_topic};
use timenode::infrastructure::chain::{
    BlockInfo, BlockRef, BucketEvent, BucketId, ChainAdapter, WatchHandle,
};
use timenode::network::gas::{AdvancedGasPrice, GasPriceSource, GasTier};
use timenode::network::transport::{AccountTransport, LogInfo, ReceiptInfo};
use timenode::services::timenode::economic::EconomicStrategy;
use timenode::services::timenode::wallet::{ConfirmationPolicy, Wallet};
use timenode::services::timenode::{TimeNode, TimeNodeConfig, TimeNodeParts};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const HEAD: u64 = 1_000;
const BOUNTY: u64 = 10_000_000_000_000_000;

/// Chain with a fixed head whose bucket watches can be fed by hand.
#[derive(Default)]
struct ScriptedChain {
    requests: Mutex<HashMap<Address, RequestData>>,
    sinks: Mutex<Vec<mpsc::UnboundedSender<BucketEvent>>>,
    started: Mutex<Vec<BucketId>>,
    stopped: Mutex<Vec<WatchHandle>>,
}

impl ScriptedChain {
    /// Fires the first active watch, as the bucket holding the request would.
    fn announce(&self, address: &str, params: RequestParams) {
        if let Some(sink) = self.sinks.lock().unwrap().first() {
            let _ = sink.send(BucketEvent {
                address: address.to_string(),
                params,
            });
        }
    }
}

#[async_trait]
impl ChainAdapter for ScriptedChain {
    async fn get_block(&self, _block: BlockRef) -> Result<BlockInfo, AppError> {
        Ok(BlockInfo {
            number: HEAD,
            timestamp: HEAD * 15,
            hash: B256::repeat_byte(0x01),
        })
    }

    async fn watch_requests_by_bucket(
        &self,
        bucket: BucketId,
        sink: mpsc::UnboundedSender<BucketEvent>,
    ) -> Result<WatchHandle, AppError> {
        let mut started = self.started.lock().unwrap();
        started.push(bucket);
        self.sinks.lock().unwrap().push(sink);
        Ok(WatchHandle(started.len() as u64))
    }

    async fn stop_watch(&self, handle: WatchHandle) -> Result<(), AppError> {
        self.stopped.lock().unwrap().push(handle);
        Ok(())
    }

    async fn request(&self, address: Address) -> Result<RequestData, AppError> {
        self.requests
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{address:#x}")))
    }
}

/// Mines every broadcast at block 100 and emits `Executed` from its target.
#[derive(Default)]
struct InstantTransport {
    sent: Mutex<Vec<(B256, Address)>>,
}

#[async_trait]
impl AccountTransport for InstantTransport {
    async fn chain_id(&self) -> Result<u64, AppError> {
        Ok(1)
    }

    async fn transaction_count(&self, _account: Address) -> Result<u64, AppError> {
        Ok(self.sent.lock().unwrap().len() as u64)
    }

    async fn balance(&self, _account: Address) -> Result<U256, AppError> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, AppError> {
        let mut buf = raw;
        let envelope = TxEnvelope::decode_2718(&mut buf).map_err(|e| AppError::Validation {
            field: "raw".into(),
            message: e.to_string(),
        })?;
        let hash = *envelope.tx_hash();
        self.sent
            .lock()
            .unwrap()
            .push((hash, envelope.to().unwrap_or_default()));
        Ok(hash)
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, AppError> {
        let to = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .find(|(h, _)| *h == hash)
            .map(|(_, to)| *to);
        Ok(to.map(|to| ReceiptInfo {
            hash,
            block_number: 100,
            block_hash: B256::repeat_byte(0xbb),
            gas_used: 60_000,
            effective_gas_price: 1_000_000_000,
            success: true,
            logs: vec![LogInfo {
                address: to,
                topics: vec![executed_topic()],
                data: Bytes::from(U256::from(BOUNTY).to_be_bytes::<32>().to_vec()),
            }],
        }))
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        Ok(200)
    }

    async fn block_hash(&self, _number: u64) -> Result<Option<B256>, AppError> {
        Ok(Some(B256::repeat_byte(0xbb)))
    }
}

struct FlatGas;

#[async_trait]
impl GasPriceSource for FlatGas {
    async fn advanced_network_gas_price(&self) -> Result<AdvancedGasPrice, AppError> {
        let tier = GasTier {
            price: U256::from(1_000_000_000u64),
            wait_minutes: 0.5,
        };
        Ok(AdvancedGasPrice {
            safe_low: tier,
            average: tier,
            fast: tier,
            fastest: tier,
        })
    }
}

fn params(window_start: u64) -> RequestParams {
    RequestParams {
        temporal_unit: TemporalUnit::Block,
        window_start,
        window_size: 255,
        freeze_period: 10,
        claim_window_size: 255,
        reserved_window_size: 16,
        bounty: U256::from(BOUNTY),
        fee: U256::ZERO,
        gas_price: U256::from(1_000_000_000u64),
        call_gas: 100_000,
        required_deposit: U256::from(1_000_000_000_000_000u64),
    }
}

fn record(address: Address, window_start: u64, cancelled: bool) -> RequestData {
    RequestData {
        address,
        params: params(window_start),
        claimed_by: None,
        claim_payment_modifier: None,
        is_cancelled: cancelled,
        was_called: false,
    }
}

struct Node {
    node: TimeNode,
    chain: Arc<ScriptedChain>,
    transport: Arc<InstantTransport>,
}

fn node() -> Node {
    let chain = Arc::new(ScriptedChain::default());
    let transport = Arc::new(InstantTransport::default());
    let shutdown = CancellationToken::new();
    let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x07)).unwrap();
    let wallet = Arc::new(Wallet::new(
        vec![signer],
        transport.clone(),
        1,
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(1),
            max_polls: 5,
            confirmations: 12,
        },
        shutdown.clone(),
    ));
    let config = TimeNodeConfig {
        bucket_interval: Duration::from_millis(20),
        cache_scan_interval: Duration::from_millis(10),
        claiming: true,
        reconnect: None,
        metrics_port: None,
    };
    let node = TimeNode::new(
        config,
        TimeNodeParts {
            chain: chain.clone(),
            wallet,
            gas: Arc::new(FlatGas),
            strategy: EconomicStrategy::default(),
            block_time_secs: 15,
            txpool: None,
            sources: Vec::new(),
            shutdown,
        },
    );
    Node {
        node,
        chain,
        transport,
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn start_is_single_shot_and_stop_clears_watches() {
    let Node { node, chain, .. } = node();

    assert!(node.start().await);
    assert!(!node.start().await);
    assert!(node.is_running().await);

    wait_until(|| chain.started.lock().unwrap().len() >= 6).await;
    assert!(node.stop().await);
    assert!(!node.stop().await);
    assert!(!node.is_running().await);
    assert_eq!(chain.stopped.lock().unwrap().len(), 6);

    // Restartable after a clean stop.
    assert!(node.start().await);
    assert!(node.stop().await);
}

#[tokio::test]
async fn cancelled_request_is_discovered_and_dropped_without_sending() {
    let Node {
        node,
        chain,
        transport,
    } = node();
    let address = Address::repeat_byte(0x51);
    chain
        .requests
        .lock()
        .unwrap()
        .insert(address, record(address, HEAD + 500, true));

    assert!(node.start().await);
    wait_until(|| !chain.sinks.lock().unwrap().is_empty()).await;
    chain.announce(&format!("{address:#x}"), params(HEAD + 500));

    let account = node.wallet().addresses()[0];
    wait_until(|| !node.stats().entries(account).is_empty()).await;
    wait_until(|| node.cache().is_empty()).await;

    assert!(transport.sent.lock().unwrap().is_empty());
    assert!(node.claimed_not_executed(account).is_empty());
    assert!(node.stop().await);
}

#[tokio::test]
async fn due_request_is_executed_and_accounted() {
    let Node {
        node,
        chain,
        transport,
    } = node();
    let address = Address::repeat_byte(0x52);
    chain
        .requests
        .lock()
        .unwrap()
        .insert(address, record(address, HEAD, false));

    assert!(node.start().await);
    wait_until(|| !chain.sinks.lock().unwrap().is_empty()).await;
    chain.announce(&format!("{address:#x}"), params(HEAD));

    wait_until(|| !transport.sent.lock().unwrap().is_empty()).await;
    wait_until(|| node.cache().is_empty()).await;
    assert!(node.stop().await);

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, address);

    let account = node.wallet().addresses()[0];
    let (bounty, cost) = node.stats().totals(account);
    assert_eq!(bounty, U256::from(BOUNTY));
    assert_eq!(cost, U256::from(60_000u64 * 1_000_000_000));
    assert!(node.unsuccessful_claims(account).is_empty());
}

#[tokio::test]
async fn malformed_discovery_stops_the_node() {
    let Node { node, chain, .. } = node();

    assert!(node.start().await);
    wait_until(|| !chain.sinks.lock().unwrap().is_empty()).await;
    chain.announce("0x1234", params(HEAD));

    tokio::time::timeout(Duration::from_secs(5), async {
        while node.is_running().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("node kept running");

    // Already halted by the fault.
    assert!(!node.stop().await);
}

#[tokio::test]
async fn claiming_toggle() {
    let Node { node, .. } = node();
    assert!(node.is_claiming());
    node.stop_claiming();
    assert!(!node.is_claiming());
    node.start_claiming();
    assert!(node.is_claiming());
}
