// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::app::config::{TimeNodeSettings, TxPoolBackend};
use crate::common::error::AppError;
use crate::common::metrics::spawn_metrics_server;
use crate::infrastructure::chain::{ChainAdapter, PendingLogProvider, RawTransactionFeed};
use crate::network::gas::{GasOracle, GasPriceSource};
use crate::network::peer_relay::PeerRelaySource;
use crate::network::pending_logs::LogSubscriptionSource;
use crate::network::provider::ConnectionFactory;
use crate::network::reconnect::{ReconnectPolicy, Reconnector};
use crate::network::transport::AccountTransport;
use crate::network::txpool::{PendingTransactionSource, TxPool, TxPoolConfig};
use crate::services::timenode::actions::Actions;
use crate::services::timenode::cache::Cache;
use crate::services::timenode::economic::{EconomicStrategy, EconomicStrategyManager};
use crate::services::timenode::ledger::Ledger;
use crate::services::timenode::router::Router;
use crate::services::timenode::scanner::{BucketScanner, CacheScanner};
use crate::services::timenode::stats::{InMemoryStats, StatsSink, TimeNodeStats};
use crate::services::timenode::wallet::Wallet;
use alloy::primitives::Address;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct TimeNodeConfig {
    pub bucket_interval: Duration,
    pub cache_scan_interval: Duration,
    pub claiming: bool,
    /// Only used when the chain adapter reports disconnects.
    pub reconnect: Option<ReconnectPolicy>,
    pub metrics_port: Option<u16>,
}

impl Default for TimeNodeConfig {
    fn default() -> Self {
        Self {
            bucket_interval: Duration::from_secs(300),
            cache_scan_interval: Duration::from_secs(1),
            claiming: false,
            reconnect: None,
            metrics_port: None,
        }
    }
}

/// Collaborators the node is assembled from.
pub struct TimeNodeParts {
    pub chain: Arc<dyn ChainAdapter>,
    pub wallet: Arc<Wallet>,
    pub gas: Arc<dyn GasPriceSource>,
    pub strategy: EconomicStrategy,
    pub block_time_secs: u64,
    pub txpool: Option<TxPoolConfig>,
    pub sources: Vec<Arc<dyn PendingTransactionSource>>,
    /// Token the wallet was built with; cancelled by `shutdown`.
    pub shutdown: CancellationToken,
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct TimeNode {
    config: TimeNodeConfig,
    chain: Arc<dyn ChainAdapter>,
    cache: Arc<Cache>,
    wallet: Arc<Wallet>,
    stats: Arc<InMemoryStats>,
    counters: Arc<TimeNodeStats>,
    bucket_scanner: Arc<BucketScanner>,
    cache_scanner: Arc<CacheScanner>,
    txpool: Option<Arc<TxPool>>,
    sources: Vec<Arc<dyn PendingTransactionSource>>,
    claiming: Arc<AtomicBool>,
    shutdown: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl TimeNode {
    pub fn new(config: TimeNodeConfig, parts: TimeNodeParts) -> Self {
        let TimeNodeParts {
            chain,
            wallet,
            gas,
            strategy,
            block_time_secs,
            txpool,
            sources,
            shutdown,
        } = parts;

        let counters = Arc::new(TimeNodeStats::default());
        let stats = Arc::new(InMemoryStats::new(counters.clone()));
        let sink: Arc<dyn StatsSink> = stats.clone();
        let cache = Arc::new(Cache::new());
        let txpool = txpool.map(|cfg| Arc::new(TxPool::new(gas.clone(), cfg)));
        let claiming = Arc::new(AtomicBool::new(config.claiming));

        let actions = Arc::new(Actions::new(
            chain.clone(),
            wallet.clone(),
            Ledger::new(sink.clone()),
            txpool.clone(),
        ));
        let economic = Arc::new(EconomicStrategyManager::new(
            strategy,
            gas.clone(),
            cache.clone(),
            wallet.clone(),
            block_time_secs,
        ));
        let router = Arc::new(Router::new(
            cache.clone(),
            wallet.clone(),
            economic,
            actions,
            gas,
            claiming.clone(),
            counters.clone(),
        ));
        let bucket_scanner = Arc::new(BucketScanner::new(
            chain.clone(),
            cache.clone(),
            sink,
            counters.clone(),
            wallet.addresses(),
        ));
        let cache_scanner = Arc::new(CacheScanner::new(chain.clone(), cache.clone(), router));

        Self {
            config,
            chain,
            cache,
            wallet,
            stats,
            counters,
            bucket_scanner,
            cache_scanner,
            txpool,
            sources,
            claiming,
            shutdown,
            running: Mutex::new(None),
        }
    }

    /// Wires the node against an HTTP RPC endpoint. The chain adapter and the
    /// optional pending-transaction backends come from the caller.
    pub async fn from_settings(
        settings: &TimeNodeSettings,
        chain: Arc<dyn ChainAdapter>,
        pending_logs: Option<Arc<dyn PendingLogProvider>>,
        relay_feed: Option<Arc<dyn RawTransactionFeed>>,
    ) -> Result<Self, AppError> {
        let provider = ConnectionFactory::http(settings.http_provider.trim())?;
        let chain_id = match settings.chain_id {
            Some(id) => id,
            None => AccountTransport::chain_id(&provider).await?,
        };
        let transport: Arc<dyn AccountTransport> = Arc::new(provider.clone());
        let shutdown = CancellationToken::new();
        let wallet = Arc::new(Wallet::from_private_keys(
            &settings.wallet_keys_value(),
            transport,
            chain_id,
            settings.confirmation_policy(),
            shutdown.clone(),
        )?);
        let gas: Arc<dyn GasPriceSource> = Arc::new(GasOracle::new(
            provider,
            chain_id,
            settings.gas_station_url.clone(),
        ));

        let mut sources: Vec<Arc<dyn PendingTransactionSource>> = Vec::new();
        let txpool = match settings.txpool_backend_value()? {
            TxPoolBackend::Disabled => None,
            TxPoolBackend::PendingLogs => {
                let provider = pending_logs.ok_or_else(|| {
                    AppError::Initialization("txpool backend 'logs' needs a pending log provider".into())
                })?;
                sources.push(Arc::new(LogSubscriptionSource::new(provider)));
                Some(settings.txpool_config())
            }
            TxPoolBackend::PeerRelay => {
                let feed = relay_feed.ok_or_else(|| {
                    AppError::Initialization("txpool backend 'peer-relay' needs a relay feed".into())
                })?;
                sources.push(Arc::new(PeerRelaySource::new(feed)));
                Some(settings.txpool_config())
            }
        };

        tracing::info!(
            target: "timenode",
            chain_id,
            accounts = wallet.len(),
            claiming = settings.claiming,
            txpool = %settings.txpool_backend,
            "TimeNode configured"
        );

        Ok(Self::new(
            settings.timenode_config(),
            TimeNodeParts {
                chain,
                wallet,
                gas,
                strategy: settings.economic_strategy()?,
                block_time_secs: settings.block_time_secs_value(chain_id),
                txpool,
                sources,
                shutdown,
            },
        ))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn stats(&self) -> &Arc<InMemoryStats> {
        &self.stats
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.token.is_cancelled())
    }

    /// Starts every timer. Returns `false` if the node is already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.token.is_cancelled()) {
            tracing::warn!(target: "timenode", "TimeNode already running");
            return false;
        }
        if let Some(stale) = running.take() {
            for task in stale.tasks {
                let _ = task.await;
            }
        }

        let token = self.shutdown.child_token();
        let mut tasks = vec![
            self.spawn_bucket_timer(token.clone()),
            self.spawn_discovery(token.clone()),
            self.spawn_cache_timer(token.clone()),
        ];
        if let Some(pool) = &self.txpool {
            tasks.push(pool.spawn_sweeper(token.clone()));
            for source in &self.sources {
                tasks.push(pool.spawn_source(source.clone(), token.clone()));
            }
        }
        if let Some(policy) = self.config.reconnect.clone()
            && let Some(disconnects) = self.chain.disconnects()
        {
            tasks.push(self.spawn_reconnect_watcher(policy, disconnects, token.clone()));
        }
        if let Some(port) = self.config.metrics_port {
            spawn_metrics_server(port, self.stats.clone(), token.clone()).await;
        }

        tracing::info!(
            target: "timenode",
            accounts = self.wallet.len(),
            claiming = self.claiming.load(Ordering::Relaxed),
            "TimeNode started"
        );
        *running = Some(Running { token, tasks });
        true
    }

    /// Stops the timers and every bucket watch. Sends already broadcast are
    /// left to confirm. Returns `false` if the node was not running.
    pub async fn stop(&self) -> bool {
        let Some(run) = self.running.lock().await.take() else {
            return false;
        };
        let was_running = !run.token.is_cancelled();
        run.token.cancel();
        for task in run.tasks {
            let _ = task.await;
        }
        self.bucket_scanner.stop_all().await;
        tracing::info!(target: "timenode", "TimeNode stopped");
        was_running
    }

    /// Stops the node and aborts pending confirmation waits.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.shutdown.cancel();
    }

    pub fn start_claiming(&self) {
        self.claiming.store(true, Ordering::Relaxed);
        tracing::info!(target: "timenode", "Claiming enabled");
    }

    pub fn stop_claiming(&self) {
        self.claiming.store(false, Ordering::Relaxed);
        tracing::info!(target: "timenode", "Claiming disabled");
    }

    pub fn is_claiming(&self) -> bool {
        self.claiming.load(Ordering::Relaxed)
    }

    /// Tracked requests `account` claimed that have not been called yet.
    pub fn claimed_not_executed(&self, account: Address) -> Vec<Address> {
        self.cache
            .snapshot()
            .into_iter()
            .filter(|(_, r)| r.claimed_by == Some(account) && !r.was_called)
            .map(|(address, _)| address)
            .collect()
    }

    pub fn unsuccessful_claims(&self, account: Address) -> Vec<Address> {
        self.stats.failed_claims(account)
    }

    fn spawn_bucket_timer(&self, token: CancellationToken) -> JoinHandle<()> {
        let scanner = self.bucket_scanner.clone();
        let period = self.config.bucket_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scanner.tick().await {
                            tracing::warn!(target: "scanner", error = %e, "Bucket maintenance failed");
                        }
                    }
                }
            }
        })
    }

    fn spawn_discovery(&self, token: CancellationToken) -> JoinHandle<()> {
        let scanner = self.bucket_scanner.clone();
        tokio::spawn(async move {
            if let Err(e) = scanner.run_discovery(token.clone()).await {
                tracing::error!(target: "scanner", error = %e, "Discovery failed; stopping TimeNode");
                token.cancel();
                scanner.stop_all().await;
            }
        })
    }

    fn spawn_cache_timer(&self, token: CancellationToken) -> JoinHandle<()> {
        let scanner = self.cache_scanner.clone();
        let period = self.config.cache_scan_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let spawned = scanner.scan().len();
                        if spawned > 0 {
                            tracing::trace!(target: "scanner", spawned, "Cache scan");
                        }
                    }
                }
            }
        })
    }

    fn spawn_reconnect_watcher(
        &self,
        policy: ReconnectPolicy,
        mut disconnects: broadcast::Receiver<()>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let chain = self.chain.clone();
        let scanner = self.bucket_scanner.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            let mut reconnector = Reconnector::new(policy);
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = disconnects.recv() => event,
                };
                match event {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                tracing::warn!(target: "reconnect", "Transport disconnected");
                let result = reconnector
                    .reconnect(
                        |url| {
                            let chain = chain.clone();
                            async move { chain.reconnect(&url).await }
                        },
                        &token,
                    )
                    .await;
                match result {
                    Ok(url) => {
                        TimeNodeStats::bump(&counters.reconnects);
                        // Watches died with the old connection.
                        scanner.forget_watches().await;
                        if let Err(e) = scanner.tick().await {
                            tracing::warn!(target: "scanner", url = %url, error = %e, "Re-watch after reconnect failed");
                        }
                    }
                    Err(e) => {
                        if !token.is_cancelled() {
                            tracing::error!(target: "reconnect", error = %e, "Reconnect exhausted; stopping TimeNode");
                            scanner.forget_watches().await;
                            token.cancel();
                        }
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::test_support::base_settings;
    use crate::domain::request::fixtures::params;
    use crate::services::timenode::cache::CachedRecord;
    use crate::services::timenode::router::test_support::NoChain;

    #[tokio::test]
    async fn from_settings_wires_configured_backend() {
        let mut settings = base_settings();
        settings.chain_id = Some(1);
        settings.claiming = true;
        settings.txpool_backend = "none".into();

        let node = TimeNode::from_settings(&settings, Arc::new(NoChain), None, None)
            .await
            .unwrap();
        assert!(node.is_claiming());
        assert_eq!(node.wallet().len(), 1);
        assert!(node.txpool.is_none());
        assert!(!node.is_running().await);
    }

    #[tokio::test]
    async fn from_settings_requires_a_source_for_the_backend() {
        let mut settings = base_settings();
        settings.chain_id = Some(1);
        settings.txpool_backend = "peer-relay".into();

        let result = TimeNode::from_settings(&settings, Arc::new(NoChain), None, None).await;
        assert!(matches!(result, Err(AppError::Initialization(_))));
    }

    #[tokio::test]
    async fn claimed_not_executed_reads_the_cache() {
        let settings = {
            let mut s = base_settings();
            s.chain_id = Some(1);
            s.txpool_backend = "none".into();
            s
        };
        let node = TimeNode::from_settings(&settings, Arc::new(NoChain), None, None)
            .await
            .unwrap();
        let account = node.wallet().addresses()[0];
        let params = params(1_000);

        let mut ours = CachedRecord::discovered(&params);
        ours.claimed_by = Some(account);
        let mut done = ours.clone();
        done.was_called = true;
        node.cache().set(Address::repeat_byte(0x01), ours);
        node.cache().set(Address::repeat_byte(0x02), done);
        node.cache()
            .set(Address::repeat_byte(0x03), CachedRecord::discovered(&params));

        assert_eq!(
            node.claimed_not_executed(account),
            vec![Address::repeat_byte(0x01)]
        );
    }
}
