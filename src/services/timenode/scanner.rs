// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::parsing::parse_request_address;
use crate::infrastructure::chain::{BlockRef, BucketEvent, ChainAdapter, WatchHandle};
use crate::services::timenode::buckets::{Bucket, Buckets, diff_buckets};
use crate::services::timenode::cache::{Cache, CachedRecord};
use crate::services::timenode::router::Router;
use crate::services::timenode::stats::{StatsSink, TimeNodeStats};
use alloy::primitives::Address;
use dashmap::DashSet;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Keeps bucket watches in step with the chain head and feeds what they
/// announce into the cache.
pub struct BucketScanner {
    chain: Arc<dyn ChainAdapter>,
    cache: Arc<Cache>,
    stats: Arc<dyn StatsSink>,
    counters: Arc<TimeNodeStats>,
    accounts: Vec<Address>,
    watches: Mutex<BTreeMap<Bucket, WatchHandle>>,
    events_tx: mpsc::UnboundedSender<BucketEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<BucketEvent>>,
}

impl BucketScanner {
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        cache: Arc<Cache>,
        stats: Arc<dyn StatsSink>,
        counters: Arc<TimeNodeStats>,
        accounts: Vec<Address>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            chain,
            cache,
            stats,
            counters,
            accounts,
            watches: Mutex::new(BTreeMap::new()),
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    pub async fn watched(&self) -> BTreeSet<Bucket> {
        self.watches.lock().await.keys().copied().collect()
    }

    /// One maintenance pass. Individual watch failures are logged and retried
    /// on the next pass.
    pub async fn tick(&self) -> Result<(), AppError> {
        let block = self.chain.get_block(BlockRef::Latest).await?;
        let required = Buckets::from_block(&block).all();

        let mut watches = self.watches.lock().await;
        let current: BTreeSet<Bucket> = watches.keys().copied().collect();
        let diff = diff_buckets(&current, &required);

        for bucket in diff.stop {
            if let Some(handle) = watches.remove(&bucket)
                && let Err(e) = self.chain.stop_watch(handle).await
            {
                tracing::warn!(target: "scanner", bucket = bucket.id, kind = ?bucket.kind, error = %e, "Failed to stop bucket watch");
            }
        }
        for bucket in diff.start {
            match self
                .chain
                .watch_requests_by_bucket(bucket.id, self.events_tx.clone())
                .await
            {
                Ok(handle) => {
                    tracing::debug!(target: "scanner", bucket = bucket.id, kind = ?bucket.kind, "Watching bucket");
                    watches.insert(bucket, handle);
                }
                Err(e) => {
                    tracing::warn!(target: "scanner", bucket = bucket.id, kind = ?bucket.kind, error = %e, "Failed to start bucket watch");
                }
            }
        }
        self.counters
            .active_buckets
            .store(watches.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub async fn stop_all(&self) {
        let mut watches = self.watches.lock().await;
        for (bucket, handle) in std::mem::take(&mut *watches) {
            if let Err(e) = self.chain.stop_watch(handle).await {
                tracing::warn!(target: "scanner", bucket = bucket.id, kind = ?bucket.kind, error = %e, "Failed to stop bucket watch");
            }
        }
        self.counters.active_buckets.store(0, Ordering::Relaxed);
    }

    /// Forgets watches that died with a dropped transport, so the next pass
    /// re-creates them.
    pub async fn forget_watches(&self) {
        self.watches.lock().await.clear();
    }

    pub fn handle_event(&self, event: &BucketEvent) -> Result<(), AppError> {
        let Some(address) = parse_request_address(&event.address)? else {
            tracing::debug!(target: "scanner", "Ignoring null request address");
            return Ok(());
        };
        if self
            .cache
            .set_if_absent(address, CachedRecord::discovered(&event.params))
        {
            TimeNodeStats::bump(&self.counters.discovered);
            tracing::info!(
                target: "scanner",
                address = %address,
                window_start = event.params.window_start,
                unit = %event.params.temporal_unit,
                "Discovered request"
            );
            for account in &self.accounts {
                self.stats.discovered(*account, address);
            }
        }
        Ok(())
    }

    /// Consumes watch notifications until shutdown. A malformed address is a
    /// protocol fault and ends the loop with an error.
    pub async fn run_discovery(&self, shutdown: CancellationToken) -> Result<(), AppError> {
        let mut events = self.events_rx.lock().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { return Ok(()) };
                    self.handle_event(&event)?;
                }
            }
        }
    }
}

/// Clears an address from the in-route set when its routing task ends.
struct RoutingGuard {
    routing: Arc<DashSet<Address>>,
    address: Address,
}

impl Drop for RoutingGuard {
    fn drop(&mut self) {
        self.routing.remove(&self.address);
    }
}

/// Periodically refreshes every tracked request and routes it, most urgent
/// first, never running two passes for one address at once.
pub struct CacheScanner {
    chain: Arc<dyn ChainAdapter>,
    cache: Arc<Cache>,
    router: Arc<Router>,
    routing: Arc<DashSet<Address>>,
}

impl CacheScanner {
    pub fn new(chain: Arc<dyn ChainAdapter>, cache: Arc<Cache>, router: Arc<Router>) -> Self {
        Self {
            chain,
            cache,
            router,
            routing: Arc::new(DashSet::new()),
        }
    }

    pub fn prioritized(&self) -> Vec<Address> {
        let mut records = self.cache.snapshot();
        records.sort_by_key(|(_, r)| (r.status.priority(), r.window_start));
        records.into_iter().map(|(address, _)| address).collect()
    }

    pub fn is_routing(&self, address: &Address) -> bool {
        self.routing.contains(address)
    }

    pub fn scan(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for address in self.prioritized() {
            if !self.routing.insert(address) {
                continue;
            }
            let guard = RoutingGuard {
                routing: self.routing.clone(),
                address,
            };
            let chain = self.chain.clone();
            let router = self.router.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = guard;
                match chain.transaction_request(address).await {
                    Ok(request) => {
                        router.route(&request).await;
                    }
                    Err(e) => {
                        tracing::warn!(target: "scanner", address = %address, error = %e, "Failed to refresh request");
                    }
                }
            }));
        }
        tasks
    }
}
