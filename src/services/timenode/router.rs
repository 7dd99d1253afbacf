// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Per-request state machine: decides when to claim, execute or drop.

use crate::common::error::AppError;
use crate::domain::request::{Operation, TransactionRequest};
use crate::network::gas::GasPriceSource;
use crate::services::timenode::actions::{ActionStatus, Actions};
use crate::services::timenode::cache::Cache;
use crate::services::timenode::economic::{ClaimDecision, EconomicStrategyManager};
use crate::services::timenode::stats::TimeNodeStats;
use crate::services::timenode::wallet::Wallet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    BeforeClaimWindow,
    ClaimWindow,
    FreezePeriod,
    ExecutionWindow,
    Executed,
    Missed,
    Done,
}

impl RequestStatus {
    /// Scan order: records closest to needing action first.
    pub fn priority(self) -> u8 {
        match self {
            RequestStatus::ExecutionWindow => 0,
            RequestStatus::FreezePeriod => 1,
            RequestStatus::ClaimWindow => 2,
            RequestStatus::BeforeClaimWindow => 3,
            RequestStatus::Executed | RequestStatus::Missed | RequestStatus::Done => 4,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::BeforeClaimWindow => "BeforeClaimWindow",
            RequestStatus::ClaimWindow => "ClaimWindow",
            RequestStatus::FreezePeriod => "FreezePeriod",
            RequestStatus::ExecutionWindow => "ExecutionWindow",
            RequestStatus::Executed => "Executed",
            RequestStatus::Missed => "Missed",
            RequestStatus::Done => "Done",
        };
        f.write_str(s)
    }
}

pub struct Router {
    cache: Arc<Cache>,
    wallet: Arc<Wallet>,
    economic: Arc<EconomicStrategyManager>,
    actions: Arc<Actions>,
    gas: Arc<dyn GasPriceSource>,
    claiming: Arc<AtomicBool>,
    stats: Arc<TimeNodeStats>,
}

impl Router {
    pub fn new(
        cache: Arc<Cache>,
        wallet: Arc<Wallet>,
        economic: Arc<EconomicStrategyManager>,
        actions: Arc<Actions>,
        gas: Arc<dyn GasPriceSource>,
        claiming: Arc<AtomicBool>,
        stats: Arc<TimeNodeStats>,
    ) -> Self {
        Self {
            cache,
            wallet,
            economic,
            actions,
            gas,
            claiming,
            stats,
        }
    }

    /// Applies transitions until the status stops changing. Untracked
    /// addresses are already `Done`.
    pub async fn route(&self, request: &TransactionRequest) -> RequestStatus {
        let address = request.address();
        let Ok(record) = self.cache.get(&address) else {
            return RequestStatus::Done;
        };
        let mut status = record.status;

        loop {
            let next = match self.transition(status, request).await {
                Ok(next) => next,
                Err(e) => {
                    TimeNodeStats::bump(&self.stats.route_errors);
                    tracing::error!(target: "router", address = %address, status = %status, error = %e, "Transition failed");
                    return status;
                }
            };
            if next == status {
                return status;
            }
            tracing::info!(target: "router", address = %address, from = %status, to = %next, "Transition");
            if self.cache.update(&address, |r| r.status = next).is_err() {
                // Dropped underneath us; nothing left to drive.
                return RequestStatus::Done;
            }
            status = next;
        }
    }

    async fn transition(
        &self,
        status: RequestStatus,
        request: &TransactionRequest,
    ) -> Result<RequestStatus, AppError> {
        match status {
            RequestStatus::BeforeClaimWindow => Ok(self.before_claim_window(request)),
            RequestStatus::ClaimWindow => self.claim_window(request).await,
            RequestStatus::FreezePeriod => Ok(self.freeze_period(request)),
            RequestStatus::ExecutionWindow => self.execution_window(request).await,
            RequestStatus::Executed => self.executed(request),
            RequestStatus::Missed => Ok(RequestStatus::Done),
            RequestStatus::Done => {
                self.cache.del(&request.address());
                Ok(RequestStatus::Done)
            }
        }
    }

    fn before_claim_window(&self, request: &TransactionRequest) -> RequestStatus {
        if request.is_cancelled() {
            return RequestStatus::Executed;
        }
        if request.before_claim_window() {
            return RequestStatus::BeforeClaimWindow;
        }
        RequestStatus::ClaimWindow
    }

    async fn claim_window(&self, request: &TransactionRequest) -> Result<RequestStatus, AppError> {
        let address = request.address();
        if self
            .wallet
            .is_waiting_for_confirmation(address, Operation::Claim)
        {
            return Ok(RequestStatus::ClaimWindow);
        }
        if !request.in_claim_window() || request.is_claimed() {
            let claimed_by = request.claimed_by();
            self.cache.update(&address, |r| r.claimed_by = claimed_by)?;
            return Ok(RequestStatus::FreezePeriod);
        }
        if !self.claiming.load(Ordering::Relaxed) {
            return Ok(RequestStatus::ClaimWindow);
        }
        let Some(account) = self.wallet.next_account() else {
            return Ok(RequestStatus::ClaimWindow);
        };

        let gas_price = self.gas.advanced_network_gas_price().await?.fastest.price;
        let decision = self
            .economic
            .should_claim_tx(request, account, gas_price)
            .await?;
        if decision != ClaimDecision::Claim {
            tracing::info!(target: "router", address = %address, account = %account, reason = %decision, "Not claiming");
            return Ok(RequestStatus::ClaimWindow);
        }

        match self.actions.claim(request, account, gas_price).await {
            ActionStatus::Success => {
                self.cache
                    .update(&address, |r| r.claimed_by = Some(account))?;
                Ok(RequestStatus::FreezePeriod)
            }
            ActionStatus::Failed | ActionStatus::Aborted(_) => Ok(RequestStatus::FreezePeriod),
            ActionStatus::WalletBusy
            | ActionStatus::InProgress
            | ActionStatus::Pending
            | ActionStatus::MinedInUncle
            | ActionStatus::Retry => Ok(RequestStatus::ClaimWindow),
        }
    }

    fn freeze_period(&self, request: &TransactionRequest) -> RequestStatus {
        if request.in_freeze_period() {
            return RequestStatus::FreezePeriod;
        }
        if request.in_execution_window() {
            return RequestStatus::ExecutionWindow;
        }
        RequestStatus::FreezePeriod
    }

    async fn execution_window(
        &self,
        request: &TransactionRequest,
    ) -> Result<RequestStatus, AppError> {
        if request.was_called() {
            return Ok(RequestStatus::Executed);
        }
        if request.after_execution_window() {
            return Ok(RequestStatus::Missed);
        }
        let claimer_is_ours = request
            .claimed_by()
            .is_some_and(|a| self.wallet.is_known_account(a));
        if request.in_reserved_window() && request.is_claimed() && !claimer_is_ours {
            return Ok(RequestStatus::ExecutionWindow);
        }

        let gas_price = self.economic.get_execution_gas_price(request).await?;
        if !self.economic.should_execute_tx(request, gas_price) {
            tracing::info!(
                target: "router",
                address = %request.address(),
                gas_price = %gas_price,
                "Execution not profitable"
            );
            return Ok(RequestStatus::ExecutionWindow);
        }

        match self.actions.execute(request, gas_price).await {
            ActionStatus::Success => Ok(RequestStatus::Executed),
            _ => Ok(RequestStatus::ExecutionWindow),
        }
    }

    fn executed(&self, request: &TransactionRequest) -> Result<RequestStatus, AppError> {
        self.cache
            .update(&request.address(), |r| r.was_called = true)?;
        Ok(RequestStatus::Done)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::infrastructure::chain::{
        BlockInfo, BlockRef, BucketEvent, BucketId, ChainAdapter, WatchHandle,
    };
    use crate::domain::request::RequestData;
    use crate::network::gas::{AdvancedGasPrice, GasTier};
    use crate::services::timenode::economic::EconomicStrategy;
    use crate::services::timenode::ledger::Ledger;
    use crate::services::timenode::stats::InMemoryStats;
    use crate::services::timenode::wallet::test_support::{MockTransport, wallet};
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    pub struct FlatGas;

    #[async_trait]
    impl GasPriceSource for FlatGas {
        async fn advanced_network_gas_price(&self) -> Result<AdvancedGasPrice, AppError> {
            let tier = GasTier {
                price: U256::from(1_000_000_000u64),
                wait_minutes: 0.1,
            };
            Ok(AdvancedGasPrice {
                safe_low: tier,
                average: tier,
                fast: tier,
                fastest: tier,
            })
        }
    }

    /// Adapter that only serves call encodings; routing reads come from the
    /// request passed in.
    pub struct NoChain;

    #[async_trait]
    impl ChainAdapter for NoChain {
        async fn get_block(&self, _block: BlockRef) -> Result<BlockInfo, AppError> {
            Err(AppError::Connection("offline".into()))
        }

        async fn watch_requests_by_bucket(
            &self,
            _bucket: BucketId,
            _sink: mpsc::UnboundedSender<BucketEvent>,
        ) -> Result<WatchHandle, AppError> {
            Err(AppError::Connection("offline".into()))
        }

        async fn stop_watch(&self, _handle: WatchHandle) -> Result<(), AppError> {
            Ok(())
        }

        async fn request(&self, address: Address) -> Result<RequestData, AppError> {
            Err(AppError::NotFound(format!("{address:#x}")))
        }
    }

    pub struct Harness {
        pub router: Router,
        pub cache: Arc<Cache>,
        pub wallet: Arc<Wallet>,
        pub transport: Arc<MockTransport>,
        pub stats: Arc<InMemoryStats>,
    }

    pub fn harness(claiming: bool) -> Harness {
        let transport = Arc::new(MockTransport::default());
        let wallet = Arc::new(wallet(1, transport.clone()));
        let account = wallet.addresses()[0];
        let ether = U256::from(10u64).pow(U256::from(18u64));
        transport.balances.lock().unwrap().insert(account, ether);

        let cache = Arc::new(Cache::new());
        let gas: Arc<dyn GasPriceSource> = Arc::new(FlatGas);
        let stats = Arc::new(InMemoryStats::default());
        let economic = Arc::new(EconomicStrategyManager::new(
            EconomicStrategy::default(),
            gas.clone(),
            cache.clone(),
            wallet.clone(),
            12,
        ));
        let actions = Arc::new(Actions::new(
            Arc::new(NoChain),
            wallet.clone(),
            Ledger::new(stats.clone()),
            None,
        ));
        let router = Router::new(
            cache.clone(),
            wallet.clone(),
            economic,
            actions,
            gas,
            Arc::new(AtomicBool::new(claiming)),
            stats.counters().clone(),
        );
        Harness {
            router,
            cache,
            wallet,
            transport,
            stats,
        }
    }
}
