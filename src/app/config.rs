// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::{parse_wei, split_list};
use crate::domain::constants::{CONFIRMATION_BLOCKS, get_block_time};
use crate::domain::error::AppError;
use crate::network::reconnect::ReconnectPolicy;
use crate::network::txpool::TxPoolConfig;
use crate::services::timenode::economic::EconomicStrategy;
use crate::services::timenode::engine::TimeNodeConfig;
use crate::services::timenode::wallet::ConfirmationPolicy;
use alloy::primitives::U256;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct TimeNodeSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_false")]
    pub log_json: bool,

    // Identity
    /// Comma-separated private keys, one per operator account.
    #[serde(default)]
    pub wallet_keys: String,

    // Transport
    #[serde(default = "default_http_provider")]
    pub http_provider: String,
    /// Comma-separated WebSocket endpoints, rotated on reconnect.
    pub websocket_providers: Option<String>,
    pub chain_id: Option<u64>,
    pub average_block_time_secs: Option<u64>,
    pub gas_station_url: Option<String>,

    // Scheduling
    #[serde(default = "default_false")]
    pub claiming: bool,
    #[serde(default = "default_bucket_interval_secs")]
    pub bucket_interval_secs: u64,
    #[serde(default = "default_cache_scan_interval_ms")]
    pub cache_scan_interval_ms: u64,

    // Economics (wei amounts as decimal or 0x-hex strings)
    pub max_deposit: Option<String>,
    pub min_balance: Option<String>,
    pub min_profitability: Option<String>,
    #[serde(default = "default_max_gas_subsidy")]
    pub max_gas_subsidy: u64,
    pub min_claim_window: Option<u64>,
    pub min_claim_window_block: Option<u64>,
    pub min_execution_window: Option<u64>,
    pub min_execution_window_block: Option<u64>,
    #[serde(default = "default_false")]
    pub smart_gas_estimation: bool,

    // Pending transaction watcher
    /// "logs", "peer-relay" or "none".
    #[serde(default = "default_txpool_backend")]
    pub txpool_backend: String,
    #[serde(default = "default_txpool_ttl_secs")]
    pub txpool_ttl_secs: u64,
    #[serde(default = "default_txpool_sweep_secs")]
    pub txpool_sweep_secs: u64,
    #[serde(default = "default_txpool_gas_spread_pct")]
    pub txpool_gas_spread_pct: u64,

    // Reconnect
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_reconnect_debounce_ms")]
    pub reconnect_debounce_ms: u64,

    // Receipts
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_max_polls")]
    pub receipt_max_polls: u32,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,

    pub metrics_port: Option<u16>,
}

fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_provider() -> String {
    "http://localhost:8545".to_string()
}
fn default_bucket_interval_secs() -> u64 {
    300
}
fn default_cache_scan_interval_ms() -> u64 {
    1_000
}
fn default_max_gas_subsidy() -> u64 {
    100
}
fn default_txpool_backend() -> String {
    "logs".to_string()
}
fn default_txpool_ttl_secs() -> u64 {
    30 * 60
}
fn default_txpool_sweep_secs() -> u64 {
    5
}
fn default_txpool_gas_spread_pct() -> u64 {
    30
}
fn default_reconnect_max_attempts() -> u32 {
    10
}
fn default_reconnect_backoff_ms() -> u64 {
    5_000
}
fn default_reconnect_debounce_ms() -> u64 {
    1_000
}
fn default_receipt_poll_ms() -> u64 {
    5_000
}
fn default_receipt_max_polls() -> u32 {
    360
}
fn default_receipt_confirm_blocks() -> u64 {
    CONFIRMATION_BLOCKS
}

/// Which `PendingTransactionSource` backs the tx pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxPoolBackend {
    PendingLogs,
    PeerRelay,
    Disabled,
}

impl TimeNodeSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("timenode").required(false));
        }
        builder = builder.add_source(Environment::default());

        let settings: TimeNodeSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.wallet_keys_value().is_empty() {
            return Err(AppError::Config("WALLET_KEYS is missing".to_string()));
        }
        Url::parse(self.http_provider.trim()).map_err(|e| AppError::Validation {
            field: "http_provider".into(),
            message: e.to_string(),
        })?;
        self.txpool_backend_value()?;
        self.economic_strategy()?;
        Ok(())
    }

    /// `debug = true` overrides `log_level`.
    pub fn log_level_value(&self) -> &str {
        if self.debug { "debug" } else { self.log_level.trim() }
    }

    pub fn wallet_keys_value(&self) -> Vec<String> {
        split_list(&self.wallet_keys)
    }

    pub fn websocket_providers_value(&self) -> Vec<String> {
        self.websocket_providers
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }

    pub fn http_provider_url(&self) -> Result<Url, AppError> {
        Url::parse(self.http_provider.trim())
            .map_err(|e| AppError::Config(format!("Invalid HTTP_PROVIDER: {e}")))
    }

    pub fn block_time_secs_value(&self, chain_id: u64) -> u64 {
        self.average_block_time_secs
            .unwrap_or_else(|| get_block_time(chain_id))
            .max(1)
    }

    pub fn bucket_interval_value(&self) -> Duration {
        Duration::from_secs(self.bucket_interval_secs.max(1))
    }

    pub fn cache_scan_interval_value(&self) -> Duration {
        Duration::from_millis(self.cache_scan_interval_ms.max(100))
    }

    pub fn max_gas_subsidy_value(&self) -> u64 {
        self.max_gas_subsidy.min(1_000)
    }

    pub fn txpool_gas_spread_pct_value(&self) -> u64 {
        self.txpool_gas_spread_pct.min(100)
    }

    pub fn receipt_poll_value(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms.max(100))
    }

    pub fn receipt_confirm_blocks_value(&self) -> u64 {
        self.receipt_confirm_blocks.max(1)
    }

    pub fn txpool_backend_value(&self) -> Result<TxPoolBackend, AppError> {
        match self.txpool_backend.trim().to_ascii_lowercase().as_str() {
            "logs" | "pending-logs" => Ok(TxPoolBackend::PendingLogs),
            "peer-relay" | "relay" | "p2p" => Ok(TxPoolBackend::PeerRelay),
            "none" | "off" | "disabled" => Ok(TxPoolBackend::Disabled),
            other => Err(AppError::Validation {
                field: "txpool_backend".into(),
                message: format!("unknown backend '{other}'"),
            }),
        }
    }

    fn wei_or(raw: Option<&str>, field: &str, fallback: U256) -> Result<U256, AppError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => parse_wei(value, field),
            None => Ok(fallback),
        }
    }

    pub fn economic_strategy(&self) -> Result<EconomicStrategy, AppError> {
        Ok(EconomicStrategy {
            max_deposit: Self::wei_or(self.max_deposit.as_deref(), "max_deposit", U256::MAX)?,
            min_balance: Self::wei_or(self.min_balance.as_deref(), "min_balance", U256::ZERO)?,
            min_profitability: Self::wei_or(
                self.min_profitability.as_deref(),
                "min_profitability",
                U256::ZERO,
            )?,
            max_gas_subsidy: self.max_gas_subsidy_value(),
            min_claim_window: self.min_claim_window,
            min_claim_window_block: self.min_claim_window_block,
            min_execution_window: self.min_execution_window,
            min_execution_window_block: self.min_execution_window_block,
            using_smart_gas_estimation: self.smart_gas_estimation,
        })
    }

    pub fn txpool_config(&self) -> TxPoolConfig {
        TxPoolConfig {
            ttl: Duration::from_secs(self.txpool_ttl_secs.max(1)),
            sweep_interval: Duration::from_secs(self.txpool_sweep_secs.max(1)),
            gas_price_spread_pct: self.txpool_gas_spread_pct_value(),
        }
    }

    /// `None` without WebSocket endpoints; HTTP transports never disconnect.
    pub fn reconnect_policy(&self) -> Option<ReconnectPolicy> {
        let urls = self.websocket_providers_value();
        if urls.is_empty() {
            return None;
        }
        Some(ReconnectPolicy {
            urls,
            max_attempts: self.reconnect_max_attempts.max(1),
            backoff_unit: Duration::from_millis(self.reconnect_backoff_ms),
            debounce: Duration::from_millis(self.reconnect_debounce_ms),
        })
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: self.receipt_poll_value(),
            max_polls: self.receipt_max_polls.max(1),
            confirmations: self.receipt_confirm_blocks_value(),
        }
    }

    pub fn timenode_config(&self) -> TimeNodeConfig {
        TimeNodeConfig {
            bucket_interval: self.bucket_interval_value(),
            cache_scan_interval: self.cache_scan_interval_value(),
            claiming: self.claiming,
            reconnect: self.reconnect_policy(),
            metrics_port: self.metrics_port,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn base_settings() -> TimeNodeSettings {
        TimeNodeSettings {
            debug: default_false(),
            log_level: default_log_level(),
            log_json: default_false(),
            wallet_keys: "0x0101010101010101010101010101010101010101010101010101010101010101"
                .to_string(),
            http_provider: default_http_provider(),
            websocket_providers: None,
            chain_id: None,
            average_block_time_secs: None,
            gas_station_url: None,
            claiming: default_false(),
            bucket_interval_secs: default_bucket_interval_secs(),
            cache_scan_interval_ms: default_cache_scan_interval_ms(),
            max_deposit: None,
            min_balance: None,
            min_profitability: None,
            max_gas_subsidy: default_max_gas_subsidy(),
            min_claim_window: None,
            min_claim_window_block: None,
            min_execution_window: None,
            min_execution_window_block: None,
            smart_gas_estimation: default_false(),
            txpool_backend: default_txpool_backend(),
            txpool_ttl_secs: default_txpool_ttl_secs(),
            txpool_sweep_secs: default_txpool_sweep_secs(),
            txpool_gas_spread_pct: default_txpool_gas_spread_pct(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_debounce_ms: default_reconnect_debounce_ms(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_max_polls: default_receipt_max_polls(),
            receipt_confirm_blocks: default_receipt_confirm_blocks(),
            metrics_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::base_settings;
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn economic_strategy_parses_wei_amounts() {
        let mut settings = base_settings();
        settings.max_deposit = Some("1000000000000000000".into());
        settings.min_profitability = Some("0x2386f26fc10000".into());
        settings.min_balance = Some("  ".into());
        settings.max_gas_subsidy = 5_000;

        let strategy = settings.economic_strategy().unwrap();
        assert_eq!(strategy.max_deposit, U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(strategy.min_profitability, U256::from(10_000_000_000_000_000u64));
        assert_eq!(strategy.min_balance, U256::ZERO);
        assert_eq!(strategy.max_gas_subsidy, 1_000);

        settings.min_balance = Some("ten ether".into());
        assert!(matches!(
            settings.economic_strategy(),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn reconnect_policy_requires_websocket_urls() {
        let mut settings = base_settings();
        assert!(settings.reconnect_policy().is_none());
        settings.websocket_providers = Some("ws://a:8546, ws://b:8546".into());
        settings.reconnect_max_attempts = 0;
        let policy = settings.reconnect_policy().unwrap();
        assert_eq!(policy.urls, vec!["ws://a:8546", "ws://b:8546"]);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn tuning_values_have_safe_floors() {
        let mut settings = base_settings();
        settings.receipt_poll_ms = 0;
        settings.receipt_confirm_blocks = 0;
        settings.cache_scan_interval_ms = 1;
        settings.txpool_gas_spread_pct = 250;
        assert_eq!(settings.receipt_poll_value(), Duration::from_millis(100));
        assert_eq!(settings.receipt_confirm_blocks_value(), 1);
        assert_eq!(settings.cache_scan_interval_value(), Duration::from_millis(100));
        assert_eq!(settings.txpool_config().gas_price_spread_pct, 100);
        assert_eq!(settings.block_time_secs_value(42), 4);
        settings.debug = true;
        assert_eq!(settings.log_level_value(), "debug");
    }

    #[test]
    fn txpool_backend_names() {
        let mut settings = base_settings();
        assert_eq!(settings.txpool_backend_value().unwrap(), TxPoolBackend::PendingLogs);
        settings.txpool_backend = "P2P".into();
        assert_eq!(settings.txpool_backend_value().unwrap(), TxPoolBackend::PeerRelay);
        settings.txpool_backend = "none".into();
        assert_eq!(settings.txpool_backend_value().unwrap(), TxPoolBackend::Disabled);
        settings.txpool_backend = "parity".into();
        assert!(settings.txpool_backend_value().is_err());
    }

    #[test]
    fn loads_settings_file_with_defaults() {
        let _env_lock = env_lock_guard();
        let path = std::env::temp_dir().join(format!("timenode-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "wallet_keys = \"0x0202020202020202020202020202020202020202020202020202020202020202\"\n\
             claiming = true\n\
             min_claim_window_block = 20\n",
        )
        .unwrap();

        let settings = TimeNodeSettings::load_with_path(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(settings.claiming);
        assert_eq!(settings.wallet_keys_value().len(), 1);
        assert_eq!(settings.min_claim_window_block, Some(20));
        assert_eq!(settings.bucket_interval_value(), Duration::from_secs(300));
        assert_eq!(settings.txpool_config().ttl, Duration::from_secs(1_800));
    }

    #[test]
    fn missing_wallet_keys_is_a_config_error() {
        let mut settings = base_settings();
        settings.wallet_keys = " , ".into();
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));
    }
}
