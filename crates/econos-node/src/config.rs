use anyhow::{Context, Result};
use econos_market::KnownWorker;
use econos_types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconosConfig {
    pub chain: ChainSettings,
    #[serde(default)]
    pub market: MarketSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_block_confirmations")]
    pub block_confirmations: u64,
    /// Prefer the ECONOS_MASTER_PRIVATE_KEY environment variable over
    /// keeping the key in the config file.
    #[serde(default)]
    pub master_private_key: Option<String>,
    pub escrow_address: Address,
    pub registry_address: Address,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_event_poll_interval")]
    pub event_poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    #[serde(default = "default_min_reputation")]
    pub min_reputation: u8,
    #[serde(default = "default_capability_cache_secs")]
    pub capability_cache_secs: u64,
    #[serde(default)]
    pub workers: Vec<KnownWorker>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            min_reputation: default_min_reputation(),
            capability_cache_secs: default_capability_cache_secs(),
            workers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default = "default_expiration_check_interval")]
    pub expiration_check_interval_secs: u64,
    #[serde(default = "default_authorization_validity")]
    pub authorization_validity_secs: u64,
    #[serde(default = "default_nonce_retention")]
    pub nonce_retention_secs: u64,
    #[serde(default = "default_task_duration")]
    pub task_duration_secs: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            expiration_check_interval_secs: default_expiration_check_interval(),
            authorization_validity_secs: default_authorization_validity(),
            nonce_retention_secs: default_nonce_retention(),
            task_duration_secs: default_task_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_block_confirmations() -> u64 {
    2
}
fn default_gas_limit() -> u64 {
    400_000
}
fn default_event_poll_interval() -> u64 {
    5
}
fn default_min_reputation() -> u8 {
    50
}
fn default_capability_cache_secs() -> u64 {
    60
}
fn default_expiration_check_interval() -> u64 {
    60
}
fn default_authorization_validity() -> u64 {
    3_600
}
fn default_nonce_retention() -> u64 {
    86_400
}
fn default_task_duration() -> u64 {
    7_200
}
fn default_true() -> bool {
    true
}
fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    8720
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl EconosConfig {
    /// Load from a TOML file, then apply `ECONOS_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: EconosConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var("ECONOS_CHAIN_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Ok(chain_id) = env::var("ECONOS_CHAIN_ID") {
            self.chain.chain_id = chain_id.parse().context("ECONOS_CHAIN_ID")?;
        }
        if let Ok(key) = env::var("ECONOS_MASTER_PRIVATE_KEY") {
            self.chain.master_private_key = Some(key);
        }
        if let Ok(addr) = env::var("ECONOS_ESCROW_ADDRESS") {
            self.chain.escrow_address =
                Address::from_hex(&addr).map_err(|e| anyhow::anyhow!("ECONOS_ESCROW_ADDRESS: {}", e))?;
        }
        if let Ok(addr) = env::var("ECONOS_REGISTRY_ADDRESS") {
            self.chain.registry_address =
                Address::from_hex(&addr).map_err(|e| anyhow::anyhow!("ECONOS_REGISTRY_ADDRESS: {}", e))?;
        }
        if let Ok(port) = env::var("ECONOS_API_PORT") {
            self.api.port = port.parse().context("ECONOS_API_PORT")?;
        }
        if let Ok(rep) = env::var("ECONOS_MIN_REPUTATION") {
            self.market.min_reputation = rep.parse().context("ECONOS_MIN_REPUTATION")?;
        }
        Ok(())
    }

    /// Everything the node cannot run without.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.chain.rpc_url.is_empty() {
            return Err(ConfigError::ConfigMissing("chain.rpc_url".to_string()));
        }
        if self.chain.master_private_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::ConfigMissing(
                "chain.master_private_key (or ECONOS_MASTER_PRIVATE_KEY)".to_string(),
            ));
        }
        if self.chain.escrow_address.is_zero() {
            return Err(ConfigError::ConfigMissing("chain.escrow_address".to_string()));
        }
        if self.chain.registry_address.is_zero() {
            return Err(ConfigError::ConfigMissing("chain.registry_address".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[chain]
rpc_url = "http://127.0.0.1:8545"
chain_id = 240
escrow_address = "0x00000000000000000000000000000000000000e5"
registry_address = "0x00000000000000000000000000000000000000e6"
master_private_key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"

[[market.workers]]
address = "0x00000000000000000000000000000000000000aa"
endpoint = "http://worker.test:4021"
"#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = EconosConfig::load(file.path()).unwrap();
        assert_eq!(config.chain.block_confirmations, 2);
        assert_eq!(config.market.min_reputation, 50);
        assert_eq!(config.market.capability_cache_secs, 60);
        assert_eq!(config.lifecycle.expiration_check_interval_secs, 60);
        assert_eq!(config.lifecycle.authorization_validity_secs, 3_600);
        assert_eq!(config.lifecycle.nonce_retention_secs, 86_400);
        assert_eq!(config.market.workers.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_flags_missing_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let without_key = MINIMAL.replace(
            "master_private_key = \"4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318\"\n",
            "",
        );
        file.write_all(without_key.as_bytes()).unwrap();

        let config = EconosConfig::load(file.path()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("master_private_key"));
    }
}
