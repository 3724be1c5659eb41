use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Environment prefix for overrides, e.g. `RELAYER__GLOBAL__LOG_LEVEL=debug`
pub const ENV_PREFIX: &str = "RELAYER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub global: GlobalConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level for the relayer
    pub log_level: String,
    /// Attempts made by every retried pipeline step
    pub max_retries: u32,
    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// How long to wait for a broadcast tx to land in a block (humantime, e.g. "10m")
    pub broadcast_timeout: String,
    /// Confirmation poll interval in milliseconds
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignMode {
    Direct,
    AminoJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier
    pub chain_id: String,
    /// RPC endpoint, handed to the transport that backs the provider
    pub rpc_endpoint: String,
    /// Name of the signing key
    pub key_name: String,
    /// Bech32 address prefix
    pub account_prefix: String,
    /// Multiplier applied to simulated gas
    pub gas_adjustment: f64,
    /// Gas price and denom, e.g. "0.025uatom"
    pub gas_prices: String,
    /// Gas floor; 0 disables it
    #[serde(default)]
    pub min_gas_amount: u64,
    /// Gas cap; 0 disables it
    #[serde(default)]
    pub max_gas_amount: u64,
    pub sign_mode: SignMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,
    /// Metrics server host
    pub host: String,
    /// Metrics server port
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl RelayerConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file and layer `RELAYER__*` environment variables on top
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: RelayerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get chain configuration by ID
    pub fn get_chain(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.get(chain_id)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.global.broadcast_timeout()?;
        for (name, chain) in &self.chains {
            if chain.gas_adjustment <= 0.0 || !chain.gas_adjustment.is_finite() {
                anyhow::bail!("chain {}: gas_adjustment must be a positive number", name);
            }
            if chain.max_gas_amount > 0 && chain.min_gas_amount > chain.max_gas_amount {
                anyhow::bail!("chain {}: min_gas_amount exceeds max_gas_amount", name);
            }
        }
        Ok(())
    }
}

impl GlobalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
            last_error_only: true,
        }
    }

    pub fn broadcast_timeout(&self) -> anyhow::Result<Duration> {
        humantime::parse_duration(&self.broadcast_timeout)
            .map_err(|e| anyhow::anyhow!("invalid broadcast_timeout {:?}: {}", self.broadcast_timeout, e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_retries: 5,
            retry_delay_ms: 400,
            broadcast_timeout: "10m".to_string(),
            poll_interval_ms: 100,
        }
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();

        chains.insert(
            "cosmoshub-testnet".to_string(),
            ChainConfig {
                chain_id: "theta-testnet-001".to_string(),
                rpc_endpoint: "https://rpc.sentry-01.theta-testnet.polypore.xyz".to_string(),
                key_name: "relayer".to_string(),
                account_prefix: "cosmos".to_string(),
                gas_adjustment: 1.3,
                gas_prices: "0.025uatom".to_string(),
                min_gas_amount: 0,
                max_gas_amount: 0,
                sign_mode: SignMode::Direct,
            },
        );

        Self {
            global: GlobalConfig::default(),
            chains,
            metrics: MetricsConfig::default(),
        }
    }
}
