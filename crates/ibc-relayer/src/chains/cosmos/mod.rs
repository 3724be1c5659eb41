// Cosmos SDK chain provider: tx pipeline, proof queries and message builders
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use tracing::debug;

use crate::config::{ChainConfig, GlobalConfig, SignMode};
use crate::error::RelayerError;
use crate::metrics::RelayerMetrics;
use crate::retry::RetryPolicy;

use super::ChainRpc;

pub mod account;
pub mod broadcast;
pub mod gas;
pub mod msgs;
pub mod query;
pub mod signer;
pub mod tx;

pub use account::{KeyLocks, SequenceHandle, SequenceState};
pub use broadcast::{PendingTx, TxConfirmation};
pub use signer::{KeySigner, Secp256k1Key};
pub use tx::TxFactory;

/// Default time to wait for a broadcast tx to be included in a block
pub const DEFAULT_BROADCAST_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default confirmation poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Gas price, e.g. "0.025uatom" -> (0.025, "uatom")
#[derive(Debug, Clone, PartialEq)]
pub struct GasPrice {
    pub amount: f64,
    pub denom: String,
}

impl GasPrice {
    pub fn parse(gas_price: &str) -> Result<Self, RelayerError> {
        let gas_price = gas_price.trim();

        // Find where digits end and denom begins
        let split_pos = gas_price
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
            .map(|(i, _)| i)
            .unwrap_or(gas_price.len());

        if split_pos == 0 || split_pos == gas_price.len() {
            return Err(RelayerError::Config(format!(
                "invalid gas price format: {:?}",
                gas_price
            )));
        }

        let amount: f64 = gas_price[..split_pos]
            .parse()
            .map_err(|e| RelayerError::Config(format!("invalid gas price amount: {}", e)))?;

        Ok(Self {
            amount,
            denom: gas_price[split_pos..].to_string(),
        })
    }

    /// Fee owed for `gas`, rounded up
    pub fn fee(&self, gas: u64) -> Coin {
        let amount = (gas as f64 * self.amount).ceil();
        Coin {
            denom: self.denom.clone(),
            amount: format!("{}", amount as u128),
        }
    }
}

/// Provider settings for one chain and signing key
#[derive(Debug, Clone)]
pub struct CosmosProviderConfig {
    pub chain_id: String,
    pub key_name: String,
    pub account_prefix: String,
    pub gas_adjustment: f64,
    pub gas_price: GasPrice,
    /// Gas floor; 0 disables it
    pub min_gas_amount: u64,
    /// Gas cap; 0 disables it
    pub max_gas_amount: u64,
    pub sign_mode: SignMode,
    pub broadcast_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl CosmosProviderConfig {
    pub fn from_config(chain: &ChainConfig, global: &GlobalConfig) -> Result<Self, RelayerError> {
        let broadcast_timeout = global
            .broadcast_timeout()
            .map_err(|e| RelayerError::Config(e.to_string()))?;

        Ok(Self {
            chain_id: chain.chain_id.clone(),
            key_name: chain.key_name.clone(),
            account_prefix: chain.account_prefix.clone(),
            gas_adjustment: chain.gas_adjustment,
            gas_price: GasPrice::parse(&chain.gas_prices)?,
            min_gas_amount: chain.min_gas_amount,
            max_gas_amount: chain.max_gas_amount,
            sign_mode: chain.sign_mode,
            broadcast_timeout,
            poll_interval: global.poll_interval(),
            retry: global.retry_policy(),
        })
    }
}

/// Cosmos SDK chain provider. Cloning is cheap and clones share the
/// sequence cache, fee totals and metrics.
#[derive(Clone)]
pub struct CosmosProvider {
    pub(crate) config: Arc<CosmosProviderConfig>,
    pub(crate) rpc: Arc<dyn ChainRpc>,
    pub(crate) signer: Arc<dyn KeySigner>,
    pub(crate) sequence: SequenceHandle,
    pub(crate) metrics: Option<Arc<RelayerMetrics>>,
    total_fees: Arc<Mutex<BTreeMap<String, u128>>>,
}

impl CosmosProvider {
    /// Create a provider; providers sharing `locks` and a (chain id, key) pair
    /// share one sequence lock.
    pub fn new(
        config: CosmosProviderConfig,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn KeySigner>,
        locks: &KeyLocks,
    ) -> Self {
        let sequence = locks.handle(&config.chain_id, &config.key_name);
        Self {
            config: Arc::new(config),
            rpc,
            signer,
            sequence,
            metrics: None,
            total_fees: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    pub fn key(&self) -> &str {
        &self.config.key_name
    }

    pub fn config(&self) -> &CosmosProviderConfig {
        &self.config
    }

    /// Bech32 address of the signing key
    pub fn address(&self) -> Result<String, RelayerError> {
        self.signer.address(&self.config.account_prefix)
    }

    /// Next sequence the provider will sign with, as currently cached
    pub async fn next_account_sequence(&self) -> u64 {
        self.sequence.lock().await.next_account_sequence
    }

    /// Fees paid so far, per denom
    pub fn total_fees(&self) -> BTreeMap<String, u128> {
        self.total_fees
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Add `fees` to the running totals and export them. A provider without
    /// metrics keeps no totals.
    pub fn update_fees_spent(&self, fees: &[Coin]) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        let totals = {
            let mut totals = self.total_fees.lock().unwrap_or_else(|e| e.into_inner());
            for fee in fees {
                let Ok(amount) = fee.amount.parse::<u128>() else {
                    debug!(denom = %fee.denom, amount = %fee.amount, "skipping unparsable fee");
                    continue;
                };
                *totals.entry(fee.denom.clone()).or_insert(0) += amount;
            }
            totals.clone()
        };

        for (denom, amount) in totals {
            metrics.set_fees_spent(self.chain_id(), self.key(), &denom, amount as f64);
        }
    }

    pub(crate) fn record_rpc_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc_error(self.chain_id());
        }
    }
}
