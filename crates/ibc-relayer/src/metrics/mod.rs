// Metrics for the transaction pipeline
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Relayer metrics. Providers hold an `Option<Arc<RelayerMetrics>>`, so an
/// unconfigured relayer simply skips every update.
pub struct RelayerMetrics {
    // Fee metrics
    pub fees_spent: GaugeVec,

    // Tx metrics
    pub broadcasts: IntCounterVec,
    pub confirmations: IntCounterVec,

    // Chain metrics
    pub rpc_errors: IntCounterVec,

    registry: Arc<Registry>,
}

impl RelayerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let fees_spent = GaugeVec::new(
            Opts::new("ibc_fees_spent", "Total fees spent by a relayer key"),
            &["chain_id", "key", "denom"],
        )?;
        let broadcasts = IntCounterVec::new(
            Opts::new("ibc_tx_broadcasts_total", "Transactions submitted to the mempool"),
            &["chain_id", "outcome"],
        )?;
        let confirmations = IntCounterVec::new(
            Opts::new("ibc_tx_confirmations_total", "Outcomes of waiting for block inclusion"),
            &["chain_id", "outcome"],
        )?;
        let rpc_errors = IntCounterVec::new(
            Opts::new("ibc_rpc_errors_total", "Total RPC errors"),
            &["chain_id"],
        )?;

        registry.register(Box::new(fees_spent.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(rpc_errors.clone()))?;

        Ok(Self {
            fees_spent,
            broadcasts,
            confirmations,
            rpc_errors,
            registry,
        })
    }

    pub fn set_fees_spent(&self, chain_id: &str, key: &str, denom: &str, amount: f64) {
        self.fees_spent
            .with_label_values(&[chain_id, key, denom])
            .set(amount);
    }

    pub fn record_broadcast(&self, chain_id: &str, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.broadcasts.with_label_values(&[chain_id, outcome]).inc();
    }

    /// `outcome` is one of "confirmed", "failed" or "timed_out"
    pub fn record_confirmation(&self, chain_id: &str, outcome: &str) {
        self.confirmations
            .with_label_values(&[chain_id, outcome])
            .inc();
    }

    pub fn record_rpc_error(&self, chain_id: &str) {
        self.rpc_errors.with_label_values(&[chain_id]).inc();
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}
