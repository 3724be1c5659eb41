// Mempool submission and the block-inclusion wait
use std::time::Duration;

use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cancel::Cancellation;
use crate::chains::{TxResponse, TxResult};
use crate::error::RelayerError;
use crate::sdk_error::resolve_known_error;

use super::tx::tx_hash;
use super::CosmosProvider;

const INDEXING_DISABLED: &str = "transaction indexing is disabled";

/// Final outcome of waiting for a broadcast tx
#[derive(Debug, Clone)]
pub enum TxConfirmation {
    /// Included with code 0
    Confirmed(TxResponse),
    /// Included with a non-zero code, in which case `response` carries the
    /// hash, height and code of the failed tx, or the wait itself failed
    Failed {
        response: Option<TxResponse>,
        error: RelayerError,
    },
    TimedOut { tx_hash: String, timeout: Duration },
}

impl TxConfirmation {
    pub fn into_result(self) -> Result<TxResponse, RelayerError> {
        match self {
            TxConfirmation::Confirmed(res) => Ok(res),
            TxConfirmation::Failed { error, .. } => Err(error),
            TxConfirmation::TimedOut { tx_hash, timeout } => {
                Err(RelayerError::ConfirmationTimeout { tx_hash, timeout })
            }
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            TxConfirmation::Confirmed(_) => "confirmed",
            TxConfirmation::Failed { .. } => "failed",
            TxConfirmation::TimedOut { .. } => "timed_out",
        }
    }
}

/// A tx accepted into the mempool whose inclusion is being awaited by a
/// background task
#[derive(Debug)]
pub struct PendingTx {
    tx_hash: String,
    sequence: u64,
    handle: JoinHandle<TxConfirmation>,
}

impl PendingTx {
    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    /// Sequence the tx was signed with
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub async fn wait(self) -> TxConfirmation {
        match self.handle.await {
            Ok(confirmation) => confirmation,
            Err(e) => TxConfirmation::Failed {
                response: None,
                error: RelayerError::Rpc(format!(
                    "confirmation task for {} aborted: {}",
                    self.tx_hash, e
                )),
            },
        }
    }
}

/// Error for a tx answered with a non-zero code: the registered chain error if
/// there is one, a generic execution failure otherwise
pub fn tx_code_error(codespace: &str, code: u32, log: &str) -> RelayerError {
    match resolve_known_error(codespace, code) {
        Some(error) => RelayerError::Sdk {
            error,
            log: log.to_string(),
        },
        None => RelayerError::ExecutionFailed {
            codespace: codespace.to_string(),
            code,
            log: if log.is_empty() {
                "transaction failed to execute".to_string()
            } else {
                log.to_string()
            },
        },
    }
}

impl CosmosProvider {
    /// Submit signed tx bytes to the mempool.
    ///
    /// A rejection (transport error or non-zero CheckTx code) is returned
    /// directly. Acceptance spawns the confirmation task, bounded by the
    /// configured broadcast timeout and `wait_cancel`.
    pub async fn broadcast_tx(
        &self,
        tx_bytes: Vec<u8>,
        msg_types: Vec<String>,
        fees: &[Coin],
        cancel: &Cancellation,
        wait_cancel: Cancellation,
    ) -> Result<PendingTx, RelayerError> {
        let local_hash = tx_hash(&tx_bytes);

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayerError::Cancelled),
            res = self.rpc.broadcast_tx_sync(tx_bytes) => res,
        };

        let res = match submitted {
            Ok(res) => res,
            Err(failure) => {
                self.record_broadcast(false);
                let Some(res) = failure.response else {
                    self.record_rpc_error();
                    return Err(failure.error);
                };
                let err = if res.code != 0 {
                    tx_code_error(&res.codespace, res.code, &res.log)
                } else {
                    failure.error
                };
                self.log_failed_tx(&res.hash, 0, res.code, &err, &msg_types);
                return Err(err);
            }
        };

        if res.code != 0 {
            self.record_broadcast(false);
            let err = tx_code_error(&res.codespace, res.code, &res.log);
            self.log_failed_tx(&res.hash, 0, res.code, &err, &msg_types);
            return Err(err);
        }

        self.record_broadcast(true);
        self.update_fees_spent(fees);

        let hash = if res.hash.is_empty() { local_hash } else { res.hash };
        debug!(chain_id = %self.chain_id(), tx_hash = %hash, "transaction accepted into mempool");

        let provider = self.clone();
        let wait_hash = hash.clone();
        let handle = tokio::spawn(async move {
            provider.wait_for_tx(&wait_hash, &msg_types, &wait_cancel).await
        });

        Ok(PendingTx {
            tx_hash: hash,
            sequence: 0,
            handle,
        })
    }

    /// Wait for inclusion, then log and classify the outcome
    async fn wait_for_tx(
        &self,
        hash: &str,
        msg_types: &[String],
        cancel: &Cancellation,
    ) -> TxConfirmation {
        let timeout = self.config.broadcast_timeout;
        let confirmation = match self.wait_for_block_inclusion(hash, timeout, cancel).await {
            Ok(res) if res.code == 0 => {
                self.log_success_tx(&res, msg_types);
                TxConfirmation::Confirmed(TxResponse::from_tx_result(&res))
            }
            Ok(res) => {
                let err = tx_code_error(&res.codespace, res.code, &res.log);
                self.log_failed_tx(hash, res.height, res.code, &err, msg_types);
                TxConfirmation::Failed {
                    response: Some(TxResponse::from_tx_result(&res)),
                    error: err,
                }
            }
            Err(RelayerError::ConfirmationTimeout { tx_hash, timeout }) => {
                error!(
                    chain_id = %self.chain_id(),
                    tx_hash = %tx_hash,
                    ?timeout,
                    "failed to wait for block inclusion"
                );
                TxConfirmation::TimedOut { tx_hash, timeout }
            }
            Err(err) => {
                error!(
                    chain_id = %self.chain_id(),
                    tx_hash = %hash,
                    error = %err,
                    "failed to wait for block inclusion"
                );
                TxConfirmation::Failed {
                    response: None,
                    error: err,
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_confirmation(self.chain_id(), confirmation.outcome());
        }
        confirmation
    }

    /// Poll the node for `hash` until found, `timeout` elapses or `cancel` fires
    pub async fn wait_for_block_inclusion(
        &self,
        hash: &str,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<TxResult, RelayerError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelayerError::Cancelled),
                _ = &mut deadline => {
                    return Err(RelayerError::ConfirmationTimeout {
                        tx_hash: hash.to_string(),
                        timeout,
                    });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match cancel.guard(self.rpc.tx(hash)).await {
                        Ok(Some(res)) => return Ok(res),
                        Ok(None) => {}
                        Err(RelayerError::Cancelled) => return Err(RelayerError::Cancelled),
                        Err(err) if err.to_string().contains(INDEXING_DISABLED) => {
                            return Err(RelayerError::TxIndexingDisabled);
                        }
                        Err(err) => {
                            self.record_rpc_error();
                            debug!(chain_id = %self.chain_id(), tx_hash = %hash, error = %err, "tx lookup failed");
                        }
                    }
                }
            }
        }
    }

    fn record_broadcast(&self, accepted: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_broadcast(self.chain_id(), accepted);
        }
    }

    fn log_success_tx(&self, res: &TxResult, msg_types: &[String]) {
        info!(
            chain_id = %self.chain_id(),
            tx_hash = %res.hash,
            height = res.height,
            gas_wanted = res.gas_wanted,
            gas_used = res.gas_used,
            msgs = ?msg_types,
            "successful transaction"
        );
    }

    fn log_failed_tx(&self, hash: &str, height: u64, code: u32, err: &RelayerError, msg_types: &[String]) {
        if err.is_sequence_mismatch() {
            warn!(
                chain_id = %self.chain_id(),
                tx_hash = %hash,
                code,
                msgs = ?msg_types,
                error = %err,
                "transaction rejected for account sequence"
            );
            return;
        }
        error!(
            chain_id = %self.chain_id(),
            tx_hash = %hash,
            height,
            code,
            msgs = ?msg_types,
            error = %err,
            "failed sending transaction"
        );
    }
}
