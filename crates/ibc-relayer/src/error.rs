// Crate-wide error taxonomy for the transaction pipeline and relay engine
use std::time::Duration;

use thiserror::Error;

use crate::relay::packet::PacketError;
use crate::sdk_error::{SdkError, ERR_WRONG_SEQUENCE};

/// Status kind attached to a failed ABCI query, mirroring the gRPC codes a
/// Cosmos node would have answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    InvalidArgument,
    Unauthenticated,
    NotFound,
    Unknown,
}

impl QueryStatus {
    /// Map a root-codespace ABCI code onto a status kind
    pub fn from_abci_code(code: u32) -> Self {
        match code {
            18 => QueryStatus::InvalidArgument,
            4 => QueryStatus::Unauthenticated,
            22 => QueryStatus::NotFound,
            _ => QueryStatus::Unknown,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RelayerError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("abci query failed ({status:?}, codespace {codespace}, code {code}): {log}")]
    AbciQuery {
        status: QueryStatus,
        codespace: String,
        code: u32,
        log: String,
    },

    /// A registered chain error returned for a submitted transaction
    #[error("{error}: {log}")]
    Sdk { error: SdkError, log: String },

    #[error("transaction failed to execute (codespace {codespace}, code {code}): {log}")]
    ExecutionFailed {
        codespace: String,
        code: u32,
        log: String,
    },

    #[error("infinite gas used (gas used {gas_used}, adjustment {adjustment})")]
    InfiniteGas { gas_used: u64, adjustment: f64 },

    #[error("cannot determine success/failure of tx because transaction indexing is disabled on rpc url")]
    TxIndexingDisabled,

    #[error("timed out after {timeout:?} waiting for tx {tx_hash} to be included in a block")]
    ConfirmationTimeout { tx_hash: String, timeout: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to resolve signing key: {0}")]
    KeyResolution(String),

    #[error("account {0} does not exist on chain")]
    AccountNotFound(String),

    #[error("failed to get trusted header, please ensure header at the height {height} has not been pruned by the connected node: {source}")]
    PrunedHeader {
        height: u64,
        source: Box<RelayerError>,
    },

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("invalid query response: {0}")]
    InvalidQueryResponse(String),

    #[error("invalid height: {0}")]
    InvalidHeight(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("decoding error: {0}")]
    Decode(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("all {attempts} attempts failed: {}", .errors.join("; "))]
    RetriesExhausted { attempts: u32, errors: Vec<String> },
}

impl RelayerError {
    /// Whether a retry loop may attempt the failed step again.
    ///
    /// Cancellation, protocol violations and definitive chain answers are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayerError::Cancelled
            | RelayerError::InfiniteGas { .. }
            | RelayerError::TxIndexingDisabled
            | RelayerError::Packet(_)
            | RelayerError::Config(_)
            | RelayerError::ExecutionFailed { .. } => false,
            RelayerError::Sdk { error, .. } => error.is_retryable(),
            _ => true,
        }
    }

    /// Structured (codespace, code) pair if the failure came from the chain
    pub fn abci_code(&self) -> Option<(&str, u32)> {
        match self {
            RelayerError::Sdk { error, .. } => Some((error.codespace, error.code)),
            RelayerError::ExecutionFailed { codespace, code, .. }
            | RelayerError::AbciQuery { codespace, code, .. } => Some((codespace.as_str(), *code)),
            _ => None,
        }
    }

    /// True when the chain rejected the transaction for a wrong account sequence.
    pub fn is_sequence_mismatch(&self) -> bool {
        if let Some((codespace, code)) = self.abci_code() {
            if codespace == ERR_WRONG_SEQUENCE.codespace && code == ERR_WRONG_SEQUENCE.code {
                return true;
            }
        }
        self.to_string().contains(ERR_WRONG_SEQUENCE.description)
    }

    /// Raw chain log carried by the error, falling back to its rendering
    pub fn chain_log(&self) -> String {
        match self {
            RelayerError::Sdk { log, .. }
            | RelayerError::ExecutionFailed { log, .. }
            | RelayerError::AbciQuery { log, .. } => log.clone(),
            other => other.to_string(),
        }
    }
}

impl From<prost::DecodeError> for RelayerError {
    fn from(err: prost::DecodeError) -> Self {
        RelayerError::Decode(err.to_string())
    }
}

impl From<prost::EncodeError> for RelayerError {
    fn from(err: prost::EncodeError) -> Self {
        RelayerError::Encode(err.to_string())
    }
}
