// Chain-facing types: the narrow RPC seam and the records it returns
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tendermint_proto::crypto::ProofOps;
use tendermint_proto::types::{SignedHeader, ValidatorSet};

use crate::error::RelayerError;

pub mod cosmos;

pub use cosmos::CosmosProvider;

/// Transport operations the relayer consumes from a chain node.
///
/// Implementations wrap a Tendermint RPC / gRPC client; the crate never speaks
/// a transport itself.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// ABCI query at `height` (0 = latest), optionally with a Merkle proof
    async fn abci_query(
        &self,
        path: &str,
        data: Vec<u8>,
        height: u64,
        prove: bool,
    ) -> Result<AbciQueryResponse, RelayerError>;

    /// Height and time of the latest block
    async fn latest_block(&self) -> Result<BlockInfo, RelayerError>;

    /// Time of the block at `height`
    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RelayerError>;

    /// Signed header plus validator set at `height`
    async fn light_block(&self, height: u64) -> Result<LightBlock, RelayerError>;

    /// Submit to the mempool and wait for CheckTx
    async fn broadcast_tx_sync(&self, tx: Vec<u8>) -> Result<BroadcastTxResponse, BroadcastFailure>;

    /// Look a tx up by upper-case hex hash; `Ok(None)` while it is not yet indexed
    async fn tx(&self, hash: &str) -> Result<Option<TxResult>, RelayerError>;

    /// Search indexed txs by event query
    async fn tx_search(&self, query: &str) -> Result<Vec<TxResult>, RelayerError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbciQueryResponse {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub proof_ops: Option<ProofOps>,
    pub height: u64,
}

impl AbciQueryResponse {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockInfo {
    pub height: u64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightBlock {
    pub signed_header: Option<SignedHeader>,
    pub validator_set: Option<ValidatorSet>,
}

impl LightBlock {
    /// Height of the signed header, 0 when absent
    pub fn height(&self) -> u64 {
        self.signed_header
            .as_ref()
            .and_then(|sh| sh.header.as_ref())
            .map(|h| h.height.max(0) as u64)
            .unwrap_or(0)
    }
}

/// CheckTx answer for a submitted tx
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastTxResponse {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub data: Vec<u8>,
    pub hash: String,
}

/// A submission error; `response` is set when the node still answered.
#[derive(Debug, Clone)]
pub struct BroadcastFailure {
    pub error: RelayerError,
    pub response: Option<BroadcastTxResponse>,
}

impl From<RelayerError> for BroadcastFailure {
    fn from(error: RelayerError) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

/// An ABCI event emitted by a tx
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbciEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl AbciEvent {
    pub fn new(kind: &str, attributes: &[(&str, &str)]) -> Self {
        Self {
            kind: kind.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An indexed tx as returned by `tx` / `tx_search`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxResult {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub data: Vec<u8>,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<AbciEvent>,
}

/// Event of a confirmed tx, flattened for callers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayerEvent {
    pub event_type: String,
    pub attributes: HashMap<String, String>,
}

/// Outcome of a broadcast tx
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxResponse {
    pub height: u64,
    pub tx_hash: String,
    pub codespace: String,
    pub code: u32,
    pub data: String,
    pub events: Vec<RelayerEvent>,
}

impl TxResponse {
    pub fn from_tx_result(res: &TxResult) -> Self {
        Self {
            height: res.height,
            tx_hash: res.hash.clone(),
            codespace: res.codespace.clone(),
            code: res.code,
            data: hex::encode_upper(&res.data),
            events: parse_events(&res.events),
        }
    }
}

/// Flatten tx events into relayer events; later duplicate keys win.
pub fn parse_events(events: &[AbciEvent]) -> Vec<RelayerEvent> {
    events
        .iter()
        .map(|event| RelayerEvent {
            event_type: event.kind.clone(),
            attributes: event.attributes.iter().cloned().collect(),
        })
        .collect()
}
