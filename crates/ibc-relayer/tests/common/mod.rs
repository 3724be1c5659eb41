// In-memory Cosmos chain shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosmos_sdk_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use cosmos_sdk_proto::cosmos::base::abci::v1beta1::GasInfo;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{AuthInfo, SimulateRequest, SimulateResponse, TxRaw};
use ibc_proto::ics23::commitment_proof::Proof;
use ibc_proto::ics23::{CommitmentProof, ExistenceProof, NonExistenceProof};
use prost::Message;
use prost_types::Any;
use sha2::{Digest, Sha256};
use tendermint_proto::crypto::{ProofOp, ProofOps};
use tendermint_proto::types::{Header, SignedHeader, ValidatorSet};

use ibc_tx_relayer::chains::cosmos::{CosmosProviderConfig, GasPrice, DEFAULT_POLL_INTERVAL};
use ibc_tx_relayer::chains::{
    AbciEvent, AbciQueryResponse, BlockInfo, BroadcastFailure, BroadcastTxResponse, ChainRpc,
    LightBlock, TxResult,
};
use ibc_tx_relayer::config::SignMode;
use ibc_tx_relayer::{CosmosProvider, KeyLocks, RelayerError, RetryPolicy, Secp256k1Key};

pub const TEST_KEY_HEX: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
pub const SIMULATED_GAS: u64 = 100_000;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring RUST_LOG, once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What happens to a tx once it is accepted into the mempool
#[derive(Debug, Clone)]
pub enum TxOutcome {
    /// Included with code 0
    Success,
    /// Included with a non-zero code
    Fail { codespace: String, code: u32, log: String },
    /// Never shows up in the index
    NeverIndexed,
    /// The node refuses tx lookups
    IndexingDisabled,
}

/// A tx the mock accepted, as decoded from its wire bytes
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub sequence: u64,
    pub gas_limit: u64,
    pub accepted: bool,
}

struct MockState {
    account_exists: bool,
    account_number: u64,
    sequence: u64,
    latest_height: u64,
    store: HashMap<Vec<u8>, Vec<u8>>,
    searchable: Vec<TxResult>,
    indexed: HashMap<String, TxResult>,
    light_blocks: HashMap<u64, LightBlock>,
    tx_outcome: TxOutcome,
    rejection: Option<(String, u32, String)>,
    broadcasts: Vec<Broadcast>,
    proof_queries: Vec<(u64, Vec<u8>)>,
    light_block_queries: Vec<u64>,
    check_simulation_sequence: bool,
    simulations: usize,
}

pub struct MockChain {
    pub chain_id: String,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(chain_id: &str) -> Arc<Self> {
        Arc::new(Self {
            chain_id: chain_id.to_string(),
            state: Mutex::new(MockState {
                account_exists: true,
                account_number: 12,
                sequence: 0,
                latest_height: 100,
                store: HashMap::new(),
                searchable: vec![],
                indexed: HashMap::new(),
                light_blocks: HashMap::new(),
                tx_outcome: TxOutcome::Success,
                rejection: None,
                broadcasts: vec![],
                proof_queries: vec![],
                light_block_queries: vec![],
                check_simulation_sequence: false,
                simulations: 0,
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_sequence(&self, sequence: u64) {
        self.state().sequence = sequence;
    }

    pub fn sequence(&self) -> u64 {
        self.state().sequence
    }

    pub fn remove_account(&self) {
        self.state().account_exists = false;
    }

    pub fn set_tx_outcome(&self, outcome: TxOutcome) {
        self.state().tx_outcome = outcome;
    }

    /// Reject every broadcast at CheckTx with the given code
    pub fn reject_broadcasts(&self, codespace: &str, code: u32, log: &str) {
        self.state().rejection = Some((codespace.to_string(), code, log.to_string()));
    }

    /// Fail simulations signed with the wrong sequence, as the ante handler does
    pub fn check_simulation_sequence(&self) {
        self.state().check_simulation_sequence = true;
    }

    pub fn simulations(&self) -> usize {
        self.state().simulations
    }

    pub fn set_store(&self, key: Vec<u8>, value: Vec<u8>) {
        self.state().store.insert(key, value);
    }

    /// Make a tx with `events` findable through tx search
    pub fn add_searchable_tx(&self, height: u64, events: Vec<AbciEvent>) {
        let mut state = self.state();
        let hash = format!("{:064X}", state.searchable.len() + 1);
        state.searchable.push(TxResult {
            hash,
            height,
            events,
            ..TxResult::default()
        });
    }

    pub fn add_light_block(&self, height: u64, voting_power: i64) {
        self.state().light_blocks.insert(height, light_block(height, voting_power));
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state().broadcasts.clone()
    }

    pub fn accepted_sequences(&self) -> Vec<u64> {
        self.state()
            .broadcasts
            .iter()
            .filter(|b| b.accepted)
            .map(|b| b.sequence)
            .collect()
    }

    pub fn proof_queries(&self) -> Vec<(u64, Vec<u8>)> {
        self.state().proof_queries.clone()
    }

    pub fn light_block_queries(&self) -> Vec<u64> {
        self.state().light_block_queries.clone()
    }

    fn query_account(&self, data: &[u8]) -> AbciQueryResponse {
        let state = self.state();
        let request = QueryAccountRequest::decode(data).unwrap();
        if !state.account_exists {
            return AbciQueryResponse {
                code: 22,
                codespace: "sdk".to_string(),
                log: format!("account {} not found", request.address),
                ..AbciQueryResponse::default()
            };
        }
        let account = BaseAccount {
            address: request.address,
            pub_key: None,
            account_number: state.account_number,
            sequence: state.sequence,
        };
        let response = QueryAccountResponse {
            account: Some(Any {
                type_url: "/cosmos.auth.v1beta1.BaseAccount".to_string(),
                value: account.encode_to_vec(),
            }),
        };
        AbciQueryResponse {
            value: response.encode_to_vec(),
            height: state.latest_height,
            ..AbciQueryResponse::default()
        }
    }

    fn simulate(&self, data: &[u8]) -> AbciQueryResponse {
        let mut state = self.state();
        state.simulations += 1;

        let request = SimulateRequest::decode(data).unwrap();
        let raw = TxRaw::decode(request.tx_bytes.as_slice()).unwrap();
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap();
        let sequence = auth_info.signer_infos[0].sequence;
        if state.check_simulation_sequence && sequence != state.sequence {
            return AbciQueryResponse {
                code: 32,
                codespace: "sdk".to_string(),
                log: mismatch_log(state.sequence, sequence),
                ..AbciQueryResponse::default()
            };
        }

        let response = SimulateResponse {
            gas_info: Some(GasInfo {
                gas_wanted: 0,
                gas_used: SIMULATED_GAS,
            }),
            result: None,
        };
        AbciQueryResponse {
            value: response.encode_to_vec(),
            ..AbciQueryResponse::default()
        }
    }

    fn query_store(&self, key: Vec<u8>, height: u64) -> AbciQueryResponse {
        let mut state = self.state();
        state.proof_queries.push((height, key.clone()));
        let value = state.store.get(&key).cloned().unwrap_or_default();
        let height = if height == 0 { state.latest_height } else { height };
        let proof = if value.is_empty() {
            Proof::Nonexist(NonExistenceProof {
                key: key.clone(),
                ..Default::default()
            })
        } else {
            Proof::Exist(ExistenceProof {
                key: key.clone(),
                value: value.clone(),
                ..Default::default()
            })
        };
        AbciQueryResponse {
            key: key.clone(),
            value,
            proof_ops: Some(ProofOps {
                ops: vec![ProofOp {
                    r#type: "ics23:iavl".to_string(),
                    key,
                    data: CommitmentProof { proof: Some(proof) }.encode_to_vec(),
                }],
            }),
            height,
            ..AbciQueryResponse::default()
        }
    }
}

fn mismatch_log(expected: u64, got: u64) -> String {
    format!(
        "account sequence mismatch, expected {}, got {}: incorrect account sequence",
        expected, got
    )
}

fn light_block(height: u64, voting_power: i64) -> LightBlock {
    LightBlock {
        signed_header: Some(SignedHeader {
            header: Some(Header {
                height: height as i64,
                ..Default::default()
            }),
            commit: None,
        }),
        validator_set: Some(ValidatorSet {
            total_voting_power: voting_power,
            ..Default::default()
        }),
    }
}

/// Does `event` satisfy every `kind.attr='value'` clause of `query`
fn matches_query(events: &[AbciEvent], query: &str) -> bool {
    query.split(" AND ").all(|clause| {
        let Some((path, value)) = clause.split_once('=') else {
            return false;
        };
        let Some((kind, attr)) = path.trim().split_once('.') else {
            return false;
        };
        let value = value.trim().trim_matches('\'');
        events
            .iter()
            .any(|e| e.kind == kind && e.attribute(attr) == Some(value))
    })
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn abci_query(
        &self,
        path: &str,
        data: Vec<u8>,
        height: u64,
        _prove: bool,
    ) -> Result<AbciQueryResponse, RelayerError> {
        match path {
            "/cosmos.auth.v1beta1.Query/Account" => Ok(self.query_account(&data)),
            "/cosmos.tx.v1beta1.Service/Simulate" => Ok(self.simulate(&data)),
            "store/ibc/key" => Ok(self.query_store(data, height)),
            other => Ok(AbciQueryResponse {
                code: 6,
                codespace: "sdk".to_string(),
                log: format!("unknown query path {}", other),
                ..AbciQueryResponse::default()
            }),
        }
    }

    async fn latest_block(&self) -> Result<BlockInfo, RelayerError> {
        let height = self.state().latest_height;
        Ok(BlockInfo {
            height,
            time: block_time_at(height),
        })
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RelayerError> {
        Ok(block_time_at(height))
    }

    async fn light_block(&self, height: u64) -> Result<LightBlock, RelayerError> {
        let mut state = self.state();
        state.light_block_queries.push(height);
        state
            .light_blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| RelayerError::Rpc(format!("height {} is not available", height)))
    }

    async fn broadcast_tx_sync(&self, tx: Vec<u8>) -> Result<BroadcastTxResponse, BroadcastFailure> {
        let raw = TxRaw::decode(tx.as_slice()).map_err(|e| BroadcastFailure::from(RelayerError::from(e)))?;
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice())
            .map_err(|e| BroadcastFailure::from(RelayerError::from(e)))?;
        let sequence = auth_info.signer_infos[0].sequence;
        let gas_limit = auth_info.fee.map(|f| f.gas_limit).unwrap_or(0);
        let hash = hex::encode_upper(Sha256::digest(&tx));

        let mut state = self.state();

        if let Some((codespace, code, log)) = state.rejection.clone() {
            state.broadcasts.push(Broadcast { sequence, gas_limit, accepted: false });
            return Ok(BroadcastTxResponse {
                code,
                codespace,
                log,
                hash,
                ..BroadcastTxResponse::default()
            });
        }

        if sequence != state.sequence {
            state.broadcasts.push(Broadcast { sequence, gas_limit, accepted: false });
            return Ok(BroadcastTxResponse {
                code: 32,
                codespace: "sdk".to_string(),
                log: mismatch_log(state.sequence, sequence),
                hash,
                ..BroadcastTxResponse::default()
            });
        }

        state.sequence += 1;
        state.latest_height += 1;
        state.broadcasts.push(Broadcast { sequence, gas_limit, accepted: true });

        let (code, codespace, log) = match &state.tx_outcome {
            TxOutcome::Fail { codespace, code, log } => (*code, codespace.clone(), log.clone()),
            _ => (0, String::new(), String::new()),
        };
        let result = TxResult {
            hash: hash.clone(),
            height: state.latest_height,
            code,
            codespace,
            log,
            gas_wanted: gas_limit,
            gas_used: SIMULATED_GAS,
            events: vec![AbciEvent::new("message", &[("sequence", &sequence.to_string())])],
            ..TxResult::default()
        };
        state.indexed.insert(hash.clone(), result);

        Ok(BroadcastTxResponse {
            hash,
            ..BroadcastTxResponse::default()
        })
    }

    async fn tx(&self, hash: &str) -> Result<Option<TxResult>, RelayerError> {
        let state = self.state();
        match state.tx_outcome {
            TxOutcome::NeverIndexed => Ok(None),
            TxOutcome::IndexingDisabled => Err(RelayerError::Rpc(
                "transaction indexing is disabled".to_string(),
            )),
            _ => Ok(state.indexed.get(hash).cloned()),
        }
    }

    async fn tx_search(&self, query: &str) -> Result<Vec<TxResult>, RelayerError> {
        Ok(self
            .state()
            .searchable
            .iter()
            .filter(|tx| matches_query(&tx.events, query))
            .cloned()
            .collect())
    }
}

pub fn block_time_at(height: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + height as i64 * 5, 0).unwrap()
}

pub fn provider_config(chain_id: &str) -> CosmosProviderConfig {
    CosmosProviderConfig {
        chain_id: chain_id.to_string(),
        key_name: "relayer".to_string(),
        account_prefix: "cosmos".to_string(),
        gas_adjustment: 1.5,
        gas_price: GasPrice::parse("0.025uatom").unwrap(),
        min_gas_amount: 0,
        max_gas_amount: 0,
        sign_mode: SignMode::Direct,
        broadcast_timeout: Duration::from_secs(30),
        poll_interval: DEFAULT_POLL_INTERVAL,
        retry: RetryPolicy::default(),
    }
}

pub fn provider_with(chain: &Arc<MockChain>, config: CosmosProviderConfig, locks: &KeyLocks) -> CosmosProvider {
    let signer = Secp256k1Key::from_hex("relayer", TEST_KEY_HEX).unwrap();
    CosmosProvider::new(config, chain.clone(), Arc::new(signer), locks)
}

pub fn provider(chain: &Arc<MockChain>) -> CosmosProvider {
    provider_with(chain, provider_config(&chain.chain_id), &KeyLocks::default())
}
