// Account resolution and the per-key sequence cache
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use cosmos_sdk_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountRequest, QueryAccountResponse};
use prost::Message;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::error::{QueryStatus, RelayerError};

use super::tx::TxFactory;
use super::CosmosProvider;

const QUERY_ACCOUNT_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";
const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";

/// Per-key signing state, only touched while holding its lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceState {
    /// Next sequence the key may sign with; 0 until first learned from the chain
    pub next_account_sequence: u64,
    /// Account number cached from the last successful lookup
    pub account_number: u64,
}

impl SequenceState {
    /// Advance the cache, never moving it backwards
    pub fn update_next_account_sequence(&mut self, sequence: u64) {
        if sequence > self.next_account_sequence {
            self.next_account_sequence = sequence;
        }
    }

    /// Resynchronise from a mismatch error such as
    /// "account sequence mismatch, expected 10, got 9: incorrect account sequence".
    ///
    /// Returns the new value, or `None` when the error did not carry exactly
    /// two numbers and the cache was left untouched.
    pub fn handle_account_sequence_mismatch(&mut self, err: &RelayerError) -> Option<u64> {
        let expected = parse_expected_sequence(&err.chain_log())?;
        self.next_account_sequence = expected;
        Some(expected)
    }
}

/// Exclusive lock around one key's [`SequenceState`], held from account
/// lookup through broadcast.
pub type SequenceHandle = Arc<Mutex<SequenceState>>;

/// Registry handing out one [`SequenceHandle`] per (chain id, key name).
#[derive(Debug, Clone, Default)]
pub struct KeyLocks {
    handles: Arc<StdMutex<HashMap<(String, String), SequenceHandle>>>,
}

impl KeyLocks {
    pub fn handle(&self, chain_id: &str, key_name: &str) -> SequenceHandle {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles
            .entry((chain_id.to_string(), key_name.to_string()))
            .or_default()
            .clone()
    }
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[0-9]+").expect("static regex"))
}

/// First of exactly two numbers in a sequence-mismatch message
pub fn parse_expected_sequence(text: &str) -> Option<u64> {
    let numbers: Vec<&str> = number_regex().find_iter(text).map(|m| m.as_str()).collect();
    if numbers.len() != 2 {
        return None;
    }
    numbers[0].parse().ok()
}

impl CosmosProvider {
    /// Fill in account number, sequence and gas floor on `txf`.
    ///
    /// The chain is only asked for account number and sequence when one of
    /// them is still unset, and only the unset ones are overwritten.
    pub async fn prepare_factory(
        &self,
        mut txf: TxFactory,
        cancel: &Cancellation,
    ) -> Result<TxFactory, RelayerError> {
        let policy = self.config.retry;

        let from = policy
            .retry("get key address", cancel, || async { self.get_key_address() })
            .await?;

        policy
            .retry("ensure account exists", cancel, || self.ensure_exists(&from))
            .await?;

        if txf.account_number == 0 || txf.sequence == 0 {
            let (num, seq) = policy
                .retry("query account", cancel, || {
                    self.get_account_number_sequence(&from)
                })
                .await?;

            if txf.account_number == 0 {
                txf = txf.with_account_number(num);
            }
            if txf.sequence == 0 {
                txf = txf.with_sequence(seq);
            }
        }

        if self.config.min_gas_amount != 0 {
            txf = txf.with_gas(self.config.min_gas_amount);
        }

        debug!(
            chain_id = %self.config.chain_id,
            address = %from,
            account_number = txf.account_number,
            sequence = txf.sequence,
            "prepared tx factory"
        );
        Ok(txf)
    }

    pub fn get_key_address(&self) -> Result<String, RelayerError> {
        self.address()
    }

    /// Fail unless `address` has an account on chain
    pub async fn ensure_exists(&self, address: &str) -> Result<(), RelayerError> {
        self.query_account(address).await.map(|_| ())
    }

    pub async fn get_account_number_sequence(
        &self,
        address: &str,
    ) -> Result<(u64, u64), RelayerError> {
        let account = self.query_account(address).await?;
        Ok((account.account_number, account.sequence))
    }

    async fn query_account(&self, address: &str) -> Result<BaseAccount, RelayerError> {
        let request = QueryAccountRequest {
            address: address.to_string(),
        };
        let res = match self
            .query_abci(QUERY_ACCOUNT_PATH, request.encode_to_vec(), 0, false)
            .await
        {
            Ok(res) => res,
            Err(RelayerError::AbciQuery { status, log, .. })
                if status == QueryStatus::NotFound || log.contains("not found") =>
            {
                return Err(RelayerError::AccountNotFound(address.to_string()));
            }
            Err(e) => return Err(e),
        };

        let response = QueryAccountResponse::decode(res.value.as_slice())?;
        let account = response
            .account
            .ok_or_else(|| RelayerError::AccountNotFound(address.to_string()))?;

        if account.type_url != BASE_ACCOUNT_TYPE_URL {
            return Err(RelayerError::Decode(format!(
                "unsupported account type {}",
                account.type_url
            )));
        }
        Ok(BaseAccount::decode(account.value.as_slice())?)
    }

    /// Apply a mismatch error to the locked sequence state and log the outcome
    pub(crate) fn handle_account_sequence_mismatch(
        &self,
        state: &mut SequenceState,
        err: &RelayerError,
    ) {
        let previous = state.next_account_sequence;
        match state.handle_account_sequence_mismatch(err) {
            Some(expected) => info!(
                chain_id = %self.config.chain_id,
                key = %self.config.key_name,
                previous,
                expected,
                "resynchronised account sequence"
            ),
            None => warn!(
                chain_id = %self.config.chain_id,
                error = %err,
                "could not parse expected sequence from mismatch error"
            ),
        }
    }
}
