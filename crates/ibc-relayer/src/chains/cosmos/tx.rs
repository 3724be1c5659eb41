// Transaction assembly, signing and the send pipeline
use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode as ProtoSignMode;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{
    mode_info, AuthInfo, Fee, ModeInfo, SignDoc, SignerInfo, TxBody, TxRaw,
};
use prost::Message;
use prost_types::Any;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::chains::TxResponse;
use crate::config::SignMode;
use crate::error::RelayerError;
use crate::message::{type_urls, RelayerMessage};

use super::account::SequenceState;
use super::broadcast::PendingTx;
use super::signer::SECP256K1_PUBKEY_TYPE_URL;
use super::{CosmosProvider, GasPrice};

/// Settings for building one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxFactory {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub gas: u64,
    pub gas_adjustment: f64,
    pub gas_price: GasPrice,
    pub memo: String,
    pub sign_mode: SignMode,
}

impl TxFactory {
    pub fn with_account_number(mut self, account_number: u64) -> Self {
        self.account_number = account_number;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = memo.to_string();
        self
    }

    pub fn fee(&self) -> Fee {
        Fee {
            amount: vec![self.gas_price.fee(self.gas)],
            gas_limit: self.gas,
            payer: String::new(),
            granter: String::new(),
        }
    }
}

/// Body and auth info of a tx, encoded and ready to sign
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx {
    pub body_bytes: Vec<u8>,
    pub auth_info_bytes: Vec<u8>,
    pub fee: Fee,
}

/// Output of the build pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTx {
    pub tx_bytes: Vec<u8>,
    /// Sequence the tx was signed with
    pub sequence: u64,
    pub fees: Vec<Coin>,
}

/// Upper-case hex SHA-256 of the wire bytes
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}

impl CosmosProvider {
    /// Fresh factory carrying this chain's settings
    pub fn tx_factory(&self) -> TxFactory {
        TxFactory {
            chain_id: self.config.chain_id.clone(),
            account_number: 0,
            sequence: 0,
            gas: 0,
            gas_adjustment: self.config.gas_adjustment,
            gas_price: self.config.gas_price.clone(),
            memo: String::new(),
            sign_mode: self.config.sign_mode,
        }
    }

    pub fn build_unsigned_tx(&self, txf: &TxFactory, msgs: &[Any]) -> Result<UnsignedTx, RelayerError> {
        let body = TxBody {
            messages: msgs.to_vec(),
            memo: txf.memo.clone(),
            timeout_height: 0,
            extension_options: vec![],
            non_critical_extension_options: vec![],
        };

        let sign_mode = match txf.sign_mode {
            SignMode::Direct => ProtoSignMode::Direct,
            SignMode::AminoJson => ProtoSignMode::LegacyAminoJson,
        };

        let signer_info = SignerInfo {
            public_key: Some(Any {
                type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
                value: cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey {
                    key: self.signer.public_key(),
                }
                .encode_to_vec(),
            }),
            mode_info: Some(ModeInfo {
                sum: Some(mode_info::Sum::Single(mode_info::Single {
                    mode: sign_mode as i32,
                })),
            }),
            sequence: txf.sequence,
        };

        let fee = txf.fee();
        let auth_info = AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(fee.clone()),
            tip: None,
        };

        Ok(UnsignedTx {
            body_bytes: body.encode_to_vec(),
            auth_info_bytes: auth_info.encode_to_vec(),
            fee,
        })
    }

    /// Sign in SIGN_MODE_DIRECT; legacy amino signing is not supported
    pub fn sign_tx(&self, txf: &TxFactory, unsigned: &UnsignedTx) -> Result<TxRaw, RelayerError> {
        if txf.sign_mode != SignMode::Direct {
            return Err(RelayerError::Config(format!(
                "sign mode {:?} is not supported for signing, use \"direct\"",
                txf.sign_mode
            )));
        }

        let sign_doc = SignDoc {
            body_bytes: unsigned.body_bytes.clone(),
            auth_info_bytes: unsigned.auth_info_bytes.clone(),
            chain_id: txf.chain_id.clone(),
            account_number: txf.account_number,
        };
        let signature = self.signer.sign(&sign_doc.encode_to_vec())?;

        Ok(TxRaw {
            body_bytes: unsigned.body_bytes.clone(),
            auth_info_bytes: unsigned.auth_info_bytes.clone(),
            signatures: vec![signature],
        })
    }

    pub fn encode_tx(&self, tx: &TxRaw) -> Result<Vec<u8>, RelayerError> {
        let mut buf = Vec::with_capacity(tx.encoded_len());
        tx.encode(&mut buf)?;
        Ok(buf)
    }

    /// Unsigned tx with one empty signature, as accepted by the simulate endpoint
    pub fn build_sim_tx(&self, txf: &TxFactory, msgs: &[Any]) -> Result<Vec<u8>, RelayerError> {
        let unsigned = self.build_unsigned_tx(txf, msgs)?;
        let raw = TxRaw {
            body_bytes: unsigned.body_bytes,
            auth_info_bytes: unsigned.auth_info_bytes,
            signatures: vec![vec![]],
        };
        self.encode_tx(&raw)
    }

    /// Prepare, simulate, build, sign and encode `msgs` under the locked `state`
    pub async fn build_messages(
        &self,
        state: &mut SequenceState,
        msgs: &[Box<dyn RelayerMessage>],
        memo: &str,
        cancel: &Cancellation,
    ) -> Result<BuiltTx, RelayerError> {
        let policy = self.config.retry;
        let mut txf = self.prepare_factory(self.tx_factory(), cancel).await?;

        if !memo.is_empty() {
            txf = txf.with_memo(memo);
        }

        let mut sequence = txf.sequence;
        state.update_next_account_sequence(sequence);
        if sequence < state.next_account_sequence {
            sequence = state.next_account_sequence;
            txf = txf.with_sequence(sequence);
        }
        state.account_number = txf.account_number;

        let anys = msgs
            .iter()
            .map(|m| m.to_proto_any())
            .collect::<Result<Vec<_>, _>>()?;

        let (_, adjusted) = self.calculate_gas(&txf, &anys, cancel).await?;
        txf = txf.with_gas(adjusted.max(self.config.min_gas_amount));

        let unsigned = policy
            .retry("build unsigned tx", cancel, || async {
                self.build_unsigned_tx(&txf, &anys)
            })
            .await?;

        let signed = policy
            .retry("sign tx", cancel, || async { self.sign_tx(&txf, &unsigned) })
            .await?;

        let tx_bytes = policy
            .retry("encode tx", cancel, || async { self.encode_tx(&signed) })
            .await?;

        debug!(
            chain_id = %self.config.chain_id,
            sequence,
            gas = txf.gas,
            msgs = ?type_urls(msgs),
            "built transaction"
        );

        Ok(BuiltTx {
            tx_bytes,
            sequence,
            fees: unsigned.fee.amount,
        })
    }

    /// Build and broadcast `msgs`, returning once the tx is in the mempool.
    ///
    /// The per-key lock is held from account lookup through broadcast. The
    /// returned [`PendingTx`] resolves when the tx lands in a block, the wait
    /// times out, or `wait_cancel` fires.
    pub async fn submit_messages(
        &self,
        msgs: &[Box<dyn RelayerMessage>],
        memo: &str,
        cancel: &Cancellation,
        wait_cancel: Cancellation,
    ) -> Result<PendingTx, RelayerError> {
        let mut state = cancel
            .guard(async { Ok(self.sequence.lock().await) })
            .await?;

        let built = match self.build_messages(&mut state, msgs, memo, cancel).await {
            Ok(built) => built,
            Err(err) => {
                // mismatches also surface from simulation
                if err.is_sequence_mismatch() {
                    self.handle_account_sequence_mismatch(&mut state, &err);
                }
                return Err(err);
            }
        };

        let pending = match self
            .broadcast_tx(built.tx_bytes, type_urls(msgs), &built.fees, cancel, wait_cancel)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                if err.is_sequence_mismatch() {
                    self.handle_account_sequence_mismatch(&mut state, &err);
                }
                return Err(err);
            }
        };

        state.update_next_account_sequence(built.sequence + 1);
        Ok(pending.with_sequence(built.sequence))
    }

    /// Callback flavour of [`CosmosProvider::submit_messages`].
    ///
    /// `callback` runs exactly once from a spawned task: with the confirmation
    /// outcome when the tx was accepted, or with the rejection error, which is
    /// also returned.
    pub async fn send_messages_to_mempool<F>(
        &self,
        msgs: &[Box<dyn RelayerMessage>],
        memo: &str,
        cancel: &Cancellation,
        wait_cancel: Cancellation,
        callback: F,
    ) -> Result<(), RelayerError>
    where
        F: FnOnce(Result<TxResponse, RelayerError>) + Send + 'static,
    {
        match self.submit_messages(msgs, memo, cancel, wait_cancel).await {
            Ok(pending) => {
                tokio::spawn(async move {
                    let outcome = pending.wait().await.into_result();
                    callback(outcome);
                });
                Ok(())
            }
            Err(err) => {
                let reported = err.clone();
                tokio::spawn(async move { callback(Err(reported)) });
                Err(err)
            }
        }
    }

    /// Sign, broadcast and wait for `msgs` to be included in a block.
    ///
    /// Submission is retried as a whole, so a sequence resynchronised by a
    /// failed attempt is used by the next one. `Ok` means the tx executed
    /// with code 0.
    pub async fn send_messages(
        &self,
        msgs: &[Box<dyn RelayerMessage>],
        memo: &str,
        cancel: &Cancellation,
    ) -> Result<TxResponse, RelayerError> {
        let chain_id = self.config.chain_id.clone();
        let pending = self
            .config
            .retry
            .retry_submission(
                "send messages",
                cancel,
                || self.submit_messages(msgs, memo, cancel, cancel.clone()),
                |attempt, err| {
                    info!(
                        chain_id = %chain_id,
                        attempt = attempt + 1,
                        max_attempts = self.config.retry.max_attempts,
                        error = %err,
                        "error building or broadcasting transaction"
                    );
                },
            )
            .await?;

        let response = pending.wait().await.into_result()?;
        if response.code != 0 {
            return Err(RelayerError::ExecutionFailed {
                codespace: response.codespace.clone(),
                code: response.code,
                log: format!("transaction failed with code: {}", response.code),
            });
        }
        Ok(response)
    }

    pub async fn send_message(
        &self,
        msg: Box<dyn RelayerMessage>,
        memo: &str,
        cancel: &Cancellation,
    ) -> Result<TxResponse, RelayerError> {
        self.send_messages(&[msg], memo, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::cosmos::test_support::{test_config, test_provider};
    use cosmos_sdk_proto::cosmos::tx::v1beta1::AuthInfo;

    fn factory(provider: &CosmosProvider) -> TxFactory {
        provider
            .tx_factory()
            .with_account_number(7)
            .with_sequence(3)
            .with_gas(200_000)
    }

    #[test]
    fn test_unsigned_tx_carries_sequence_and_fee() {
        let provider = test_provider(test_config());
        let txf = factory(&provider).with_memo("relayed");
        let msg = Any {
            type_url: "/ibc.core.channel.v1.MsgRecvPacket".to_string(),
            value: vec![1, 2, 3],
        };

        let unsigned = provider.build_unsigned_tx(&txf, &[msg.clone()]).unwrap();
        let body = TxBody::decode(unsigned.body_bytes.as_slice()).unwrap();
        assert_eq!(body.memo, "relayed");
        assert_eq!(body.messages, vec![msg]);

        let auth = AuthInfo::decode(unsigned.auth_info_bytes.as_slice()).unwrap();
        assert_eq!(auth.signer_infos[0].sequence, 3);
        let fee = auth.fee.unwrap();
        assert_eq!(fee.gas_limit, 200_000);
        assert_eq!(fee.amount[0].amount, "5000");
        assert_eq!(fee.amount[0].denom, "uatom");
    }

    #[test]
    fn test_signed_tx_encodes_and_hashes() {
        let provider = test_provider(test_config());
        let txf = factory(&provider);
        let unsigned = provider.build_unsigned_tx(&txf, &[]).unwrap();
        let signed = provider.sign_tx(&txf, &unsigned).unwrap();
        assert_eq!(signed.signatures[0].len(), 64);

        let bytes = provider.encode_tx(&signed).unwrap();
        assert_eq!(TxRaw::decode(bytes.as_slice()).unwrap(), signed);

        let hash = tx_hash(&bytes);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash.to_uppercase());
    }

    #[test]
    fn test_amino_json_cannot_sign() {
        let mut config = test_config();
        config.sign_mode = SignMode::AminoJson;
        let provider = test_provider(config);
        let txf = factory(&provider);
        let unsigned = provider.build_unsigned_tx(&txf, &[]).unwrap();
        assert!(matches!(
            provider.sign_tx(&txf, &unsigned),
            Err(RelayerError::Config(_))
        ));
    }

    #[test]
    fn test_sim_tx_has_empty_signature() {
        let provider = test_provider(test_config());
        let bytes = provider.build_sim_tx(&factory(&provider), &[]).unwrap();
        let raw = TxRaw::decode(bytes.as_slice()).unwrap();
        assert_eq!(raw.signatures, vec![Vec::<u8>::new()]);
    }
}
