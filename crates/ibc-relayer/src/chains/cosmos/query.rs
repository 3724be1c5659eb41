// ABCI queries, ICS-24 store proofs and packet record lookups
use chrono::{DateTime, Utc};
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::core::channel::v1::Channel;
use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use ibc_proto::ibc::core::connection::v1::ConnectionEnd;
use ibc_proto::ibc::lightclients::tendermint::v1::ClientState;
use ibc_proto::ics23::CommitmentProof;
use prost::Message;
use tracing::{debug, warn};

use crate::chains::{AbciEvent, AbciQueryResponse, BlockInfo, TxResult};
use crate::error::{QueryStatus, RelayerError};
use crate::proto::TypeUrl;
use crate::relay::packet::{parse_chain_id, Height, PacketInfo};
use crate::relay::proof::{IcqProof, PacketProof};

use super::CosmosProvider;

/// ABCI path of raw IBC store reads
pub const IBC_STORE_PATH: &str = "store/ibc/key";

pub fn packet_commitment_key(port_id: &str, channel_id: &str, sequence: u64) -> Vec<u8> {
    format!("commitments/ports/{}/channels/{}/sequences/{}", port_id, channel_id, sequence).into_bytes()
}

pub fn packet_acknowledgement_key(port_id: &str, channel_id: &str, sequence: u64) -> Vec<u8> {
    format!("acks/ports/{}/channels/{}/sequences/{}", port_id, channel_id, sequence).into_bytes()
}

pub fn packet_receipt_key(port_id: &str, channel_id: &str, sequence: u64) -> Vec<u8> {
    format!("receipts/ports/{}/channels/{}/sequences/{}", port_id, channel_id, sequence).into_bytes()
}

pub fn next_sequence_recv_key(port_id: &str, channel_id: &str) -> Vec<u8> {
    format!("nextSequenceRecv/ports/{}/channels/{}", port_id, channel_id).into_bytes()
}

pub fn client_state_key(client_id: &str) -> Vec<u8> {
    format!("clients/{}/clientState", client_id).into_bytes()
}

pub fn consensus_state_key(client_id: &str, height: Height) -> Vec<u8> {
    format!(
        "clients/{}/consensusStates/{}-{}",
        client_id, height.revision_number, height.revision_height
    )
    .into_bytes()
}

pub fn connection_key(connection_id: &str) -> Vec<u8> {
    format!("connections/{}", connection_id).into_bytes()
}

pub fn channel_key(port_id: &str, channel_id: &str) -> Vec<u8> {
    format!("channelEnds/ports/{}/channels/{}", port_id, channel_id).into_bytes()
}

/// True for `/store/<store>/key`, the only query form whose answer must carry
/// a Merkle proof.
pub fn is_query_store_with_proof(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let parts: Vec<&str> = rest.splitn(3, '/').collect();
    parts.len() == 3 && parts[0] == "store" && parts[2] == "key"
}

impl CosmosProvider {
    /// Run an ABCI query; a non-zero code becomes [`RelayerError::AbciQuery`]
    /// with a status kind derived from the code.
    pub async fn query_abci(
        &self,
        path: &str,
        data: Vec<u8>,
        height: u64,
        prove: bool,
    ) -> Result<AbciQueryResponse, RelayerError> {
        let res = match self.rpc.abci_query(path, data, height, prove).await {
            Ok(res) => res,
            Err(e) => {
                self.record_rpc_error();
                return Err(e);
            }
        };

        if !res.is_ok() {
            return Err(RelayerError::AbciQuery {
                status: QueryStatus::from_abci_code(res.code),
                codespace: res.codespace,
                code: res.code,
                log: res.log,
            });
        }

        if prove && is_query_store_with_proof(path) && res.proof_ops.is_none() {
            return Err(RelayerError::InvalidQueryResponse(format!(
                "query {} returned no proof",
                path
            )));
        }

        Ok(res)
    }

    /// Read `key` from the IBC store with a proof.
    ///
    /// Each Tendermint proof op carries one ics23 commitment proof; together
    /// they form the Merkle proof IBC messages expect.
    ///
    /// The store is read at `height - 1` since the app hash of block H commits
    /// to state H-1; the returned proof height is therefore response height + 1
    /// under this chain's revision. Heights 1 and 2 cannot be proven.
    pub async fn query_tendermint_proof(
        &self,
        height: u64,
        key: Vec<u8>,
    ) -> Result<(Vec<u8>, Vec<u8>, Height), RelayerError> {
        if height != 0 && height <= 2 {
            return Err(RelayerError::InvalidHeight(
                "proof queries at height <= 2 are not supported".to_string(),
            ));
        }
        let query_height = height.saturating_sub(1);

        let res = self.query_abci(IBC_STORE_PATH, key, query_height, true).await?;

        let proof_ops = res
            .proof_ops
            .ok_or_else(|| RelayerError::InvalidQueryResponse("tendermint proof is nil".to_string()))?;
        let proofs = proof_ops
            .ops
            .iter()
            .map(|op| CommitmentProof::decode(op.data.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;
        let merkle_proof = MerkleProof { proofs };

        let revision = parse_chain_id(self.chain_id());
        let proof_height = Height::new(revision, res.height + 1);

        Ok((res.value, merkle_proof.encode_to_vec(), proof_height))
    }

    /// Commitment proof for a sent packet; an absent commitment is an error
    pub async fn packet_commitment(
        &self,
        packet: &PacketInfo,
        height: u64,
    ) -> Result<PacketProof, RelayerError> {
        let key = packet_commitment_key(&packet.source_port, &packet.source_channel, packet.sequence);
        let (commitment, proof, proof_height) = self.query_tendermint_proof(height, key).await?;
        if commitment.is_empty() {
            return Err(RelayerError::InvalidQueryResponse(
                "packet commitment not found".to_string(),
            ));
        }
        Ok(PacketProof { proof, proof_height })
    }

    pub async fn packet_acknowledgement(
        &self,
        packet: &PacketInfo,
        height: u64,
    ) -> Result<PacketProof, RelayerError> {
        let key = packet_acknowledgement_key(&packet.dest_port, &packet.dest_channel, packet.sequence);
        let (ack, proof, proof_height) = self.query_tendermint_proof(height, key).await?;
        if ack.is_empty() {
            return Err(RelayerError::InvalidQueryResponse(
                "invalid acknowledgement".to_string(),
            ));
        }
        Ok(PacketProof { proof, proof_height })
    }

    /// Receipt proof on the destination; an empty value proves non-receipt
    pub async fn packet_receipt(
        &self,
        packet: &PacketInfo,
        height: u64,
    ) -> Result<PacketProof, RelayerError> {
        let key = packet_receipt_key(&packet.dest_port, &packet.dest_channel, packet.sequence);
        let (_, proof, proof_height) = self.query_tendermint_proof(height, key).await?;
        Ok(PacketProof { proof, proof_height })
    }

    /// Proof of the destination's next expected sequence on an ordered channel
    pub async fn next_seq_recv(
        &self,
        packet: &PacketInfo,
        height: u64,
    ) -> Result<PacketProof, RelayerError> {
        let key = next_sequence_recv_key(&packet.dest_port, &packet.dest_channel);
        let (_, proof, proof_height) = self.query_tendermint_proof(height, key).await?;
        Ok(PacketProof { proof, proof_height })
    }

    /// The send_packet record for `sequence` on the source channel
    pub async fn query_send_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError> {
        let query = format!(
            "send_packet.packet_src_channel='{}' AND send_packet.packet_src_port='{}' AND send_packet.packet_sequence='{}'",
            channel_id, port_id, sequence
        );
        let txs = self.tx_search(&query).await?;
        find_packet(&txs, "send_packet", sequence, |p| {
            p.source_channel == channel_id && p.source_port == port_id
        })
        .ok_or_else(|| {
            RelayerError::InvalidQueryResponse(format!(
                "no send_packet event for sequence {} on {}/{}",
                sequence, port_id, channel_id
            ))
        })
    }

    /// The write_acknowledgement record for `sequence` on the destination
    /// channel, carrying the acknowledgement bytes
    pub async fn query_recv_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError> {
        let query = format!(
            "write_acknowledgement.packet_dst_channel='{}' AND write_acknowledgement.packet_dst_port='{}' AND write_acknowledgement.packet_sequence='{}'",
            channel_id, port_id, sequence
        );
        let txs = self.tx_search(&query).await?;
        find_packet(&txs, "write_acknowledgement", sequence, |p| {
            p.dest_channel == channel_id && p.dest_port == port_id
        })
        .ok_or_else(|| {
            RelayerError::InvalidQueryResponse(format!(
                "no write_acknowledgement event for sequence {} on {}/{}",
                sequence, port_id, channel_id
            ))
        })
    }

    async fn tx_search(&self, query: &str) -> Result<Vec<TxResult>, RelayerError> {
        debug!(chain_id = %self.chain_id(), query, "searching txs");
        self.rpc.tx_search(query).await.inspect_err(|_| self.record_rpc_error())
    }

    /// Height and time of the chain's latest block
    pub async fn latest_block(&self) -> Result<BlockInfo, RelayerError> {
        self.rpc
            .latest_block()
            .await
            .inspect_err(|_| self.record_rpc_error())
    }

    pub async fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RelayerError> {
        self.rpc
            .block_time(height)
            .await
            .inspect_err(|_| self.record_rpc_error())
    }

    /// Tendermint client state stored under `client_id`, with its proof
    pub async fn query_client_state_with_proof(
        &self,
        height: u64,
        client_id: &str,
    ) -> Result<(ClientState, Vec<u8>, Height), RelayerError> {
        let (value, proof, proof_height) = self
            .query_tendermint_proof(height, client_state_key(client_id))
            .await?;
        if value.is_empty() {
            return Err(RelayerError::InvalidQueryResponse(format!(
                "client {} not found",
                client_id
            )));
        }

        let any = Any::decode(value.as_slice())?;
        if any.type_url != ClientState::TYPE_URL {
            return Err(RelayerError::Decode(format!(
                "expected tendermint client state, got {}",
                any.type_url
            )));
        }
        let client_state = ClientState::decode(any.value.as_slice())?;
        Ok((client_state, proof, proof_height))
    }

    pub async fn query_client_state(
        &self,
        height: u64,
        client_id: &str,
    ) -> Result<ClientState, RelayerError> {
        let (client_state, _, _) = self.query_client_state_with_proof(height, client_id).await?;
        Ok(client_state)
    }

    /// Proof of the consensus state `client_id` stores for `consensus_height`
    pub async fn query_client_consensus_state_proof(
        &self,
        height: u64,
        client_id: &str,
        consensus_height: Height,
    ) -> Result<(Vec<u8>, Height), RelayerError> {
        let (_, proof, proof_height) = self
            .query_tendermint_proof(height, consensus_state_key(client_id, consensus_height))
            .await?;
        Ok((proof, proof_height))
    }

    pub async fn query_connection(
        &self,
        height: u64,
        connection_id: &str,
    ) -> Result<(ConnectionEnd, Vec<u8>, Height), RelayerError> {
        let (value, proof, proof_height) = self
            .query_tendermint_proof(height, connection_key(connection_id))
            .await?;
        let connection = ConnectionEnd::decode(value.as_slice())?;
        Ok((connection, proof, proof_height))
    }

    pub async fn query_channel(
        &self,
        height: u64,
        channel_id: &str,
        port_id: &str,
    ) -> Result<(Channel, Vec<u8>, Height), RelayerError> {
        let (value, proof, proof_height) = self
            .query_tendermint_proof(height, channel_key(port_id, channel_id))
            .await?;
        if value.is_empty() {
            return Err(RelayerError::InvalidQueryResponse(format!(
                "channel {}/{} not found",
                port_id, channel_id
            )));
        }
        let channel = Channel::decode(value.as_slice())?;
        Ok((channel, proof, proof_height))
    }

    /// Client state, client state proof, consensus state proof and connection
    /// proof at `height`. The two latter proofs are fetched concurrently.
    pub async fn generate_conn_handshake_proof(
        &self,
        height: u64,
        client_id: &str,
        connection_id: &str,
    ) -> Result<(ClientState, Vec<u8>, Vec<u8>, Vec<u8>, Height), RelayerError> {
        let (client_state, client_state_proof, _) =
            self.query_client_state_with_proof(height, client_id).await?;
        let consensus_height = Height::from_proto(client_state.latest_height.as_ref());

        let ((consensus_state_proof, _), (_, connection_proof, proof_height)) = futures::try_join!(
            self.query_client_consensus_state_proof(height, client_id, consensus_height),
            self.query_connection(height, connection_id),
        )?;

        Ok((
            client_state,
            client_state_proof,
            consensus_state_proof,
            connection_proof,
            proof_height,
        ))
    }

    /// Run an interchain query; a proof is requested iff the path ends in `key`
    pub async fn query_icq_with_proof(
        &self,
        path: &str,
        request: Vec<u8>,
        height: u64,
    ) -> Result<IcqProof, RelayerError> {
        let prove = path.rsplit('/').next() == Some("key");
        let res = self.query_abci(path, request, height, prove).await.inspect_err(|e| {
            warn!(chain_id = %self.chain_id(), path, error = %e, "failed to execute interchain query")
        })?;

        Ok(IcqProof {
            result: res.value,
            proof_ops: res.proof_ops,
            height: res.height as i64,
        })
    }
}

/// First `kind` event of `sequence` accepted by `matches`
fn find_packet<F>(txs: &[TxResult], kind: &str, sequence: u64, matches: F) -> Option<PacketInfo>
where
    F: Fn(&PacketInfo) -> bool,
{
    txs.iter()
        .flat_map(|tx| tx.events.iter().map(move |event| (tx.height, event)))
        .filter(|(_, event)| event.kind == kind)
        .filter_map(|(height, event)| packet_from_event(height, event))
        .find(|p| p.sequence == sequence && matches(p))
}

fn packet_from_event(height: u64, event: &AbciEvent) -> Option<PacketInfo> {
    let sequence = event.attribute("packet_sequence")?.parse().ok()?;

    let data = match event.attribute("packet_data_hex") {
        Some(hex_data) => hex::decode(hex_data).ok()?,
        None => event.attribute("packet_data").unwrap_or_default().as_bytes().to_vec(),
    };
    let ack = match event.attribute("packet_ack_hex") {
        Some(hex_ack) => hex::decode(hex_ack).ok()?,
        None => event.attribute("packet_ack").unwrap_or_default().as_bytes().to_vec(),
    };

    let timeout_height = match event.attribute("packet_timeout_height") {
        Some(h) => h.parse().ok()?,
        None => Height::zero(),
    };
    let timeout_timestamp = match event.attribute("packet_timeout_timestamp") {
        Some(t) => t.parse().ok()?,
        None => 0,
    };

    let attr = |key: &str| event.attribute(key).unwrap_or_default().to_string();

    Some(PacketInfo {
        height,
        sequence,
        source_port: attr("packet_src_port"),
        source_channel: attr("packet_src_channel"),
        dest_port: attr("packet_dst_port"),
        dest_channel: attr("packet_dst_channel"),
        data,
        timeout_height,
        timeout_timestamp,
        ack,
    })
}
