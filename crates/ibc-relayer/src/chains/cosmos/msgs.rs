// IBC message builders signed by this provider's key
use ibc_proto::cosmos::base::v1beta1::Coin;
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::applications::transfer::v1::MsgTransfer;
use ibc_proto::ibc::core::channel::v1::{
    Channel, Counterparty as ChannelCounterparty, MsgAcknowledgement, MsgChannelCloseConfirm,
    MsgChannelCloseInit, MsgChannelOpenAck, MsgChannelOpenConfirm, MsgChannelOpenInit,
    MsgChannelOpenTry, MsgRecvPacket, MsgTimeout, MsgTimeoutOnClose, State as ChannelStateProto,
};
use ibc_proto::ibc::core::client::v1::{
    MsgCreateClient, MsgSubmitMisbehaviour, MsgUpdateClient, MsgUpgradeClient,
};
use ibc_proto::ibc::core::commitment::v1::MerklePrefix;
use ibc_proto::ibc::core::connection::v1::{
    Counterparty as ConnectionCounterparty, MsgConnectionOpenAck, MsgConnectionOpenConfirm,
    MsgConnectionOpenInit, MsgConnectionOpenTry,
};
use ibc_proto::stride::interchainquery::v1::MsgSubmitQueryResponse;

use crate::error::RelayerError;
use crate::message::{CosmosMessage, RelayerMessage};
use crate::proto::{default_connection_version, to_any, TypeUrl};
use crate::relay::packet::{ChannelOrder, Height, PacketInfo};
use crate::relay::proof::{ChannelProof, ConnectionProof, IcqProof, PacketProof};
use crate::relay::provider::{ChannelInfo, ConnectionInfo};

use super::CosmosProvider;

const DEFAULT_DELAY_PERIOD: u64 = 0;

fn default_chain_prefix() -> MerklePrefix {
    MerklePrefix {
        key_prefix: b"ibc".to_vec(),
    }
}

fn boxed<M: prost::Message + TypeUrl>(msg: &M) -> Box<dyn RelayerMessage> {
    CosmosMessage::new(msg).boxed()
}

fn packed_client_state(proof: &ConnectionProof) -> Result<(Any, Height), RelayerError> {
    let client_state = proof.client_state.as_ref().ok_or_else(|| {
        RelayerError::InvalidQueryResponse("connection proof carries no client state".to_string())
    })?;
    let consensus_height = Height::from_proto(client_state.latest_height.as_ref());
    Ok((to_any(client_state), consensus_height))
}

impl CosmosProvider {
    /// ICS-20 transfer from this key to `dst_addr`
    pub fn msg_transfer(
        &self,
        dst_addr: &str,
        amount: Coin,
        info: &PacketInfo,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        let mut msg = MsgTransfer {
            source_port: info.source_port.clone(),
            source_channel: info.source_channel.clone(),
            token: Some(amount),
            sender: self.address()?,
            receiver: dst_addr.to_string(),
            timeout_height: None,
            timeout_timestamp: info.timeout_timestamp,
            ..MsgTransfer::default()
        };

        // a zero timeout height is left out entirely
        if info.timeout_height.revision_height != 0 {
            msg.timeout_height = Some(info.timeout_height.into());
        }

        Ok(boxed(&msg))
    }

    pub fn msg_create_client(
        &self,
        client_state: Any,
        consensus_state: Any,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgCreateClient {
            client_state: Some(client_state),
            consensus_state: Some(consensus_state),
            signer: self.address()?,
        }))
    }

    pub fn msg_update_client(
        &self,
        client_id: &str,
        header: Any,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgUpdateClient {
            client_id: client_id.to_string(),
            client_message: Some(header),
            signer: self.address()?,
        }))
    }

    /// Move `client_id` onto the upgraded client and consensus states
    /// committed by the counterparty's upgrade plan, with their upgrade-store
    /// proofs
    pub fn msg_upgrade_client(
        &self,
        client_id: &str,
        client_state: Any,
        consensus_state: Any,
        proof_upgrade_client: Vec<u8>,
        proof_upgrade_consensus_state: Vec<u8>,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgUpgradeClient {
            client_id: client_id.to_string(),
            client_state: Some(client_state),
            consensus_state: Some(consensus_state),
            proof_upgrade_client,
            proof_upgrade_consensus_state,
            signer: self.address()?,
        }))
    }

    pub fn msg_submit_misbehaviour(
        &self,
        client_id: &str,
        misbehaviour: Any,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgSubmitMisbehaviour {
            client_id: client_id.to_string(),
            misbehaviour: Some(misbehaviour),
            signer: self.address()?,
        }))
    }

    pub fn msg_recv_packet(
        &self,
        packet: &PacketInfo,
        proof: PacketProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgRecvPacket {
            packet: Some(packet.to_proto()),
            proof_commitment: proof.proof,
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_acknowledgement(
        &self,
        packet: &PacketInfo,
        proof: PacketProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgAcknowledgement {
            packet: Some(packet.to_proto()),
            acknowledgement: packet.ack.clone(),
            proof_acked: proof.proof,
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_timeout(
        &self,
        packet: &PacketInfo,
        proof: PacketProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgTimeout {
            packet: Some(packet.to_proto()),
            proof_unreceived: proof.proof,
            proof_height: Some(proof.proof_height.into()),
            next_sequence_recv: packet.sequence,
            signer: self.address()?,
        }))
    }

    /// Timeout on a closed counterparty channel. The channel-closed proof is
    /// not fetched, so `proof_close` stays empty.
    pub fn msg_timeout_on_close(
        &self,
        packet: &PacketInfo,
        proof: PacketProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgTimeoutOnClose {
            packet: Some(packet.to_proto()),
            proof_unreceived: proof.proof,
            proof_close: vec![],
            proof_height: Some(proof.proof_height.into()),
            next_sequence_recv: packet.sequence,
            signer: self.address()?,
            ..MsgTimeoutOnClose::default()
        }))
    }

    pub fn msg_connection_open_init(
        &self,
        info: &ConnectionInfo,
        _proof: &ConnectionProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgConnectionOpenInit {
            client_id: info.client_id.clone(),
            counterparty: Some(ConnectionCounterparty {
                client_id: info.counterparty_client_id.clone(),
                connection_id: String::new(),
                prefix: info.counterparty_commitment_prefix.clone(),
            }),
            version: None,
            delay_period: DEFAULT_DELAY_PERIOD,
            signer: self.address()?,
        }))
    }

    /// Proofs for OpenTry / OpenAck taken on this chain at `height`
    pub async fn connection_handshake_proof(
        &self,
        info: &ConnectionInfo,
        height: u64,
    ) -> Result<ConnectionProof, RelayerError> {
        let (client_state, client_state_proof, consensus_state_proof, connection_state_proof, proof_height) = self
            .generate_conn_handshake_proof(height, &info.client_id, &info.connection_id)
            .await?;

        // the proof may have been asked for before the connection was committed
        if connection_state_proof.is_empty() {
            return Err(RelayerError::InvalidQueryResponse(
                "received invalid zero-length connection state proof".to_string(),
            ));
        }

        Ok(ConnectionProof {
            client_state: Some(client_state),
            client_state_proof,
            consensus_state_proof,
            connection_state_proof,
            proof_height,
        })
    }

    pub fn msg_connection_open_try(
        &self,
        open_init: &ConnectionInfo,
        proof: &ConnectionProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        let (client_state, consensus_height) = packed_client_state(proof)?;

        Ok(boxed(&MsgConnectionOpenTry {
            client_id: open_init.counterparty_client_id.clone(),
            previous_connection_id: open_init.counterparty_connection_id.clone(),
            client_state: Some(client_state),
            counterparty: Some(ConnectionCounterparty {
                client_id: open_init.client_id.clone(),
                connection_id: open_init.connection_id.clone(),
                prefix: Some(default_chain_prefix()),
            }),
            delay_period: DEFAULT_DELAY_PERIOD,
            counterparty_versions: vec![default_connection_version()],
            proof_height: Some(proof.proof_height.into()),
            proof_init: proof.connection_state_proof.clone(),
            proof_client: proof.client_state_proof.clone(),
            proof_consensus: proof.consensus_state_proof.clone(),
            consensus_height: Some(consensus_height.into()),
            signer: self.address()?,
            ..MsgConnectionOpenTry::default()
        }))
    }

    pub fn msg_connection_open_ack(
        &self,
        open_try: &ConnectionInfo,
        proof: &ConnectionProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        let (client_state, consensus_height) = packed_client_state(proof)?;

        Ok(boxed(&MsgConnectionOpenAck {
            connection_id: open_try.counterparty_connection_id.clone(),
            counterparty_connection_id: open_try.connection_id.clone(),
            version: Some(default_connection_version()),
            client_state: Some(client_state),
            proof_height: Some(proof.proof_height.into()),
            proof_try: proof.connection_state_proof.clone(),
            proof_client: proof.client_state_proof.clone(),
            proof_consensus: proof.consensus_state_proof.clone(),
            consensus_height: Some(consensus_height.into()),
            signer: self.address()?,
            ..MsgConnectionOpenAck::default()
        }))
    }

    /// Connection proof alone, for OpenConfirm
    pub async fn connection_proof(
        &self,
        open_ack: &ConnectionInfo,
        height: u64,
    ) -> Result<ConnectionProof, RelayerError> {
        let (_, connection_state_proof, proof_height) =
            self.query_connection(height, &open_ack.connection_id).await?;

        Ok(ConnectionProof {
            connection_state_proof,
            proof_height,
            ..ConnectionProof::default()
        })
    }

    pub fn msg_connection_open_confirm(
        &self,
        open_ack: &ConnectionInfo,
        proof: &ConnectionProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgConnectionOpenConfirm {
            connection_id: open_ack.counterparty_connection_id.clone(),
            proof_ack: proof.connection_state_proof.clone(),
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_channel_open_init(
        &self,
        info: &ChannelInfo,
        _proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelOpenInit {
            port_id: info.port_id.clone(),
            channel: Some(Channel {
                state: ChannelStateProto::Init as i32,
                ordering: info.order.as_proto() as i32,
                counterparty: Some(ChannelCounterparty {
                    port_id: info.counterparty_port_id.clone(),
                    channel_id: String::new(),
                }),
                connection_hops: vec![info.connection_id.clone()],
                version: info.version.clone(),
                ..Channel::default()
            }),
            signer: self.address()?,
        }))
    }

    /// Channel end proof at `height`, carrying its version and ordering
    pub async fn channel_proof(
        &self,
        info: &ChannelInfo,
        height: u64,
    ) -> Result<ChannelProof, RelayerError> {
        let (channel, proof, proof_height) = self
            .query_channel(height, &info.channel_id, &info.port_id)
            .await?;

        let ordering = ChannelOrder::from_proto(channel.ordering).ok_or_else(|| {
            RelayerError::InvalidQueryResponse(format!(
                "channel {}/{} has no ordering",
                info.port_id, info.channel_id
            ))
        })?;

        Ok(ChannelProof {
            proof,
            proof_height,
            version: channel.version,
            ordering,
        })
    }

    pub fn msg_channel_open_try(
        &self,
        open_init: &ChannelInfo,
        proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelOpenTry {
            port_id: open_init.counterparty_port_id.clone(),
            previous_channel_id: open_init.counterparty_channel_id.clone(),
            channel: Some(Channel {
                state: ChannelStateProto::Tryopen as i32,
                ordering: proof.ordering.as_proto() as i32,
                counterparty: Some(ChannelCounterparty {
                    port_id: open_init.port_id.clone(),
                    channel_id: open_init.channel_id.clone(),
                }),
                connection_hops: vec![open_init.counterparty_connection_id.clone()],
                // same version as the counterparty for now
                version: proof.version.clone(),
                ..Channel::default()
            }),
            counterparty_version: proof.version.clone(),
            proof_init: proof.proof.clone(),
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_channel_open_ack(
        &self,
        open_try: &ChannelInfo,
        proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelOpenAck {
            port_id: open_try.counterparty_port_id.clone(),
            channel_id: open_try.counterparty_channel_id.clone(),
            counterparty_channel_id: open_try.channel_id.clone(),
            counterparty_version: proof.version.clone(),
            proof_try: proof.proof.clone(),
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_channel_open_confirm(
        &self,
        open_ack: &ChannelInfo,
        proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelOpenConfirm {
            port_id: open_ack.counterparty_port_id.clone(),
            channel_id: open_ack.counterparty_channel_id.clone(),
            proof_ack: proof.proof.clone(),
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
        }))
    }

    pub fn msg_channel_close_init(
        &self,
        info: &ChannelInfo,
        _proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelCloseInit {
            port_id: info.port_id.clone(),
            channel_id: info.channel_id.clone(),
            signer: self.address()?,
        }))
    }

    pub fn msg_channel_close_confirm(
        &self,
        close_init: &ChannelInfo,
        proof: &ChannelProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgChannelCloseConfirm {
            port_id: close_init.counterparty_port_id.clone(),
            channel_id: close_init.counterparty_channel_id.clone(),
            proof_init: proof.proof.clone(),
            proof_height: Some(proof.proof_height.into()),
            signer: self.address()?,
            ..MsgChannelCloseConfirm::default()
        }))
    }

    /// Answer an interchain query registered on `chain_id`
    pub fn msg_submit_query_response(
        &self,
        chain_id: &str,
        query_id: &str,
        proof: IcqProof,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        Ok(boxed(&MsgSubmitQueryResponse {
            chain_id: chain_id.to_string(),
            query_id: query_id.to_string(),
            result: proof.result,
            proof_ops: proof.proof_ops,
            height: proof.height,
            from_address: self.address()?,
        }))
    }
}
