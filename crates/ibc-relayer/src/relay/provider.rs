// Chain-side surface the relay decisions are written against
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ibc_proto::ibc::core::commitment::v1::MerklePrefix;
use ibc_proto::ibc::lightclients::tendermint::v1::ClientState;

use super::header::TendermintHeader;
use super::packet::{ChannelOrder, Height, PacketInfo};
use super::proof::PacketProof;
use crate::chains::CosmosProvider;
use crate::error::RelayerError;
use crate::message::RelayerMessage;

/// Connection ends as seen from the chain running a handshake step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    pub height: u64,
    pub connection_id: String,
    pub client_id: String,
    pub counterparty_client_id: String,
    pub counterparty_connection_id: String,
    pub counterparty_commitment_prefix: Option<MerklePrefix>,
}

/// Channel ends as seen from the chain running a handshake step
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub height: u64,
    pub port_id: String,
    pub channel_id: String,
    pub counterparty_port_id: String,
    pub counterparty_channel_id: String,
    pub connection_id: String,
    pub counterparty_connection_id: String,
    pub order: ChannelOrder,
    pub version: String,
}

/// Queries and message builders one side of a relay path must offer.
///
/// Heights are plain block heights on the implementing chain; proof heights
/// come back revision-qualified inside the proofs.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn chain_id(&self) -> &str;

    async fn query_send_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError>;

    async fn query_recv_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError>;

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RelayerError>;

    async fn packet_commitment(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError>;

    async fn packet_acknowledgement(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError>;

    async fn packet_receipt(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError>;

    async fn next_seq_recv(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError>;

    async fn query_client_state(&self, height: u64, client_id: &str) -> Result<ClientState, RelayerError>;

    async fn query_ibc_header(&self, height: u64) -> Result<TendermintHeader, RelayerError>;

    fn msg_recv_packet(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError>;

    fn msg_acknowledgement(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError>;

    fn msg_timeout(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError>;

    fn msg_timeout_on_close(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError>;

    /// Latest height of the client this chain keeps for its counterparty
    async fn client_latest_height(&self, height: u64, client_id: &str) -> Result<Height, RelayerError> {
        let client_state = self.query_client_state(height, client_id).await?;
        Ok(Height::from_proto(client_state.latest_height.as_ref()))
    }
}

#[async_trait]
impl ChainProvider for CosmosProvider {
    fn chain_id(&self) -> &str {
        CosmosProvider::chain_id(self)
    }

    async fn query_send_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError> {
        CosmosProvider::query_send_packet(self, channel_id, port_id, sequence).await
    }

    async fn query_recv_packet(
        &self,
        channel_id: &str,
        port_id: &str,
        sequence: u64,
    ) -> Result<PacketInfo, RelayerError> {
        CosmosProvider::query_recv_packet(self, channel_id, port_id, sequence).await
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>, RelayerError> {
        CosmosProvider::block_time(self, height).await
    }

    async fn packet_commitment(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError> {
        CosmosProvider::packet_commitment(self, packet, height).await
    }

    async fn packet_acknowledgement(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError> {
        CosmosProvider::packet_acknowledgement(self, packet, height).await
    }

    async fn packet_receipt(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError> {
        CosmosProvider::packet_receipt(self, packet, height).await
    }

    async fn next_seq_recv(&self, packet: &PacketInfo, height: u64) -> Result<PacketProof, RelayerError> {
        CosmosProvider::next_seq_recv(self, packet, height).await
    }

    async fn query_client_state(&self, height: u64, client_id: &str) -> Result<ClientState, RelayerError> {
        CosmosProvider::query_client_state(self, height, client_id).await
    }

    async fn query_ibc_header(&self, height: u64) -> Result<TendermintHeader, RelayerError> {
        CosmosProvider::query_ibc_header(self, height).await
    }

    fn msg_recv_packet(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        CosmosProvider::msg_recv_packet(self, packet, proof)
    }

    fn msg_acknowledgement(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        CosmosProvider::msg_acknowledgement(self, packet, proof)
    }

    fn msg_timeout(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        CosmosProvider::msg_timeout(self, packet, proof)
    }

    fn msg_timeout_on_close(&self, packet: &PacketInfo, proof: PacketProof) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        CosmosProvider::msg_timeout_on_close(self, packet, proof)
    }
}
