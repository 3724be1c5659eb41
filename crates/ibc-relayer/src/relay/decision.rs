// Receive / timeout / acknowledgement decisions for a single packet sequence
use std::fmt;

use tracing::{debug, info};

use super::packet::{validate_packet, ChannelOrder, ChannelState, LatestBlock, PacketInfo, PacketTimeout};
use super::proof::{PacketProof, Proof};
use super::provider::ChainProvider;
use crate::cancel::Cancellation;
use crate::chains::CosmosProvider;
use crate::error::RelayerError;
use crate::message::RelayerMessage;

/// Message produced for one packet sequence
pub enum RelayPacketMsg {
    /// Deliver the packet on the destination
    Recv {
        msg: Box<dyn RelayerMessage>,
        proof: Proof,
    },
    /// Time the packet out on the source
    Timeout {
        msg: Box<dyn RelayerMessage>,
        proof: Proof,
        reason: PacketTimeout,
    },
}

impl RelayPacketMsg {
    pub fn msg(&self) -> &dyn RelayerMessage {
        match self {
            RelayPacketMsg::Recv { msg, .. } | RelayPacketMsg::Timeout { msg, .. } => &**msg,
        }
    }

    pub fn into_msg(self) -> Box<dyn RelayerMessage> {
        match self {
            RelayPacketMsg::Recv { msg, .. } | RelayPacketMsg::Timeout { msg, .. } => msg,
        }
    }

    pub fn proof(&self) -> &Proof {
        match self {
            RelayPacketMsg::Recv { proof, .. } | RelayPacketMsg::Timeout { proof, .. } => proof,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayPacketMsg::Timeout { .. })
    }
}

impl fmt::Debug for RelayPacketMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayPacketMsg::Recv { msg, proof } => f
                .debug_struct("Recv")
                .field("msg", msg)
                .field("proof_height", &proof.proof_height())
                .finish(),
            RelayPacketMsg::Timeout { msg, proof, reason } => f
                .debug_struct("Timeout")
                .field("msg", msg)
                .field("proof_height", &proof.proof_height())
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Decide how to relay `sequence` sent on `src_channel`/`src_port`.
///
/// The packet is checked against the destination at `dst_height`. A
/// deliverable packet yields a receive message for `dst`, proven by the
/// source's commitment at `src_height`. An expired one yields a timeout
/// message for `src`, proven on the destination at `dst_height` by the
/// receipt (unordered) or next-sequence-receive (ordered) entry.
#[allow(clippy::too_many_arguments)]
pub async fn relay_packet_from_sequence(
    dst: &dyn ChainProvider,
    src: &dyn ChainProvider,
    src_height: u64,
    dst_height: u64,
    sequence: u64,
    src_channel: &str,
    src_port: &str,
    order: ChannelOrder,
    channel_state: ChannelState,
    cancel: &Cancellation,
) -> Result<RelayPacketMsg, RelayerError> {
    let packet = cancel
        .guard(src.query_send_packet(src_channel, src_port, sequence))
        .await?;
    let dst_time = cancel.guard(dst.block_time(dst_height)).await?;

    let latest = LatestBlock {
        height: dst_height,
        time: dst_time,
    };

    let reason = match validate_packet(&packet, &latest, dst.chain_id(), channel_state) {
        Ok(()) => None,
        Err(e) => match e.timeout() {
            Some(reason) => {
                info!(
                    src_chain = %src.chain_id(),
                    dst_chain = %dst.chain_id(),
                    sequence,
                    ?reason,
                    error = %e,
                    "packet expired, building timeout"
                );
                Some(reason)
            }
            None => return Err(e.into()),
        },
    };

    let Some(reason) = reason else {
        let proof = cancel.guard(src.packet_commitment(&packet, src_height)).await?;
        let msg = dst.msg_recv_packet(&packet, proof.clone())?;
        debug!(
            src_chain = %src.chain_id(),
            dst_chain = %dst.chain_id(),
            sequence,
            proof_height = %proof.proof_height,
            "built receive message"
        );
        return Ok(RelayPacketMsg::Recv {
            msg,
            proof: proof.into(),
        });
    };

    let proof = cancel
        .guard(unreceived_proof(dst, &packet, dst_height, order))
        .await?;
    let msg = match reason {
        PacketTimeout::ChannelClosed => src.msg_timeout_on_close(&packet, proof.clone())?,
        PacketTimeout::Height | PacketTimeout::Timestamp => src.msg_timeout(&packet, proof.clone())?,
    };

    Ok(RelayPacketMsg::Timeout {
        msg,
        proof: proof.into(),
        reason,
    })
}

/// Non-receipt evidence valid for the channel ordering
async fn unreceived_proof(
    dst: &dyn ChainProvider,
    packet: &PacketInfo,
    dst_height: u64,
    order: ChannelOrder,
) -> Result<PacketProof, RelayerError> {
    match order {
        ChannelOrder::Unordered => dst.packet_receipt(packet, dst_height).await,
        ChannelOrder::Ordered => dst.next_seq_recv(packet, dst_height).await,
    }
}

/// Build the acknowledgement for `sequence` received on `dst`, to be
/// submitted to `src`.
pub async fn acknowledgement_from_sequence(
    src: &dyn ChainProvider,
    dst: &dyn ChainProvider,
    dst_height: u64,
    sequence: u64,
    dst_channel: &str,
    dst_port: &str,
    cancel: &Cancellation,
) -> Result<Box<dyn RelayerMessage>, RelayerError> {
    let packet = cancel
        .guard(dst.query_recv_packet(dst_channel, dst_port, sequence))
        .await?;
    let proof = cancel
        .guard(dst.packet_acknowledgement(&packet, dst_height))
        .await?;

    debug!(
        src_chain = %src.chain_id(),
        dst_chain = %dst.chain_id(),
        sequence,
        proof_height = %proof.proof_height,
        "built acknowledgement message"
    );
    src.msg_acknowledgement(&packet, proof)
}

impl CosmosProvider {
    /// [`relay_packet_from_sequence`] with this provider as the destination
    #[allow(clippy::too_many_arguments)]
    pub async fn relay_packet_from_sequence(
        &self,
        src: &dyn ChainProvider,
        src_height: u64,
        dst_height: u64,
        sequence: u64,
        src_channel: &str,
        src_port: &str,
        order: ChannelOrder,
        channel_state: ChannelState,
        cancel: &Cancellation,
    ) -> Result<RelayPacketMsg, RelayerError> {
        relay_packet_from_sequence(
            self,
            src,
            src_height,
            dst_height,
            sequence,
            src_channel,
            src_port,
            order,
            channel_state,
            cancel,
        )
        .await
    }

    /// [`acknowledgement_from_sequence`] with this provider as the chain the
    /// acknowledgement is submitted to
    pub async fn acknowledgement_from_sequence(
        &self,
        dst: &dyn ChainProvider,
        dst_height: u64,
        sequence: u64,
        dst_channel: &str,
        dst_port: &str,
        cancel: &Cancellation,
    ) -> Result<Box<dyn RelayerMessage>, RelayerError> {
        acknowledgement_from_sequence(self, dst, dst_height, sequence, dst_channel, dst_port, cancel).await
    }
}
