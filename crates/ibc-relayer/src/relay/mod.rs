// Packet relay engine: validation, proof selection and header preparation

pub mod decision;
pub mod header;
pub mod packet;
pub mod proof;
pub mod provider;

pub use decision::{acknowledgement_from_sequence, relay_packet_from_sequence, RelayPacketMsg};
pub use header::{inject_trusted_fields, new_client_state, TendermintHeader};
pub use packet::{
    parse_chain_id, validate_packet, ChannelOrder, ChannelState, Height, LatestBlock, PacketError,
    PacketInfo, PacketTimeout,
};
pub use proof::{ChannelProof, ConnectionProof, IcqProof, PacketProof, Proof};
pub use provider::{ChainProvider, ChannelInfo, ConnectionInfo};
