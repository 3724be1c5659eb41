// Proof family carried from a query on one chain into a message for the other
use ibc_proto::ibc::lightclients::tendermint::v1::ClientState;
use tendermint_proto::crypto::ProofOps;

use super::packet::{ChannelOrder, Height};

/// Membership or non-membership proof for one packet path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketProof {
    pub proof: Vec<u8>,
    pub proof_height: Height,
}

/// Proofs backing a connection handshake step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionProof {
    /// Counterparty's client state, only present for OpenTry / OpenAck
    pub client_state: Option<ClientState>,
    pub client_state_proof: Vec<u8>,
    pub consensus_state_proof: Vec<u8>,
    pub connection_state_proof: Vec<u8>,
    pub proof_height: Height,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProof {
    pub proof: Vec<u8>,
    pub proof_height: Height,
    pub version: String,
    pub ordering: ChannelOrder,
}

/// Result of an interchain query together with its Tendermint proof ops
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IcqProof {
    pub result: Vec<u8>,
    pub proof_ops: Option<ProofOps>,
    pub height: i64,
}

/// A proof of any kind, as carried alongside the message it backs
#[derive(Debug, Clone, PartialEq)]
pub enum Proof {
    Packet(PacketProof),
    Connection(ConnectionProof),
    Channel(ChannelProof),
    InterchainQuery(IcqProof),
}

impl Proof {
    /// Height the proof was taken at. Interchain query proofs carry the raw
    /// query height under revision 0.
    pub fn proof_height(&self) -> Height {
        match self {
            Proof::Packet(p) => p.proof_height,
            Proof::Connection(p) => p.proof_height,
            Proof::Channel(p) => p.proof_height,
            Proof::InterchainQuery(p) => Height::new(0, p.height.max(0) as u64),
        }
    }

    /// The packet proof, if this is one
    pub fn as_packet(&self) -> Option<&PacketProof> {
        match self {
            Proof::Packet(p) => Some(p),
            _ => None,
        }
    }
}

impl From<PacketProof> for Proof {
    fn from(p: PacketProof) -> Self {
        Proof::Packet(p)
    }
}

impl From<ConnectionProof> for Proof {
    fn from(p: ConnectionProof) -> Self {
        Proof::Connection(p)
    }
}

impl From<ChannelProof> for Proof {
    fn from(p: ChannelProof) -> Self {
        Proof::Channel(p)
    }
}

impl From<IcqProof> for Proof {
    fn from(p: IcqProof) -> Self {
        Proof::InterchainQuery(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_height_per_variant() {
        let packet: Proof = PacketProof {
            proof: vec![1],
            proof_height: Height::new(1, 11),
        }
        .into();
        assert_eq!(packet.proof_height(), Height::new(1, 11));
        assert_eq!(packet.as_packet().map(|p| p.proof.clone()), Some(vec![1]));

        let channel: Proof = ChannelProof {
            proof: vec![],
            proof_height: Height::new(2, 5),
            version: "ics20-1".to_string(),
            ordering: ChannelOrder::Unordered,
        }
        .into();
        assert_eq!(channel.proof_height(), Height::new(2, 5));
        assert!(channel.as_packet().is_none());

        let icq: Proof = IcqProof {
            height: 42,
            ..IcqProof::default()
        }
        .into();
        assert_eq!(icq.proof_height(), Height::new(0, 42));
    }
}
