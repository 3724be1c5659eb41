// Type URLs and `Any` packing for the ibc-proto messages the relayer emits
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::applications::transfer::v1::MsgTransfer;
use ibc_proto::ibc::core::channel::v1::{
    MsgAcknowledgement, MsgChannelCloseConfirm, MsgChannelCloseInit, MsgChannelOpenAck,
    MsgChannelOpenConfirm, MsgChannelOpenInit, MsgChannelOpenTry, MsgRecvPacket, MsgTimeout,
    MsgTimeoutOnClose,
};
use ibc_proto::ibc::core::client::v1::{
    Height, MsgCreateClient, MsgSubmitMisbehaviour, MsgUpdateClient, MsgUpgradeClient,
};
use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use ibc_proto::ibc::core::connection::v1::{
    ConnectionEnd, MsgConnectionOpenAck, MsgConnectionOpenConfirm, MsgConnectionOpenInit,
    MsgConnectionOpenTry, Version,
};
use ibc_proto::ibc::lightclients::tendermint::v1::{ClientState, ConsensusState, Header};
use ibc_proto::stride::interchainquery::v1::MsgSubmitQueryResponse;
use prost::Message;

/// Fully-qualified protobuf type name of a message
pub trait TypeUrl {
    const TYPE_URL: &'static str;
}

/// Pack a message into the `Any` embedded in IBC messages (client states,
/// consensus states, headers)
pub fn to_any<M: Message + TypeUrl>(msg: &M) -> Any {
    Any {
        type_url: M::TYPE_URL.to_string(),
        value: msg.encode_to_vec(),
    }
}

/// The single connection version every ibc-go chain supports
pub fn default_connection_version() -> Version {
    Version {
        identifier: "1".to_string(),
        features: vec!["ORDER_ORDERED".to_string(), "ORDER_UNORDERED".to_string()],
    }
}

macro_rules! type_url {
    ($($ty:ty => $url:literal,)*) => {
        $(
            impl TypeUrl for $ty {
                const TYPE_URL: &'static str = $url;
            }
        )*
    };
}

type_url! {
    Height => "/ibc.core.client.v1.Height",
    MsgCreateClient => "/ibc.core.client.v1.MsgCreateClient",
    MsgUpdateClient => "/ibc.core.client.v1.MsgUpdateClient",
    MsgUpgradeClient => "/ibc.core.client.v1.MsgUpgradeClient",
    MsgSubmitMisbehaviour => "/ibc.core.client.v1.MsgSubmitMisbehaviour",
    MerkleProof => "/ibc.core.commitment.v1.MerkleProof",
    MsgRecvPacket => "/ibc.core.channel.v1.MsgRecvPacket",
    MsgTimeout => "/ibc.core.channel.v1.MsgTimeout",
    MsgTimeoutOnClose => "/ibc.core.channel.v1.MsgTimeoutOnClose",
    MsgAcknowledgement => "/ibc.core.channel.v1.MsgAcknowledgement",
    MsgChannelOpenInit => "/ibc.core.channel.v1.MsgChannelOpenInit",
    MsgChannelOpenTry => "/ibc.core.channel.v1.MsgChannelOpenTry",
    MsgChannelOpenAck => "/ibc.core.channel.v1.MsgChannelOpenAck",
    MsgChannelOpenConfirm => "/ibc.core.channel.v1.MsgChannelOpenConfirm",
    MsgChannelCloseInit => "/ibc.core.channel.v1.MsgChannelCloseInit",
    MsgChannelCloseConfirm => "/ibc.core.channel.v1.MsgChannelCloseConfirm",
    ConnectionEnd => "/ibc.core.connection.v1.ConnectionEnd",
    MsgConnectionOpenInit => "/ibc.core.connection.v1.MsgConnectionOpenInit",
    MsgConnectionOpenTry => "/ibc.core.connection.v1.MsgConnectionOpenTry",
    MsgConnectionOpenAck => "/ibc.core.connection.v1.MsgConnectionOpenAck",
    MsgConnectionOpenConfirm => "/ibc.core.connection.v1.MsgConnectionOpenConfirm",
    MsgTransfer => "/ibc.applications.transfer.v1.MsgTransfer",
    ClientState => "/ibc.lightclients.tendermint.v1.ClientState",
    ConsensusState => "/ibc.lightclients.tendermint.v1.ConsensusState",
    Header => "/ibc.lightclients.tendermint.v1.Header",
    MsgSubmitQueryResponse => "/stride.interchainquery.v1.MsgSubmitQueryResponse",
}
