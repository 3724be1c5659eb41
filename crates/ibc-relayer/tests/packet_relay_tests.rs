// Packet relay decisions and header preparation against two in-memory chains
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use ibc_tx_relayer::chains::cosmos::query::{
    client_state_key, next_sequence_recv_key, packet_acknowledgement_key, packet_commitment_key,
    packet_receipt_key,
};
use ibc_tx_relayer::chains::AbciEvent;
use ibc_tx_relayer::message::decode_message;
use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::core::channel::v1::{
    MsgAcknowledgement, MsgRecvPacket, MsgTimeout, MsgTimeoutOnClose,
};
use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use ibc_proto::ibc::lightclients::tendermint::v1::{ClientState, Header};
use ibc_proto::ics23::commitment_proof::Proof as Ics23Proof;
use ibc_tx_relayer::proto::TypeUrl;
use ibc_tx_relayer::relay::{Height, PacketError, PacketTimeout};
use ibc_tx_relayer::{
    Cancellation, ChannelOrder, ChannelState, CosmosProvider, RelayPacketMsg, RelayerError, RelayerMessage,
    RetryPolicy,
};
use prost::Message;

const SRC_CHAIN: &str = "gaia-1";
const DST_CHAIN: &str = "dstchain";
const SRC_HEIGHT: u64 = 50;
const DST_HEIGHT: u64 = 100;

struct Path {
    src_chain: Arc<MockChain>,
    dst_chain: Arc<MockChain>,
    src: CosmosProvider,
    dst: CosmosProvider,
}

fn path() -> Path {
    init_tracing();
    let src_chain = MockChain::new(SRC_CHAIN);
    let dst_chain = MockChain::new(DST_CHAIN);
    Path {
        src: provider(&src_chain),
        dst: provider(&dst_chain),
        src_chain,
        dst_chain,
    }
}

fn send_packet_event(sequence: u64, timeout_height: &str, timeout_timestamp: u64) -> AbciEvent {
    AbciEvent::new(
        "send_packet",
        &[
            ("packet_sequence", &sequence.to_string()),
            ("packet_src_port", "transfer"),
            ("packet_src_channel", "channel-0"),
            ("packet_dst_port", "transfer"),
            ("packet_dst_channel", "channel-7"),
            ("packet_data_hex", "7b22616d6f756e74223a2231227d"),
            ("packet_timeout_height", timeout_height),
            ("packet_timeout_timestamp", &timeout_timestamp.to_string()),
        ],
    )
}

fn far_future_nanos() -> u64 {
    block_time_at(1_000_000).timestamp_nanos_opt().unwrap() as u64
}

impl Path {
    async fn relay(
        &self,
        sequence: u64,
        order: ChannelOrder,
        channel_state: ChannelState,
    ) -> Result<RelayPacketMsg, RelayerError> {
        self.dst
            .relay_packet_from_sequence(
                &self.src,
                SRC_HEIGHT,
                DST_HEIGHT,
                sequence,
                "channel-0",
                "transfer",
                order,
                channel_state,
                &Cancellation::never(),
            )
            .await
    }
}

#[tokio::test]
async fn test_expired_height_builds_timeout_on_source() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(5, "0-100", 0)]);

    let relayed = p
        .relay(5, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap();

    let (msg, proof, reason) = match relayed {
        RelayPacketMsg::Timeout { msg, proof, reason } => (msg, proof, reason),
        other => panic!("expected a timeout, got {other:?}"),
    };
    assert_eq!(reason, PacketTimeout::Height);
    assert_eq!(msg.type_url(), MsgTimeout::TYPE_URL);
    assert_eq!(proof.proof_height(), Height::new(0, DST_HEIGHT));

    let timeout: MsgTimeout = decode_message(&*msg).unwrap();
    assert_eq!(timeout.next_sequence_recv, 5);
    assert_eq!(timeout.proof_height, Some(Height::new(0, DST_HEIGHT).into()));
    assert_eq!(timeout.proof_unreceived, proof.as_packet().unwrap().proof);
    assert_eq!(timeout.signer, p.src.address().unwrap());
    assert_eq!(timeout.packet.unwrap().destination_channel, "channel-7");

    // non-receipt proven on the destination against the receipt key
    assert_eq!(
        p.dst_chain.proof_queries(),
        vec![(DST_HEIGHT - 1, packet_receipt_key("transfer", "channel-7", 5))]
    );
    assert!(p.src_chain.proof_queries().is_empty());
}

#[tokio::test]
async fn test_ordered_channel_proves_next_sequence_recv() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(5, "0-90", 0)]);

    let relayed = p
        .relay(5, ChannelOrder::Ordered, ChannelState::Open)
        .await
        .unwrap();
    assert!(relayed.is_timeout());
    assert_eq!(
        p.dst_chain.proof_queries(),
        vec![(DST_HEIGHT - 1, next_sequence_recv_key("transfer", "channel-7"))]
    );
}

#[tokio::test]
async fn test_deliverable_packet_builds_receive_on_destination() {
    let p = path();
    p.src_chain.add_searchable_tx(12, vec![send_packet_event(7, "0-0", far_future_nanos())]);
    p.src_chain
        .set_store(packet_commitment_key("transfer", "channel-0", 7), vec![0x01; 32]);

    let relayed = p
        .relay(7, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap();

    let (msg, proof) = match relayed {
        RelayPacketMsg::Recv { msg, proof } => (msg, proof),
        other => panic!("expected a receive, got {other:?}"),
    };
    // gaia-1 is revision 1
    assert_eq!(proof.proof_height(), Height::new(1, SRC_HEIGHT));

    let recv: MsgRecvPacket = decode_message(&*msg).unwrap();
    assert_eq!(recv.proof_commitment, proof.as_packet().unwrap().proof);
    assert_eq!(recv.proof_height, Some(Height::new(1, SRC_HEIGHT).into()));
    assert_eq!(recv.signer, p.dst.address().unwrap());

    let packet = recv.packet.unwrap();
    assert_eq!(packet.sequence, 7);
    assert_eq!(packet.data, br#"{"amount":"1"}"#.to_vec());
    assert_eq!(packet.timeout_timestamp, far_future_nanos());

    let merkle = MerkleProof::decode(recv.proof_commitment.as_slice()).unwrap();
    assert_eq!(merkle.proofs.len(), 1);
    match &merkle.proofs[0].proof {
        Some(Ics23Proof::Exist(exist)) => {
            assert_eq!(exist.key, packet_commitment_key("transfer", "channel-0", 7));
            assert_eq!(exist.value, vec![0x01; 32]);
        }
        other => panic!("expected an existence proof, got {other:?}"),
    }
    assert_eq!(
        p.src_chain.proof_queries(),
        vec![(SRC_HEIGHT - 1, packet_commitment_key("transfer", "channel-0", 7))]
    );
}

#[tokio::test]
async fn test_expired_timestamp_builds_timeout() {
    let p = path();
    let expired = block_time_at(DST_HEIGHT - 1).timestamp_nanos_opt().unwrap() as u64;
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(9, "0-0", expired)]);

    let relayed = p
        .relay(9, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap();
    match relayed {
        RelayPacketMsg::Timeout { reason, .. } => assert_eq!(reason, PacketTimeout::Timestamp),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_closed_channel_builds_timeout_on_close() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(4, "0-0", far_future_nanos())]);

    let relayed = p
        .relay(4, ChannelOrder::Unordered, ChannelState::Closed)
        .await
        .unwrap();

    assert_eq!(relayed.proof().proof_height(), Height::new(0, DST_HEIGHT));
    let (msg, reason) = match relayed {
        RelayPacketMsg::Timeout { msg, reason, .. } => (msg, reason),
        other => panic!("expected a timeout, got {other:?}"),
    };
    assert_eq!(reason, PacketTimeout::ChannelClosed);
    let on_close: MsgTimeoutOnClose = decode_message(&*msg).unwrap();
    assert_eq!(on_close.next_sequence_recv, 4);
    assert!(on_close.proof_close.is_empty());
    assert!(!on_close.proof_unreceived.is_empty());
}

#[tokio::test]
async fn test_zero_sequence_is_refused() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(0, "0-500", 0)]);

    let err = p
        .relay(0, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayerError::Packet(PacketError::ZeroSequence)));
    assert!(p.src_chain.proof_queries().is_empty());
    assert!(p.dst_chain.proof_queries().is_empty());
}

#[tokio::test]
async fn test_missing_commitment_is_an_error() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(7, "0-500", 0)]);

    let err = p
        .relay(7, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayerError::InvalidQueryResponse(ref m) if m.contains("commitment")));
}

#[tokio::test]
async fn test_unknown_sequence_is_an_error() {
    let p = path();
    p.src_chain.add_searchable_tx(10, vec![send_packet_event(7, "0-500", 0)]);

    let err = p
        .relay(8, ChannelOrder::Unordered, ChannelState::Open)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayerError::InvalidQueryResponse(_)));
}

#[tokio::test]
async fn test_acknowledgement_from_sequence() {
    let p = path();
    p.dst_chain.add_searchable_tx(
        60,
        vec![AbciEvent::new(
            "write_acknowledgement",
            &[
                ("packet_sequence", "3"),
                ("packet_src_port", "transfer"),
                ("packet_src_channel", "channel-0"),
                ("packet_dst_port", "transfer"),
                ("packet_dst_channel", "channel-7"),
                ("packet_data", "{}"),
                ("packet_ack_hex", "7b22726573756c74223a2241513d3d227d"),
                ("packet_timeout_height", "0-500"),
            ],
        )],
    );
    p.dst_chain
        .set_store(packet_acknowledgement_key("transfer", "channel-7", 3), vec![0x02; 32]);

    let msg = p
        .src
        .acknowledgement_from_sequence(&p.dst, 80, 3, "channel-7", "transfer", &Cancellation::never())
        .await
        .unwrap();

    let ack: MsgAcknowledgement = decode_message(&*msg).unwrap();
    assert_eq!(ack.acknowledgement, br#"{"result":"AQ=="}"#.to_vec());
    assert_eq!(ack.proof_height, Some(Height::new(0, 80).into()));
    assert_eq!(ack.packet.unwrap().sequence, 3);
    assert_eq!(
        p.dst_chain.proof_queries(),
        vec![(79, packet_acknowledgement_key("transfer", "channel-7", 3))]
    );
}

#[tokio::test]
async fn test_unwritten_acknowledgement_is_an_error() {
    let p = path();
    p.dst_chain.add_searchable_tx(
        60,
        vec![AbciEvent::new(
            "write_acknowledgement",
            &[
                ("packet_sequence", "3"),
                ("packet_dst_port", "transfer"),
                ("packet_dst_channel", "channel-7"),
                ("packet_ack", "ok"),
            ],
        )],
    );

    let err = p
        .src
        .acknowledgement_from_sequence(&p.dst, 80, 3, "channel-7", "transfer", &Cancellation::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayerError::InvalidQueryResponse(ref m) if m == "invalid acknowledgement"));
}

fn store_client_state(chain: &MockChain, client_id: &str, latest: Height) {
    let client_state = ClientState {
        chain_id: SRC_CHAIN.to_string(),
        latest_height: Some(latest.into()),
        ..Default::default()
    };
    let any = Any {
        type_url: ClientState::TYPE_URL.to_string(),
        value: client_state.encode_to_vec(),
    };
    chain.set_store(client_state_key(client_id), any.encode_to_vec());
}

fn update_header(trusted_height: u64) -> Header {
    Header {
        trusted_height: Some(Height::new(1, trusted_height).into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_inject_trusted_fields_uses_next_validators() {
    let p = path();
    store_client_state(&p.dst_chain, "07-tendermint-0", Height::new(1, 1000));
    p.src_chain.add_light_block(1000, 10);
    p.src_chain.add_light_block(1001, 11);

    let header = p
        .src
        .inject_trusted_fields(update_header(990), &p.dst, "07-tendermint-0", &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(header.trusted_height, Some(Height::new(1, 1000).into()));
    assert_eq!(header.trusted_validators.unwrap().total_voting_power, 11);
    assert_eq!(p.src_chain.light_block_queries(), vec![1001]);
    assert_eq!(
        p.dst_chain.proof_queries(),
        vec![(989, client_state_key("07-tendermint-0"))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_pruned_trusted_header() {
    let p = path();
    store_client_state(&p.dst_chain, "07-tendermint-0", Height::new(1, 1000));
    let policy = RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(10),
        last_error_only: true,
    };

    let err = ibc_tx_relayer::relay::inject_trusted_fields(
        &p.src,
        update_header(990),
        &p.dst,
        "07-tendermint-0",
        &policy,
        &Cancellation::never(),
    )
    .await
    .unwrap_err();

    match err {
        RelayerError::PrunedHeader { height, source } => {
            assert_eq!(height, 1000);
            assert!(matches!(*source, RelayerError::Rpc(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(p.src_chain.light_block_queries(), vec![1001, 1001]);
}

#[tokio::test]
async fn test_ibc_header_at_zero_height() {
    let p = path();
    let err = p.src.query_ibc_header(0).await.unwrap_err();
    assert!(matches!(err, RelayerError::InvalidHeight(_)));
    assert!(p.src_chain.light_block_queries().is_empty());
}

#[tokio::test]
async fn test_latest_block_and_validator_set() {
    let p = path();
    p.src_chain.add_light_block(1000, 42);

    let latest = p.src.latest_block().await.unwrap();
    assert_eq!(latest.height, 100);
    assert_eq!(latest.time, block_time_at(100));

    let validators = p.src.query_validator_set(1000).await.unwrap();
    assert_eq!(validators.total_voting_power, 42);
    assert!(p.src.query_validator_set(999).await.is_err());
}
