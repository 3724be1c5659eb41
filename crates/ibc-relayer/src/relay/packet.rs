// Packet records, timeout rules and validation
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use ibc_proto::ibc::core::channel::v1::{Order, Packet as RawPacket};
use ibc_proto::ibc::core::client::v1::Height as RawHeight;
use regex::Regex;
use thiserror::Error;

/// IBC height: revision number then revision height, ordered lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Height {
    pub revision_number: u64,
    pub revision_height: u64,
}

impl Height {
    pub const fn new(revision_number: u64, revision_height: u64) -> Self {
        Self {
            revision_number,
            revision_height,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.revision_number == 0 && self.revision_height == 0
    }

    /// Height held in an optional protobuf field, zero when the field is unset
    pub fn from_proto(height: Option<&RawHeight>) -> Self {
        height
            .map(|h| Self::new(h.revision_number, h.revision_height))
            .unwrap_or_default()
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

impl FromStr for Height {
    type Err = String;

    /// Parse the "revision-height" form used in packet events
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, height) = s
            .split_once('-')
            .ok_or_else(|| format!("expected <revision>-<height>, got {:?}", s))?;
        let revision_number = number.parse().map_err(|e| format!("invalid revision number: {}", e))?;
        let revision_height = height.parse().map_err(|e| format!("invalid revision height: {}", e))?;
        Ok(Self::new(revision_number, revision_height))
    }
}

impl From<RawHeight> for Height {
    fn from(h: RawHeight) -> Self {
        Self::new(h.revision_number, h.revision_height)
    }
}

impl From<Height> for RawHeight {
    fn from(h: Height) -> Self {
        RawHeight {
            revision_number: h.revision_number,
            revision_height: h.revision_height,
        }
    }
}

fn revision_format() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*[^\n-]-[1-9][0-9]*$").expect("static regex"))
}

/// Revision number encoded in a chain id (`name-N` -> N); 0 when the id has
/// no revision suffix.
pub fn parse_chain_id(chain_id: &str) -> u64 {
    if !revision_format().is_match(chain_id) {
        return 0;
    }
    chain_id
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    Unordered,
    Ordered,
}

impl ChannelOrder {
    pub fn as_proto(&self) -> Order {
        match self {
            ChannelOrder::Unordered => Order::Unordered,
            ChannelOrder::Ordered => Order::Ordered,
        }
    }

    pub fn from_proto(order: i32) -> Option<Self> {
        match Order::try_from(order).ok()? {
            Order::Unordered => Some(ChannelOrder::Unordered),
            Order::Ordered => Some(ChannelOrder::Ordered),
            _ => None,
        }
    }
}

/// Channel condition observed by the caller at relay time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Open,
    Closed,
}

/// A packet as recorded by its send (and, for acknowledgements, receive) events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketInfo {
    /// Height of the tx that emitted the packet event
    pub height: u64,
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub dest_port: String,
    pub dest_channel: String,
    pub data: Vec<u8>,
    pub timeout_height: Height,
    pub timeout_timestamp: u64,
    /// Acknowledgement bytes, only set on acknowledgement flows
    pub ack: Vec<u8>,
}

impl PacketInfo {
    pub fn to_proto(&self) -> RawPacket {
        RawPacket {
            sequence: self.sequence,
            source_port: self.source_port.clone(),
            source_channel: self.source_channel.clone(),
            destination_port: self.dest_port.clone(),
            destination_channel: self.dest_channel.clone(),
            data: self.data.clone(),
            timeout_height: Some(self.timeout_height.into()),
            timeout_timestamp: self.timeout_timestamp,
        }
    }
}

/// Which timeout rule expired a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketTimeout {
    Height,
    Timestamp,
    ChannelClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("refusing to relay packet with sequence: 0")]
    ZeroSequence,

    #[error("refusing to relay packet with empty data")]
    EmptyData,

    #[error("refusing to relay packet without a timeout (height or timestamp must be set)")]
    MissingTimeout,

    #[error("latest height {latest} is greater than expiration height: {timeout}")]
    TimeoutHeight { latest: u64, timeout: u64 },

    #[error("latest block timestamp {latest} is greater than expiration timestamp: {timeout}")]
    TimeoutTimestamp { latest: u64, timeout: u64 },

    #[error("packet timed out on channel close: sequence {sequence}")]
    TimeoutOnClose { sequence: u64 },
}

impl PacketError {
    /// The expired rule, `None` for protocol violations
    pub fn timeout(&self) -> Option<PacketTimeout> {
        match self {
            PacketError::TimeoutHeight { .. } => Some(PacketTimeout::Height),
            PacketError::TimeoutTimestamp { .. } => Some(PacketTimeout::Timestamp),
            PacketError::TimeoutOnClose { .. } => Some(PacketTimeout::ChannelClosed),
            _ => None,
        }
    }
}

/// Destination chain's view used to judge timeouts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestBlock {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl LatestBlock {
    /// Block time in unix nanoseconds, saturating outside the representable range
    pub fn timestamp_nanos(&self) -> u64 {
        self.time
            .timestamp_nanos_opt()
            .map(|n| n.max(0) as u64)
            .unwrap_or(u64::MAX)
    }
}

/// Check a packet before any proof is fetched.
///
/// Protocol violations come first; then height expiry, timestamp expiry and
/// a closed channel, in that order. `Ok` means the packet is deliverable.
pub fn validate_packet(
    packet: &PacketInfo,
    latest: &LatestBlock,
    dst_chain_id: &str,
    channel_state: ChannelState,
) -> Result<(), PacketError> {
    if packet.sequence == 0 {
        return Err(PacketError::ZeroSequence);
    }

    if packet.data.is_empty() {
        return Err(PacketError::EmptyData);
    }

    if packet.timeout_height.is_zero() && packet.timeout_timestamp == 0 {
        return Err(PacketError::MissingTimeout);
    }

    let revision = parse_chain_id(dst_chain_id);
    let latest_height = Height::new(revision, latest.height);
    if !packet.timeout_height.is_zero() && latest_height >= packet.timeout_height {
        return Err(PacketError::TimeoutHeight {
            latest: latest.height,
            timeout: packet.timeout_height.revision_height,
        });
    }

    let latest_timestamp = latest.timestamp_nanos();
    if packet.timeout_timestamp > 0 && latest_timestamp > packet.timeout_timestamp {
        return Err(PacketError::TimeoutTimestamp {
            latest: latest_timestamp,
            timeout: packet.timeout_timestamp,
        });
    }

    if channel_state == ChannelState::Closed {
        return Err(PacketError::TimeoutOnClose {
            sequence: packet.sequence,
        });
    }

    Ok(())
}
