// Chain-agnostic outgoing message wrapper
use std::fmt;

use prost::Message;
use prost_types::Any;

use crate::error::RelayerError;
use crate::proto::TypeUrl;

/// An outgoing message, opaque to everything but the provider that submits it.
pub trait RelayerMessage: Send + Sync + fmt::Debug {
    /// Fully-qualified message type, used for logging
    fn type_url(&self) -> &str;

    /// Wire bytes of the message body
    fn msg_bytes(&self) -> Result<Vec<u8>, RelayerError>;

    /// Protobuf `Any` packing, for providers that speak the Cosmos tx format
    fn to_proto_any(&self) -> Result<Any, RelayerError> {
        Ok(Any {
            type_url: self.type_url().to_string(),
            value: self.msg_bytes()?,
        })
    }
}

/// A Cosmos SDK message already packed into an `Any`.
#[derive(Clone, PartialEq)]
pub struct CosmosMessage {
    msg: Any,
}

impl CosmosMessage {
    pub fn new<M: Message + TypeUrl>(msg: &M) -> Self {
        Self {
            msg: Any {
                type_url: M::TYPE_URL.to_string(),
                value: msg.encode_to_vec(),
            },
        }
    }

    pub fn from_any(msg: Any) -> Self {
        Self { msg }
    }

    /// Decode the wrapped message back into its concrete type
    pub fn decode<M: Message + TypeUrl + Default>(&self) -> Result<M, RelayerError> {
        if self.msg.type_url != M::TYPE_URL {
            return Err(RelayerError::Decode(format!(
                "expected {}, found {}",
                M::TYPE_URL,
                self.msg.type_url
            )));
        }
        Ok(M::decode(self.msg.value.as_slice())?)
    }

    pub fn boxed(self) -> Box<dyn RelayerMessage> {
        Box::new(self)
    }
}

impl fmt::Debug for CosmosMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosMessage")
            .field("type_url", &self.msg.type_url)
            .field("len", &self.msg.value.len())
            .finish()
    }
}

impl RelayerMessage for CosmosMessage {
    fn type_url(&self) -> &str {
        &self.msg.type_url
    }

    fn msg_bytes(&self) -> Result<Vec<u8>, RelayerError> {
        Ok(self.msg.value.clone())
    }

    fn to_proto_any(&self) -> Result<Any, RelayerError> {
        Ok(self.msg.clone())
    }
}

/// Decode a boxed message produced by this crate's builders
pub fn decode_message<M: Message + TypeUrl + Default>(
    msg: &dyn RelayerMessage,
) -> Result<M, RelayerError> {
    CosmosMessage::from_any(msg.to_proto_any()?).decode()
}

/// Type URLs of a message set, for log context
pub fn type_urls(msgs: &[Box<dyn RelayerMessage>]) -> Vec<String> {
    msgs.iter().map(|m| m.type_url().to_string()).collect()
}
