// IBC relayer core: Cosmos transaction pipeline and packet relay engine
//
// Transports, key storage and the relay loop live in the embedding binary;
// this crate consumes a chain through `ChainRpc` and exposes providers that
// build, sign, broadcast and confirm transactions and decide how packets move.

pub mod cancel;
pub mod chains;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod proto;
pub mod relay;
pub mod retry;
pub mod sdk_error;

// Re-export commonly used types for convenience
pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use chains::cosmos::{CosmosProviderConfig, KeyLocks, KeySigner, PendingTx, Secp256k1Key, TxConfirmation};
pub use chains::{ChainRpc, CosmosProvider, TxResponse};
pub use config::{ChainConfig, GlobalConfig, RelayerConfig};
pub use error::RelayerError;
pub use message::{CosmosMessage, RelayerMessage};
pub use metrics::RelayerMetrics;
pub use relay::{ChainProvider, ChannelOrder, ChannelState, PacketInfo, RelayPacketMsg};
pub use retry::RetryPolicy;
