// Registry of Cosmos SDK root-codespace errors
use std::fmt;

/// Codespace of errors registered by the Cosmos SDK itself
pub const ROOT_CODESPACE: &str = "sdk";

/// A chain error registered under a (codespace, code) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkError {
    pub codespace: &'static str,
    pub code: u32,
    pub description: &'static str,
}

impl SdkError {
    const fn root(code: u32, description: &'static str) -> Self {
        Self {
            codespace: ROOT_CODESPACE,
            code,
            description,
        }
    }

    /// Errors that a fresh attempt can get past: a stale sequence or a full mempool.
    pub fn is_retryable(&self) -> bool {
        self.codespace == ROOT_CODESPACE && matches!(self.code, 20 | 32)
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description)
    }
}

impl std::error::Error for SdkError {}

pub const ERR_OUT_OF_GAS: SdkError = SdkError::root(11, "out of gas");
pub const ERR_INSUFFICIENT_FEE: SdkError = SdkError::root(13, "insufficient fee");
pub const ERR_TX_IN_MEMPOOL_CACHE: SdkError = SdkError::root(19, "tx already in mempool");
pub const ERR_WRONG_SEQUENCE: SdkError = SdkError::root(32, "incorrect account sequence");

const ROOT_ERRORS: &[SdkError] = &[
    SdkError::root(2, "tx parse error"),
    SdkError::root(3, "invalid sequence"),
    SdkError::root(4, "unauthorized"),
    SdkError::root(5, "insufficient funds"),
    SdkError::root(6, "unknown request"),
    SdkError::root(7, "invalid address"),
    SdkError::root(8, "invalid pubkey"),
    SdkError::root(9, "unknown address"),
    SdkError::root(10, "invalid coins"),
    ERR_OUT_OF_GAS,
    SdkError::root(12, "memo too large"),
    ERR_INSUFFICIENT_FEE,
    SdkError::root(14, "maximum number of signatures exceeded"),
    SdkError::root(15, "no signatures supplied"),
    SdkError::root(16, "failed to marshal JSON bytes"),
    SdkError::root(17, "failed to unmarshal JSON bytes"),
    SdkError::root(18, "invalid request"),
    ERR_TX_IN_MEMPOOL_CACHE,
    SdkError::root(20, "mempool is full"),
    SdkError::root(21, "tx too large"),
    SdkError::root(22, "key not found"),
    SdkError::root(23, "invalid account password"),
    SdkError::root(24, "tx intended signer does not match the given signer"),
    SdkError::root(25, "invalid gas adjustment"),
    SdkError::root(26, "invalid height"),
    SdkError::root(27, "invalid version"),
    SdkError::root(28, "invalid chain-id"),
    SdkError::root(29, "invalid type"),
    SdkError::root(30, "tx timeout height"),
    SdkError::root(31, "unknown extension options"),
    ERR_WRONG_SEQUENCE,
    SdkError::root(33, "failed packing protobuf message to Any"),
    SdkError::root(34, "failed unpacking protobuf message from Any"),
    SdkError::root(35, "internal logic error"),
    SdkError::root(36, "conflict"),
    SdkError::root(37, "feature not supported"),
    SdkError::root(38, "not found"),
    SdkError::root(39, "Internal IO error"),
    SdkError::root(40, "error in app.toml"),
    SdkError::root(41, "invalid gas limit"),
];

/// Resolve a registered error for a (codespace, code) pair, `None` when unknown.
pub fn resolve_known_error(codespace: &str, code: u32) -> Option<SdkError> {
    if codespace != ROOT_CODESPACE {
        return None;
    }
    ROOT_ERRORS.iter().find(|e| e.code == code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_root_codes() {
        assert_eq!(resolve_known_error("sdk", 32), Some(ERR_WRONG_SEQUENCE));
        assert_eq!(resolve_known_error("sdk", 11).unwrap().description, "out of gas");
        assert_eq!(resolve_known_error("sdk", 41).unwrap().description, "invalid gas limit");
    }

    #[test]
    fn test_unknown_pairs() {
        assert!(resolve_known_error("sdk", 1).is_none());
        assert!(resolve_known_error("sdk", 9999).is_none());
        assert!(resolve_known_error("ibc", 32).is_none());
        assert!(resolve_known_error("", 0).is_none());
    }
}
