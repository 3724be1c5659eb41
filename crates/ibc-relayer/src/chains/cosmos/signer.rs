// Signing keys for Cosmos transactions
use bech32::{ToBase32, Variant};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::RelayerError;

/// Type URL of a secp256k1 public key inside `SignerInfo`
pub const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// A key able to sign Cosmos sign docs. Key storage lives outside the crate;
/// implementations only expose what the tx pipeline needs.
pub trait KeySigner: Send + Sync {
    fn key_name(&self) -> &str;

    /// Compressed public key (33 bytes)
    fn public_key(&self) -> Vec<u8>;

    /// Bech32 account address under `prefix`
    fn address(&self, prefix: &str) -> Result<String, RelayerError>;

    /// Sign the SHA-256 digest of `sign_bytes`, returning a 64-byte compact signature
    fn sign(&self, sign_bytes: &[u8]) -> Result<Vec<u8>, RelayerError>;
}

/// In-memory secp256k1 key
pub struct Secp256k1Key {
    name: String,
    secret_key: secp256k1::SecretKey,
    public_key: secp256k1::PublicKey,
}

impl Secp256k1Key {
    pub fn from_private_key(name: &str, private_key: &[u8]) -> Result<Self, RelayerError> {
        if private_key.len() != 32 {
            return Err(RelayerError::KeyResolution(
                "private key must be 32 bytes".to_string(),
            ));
        }
        let secp = secp256k1::Secp256k1::new();
        let secret_key = secp256k1::SecretKey::from_slice(private_key)
            .map_err(|e| RelayerError::KeyResolution(format!("invalid private key: {}", e)))?;
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);

        Ok(Self {
            name: name.to_string(),
            secret_key,
            public_key,
        })
    }

    /// Parse a hex-encoded private key
    pub fn from_hex(name: &str, hex_key: &str) -> Result<Self, RelayerError> {
        let private_key = hex::decode(hex_key.trim())
            .map_err(|e| RelayerError::KeyResolution(format!("invalid hex key: {}", e)))?;
        Self::from_private_key(name, &private_key)
    }
}

impl std::fmt::Debug for Secp256k1Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1Key")
            .field("name", &self.name)
            .field("public_key", &hex::encode(self.public_key.serialize()))
            .finish()
    }
}

impl KeySigner for Secp256k1Key {
    fn key_name(&self) -> &str {
        &self.name
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    fn address(&self, prefix: &str) -> Result<String, RelayerError> {
        let sha = Sha256::digest(self.public_key.serialize());
        let account = Ripemd160::digest(sha);
        bech32::encode(prefix, account.to_base32(), Variant::Bech32)
            .map_err(|e| RelayerError::KeyResolution(format!("bech32 encoding failed: {}", e)))
    }

    fn sign(&self, sign_bytes: &[u8]) -> Result<Vec<u8>, RelayerError> {
        let secp = secp256k1::Secp256k1::signing_only();
        let digest = Sha256::digest(sign_bytes);
        let message = secp256k1::Message::from_digest_slice(&digest)
            .map_err(|e| RelayerError::Signing(format!("invalid message hash: {}", e)))?;
        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact().to_vec())
    }
}
