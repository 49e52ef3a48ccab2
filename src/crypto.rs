//! Cryptographic primitives for Emberchain
//!
//! All digests in the system are SHA3-256: block hashes, transaction ids,
//! Merkle nodes and addresses. Signatures are secp256k1 ECDSA in compact
//! form over a transaction's signable payload.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha3::{Digest, Sha3_256};
use std::fs;
use std::path::Path;

/// A thread-safe, lazily initialized Secp256k1 context.
/// This prevents repeated, unnecessary context creation.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Type alias for the derived address, which is a 32-byte hash.
/// We use a fixed-size array for internal type safety and performance.
pub type Address = [u8; 32];

/// SHA3-256 digest of arbitrary bytes.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

/// Convenience function to create an address from a string (hashes the string).
/// Useful for testing and fixed premine addresses.
pub fn address_from_string(s: &str) -> Address {
    sha3_256(s.as_bytes())
}

/// Convert an address to a hex string for display.
pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

/// Convert a hex string to an address.
pub fn address_from_hex(hex_str: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| ChainError::Crypto(format!("Invalid hex address: {}", e)))?;
    if bytes.len() != 32 {
        return Err(ChainError::Crypto(format!(
            "Address must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| ChainError::Crypto("Failed to convert bytes into address".to_string()))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    /// Creates a KeyPair from an existing SecretKey.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Computes the node address (SHA3-256 hash of the compressed public key).
    pub fn address(&self) -> Address {
        let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = self.public_key.serialize();
        sha3_256(&pubkey_bytes)
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a message (which is first hashed using SHA3-256) and returns the
    /// compact signature bytes.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = sha3_256(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);

        let compact_sig_bytes: [u8; COMPACT_SIGNATURE_SIZE] = signature.serialize_compact();
        Ok(compact_sig_bytes)
    }

    /// Writes the secret key to `path` as a single hex line.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ChainError> {
        let encoded = hex::encode(self.secret_key.secret_bytes());
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Loads a keypair from a hex-encoded secret key file written by
    /// [`KeyPair::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self, ChainError> {
        let contents = fs::read_to_string(path)?;
        let bytes = hex::decode(contents.trim())
            .map_err(|e| ChainError::Crypto(format!("Invalid key file: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and
/// signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::Crypto(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::Crypto(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::Crypto(format!("Invalid public key: {}", e)))?;

    let digest = sha3_256(message);

    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::Crypto(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::Crypto(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::Crypto("Signature verification failed".to_string()))
}
