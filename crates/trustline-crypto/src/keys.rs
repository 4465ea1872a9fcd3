use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Local peering secret: a 32-byte seed shared out-of-band with nobody.
/// The X25519 scalar is derived as SHA-256 of the seed, so the raw seed
/// never acts as a curve key directly. Zeroized on drop.
pub struct Secret {
    seed: [u8; 32],
}

impl Secret {
    /// Generate a new random secret using OS-provided entropy.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self { seed }
    }

    /// Create a secret from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    /// Create a secret from raw bytes (must be 32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        Ok(Self { seed })
    }

    /// Decode a secret from a base64url (unpadded) string.
    pub fn from_base64url(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(format!("invalid base64url: {}", e)))?;
        let secret = Self::from_bytes(&bytes);
        bytes.zeroize();
        secret
    }

    /// Derive the X25519 public key for this secret.
    pub fn public_key(&self) -> PublicKey {
        let public = X25519PublicKey::from(&self.scalar());
        PublicKey { key: public }
    }

    /// Perform the Diffie-Hellman exchange with a peer's public key.
    ///
    /// Both sides arrive at the same 32-byte shared secret; the auth token
    /// and store namespace are derived from it.
    pub fn shared_secret(&self, peer: &PublicKey) -> SharedSecret {
        let shared = self.scalar().diffie_hellman(&peer.key);
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }

    /// The X25519 scalar: SHA-256 of the seed.
    fn scalar(&self) -> StaticSecret {
        let digest: [u8; 32] = Sha256::digest(self.seed).into();
        StaticSecret::from(digest)
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self { seed: self.seed }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print seed material
        f.write_str("Secret(..)")
    }
}

/// X25519 public key of a peering endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: X25519PublicKey,
}

impl PublicKey {
    /// Create from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self {
            key: X25519PublicKey::from(arr),
        })
    }

    /// Decode from a base64url (unpadded) string.
    pub fn from_base64url(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(format!("invalid base64url: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes (32 bytes).
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Encode as a base64url (unpadded) string, the wire form of peer identities.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.as_bytes())
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64url())
    }
}

/// Result of the X25519 exchange. Zeroized on drop.
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Get the raw bytes (32 bytes).
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
