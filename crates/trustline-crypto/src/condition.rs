//! SHA-256 hashlock primitives.
//!
//! A `Condition` is the 32-byte SHA-256 digest a transfer is locked to; the
//! matching `Fulfillment` is the preimage. Both travel as unpadded base64url
//! strings on the wire.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// A SHA-256 execution condition (hashlock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition([u8; 32]);

impl Condition {
    /// Create from a raw 32-byte digest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidCondition(format!(
                "condition must be 32 bytes, got {}",
                bytes.len()
            )))?;
        Ok(Self(arr))
    }

    /// Decode from a base64url (unpadded) string.
    pub fn from_base64url(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidCondition(format!("invalid base64url: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as a base64url (unpadded) string.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64url())
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64url(&encoded).map_err(D::Error::custom)
    }
}

/// The preimage that fulfills a `Condition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment(Vec<u8>);

impl Fulfillment {
    /// Create from raw preimage bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode from a base64url (unpadded) string.
    pub fn from_base64url(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(format!("invalid base64url: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Get the raw preimage bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as a base64url (unpadded) string.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Compute the condition this fulfillment commits to: SHA-256(preimage).
    pub fn condition(&self) -> Condition {
        let digest: [u8; 32] = Sha256::digest(&self.0).into();
        Condition(digest)
    }

    /// Check this preimage against a condition, byte for byte.
    pub fn validate(&self, condition: &Condition) -> bool {
        self.condition() == *condition
    }
}

impl std::fmt::Display for Fulfillment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64url())
    }
}

impl Serialize for Fulfillment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for Fulfillment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64url(&encoded).map_err(D::Error::custom)
    }
}
