//! Canonical encoding of payloads and state cells
//!
//! Every node must produce byte-identical cells for the same entity, so state
//! is always written with bincode's fixed configuration. Failures are mapped
//! by origin: bytes submitted by a client are a validation problem, bytes read
//! back from the store are an internal one.

use serde::{de::DeserializeOwned, Serialize};

use crate::address::Address;
use crate::error::{InternalError, ValidationError};

/// Pluggable codec for stored entities
pub trait EntityCodec: Send + Sync {
    /// Encode a value for storage
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, InternalError>;

    /// Decode a value read back from `address`
    fn decode_stored<T: DeserializeOwned>(
        &self,
        address: &Address,
        bytes: &[u8],
    ) -> Result<T, InternalError>;

    /// Decode a value supplied by a client
    fn decode_request<T: DeserializeOwned>(
        &self,
        what: &str,
        bytes: &[u8],
    ) -> Result<T, ValidationError>;

    /// Get the name of this encoding
    fn name(&self) -> &str;
}

/// Bincode backend used for all state cells
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl EntityCodec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, InternalError> {
        bincode::serialize(value).map_err(|e| InternalError::Encoding {
            reason: format!("Bincode serialization failed: {}", e),
        })
    }

    fn decode_stored<T: DeserializeOwned>(
        &self,
        address: &Address,
        bytes: &[u8],
    ) -> Result<T, InternalError> {
        bincode::deserialize(bytes).map_err(|e| InternalError::CorruptState {
            address: address.to_string(),
            reason: format!("Bincode deserialization failed: {}", e),
        })
    }

    fn decode_request<T: DeserializeOwned>(
        &self,
        what: &str,
        bytes: &[u8],
    ) -> Result<T, ValidationError> {
        bincode::deserialize(bytes).map_err(|e| {
            ValidationError::malformed(format!("{} could not be decoded: {}", what, e))
        })
    }

    fn name(&self) -> &str {
        "bincode"
    }
}

/// Encode with the canonical codec
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, InternalError> {
    BincodeCodec.encode(value)
}

/// Decode a stored cell with the canonical codec
pub fn decode_stored<T: DeserializeOwned>(
    address: &Address,
    bytes: &[u8],
) -> Result<T, InternalError> {
    BincodeCodec.decode_stored(address, bytes)
}

/// Decode client supplied bytes with the canonical codec
pub fn decode_request<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T, ValidationError> {
    BincodeCodec.decode_request(what, bytes)
}
