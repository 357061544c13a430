//! Core data types shared by the processors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Semantic version of a transaction family
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Create a new version
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Check if this version is compatible with another version
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(ValidationError::malformed(format!(
                "version '{}' is not major.minor.patch",
                s
            )));
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                ValidationError::malformed(format!("version '{}' is not numeric", s))
            })?;
        }
        Ok(Version::new(numbers[0], numbers[1], numbers[2]))
    }
}

/// Blake3 digest of the full contents of a state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHash(pub [u8; 32]);

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hex encoded public key of a signer or exchange party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PublicKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for PublicKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Identifier shared by every proposal targeting the same outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ballot value recorded against a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Accept,
    Reject,
}

/// Unsigned integer carried as a little-endian byte string
///
/// The width on the wire is chosen by the client. Arithmetic only accepts
/// values whose significant bytes fit in 64 bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeUint(pub Vec<u8>);

impl LeUint {
    /// Encode `value` using exactly `width` bytes, truncating high bytes
    pub fn with_width(value: u64, width: usize) -> Self {
        let mut bytes = value.to_le_bytes().to_vec();
        bytes.resize(width, 0);
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode to u64, or `None` when a set byte lies beyond the eighth
    pub fn to_u64(&self) -> Option<u64> {
        if self.0.iter().skip(8).any(|b| *b != 0) {
            return None;
        }
        let mut buf = [0u8; 8];
        for (slot, byte) in buf.iter_mut().zip(self.0.iter()) {
            *slot = *byte;
        }
        Some(u64::from_le_bytes(buf))
    }
}

impl From<u64> for LeUint {
    fn from(value: u64) -> Self {
        Self::with_width(value, 8)
    }
}

/// The three dimensions of an exchanged amount
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub value: LeUint,
    pub value_unit: LeUint,
    pub resource_unit: LeUint,
}

/// Names of the quantity fields in balance order
pub const QUANTITY_FIELDS: [&str; 3] = ["value", "value_unit", "resource_unit"];

impl Quantity {
    pub fn new(value: u64, value_unit: u64, resource_unit: u64) -> Self {
        Self {
            value: value.into(),
            value_unit: value_unit.into(),
            resource_unit: resource_unit.into(),
        }
    }

    /// Fields paired with their names, in balance order
    pub fn fields(&self) -> [(&'static str, &LeUint); 3] {
        [
            (QUANTITY_FIELDS[0], &self.value),
            (QUANTITY_FIELDS[1], &self.value_unit),
            (QUANTITY_FIELDS[2], &self.resource_unit),
        ]
    }

    /// Decode every field, rejecting empty or oversized encodings
    pub fn decode(&self, label: &str) -> Result<[u64; 3], ValidationError> {
        let mut out = [0u64; 3];
        for (slot, (name, field)) in out.iter_mut().zip(self.fields()) {
            if field.is_empty() {
                return Err(ValidationError::malformed(format!("{}.{} is missing", label, name)));
            }
            *slot = field.to_u64().ok_or_else(|| {
                ValidationError::malformed(format!("{}.{} exceeds 64 bits", label, name))
            })?;
        }
        Ok(out)
    }
}

/// Exchange ratio applied field by field to an initiate quantity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: Quantity,
    pub denominator: Quantity,
}

impl Ratio {
    pub fn new(numerator: Quantity, denominator: Quantity) -> Self {
        Self { numerator, denominator }
    }
}
