//! Deterministic state addressing
//!
//! Every entity lives at a 70 hex character address assembled from truncated
//! SHA-512 digests of fixed literals followed by an entity specific suffix.
//! Clients and voters compute the same addresses independently, so nothing in
//! here may depend on anything but its arguments.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;

use crate::error::ValidationError;

/// Length of every leaf address in hex characters
pub const ADDRESS_LENGTH: usize = 70;

/// Width of a literal segment in hex characters
pub const SEGMENT_LENGTH: usize = 6;

/// Namespace used by the ledger's existing address space
pub const DEFAULT_NAMESPACE: &str = "hashblock";

const CANDIDATES_LITERAL: &str = "candidates";
const FILLER_LITERAL: &str = "filler";
const SETTINGS_FILLER_LENGTH: usize = 52;
const CANDIDATES_FILLER_LENGTH: usize = 46;
const ASSET_KEY_LENGTH: usize = 46;
const EXCHANGE_IDENT_LENGTH: usize = 45;
const MATCHED_FLAG_INDEX: usize = 4 * SEGMENT_LENGTH;

/// Transaction families that own part of the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Setting,
    Asset,
    Match,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Setting, Family::Asset, Family::Match];

    pub fn literal(&self) -> &'static str {
        match self {
            Family::Setting => "setting",
            Family::Asset => "asset",
            Family::Match => "match",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// Category of entity within a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Unit,
    Resource,
    Utxq,
    Mtxq,
}

impl Dimension {
    pub const ALL: [Dimension; 4] =
        [Dimension::Unit, Dimension::Resource, Dimension::Utxq, Dimension::Mtxq];

    pub fn literal(&self) -> &'static str {
        match self {
            Dimension::Unit => "unit",
            Dimension::Resource => "resource",
            Dimension::Utxq => "utxq",
            Dimension::Mtxq => "mtxq",
        }
    }

    /// Dimensions that carry settings and candidates
    pub fn is_governed(&self) -> bool {
        matches!(self, Dimension::Unit | Dimension::Resource)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// Exchange operations; each initiate op has exactly one reciprocate op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeOp {
    Ask,
    Tell,
    Offer,
    Accept,
    Commitment,
    Obligation,
    Give,
    Take,
}

impl ExchangeOp {
    pub const ALL: [ExchangeOp; 8] = [
        ExchangeOp::Ask,
        ExchangeOp::Tell,
        ExchangeOp::Offer,
        ExchangeOp::Accept,
        ExchangeOp::Commitment,
        ExchangeOp::Obligation,
        ExchangeOp::Give,
        ExchangeOp::Take,
    ];

    pub fn literal(&self) -> &'static str {
        match self {
            ExchangeOp::Ask => "ask",
            ExchangeOp::Tell => "tell",
            ExchangeOp::Offer => "offer",
            ExchangeOp::Accept => "accept",
            ExchangeOp::Commitment => "commitment",
            ExchangeOp::Obligation => "obligation",
            ExchangeOp::Give => "give",
            ExchangeOp::Take => "take",
        }
    }

    pub fn is_initiate(&self) -> bool {
        matches!(
            self,
            ExchangeOp::Ask | ExchangeOp::Offer | ExchangeOp::Commitment | ExchangeOp::Give
        )
    }

    /// The op on the other side of the exchange
    pub fn counterpart(&self) -> ExchangeOp {
        match self {
            ExchangeOp::Ask => ExchangeOp::Tell,
            ExchangeOp::Tell => ExchangeOp::Ask,
            ExchangeOp::Offer => ExchangeOp::Accept,
            ExchangeOp::Accept => ExchangeOp::Offer,
            ExchangeOp::Commitment => ExchangeOp::Obligation,
            ExchangeOp::Obligation => ExchangeOp::Commitment,
            ExchangeOp::Give => ExchangeOp::Take,
            ExchangeOp::Take => ExchangeOp::Give,
        }
    }

    /// Dimension an address for this op lives under
    pub fn dimension(&self) -> Dimension {
        if self.is_initiate() {
            Dimension::Utxq
        } else {
            Dimension::Mtxq
        }
    }

    pub fn from_literal(literal: &str) -> Option<ExchangeOp> {
        Self::ALL.iter().copied().find(|op| op.literal() == literal)
    }
}

/// A validated leaf address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse a client supplied address, normalising to lowercase hex
    pub fn parse(value: &str) -> Result<Address, ValidationError> {
        if !AddressScheme::is_valid(value) {
            return Err(ValidationError::malformed(format!("'{}' is not a valid address", value)));
        }
        Ok(Address(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the matched flag of an exchange address is set
    pub fn is_matched_slot(&self) -> bool {
        self.0.as_bytes().get(MATCHED_FLAG_INDEX) == Some(&b'1')
    }

    fn with_matched_flag(&self, matched: bool) -> Address {
        let mut flagged = self.0.clone();
        let flag = if matched { "1" } else { "0" };
        flagged.replace_range(MATCHED_FLAG_INDEX..=MATCHED_FLAG_INDEX, flag);
        Address(flagged)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an address holds, recovered from its prefix segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Settings,
    Candidates,
    Item,
    Exchange { op: ExchangeOp, matched: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub family: Family,
    pub dimension: Dimension,
    pub subtype: Subtype,
}

/// Immutable address calculator for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressScheme {
    namespace: String,
    namespace_hash: String,
}

impl AddressScheme {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let namespace_hash = hash_segment(&namespace, SEGMENT_LENGTH);
        Self { namespace, namespace_hash }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Host visible family name, e.g. `hashblock_match`
    pub fn family_name(&self, family: Family) -> String {
        format!("{}_{}", self.namespace, family.literal())
    }

    /// Namespace plus family prefix the host routes on
    pub fn family_prefix(&self, family: Family) -> String {
        format!("{}{}", self.namespace_hash, hash_segment(family.literal(), SEGMENT_LENGTH))
    }

    /// Generic entry point over `(family, dimension, key parts)`
    ///
    /// Settings take no key parts, candidates take `["candidates"]`, assets take
    /// `[system, key]` and exchange entries take `[op, ident]`.
    pub fn address(
        &self,
        family: Family,
        dimension: Dimension,
        key_parts: &[&str],
    ) -> Result<Address, ValidationError> {
        match (family, key_parts) {
            (Family::Setting, []) if dimension.is_governed() => Ok(self.settings(dimension)),
            (_, [CANDIDATES_LITERAL]) if dimension.is_governed() && family != Family::Match => {
                Ok(self.candidates(family, dimension))
            }
            (Family::Asset, [system, key]) if dimension.is_governed() => {
                Ok(self.asset(dimension, system, key))
            }
            (Family::Match, [op, ident]) => {
                let op = ExchangeOp::from_literal(op).ok_or_else(|| {
                    ValidationError::malformed(format!("unknown exchange op '{}'", op))
                })?;
                if op.dimension() != dimension {
                    return Err(ValidationError::malformed(format!(
                        "{} is not a {} op",
                        op.literal(),
                        dimension
                    )));
                }
                Ok(self.exchange(op, ident))
            }
            _ => Err(ValidationError::malformed(format!(
                "{} key parts do not address {}.{}",
                key_parts.len(),
                family,
                dimension
            ))),
        }
    }

    // ns | setting | dimension | filler(52)
    pub fn settings(&self, dimension: Dimension) -> Address {
        Address(format!(
            "{}{}{}",
            self.family_prefix(Family::Setting),
            hash_segment(dimension.literal(), SEGMENT_LENGTH),
            hash_segment(FILLER_LITERAL, SETTINGS_FILLER_LENGTH)
        ))
    }

    // ns | family | candidates | dimension | filler(46)
    pub fn candidates(&self, family: Family, dimension: Dimension) -> Address {
        Address(format!(
            "{}{}{}{}",
            self.family_prefix(family),
            hash_segment(CANDIDATES_LITERAL, SEGMENT_LENGTH),
            hash_segment(dimension.literal(), SEGMENT_LENGTH),
            hash_segment(FILLER_LITERAL, CANDIDATES_FILLER_LENGTH)
        ))
    }

    // ns | asset | dimension | system | key(46)
    pub fn asset(&self, dimension: Dimension, system: &str, key: &str) -> Address {
        Address(format!(
            "{}{}{}{}",
            self.family_prefix(Family::Asset),
            hash_segment(dimension.literal(), SEGMENT_LENGTH),
            hash_segment(system, SEGMENT_LENGTH),
            hash_segment(key, ASSET_KEY_LENGTH)
        ))
    }

    // ns | match | utxq/mtxq | op | matched flag | ident(45)
    pub fn exchange(&self, op: ExchangeOp, ident: &str) -> Address {
        Address(format!(
            "{}{}{}0{}",
            self.family_prefix(Family::Match),
            hash_segment(op.dimension().literal(), SEGMENT_LENGTH),
            hash_segment(op.literal(), SEGMENT_LENGTH),
            hash_segment(ident, EXCHANGE_IDENT_LENGTH)
        ))
    }

    /// Slot that records the reciprocated copy of an initiate
    pub fn matched_slot(&self, address: &Address) -> Address {
        address.with_matched_flag(true)
    }

    /// Non-empty, even length, hex only and exactly leaf length
    pub fn is_valid(address: &str) -> bool {
        address.len() == ADDRESS_LENGTH && address.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Decompose an address into family, dimension and subtype
    pub fn classify(&self, address: &str) -> Option<Classification> {
        if !Self::is_valid(address) {
            return None;
        }
        let address = address.to_ascii_lowercase();
        let family = Family::ALL
            .iter()
            .copied()
            .find(|f| address.starts_with(&self.family_prefix(*f)))?;
        let rest = &address[2 * SEGMENT_LENGTH..];
        let segment = &rest[..SEGMENT_LENGTH];

        let candidates = segment == hash_segment(CANDIDATES_LITERAL, SEGMENT_LENGTH);

        match family {
            Family::Setting | Family::Asset if candidates => {
                let dimension = find_dimension(&rest[SEGMENT_LENGTH..2 * SEGMENT_LENGTH])?;
                let filler = &rest[2 * SEGMENT_LENGTH..];
                let expected = hash_segment(FILLER_LITERAL, CANDIDATES_FILLER_LENGTH);
                (dimension.is_governed() && filler == expected).then_some(Classification {
                    family,
                    dimension,
                    subtype: Subtype::Candidates,
                })
            }
            Family::Setting => {
                let dimension = find_dimension(segment)?;
                let expected = hash_segment(FILLER_LITERAL, SETTINGS_FILLER_LENGTH);
                (dimension.is_governed() && rest[SEGMENT_LENGTH..] == expected).then_some(
                    Classification {
                        family,
                        dimension,
                        subtype: Subtype::Settings,
                    },
                )
            }
            Family::Asset => {
                let dimension = find_dimension(segment)?;
                dimension
                    .is_governed()
                    .then_some(Classification { family, dimension, subtype: Subtype::Item })
            }
            Family::Match => {
                let dimension = find_dimension(segment)?;
                let op_segment = &rest[SEGMENT_LENGTH..2 * SEGMENT_LENGTH];
                let op = ExchangeOp::ALL
                    .iter()
                    .copied()
                    .find(|op| hash_segment(op.literal(), SEGMENT_LENGTH) == op_segment)?;
                let matched = match address.as_bytes()[MATCHED_FLAG_INDEX] {
                    b'0' => false,
                    b'1' => true,
                    _ => return None,
                };
                (op.dimension() == dimension).then_some(Classification {
                    family,
                    dimension,
                    subtype: Subtype::Exchange { op, matched },
                })
            }
        }
    }
}

impl Default for AddressScheme {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Lowercase hex SHA-512 of `value`, truncated to `length` characters
pub fn hash_segment(value: &str, length: usize) -> String {
    let digest = Sha512::digest(value.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(length);
    encoded
}

fn find_dimension(segment: &str) -> Option<Dimension> {
    Dimension::ALL
        .iter()
        .copied()
        .find(|d| hash_segment(d.literal(), SEGMENT_LENGTH) == segment)
}

/// Seeded generator of exchange identifiers
///
/// Clients pick a fresh ident for every initiate. Seeding makes fixtures and
/// replays reproducible; processors never draw randomness themselves.
#[derive(Debug)]
pub struct IdentGenerator {
    rng: ChaCha8Rng,
    seed: u64,
}

impl IdentGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 32 hex characters of fresh randomness
    pub fn next_ident(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

impl Clone for IdentGenerator {
    fn clone(&self) -> Self {
        // Restart from the seed so clones replay the same sequence
        Self::new(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_addresses_are_leaf_length() {
        let scheme = AddressScheme::default();
        let addresses = [
            scheme.settings(Dimension::Unit),
            scheme.candidates(Family::Asset, Dimension::Resource),
            scheme.asset(Dimension::Unit, "imperial", "foot"),
            scheme.exchange(ExchangeOp::Ask, "ident"),
        ];
        for address in &addresses {
            assert_eq!(address.as_str().len(), ADDRESS_LENGTH, "{}", address);
            assert!(AddressScheme::is_valid(address.as_str()));
        }
    }

    #[test]
    fn test_namespace_prefix_matches_sha512() {
        let scheme = AddressScheme::default();
        // sha512("hashblock")[0:6]
        assert_eq!(&scheme.family_prefix(Family::Asset)[..6], &hash_segment("hashblock", 6));
        assert_eq!(scheme.family_prefix(Family::Match).len(), 12);
    }

    #[test]
    fn test_matched_slot_flips_flag_only() {
        let scheme = AddressScheme::default();
        let unmatched = scheme.exchange(ExchangeOp::Offer, "abc");
        let matched = scheme.matched_slot(&unmatched);

        assert!(!unmatched.is_matched_slot());
        assert!(matched.is_matched_slot());
        let differing = unmatched
            .as_str()
            .chars()
            .zip(matched.as_str().chars())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(differing, 1);
    }

    #[test]
    fn test_generic_address_rejects_bad_arity() {
        let scheme = AddressScheme::default();
        assert!(scheme.address(Family::Asset, Dimension::Unit, &["imperial"]).is_err());
        assert!(scheme.address(Family::Setting, Dimension::Utxq, &[]).is_err());
        assert!(scheme.address(Family::Match, Dimension::Utxq, &["tell", "x"]).is_err());
        assert_eq!(
            scheme.address(Family::Match, Dimension::Mtxq, &["tell", "x"]).unwrap(),
            scheme.exchange(ExchangeOp::Tell, "x")
        );
    }

    #[test]
    fn test_ident_generator_is_reproducible() {
        let mut first = IdentGenerator::new(42);
        let mut second = first.clone();
        assert_eq!(first.next_ident(), second.next_ident());
        assert_eq!(first.next_ident().len(), 32);
        assert_ne!(IdentGenerator::new(1).next_ident(), IdentGenerator::new(2).next_ident());
    }
}
