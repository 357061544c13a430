//! Exchange matching: initiate, then reciprocate exactly once
//!
//! Direct mode stores plaintext UTXQ/MTXQ records and checks the balance
//! invariant itself. Opaque mode stores ciphertexts verbatim and delegates
//! the invariant to a [`ProofVerifier`].
//!
//! Both modes share one address space, so a match in either mode fills the
//! reciprocated slot of the initiate (its address with the matched flag set).
//! Every initiate and reciprocate refuses a `ukey` whose slot is taken.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::address::{Address, AddressScheme, Family, Subtype};
use crate::codec;
use crate::error::{InternalError, ProcessorError, ValidationError};
use crate::events::Event;
use crate::state::{Context, StateAccess, WriteSet};
use crate::traits::Entity;
use crate::types::{PublicKey, Quantity, Ratio, QUANTITY_FIELDS};
use crate::verifier::ProofVerifier;

const STEP_INITIATE: &str = "initiate";
const STEP_RECIPROCATE: &str = "reciprocate";

/// Fields shared by both sides of an exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub plus: PublicKey,
    pub minus: PublicKey,
    pub quantity: Quantity,
}

impl Exchange {
    pub fn new(
        plus: impl Into<PublicKey>,
        minus: impl Into<PublicKey>,
        quantity: Quantity,
    ) -> Self {
        Self {
            plus: plus.into(),
            minus: minus.into(),
            quantity,
        }
    }

    /// Whether `other` has exactly the swapped parties of `self`
    pub fn mirrors(&self, other: &Exchange) -> bool {
        self.plus == other.minus && self.minus == other.plus
    }
}

impl Entity for Exchange {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.plus.is_empty() || self.minus.is_empty() {
            return Err(ValidationError::malformed("plus and minus keys are required"));
        }
        if self.plus == self.minus {
            return Err(ValidationError::malformed("plus and minus must differ"));
        }
        self.quantity.decode("quantity").map(|_| ())
    }
}

/// Unmatched initiate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxq {
    pub exchange: Exchange,
    pub matched: bool,
}

impl Utxq {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            matched: false,
        }
    }
}

impl Entity for Utxq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.exchange.validate()
    }
}

/// What a reciprocating party submits in direct mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReciprocateRequest {
    pub exchange: Exchange,
    pub ratio: Ratio,
}

impl Entity for ReciprocateRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.exchange.validate()?;
        self.ratio.numerator.decode("ratio.numerator")?;
        let denominator = self.ratio.denominator.decode("ratio.denominator")?;
        if let Some(index) = denominator.iter().position(|d| *d == 0) {
            return Err(ValidationError::malformed(format!(
                "ratio.denominator.{} must not be zero",
                QUANTITY_FIELDS[index]
            )));
        }
        Ok(())
    }
}

/// Matched response, written once as the terminal step of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mtxq {
    pub exchange: Exchange,
    pub ratio: Ratio,
    pub utxq_address: Address,
    /// The initiate as it was stored after matching
    pub utxq: Utxq,
}

impl Entity for Mtxq {
    fn validate(&self) -> Result<(), ValidationError> {
        self.exchange.validate()?;
        self.utxq.validate()
    }
}

/// Cross-multiplied balance check, field by field
///
/// `reciprocate * denominator == initiate * numerator` in u128, so neither
/// truncating division nor overflow can hide an imbalance.
pub fn check_balance(
    initiate: &Quantity,
    reciprocate: &Quantity,
    ratio: &Ratio,
) -> Result<(), ValidationError> {
    let initiate = initiate.decode("initiate.quantity")?;
    let reciprocate = reciprocate.decode("reciprocate.quantity")?;
    let numerator = ratio.numerator.decode("ratio.numerator")?;
    let denominator = ratio.denominator.decode("ratio.denominator")?;

    for (index, field) in QUANTITY_FIELDS.iter().enumerate() {
        if denominator[index] == 0 {
            return Err(ValidationError::malformed(format!(
                "ratio.denominator.{} must not be zero",
                field
            )));
        }
        let lhs = u128::from(reciprocate[index]) * u128::from(denominator[index]);
        let rhs = u128::from(initiate[index]) * u128::from(numerator[index]);
        if lhs != rhs {
            return Err(ValidationError::Unbalanced {
                field: (*field).to_string(),
            });
        }
    }
    Ok(())
}

/// How the match family enforces the balance invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeMode {
    Direct,
    Opaque,
}

/// Parse an address that must name an unmatched initiate slot
pub fn initiate_address(scheme: &AddressScheme, raw: &str) -> Result<Address, ValidationError> {
    exchange_address(scheme, raw, true)
}

/// Parse an address that must name a reciprocate slot
pub fn reciprocate_address(
    scheme: &AddressScheme,
    raw: &str,
) -> Result<Address, ValidationError> {
    exchange_address(scheme, raw, false)
}

fn exchange_address(
    scheme: &AddressScheme,
    raw: &str,
    initiate: bool,
) -> Result<Address, ValidationError> {
    let address = Address::parse(raw)?;
    let kind = if initiate { "UTXQ" } else { "MTXQ" };
    match scheme.classify(address.as_str()) {
        Some(c) if c.family == Family::Match => match c.subtype {
            Subtype::Exchange { op, matched: false } if op.is_initiate() == initiate => Ok(address),
            _ => Err(ValidationError::malformed(format!(
                "{} is not an unmatched {} address",
                address, kind
            ))),
        },
        _ => Err(ValidationError::malformed(format!("{} is not a {} address", address, kind))),
    }
}

fn ensure_vacant<C: Context + ?Sized>(
    access: &StateAccess<'_, C>,
    address: &Address,
) -> Result<(), ProcessorError> {
    if access.exists(address)? {
        return Err(ValidationError::AddressOccupied {
            address: address.to_string(),
        }
        .into());
    }
    Ok(())
}

fn already_matched(ukey: &Address) -> ProcessorError {
    ValidationError::AlreadyMatched {
        address: ukey.to_string(),
    }
    .into()
}

/// Both modes record a match in the reciprocated slot of `ukey`
fn ensure_unmatched<C: Context + ?Sized>(
    access: &StateAccess<'_, C>,
    slot: &Address,
    ukey: &Address,
) -> Result<(), ProcessorError> {
    if access.exists(slot)? {
        return Err(already_matched(ukey));
    }
    Ok(())
}

/// Plaintext matching with the arithmetic balance check
#[derive(Debug, Clone)]
pub struct DirectMatcher {
    scheme: AddressScheme,
}

impl DirectMatcher {
    /// Create a matcher that derives reciprocated slots with `scheme`
    pub fn new(scheme: AddressScheme) -> Self {
        Self { scheme }
    }

    /// Store an unmatched initiate at `ukey`
    ///
    /// # Arguments
    /// * `access` - State access for the current transaction
    /// * `ukey` - Unmatched UTXQ address chosen by the client
    /// * `utxq` - The initiate; must be well formed and not yet matched
    ///
    /// # Returns
    /// `Ok(())` once the initiate is committed, or a validation error when
    /// `ukey` is occupied or was already matched in either mode
    pub fn initiate<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        ukey: &Address,
        utxq: Utxq,
    ) -> Result<(), ProcessorError> {
        utxq.validate()?;
        if utxq.matched {
            return Err(ValidationError::malformed("a new initiate must not be matched").into());
        }
        ensure_vacant(access, ukey)?;
        ensure_unmatched(access, &self.scheme.matched_slot(ukey), ukey)?;

        let mut writes = WriteSet::new();
        writes.put_entity(ukey.clone(), &utxq)?;
        access.commit(writes)?;

        debug!(%ukey, plus = %utxq.exchange.plus, minus = %utxq.exchange.minus, "initiate stored");
        access.emit(Event::exchange_completed(&self.scheme, STEP_INITIATE, ukey, None));
        Ok(())
    }

    /// Match the initiate at `ukey` with a balanced reciprocate at `mkey`
    ///
    /// # Arguments
    /// * `access` - State access for the current transaction
    /// * `ukey` - Address of the initiate being answered
    /// * `mkey` - Vacant MTXQ address for the response
    /// * `request` - Mirrored parties, quantity and the agreed ratio
    ///
    /// # Returns
    /// The stored [`Mtxq`]. The matched initiate, its reciprocated slot and
    /// the MTXQ are written in one commit.
    pub fn reciprocate<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        ukey: &Address,
        mkey: &Address,
        request: ReciprocateRequest,
    ) -> Result<Mtxq, ProcessorError> {
        let slot = self.scheme.matched_slot(ukey);
        let mut cells = access.get_many(&[ukey.clone(), slot.clone()])?.into_iter();
        let (stored, reciprocated) = (cells.next().flatten(), cells.next().flatten());
        if reciprocated.is_some() {
            return Err(already_matched(ukey));
        }
        let bytes = stored.ok_or_else(|| ValidationError::MissingInitiate {
            address: ukey.to_string(),
        })?;
        // The match space also holds opaque ciphertexts submitted by clients
        let mut utxq: Utxq = codec::decode_request(&format!("initiate at {}", ukey), &bytes)?;
        if utxq.matched {
            return Err(already_matched(ukey));
        }
        if !utxq.exchange.mirrors(&request.exchange) {
            return Err(ValidationError::PartnerMismatch.into());
        }
        request.validate()?;
        check_balance(&utxq.exchange.quantity, &request.exchange.quantity, &request.ratio)?;
        ensure_vacant(access, mkey)?;

        utxq.matched = true;
        let mtxq = Mtxq {
            exchange: request.exchange,
            ratio: request.ratio,
            utxq_address: ukey.clone(),
            utxq: utxq.clone(),
        };
        let mut writes = WriteSet::new();
        writes.put_entity(ukey.clone(), &utxq)?;
        writes.put_entity(slot, &utxq)?;
        writes.put_entity(mkey.clone(), &mtxq)?;
        access.commit(writes)?;

        info!(%ukey, %mkey, "exchange matched");
        access.emit(Event::exchange_completed(&self.scheme, STEP_RECIPROCATE, ukey, Some(mkey)));
        Ok(mtxq)
    }
}

/// Ciphertexts submitted with an opaque reciprocate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueReciprocate {
    pub udata: Vec<u8>,
    pub mdata: Vec<u8>,
    pub proof: Vec<u8>,
    pub pairing: Vec<u8>,
}

/// Proof-gated matching over ciphertexts
#[derive(Clone)]
pub struct OpaqueMatcher {
    scheme: AddressScheme,
    verifier: Arc<dyn ProofVerifier>,
}

impl OpaqueMatcher {
    /// Create a matcher that consults `verifier` for every reciprocate
    pub fn new(scheme: AddressScheme, verifier: Arc<dyn ProofVerifier>) -> Self {
        Self { scheme, verifier }
    }

    /// Store an initiate ciphertext verbatim at `ukey`
    ///
    /// # Arguments
    /// * `access` - State access for the current transaction
    /// * `ukey` - Unmatched UTXQ address chosen by the client
    /// * `data` - Non-empty ciphertext; never decoded
    ///
    /// # Returns
    /// `Ok(())` once stored, or a validation error when `ukey` is occupied
    /// or was already matched in either mode
    pub fn initiate<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        ukey: &Address,
        data: Vec<u8>,
    ) -> Result<(), ProcessorError> {
        if data.is_empty() {
            return Err(ValidationError::malformed("initiate data is empty").into());
        }
        ensure_vacant(access, ukey)?;
        ensure_unmatched(access, &self.scheme.matched_slot(ukey), ukey)?;

        let mut writes = WriteSet::new();
        writes.put_raw(ukey.clone(), data);
        access.commit(writes)?;

        debug!(%ukey, "opaque initiate stored");
        access.emit(Event::exchange_completed(&self.scheme, STEP_INITIATE, ukey, None));
        Ok(())
    }

    /// Match `ukey` once the verifier accepts the submitted proof
    ///
    /// # Arguments
    /// * `access` - State access for the current transaction
    /// * `ukey` - Address of the initiate being answered
    /// * `mkey` - Vacant MTXQ address for the reciprocate ciphertext
    /// * `request` - Both ciphertexts plus the proof and pairing
    ///
    /// # Returns
    /// `Ok(())` after the initiate ciphertext lands in the reciprocated slot
    /// and the reciprocate ciphertext at `mkey`; `ProofRejected` when the
    /// verifier says no; an internal error when the verifier cannot answer
    pub fn reciprocate<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        ukey: &Address,
        mkey: &Address,
        request: OpaqueReciprocate,
    ) -> Result<(), ProcessorError> {
        let slot = self.scheme.matched_slot(ukey);
        ensure_unmatched(access, &slot, ukey)?;
        ensure_vacant(access, mkey)?;

        let valid = self
            .verifier
            .verify(&request.proof, &request.pairing)
            .map_err(|e| -> ProcessorError {
                if e.is_request_fault() {
                    ValidationError::malformed(e.to_string()).into()
                } else {
                    InternalError::VerifierUnavailable {
                        reason: e.to_string(),
                    }
                    .into()
                }
            })?;
        if !valid {
            return Err(ValidationError::ProofRejected {
                address: ukey.to_string(),
            }
            .into());
        }

        let mut writes = WriteSet::new();
        writes.put_raw(slot.clone(), request.udata);
        writes.put_raw(mkey.clone(), request.mdata);
        access.commit(writes)?;

        info!(%ukey, %slot, %mkey, "opaque exchange matched");
        access.emit(Event::exchange_completed(&self.scheme, STEP_RECIPROCATE, ukey, Some(mkey)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ExchangeOp;
    use crate::types::LeUint;

    fn ratio() -> Ratio {
        Ratio::new(Quantity::new(2, 5, 7), Quantity::new(1, 2, 3))
    }

    #[test]
    fn test_balance_fixture() {
        let initiate = Quantity::new(5, 2, 3);
        assert!(check_balance(&initiate, &Quantity::new(10, 5, 7), &ratio()).is_ok());
        assert_eq!(
            check_balance(&initiate, &Quantity::new(11, 5, 7), &ratio()),
            Err(ValidationError::Unbalanced { field: "value".to_string() })
        );
        assert_eq!(
            check_balance(&initiate, &Quantity::new(10, 5, 8), &ratio()),
            Err(ValidationError::Unbalanced { field: "resource_unit".to_string() })
        );
    }

    #[test]
    fn test_balance_does_not_truncate() {
        // 3 * 1 / 2 floors to 1, cross multiplication does not
        let ratio = Ratio::new(Quantity::new(1, 1, 1), Quantity::new(2, 1, 1));
        assert!(check_balance(&Quantity::new(3, 1, 1), &Quantity::new(1, 1, 1), &ratio).is_err());
    }

    #[test]
    fn test_balance_handles_full_width() {
        let max = u64::MAX;
        let ratio = Ratio::new(Quantity::new(max, 1, 1), Quantity::new(max, 1, 1));
        let quantity = Quantity::new(max, 1, 1);
        assert!(check_balance(&quantity, &quantity, &ratio).is_ok());
    }

    #[test]
    fn test_zero_denominator_is_malformed() {
        let ratio = Ratio::new(Quantity::new(1, 1, 1), Quantity::new(1, 0, 1));
        let result = check_balance(&Quantity::new(1, 1, 1), &Quantity::new(1, 1, 1), &ratio);
        assert!(matches!(result, Err(ValidationError::Malformed { .. })));
    }

    #[test]
    fn test_exchange_well_formedness() {
        assert!(Exchange::new("church", "turing", Quantity::new(1, 1, 1)).validate().is_ok());
        assert!(Exchange::new("church", "church", Quantity::new(1, 1, 1)).validate().is_err());
        assert!(Exchange::new("", "turing", Quantity::new(1, 1, 1)).validate().is_err());

        let mut quantity = Quantity::new(1, 1, 1);
        quantity.value = LeUint(Vec::new());
        assert!(Exchange::new("church", "turing", quantity).validate().is_err());
    }

    #[test]
    fn test_exchange_address_classification() {
        let scheme = AddressScheme::default();
        let ukey = scheme.exchange(ExchangeOp::Ask, "x");
        let mkey = scheme.exchange(ExchangeOp::Tell, "y");

        assert!(initiate_address(&scheme, ukey.as_str()).is_ok());
        assert!(initiate_address(&scheme, mkey.as_str()).is_err());
        assert!(reciprocate_address(&scheme, mkey.as_str()).is_ok());
        let slot = scheme.matched_slot(&ukey);
        assert!(initiate_address(&scheme, slot.as_str()).is_err());
        assert!(initiate_address(&scheme, "abc").is_err());
    }
}
