//! Per-family transaction handlers
//!
//! Each handler checks the declared family and version, decodes the payload
//! and routes it to the governance or matching engine. Errors are never
//! swallowed; the host decides how to report them.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::address::{AddressScheme, Dimension, Family};
use crate::asset::Asset;
use crate::codec;
use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, ValidationError};
use crate::exchange::{
    initiate_address, reciprocate_address, DirectMatcher, ExchangeMode, OpaqueMatcher,
    OpaqueReciprocate, ReciprocateRequest, Utxq,
};
use crate::governance::{create_settings, GovernedDimension, Proposal, Resolution};
use crate::payload::{
    CreateSettings, ExchangeKind, ExchangePayload, GovernanceAction, GovernancePayload, ProposalRef,
    TransactionEnvelope, VoteData,
};
use crate::setting::SettingChange;
use crate::state::{Context, StateAccess};
use crate::traits::TransactionHandler;
use crate::types::Version;
use crate::verifier::{CommandVerifier, ProofVerifier};

/// Reject envelopes addressed to another family or an unserved version
///
/// # Arguments
/// * `envelope` - The transaction whose header is checked
/// * `family_name` - Full family name the handler serves
/// * `versions` - Versions the handler serves
///
/// # Returns
/// The parsed declared version, or `UnsupportedFamily` when the name differs,
/// the version does not parse or it is not served
fn check_header(
    envelope: &TransactionEnvelope,
    family_name: &str,
    versions: &[Version],
) -> Result<Version, ValidationError> {
    let unsupported = || ValidationError::UnsupportedFamily {
        family: envelope.header.family_name.clone(),
        version: envelope.header.family_version.clone(),
    };
    if envelope.header.family_name != family_name {
        return Err(unsupported());
    }
    let version = envelope.version().map_err(|_| unsupported())?;
    if !versions.contains(&version) {
        return Err(unsupported());
    }
    Ok(version)
}

/// Governance family handler, generic over the proposal type
pub struct GovernanceHandler<P> {
    config: ProcessorConfig,
    scheme: AddressScheme,
    family: Family,
    allows_unset: bool,
    _proposal: PhantomData<fn() -> P>,
}

/// Changes to a dimension's own settings; unset votes are refused
pub type SettingHandler = GovernanceHandler<SettingChange>;

/// Unit and resource registration; unset votes are allowed
pub type AssetHandler = GovernanceHandler<Asset>;

impl SettingHandler {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::for_family(config, Family::Setting, false)
    }
}

impl AssetHandler {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::for_family(config, Family::Asset, true)
    }
}

impl<P: Proposal> GovernanceHandler<P> {
    fn for_family(config: ProcessorConfig, family: Family, allows_unset: bool) -> Self {
        let scheme = config.scheme();
        Self {
            config,
            scheme,
            family,
            allows_unset,
            _proposal: PhantomData,
        }
    }

    pub fn scheme(&self) -> &AddressScheme {
        &self.scheme
    }

    pub fn governance(&self, dimension: Dimension) -> GovernedDimension<P> {
        GovernedDimension::new(self.scheme.clone(), self.family, dimension, self.allows_unset)
    }

    fn dispatch<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        envelope: &TransactionEnvelope,
        payload: GovernancePayload,
    ) -> Result<Resolution, ProcessorError> {
        let dimension = payload.dimension;
        if !dimension.is_governed() {
            let reason = format!("{} is not a governed dimension", dimension);
            return Err(ValidationError::malformed(reason).into());
        }
        let signer = envelope.signer();

        match payload.action {
            GovernanceAction::Create => {
                let data: CreateSettings = payload.decode_data("settings")?;
                create_settings(access, &self.scheme, dimension, signer, &data)
            }
            GovernanceAction::Propose => {
                let proposal: P = payload.decode_data("proposal")?;
                self.governance(dimension).propose(access, signer, proposal)
            }
            GovernanceAction::Vote => {
                let data: VoteData = payload.decode_data("vote")?;
                self.governance(dimension).vote(access, signer, &data.proposal_id, data.vote)
            }
            GovernanceAction::Unset => {
                let data: ProposalRef = payload.decode_data("proposal reference")?;
                self.governance(dimension).unset_vote(access, signer, &data.proposal_id)
            }
        }
    }
}

impl<P: Proposal> TransactionHandler for GovernanceHandler<P> {
    fn family_name(&self) -> String {
        self.scheme.family_name(self.family)
    }

    fn family_versions(&self) -> Vec<Version> {
        vec![self.config.governance_version.clone()]
    }

    fn namespaces(&self) -> Vec<String> {
        // CREATE writes candidate lists for both governed families
        vec![
            self.scheme.family_prefix(Family::Setting),
            self.scheme.family_prefix(Family::Asset),
        ]
    }

    fn apply(
        &self,
        transaction: &TransactionEnvelope,
        context: &mut dyn Context,
    ) -> Result<(), ProcessorError> {
        check_header(transaction, &self.family_name(), &self.family_versions())?;
        let payload: GovernancePayload = transaction.decode_payload()?;
        let action = payload.action;

        let mut access = StateAccess::new(context, self.config.state_timeout());
        let resolution = self.dispatch(&mut access, transaction, payload)?;
        debug!(family = %self.family, ?action, ?resolution, "governance transaction applied");
        Ok(())
    }
}

/// Match family handler serving both enforcement modes
pub struct ExchangeHandler {
    config: ProcessorConfig,
    scheme: AddressScheme,
    direct: DirectMatcher,
    opaque: OpaqueMatcher,
}

impl ExchangeHandler {
    pub fn new(config: ProcessorConfig, verifier: Arc<dyn ProofVerifier>) -> Self {
        let scheme = config.scheme();
        Self {
            direct: DirectMatcher::new(scheme.clone()),
            opaque: OpaqueMatcher::new(scheme.clone(), verifier),
            scheme,
            config,
        }
    }

    /// Handler backed by the external verifier binary
    pub fn with_command_verifier(config: ProcessorConfig) -> Self {
        let verifier = Arc::new(CommandVerifier::new(config.verifier.clone()));
        Self::new(config, verifier)
    }

    /// Mode is chosen by declared version, never by payload shape
    pub fn mode_for(&self, version: &Version) -> Option<ExchangeMode> {
        if *version == self.config.direct_version {
            Some(ExchangeMode::Direct)
        } else if *version == self.config.opaque_version {
            Some(ExchangeMode::Opaque)
        } else {
            None
        }
    }

    fn dispatch<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        mode: ExchangeMode,
        payload: ExchangePayload,
    ) -> Result<(), ProcessorError> {
        let ukey = initiate_address(&self.scheme, &payload.ukey)?;
        match (mode, payload.kind) {
            (ExchangeMode::Direct, ExchangeKind::Initiate) => {
                let utxq: Utxq = codec::decode_request("utxq", &payload.data)?;
                self.direct.initiate(access, &ukey, utxq)
            }
            (ExchangeMode::Direct, ExchangeKind::Reciprocate) => {
                let mkey = required(payload.mkey.as_deref(), "mkey")?;
                let mkey = reciprocate_address(&self.scheme, mkey)?;
                let request: ReciprocateRequest = codec::decode_request("mtxq", &payload.data)?;
                self.direct.reciprocate(access, &ukey, &mkey, request).map(|_| ())
            }
            (ExchangeMode::Opaque, ExchangeKind::Initiate) => {
                self.opaque.initiate(access, &ukey, payload.data)
            }
            (ExchangeMode::Opaque, ExchangeKind::Reciprocate) => {
                let mkey = required(payload.mkey.as_deref(), "mkey")?;
                let mkey = reciprocate_address(&self.scheme, mkey)?;
                let request = OpaqueReciprocate {
                    udata: payload.data,
                    mdata: required(payload.mdata, "mdata")?,
                    proof: required(payload.proof, "proof")?,
                    pairing: required(payload.pairing, "pairing")?,
                };
                self.opaque.reciprocate(access, &ukey, &mkey, request)
            }
        }
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::malformed(format!("{} is required", name)))
}

impl TransactionHandler for ExchangeHandler {
    fn family_name(&self) -> String {
        self.scheme.family_name(Family::Match)
    }

    fn family_versions(&self) -> Vec<Version> {
        vec![self.config.direct_version.clone(), self.config.opaque_version.clone()]
    }

    fn namespaces(&self) -> Vec<String> {
        vec![self.scheme.family_prefix(Family::Match)]
    }

    fn apply(
        &self,
        transaction: &TransactionEnvelope,
        context: &mut dyn Context,
    ) -> Result<(), ProcessorError> {
        let version = check_header(transaction, &self.family_name(), &self.family_versions())?;
        let mode = self.mode_for(&version).ok_or_else(|| ValidationError::UnsupportedFamily {
            family: transaction.header.family_name.clone(),
            version: version.to_string(),
        })?;
        let payload: ExchangePayload = transaction.decode_payload()?;
        let kind = payload.kind;

        let mut access = StateAccess::new(context, self.config.state_timeout());
        self.dispatch(&mut access, mode, payload)?;
        debug!(?mode, ?kind, "exchange transaction applied");
        Ok(())
    }
}
