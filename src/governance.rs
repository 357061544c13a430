//! Candidate governance: propose, vote, resolve
//!
//! One [`GovernedDimension`] drives the state machine for any proposal type.
//! Every operation reads settings and candidates fresh, stages its effect in
//! a [`WriteSet`] and commits once, so the host sees each decision as a single
//! conditional write.
//!
//! ```text
//! PROPOSED -> VOTING* -> ACCEPTED | REJECTED
//! threshold 1: PROPOSED -> ACCEPTED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::address::{Address, AddressScheme, Dimension, Family};
use crate::asset::Asset;
use crate::error::{InternalError, ProcessorError, ValidationError};
use crate::events::Event;
use crate::payload::CreateSettings;
use crate::setting::{normalize_keys, SettingChange, Settings};
use crate::state::{Context, StateAccess, WriteSet};
use crate::traits::Entity;
use crate::types::{ProposalId, PublicKey, Vote};

/// A payload that can be put to a vote
pub trait Proposal: Entity + PartialEq + fmt::Debug {
    /// Identifier shared by every proposal with the same outcome
    fn proposal_id(
        &self,
        scheme: &AddressScheme,
        dimension: Dimension,
    ) -> Result<ProposalId, InternalError>;

    /// Reject proposals that could never be accepted under `settings`
    fn check(&self, dimension: Dimension, settings: &Settings) -> Result<(), ValidationError>;

    /// Address written when the proposal is accepted
    fn target(&self, scheme: &AddressScheme, dimension: Dimension) -> Address;

    /// Stage the accepted entity; `false` when it no longer applies
    fn stage_accepted(
        &self,
        target: Address,
        settings: &Settings,
        writes: &mut WriteSet,
    ) -> Result<bool, InternalError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub public_key: PublicKey,
    pub vote: Vote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate<P> {
    pub proposal_id: ProposalId,
    pub proposal: P,
    pub votes: Vec<VoteRecord>,
}

impl<P> Candidate<P> {
    pub fn has_voted(&self, key: &PublicKey) -> bool {
        self.votes.iter().any(|v| &v.public_key == key)
    }

    /// (accepted, rejected)
    pub fn tally(&self) -> (usize, usize) {
        let accepted = self.votes.iter().filter(|v| v.vote == Vote::Accept).count();
        (accepted, self.votes.len() - accepted)
    }
}

/// Live candidates of one family and dimension, in proposal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidates<P> {
    pub candidates: Vec<Candidate<P>>,
}

impl<P> Default for Candidates<P> {
    fn default() -> Self {
        Self { candidates: Vec::new() }
    }
}

impl<P> Candidates<P> {
    pub fn position(&self, proposal_id: &ProposalId) -> Option<usize> {
        self.candidates.iter().position(|c| &c.proposal_id == proposal_id)
    }

    pub fn get(&self, proposal_id: &ProposalId) -> Option<&Candidate<P>> {
        self.candidates.iter().find(|c| &c.proposal_id == proposal_id)
    }

    pub fn contains(&self, proposal_id: &ProposalId) -> bool {
        self.position(proposal_id).is_some()
    }

    pub fn remove(&mut self, proposal_id: &ProposalId) -> Option<Candidate<P>> {
        self.position(proposal_id).map(|i| self.candidates.remove(i))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Observable outcome of a governance operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Created,
    Proposed,
    Voting { accepted: usize, rejected: usize },
    Accepted { address: Address },
    Rejected,
    Withdrawn,
    VoteRemoved,
}

/// Write settings and empty candidate lists for a dimension
///
/// Bootstraps the authorized key list, so the signer is not checked
/// against any existing settings.
pub fn create_settings<C: Context + ?Sized>(
    access: &mut StateAccess<'_, C>,
    scheme: &AddressScheme,
    dimension: Dimension,
    signer: &PublicKey,
    data: &CreateSettings,
) -> Result<Resolution, ProcessorError> {
    if !dimension.is_governed() {
        return Err(ValidationError::malformed(format!("{} has no settings", dimension)).into());
    }
    let address = scheme.settings(dimension);
    if access.exists(&address)? {
        return Err(ValidationError::SettingsExist {
            dimension: dimension.to_string(),
        }
        .into());
    }

    let keys = normalize_keys(&data.authorized_keys)?;
    let threshold: u32 = data
        .threshold
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidThreshold {
            reason: format!("'{}' is not a number", data.threshold),
        })?;
    let settings = Settings::new(keys, threshold)?;

    let mut writes = WriteSet::new();
    writes.put_entity(address.clone(), &settings)?;
    writes.put_entity(
        scheme.candidates(Family::Setting, dimension),
        &Candidates::<SettingChange>::default(),
    )?;
    writes.put_entity(
        scheme.candidates(Family::Asset, dimension),
        &Candidates::<Asset>::default(),
    )?;
    access.commit(writes)?;

    info!(%dimension, %signer, keys = settings.key_count(), threshold, "settings created");
    access.emit(Event::entity_updated(scheme, Family::Setting, &address));
    Ok(Resolution::Created)
}

/// Governance state machine for one family within one dimension
#[derive(Debug, Clone)]
pub struct GovernedDimension<P> {
    scheme: AddressScheme,
    family: Family,
    dimension: Dimension,
    allows_unset: bool,
    _proposal: PhantomData<P>,
}

impl<P: Proposal> GovernedDimension<P> {
    /// Create the state machine for `family` proposals in `dimension`
    ///
    /// # Arguments
    /// * `scheme` - Address scheme used for settings, candidates and targets
    /// * `family` - Family whose candidate list this machine owns
    /// * `dimension` - Governed dimension; its settings gate every signer
    /// * `allows_unset` - Whether signers may withdraw their own votes
    ///
    /// # Returns
    /// A stateless machine; all state lives behind the `StateAccess` passed
    /// to each operation
    pub fn new(
        scheme: AddressScheme,
        family: Family,
        dimension: Dimension,
        allows_unset: bool,
    ) -> Self {
        Self {
            scheme,
            family,
            dimension,
            allows_unset,
            _proposal: PhantomData,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn candidates_address(&self) -> Address {
        self.scheme.candidates(self.family, self.dimension)
    }

    pub fn load_settings<C: Context + ?Sized>(
        &self,
        access: &StateAccess<'_, C>,
    ) -> Result<Settings, ProcessorError> {
        access
            .get_entity(&self.scheme.settings(self.dimension))?
            .ok_or_else(|| {
                ValidationError::SettingsMissing {
                    dimension: self.dimension.to_string(),
                }
                .into()
            })
    }

    pub fn load_candidates<C: Context + ?Sized>(
        &self,
        access: &StateAccess<'_, C>,
    ) -> Result<Candidates<P>, InternalError> {
        Ok(access.get_entity(&self.candidates_address())?.unwrap_or_default())
    }

    fn authorized_settings<C: Context + ?Sized>(
        &self,
        access: &StateAccess<'_, C>,
        signer: &PublicKey,
    ) -> Result<Settings, ProcessorError> {
        let settings = self.load_settings(access)?;
        settings.authorize(signer, self.dimension)?;
        Ok(settings)
    }

    /// Submit a proposal with an implicit accept from the proposer
    pub fn propose<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        signer: &PublicKey,
        proposal: P,
    ) -> Result<Resolution, ProcessorError> {
        let settings = self.authorized_settings(access, signer)?;
        proposal.validate()?;
        proposal.check(self.dimension, &settings)?;

        let proposal_id = proposal.proposal_id(&self.scheme, self.dimension)?;
        let mut candidates = self.load_candidates(access)?;
        let mut writes = WriteSet::new();

        if settings.threshold == 1 {
            if candidates.remove(&proposal_id).is_some() {
                writes.put_entity(self.candidates_address(), &candidates)?;
            }
            let target = proposal.target(&self.scheme, self.dimension);
            return self.finish_accepted(access, writes, &proposal, target, &settings, &proposal_id);
        }

        if candidates.contains(&proposal_id) {
            return Err(ValidationError::DuplicateProposal {
                proposal_id: proposal_id.to_string(),
            }
            .into());
        }
        candidates.candidates.push(Candidate {
            proposal_id: proposal_id.clone(),
            proposal,
            votes: vec![VoteRecord {
                public_key: signer.clone(),
                vote: Vote::Accept,
            }],
        });
        writes.put_entity(self.candidates_address(), &candidates)?;
        access.commit(writes)?;

        debug!(
            family = %self.family,
            dimension = %self.dimension,
            %proposal_id,
            "candidate proposed"
        );
        Ok(Resolution::Proposed)
    }

    /// Record a vote and resolve the candidate if a decision is reached
    pub fn vote<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        signer: &PublicKey,
        proposal_id: &ProposalId,
        vote: Vote,
    ) -> Result<Resolution, ProcessorError> {
        let settings = self.authorized_settings(access, signer)?;
        let mut candidates = self.load_candidates(access)?;
        let index = candidates
            .position(proposal_id)
            .ok_or_else(|| ValidationError::UnknownProposal {
                proposal_id: proposal_id.to_string(),
            })?;

        let candidate = &mut candidates.candidates[index];
        if candidate.has_voted(signer) {
            return Err(ValidationError::AlreadyVoted {
                signer: signer.to_string(),
                proposal_id: proposal_id.to_string(),
            }
            .into());
        }
        candidate.votes.push(VoteRecord {
            public_key: signer.clone(),
            vote,
        });

        let (accepted, rejected) = candidate.tally();
        let threshold = settings.threshold as usize;
        debug!(%proposal_id, accepted, rejected, threshold, "vote tallied");

        let mut writes = WriteSet::new();
        if accepted >= threshold {
            let candidate = candidates.candidates.remove(index);
            writes.put_entity(self.candidates_address(), &candidates)?;
            let target = candidate.proposal.target(&self.scheme, self.dimension);
            return self.finish_accepted(
                access,
                writes,
                &candidate.proposal,
                target,
                &settings,
                proposal_id,
            );
        }

        if rejected >= threshold || accepted + rejected >= settings.key_count() {
            candidates.candidates.remove(index);
            writes.put_entity(self.candidates_address(), &candidates)?;
            access.commit(writes)?;
            info!(
                family = %self.family,
                dimension = %self.dimension,
                %proposal_id,
                "proposal rejected"
            );
            return Ok(Resolution::Rejected);
        }

        writes.put_entity(self.candidates_address(), &candidates)?;
        access.commit(writes)?;
        Ok(Resolution::Voting { accepted, rejected })
    }

    /// Withdraw the signer's own vote, dropping the candidate once it has none
    pub fn unset_vote<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        signer: &PublicKey,
        proposal_id: &ProposalId,
    ) -> Result<Resolution, ProcessorError> {
        if !self.allows_unset {
            return Err(ValidationError::UnsetNotSupported {
                dimension: format!("{}.{}", self.family, self.dimension),
            }
            .into());
        }
        self.authorized_settings(access, signer)?;

        let mut candidates = self.load_candidates(access)?;
        let index = candidates
            .position(proposal_id)
            .ok_or_else(|| ValidationError::UnknownProposal {
                proposal_id: proposal_id.to_string(),
            })?;
        let candidate = &mut candidates.candidates[index];
        let position = candidate
            .votes
            .iter()
            .position(|v| &v.public_key == signer)
            .ok_or_else(|| ValidationError::NotVoted {
                signer: signer.to_string(),
                proposal_id: proposal_id.to_string(),
            })?;
        candidate.votes.remove(position);

        let resolution = if candidate.votes.is_empty() {
            candidates.candidates.remove(index);
            Resolution::Withdrawn
        } else {
            Resolution::VoteRemoved
        };

        let mut writes = WriteSet::new();
        writes.put_entity(self.candidates_address(), &candidates)?;
        access.commit(writes)?;
        debug!(%proposal_id, %signer, ?resolution, "vote unset");
        Ok(resolution)
    }

    fn finish_accepted<C: Context + ?Sized>(
        &self,
        access: &mut StateAccess<'_, C>,
        mut writes: WriteSet,
        proposal: &P,
        target: Address,
        settings: &Settings,
        proposal_id: &ProposalId,
    ) -> Result<Resolution, ProcessorError> {
        let applied = proposal.stage_accepted(target.clone(), settings, &mut writes)?;
        access.commit(writes)?;

        if !applied {
            info!(family = %self.family, %proposal_id, "accepted proposal no longer applies");
            return Ok(Resolution::Rejected);
        }
        info!(
            family = %self.family,
            dimension = %self.dimension,
            %proposal_id,
            address = %target,
            "proposal accepted"
        );
        access.emit(Event::entity_updated(&self.scheme, self.family, &target));
        Ok(Resolution::Accepted { address: target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetKind;
    use crate::memory::MemoryContext;
    use std::time::Duration;

    fn bootstrap(context: &mut MemoryContext, keys: &[&str], threshold: &str) {
        let mut access = StateAccess::new(context, Duration::from_secs(1));
        let data = CreateSettings {
            authorized_keys: keys.iter().map(|k| PublicKey::from(*k)).collect(),
            threshold: threshold.to_string(),
        };
        let scheme = AddressScheme::default();
        create_settings(&mut access, &scheme, Dimension::Unit, &"a".into(), &data).unwrap();
    }

    fn units() -> GovernedDimension<Asset> {
        GovernedDimension::new(AddressScheme::default(), Family::Asset, Dimension::Unit, true)
    }

    #[test]
    fn test_tally_counts() {
        let candidate = Candidate {
            proposal_id: ProposalId::new("p"),
            proposal: (),
            votes: vec![
                VoteRecord { public_key: "a".into(), vote: Vote::Accept },
                VoteRecord { public_key: "b".into(), vote: Vote::Reject },
                VoteRecord { public_key: "c".into(), vote: Vote::Accept },
            ],
        };
        assert_eq!(candidate.tally(), (2, 1));
        assert!(candidate.has_voted(&"b".into()));
        assert!(!candidate.has_voted(&"d".into()));
    }

    #[test]
    fn test_create_writes_settings_and_candidate_lists() {
        let scheme = AddressScheme::default();
        let mut context = MemoryContext::new();
        bootstrap(&mut context, &["a", "b"], "2");

        assert!(context.contains(&scheme.settings(Dimension::Unit)));
        assert!(context.contains(&scheme.candidates(Family::Setting, Dimension::Unit)));
        assert!(context.contains(&scheme.candidates(Family::Asset, Dimension::Unit)));
        assert_eq!(context.write_count(), 1);
    }

    #[test]
    fn test_unset_last_vote_withdraws_candidate() {
        let mut context = MemoryContext::new();
        bootstrap(&mut context, &["a", "b"], "2");
        let governance = units();
        let asset = Asset::new(AssetKind::Unit, "imperial", "foot", "3");
        let signer = PublicKey::from("a");

        let mut access = StateAccess::new(&mut context, Duration::from_secs(1));
        let resolution = governance.propose(&mut access, &signer, asset.clone()).unwrap();
        assert_eq!(resolution, Resolution::Proposed);

        let id = asset.proposal_id(&AddressScheme::default(), Dimension::Unit).unwrap();
        let err = governance.unset_vote(&mut access, &"b".into(), &id).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::InvalidTransaction(ValidationError::NotVoted { .. })
        ));

        let resolution = governance.unset_vote(&mut access, &signer, &id).unwrap();
        assert_eq!(resolution, Resolution::Withdrawn);
        assert!(governance.load_candidates(&access).unwrap().is_empty());
    }

    #[test]
    fn test_unset_refused_when_disabled() {
        let mut context = MemoryContext::new();
        bootstrap(&mut context, &["a", "b"], "2");
        let scheme = AddressScheme::default();
        let governance: GovernedDimension<SettingChange> =
            GovernedDimension::new(scheme, Family::Setting, Dimension::Unit, false);

        let mut access = StateAccess::new(&mut context, Duration::from_secs(1));
        let err = governance
            .unset_vote(&mut access, &"a".into(), &ProposalId::new("x"))
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::InvalidTransaction(ValidationError::UnsetNotSupported { .. })
        ));
    }
}
