//! Per-dimension governance settings and the changes voted against them

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::address::{Address, AddressScheme, Dimension};
use crate::codec;
use crate::error::{InternalError, ValidationError};
use crate::governance::Proposal;
use crate::hasher::StateHasher;
use crate::state::WriteSet;
use crate::traits::Entity;
use crate::types::{ProposalId, PublicKey};

/// Who may govern a dimension and how many votes settle a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub authorized_keys: Vec<PublicKey>,
    pub threshold: u32,
}

impl Settings {
    pub fn new(authorized_keys: Vec<PublicKey>, threshold: u32) -> Result<Self, ValidationError> {
        let settings = Self { authorized_keys, threshold };
        settings.validate()?;
        Ok(settings)
    }

    pub fn is_authorized(&self, key: &PublicKey) -> bool {
        self.authorized_keys.iter().any(|k| k == key)
    }

    pub fn authorize(
        &self,
        signer: &PublicKey,
        dimension: Dimension,
    ) -> Result<(), ValidationError> {
        if self.is_authorized(signer) {
            Ok(())
        } else {
            Err(ValidationError::Unauthorized {
                signer: signer.to_string(),
                dimension: dimension.to_string(),
            })
        }
    }

    /// Settings that would result from accepting `change`
    pub fn apply(&self, change: &SettingChange) -> Result<Settings, ValidationError> {
        let next = match change {
            SettingChange::AuthorizedKeys(keys) => Settings {
                authorized_keys: keys.clone(),
                threshold: self.threshold,
            },
            SettingChange::Threshold(threshold) => Settings {
                authorized_keys: self.authorized_keys.clone(),
                threshold: *threshold,
            },
        };
        next.validate().map_err(|e| ValidationError::InvalidSettingChange {
            reason: e.to_string(),
        })?;
        Ok(next)
    }

    pub fn key_count(&self) -> usize {
        self.authorized_keys.len()
    }
}

impl Entity for Settings {
    fn validate(&self) -> Result<(), ValidationError> {
        check_keys(&self.authorized_keys)?;
        if self.threshold == 0 {
            return Err(ValidationError::InvalidThreshold {
                reason: "threshold must be at least 1".to_string(),
            });
        }
        if self.threshold as usize > self.authorized_keys.len() {
            return Err(ValidationError::InvalidThreshold {
                reason: format!(
                    "threshold {} exceeds {} authorized keys",
                    self.threshold,
                    self.authorized_keys.len()
                ),
            });
        }
        Ok(())
    }
}

/// Trim keys, drop blanks and refuse repeats
pub fn normalize_keys(keys: &[PublicKey]) -> Result<Vec<PublicKey>, ValidationError> {
    let normalized: Vec<PublicKey> = keys
        .iter()
        .map(|k| PublicKey::new(k.as_str().trim()))
        .filter(|k| !k.is_empty())
        .collect();
    check_keys(&normalized)?;
    Ok(normalized)
}

fn check_keys(keys: &[PublicKey]) -> Result<(), ValidationError> {
    if keys.is_empty() {
        return Err(ValidationError::malformed("authorized keys must not be empty"));
    }
    let mut seen = BTreeSet::new();
    for key in keys {
        if key.is_empty() {
            return Err(ValidationError::malformed("authorized keys must not be blank"));
        }
        if !seen.insert(key) {
            return Err(ValidationError::malformed(format!("duplicate authorized key {}", key)));
        }
    }
    Ok(())
}

/// A proposed change to a dimension's own settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingChange {
    AuthorizedKeys(Vec<PublicKey>),
    Threshold(u32),
}

impl Entity for SettingChange {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SettingChange::AuthorizedKeys(keys) => check_keys(keys),
            SettingChange::Threshold(0) => Err(ValidationError::InvalidThreshold {
                reason: "threshold must be at least 1".to_string(),
            }),
            SettingChange::Threshold(_) => Ok(()),
        }
    }
}

impl Proposal for SettingChange {
    fn proposal_id(
        &self,
        _scheme: &AddressScheme,
        _dimension: Dimension,
    ) -> Result<ProposalId, InternalError> {
        let bytes = codec::encode(self)?;
        Ok(ProposalId::new(StateHasher::new().digest(&bytes).to_string()))
    }

    fn check(&self, _dimension: Dimension, settings: &Settings) -> Result<(), ValidationError> {
        settings.apply(self).map(|_| ())
    }

    fn target(&self, scheme: &AddressScheme, dimension: Dimension) -> Address {
        scheme.settings(dimension)
    }

    fn stage_accepted(
        &self,
        target: Address,
        settings: &Settings,
        writes: &mut WriteSet,
    ) -> Result<bool, InternalError> {
        // Settings may have moved on since the proposal was made
        match settings.apply(self) {
            Ok(next) => {
                writes.put_entity(target, &next)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}
