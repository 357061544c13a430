//! Registered units and resources

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressScheme, Dimension};
use crate::error::{InternalError, ValidationError};
use crate::governance::Proposal;
use crate::setting::Settings;
use crate::state::WriteSet;
use crate::traits::Entity;
use crate::types::ProposalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Unit,
    Resource,
}

impl AssetKind {
    pub fn dimension(&self) -> Dimension {
        match self {
            AssetKind::Unit => Dimension::Unit,
            AssetKind::Resource => Dimension::Resource,
        }
    }

    pub fn from_dimension(dimension: Dimension) -> Option<AssetKind> {
        match dimension {
            Dimension::Unit => Some(AssetKind::Unit),
            Dimension::Resource => Some(AssetKind::Resource),
            Dimension::Utxq | Dimension::Mtxq => None,
        }
    }
}

/// A unit of measure or a resource, registered within a system
///
/// `value` is the small integer used in quantity arithmetic, kept textual as
/// submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub system: String,
    pub key: String,
    pub value: String,
}

impl Asset {
    pub fn new(
        kind: AssetKind,
        system: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            system: system.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn address(&self, scheme: &AddressScheme) -> Address {
        scheme.asset(self.kind.dimension(), &self.system, &self.key)
    }
}

impl Entity for Asset {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [("system", &self.system), ("key", &self.key), ("value", &self.value)];
        for (name, field) in fields {
            if field.trim().is_empty() {
                return Err(ValidationError::malformed(format!("asset {} must not be empty", name)));
            }
        }
        Ok(())
    }
}

impl Proposal for Asset {
    fn proposal_id(
        &self,
        scheme: &AddressScheme,
        dimension: Dimension,
    ) -> Result<ProposalId, InternalError> {
        Ok(ProposalId::new(self.target(scheme, dimension).as_str()))
    }

    fn check(&self, dimension: Dimension, _settings: &Settings) -> Result<(), ValidationError> {
        if self.kind.dimension() != dimension {
            return Err(ValidationError::malformed(format!(
                "{:?} asset proposed under {}",
                self.kind, dimension
            )));
        }
        Ok(())
    }

    fn target(&self, scheme: &AddressScheme, dimension: Dimension) -> Address {
        scheme.asset(dimension, &self.system, &self.key)
    }

    fn stage_accepted(
        &self,
        target: Address,
        _settings: &Settings,
        writes: &mut WriteSet,
    ) -> Result<bool, InternalError> {
        writes.put_entity(target, self)?;
        Ok(true)
    }
}
