//! Transaction envelopes and family payloads
//!
//! Envelopes are built and signed by the client tooling; processors only see
//! the signer key, the declared family and an opaque payload blob which is
//! decoded here with the canonical codec.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::address::Dimension;
use crate::codec;
use crate::error::{InternalError, ValidationError};
use crate::types::{ProposalId, PublicKey, Version, Vote};

/// Metadata the host extracts from a signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub signer_public_key: PublicKey,
    pub family_name: String,
    pub family_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub header: TransactionHeader,
    pub payload: Vec<u8>,
}

impl TransactionEnvelope {
    pub fn new(
        signer: impl Into<PublicKey>,
        family_name: impl Into<String>,
        family_version: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            header: TransactionHeader {
                signer_public_key: signer.into(),
                family_name: family_name.into(),
                family_version: family_version.into(),
            },
            payload,
        }
    }

    /// Wrap a typed payload in its canonical encoding
    pub fn encode<P: Serialize>(
        signer: impl Into<PublicKey>,
        family_name: impl Into<String>,
        family_version: &Version,
        payload: &P,
    ) -> Result<Self, InternalError> {
        Ok(Self::new(signer, family_name, family_version.to_string(), codec::encode(payload)?))
    }

    pub fn signer(&self) -> &PublicKey {
        &self.header.signer_public_key
    }

    /// Declared version, rejected when not `major.minor.patch`
    pub fn version(&self) -> Result<Version, ValidationError> {
        self.header.family_version.parse()
    }

    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P, ValidationError> {
        codec::decode_request("payload", &self.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceAction {
    Create,
    Propose,
    Vote,
    Unset,
}

/// Payload of the setting and asset families
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePayload {
    pub action: GovernanceAction,
    pub dimension: Dimension,
    pub data: Vec<u8>,
}

impl GovernancePayload {
    pub fn new<D: Serialize>(
        action: GovernanceAction,
        dimension: Dimension,
        data: &D,
    ) -> Result<Self, InternalError> {
        Ok(Self {
            action,
            dimension,
            data: codec::encode(data)?,
        })
    }

    pub fn decode_data<D: DeserializeOwned>(&self, what: &str) -> Result<D, ValidationError> {
        codec::decode_request(what, &self.data)
    }
}

/// Data of a CREATE action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSettings {
    pub authorized_keys: Vec<PublicKey>,
    /// Kept textual so a non-numeric value is rejected, not undecodable
    pub threshold: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteData {
    pub proposal_id: ProposalId,
    pub vote: Vote,
}

/// Data of an UNSET action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRef {
    pub proposal_id: ProposalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    Initiate,
    Reciprocate,
}

/// Payload of the match family
///
/// In direct mode `data` holds an encoded UTXQ (initiate) or MTXQ
/// (reciprocate). In opaque mode `data` and `mdata` are ciphertexts that are
/// stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePayload {
    pub kind: ExchangeKind,
    pub ukey: String,
    pub mkey: Option<String>,
    pub data: Vec<u8>,
    pub mdata: Option<Vec<u8>>,
    pub proof: Option<Vec<u8>>,
    pub pairing: Option<Vec<u8>>,
}

impl ExchangePayload {
    pub fn initiate(ukey: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: ExchangeKind::Initiate,
            ukey: ukey.into(),
            mkey: None,
            data,
            mdata: None,
            proof: None,
            pairing: None,
        }
    }

    pub fn reciprocate(ukey: impl Into<String>, mkey: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: ExchangeKind::Reciprocate,
            mkey: Some(mkey.into()),
            ..Self::initiate(ukey, data)
        }
    }

    /// Attach the opaque mode fields
    pub fn with_proof(mut self, mdata: Vec<u8>, proof: Vec<u8>, pairing: Vec<u8>) -> Self {
        self.mdata = Some(mdata);
        self.proof = Some(proof);
        self.pairing = Some(pairing);
        self
    }
}
