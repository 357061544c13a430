//! Error types for the transaction processors
//!
//! Every failure is one of two classes. A [`ValidationError`] rejects the
//! transaction with no state mutation and is safe to resubmit once corrected.
//! An [`InternalError`] means the host store or an external capability failed;
//! the transaction is not committed and the host decides whether to retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] ValidationError),

    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

impl ProcessorError {
    /// True when the request was rejected and can be corrected by the caller
    pub fn is_invalid_transaction(&self) -> bool {
        matches!(self, ProcessorError::InvalidTransaction(_))
    }

    /// True when processing failed for infrastructure reasons
    pub fn is_internal(&self) -> bool {
        matches!(self, ProcessorError::Internal(_))
    }

    /// True when the request was rejected because the signer is not permitted
    pub fn is_authorization(&self) -> bool {
        match self {
            ProcessorError::InvalidTransaction(e) => e.is_authorization(),
            ProcessorError::Internal(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Malformed request: {reason}")]
    Malformed { reason: String },

    #[error("{signer} is not authorized to change {dimension}")]
    Unauthorized { signer: String, dimension: String },

    #[error("Unhandled family {family} version {version}")]
    UnsupportedFamily { family: String, version: String },

    #[error("Settings for {dimension} already exist")]
    SettingsExist { dimension: String },

    #[error("Settings for {dimension} do not exist")]
    SettingsMissing { dimension: String },

    #[error("Invalid threshold: {reason}")]
    InvalidThreshold { reason: String },

    #[error("Invalid setting change: {reason}")]
    InvalidSettingChange { reason: String },

    #[error("Duplicate proposal {proposal_id}")]
    DuplicateProposal { proposal_id: String },

    #[error("Proposal {proposal_id} does not exist")]
    UnknownProposal { proposal_id: String },

    #[error("{signer} has already voted on {proposal_id}")]
    AlreadyVoted { signer: String, proposal_id: String },

    #[error("{signer} has not voted on {proposal_id}")]
    NotVoted { signer: String, proposal_id: String },

    #[error("Unsetting votes is not supported for {dimension}")]
    UnsetNotSupported { dimension: String },

    #[error("Address {address} is already occupied")]
    AddressOccupied { address: String },

    #[error("Initiate {address} does not exist")]
    MissingInitiate { address: String },

    #[error("Initiate {address} is already matched")]
    AlreadyMatched { address: String },

    #[error("Reciprocating parties do not mirror the initiate")]
    PartnerMismatch,

    #[error("{field} is not in balance")]
    Unbalanced { field: String },

    #[error("Proof does not establish a match for {address}")]
    ProofRejected { address: String },
}

impl ValidationError {
    /// Shorthand for the most common rejection
    pub fn malformed(reason: impl Into<String>) -> Self {
        ValidationError::Malformed { reason: reason.into() }
    }

    /// True for "not permitted" as opposed to "bad data"
    pub fn is_authorization(&self) -> bool {
        matches!(self, ValidationError::Unauthorized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("State timeout during {operation} on {address}")]
    Timeout { operation: String, address: String },

    #[error("State store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Expected {expected} addresses written, store reported {written}")]
    WriteMismatch { expected: usize, written: usize },

    #[error("Stored value at {address} is corrupt: {reason}")]
    CorruptState { address: String, reason: String },

    #[error("Encoding failed: {reason}")]
    Encoding { reason: String },

    #[error("Proof verifier unavailable: {reason}")]
    VerifierUnavailable { reason: String },
}
