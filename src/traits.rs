//! Core traits for the processors

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ProcessorError, ValidationError};
use crate::payload::TransactionEnvelope;
use crate::state::Context;
use crate::types::Version;

/// A value that can be stored in state and checked for well-formedness
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Validate the value for completeness and consistency
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Per-family entry point invoked by the host for every transaction
pub trait TransactionHandler: Send + Sync {
    /// Family name declared in transaction headers
    fn family_name(&self) -> String;

    /// Versions of the family this handler accepts
    fn family_versions(&self) -> Vec<Version>;

    /// Address prefixes this handler reads and writes
    fn namespaces(&self) -> Vec<String>;

    /// Apply one transaction, committing all of its writes or none
    fn apply(
        &self,
        transaction: &TransactionEnvelope,
        context: &mut dyn Context,
    ) -> Result<(), ProcessorError>;
}
