//! Deterministic Exchange Transaction Processors (DXTP)
//!
//! Application logic for a ledger-based exchange: deterministic addressing,
//! candidate governance over settings and assets, and initiate/reciprocate
//! matching under a plaintext balance check or a zero-knowledge proof.

pub mod address;
pub mod asset;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod governance;
pub mod handler;
pub mod hasher;
pub mod memory;
pub mod payload;
pub mod registry;
pub mod replay;
pub mod setting;
pub mod state;
pub mod traits;
pub mod types;
pub mod verifier;

// Re-export core types and traits
pub use address::{
    Address, AddressScheme, Classification, Dimension, ExchangeOp, Family, IdentGenerator, Subtype,
};
pub use asset::{Asset, AssetKind};
pub use codec::{BincodeCodec, EntityCodec};
pub use config::{ConfigError, ProcessorConfig, ProcessorConfigBuilder, VerifierConfig};
pub use error::{InternalError, ProcessorError, ValidationError};
pub use events::{Event, EventLog};
pub use exchange::{
    check_balance, DirectMatcher, Exchange, ExchangeMode, Mtxq, OpaqueMatcher, OpaqueReciprocate,
    ReciprocateRequest, Utxq,
};
pub use governance::{
    create_settings, Candidate, Candidates, GovernedDimension, Proposal, Resolution, VoteRecord,
};
pub use handler::{AssetHandler, ExchangeHandler, GovernanceHandler, SettingHandler};
pub use hasher::StateHasher;
pub use memory::{Checkpoint, MemoryContext, StateDiff};
pub use payload::{
    CreateSettings, ExchangeKind, ExchangePayload, GovernanceAction, GovernancePayload, ProposalRef,
    TransactionEnvelope, TransactionHeader, VoteData,
};
pub use registry::{HandlerRegistry, RegistryError};
pub use replay::{
    ReplayComparison, ReplayEngine, ReplayEngineBuilder, ReplayResult, TransactionOutcome,
};
pub use setting::{SettingChange, Settings};
pub use state::{Context, EventSink, StateAccess, StateStore, WriteSet};
pub use traits::{Entity, TransactionHandler};
pub use types::{LeUint, ProposalId, PublicKey, Quantity, Ratio, StateHash, Version, Vote};
pub use verifier::{CommandVerifier, ProofVerifier, StaticVerifier, VerifierError};
