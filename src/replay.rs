//! Deterministic replay of transaction logs
//!
//! A [`ReplayEngine`] applies a log of envelopes to a fresh in-memory store
//! and records the outcome and state root after every transaction. Running
//! the same log on several replicas and comparing roots is how divergence
//! between processor builds is caught.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::ProcessorError;
use crate::events::Event;
use crate::hasher::StateHasher;
use crate::memory::MemoryContext;
use crate::payload::TransactionEnvelope;
use crate::registry::HandlerRegistry;
use crate::types::StateHash;

/// How a single transaction ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    Committed,
    Invalid { reason: String },
    Internal { reason: String },
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed)
    }
}

impl From<&Result<(), ProcessorError>> for TransactionOutcome {
    fn from(result: &Result<(), ProcessorError>) -> Self {
        match result {
            Ok(()) => TransactionOutcome::Committed,
            Err(ProcessorError::InvalidTransaction(e)) => TransactionOutcome::Invalid {
                reason: e.to_string(),
            },
            Err(ProcessorError::Internal(e)) => TransactionOutcome::Internal {
                reason: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub index: usize,
    pub family: String,
    pub signer: String,
    pub outcome: TransactionOutcome,
    /// Root after the transaction
    pub root: StateHash,
    /// Running chain over every root so far
    pub chain: StateHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration_ms: u64,
    pub transactions_per_second: f64,
    pub average_transaction_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub final_root: StateHash,
    pub chain_hash: StateHash,
    pub records: Vec<TransactionRecord>,
    pub events: Vec<Event>,
    pub cells: BTreeMap<Address, Vec<u8>>,
    pub performance_metrics: PerformanceMetrics,
}

impl ReplayResult {
    pub fn committed(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_committed()).count()
    }

    pub fn rejected(&self) -> usize {
        self.records.len() - self.committed()
    }
}

/// Replays envelope logs against a fresh store
pub struct ReplayEngine {
    registry: HandlerRegistry,
    genesis: BTreeMap<Address, Vec<u8>>,
    hasher: StateHasher,
}

impl ReplayEngine {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            genesis: BTreeMap::new(),
            hasher: StateHasher::new(),
        }
    }

    pub fn builder() -> ReplayEngineBuilder {
        ReplayEngineBuilder::new()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn genesis_root(&self) -> StateHash {
        self.hasher.root(&self.genesis)
    }

    /// Apply every envelope in order, continuing past rejected ones
    pub fn replay(&self, transactions: &[TransactionEnvelope]) -> ReplayResult {
        let start_time = Instant::now();
        let mut context = MemoryContext::with_cells(self.genesis.clone());
        let mut chain = self.genesis_root();
        let mut records = Vec::with_capacity(transactions.len());

        for (index, envelope) in transactions.iter().enumerate() {
            let result = self.registry.apply(envelope, &mut context);
            let outcome = TransactionOutcome::from(&result);
            match &outcome {
                TransactionOutcome::Committed => {}
                TransactionOutcome::Invalid { reason } => {
                    debug!(index, %reason, "transaction rejected")
                }
                TransactionOutcome::Internal { reason } => {
                    warn!(index, %reason, "transaction failed")
                }
            }

            let root = context.state_root();
            chain = self.hasher.extend_chain(&chain, &root);
            records.push(TransactionRecord {
                index,
                family: envelope.header.family_name.clone(),
                signer: envelope.signer().to_string(),
                outcome,
                root,
                chain,
            });
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let transactions_per_second = if duration_ms > 0 {
            transactions.len() as f64 / (duration_ms as f64 / 1000.0)
        } else {
            0.0
        };
        let average_transaction_time_ms = if transactions.is_empty() {
            0.0
        } else {
            duration_ms as f64 / transactions.len() as f64
        };

        ReplayResult {
            final_root: context.state_root(),
            chain_hash: chain,
            records,
            events: context.events().entries().to_vec(),
            cells: context.cells().clone(),
            performance_metrics: PerformanceMetrics {
                total_duration_ms: duration_ms,
                transactions_per_second,
                average_transaction_time_ms,
            },
        }
    }

    /// Replay the same log on `replicas` independent stores in parallel
    pub fn verify_determinism(
        &self,
        transactions: &[TransactionEnvelope],
        replicas: usize,
    ) -> ReplayComparison {
        let results: Vec<ReplayResult> = (0..replicas.max(1))
            .into_par_iter()
            .map(|_| self.replay(transactions))
            .collect();

        let mut comparison = ReplayComparison {
            baseline_root: results[0].final_root,
            replicas: results.len(),
            divergences: Vec::new(),
        };
        for (replica, result) in results.iter().enumerate().skip(1) {
            let divergences = ReplayComparison::compare_records(replica, &results[0], result);
            comparison.divergences.extend(divergences);
        }
        comparison
    }
}

/// Fluent construction of a [`ReplayEngine`]
#[derive(Default)]
pub struct ReplayEngineBuilder {
    registry: Option<HandlerRegistry>,
    genesis: BTreeMap<Address, Vec<u8>>,
}

impl ReplayEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Seed the store before the first transaction
    pub fn with_genesis(mut self, cells: BTreeMap<Address, Vec<u8>>) -> Self {
        self.genesis = cells;
        self
    }

    pub fn build(self) -> Result<ReplayEngine, String> {
        let registry = self.registry.ok_or("Handler registry is required")?;
        if registry.is_empty() {
            return Err("Handler registry has no families".to_string());
        }
        let mut engine = ReplayEngine::new(registry);
        engine.genesis = self.genesis;
        Ok(engine)
    }
}

/// A point where a replica disagreed with the baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub replica: usize,
    /// `None` when only the record counts differ
    pub index: Option<usize>,
    pub expected: StateHash,
    pub actual: StateHash,
}

#[derive(Debug, Clone)]
pub struct ReplayComparison {
    pub baseline_root: StateHash,
    pub replicas: usize,
    pub divergences: Vec<Divergence>,
}

impl ReplayComparison {
    /// Records of `other` that disagree with `baseline`
    pub fn compare_records(
        replica: usize,
        baseline: &ReplayResult,
        other: &ReplayResult,
    ) -> Vec<Divergence> {
        let mut divergences: Vec<Divergence> = baseline
            .records
            .iter()
            .zip(&other.records)
            .filter(|(b, o)| b.root != o.root || b.outcome != o.outcome)
            .map(|(b, o)| Divergence {
                replica,
                index: Some(b.index),
                expected: b.root,
                actual: o.root,
            })
            .collect();

        if baseline.records.len() != other.records.len()
            || baseline.final_root != other.final_root
        {
            divergences.push(Divergence {
                replica,
                index: None,
                expected: baseline.final_root,
                actual: other.final_root,
            });
        }
        divergences
    }

    pub fn are_identical(&self) -> bool {
        self.divergences.is_empty()
    }

    pub fn first_divergence(&self) -> Option<&Divergence> {
        self.divergences.iter().find(|d| d.index.is_some()).or(self.divergences.first())
    }

    pub fn summary(&self) -> String {
        if self.are_identical() {
            format!("{} replicas agree on {}", self.replicas, self.baseline_root)
        } else {
            format!(
                "{} divergences across {} replicas",
                self.divergences.len(),
                self.replicas
            )
        }
    }
}
