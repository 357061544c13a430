//! Routing of envelopes to family handlers

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, ValidationError};
use crate::handler::{AssetHandler, ExchangeHandler, SettingHandler};
use crate::payload::TransactionEnvelope;
use crate::state::Context;
use crate::traits::TransactionHandler;
use crate::types::Version;
use crate::verifier::ProofVerifier;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Family {family} is already registered")]
    DuplicateFamily { family: String },
}

/// Handlers keyed by family name
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving the setting, asset and match families
    pub fn with_defaults(
        config: &ProcessorConfig,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(SettingHandler::new(config.clone())))?;
        registry.register(Arc::new(AssetHandler::new(config.clone())))?;
        registry.register(Arc::new(ExchangeHandler::new(config.clone(), verifier)))?;
        Ok(registry)
    }

    pub fn register(&mut self, handler: Arc<dyn TransactionHandler>) -> Result<(), RegistryError> {
        let family = handler.family_name();
        if self.handlers.contains_key(&family) {
            return Err(RegistryError::DuplicateFamily { family });
        }
        debug!(%family, versions = handler.family_versions().len(), "handler registered");
        self.handlers.insert(family, handler);
        Ok(())
    }

    pub fn get(&self, family: &str) -> Option<&Arc<dyn TransactionHandler>> {
        self.handlers.get(family)
    }

    pub fn contains(&self, family: &str) -> bool {
        self.handlers.contains_key(family)
    }

    pub fn families(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }

    pub fn versions(&self, family: &str) -> Vec<Version> {
        self.get(family).map(|h| h.family_versions()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Apply an envelope with the handler registered for its family
    pub fn apply(
        &self,
        transaction: &TransactionEnvelope,
        context: &mut dyn Context,
    ) -> Result<(), ProcessorError> {
        let family = &transaction.header.family_name;
        let handler = self.get(family).ok_or_else(|| ValidationError::UnsupportedFamily {
            family: family.clone(),
            version: transaction.header.family_version.clone(),
        })?;
        handler.apply(transaction, context)
    }
}
