//! Typed access to the host's key-value state
//!
//! The host owns the store and the event channel. Processors read through
//! [`StateAccess`], collect every mutation of a transaction into one
//! [`WriteSet`], and submit it with a single `set_state` call so the host can
//! apply it atomically and detect conflicting concurrent writes.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::address::Address;
use crate::codec;
use crate::error::InternalError;
use crate::events::Event;

/// Read/write handle into global state supplied by the host
pub trait StateStore {
    /// Read cells; one entry per requested address, `None` when absent
    fn get_state(
        &self,
        addresses: &[Address],
        timeout: Duration,
    ) -> Result<Vec<Option<Vec<u8>>>, InternalError>;

    /// Write cells all-or-nothing, returning the addresses written
    fn set_state(
        &mut self,
        entries: &[(Address, Vec<u8>)],
        timeout: Duration,
    ) -> Result<Vec<Address>, InternalError>;
}

/// Best-effort notification channel
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Everything a handler needs from the host for one transaction
pub trait Context: StateStore + EventSink {}

impl<T: StateStore + EventSink + ?Sized> Context for T {}

/// Pending mutations of one transaction, ordered by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    entries: BTreeMap<Address, Vec<u8>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an entity in canonical encoding
    pub fn put_entity<T: Serialize>(
        &mut self,
        address: Address,
        value: &T,
    ) -> Result<(), InternalError> {
        let bytes = codec::encode(value)?;
        self.entries.insert(address, bytes);
        Ok(())
    }

    /// Stage bytes verbatim
    pub fn put_raw(&mut self, address: Address, bytes: Vec<u8>) {
        self.entries.insert(address, bytes);
    }

    pub fn get(&self, address: &Address) -> Option<&Vec<u8>> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.entries.keys()
    }

    pub fn into_entries(self) -> Vec<(Address, Vec<u8>)> {
        self.entries.into_iter().collect()
    }
}

/// Typed façade over a host context with a fixed per-call timeout
pub struct StateAccess<'a, C: Context + ?Sized> {
    context: &'a mut C,
    timeout: Duration,
}

impl<'a, C: Context + ?Sized> StateAccess<'a, C> {
    pub fn new(context: &'a mut C, timeout: Duration) -> Self {
        Self { context, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read several cells in one round trip
    pub fn get_many(&self, addresses: &[Address]) -> Result<Vec<Option<Vec<u8>>>, InternalError> {
        let results = self.context.get_state(addresses, self.timeout).map_err(|e| {
            warn!(error = %e, count = addresses.len(), "state read failed");
            e
        })?;
        if results.len() != addresses.len() {
            return Err(InternalError::StoreUnavailable {
                reason: format!(
                    "requested {} cells, store returned {}",
                    addresses.len(),
                    results.len()
                ),
            });
        }
        Ok(results)
    }

    /// Read one cell
    pub fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, InternalError> {
        let mut results = self.get_many(std::slice::from_ref(address))?;
        Ok(results.pop().flatten())
    }

    /// Read and decode one cell
    pub fn get_entity<T: DeserializeOwned>(
        &self,
        address: &Address,
    ) -> Result<Option<T>, InternalError> {
        match self.get(address)? {
            Some(bytes) => codec::decode_stored(address, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn exists(&self, address: &Address) -> Result<bool, InternalError> {
        Ok(self.get(address)?.is_some())
    }

    /// Submit every staged mutation as one atomic write
    pub fn commit(&mut self, writes: WriteSet) -> Result<Vec<Address>, InternalError> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let expected: Vec<Address> = writes.addresses().cloned().collect();
        let entries = writes.into_entries();
        let written = self.context.set_state(&entries, self.timeout).map_err(|e| {
            warn!(error = %e, count = expected.len(), "state write failed");
            e
        })?;

        let complete =
            written.len() == expected.len() && expected.iter().all(|a| written.contains(a));
        if !complete {
            warn!(
                expected = expected.len(),
                written = written.len(),
                "store acknowledged a partial write"
            );
            return Err(InternalError::WriteMismatch {
                expected: expected.len(),
                written: written.len(),
            });
        }
        Ok(written)
    }

    /// Forward a notification; never fails the transaction
    pub fn emit(&mut self, event: Event) {
        self.context.emit(event);
    }
}
