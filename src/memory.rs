//! In-memory host context
//!
//! Stands in for the validator's Merkle store when replaying logs and in
//! tests. Writes are all-or-nothing per `set_state` call, roots are computed
//! with [`StateHasher`], and store failures can be injected to exercise the
//! internal error paths.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::address::Address;
use crate::error::InternalError;
use crate::events::{Event, EventLog};
use crate::hasher::StateHasher;
use crate::state::{EventSink, StateStore};
use crate::types::StateHash;

/// Snapshot of every cell at a point in a replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub cells: BTreeMap<Address, Vec<u8>>,
    pub root: StateHash,
    pub write_index: usize,
}

/// Cells that differ between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub added: Vec<Address>,
    pub changed: Vec<Address>,
    pub removed: Vec<Address>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// One-shot failures armed by tests
#[derive(Debug, Clone, Default)]
struct Faults {
    fail_next_get: Cell<bool>,
    fail_next_set: bool,
    short_next_set: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    cells: BTreeMap<Address, Vec<u8>>,
    events: EventLog,
    hasher: StateHasher,
    checkpoints: Vec<Checkpoint>,
    write_count: usize,
    faults: Faults,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing cells, e.g. a genesis snapshot
    pub fn with_cells(cells: BTreeMap<Address, Vec<u8>>) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn get_raw(&self, address: &Address) -> Option<&Vec<u8>> {
        self.cells.get(address)
    }

    /// Write a cell directly, bypassing fault injection
    pub fn insert_raw(&mut self, address: Address, bytes: Vec<u8>) {
        self.cells.insert(address, bytes);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.cells.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &BTreeMap<Address, Vec<u8>> {
        &self.cells
    }

    /// Number of successful `set_state` calls
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn state_root(&self) -> StateHash {
        self.hasher.root(&self.cells)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain recorded events
    pub fn take_events(&mut self) -> EventLog {
        std::mem::take(&mut self.events)
    }

    /// Make the next read fail with a timeout
    pub fn fail_next_get(&mut self) {
        self.faults.fail_next_get.set(true);
    }

    /// Make the next write fail with a timeout before touching any cell
    pub fn fail_next_set(&mut self) {
        self.faults.fail_next_set = true;
    }

    /// Make the next write persist and acknowledge one cell fewer than asked
    pub fn short_next_set(&mut self) {
        self.faults.short_next_set = true;
    }

    pub fn create_checkpoint(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint {
            cells: self.cells.clone(),
            root: self.state_root(),
            write_index: self.write_count,
        };
        self.checkpoints.push(checkpoint.clone());
        checkpoint
    }

    /// Restore a snapshot after checking its root
    pub fn restore_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), InternalError> {
        let computed = self.hasher.root(&checkpoint.cells);
        if computed != checkpoint.root {
            return Err(InternalError::CorruptState {
                address: "checkpoint".to_string(),
                reason: format!("root mismatch: expected {}, got {}", checkpoint.root, computed),
            });
        }
        self.cells = checkpoint.cells.clone();
        self.write_count = checkpoint.write_index;
        Ok(())
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Cells changed since `checkpoint`
    pub fn diff_since(&self, checkpoint: &Checkpoint) -> StateDiff {
        let mut diff = StateDiff::default();
        for (address, value) in &self.cells {
            match checkpoint.cells.get(address) {
                None => diff.added.push(address.clone()),
                Some(previous) if previous != value => diff.changed.push(address.clone()),
                Some(_) => {}
            }
        }
        diff.removed = checkpoint
            .cells
            .keys()
            .filter(|a| !self.cells.contains_key(*a))
            .cloned()
            .collect();
        diff
    }
}

impl StateStore for MemoryContext {
    fn get_state(
        &self,
        addresses: &[Address],
        _timeout: Duration,
    ) -> Result<Vec<Option<Vec<u8>>>, InternalError> {
        if self.faults.fail_next_get.replace(false) {
            return Err(InternalError::Timeout {
                operation: "get".to_string(),
                address: addresses.first().map(|a| a.to_string()).unwrap_or_default(),
            });
        }
        Ok(addresses.iter().map(|a| self.cells.get(a).cloned()).collect())
    }

    fn set_state(
        &mut self,
        entries: &[(Address, Vec<u8>)],
        _timeout: Duration,
    ) -> Result<Vec<Address>, InternalError> {
        if std::mem::take(&mut self.faults.fail_next_set) {
            return Err(InternalError::Timeout {
                operation: "set".to_string(),
                address: entries.first().map(|(a, _)| a.to_string()).unwrap_or_default(),
            });
        }
        let keep = if std::mem::take(&mut self.faults.short_next_set) {
            entries.len().saturating_sub(1)
        } else {
            entries.len()
        };

        let mut written = Vec::with_capacity(keep);
        for (address, value) in entries.iter().take(keep) {
            self.cells.insert(address.clone(), value.clone());
            written.push(address.clone());
        }
        self.write_count += 1;
        debug!(cells = written.len(), "memory store committed write");
        Ok(written)
    }
}

impl EventSink for MemoryContext {
    fn emit(&mut self, event: Event) {
        self.events.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressScheme, Dimension, Family};
    use crate::state::{StateAccess, WriteSet};

    fn timeout() -> Duration {
        Duration::from_millis(10)
    }

    #[test]
    fn test_set_and_get() {
        let scheme = AddressScheme::default();
        let address = scheme.settings(Dimension::Unit);
        let mut context = MemoryContext::new();

        let written = context.set_state(&[(address.clone(), vec![1])], timeout()).unwrap();
        assert_eq!(written, vec![address.clone()]);
        assert_eq!(context.get_state(&[address], timeout()).unwrap(), vec![Some(vec![1])]);
    }

    #[test]
    fn test_failed_set_leaves_store_untouched() {
        let scheme = AddressScheme::default();
        let mut context = MemoryContext::new();
        let before = context.state_root();

        context.fail_next_set();
        let result = context.set_state(&[(scheme.settings(Dimension::Unit), vec![1])], timeout());
        assert!(matches!(result, Err(InternalError::Timeout { .. })));
        assert_eq!(context.state_root(), before);
        assert_eq!(context.write_count(), 0);
    }

    #[test]
    fn test_short_write_is_reported_as_mismatch() {
        let scheme = AddressScheme::default();
        let mut context = MemoryContext::new();
        context.short_next_set();

        let mut writes = WriteSet::new();
        writes.put_raw(scheme.settings(Dimension::Unit), vec![1]);
        writes.put_raw(scheme.candidates(Family::Asset, Dimension::Unit), vec![2]);

        let mut access = StateAccess::new(&mut context, timeout());
        let result = access.commit(writes);
        assert_eq!(result, Err(InternalError::WriteMismatch { expected: 2, written: 1 }));
    }

    #[test]
    fn test_checkpoint_restore_and_diff() {
        let scheme = AddressScheme::default();
        let unit = scheme.settings(Dimension::Unit);
        let resource = scheme.settings(Dimension::Resource);

        let mut context = MemoryContext::new();
        context.insert_raw(unit.clone(), vec![1]);
        let checkpoint = context.create_checkpoint();

        context.insert_raw(unit.clone(), vec![2]);
        context.insert_raw(resource.clone(), vec![3]);
        let diff = context.diff_since(&checkpoint);
        assert_eq!(diff.added, vec![resource]);
        assert_eq!(diff.changed, vec![unit]);
        assert!(diff.removed.is_empty());

        context.restore_checkpoint(&checkpoint).unwrap();
        assert_eq!(context.state_root(), checkpoint.root);
        assert!(context.diff_since(&checkpoint).is_empty());
    }

    #[test]
    fn test_tampered_checkpoint_is_refused() {
        let scheme = AddressScheme::default();
        let mut context = MemoryContext::new();
        let mut checkpoint = context.create_checkpoint();
        checkpoint.cells.insert(scheme.settings(Dimension::Unit), vec![9]);

        assert!(context.restore_checkpoint(&checkpoint).is_err());
    }
}
