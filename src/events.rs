//! Notifications emitted to the host after a transaction commits
//!
//! Events are best effort and never affect state. [`EventLog`] is the
//! recording sink used by the in-memory context and by tests.

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressScheme, Family};

pub const ATTR_UPDATED: &str = "updated";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_UNBALANCED: &str = "unbalanced_address";
pub const ATTR_BALANCED: &str = "balanced_address";

/// A single host notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute to the event
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// First value recorded for `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entity written by a governance decision
    pub fn entity_updated(scheme: &AddressScheme, family: Family, address: &Address) -> Self {
        Event::new(format!("{}.{}/update", scheme.namespace(), family.literal()))
            .with_attribute(ATTR_UPDATED, address.as_str())
    }

    /// Exchange step completed
    pub fn exchange_completed(
        scheme: &AddressScheme,
        step: &str,
        ukey: &Address,
        mkey: Option<&Address>,
    ) -> Self {
        let event_type = format!("{}.{}/{}", scheme.namespace(), Family::Match.literal(), step);
        let mut event = Event::new(event_type)
            .with_attribute(ATTR_STATUS, "completed")
            .with_attribute(ATTR_UNBALANCED, ukey.as_str());
        if let Some(mkey) = mkey {
            event = event.with_attribute(ATTR_BALANCED, mkey.as_str());
        }
        event
    }
}

/// Recording sink that keeps events in emission order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Event) {
        self.entries.push(event);
    }

    pub fn entries(&self) -> &[Event] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Filter entries by event type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&Event> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Events that carry `value` under `key`
    pub fn filter_by_attribute(&self, key: &str, value: &str) -> Vec<&Event> {
        self.entries
            .iter()
            .filter(|e| e.attribute(key) == Some(value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Dimension, ExchangeOp};

    #[test]
    fn test_entity_updated_shape() {
        let scheme = AddressScheme::default();
        let address = scheme.asset(Dimension::Unit, "imperial", "foot");
        let event = Event::entity_updated(&scheme, Family::Asset, &address);

        assert_eq!(event.event_type, "hashblock.asset/update");
        assert_eq!(event.attribute(ATTR_UPDATED), Some(address.as_str()));
    }

    #[test]
    fn test_log_filtering() {
        let scheme = AddressScheme::default();
        let ukey = scheme.exchange(ExchangeOp::Ask, "a");
        let mkey = scheme.exchange(ExchangeOp::Tell, "b");

        let mut log = EventLog::new();
        log.record(Event::exchange_completed(&scheme, "initiate", &ukey, None));
        log.record(Event::exchange_completed(&scheme, "reciprocate", &ukey, Some(&mkey)));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("hashblock.match/reciprocate").len(), 1);
        assert_eq!(log.filter_by_attribute(ATTR_UNBALANCED, ukey.as_str()).len(), 2);
        assert_eq!(log.filter_by_attribute(ATTR_BALANCED, mkey.as_str()).len(), 1);

        log.clear();
        assert!(log.is_empty());
    }
}
