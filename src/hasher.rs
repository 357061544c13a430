//! State root hashing using Blake3

use blake3::Hasher as Blake3Hasher;

use crate::address::Address;
use crate::types::StateHash;

/// StateHasher digests the full contents of a store
///
/// Entries are fed in address order with length prefixes, so two stores
/// holding the same cells always produce the same root regardless of the
/// order in which the cells were written.
#[derive(Debug, Clone, Default)]
pub struct StateHasher;

impl StateHasher {
    pub fn new() -> Self {
        Self
    }

    /// Compute the root of a set of cells already sorted by address
    pub fn root<'a, I>(&self, entries: I) -> StateHash
    where
        I: IntoIterator<Item = (&'a Address, &'a Vec<u8>)>,
    {
        let mut hasher = Blake3Hasher::new();
        for (address, value) in entries {
            hasher.update(address.as_str().as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        StateHash(*hasher.finalize().as_bytes())
    }

    /// Hash arbitrary canonical bytes, used for content addressed ids
    pub fn digest(&self, bytes: &[u8]) -> StateHash {
        StateHash(*blake3::hash(bytes).as_bytes())
    }

    /// Extend a chain of roots by one more root
    pub fn extend_chain(&self, previous_chain_hash: &StateHash, new_hash: &StateHash) -> StateHash {
        let mut hasher = Blake3Hasher::new();
        hasher.update(&previous_chain_hash.0);
        hasher.update(&new_hash.0);
        StateHash(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressScheme, Dimension};
    use std::collections::BTreeMap;

    #[test]
    fn test_root_consistency() {
        let scheme = AddressScheme::default();
        let mut cells = BTreeMap::new();
        cells.insert(scheme.settings(Dimension::Unit), vec![1, 2, 3]);

        let hasher = StateHasher::new();
        assert_eq!(hasher.root(&cells), hasher.root(&cells));
    }

    #[test]
    fn test_root_distinguishes_value_boundaries() {
        let scheme = AddressScheme::default();
        let a = scheme.settings(Dimension::Unit);
        let b = scheme.settings(Dimension::Resource);

        let mut first = BTreeMap::new();
        first.insert(a.clone(), vec![1, 2]);
        first.insert(b.clone(), vec![3]);

        let mut second = BTreeMap::new();
        second.insert(a, vec![1]);
        second.insert(b, vec![2, 3]);

        let hasher = StateHasher::new();
        assert_ne!(hasher.root(&first), hasher.root(&second));
    }

    #[test]
    fn test_chain_order_matters() {
        let hasher = StateHasher::new();
        let one = hasher.digest(b"one");
        let two = hasher.digest(b"two");

        let forward = hasher.extend_chain(&one, &two);
        let backward = hasher.extend_chain(&two, &one);
        assert_ne!(forward, backward);
    }
}
