//! The content-addressed node store (spec.md §4.3).
//!
//! Two interchangeable implementations satisfy [`NodeStore`]: an in-memory
//! [`EphemeralStore`] (ported from the Python original's `EphemDB`) and a
//! [`RefCountedStore`] wrapper (ported from `RefcountDB`) that makes
//! subtree aliasing across historical roots safe to delete from. Neither
//! has a counterpart in the teacher crate — the teacher recomputes its
//! whole trie root from an in-memory `BTreeMap` on every `root()` call and
//! never persists individual nodes — so this module is grounded directly
//! on the Python original rather than on `ejit-org-ejit-evm`.

use std::collections::HashMap;

use tracing::trace;

use crate::error::Error;
use crate::hash::Hash32;

/// A mapping from 32-byte content addresses to their serialized node
/// bytes, with idempotent `put` and commit-on-demand semantics.
pub trait NodeStore {
    fn get(&self, key: &Hash32) -> Result<Vec<u8>, Error>;
    fn put(&mut self, key: Hash32, value: Vec<u8>) -> Result<(), Error>;
    fn delete(&mut self, key: &Hash32) -> Result<(), Error>;
    fn contains(&self, key: &Hash32) -> bool;
    /// Flushes any buffered writes. A no-op for in-memory stores.
    fn commit(&mut self) {}
}

/// An in-memory node store. For tests and short-lived tries; `delete`
/// physically removes the entry, so it is safe only when no other root
/// can still reach the deleted node (spec.md §5, §9).
#[derive(Debug, Clone, Default)]
pub struct EphemeralStore {
    map: HashMap<Hash32, Vec<u8>>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl NodeStore for EphemeralStore {
    fn get(&self, key: &Hash32) -> Result<Vec<u8>, Error> {
        self.map.get(key).cloned().ok_or(Error::StoreMiss(*key))
    }

    fn put(&mut self, key: Hash32, value: Vec<u8>) -> Result<(), Error> {
        trace!(?key, len = value.len(), "ephemeral store put");
        self.map.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &Hash32) -> Result<(), Error> {
        trace!(?key, "ephemeral store delete");
        self.map.remove(key);
        Ok(())
    }

    fn contains(&self, key: &Hash32) -> bool {
        self.map.contains_key(key)
    }
}

/// Width, in bytes, of the big-endian reference count prefix each stored
/// value carries. Matches the Python original's `zpad(encode_int(...), 4)`.
const REFCOUNT_WIDTH: usize = 4;

/// Wraps any [`NodeStore`] with a 4-byte big-endian reference count
/// prefixed to every stored value. `put` increments the count (asserting
/// value equality on conflict, per spec.md §4.3); `delete` decrements it
/// and only removes the entry once the count reaches zero. This is the
/// mechanism spec.md §9 recommends for safely deleting nodes that may be
/// shared between the current root and a caller-retained historical one.
#[derive(Debug, Clone, Default)]
pub struct RefCountedStore<S> {
    base: S,
}

impl<S: NodeStore> RefCountedStore<S> {
    pub fn new(base: S) -> Self {
        Self { base }
    }

    pub fn into_inner(self) -> S {
        self.base
    }

    /// Current reference count for `key`, or `0` if absent.
    pub fn refcount(&self, key: &Hash32) -> u32 {
        match self.base.get(key) {
            Ok(raw) => u32::from_be_bytes(raw[..REFCOUNT_WIDTH].try_into().unwrap()),
            Err(_) => 0,
        }
    }
}

impl<S: NodeStore> NodeStore for RefCountedStore<S> {
    fn get(&self, key: &Hash32) -> Result<Vec<u8>, Error> {
        let raw = self.base.get(key)?;
        Ok(raw[REFCOUNT_WIDTH..].to_vec())
    }

    fn put(&mut self, key: Hash32, value: Vec<u8>) -> Result<(), Error> {
        match self.base.get(&key) {
            Ok(existing) => {
                let (count_bytes, existing_value) = existing.split_at(REFCOUNT_WIDTH);
                if existing_value != value.as_slice() {
                    return Err(Error::MalformedNode(
                        "refcounted store: conflicting value for existing hash",
                    ));
                }
                let count = u32::from_be_bytes(count_bytes.try_into().unwrap());
                let mut next = Vec::with_capacity(REFCOUNT_WIDTH + value.len());
                next.extend_from_slice(&(count + 1).to_be_bytes());
                next.extend_from_slice(&value);
                trace!(?key, count = count + 1, "refcounted store put (increment)");
                self.base.put(key, next)
            }
            Err(_) => {
                let mut next = Vec::with_capacity(REFCOUNT_WIDTH + value.len());
                next.extend_from_slice(&1u32.to_be_bytes());
                next.extend_from_slice(&value);
                trace!(?key, count = 1, "refcounted store put (new)");
                self.base.put(key, next)
            }
        }
    }

    fn delete(&mut self, key: &Hash32) -> Result<(), Error> {
        let raw = match self.base.get(key) {
            Ok(raw) => raw,
            Err(_) => return Ok(()),
        };
        let (count_bytes, value) = raw.split_at(REFCOUNT_WIDTH);
        let count = u32::from_be_bytes(count_bytes.try_into().unwrap());
        if count <= 1 {
            trace!(?key, "refcounted store delete (count reached zero)");
            self.base.delete(key)
        } else {
            let mut next = Vec::with_capacity(raw.len());
            next.extend_from_slice(&(count - 1).to_be_bytes());
            next.extend_from_slice(value);
            trace!(?key, count = count - 1, "refcounted store delete (decrement)");
            self.base.put(*key, next)
        }
    }

    fn contains(&self, key: &Hash32) -> bool {
        self.base.contains(key)
    }

    fn commit(&mut self) {
        self.base.commit();
    }
}
