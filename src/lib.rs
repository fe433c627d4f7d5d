//! A hexary Merkle-Patricia trie: a persistent, content-addressed,
//! authenticated key-value store.
//!
//! Keys and values are arbitrary byte strings. The trie commits to its
//! entire contents in a single 32-byte root, and any party who trusts that
//! root can verify inclusion of a key/value pair, or of every key sharing
//! a common prefix, against a compact set of witness nodes.

pub mod error;
pub mod hash;
pub mod nibble;
pub mod node;
pub mod rlp;
pub mod store;
pub mod trie;

pub use error::Error;
pub use hash::Hash32;
pub use node::{Node, NodeRef};
pub use store::{EphemeralStore, NodeStore, RefCountedStore};
pub use trie::Trie;
