//! Error taxonomy for the trie core.
//!
//! Mirrors the shape of the teacher's hand-rolled `Exception`/`RLPException`
//! enums (one flat enum, one variant per failure mode) but derives
//! `std::error::Error` via `thiserror` instead of leaving that manual.

use crate::hash::Hash32;
use crate::rlp::RlpError;

/// The conditions under which the core reports an unrecoverable or
/// caller-visible failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lookup miss: the key is not present in the trie.
    #[error("key not found")]
    KeyNotFound,

    /// `delete` was called with a key longer than 32 bytes.
    #[error("key too long: {0} bytes, max is 32")]
    KeyTooLong(usize),

    /// A key or value failed a basic shape requirement (e.g. empty).
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// A serialized node failed to decode: truncated or non-canonical
    /// bytes, or a list of the wrong arity. Indicates data corruption.
    #[error("malformed node: {0}")]
    MalformedNode(&'static str),

    /// `nibbles_to_bytes` was given an odd-length sequence or an
    /// out-of-range nibble value.
    #[error("invalid nibble sequence")]
    InvalidNibbles,

    /// A referenced hash has no entry in the node store.
    #[error("node store miss for hash {0:?}")]
    StoreMiss(Hash32),

    /// The recursive-list codec rejected an encoding.
    #[error(transparent)]
    Rlp(#[from] RlpError),
}
