//! The 32-byte content address.
//!
//! Adapted from the teacher's `crypto::hash` module (same `Hash32`
//! newtype and thin hasher-wrapper shape), swapping `tiny_keccak`'s
//! Keccak256 for the `sha3` crate's SHA3-256 — spec.md §4.2 names
//! `sha3_256` specifically, which predates and differs from the
//! Keccak used by Ethereum itself.

use sha3::{Digest, Sha3_256};

/// A 32-byte cryptographic digest; the trie's unit of content address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash32(pub [u8; 32]);

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&fmt_hex(&self.0))
    }
}

impl std::ops::Deref for Hash32 {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Computes the SHA3-256 digest of `buffer`.
pub fn sha3_256(buffer: &[u8]) -> Hash32 {
    let mut hasher = Sha3_256::new();
    hasher.update(buffer);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32(out)
}

/// Renders `bytes` as a `0x`-prefixed lowercase hex string, keeping
/// leading zero bytes (this formats opaque digests and node encodings,
/// not big-endian integers, so `0x00ab` must print differently from
/// `0xab`).
fn fmt_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
