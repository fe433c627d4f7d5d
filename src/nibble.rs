//! Nibble sequences and hex-prefix (HP) encoding.
//!
//! Ported from the teacher's `bytes_to_nibble_list`/`nibble_list_to_compact`
//! in `cancun/trie.rs`, cross-checked against the exact bit layout in the
//! Python original's `trie/utils.py` (`pack_nibbles`/`unpack_to_nibbles`):
//! the flag nibble is `2*is_leaf + parity`, and an even-length sequence is
//! padded with a `0` nibble after the flag rather than folding the flag
//! into the first real nibble.

use crate::error::Error;

/// Internal-only sentinel marking the end of a leaf's key path. Never
/// appears in nibble sequences the caller can observe (`to_dict`, `update`
/// arguments and the byte strings this module round-trips).
pub const TERMINATOR: u8 = 16;

/// Converts a byte string into nibbles, two per byte, high nibble first.
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(b >> 4);
        out.push(b & 0x0f);
    }
    out
}

/// Packs a nibble sequence of even length back into bytes.
///
/// Fails with [`Error::InvalidNibbles`] if any nibble is out of range or
/// the sequence has odd length.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Result<Vec<u8>, Error> {
    if nibbles.len() % 2 != 0 || nibbles.iter().any(|&n| n > 15) {
        return Err(Error::InvalidNibbles);
    }
    let mut out = Vec::with_capacity(nibbles.len() / 2);
    for pair in nibbles.chunks_exact(2) {
        out.push(pair[0] * 16 + pair[1]);
    }
    Ok(out)
}

/// Packs a nibble sequence (without a trailing terminator) together with
/// a leaf/extension flag into hex-prefix-encoded bytes.
///
/// `is_leaf` selects the `t` bit of the flag nibble (spec.md §3); callers
/// pass the path nibbles without the terminator, as the terminator is
/// implied by `is_leaf` rather than carried in `nibbles`.
pub fn pack_hp(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag: u8 = if is_leaf { 2 } else { 0 };
    let odd = nibbles.len() % 2 == 1;
    let mut padded = Vec::with_capacity(nibbles.len() + 2);
    if odd {
        padded.push(flag | 1);
        padded.extend_from_slice(nibbles);
    } else {
        padded.push(flag);
        padded.push(0);
        padded.extend_from_slice(nibbles);
    }
    // `padded` now has even length and packs cleanly; the flag nibble is
    // always in range, so this cannot fail.
    nibbles_to_bytes(&padded).expect("hp-padded sequence is always even and in-range")
}

/// Inverse of [`pack_hp`]: recovers the nibble sequence and the leaf flag.
///
/// Fails with [`Error::InvalidNibbles`] if `bytes` is empty.
pub fn unpack_hp(bytes: &[u8]) -> Result<(Vec<u8>, bool), Error> {
    if bytes.is_empty() {
        return Err(Error::InvalidNibbles);
    }
    let nibbles = bytes_to_nibbles(bytes);
    let flag = nibbles[0];
    let is_leaf = flag & 2 != 0;
    let odd = flag & 1 != 0;
    let rest = if odd { &nibbles[1..] } else { &nibbles[2..] };
    Ok((rest.to_vec(), is_leaf))
}

/// True iff `prefix` is a proper or exact prefix of `full`.
pub fn starts_with(full: &[u8], prefix: &[u8]) -> bool {
    full.len() >= prefix.len() && full[..prefix.len()] == *prefix
}

/// Length of the longest common prefix of two nibble sequences.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bytes_to_nibbles_empty() {
        assert_eq!(bytes_to_nibbles(b""), Vec::<u8>::new());
    }

    #[test]
    fn bytes_to_nibbles_basic() {
        assert_eq!(bytes_to_nibbles(b"\x12\xab"), vec![1, 2, 10, 11]);
    }

    #[test]
    fn nibbles_to_bytes_rejects_odd_length() {
        assert!(matches!(nibbles_to_bytes(&[1, 2, 3]), Err(Error::InvalidNibbles)));
    }

    #[test]
    fn nibbles_to_bytes_rejects_out_of_range() {
        assert!(matches!(nibbles_to_bytes(&[1, 16]), Err(Error::InvalidNibbles)));
    }

    #[test]
    fn hp_even_leaf() {
        let packed = pack_hp(&[1, 2, 3, 4], true);
        assert_eq!(packed, vec![0x20, 0x12, 0x34]);
        assert_eq!(unpack_hp(&packed).unwrap(), (vec![1, 2, 3, 4], true));
    }

    #[test]
    fn hp_odd_extension() {
        let packed = pack_hp(&[1, 2, 3], false);
        assert_eq!(packed, vec![0x11, 0x23]);
        assert_eq!(unpack_hp(&packed).unwrap(), (vec![1, 2, 3], false));
    }

    #[test]
    fn starts_with_basic() {
        assert!(starts_with(&[1, 2, 3], &[1, 2]));
        assert!(starts_with(&[1, 2, 3], &[1, 2, 3]));
        assert!(!starts_with(&[1, 2], &[1, 2, 3]));
        assert!(!starts_with(&[1, 2, 3], &[1, 3]));
    }

    proptest! {
        // P7: HP round-trips for every nibble sequence and flag.
        #[test]
        fn hp_round_trips(nibbles in proptest::collection::vec(0u8..16, 0..40), is_leaf in any::<bool>()) {
            let packed = pack_hp(&nibbles, is_leaf);
            prop_assert_eq!(unpack_hp(&packed).unwrap(), (nibbles, is_leaf));
        }

        #[test]
        fn bytes_nibbles_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..40)) {
            let nibbles = bytes_to_nibbles(&bytes);
            prop_assert_eq!(nibbles_to_bytes(&nibbles).unwrap(), bytes);
        }
    }
}
