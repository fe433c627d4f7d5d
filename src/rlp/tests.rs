use super::*;

#[test]
fn short_string() {
    assert_eq!(Rlp::bytes(*b"dog").encode(), vec![0x83, b'd', b'o', b'g']);
}

#[test]
fn single_byte_below_0x80_is_itself() {
    assert_eq!(Rlp::bytes([0x00]).encode(), vec![0x00]);
    assert_eq!(Rlp::bytes([0x7f]).encode(), vec![0x7f]);
}

#[test]
fn empty_string() {
    assert_eq!(Rlp::bytes([]).encode(), vec![0x80]);
}

#[test]
fn empty_list() {
    assert_eq!(Rlp::List(vec![]).encode(), vec![0xc0]);
}

#[test]
fn short_list() {
    let val = Rlp::List(vec![Rlp::bytes(*b"cat"), Rlp::bytes(*b"dog")]);
    assert_eq!(
        val.encode(),
        vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
    );
}

#[test]
fn long_string_prefix() {
    let long = Rlp::bytes(
        "Lorem ipsum dolor sit amet, consectetur adipisicing elit".as_bytes(),
    );
    let encoded = long.encode();
    assert_eq!(&encoded[0..2], &[0xb8, 0x38]);
}

#[test]
fn nested_lists_round_trip() {
    let val = Rlp::List(vec![
        Rlp::List(vec![]),
        Rlp::List(vec![Rlp::List(vec![])]),
        Rlp::bytes(*b"hi"),
    ]);
    let encoded = val.encode();
    let decoded = Rlp::decode(&encoded).unwrap();
    assert_eq!(decoded, val);
}

#[test]
fn decode_rejects_trailing_bytes() {
    let mut encoded = Rlp::bytes(*b"dog").encode();
    encoded.push(0xff);
    assert!(Rlp::decode(&encoded).is_err());
}

#[test]
fn decode_rejects_truncated_input() {
    assert!(Rlp::decode(&[0x83, b'd', b'o']).is_err());
}

#[test]
fn decode_rejects_non_canonical_single_byte() {
    // 0x81 0x00 encodes the single byte 0x00 non-canonically; it should
    // have been encoded as the bare byte 0x00.
    assert!(Rlp::decode(&[0x81, 0x00]).is_err());
}

proptest::proptest! {
    #[test]
    fn byte_strings_round_trip(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..200)) {
        let val = Rlp::bytes(bytes);
        let encoded = val.encode();
        proptest::prop_assert_eq!(Rlp::decode(&encoded).unwrap(), val);
    }
}
