//! The recursive length-prefixed list codec.
//!
//! This is the "canonical recursive length-prefixed encoding of nested
//! byte-strings" external collaborator from spec.md §4.2: a node is either
//! a byte string or a list of nodes, and this module's contract is to
//! encode/decode that shape deterministically. Ported from the teacher's
//! `ethereum_rlp::rlp` module (`encode_bytes`, `encode_joined_encodings`,
//! `decode_to_bytes`, `find_joined_encodings`, `decode_length`), trimmed
//! from the teacher's per-Rust-type `Extended` trait (which exists to RLP
//! arbitrary EVM value types — `Uint`, `Address`, `U256`, tuples, `Vec<T>`
//! — none of which the trie needs) down to the one recursive shape the
//! trie's node encoding actually uses.

/// A value in the recursive-list codec: either a byte string or a list of
/// such values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rlp {
    Bytes(Vec<u8>),
    List(Vec<Rlp>),
}

/// Failure decoding or encoding a recursive-list value. Mirrors the
/// teacher's `RLPException`, but as a `thiserror`-derived type (see
/// `src/error.rs` for why this crate prefers that over the teacher's
/// bare string-literal enum).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RlpError {
    #[error("rlp decoding error: {0}")]
    Decoding(&'static str),
}

impl Rlp {
    pub fn bytes(b: impl Into<Vec<u8>>) -> Rlp {
        Rlp::Bytes(b.into())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Rlp::Bytes(b) => Some(b),
            Rlp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Rlp]> {
        match self {
            Rlp::List(l) => Some(l),
            Rlp::Bytes(_) => None,
        }
    }

    /// Encodes this value using the recursive length-prefix rules.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Rlp::Bytes(b) => encode_bytes(out, b),
            Rlp::List(items) => {
                let mut joined = Vec::new();
                for item in items {
                    item.encode_into(&mut joined);
                }
                encode_joined_encodings(out, &joined);
            }
        }
    }

    /// Decodes a single value, failing if trailing bytes remain.
    pub fn decode(data: &[u8]) -> Result<Rlp, RlpError> {
        let mut buf = data;
        let value = Rlp::decode_one(&mut buf)?;
        if !buf.is_empty() {
            return Err(RlpError::Decoding("trailing bytes after value"));
        }
        Ok(value)
    }

    fn decode_one(buf: &mut &[u8]) -> Result<Rlp, RlpError> {
        if buf.is_empty() {
            return Err(RlpError::Decoding("unexpected end of input"));
        }
        if buf[0] <= 0xbf {
            let bytes = decode_bytes(buf)?;
            Ok(Rlp::Bytes(bytes))
        } else {
            let joined = find_joined_encodings(buf)?;
            let mut rest = joined;
            let mut items = Vec::new();
            while !rest.is_empty() {
                items.push(Rlp::decode_one(&mut rest)?);
            }
            Ok(Rlp::List(items))
        }
    }
}

/// Encodes `raw_bytes`, a byte string, using the length-prefix rules.
pub fn encode_bytes(buffer: &mut Vec<u8>, raw_bytes: &[u8]) {
    let len = raw_bytes.len();
    if len == 1 && raw_bytes[0] < 0x80 {
        buffer.push(raw_bytes[0]);
    } else if len < 0x38 {
        buffer.push(0x80 + len as u8);
        buffer.extend_from_slice(raw_bytes);
    } else {
        let len_be = len.to_be_bytes();
        let lz = len_be.iter().position(|b| *b != 0).unwrap();
        let len_be = &len_be[lz..];
        buffer.push(0xb7 + len_be.len() as u8);
        buffer.extend_from_slice(len_be);
        buffer.extend_from_slice(raw_bytes);
    }
}

/// Wraps an already-joined concatenation of encoded child values with the
/// list length-prefix.
pub fn encode_joined_encodings(dest: &mut Vec<u8>, joined_encodings: &[u8]) {
    let len = joined_encodings.len();
    if len < 0x38 {
        dest.push(0xc0 + len as u8);
    } else {
        let len_be = len.to_be_bytes();
        let lz = len_be.iter().position(|b| *b != 0).unwrap();
        let len_be = &len_be[lz..];
        dest.push(0xf7 + len_be.len() as u8);
        dest.extend_from_slice(len_be);
    }
    dest.extend_from_slice(joined_encodings);
}

fn decode_length(src: &[u8]) -> usize {
    let mut res = [0u8; std::mem::size_of::<usize>()];
    res[std::mem::size_of::<usize>() - src.len()..].copy_from_slice(src);
    usize::from_be_bytes(res)
}

/// Decodes a byte-string value from the front of `buffer`, advancing it
/// past the consumed bytes.
fn decode_bytes(buffer: &mut &[u8]) -> Result<Vec<u8>, RlpError> {
    if buffer.is_empty() || buffer[0] > 0xbf {
        return Err(RlpError::Decoding("expected bytes, got a sequence"));
    }
    if buffer[0] <= 0x80 {
        let b = buffer[0];
        *buffer = &buffer[1..];
        if b == 0x80 {
            Ok(Vec::new())
        } else {
            Ok(vec![b])
        }
    } else if buffer[0] <= 0xb7 {
        let len = (buffer[0] - 0x80) as usize;
        if 1 + len > buffer.len() {
            return Err(RlpError::Decoding("truncated"));
        }
        let raw = buffer[1..1 + len].to_vec();
        if raw.len() == 1 && raw[0] < 0x80 {
            return Err(RlpError::Decoding("non-canonical single byte encoding"));
        }
        *buffer = &buffer[1 + len..];
        Ok(raw)
    } else {
        let len_of_len = (buffer[0] - 0xb7) as usize;
        if 1 + len_of_len > buffer.len() {
            return Err(RlpError::Decoding("truncated length"));
        }
        if buffer[1] == 0 {
            return Err(RlpError::Decoding("non-canonical length prefix"));
        }
        let len = decode_length(&buffer[1..1 + len_of_len]);
        if len < 0x38 {
            return Err(RlpError::Decoding("non-canonical short length"));
        }
        let start = 1 + len_of_len;
        if start + len > buffer.len() {
            return Err(RlpError::Decoding("truncated"));
        }
        let raw = buffer[start..start + len].to_vec();
        *buffer = &buffer[start + len..];
        Ok(raw)
    }
}

/// Decodes a list's joined child encodings from the front of `buffer`,
/// returning them still-encoded (the caller decodes each child in turn).
fn find_joined_encodings<'a>(buffer: &mut &'a [u8]) -> Result<&'a [u8], RlpError> {
    if buffer.is_empty() || buffer[0] <= 0xbf {
        return Err(RlpError::Decoding("expected a sequence"));
    }
    if buffer[0] <= 0xf7 {
        let len = (buffer[0] - 0xc0) as usize;
        if 1 + len > buffer.len() {
            return Err(RlpError::Decoding("truncated sequence"));
        }
        let joined = &buffer[1..1 + len];
        *buffer = &buffer[1 + len..];
        Ok(joined)
    } else {
        let len_of_len = (buffer[0] - 0xf7) as usize;
        if 1 + len_of_len > buffer.len() {
            return Err(RlpError::Decoding("truncated sequence length"));
        }
        if buffer[1] == 0 {
            return Err(RlpError::Decoding("non-canonical length prefix"));
        }
        let len = decode_length(&buffer[1..1 + len_of_len]);
        if len < 0x38 {
            return Err(RlpError::Decoding("non-canonical short length"));
        }
        let start = 1 + len_of_len;
        if start + len > buffer.len() {
            return Err(RlpError::Decoding("truncated sequence"));
        }
        let joined = &buffer[start..start + len];
        *buffer = &buffer[start + len..];
        Ok(joined)
    }
}

#[cfg(test)]
mod tests;
