//! The node taxonomy (spec.md §3, §4.4.1): blank, leaf, extension, hexary
//! branch, and their recursive-list encoding.
//!
//! Grounded in the teacher's `InternalNode` enum (`cancun/trie.rs`,
//! `LeafNode`/`ExtensionNode`/`BranchNode`/`None`) but given the tagged,
//! typed shape spec.md §9 recommends (`ChildRef = Inline(Node) | Hash |
//! Blank`) rather than the teacher's untyped `Vec<Verbatim>` lists.

use crate::hash::{sha3_256, Hash32};
use crate::nibble::{pack_hp, unpack_hp};
use crate::rlp::Rlp;
use crate::Error;

/// A reference from a parent node to a child: either absent, inlined
/// directly (when the child's encoding is under 32 bytes), or addressed
/// by the hash under which it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Blank,
    Inline(Box<Node>),
    Hash(Hash32),
}

impl NodeRef {
    pub fn is_blank(&self) -> bool {
        matches!(self, NodeRef::Blank)
    }

    fn to_rlp(&self) -> Rlp {
        match self {
            NodeRef::Blank => Rlp::Bytes(Vec::new()),
            NodeRef::Hash(h) => Rlp::Bytes(h.as_ref().to_vec()),
            NodeRef::Inline(node) => node.to_rlp(),
        }
    }

    fn from_rlp(rlp: &Rlp) -> Result<NodeRef, Error> {
        match rlp {
            Rlp::Bytes(b) if b.is_empty() => Ok(NodeRef::Blank),
            Rlp::Bytes(b) if b.len() == 32 => {
                let mut h = [0u8; 32];
                h.copy_from_slice(b);
                Ok(NodeRef::Hash(Hash32(h)))
            }
            Rlp::Bytes(_) => Err(Error::MalformedNode("node reference of invalid length")),
            Rlp::List(_) => Ok(NodeRef::Inline(Box::new(Node::from_rlp(rlp)?))),
        }
    }
}

/// A trie node: the empty node, a terminal leaf, a path-compressing
/// extension, or a 16-way branch with an optional value of its own.
///
/// `path` fields hold nibbles *without* the HP leaf/extension flag or
/// terminator — those are applied only at encode/decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Blank,
    Leaf { path: Vec<u8>, value: Vec<u8> },
    Extension { path: Vec<u8>, child: NodeRef },
    Branch { children: Box<[NodeRef; 16]>, value: Option<Vec<u8>> },
}

impl Node {
    pub fn branch() -> Node {
        Node::Branch {
            children: Box::new(std::array::from_fn(|_| NodeRef::Blank)),
            value: None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank)
    }

    /// Encodes this node into the recursive-list form spec.md §4.2
    /// specifies: blank is the empty byte string, leaf/extension are
    /// 2-element lists, branch is a 17-element list.
    pub fn to_rlp(&self) -> Rlp {
        match self {
            Node::Blank => Rlp::Bytes(Vec::new()),
            Node::Leaf { path, value } => {
                Rlp::List(vec![Rlp::Bytes(pack_hp(path, true)), Rlp::Bytes(value.clone())])
            }
            Node::Extension { path, child } => {
                Rlp::List(vec![Rlp::Bytes(pack_hp(path, false)), child.to_rlp()])
            }
            Node::Branch { children, value } => {
                let mut items: Vec<Rlp> = children.iter().map(NodeRef::to_rlp).collect();
                items.push(Rlp::Bytes(value.clone().unwrap_or_default()));
                Rlp::List(items)
            }
        }
    }

    /// Decodes a node from its recursive-list form. Fails with
    /// [`Error::MalformedNode`] on anything that isn't blank, a 2-element
    /// list, or a 17-element list.
    pub fn from_rlp(rlp: &Rlp) -> Result<Node, Error> {
        match rlp {
            Rlp::Bytes(b) if b.is_empty() => Ok(Node::Blank),
            Rlp::Bytes(_) => Err(Error::MalformedNode("bare non-empty byte string is not a node")),
            Rlp::List(items) => match items.len() {
                2 => {
                    let path_bytes = items[0]
                        .as_bytes()
                        .ok_or(Error::MalformedNode("node path must be a byte string"))?;
                    let (path, is_leaf) = unpack_hp(path_bytes)?;
                    if is_leaf {
                        let value = items[1]
                            .as_bytes()
                            .ok_or(Error::MalformedNode("leaf value must be a byte string"))?
                            .to_vec();
                        Ok(Node::Leaf { path, value })
                    } else {
                        let child = NodeRef::from_rlp(&items[1])?;
                        Ok(Node::Extension { path, child })
                    }
                }
                17 => {
                    let mut children: Box<[NodeRef; 16]> =
                        Box::new(std::array::from_fn(|_| NodeRef::Blank));
                    for (slot, item) in children.iter_mut().zip(&items[..16]) {
                        *slot = NodeRef::from_rlp(item)?;
                    }
                    let value = match &items[16] {
                        Rlp::Bytes(b) if b.is_empty() => None,
                        Rlp::Bytes(b) => Some(b.clone()),
                        Rlp::List(_) => {
                            return Err(Error::MalformedNode("branch value must be a byte string"))
                        }
                    };
                    Ok(Node::Branch { children, value })
                }
                _ => Err(Error::MalformedNode("node list must have 2 or 17 elements")),
            },
        }
    }

    /// Serializes and hashes this node in one step: spec.md §4.2's
    /// `hash(node) -> (hash32, serialized)`.
    pub fn hash(&self) -> (Hash32, Vec<u8>) {
        let encoded = self.to_rlp().encode();
        let h = sha3_256(&encoded);
        (h, encoded)
    }

    /// Decodes a previously-serialized node.
    pub fn decode(bytes: &[u8]) -> Result<Node, Error> {
        if bytes.is_empty() {
            return Ok(Node::Blank);
        }
        let rlp = Rlp::decode(bytes)?;
        Node::from_rlp(&rlp)
    }
}

/// The root hash of an empty trie: `sha3_256` of the blank node's
/// encoding (a single `0x80` byte in the recursive-list codec).
pub fn empty_trie_root() -> Hash32 {
    Node::Blank.hash().0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_round_trips() {
        let encoded = Node::Blank.to_rlp().encode();
        assert_eq!(encoded, vec![0x80]);
        assert_eq!(Node::decode(&encoded).unwrap(), Node::Blank);
    }

    #[test]
    fn leaf_round_trips() {
        let node = Node::Leaf { path: vec![9, 1], value: b"v1".to_vec() };
        let encoded = node.to_rlp().encode();
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn extension_round_trips_with_hash_child() {
        let node = Node::Extension {
            path: vec![9],
            child: NodeRef::Hash(Hash32([7u8; 32])),
        };
        let encoded = node.to_rlp().encode();
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn branch_round_trips_with_inline_child() {
        let mut branch = Node::branch();
        if let Node::Branch { children, value } = &mut branch {
            children[3] = NodeRef::Inline(Box::new(Node::Leaf {
                path: vec![5],
                value: b"x".to_vec(),
            }));
            *value = Some(b"term".to_vec());
        }
        let encoded = branch.to_rlp().encode();
        assert_eq!(Node::decode(&encoded).unwrap(), branch);
    }

    #[test]
    fn empty_trie_root_is_the_known_constant() {
        assert_eq!(
            format!("{:?}", empty_trie_root()),
            "0xbc2071a4de846f285702447f2589dd163678e0972a8a1b0d28b04ed5c094547f"
        );
    }

    #[test]
    fn decode_rejects_wrong_arity_list() {
        let bogus = Rlp::List(vec![Rlp::bytes(*b"a"), Rlp::bytes(*b"b"), Rlp::bytes(*b"c")]);
        assert!(matches!(
            Node::from_rlp(&bogus),
            Err(Error::MalformedNode(_))
        ));
    }
}
