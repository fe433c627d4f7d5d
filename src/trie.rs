//! The trie engine (spec.md §4.4): insertion, lookup, prefix traversal,
//! dict materialization, and proof generation/verification.
//!
//! There is no direct teacher counterpart — `ejit-org-ejit-evm`'s
//! `cancun::trie::Trie` recomputes its whole root from an in-memory
//! `BTreeMap` on every `root()` call rather than maintaining an
//! incrementally-updated node tree, and has no node store, proofs, or
//! prefix queries at all. This module is grounded directly on the Python
//! original (`original_source/trie/trie.py`, `tests/test_key_prefix.py`)
//! instead, built on the tagged `Node`/`NodeRef` types, the `nibble`
//! codec, and the `store` module already ported from the teacher's and
//! the pack's idioms.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::Error;
use crate::hash::Hash32;
use crate::nibble::{bytes_to_nibbles, common_prefix_len, nibbles_to_bytes, starts_with};
use crate::node::{empty_trie_root, Node, NodeRef};
use crate::store::{EphemeralStore, NodeStore};

/// Maximum key length accepted by [`Trie::delete`] (spec.md §6).
const MAX_DELETE_KEY_LEN: usize = 32;

/// A hexary Merkle-Patricia trie backed by a [`NodeStore`].
pub struct Trie<S> {
    store: S,
    root_node: Node,
    root_hash: Hash32,
}

impl<S: NodeStore> Trie<S> {
    /// An empty trie over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            root_node: Node::Blank,
            root_hash: empty_trie_root(),
        }
    }

    /// Resumes a trie at a previously-committed root.
    pub fn with_root(store: S, root_hash: Hash32) -> Result<Self, Error> {
        let root_node = if root_hash == empty_trie_root() {
            Node::Blank
        } else {
            let encoded = store.get(&root_hash)?;
            Node::decode(&encoded)?
        };
        Ok(Self { store, root_node, root_hash })
    }

    pub fn root_hash(&self) -> Hash32 {
        self.root_hash
    }

    /// Resets the trie to empty without releasing any previously-committed
    /// node (spec.md §9): matching `original_source/trie/trie.py`'s own
    /// `clear`, which walks the tree but never actually calls its store's
    /// `delete` (its `_delete_node_storage` only ever appends to a
    /// `self.deletes` list, citing the same subtree-aliasing hazard
    /// [`RefCountedStore`](crate::store::RefCountedStore) exists to make
    /// safe). Use a fresh store, or delete the prior root by hash
    /// directly, if reclaiming a cleared trie's storage matters.
    pub fn clear(&mut self) {
        self.root_node = Node::Blank;
        self.root_hash = empty_trie_root();
    }

    /// Releases the store entry a superseded node occupied, if it had one.
    /// Inlined children (encoding under 32 bytes) were never stored, so
    /// this is a no-op for them; hash-referenced children are released
    /// through the store's own `delete` (decrement-or-remove under a
    /// [`crate::store::RefCountedStore`], unconditional removal under an
    /// [`EphemeralStore`]).
    fn release(&mut self, node: &Node) -> Result<(), Error> {
        if node.is_blank() {
            return Ok(());
        }
        let (hash, encoded) = node.hash();
        if encoded.len() >= 32 {
            self.store.delete(&hash)?;
        }
        Ok(())
    }

    /// Runs `update_node` and releases `node`'s old store entry if the
    /// result differs from it (spec.md §9; mirrors
    /// `original_source/trie/trie.py`'s `_update_and_delete_storage`, made
    /// to actually reclaim storage rather than only record candidates).
    fn update_and_release(&mut self, node: Node, key: &[u8], value: Vec<u8>) -> Result<Node, Error> {
        let before = node.clone();
        let after = self.update_node(node, key, value)?;
        if after != before {
            self.release(&before)?;
        }
        Ok(after)
    }

    /// As [`Trie::update_and_release`], for [`Trie::delete_node`].
    fn delete_and_release(&mut self, node: Node, key: &[u8]) -> Result<Node, Error> {
        let before = node.clone();
        let after = self.delete_node(node, key)?;
        if after != before {
            self.release(&before)?;
        }
        Ok(after)
    }

    /// Dereferences a child reference into its node, fetching and
    /// decoding from the store when it is a hash reference.
    fn deref(&self, r: &NodeRef) -> Result<Node, Error> {
        match r {
            NodeRef::Blank => Ok(Node::Blank),
            NodeRef::Inline(node) => Ok((**node).clone()),
            NodeRef::Hash(h) => {
                let encoded = self.store.get(h)?;
                Node::decode(&encoded)
            }
        }
    }

    /// Materializes a child node into a reference: inlined if its
    /// encoding is under 32 bytes, otherwise stored by hash (spec.md
    /// §4.4.3's "small-inline" rule).
    fn materialize(&mut self, node: Node) -> Result<NodeRef, Error> {
        if node.is_blank() {
            return Ok(NodeRef::Blank);
        }
        let (hash, encoded) = node.hash();
        if encoded.len() < 32 {
            Ok(NodeRef::Inline(Box::new(node)))
        } else {
            self.store.put(hash, encoded)?;
            Ok(NodeRef::Hash(hash))
        }
    }

    /// Commits `node` as the new root: unlike ordinary child references,
    /// the root is always stored by hash, regardless of its encoded size.
    fn commit_root(&mut self, node: Node) -> Result<(), Error> {
        let (hash, encoded) = node.hash();
        self.store.put(hash, encoded)?;
        debug!(root = ?hash, "trie root updated");
        self.root_hash = hash;
        self.root_node = node;
        Ok(())
    }

    // ---- insertion (spec.md §4.4.3) ----

    /// Inserts or overwrites `key` with `value`. Both must be non-empty
    /// (spec.md I6).
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidInput("key must be non-empty"));
        }
        if value.is_empty() {
            return Err(Error::InvalidInput("value must be non-empty"));
        }
        let nibbles = bytes_to_nibbles(key);
        let old_root_hash = self.root_hash;
        let root = std::mem::replace(&mut self.root_node, Node::Blank);
        let new_root = self.update_node(root, &nibbles, value.to_vec())?;
        self.commit_root(new_root)?;
        if old_root_hash != self.root_hash {
            self.store.delete(&old_root_hash)?;
        }
        Ok(())
    }

    fn update_node(&mut self, node: Node, key: &[u8], value: Vec<u8>) -> Result<Node, Error> {
        match node {
            Node::Blank => Ok(Node::Leaf { path: key.to_vec(), value }),
            Node::Branch { mut children, mut value: branch_value } => {
                if key.is_empty() {
                    branch_value = Some(value);
                } else {
                    let idx = key[0] as usize;
                    let child_node = self.deref(&children[idx])?;
                    let new_child = self.update_and_release(child_node, &key[1..], value)?;
                    children[idx] = self.materialize(new_child)?;
                }
                Ok(Node::Branch { children, value: branch_value })
            }
            Node::Leaf { path, value: old_value } => {
                self.update_kv_node(path, false, Some(old_value), None, key, value)
            }
            Node::Extension { path, child } => {
                self.update_kv_node(path, true, None, Some(child), key, value)
            }
        }
    }

    /// Shared update logic for leaf and extension nodes (spec.md
    /// §4.4.3's "Leaf or Extension" case). `is_extension` selects between
    /// the two; exactly one of `leaf_value`/`ext_child` is populated to
    /// match.
    fn update_kv_node(
        &mut self,
        curr_path: Vec<u8>,
        is_extension: bool,
        leaf_value: Option<Vec<u8>>,
        ext_child: Option<NodeRef>,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<Node, Error> {
        let prefix_len = common_prefix_len(&curr_path, key);
        let remain_key = &key[prefix_len..];
        let remain_curr = &curr_path[prefix_len..];

        if remain_key.is_empty() && remain_curr.is_empty() && !is_extension {
            // Leaf, exact key match: value replacement is the final
            // answer, no extension-wrapping needed.
            return Ok(Node::Leaf { path: curr_path, value });
        }

        let new_node = if remain_key.is_empty() && remain_curr.is_empty() {
            // is_extension: recurse into the child with the (empty)
            // remaining key.
            let child_node = self.deref(ext_child.as_ref().unwrap())?;
            self.update_and_release(child_node, remain_key, value)?
        } else if remain_curr.is_empty() {
            if is_extension {
                let child_node = self.deref(ext_child.as_ref().unwrap())?;
                self.update_and_release(child_node, remain_key, value)?
            } else {
                let mut branch = Node::branch();
                if let Node::Branch { children, value: branch_value } = &mut branch {
                    *branch_value = leaf_value.clone();
                    let idx = remain_key[0] as usize;
                    let leaf = Node::Leaf { path: remain_key[1..].to_vec(), value };
                    children[idx] = self.materialize(leaf)?;
                }
                branch
            }
        } else {
            let mut branch = Node::branch();
            if let Node::Branch { children, value: branch_value } = &mut branch {
                if remain_curr.len() == 1 && is_extension {
                    children[remain_curr[0] as usize] = ext_child.clone().unwrap();
                } else if is_extension {
                    let ext = Node::Extension {
                        path: remain_curr[1..].to_vec(),
                        child: ext_child.clone().unwrap(),
                    };
                    children[remain_curr[0] as usize] = self.materialize(ext)?;
                } else {
                    let leaf = Node::Leaf {
                        path: remain_curr[1..].to_vec(),
                        value: leaf_value.clone().unwrap(),
                    };
                    children[remain_curr[0] as usize] = self.materialize(leaf)?;
                }
                if remain_key.is_empty() {
                    *branch_value = Some(value);
                } else {
                    let leaf = Node::Leaf { path: remain_key[1..].to_vec(), value };
                    children[remain_key[0] as usize] = self.materialize(leaf)?;
                }
            }
            branch
        };

        if prefix_len > 0 {
            let child_ref = self.materialize(new_node)?;
            Ok(Node::Extension { path: curr_path[..prefix_len].to_vec(), child: child_ref })
        } else {
            Ok(new_node)
        }
    }

    // ---- lookup (spec.md §4.4.2) ----

    /// Looks up `key` against the current root.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let nibbles = bytes_to_nibbles(key);
        self.lookup(&self.root_node, &nibbles, None)
    }

    /// Looks up `key` and returns the referenced nodes visited along the
    /// way (spec.md §4.4.2): a witness sufficient, together with the
    /// root node itself, to replay the lookup against the committed root
    /// via [`Trie::verify_proof_of_existence`].
    pub fn get_with_proof(&self, key: &[u8]) -> Result<(Vec<u8>, Vec<Node>), Error> {
        let nibbles = bytes_to_nibbles(key);
        let mut proof = Vec::new();
        let value = self.lookup(&self.root_node, &nibbles, Some(&mut proof))?;
        Ok((value, proof))
    }

    /// Looks up `key` against a historical root node retained by the
    /// caller rather than the trie's current root (spec.md §5, §6). Reads
    /// any hash-referenced node `root` points to from the trie's *live*
    /// store, so this only resolves correctly if a later `update`/`delete`
    /// hasn't since reclaimed something on `root`'s lookup path (spec.md
    /// §9's aliasing hazard). To retain a witness that survives further
    /// mutation of the live trie, use [`Trie::get_with_proof`] and
    /// [`Trie::verify_proof_of_existence`] instead, which copy the needed
    /// nodes out into an independent store at capture time.
    pub fn get_with_root(&self, key: &[u8], root: &Node) -> Result<Vec<u8>, Error> {
        let nibbles = bytes_to_nibbles(key);
        self.lookup(root, &nibbles, None)
    }

    fn lookup(&self, node: &Node, key: &[u8], mut proof: Option<&mut Vec<Node>>) -> Result<Vec<u8>, Error> {
        match node {
            Node::Blank => Err(Error::KeyNotFound),
            Node::Branch { children, value } => {
                if key.is_empty() {
                    return value.clone().ok_or(Error::KeyNotFound);
                }
                let idx = key[0] as usize;
                let child_ref = &children[idx];
                if child_ref.is_blank() {
                    return Err(Error::KeyNotFound);
                }
                let child_node = self.deref(child_ref)?;
                if let NodeRef::Hash(_) = child_ref {
                    if let Some(p) = proof.as_deref_mut() {
                        p.push(child_node.clone());
                    }
                }
                self.lookup(&child_node, &key[1..], proof)
            }
            Node::Leaf { path, value } => {
                if path.as_slice() == key {
                    Ok(value.clone())
                } else {
                    Err(Error::KeyNotFound)
                }
            }
            Node::Extension { path, child } => {
                if !starts_with(key, path) {
                    return Err(Error::KeyNotFound);
                }
                let child_node = self.deref(child)?;
                let rest = &key[path.len()..];
                if let NodeRef::Hash(_) = child {
                    if let Some(p) = proof.as_deref_mut() {
                        p.push(child_node.clone());
                    }
                }
                self.lookup(&child_node, rest, proof)
            }
        }
    }

    // ---- prefix traversal (spec.md §4.4.4) and prefix query (§4.4.5) ----

    /// Locates the deepest node whose on-path accumulated nibbles equal
    /// `remaining`, possibly minus a trailing branch-index nibble
    /// absorbed by a branch. Returns [`Node::Blank`] if no node anchors
    /// the prefix. `seen` accumulates the nibbles actually consumed along
    /// the way (both extension-path and branch-index nibbles); it is
    /// exactly the nibble path leading to the returned node.
    fn deepest_ancestor(
        &self,
        node: &Node,
        remaining: &[u8],
        seen: &mut Vec<u8>,
        mut proof: Option<&mut Vec<Node>>,
    ) -> Result<Node, Error> {
        match node {
            Node::Blank => Ok(Node::Blank),
            Node::Leaf { path, .. } => {
                if remaining.len() <= path.len() && starts_with(path, remaining) {
                    Ok(node.clone())
                } else {
                    Ok(Node::Blank)
                }
            }
            Node::Extension { path, child } => {
                if remaining.len() <= path.len() {
                    if starts_with(path, remaining) {
                        Ok(node.clone())
                    } else {
                        Ok(Node::Blank)
                    }
                } else if starts_with(remaining, path) {
                    seen.extend_from_slice(path);
                    let child_node = self.deref(child)?;
                    if let NodeRef::Hash(_) = child {
                        if let Some(p) = proof.as_deref_mut() {
                            p.push(child_node.clone());
                        }
                    }
                    self.deepest_ancestor(&child_node, &remaining[path.len()..], seen, proof)
                } else {
                    Ok(Node::Blank)
                }
            }
            Node::Branch { children, .. } => {
                if remaining.is_empty() {
                    return Ok(node.clone());
                }
                let idx = remaining[0] as usize;
                let child_ref = &children[idx];
                if child_ref.is_blank() {
                    return Ok(Node::Blank);
                }
                let child_node = self.deref(child_ref)?;
                seen.push(remaining[0]);
                if let NodeRef::Hash(_) = child_ref {
                    if let Some(p) = proof.as_deref_mut() {
                        p.push(child_node.clone());
                    }
                }
                self.deepest_ancestor(&child_node, &remaining[1..], seen, proof)
            }
        }
    }

    /// Every key/value pair whose key starts with `prefix` (spec.md
    /// §4.4.5). When `with_proof` is set, the returned nodes plus the
    /// root node are sufficient for
    /// [`Trie::verify_proof_of_existence_multi_keys`].
    pub fn get_keys_with_prefix(
        &self,
        prefix: &[u8],
        get_value: bool,
        with_proof: bool,
    ) -> Result<(BTreeMap<Vec<u8>, Vec<u8>>, Option<Vec<Node>>), Error> {
        let prefix_nibbles = bytes_to_nibbles(prefix);
        let mut seen = Vec::new();
        let mut proof = if with_proof { Some(Vec::new()) } else { None };
        let anchor =
            self.deepest_ancestor(&self.root_node, &prefix_nibbles, &mut seen, proof.as_mut())?;

        let mut out = BTreeMap::new();
        if !anchor.is_blank() {
            self.enumerate_subtree(&anchor, &mut seen, get_value, &mut out, proof.as_mut())?;
        }
        trace!(prefix = ?prefix, found = out.len(), "prefix query");
        Ok((out, proof))
    }

    fn enumerate_subtree(
        &self,
        node: &Node,
        path: &mut Vec<u8>,
        get_value: bool,
        out: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        mut proof: Option<&mut Vec<Node>>,
    ) -> Result<(), Error> {
        match node {
            Node::Blank => Ok(()),
            Node::Leaf { path: p, value } => {
                path.extend_from_slice(p);
                let stored = if get_value { value.clone() } else { Vec::new() };
                out.insert(nibbles_to_bytes(path)?, stored);
                path.truncate(path.len() - p.len());
                Ok(())
            }
            Node::Extension { path: p, child } => {
                path.extend_from_slice(p);
                let child_node = self.deref(child)?;
                if let NodeRef::Hash(_) = child {
                    if let Some(pr) = proof.as_deref_mut() {
                        pr.push(child_node.clone());
                    }
                }
                self.enumerate_subtree(&child_node, path, get_value, out, proof.as_deref_mut())?;
                path.truncate(path.len() - p.len());
                Ok(())
            }
            Node::Branch { children, value } => {
                for (i, child) in children.iter().enumerate() {
                    if child.is_blank() {
                        continue;
                    }
                    path.push(i as u8);
                    let child_node = self.deref(child)?;
                    if let NodeRef::Hash(_) = child {
                        if let Some(pr) = proof.as_deref_mut() {
                            pr.push(child_node.clone());
                        }
                    }
                    self.enumerate_subtree(&child_node, path, get_value, out, proof.as_deref_mut())?;
                    path.pop();
                }
                if let Some(v) = value {
                    let stored = if get_value { v.clone() } else { Vec::new() };
                    out.insert(nibbles_to_bytes(path)?, stored);
                }
                Ok(())
            }
        }
    }

    // ---- full materialization ----

    /// Every key/value pair currently in the trie.
    pub fn to_dict(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, Error> {
        let mut out = BTreeMap::new();
        let mut path = Vec::new();
        self.enumerate_subtree(&self.root_node, &mut path, true, &mut out, None)?;
        Ok(out)
    }

    // ---- deletion (spec.md §4.4.8 / SPEC_FULL.md Open Question resolution) ----

    /// Removes `key` from the trie.
    ///
    /// `original_source/trie/trie.py`'s `delete` never collapses a
    /// branch left with a single remaining child back into an
    /// extension/leaf (spec.md §9's Open Question). This implementation
    /// adds that collapse step so I1 ("every internal node has at least
    /// two distinct descendants") keeps holding after a delete; see
    /// `DESIGN.md` for the resolution.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        if key.len() > MAX_DELETE_KEY_LEN {
            return Err(Error::KeyTooLong(key.len()));
        }
        let nibbles = bytes_to_nibbles(key);
        let old_root_hash = self.root_hash;
        let root = std::mem::replace(&mut self.root_node, Node::Blank);
        let new_root = self.delete_node(root, &nibbles)?;
        self.commit_root(new_root)?;
        if old_root_hash != self.root_hash {
            self.store.delete(&old_root_hash)?;
        }
        Ok(())
    }

    fn delete_node(&mut self, node: Node, key: &[u8]) -> Result<Node, Error> {
        match node {
            Node::Blank => Err(Error::KeyNotFound),
            Node::Leaf { path, .. } => {
                if path == key {
                    Ok(Node::Blank)
                } else {
                    Err(Error::KeyNotFound)
                }
            }
            Node::Extension { path, child } => {
                if !starts_with(key, &path) {
                    return Err(Error::KeyNotFound);
                }
                let child_node = self.deref(&child)?;
                let rest = &key[path.len()..];
                let new_child = self.delete_and_release(child_node, rest)?;
                self.rewrap_extension(path, new_child)
            }
            Node::Branch { mut children, mut value } => {
                if key.is_empty() {
                    if value.is_none() {
                        return Err(Error::KeyNotFound);
                    }
                    value = None;
                } else {
                    let idx = key[0] as usize;
                    if children[idx].is_blank() {
                        return Err(Error::KeyNotFound);
                    }
                    let child_node = self.deref(&children[idx])?;
                    let new_child = self.delete_and_release(child_node, &key[1..])?;
                    children[idx] = self.materialize(new_child)?;
                }
                self.collapse_branch(children, value)
            }
        }
    }

    /// Re-wraps the result of deleting inside an extension's child,
    /// merging chained extensions/leaves back into one node (I2: no
    /// extension is ever immediately followed by another extension).
    fn rewrap_extension(&mut self, path: Vec<u8>, new_child: Node) -> Result<Node, Error> {
        match new_child {
            Node::Blank => Ok(Node::Blank),
            Node::Leaf { path: child_path, value } => {
                Ok(Node::Leaf { path: concat(&path, &child_path), value })
            }
            Node::Extension { path: child_path, child } => {
                Ok(Node::Extension { path: concat(&path, &child_path), child })
            }
            branch @ Node::Branch { .. } => {
                let child_ref = self.materialize(branch)?;
                Ok(Node::Extension { path, child: child_ref })
            }
        }
    }

    /// Collapses a branch left with zero or one contributing descendant
    /// back into blank/leaf/extension, per the Open Question resolution.
    fn collapse_branch(
        &mut self,
        children: Box<[NodeRef; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Node, Error> {
        let non_blank: Vec<usize> = (0..16).filter(|&i| !children[i].is_blank()).collect();
        match (non_blank.len(), value) {
            (0, None) => Ok(Node::Blank),
            (0, Some(v)) => Ok(Node::Leaf { path: Vec::new(), value: v }),
            (1, None) => {
                let idx = non_blank[0];
                let child_node = self.deref(&children[idx])?;
                let merged = match child_node.clone() {
                    Node::Leaf { path, value } => {
                        Node::Leaf { path: concat(&[idx as u8], &path), value }
                    }
                    Node::Extension { path, child } => {
                        Node::Extension { path: concat(&[idx as u8], &path), child }
                    }
                    Node::Branch { .. } => {
                        Node::Extension { path: vec![idx as u8], child: children[idx].clone() }
                    }
                    Node::Blank => unreachable!("non_blank slot dereferenced to Blank"),
                };
                // The sole surviving child's own store entry (just
                // materialized a moment ago, in the branch arm above, or
                // inherited from before this delete) is now folded into
                // `merged`'s differently-shaped encoding and is no longer
                // referenced on its own.
                self.release(&child_node)?;
                Ok(merged)
            }
            _ => Ok(Node::Branch { children, value }),
        }
    }

    // ---- proof verification (spec.md §4.4.6) ----
}

fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

impl Trie<EphemeralStore> {
    /// Checks that `key` exists with `value` in the trie committed to
    /// `root`, given a witness `proof_nodes` (which must include the root
    /// node itself). Never propagates an error: any decoding failure,
    /// missing node, or value mismatch is reported as `false`.
    pub fn verify_proof_of_existence(
        root: Hash32,
        key: &[u8],
        value: &[u8],
        proof_nodes: &[Node],
    ) -> bool {
        let trie = match Self::from_proof_nodes(root, proof_nodes) {
            Some(t) => t,
            None => return false,
        };
        matches!(trie.get(key), Ok(v) if v == value)
    }

    /// As [`Trie::verify_proof_of_existence`], but for a whole
    /// `{key -> value}` map at once (spec.md §4.4.5's prefix proofs).
    pub fn verify_proof_of_existence_multi_keys(
        root: Hash32,
        expected: &BTreeMap<Vec<u8>, Vec<u8>>,
        proof_nodes: &[Node],
    ) -> bool {
        let trie = match Self::from_proof_nodes(root, proof_nodes) {
            Some(t) => t,
            None => return false,
        };
        expected
            .iter()
            .all(|(k, v)| matches!(trie.get(k), Ok(got) if &got == v))
    }

    fn from_proof_nodes(root: Hash32, proof_nodes: &[Node]) -> Option<Self> {
        let mut store = EphemeralStore::new();
        for node in proof_nodes {
            let (hash, encoded) = node.hash();
            store.put(hash, encoded).ok()?;
        }
        Trie::with_root(store, root).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap as StdBTreeMap;

    fn new_trie() -> Trie<EphemeralStore> {
        Trie::new(EphemeralStore::new())
    }

    // S1: empty trie.
    #[test]
    fn empty_trie_root_and_miss() {
        let trie = new_trie();
        assert_eq!(trie.root_hash(), empty_trie_root());
        assert!(matches!(trie.get(b"x"), Err(Error::KeyNotFound)));
    }

    // S2: single insert.
    #[test]
    fn single_insert_is_a_leaf() {
        let mut trie = new_trie();
        trie.update(b"91", b"v1").unwrap();
        assert_eq!(trie.get(b"91").unwrap(), b"v1");
        assert!(matches!(trie.get(b"9"), Err(Error::KeyNotFound)));
        assert!(matches!(trie.root_node, Node::Leaf { .. }));
    }

    // S3: shared-prefix insert, root becomes extension-over-branch.
    #[test]
    fn shared_prefix_insert_builds_extension_over_branch() {
        let mut trie = new_trie();
        trie.update(b"91", b"v1").unwrap();
        trie.update(b"92", b"v2").unwrap();
        trie.update(b"93", b"v3").unwrap();
        assert!(matches!(trie.root_node, Node::Extension { .. }));
        if let Node::Extension { child, .. } = &trie.root_node {
            let decoded = trie.deref(child).unwrap();
            assert!(matches!(decoded, Node::Branch { .. }));
        }
        let (dict, _) = trie.get_keys_with_prefix(b"9", true, false).unwrap();
        let expected: StdBTreeMap<_, _> = [
            (b"91".to_vec(), b"v1".to_vec()),
            (b"92".to_vec(), b"v2".to_vec()),
            (b"93".to_vec(), b"v3".to_vec()),
        ]
        .into_iter()
        .collect();
        assert_eq!(dict, expected);
    }

    // S4: prefix proof over 20 keys.
    #[test]
    fn prefix_proof_over_twenty_keys() {
        let mut trie = new_trie();
        let mut expected = StdBTreeMap::new();
        for i in 0..20u32 {
            let key = format!("abcdefgh{i}").into_bytes();
            let value = format!("v{i}").into_bytes();
            trie.update(&key, &value).unwrap();
            expected.insert(key, value);
        }

        let (got, proof) = trie.get_keys_with_prefix(b"abcdefgh", true, true).unwrap();
        assert_eq!(got, expected);

        let mut proof = proof.unwrap();
        proof.push(trie.root_node.clone());
        assert!(Trie::verify_proof_of_existence_multi_keys(
            trie.root_hash(),
            &expected,
            &proof
        ));

        let mut tampered = expected.clone();
        let k = tampered.keys().next().cloned().unwrap();
        tampered.insert(k, b"tampered".to_vec());
        assert!(!Trie::verify_proof_of_existence_multi_keys(
            trie.root_hash(),
            &tampered,
            &proof
        ));
    }

    // S5 / P8: version branching across sequential updates of one key.
    #[test]
    fn historical_roots_remain_queryable() {
        let mut trie = new_trie();
        let key = b"k";

        trie.update(key, b"v1").unwrap();
        let root1 = trie.root_hash();
        let node1 = trie.root_node.clone();

        trie.update(key, b"v2").unwrap();
        let root2 = trie.root_hash();
        let node2 = trie.root_node.clone();

        trie.update(key, b"v3").unwrap();
        let root3 = trie.root_hash();

        assert_eq!(trie.get_with_root(key, &node1).unwrap(), b"v1");
        assert_eq!(trie.get_with_root(key, &node2).unwrap(), b"v2");
        assert_eq!(trie.get(key).unwrap(), b"v3");

        let (v3, mut proof3) = trie.get_with_proof(key).unwrap();
        proof3.push(trie.root_node.clone());
        assert!(Trie::verify_proof_of_existence(root3, key, &v3, &proof3));

        let (v1, mut proof1) = {
            let nibbles = bytes_to_nibbles(key);
            let mut proof = Vec::new();
            let value = trie.lookup(&node1, &nibbles, Some(&mut proof)).unwrap();
            (value, proof)
        };
        proof1.push(node1);
        assert!(Trie::verify_proof_of_existence(root1, key, &v1, &proof1));
        let _ = root2; // exercised via get_with_root above
    }

    // S6: mixed workload.
    #[test]
    fn mixed_workload_insert_then_get_and_miss() {
        let mut trie = new_trie();
        let mut rng = 0x2545f4914f6cdd1du64;
        let mut next = move || {
            rng ^= rng << 13;
            rng ^= rng >> 7;
            rng ^= rng << 17;
            rng
        };
        let mut gen_bytes = |min: usize, max: usize| -> Vec<u8> {
            let len = min + (next() as usize % (max - min + 1));
            (0..len).map(|_| (next() % 256) as u8).collect()
        };

        let mut entries = StdBTreeMap::new();
        while entries.len() < 2000 {
            let k = gen_bytes(30, 50);
            let v = gen_bytes(100, 300);
            trie.update(&k, &v).unwrap();
            entries.insert(k, v);
        }
        for (k, v) in &entries {
            assert_eq!(&trie.get(k).unwrap(), v);
        }

        let mut misses = 0;
        while misses < 200 {
            let k = gen_bytes(30, 50);
            if entries.contains_key(&k) {
                continue;
            }
            assert!(matches!(trie.get(&k), Err(Error::KeyNotFound)));
            misses += 1;
        }
    }

    #[test]
    fn non_existing_keys_after_shared_prefix_inserts() {
        let mut trie = new_trie();
        for (k, v) in [(b"k1".as_slice(), b"v1".as_slice()), (b"k2", b"v2"), (b"x3", b"v3"), (b"y4", b"v4"), (b"z3", b"v5")] {
            trie.update(k, v).unwrap();
        }
        assert_eq!(trie.get(b"k1").unwrap(), b"v1");
        assert!(matches!(trie.get(b"k"), Err(Error::KeyNotFound)));
        assert!(matches!(trie.get(b"43"), Err(Error::KeyNotFound)));
        assert!(matches!(trie.get(b"k11"), Err(Error::KeyNotFound)));

        for (k, v) in [
            (b"abcd1".as_slice(), b"x1".as_slice()),
            (b"abcd2", b"x2"),
            (b"abcd3", b"x3"),
            (b"abcd11", b"x4"),
            (b"abcd12", b"x4"),
            (b"abcd21", b"x5"),
            (b"abcd1111", b"x6"),
            (b"abcd11112", b"x7"),
        ] {
            trie.update(k, v).unwrap();
        }
        assert!(matches!(trie.get(b"abcd"), Err(Error::KeyNotFound)));
        assert!(matches!(trie.get(b"abcd111"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn repeated_update_of_one_key_does_not_leak_store_entries() {
        let mut trie = new_trie();
        let key = b"a-fairly-long-key-to-force-hash-storage";
        for i in 0..50u32 {
            let value = format!("value number {i}, padded out past the inline threshold").into_bytes();
            trie.update(key, &value).unwrap();
        }
        assert_eq!(trie.store.len(), 1, "only the current root should remain stored");
        assert_eq!(trie.get(key).unwrap(), b"value number 49, padded out past the inline threshold");
    }

    #[test]
    fn delete_down_to_empty_does_not_leak_store_entries() {
        let mut trie = new_trie();
        for i in 0..30u32 {
            let key = format!("key-{i}-padded-to-force-hash-storage-of-siblings").into_bytes();
            let value = format!("value-{i}").into_bytes();
            trie.update(&key, &value).unwrap();
        }
        for i in 0..30u32 {
            let key = format!("key-{i}-padded-to-force-hash-storage-of-siblings").into_bytes();
            trie.delete(&key).unwrap();
        }
        assert!(trie.store.is_empty());
        assert_eq!(trie.root_hash(), empty_trie_root());
    }

    #[test]
    fn proof_survives_a_later_mutation_that_reclaims_live_trie_storage() {
        // `get_with_root` replays against the *live* store, so once that
        // store reclaims a superseded node, an in-memory historical root
        // referencing it by hash is no longer safely resolvable — the
        // same aliasing hazard `original_source/trie/trie.py` leaves
        // unsolved. `get_with_proof` sidesteps it: the witness nodes are
        // copied out into their own store at capture time, so they
        // survive whatever the live trie does afterwards.
        let mut trie = new_trie();
        let long = |s: &str| format!("{s}-padded well out past the thirty-two byte inline threshold").into_bytes();
        trie.update(b"91", &long("v1")).unwrap();
        trie.update(b"92", &long("v2")).unwrap();
        trie.update(b"93", &long("v3")).unwrap();

        let (v91, mut proof) = trie.get_with_proof(b"91").unwrap();
        proof.push(trie.root_node.clone());
        let root_at_capture = trie.root_hash();

        trie.delete(b"92").unwrap();

        assert!(Trie::verify_proof_of_existence(root_at_capture, b"91", &v91, &proof));
    }

    #[test]
    fn delete_removes_key_and_collapses_singleton_branch() {
        let mut trie = new_trie();
        trie.update(b"91", b"v1").unwrap();
        trie.update(b"92", b"v2").unwrap();
        trie.delete(b"92").unwrap();
        assert!(matches!(trie.get(b"92"), Err(Error::KeyNotFound)));
        assert_eq!(trie.get(b"91").unwrap(), b"v1");
        // Only one key left: no branch should remain (I1).
        assert!(matches!(trie.root_node, Node::Leaf { .. }));
    }

    #[test]
    fn delete_of_missing_key_is_an_error() {
        let mut trie = new_trie();
        trie.update(b"a", b"1").unwrap();
        assert!(matches!(trie.delete(b"zz"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn delete_rejects_overlong_key() {
        let mut trie = new_trie();
        let long_key = vec![0u8; 33];
        assert!(matches!(trie.delete(&long_key), Err(Error::KeyTooLong(33))));
    }

    #[test]
    fn update_rejects_empty_key_or_value() {
        let mut trie = new_trie();
        assert!(matches!(trie.update(b"", b"v"), Err(Error::InvalidInput(_))));
        assert!(matches!(trie.update(b"k", b""), Err(Error::InvalidInput(_))));
    }

    // P1: order-independence of commitment.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn order_independent_root(
            pairs in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 1..12), proptest::collection::vec(any::<u8>(), 1..12)),
                1..20,
            ),
            seed in any::<u64>(),
        ) {
            let mut dedup = StdBTreeMap::new();
            for (k, v) in pairs {
                dedup.insert(k, v);
            }
            let forward: Vec<_> = dedup.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let mut shuffled = forward.clone();
            // A cheap deterministic shuffle so the test has no external RNG dependency.
            let mut s = seed | 1;
            for i in (1..shuffled.len()).rev() {
                s ^= s << 13; s ^= s >> 7; s ^= s << 17;
                let j = (s as usize) % (i + 1);
                shuffled.swap(i, j);
            }

            let mut trie_a = new_trie();
            for (k, v) in &forward {
                trie_a.update(k, v).unwrap();
            }
            let mut trie_b = new_trie();
            for (k, v) in &shuffled {
                trie_b.update(k, v).unwrap();
            }
            prop_assert!(trie_a.root_hash() == trie_b.root_hash());
        }

        // P2/P3: round-trip get, and KeyNotFound for anything never inserted.
        #[test]
        fn get_round_trips_and_misses_are_reported(
            pairs in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 1..16), proptest::collection::vec(any::<u8>(), 1..16)),
                1..30,
            ),
            probe in proptest::collection::vec(any::<u8>(), 1..16),
        ) {
            let mut dedup = StdBTreeMap::new();
            for (k, v) in pairs {
                dedup.insert(k, v);
            }
            let mut trie = new_trie();
            for (k, v) in &dedup {
                trie.update(k, v).unwrap();
            }
            for (k, v) in &dedup {
                prop_assert_eq!(&trie.get(k).unwrap(), v);
            }
            if !dedup.contains_key(&probe) {
                prop_assert!(matches!(trie.get(&probe), Err(Error::KeyNotFound)));
            }
        }

        // P4/P5: proof accepts the true value, rejects any other.
        #[test]
        fn proof_accepts_true_value_rejects_others(
            pairs in proptest::collection::vec(
                (proptest::collection::vec(any::<u8>(), 1..16), proptest::collection::vec(any::<u8>(), 1..16)),
                1..30,
            ),
            other_value in proptest::collection::vec(any::<u8>(), 1..16),
        ) {
            let mut dedup = StdBTreeMap::new();
            for (k, v) in pairs {
                dedup.insert(k, v);
            }
            let mut trie = new_trie();
            for (k, v) in &dedup {
                trie.update(k, v).unwrap();
            }
            let (k, v) = dedup.iter().next().unwrap();
            let (value, mut proof) = trie.get_with_proof(k).unwrap();
            proof.push(trie.root_node.clone());
            prop_assert!(Trie::verify_proof_of_existence(trie.root_hash(), k, &value, &proof));
            if &other_value != v {
                prop_assert!(!Trie::verify_proof_of_existence(trie.root_hash(), k, &other_value, &proof));
            }
        }

        // P6: prefix query returns exactly the matching keys.
        #[test]
        fn prefix_query_returns_exact_match_set(
            suffixes in proptest::collection::vec(1u32..5000, 1..40),
        ) {
            let mut trie = new_trie();
            let mut expected = StdBTreeMap::new();
            let mut others = StdBTreeMap::new();
            let mut seen_suffixes = std::collections::BTreeSet::new();
            for s in suffixes {
                if !seen_suffixes.insert(s) { continue; }
                let key = format!("px{s}").into_bytes();
                let value = format!("v{s}").into_bytes();
                trie.update(&key, &value).unwrap();
                expected.insert(key, value);
            }
            for s in 0u32..10 {
                let key = format!("other{s}").into_bytes();
                let value = format!("w{s}").into_bytes();
                trie.update(&key, &value).unwrap();
                others.insert(key, value);
            }
            let (got, _) = trie.get_keys_with_prefix(b"px", true, false).unwrap();
            prop_assert_eq!(got, expected);
            let _ = others;
        }
    }
}
