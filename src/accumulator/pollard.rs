//! A [Pollard] is a forest made of niece-linked [PolNode]s instead of a flat array. It only
//! needs to keep the nodes that prove the leaves it tracks, everything else can be pruned
//! away as leaves are forgotten. Pollards only grow by additions, deletions belong to the
//! [Forest](super::forest::Forest).
//! # Example
//! ```
//! use utreexo_forest::accumulator::leaf::Leaf;
//! use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//! use utreexo_forest::accumulator::pollard::Pollard;
//!
//! let leaves: Vec<Leaf> = (0..4u8)
//!     .map(|i| Leaf {
//!         hash: BitcoinNodeHash::new([i + 1; 32]),
//!         duration: 0,
//!         remember: i == 3,
//!     })
//!     .collect();
//!
//! let mut pollard = Pollard::new();
//! pollard.add(&leaves).unwrap();
//!
//! // Forgetting 00 and 01 prunes what's only needed to prove them
//! pollard.forget(0).unwrap();
//! pollard.forget(1).unwrap();
//! pollard.collect_garbage();
//! assert!(pollard.prove(0).is_err());
//! assert!(pollard.prove(3).is_ok());
//! ```
use std::collections::HashMap;
use std::collections::HashSet;

use tracing::trace;

use super::error::Error;
use super::leaf::Leaf;
use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;
use super::polnode::NodeArena;
use super::polnode::NodeId;
use super::polnode::PolNode;
use super::proof::BlockProof;
use super::util;

#[derive(Debug, Clone, Default)]
pub struct Pollard<Hash: AccumulatorHash = BitcoinNodeHash> {
    arena: NodeArena<Hash>,
    /// One root per tree, tallest first.
    roots: Vec<NodeId>,
    num_leaves: u64,
    /// Remembered leaves we still hold.
    tracked: HashMap<Hash, NodeId>,
}

impl Pollard {
    pub fn new() -> Self {
        Pollard::new_with_hash()
    }
}

impl<Hash: AccumulatorHash> Pollard<Hash> {
    pub fn new_with_hash() -> Self {
        Pollard {
            arena: NodeArena::new(),
            roots: Vec::new(),
            num_leaves: 0,
            tracked: HashMap::new(),
        }
    }

    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// Nodes held in memory, including pruned ones not yet collected.
    pub fn num_nodes(&self) -> usize {
        self.arena.len()
    }

    pub fn is_tracked(&self, hash: &Hash) -> bool {
        self.tracked.contains_key(hash)
    }

    pub fn arena(&self) -> &NodeArena<Hash> {
        &self.arena
    }

    /// The root of each tree, tallest first.
    pub fn roots(&self) -> Result<Vec<Hash>, Error> {
        self.roots
            .iter()
            .map(|id| self.arena.get(*id).map(|node| node.data))
            .collect()
    }

    /// Appends leaves, remembering the ones flagged for it. Fails without touching the
    /// pollard if a leaf is empty or already tracked.
    pub fn add(&mut self, leaves: &[Leaf<Hash>]) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for leaf in leaves {
            if leaf.hash.is_empty() {
                return Err(Error::EmptyLeaf);
            }
            if self.tracked.contains_key(&leaf.hash) || !seen.insert(leaf.hash) {
                return Err(Error::DuplicateLeaf(leaf.hash.to_string()));
            }
        }

        for leaf in leaves {
            self.add_single(leaf)?;
        }

        trace!(adds = leaves.len(), num_leaves = self.num_leaves, "added to pollard");
        Ok(())
    }

    fn add_single(&mut self, leaf: &Leaf<Hash>) -> Result<(), Error> {
        let mut node = self.arena.insert(PolNode::new(leaf.hash, leaf.remember));
        if leaf.remember {
            self.tracked.insert(leaf.hash, node);
        }

        let mut row = 0;
        while (self.num_leaves >> row) & 1 == 1 {
            let left = self.roots.pop().ok_or_else(|| {
                Error::Sanity(format!("{} leaves but no root at row {row}", self.num_leaves))
            })?;

            // The old roots pointed to their children, now each points to the other's.
            let left_nieces = self.arena.get(left)?.niece;
            let right_nieces = self.arena.get(node)?.niece;
            self.arena.get_mut(left)?.niece = right_nieces;
            self.arena.get_mut(node)?.niece = left_nieces;

            let data = Hash::parent_hash(&self.arena.get(left)?.data, &self.arena.get(node)?.data);
            let mut parent = PolNode::new(data, false);
            parent.niece = [Some(left), Some(node)];
            node = self.arena.insert(parent);
            row += 1;
        }

        self.roots.push(node);
        self.num_leaves += 1;
        Ok(())
    }

    /// Walks from the root down to the leaf at `pos`. Each step is `(node, sibling)`, the
    /// first one being `(root, root)`.
    fn descend(&self, pos: u64) -> Result<Vec<(NodeId, NodeId)>, Error> {
        let (tree, start, rows) =
            util::detect_tree(pos, self.num_leaves).ok_or(Error::InvalidTarget(pos))?;
        let root = *self.roots.get(tree).ok_or(Error::InvalidTarget(pos))?;

        let offset = pos - start;
        let mut path = Vec::with_capacity(rows as usize + 1);
        path.push((root, root));

        let mut holder = root;
        for row in (0..rows).rev() {
            let bit = ((offset >> row) & 1) as usize;
            let niece = self.arena.get(holder)?.niece;
            let (Some(node), Some(sibling)) = (niece[bit], niece[bit ^ 1]) else {
                return Err(Error::Pruned(pos));
            };
            path.push((node, sibling));
            holder = sibling;
        }

        Ok(path)
    }

    /// Returns the leaf at `pos` and its sibling. A root leaf is its own sibling.
    pub fn grab_pos(&self, pos: u64) -> Result<(&PolNode<Hash>, &PolNode<Hash>), Error> {
        let path = self.descend(pos)?;
        let (node, sibling) = path.last().copied().ok_or(Error::InvalidTarget(pos))?;

        Ok((self.arena.get(node)?, self.arena.get(sibling)?))
    }

    /// Proves the leaf at `pos`. Fails with [Error::Pruned] if we no longer hold the nodes.
    pub fn prove(&self, pos: u64) -> Result<BlockProof<Hash>, Error> {
        let path = self.descend(pos)?;
        let proof = path
            .iter()
            .skip(1)
            .rev()
            .map(|(_, sibling)| self.arena.get(*sibling).map(|node| node.data))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BlockProof::new(vec![pos], proof))
    }

    /// Stops tracking the leaf at `pos`, and prunes whatever was only kept to prove it.
    /// Forgetting a leaf that's already been pruned away does nothing.
    pub fn forget(&mut self, pos: u64) -> Result<(), Error> {
        let path = match self.descend(pos) {
            Ok(path) => path,
            Err(Error::Pruned(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let (leaf, _) = path.last().copied().ok_or(Error::InvalidTarget(pos))?;

        let node = self.arena.get_mut(leaf)?;
        node.remember = false;
        let hash = node.data;
        if self.tracked.get(&hash) == Some(&leaf) {
            self.tracked.remove(&hash);
        }

        // The sibling at each step holds the next step's pair, the last holder is the
        // leaf's own.
        let mut holders = path[..path.len() - 1].iter().rev().map(|(_, holder)| *holder);
        let mut pruned = 0;
        if let Some(first) = holders.next() {
            if self.arena.leaf_prune(first, &mut self.tracked)? {
                pruned += 1;
                for holder in holders {
                    if !self.arena.prune(holder)? {
                        break;
                    }
                    pruned += 1;
                }
            }
        }

        trace!(position = pos, pruned, "forgot leaf");
        Ok(())
    }

    /// Frees the nodes pruning left unreachable. Returns how many were freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.arena.collect_garbage(&self.roots)
    }
}
