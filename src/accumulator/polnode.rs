//! Pollard nodes, and the arena that owns them.
//!
//! A pollard node doesn't point to its children, it points to its *nieces*: the children of
//! its sibling. That way the node holding a leaf's parent pair is the one that also knows the
//! leaf's sibling, which is what a proof needs. Roots are the exception, they have no sibling
//! and point to their own children.
//! ```!
//! // 06
//! // |-------\
//! // 04      05
//! // |---\   |---\
//! // 00  01  02  03
//! ```
//! Here 06 points to 04 and 05, 04 points to 02 and 03, and 05 points to 00 and 01.
//!
//! Nodes live in a [NodeArena] and refer to each other by [NodeId]. Chopping a node just
//! clears its niece ids, the nodes below stay in the arena until the next
//! [collect_garbage](NodeArena::collect_garbage).
use std::collections::HashMap;
use std::collections::HashSet;

use slotmap::DefaultKey;
use slotmap::SlotMap;
use tracing::trace;

use super::error::Error;
use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;

/// Handle to a node in a [NodeArena]. Once the node is collected the handle stops resolving,
/// even if its slot gets reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) DefaultKey);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolNode<Hash: AccumulatorHash = BitcoinNodeHash> {
    pub data: Hash,
    /// Whether the leaf below this node is still tracked. Only meaningful for leaves.
    pub remember: bool,
    /// Left and right niece.
    pub niece: [Option<NodeId>; 2],
}

impl<Hash: AccumulatorHash> PolNode<Hash> {
    pub fn new(data: Hash, remember: bool) -> Self {
        PolNode {
            data,
            remember,
            niece: [None, None],
        }
    }

    /// Whether this node can authenticate its sibling, i.e. it has both nieces.
    pub fn auntable(&self) -> bool {
        self.niece[0].is_some() && self.niece[1].is_some()
    }

    /// Whether there's nothing to descend into from here.
    pub fn dead_end(&self) -> bool {
        self.niece[0].is_none() && self.niece[1].is_none()
    }

    /// Drops both nieces, keeping our own data.
    pub fn chop(&mut self) {
        self.niece = [None, None];
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeArena<Hash: AccumulatorHash = BitcoinNodeHash> {
    nodes: SlotMap<DefaultKey, PolNode<Hash>>,
}

impl<Hash: AccumulatorHash> NodeArena<Hash> {
    pub fn new() -> Self {
        NodeArena {
            nodes: SlotMap::new(),
        }
    }

    pub fn insert(&mut self, node: PolNode<Hash>) -> NodeId {
        NodeId(self.nodes.insert(node))
    }

    pub fn get(&self, id: NodeId) -> Result<&PolNode<Hash>, Error> {
        self.nodes.get(id.0).ok_or(Error::MissingNode(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut PolNode<Hash>, Error> {
        self.nodes.get_mut(id.0).ok_or(Error::MissingNode(id))
    }

    /// Number of live nodes, including chopped ones not yet collected.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A node that isn't in the arena can't be an aunt.
    pub fn auntable(&self, id: NodeId) -> bool {
        self.get(id).map(PolNode::auntable).unwrap_or(false)
    }

    /// A node that isn't in the arena is a dead end.
    pub fn dead_end(&self, id: NodeId) -> bool {
        self.get(id).map(PolNode::dead_end).unwrap_or(true)
    }

    /// The hash this node stands for when authenticating its sibling: the parent of its
    /// nieces if it has both, its own data otherwise.
    pub fn aunt_op(&self, id: NodeId) -> Result<Hash, Error> {
        let node = self.get(id)?;
        match node.niece {
            [Some(left), Some(right)] => Ok(Hash::parent_hash(
                &self.get(left)?.data,
                &self.get(right)?.data,
            )),
            _ => Ok(node.data),
        }
    }

    pub fn chop(&mut self, id: NodeId) -> Result<(), Error> {
        self.get_mut(id)?.chop();
        Ok(())
    }

    /// Chops `id` if none of its nieces lead anywhere and none of them is remembered.
    /// Returns whether it chopped.
    pub fn prune(&mut self, id: NodeId) -> Result<bool, Error> {
        let node = self.get(id)?;
        if node.dead_end() {
            return Ok(false);
        }

        for niece in node.niece.iter().flatten() {
            let niece = self.get(*niece)?;
            if !niece.dead_end() || niece.remember {
                return Ok(false);
            }
        }

        self.chop(id)?;
        trace!(node = ?id, "pruned pollard node");
        Ok(true)
    }

    /// Same as [prune](NodeArena::prune), for the node holding a leaf that just got
    /// forgotten. The leaves chopped away are dropped from `tracked` as well.
    pub fn leaf_prune(
        &mut self,
        id: NodeId,
        tracked: &mut HashMap<Hash, NodeId>,
    ) -> Result<bool, Error> {
        let nieces = self.get(id)?.niece;
        if !self.prune(id)? {
            return Ok(false);
        }

        for niece in nieces.iter().flatten() {
            let hash = self.get(*niece)?.data;
            if tracked.get(&hash) == Some(niece) {
                tracked.remove(&hash);
            }
        }

        Ok(true)
    }

    /// Frees every node not reachable from `roots`. Returns how many were freed.
    pub fn collect_garbage(&mut self, roots: &[NodeId]) -> usize {
        let mut marked = HashSet::new();
        let mut stack: Vec<NodeId> = roots.to_vec();

        while let Some(id) = stack.pop() {
            let Ok(node) = self.get(id) else {
                continue;
            };
            if marked.insert(id) {
                stack.extend(node.niece.iter().flatten());
            }
        }

        let before = self.nodes.len();
        self.nodes.retain(|key, _| marked.contains(&NodeId(key)));
        let freed = before - self.nodes.len();

        trace!(freed, live = self.nodes.len(), "collected pollard garbage");
        freed
    }
}
