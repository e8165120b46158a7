//! A [Forest] holds every node of the accumulator in one flat vector, addressed by position
//! (see [util](super::util) for the numbering). It's what a bridge node keeps: it can prove any
//! leaf, and it keeps enough bookkeeping to roll a block back when a reorg happens.
//!
//! Leaves are always packed in `[0, num_leaves)`. The forest is a sequence of perfect trees,
//! tallest first, one for each bit set in `num_leaves`. Additions append a leaf and hash it up
//! with the roots of the same height, deletions re-stack the tree that held the leaf (see
//! [transform](super::transform)).
//! # Example
//! ```
//! use utreexo_forest::accumulator::forest::Forest;
//! use utreexo_forest::accumulator::leaf::Leaf;
//! use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//!
//! let leaves: Vec<Leaf> = (0..4u8)
//!     .map(|i| BitcoinNodeHash::new([i + 1; 32]).into())
//!     .collect();
//!
//! let mut forest = Forest::new();
//! let undo = forest.modify(&leaves, &[]).unwrap();
//! assert_eq!(forest.get_tops().len(), 1);
//!
//! let wanted = BitcoinNodeHash::new([2; 32]);
//! let proof = forest.prove(&wanted).unwrap();
//! assert!(forest.verify(&proof, &[wanted]));
//!
//! forest.undo(undo).unwrap();
//! assert_eq!(forest.num_leaves(), 0);
//! ```
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;

use tracing::debug;
use tracing::trace;

use super::error::Error;
use super::leaf::Leaf;
use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;
use super::proof::BlockProof;
use super::transform;
use super::transform::DeletionPlan;
use super::transform::Subtree;
use super::undo::UndoBlock;
use super::util;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forest<Hash: AccumulatorHash = BitcoinNodeHash> {
    num_leaves: u64,
    /// Height of the perfect tree that addresses every position. Only grows, except when an
    /// undo puts back an older height.
    rows: u8,
    /// One slot per position, `2^(rows + 1) - 1` of them.
    data: Vec<Hash>,
    /// Where each leaf currently sits.
    position_map: HashMap<Hash, u64>,
}

impl Default for Forest {
    fn default() -> Self {
        Forest::new()
    }
}

impl Forest {
    /// Creates an empty forest that uses [BitcoinNodeHash].
    pub fn new() -> Self {
        Forest::new_with_hash()
    }
}

impl<Hash: AccumulatorHash> Forest<Hash> {
    /// Creates an empty forest for a custom hash type.
    pub fn new_with_hash() -> Self {
        Forest {
            num_leaves: 0,
            rows: 0,
            data: vec![Hash::empty(); util::forest_size(0)],
            position_map: HashMap::new(),
        }
    }

    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    pub fn forest_rows(&self) -> u8 {
        self.rows
    }

    /// The leaves, in position order.
    pub fn leaves(&self) -> &[Hash] {
        &self.data[..self.num_leaves as usize]
    }

    /// Where `hash` currently is, if it's a leaf of this forest.
    pub fn position(&self, hash: &Hash) -> Option<u64> {
        self.position_map.get(hash).copied()
    }

    /// Returns the root of each tree, tallest first.
    pub fn get_tops(&self) -> Vec<Hash> {
        util::trees(self.num_leaves)
            .map(|(_, rows)| {
                self.data[util::root_position(self.num_leaves, rows, self.rows) as usize]
            })
            .collect()
    }

    /// Appends leaves to the forest. Fails without touching the forest if any leaf is the
    /// empty hash, or is already in the forest.
    pub fn add(&mut self, leaves: &[Leaf<Hash>]) -> Result<(), Error> {
        self.check_adds(leaves, &[])?;
        for leaf in leaves {
            self.add_single(leaf.hash);
        }

        debug!(adds = leaves.len(), num_leaves = self.num_leaves, "added leaves");
        Ok(())
    }

    /// Deletes the leaves at `targets`. Positions are the ones before this call, the forest
    /// keeps track of where each one moves as the deletions are applied in order.
    pub fn remove(&mut self, targets: &[u64]) -> Result<(), Error> {
        self.check_targets(targets)?;
        self.remove_unchecked(targets);

        debug!(dels = targets.len(), num_leaves = self.num_leaves, "removed leaves");
        Ok(())
    }

    /// Applies a block: deletes `dels` first, then appends `adds`. The returned [UndoBlock]
    /// puts the forest back exactly as it was before this call. If this fails, the forest
    /// is unchanged.
    pub fn modify(&mut self, adds: &[Leaf<Hash>], dels: &[u64]) -> Result<UndoBlock<Hash>, Error> {
        let undo = self.build_undo_data(adds.len() as u64, dels)?;
        self.check_adds(adds, dels)?;

        self.remove_unchecked(dels);
        for leaf in adds {
            self.add_single(leaf.hash);
        }

        debug_assert_eq!(self.sanity(), Ok(()));
        debug!(
            adds = adds.len(),
            dels = dels.len(),
            num_leaves = self.num_leaves,
            rows = self.rows,
            "modified forest"
        );
        Ok(undo)
    }

    /// Records what a [modify](Forest::modify) with `num_adds` additions and these deletions
    /// would need to be undone. Must be called before the modification.
    pub fn build_undo_data(&self, num_adds: u64, dels: &[u64]) -> Result<UndoBlock<Hash>, Error> {
        self.check_targets(dels)?;

        Ok(UndoBlock {
            num_leaves: self.num_leaves,
            forest_rows: self.rows,
            hashes: dels.iter().map(|pos| self.data[*pos as usize]).collect(),
            positions: dels.to_vec(),
            num_adds,
        })
    }

    /// Reverts the modification `undo` was built for. It must be the last modification
    /// applied, otherwise this fails and the forest is left untouched.
    pub fn undo(&mut self, undo: UndoBlock<Hash>) -> Result<(), Error> {
        self.check_undo(&undo)?;

        for _ in 0..undo.num_adds {
            self.pop_leaf();
        }
        if self.rows != undo.forest_rows {
            self.migrate(undo.forest_rows);
        }

        // Deletions are replayed against the positions they had, then reversed last first.
        let plans = transform::plan_deletions(undo.num_leaves, &undo.positions);
        for (plan, hash) in plans.iter().zip(undo.hashes.iter()).rev() {
            self.undelete_single(plan, *hash);
        }

        debug_assert_eq!(self.sanity(), Ok(()));
        debug!(
            adds = undo.num_adds,
            dels = undo.hashes.len(),
            num_leaves = self.num_leaves,
            "undid modification"
        );
        Ok(())
    }

    /// Proves a single leaf. The proof is the sibling of each node on the way from the leaf
    /// to its root.
    pub fn prove(&self, wanted: &Hash) -> Result<BlockProof<Hash>, Error> {
        let pos = self
            .position(wanted)
            .ok_or_else(|| Error::UnknownLeaf(wanted.to_string()))?;
        let (_, _, rows) = util::detect_tree(pos, self.num_leaves)
            .ok_or_else(|| Error::Sanity(format!("leaf {wanted} maps to empty position {pos}")))?;

        let mut proof = Vec::with_capacity(rows as usize);
        let mut node = pos;
        for _ in 0..rows {
            proof.push(self.data[(node ^ 1) as usize]);
            node = util::parent(node, self.rows);
        }
        debug_assert!(util::is_root_position(node, self.num_leaves, self.rows));

        Ok(BlockProof::new(vec![pos], proof))
    }

    /// One proof per wanted leaf.
    pub fn prove_many(&self, wanted: &[Hash]) -> Result<Vec<BlockProof<Hash>>, Error> {
        wanted.iter().map(|hash| self.prove(hash)).collect()
    }

    /// Proves all the leaves a block spends, in one proof. The targets are also the
    /// deletions to hand to [modify](Forest::modify).
    pub fn prove_block(&self, spent: &[Hash]) -> Result<BlockProof<Hash>, Error> {
        let mut block_proof = BlockProof::default();
        for hash in spent {
            block_proof.extend(self.prove(hash)?);
        }

        Ok(block_proof)
    }

    /// Checks that each of `del_hashes` is at its target in the current forest. Stale,
    /// forged or malformed proofs return false.
    pub fn verify(&self, proof: &BlockProof<Hash>, del_hashes: &[Hash]) -> bool {
        let Some(roots) = proof.calculate_roots(del_hashes, self.num_leaves) else {
            return false;
        };

        let tops = self.get_tops();
        for (tree, root) in roots {
            if tops.get(tree) != Some(&root) {
                debug!(tree, "proof doesn't hash up to the tree's root");
                return false;
            }
        }

        true
    }

    /// Verifies several proofs, consuming `del_hashes` proof by proof. Every hash must be
    /// used.
    pub fn verify_many(&self, proofs: &[BlockProof<Hash>], del_hashes: &[Hash]) -> bool {
        let mut remaining = del_hashes;
        for proof in proofs {
            if remaining.len() < proof.n_targets() {
                debug!(
                    targets = proof.n_targets(),
                    hashes = remaining.len(),
                    "not enough leaf hashes for proof"
                );
                return false;
            }

            let (hashes, rest) = remaining.split_at(proof.n_targets());
            if !self.verify(proof, hashes) {
                return false;
            }
            remaining = rest;
        }

        if !remaining.is_empty() {
            debug!(unused = remaining.len(), "leaf hashes left over after every proof");
            return false;
        }

        true
    }

    /// Like [verify](Forest::verify), but a block can't spend the same leaf twice.
    pub fn verify_block_proof(&self, proof: &BlockProof<Hash>, del_hashes: &[Hash]) -> bool {
        let mut seen = HashSet::new();
        if let Some(target) = proof.targets.iter().find(|target| !seen.insert(**target)) {
            debug!(position = *target, "block proof targets a leaf twice");
            return false;
        }

        self.verify(proof, del_hashes)
    }

    /// Gives back the memory the position map kept for spent leaves.
    ///
    /// Deletions and undo already empty the slots they vacate, and `data` is always exactly
    /// [forest_size](util::forest_size) long, so only the map has anything to give back.
    pub fn cleanup(&mut self) {
        let before = self.position_map.capacity();
        self.position_map.shrink_to_fit();
        trace!(
            before,
            after = self.position_map.capacity(),
            "shrunk position map"
        );
    }

    /// Checks the whole forest: every node commits to its children, vacant slots are
    /// empty, and the position map agrees with the leaves.
    pub fn sanity(&self) -> Result<(), Error> {
        if self.num_leaves > 1 << self.rows {
            return Err(Error::Sanity(format!(
                "{} leaves don't fit in {} rows",
                self.num_leaves, self.rows
            )));
        }
        if self.data.len() != util::forest_size(self.rows) {
            return Err(Error::Sanity(format!(
                "{} slots for a forest of {} rows",
                self.data.len(),
                self.rows
            )));
        }

        for pos in 0..self.data.len() as u64 {
            let hash = &self.data[pos as usize];
            let in_forest = util::in_forest(pos, self.num_leaves, self.rows);
            if in_forest == hash.is_empty() {
                let state = if in_forest { "in the forest" } else { "vacant" };
                return Err(Error::Sanity(format!("position {pos} is {state} but holds {hash}")));
            }

            if in_forest && util::detect_row(pos, self.rows) > 0 {
                let left = util::left_child(pos, self.rows);
                let expected = Hash::parent_hash(
                    &self.data[left as usize],
                    &self.data[(left | 1) as usize],
                );
                if expected != *hash {
                    return Err(Error::Sanity(format!(
                        "position {pos} doesn't commit to its children"
                    )));
                }
            }
        }

        self.pos_map_sanity()
    }

    /// Checks that the position map holds exactly the leaves, each at its position.
    pub fn pos_map_sanity(&self) -> Result<(), Error> {
        if self.position_map.len() as u64 != self.num_leaves {
            return Err(Error::Sanity(format!(
                "{} leaves but {} entries in the position map",
                self.num_leaves,
                self.position_map.len()
            )));
        }

        for (hash, pos) in self.position_map.iter() {
            if *pos >= self.num_leaves || self.data[*pos as usize] != *hash {
                return Err(Error::Sanity(format!("leaf {hash} maps to position {pos}")));
            }
        }

        Ok(())
    }

    /// A one line summary of the forest's size.
    pub fn stats(&self) -> String {
        let occupied = self.data.iter().filter(|hash| !hash.is_empty()).count();
        format!(
            "numleaves: {} forest rows: {} slots: {} occupied: {} tops: {}",
            self.num_leaves,
            self.rows,
            self.data.len(),
            occupied,
            util::num_roots(self.num_leaves)
        )
    }

    fn check_targets(&self, targets: &[u64]) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for target in targets {
            if *target >= self.num_leaves {
                return Err(Error::InvalidTarget(*target));
            }
            if !seen.insert(*target) {
                return Err(Error::DuplicateTarget(*target));
            }
        }

        Ok(())
    }

    /// Leaves being deleted in the same block may be added back.
    fn check_adds(&self, leaves: &[Leaf<Hash>], dels: &[u64]) -> Result<(), Error> {
        let deleted: HashSet<Hash> = dels.iter().map(|pos| self.data[*pos as usize]).collect();
        let mut seen = HashSet::new();

        for leaf in leaves {
            if leaf.hash.is_empty() {
                return Err(Error::EmptyLeaf);
            }
            let in_forest =
                self.position_map.contains_key(&leaf.hash) && !deleted.contains(&leaf.hash);
            if in_forest || !seen.insert(leaf.hash) {
                return Err(Error::DuplicateLeaf(leaf.hash.to_string()));
            }
        }

        Ok(())
    }

    fn check_undo(&self, undo: &UndoBlock<Hash>) -> Result<(), Error> {
        if undo.hashes.len() != undo.positions.len() {
            return Err(Error::UndoMismatch(format!(
                "{} deleted leaves but {} positions",
                undo.hashes.len(),
                undo.positions.len()
            )));
        }
        if undo.leaves_after() != Some(self.num_leaves) {
            return Err(Error::UndoMismatch(format!(
                "forest has {} leaves, the undo data expects {:?}",
                self.num_leaves,
                undo.leaves_after()
            )));
        }
        if undo.forest_rows > self.rows || undo.num_leaves > 1 << undo.forest_rows {
            return Err(Error::UndoMismatch(format!(
                "{} leaves in {} rows can't come before a forest of {} rows",
                undo.num_leaves, undo.forest_rows, self.rows
            )));
        }

        let mut seen = HashSet::new();
        for pos in undo.positions.iter() {
            if *pos >= undo.num_leaves || !seen.insert(*pos) {
                return Err(Error::UndoMismatch(format!("bad deleted position {pos}")));
            }
        }

        // A deleted leaf can only be in the forest if the same block added it back.
        let added = undo.added_positions();
        let mut seen = HashSet::new();
        for hash in undo.hashes.iter() {
            let readded = match self.position(hash) {
                Some(pos) => added.contains(&pos),
                None => true,
            };
            if hash.is_empty() || !readded || !seen.insert(*hash) {
                return Err(Error::UndoMismatch(format!("can't restore leaf {hash}")));
            }
        }

        Ok(())
    }

    fn remove_unchecked(&mut self, targets: &[u64]) {
        for plan in transform::plan_deletions(self.num_leaves, targets) {
            self.delete_single(&plan);
        }
    }

    fn add_single(&mut self, hash: Hash) {
        if self.num_leaves == 1 << self.rows {
            self.remap(self.rows + 1);
        }

        let mut pos = self.num_leaves;
        self.data[pos as usize] = hash;
        self.position_map.insert(hash, pos);

        // Hash up with every root of the same height, like a binary counter carrying.
        let mut row = 0;
        while (self.num_leaves >> row) & 1 == 1 {
            let left = self.data[(pos ^ 1) as usize];
            let right = self.data[pos as usize];
            pos = util::parent(pos, self.rows);
            self.data[pos as usize] = Hash::parent_hash(&left, &right);
            row += 1;
        }

        self.num_leaves += 1;
    }

    /// Takes back the last leaf added, and every node above it that only it completed.
    fn pop_leaf(&mut self) {
        let pos = self.num_leaves - 1;
        let hash = self.data[pos as usize];

        for rise in 0..=self.num_leaves.trailing_zeros() as u8 {
            self.data[util::parent_many(pos, rise, self.rows) as usize] = Hash::empty();
        }

        self.position_map.remove(&hash);
        self.num_leaves -= 1;
    }

    fn delete_single(&mut self, plan: &DeletionPlan) {
        let pieces: Vec<Subtree<Hash>> = plan
            .moves
            .iter()
            .map(|arrow| self.read_subtree(arrow.from, arrow.rows))
            .collect();
        let deleted = self.data[plan.target as usize];
        self.clear_trees_from(plan.start);

        // Heights only ever go down along the moves, so merging equal heights on a stack
        // leaves perfect trees, tallest first.
        let mut stack: Vec<Subtree<Hash>> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let mut tree = piece;
            while stack.last().map(|top| top.height()) == Some(tree.height()) {
                let Some(left) = stack.pop() else {
                    break;
                };
                tree = Subtree::merge(left, tree);
            }
            stack.push(tree);
        }

        let mut start = plan.start;
        for tree in stack.iter() {
            self.write_subtree(start, tree);
            start += tree.num_leaves();
        }

        self.position_map.remove(&deleted);
        self.num_leaves -= 1;
        trace!(
            position = plan.target,
            moves = plan.moves.len(),
            "deleted leaf"
        );
    }

    /// Plays `plan` backwards, putting `hash` back at the plan's target.
    fn undelete_single(&mut self, plan: &DeletionPlan, hash: Hash) {
        let pieces: Vec<Subtree<Hash>> = plan
            .moves
            .iter()
            .map(|arrow| self.read_subtree(arrow.to, arrow.rows))
            .collect();
        self.clear_trees_from(plan.start);

        let mut siblings = Vec::new();
        let mut shifted = Vec::new();
        for (arrow, piece) in plan.moves.iter().zip(pieces) {
            if plan.is_sibling(arrow) {
                siblings.push((arrow.rows, piece));
            } else {
                shifted.push((arrow.from, piece));
            }
        }

        // Siblings were taken tallest first, rebuild the tree from the leaf up.
        let mut tree = Subtree::leaf(hash);
        for (row, sibling) in siblings.into_iter().rev() {
            tree = if plan.target_is_left(row) {
                Subtree::merge(tree, sibling)
            } else {
                Subtree::merge(sibling, tree)
            };
        }

        self.write_subtree(plan.start, &tree);
        for (from, piece) in shifted.iter() {
            self.write_subtree(*from, piece);
        }

        self.num_leaves = plan.num_leaves;
        trace!(position = plan.target, "restored leaf");
    }

    fn node_position(&self, start: u64, row: u8) -> usize {
        (util::start_position_at_row(row, self.rows) + (start >> row)) as usize
    }

    fn read_subtree(&self, start: u64, rows: u8) -> Subtree<Hash> {
        let hashes = (0..=rows)
            .map(|row| {
                let first = self.node_position(start, row);
                self.data[first..first + (1 << (rows - row))].to_vec()
            })
            .collect();

        Subtree::from_rows(hashes)
    }

    fn write_subtree(&mut self, start: u64, tree: &Subtree<Hash>) {
        for row in 0..=tree.height() {
            let first = self.node_position(start, row);
            let hashes = tree.row(row);
            self.data[first..first + hashes.len()].copy_from_slice(hashes);
        }

        for (offset, leaf) in tree.leaves().iter().enumerate() {
            self.position_map.insert(*leaf, start + offset as u64);
        }
    }

    fn clear_subtree(&mut self, start: u64, rows: u8) {
        for row in 0..=rows {
            let first = self.node_position(start, row);
            self.data[first..first + (1 << (rows - row))].fill(Hash::empty());
        }
    }

    /// Empties every tree starting at or after `start`.
    fn clear_trees_from(&mut self, start: u64) {
        let trees: Vec<(u64, u8)> = util::trees(self.num_leaves)
            .filter(|(tree_start, _)| *tree_start >= start)
            .collect();
        for (tree_start, rows) in trees {
            self.clear_subtree(tree_start, rows);
        }
    }

    fn remap(&mut self, dest_rows: u8) {
        if dest_rows <= self.rows {
            return;
        }
        self.migrate(dest_rows);
    }

    /// Moves every row to where it starts in a forest of `dest_rows` rows. Leaves keep their
    /// positions. Shrinking is only possible if the leaves fit.
    fn migrate(&mut self, dest_rows: u8) {
        debug_assert!(self.num_leaves <= 1 << dest_rows);

        let kept_rows = self.rows.min(dest_rows);
        let mut data = vec![Hash::empty(); util::forest_size(dest_rows)];
        for row in 0..=kept_rows {
            let from = util::start_position_at_row(row, self.rows) as usize;
            let to = util::start_position_at_row(row, dest_rows) as usize;
            let len = 1usize << (kept_rows - row);
            data[to..to + len].copy_from_slice(&self.data[from..from + len]);
        }

        trace!(
            from = self.rows,
            to = dest_rows,
            num_leaves = self.num_leaves,
            "remapped forest"
        );
        self.data = data;
        self.rows = dest_rows;
    }
}

impl<Hash: AccumulatorHash> Display for Forest<Hash> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.rows > 6 {
            return write!(f, "forest too big to print: {}", self.stats());
        }

        for row in (0..=self.rows).rev() {
            let first = util::start_position_at_row(row, self.rows);
            let width: usize = 5 << row;
            for pos in first..first + (1 << (self.rows - row)) {
                let hash = &self.data[pos as usize];
                let label = if hash.is_empty() {
                    "--".to_string()
                } else {
                    hash.to_string().chars().take(4).collect()
                };
                write!(f, "{label:<width$}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rand::SeedableRng;
    use serde::Deserialize;

    use super::Forest;
    use crate::accumulator::error::Error;
    use crate::accumulator::leaf::Leaf;
    use crate::accumulator::node_hash::AccumulatorHash;
    use crate::accumulator::node_hash::BitcoinNodeHash;
    use crate::accumulator::proof::BlockProof;
    use crate::accumulator::undo::UndoBlock;
    use crate::accumulator::util::hash_from_u8;

    fn leaves_from(values: impl IntoIterator<Item = u8>) -> Vec<Leaf> {
        values.into_iter().map(|i| hash_from_u8(i).into()).collect()
    }

    fn forest_with(num_leaves: u8) -> Forest {
        let mut forest = Forest::new();
        forest.add(&leaves_from(0..num_leaves)).unwrap();
        forest
    }

    #[derive(Debug, Deserialize)]
    struct InsertionCase {
        leaf_values: Vec<u8>,
        forest_rows: u8,
        roots: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct DeletionCase {
        leaf_values: Vec<u8>,
        targets: Vec<u64>,
        forest_rows: u8,
        roots: Vec<String>,
        leaves_after: Vec<u8>,
    }

    #[derive(Debug, Deserialize)]
    struct TestCases {
        insertion_tests: Vec<InsertionCase>,
        deletion_tests: Vec<DeletionCase>,
    }

    fn parse_roots(roots: &[String]) -> Vec<BitcoinNodeHash> {
        roots
            .iter()
            .map(|root| BitcoinNodeHash::from_str(root).unwrap())
            .collect()
    }

    fn run_insertion_case(case: &InsertionCase) {
        let mut forest = Forest::new();
        forest
            .add(&leaves_from(case.leaf_values.iter().copied()))
            .unwrap();

        assert_eq!(forest.forest_rows(), case.forest_rows);
        assert_eq!(forest.get_tops(), parse_roots(&case.roots));
        forest.sanity().unwrap();
    }

    fn run_deletion_case(case: &DeletionCase) {
        let mut forest = Forest::new();
        forest
            .add(&leaves_from(case.leaf_values.iter().copied()))
            .unwrap();
        let before = forest.clone();

        let undo = forest.modify(&[], &case.targets).unwrap();
        let expected_leaves: Vec<_> = case.leaves_after.iter().map(|i| hash_from_u8(*i)).collect();

        assert_eq!(forest.forest_rows(), case.forest_rows);
        assert_eq!(forest.get_tops(), parse_roots(&case.roots));
        assert_eq!(forest.leaves(), expected_leaves.as_slice());
        forest.sanity().unwrap();

        forest.undo(undo).unwrap();
        assert_eq!(forest, before);
    }

    #[test]
    fn run_test_cases() {
        let contents = std::fs::read_to_string("test_values/forest_cases.json")
            .expect("Something went wrong reading the file");
        let cases: TestCases =
            serde_json::from_str(contents.as_str()).expect("JSON deserialization error");

        for case in cases.insertion_tests.iter() {
            run_insertion_case(case);
        }
        for case in cases.deletion_tests.iter() {
            run_deletion_case(case);
        }
    }

    #[test]
    fn test_add() {
        // 06
        // |-------\
        // 04      05
        // |---\   |---\
        // 00  01  02  03
        let forest = forest_with(4);
        let expected_root = BitcoinNodeHash::from_str(
            "df46b17be5f66f0750a4b3efa26d4679db170a72d41eb56c3e4ff75a58c65386",
        )
        .unwrap();

        assert_eq!(forest.num_leaves(), 4);
        assert_eq!(forest.forest_rows(), 2);
        assert_eq!(forest.get_tops(), vec![expected_root]);
        assert_eq!(forest.position(&hash_from_u8(2)), Some(2));
        forest.sanity().unwrap();
    }
    #[test]
    fn test_add_grows_forest() {
        let mut forest = forest_with(4);
        forest.add(&leaves_from([4])).unwrap();

        assert_eq!(forest.forest_rows(), 3);
        assert_eq!(forest.get_tops().len(), 2);
        assert_eq!(forest.get_tops()[1], hash_from_u8(4));
        forest.sanity().unwrap();
    }
    #[test]
    fn test_add_rejects_bad_leaves() {
        let mut forest = forest_with(2);
        let before = forest.clone();

        assert_eq!(
            forest.add(&leaves_from([1])),
            Err(Error::DuplicateLeaf(hash_from_u8(1).to_string()))
        );
        assert_eq!(
            forest.add(&leaves_from([5, 5])),
            Err(Error::DuplicateLeaf(hash_from_u8(5).to_string()))
        );
        assert_eq!(
            forest.add(&[BitcoinNodeHash::empty().into()]),
            Err(Error::EmptyLeaf)
        );
        assert_eq!(forest, before);
    }
    #[test]
    fn test_delete_promotes_sibling() {
        // Deleting 01 promotes 00 to a root, and the subtree over 02 and 03 moves left.
        // 06                            06
        // |-------\                     |-------\
        // 04      05          =>        04      05
        // |---\   |---\                 |---\   |---\
        // 00  01  02  03                02  03  00
        let mut forest = forest_with(4);
        forest.remove(&[1]).unwrap();

        assert_eq!(forest.num_leaves(), 3);
        assert_eq!(forest.forest_rows(), 2);
        assert_eq!(
            forest.leaves(),
            &[hash_from_u8(2), hash_from_u8(3), hash_from_u8(0)]
        );
        assert_eq!(
            forest.get_tops(),
            vec![
                BitcoinNodeHash::parent_hash(&hash_from_u8(2), &hash_from_u8(3)),
                hash_from_u8(0)
            ]
        );
        assert_eq!(forest.position(&hash_from_u8(0)), Some(2));
        assert_eq!(forest.position(&hash_from_u8(1)), None);
        forest.sanity().unwrap();
    }
    #[test]
    fn test_delete_and_undo_restores_proofs() {
        let mut forest = forest_with(4);
        let top = forest.get_tops();
        let (l0, l1) = (hash_from_u8(0), hash_from_u8(1));

        let undo = forest.modify(&[], &[1]).unwrap();
        let proof = forest.prove(&l0).unwrap();
        assert!(forest.verify(&proof, &[l0]));
        assert_eq!(
            forest.prove(&l1),
            Err(Error::UnknownLeaf(l1.to_string()))
        );

        forest.undo(undo).unwrap();
        assert_eq!(forest.get_tops(), top);
        let proof = forest.prove(&l1).unwrap();
        assert_eq!(proof.targets, vec![1]);
        assert!(forest.verify(&proof, &[l1]));
    }
    #[test]
    fn test_delete_everything() {
        let mut forest = forest_with(8);
        forest.remove(&(0..8).collect::<Vec<_>>()).unwrap();

        assert_eq!(forest.num_leaves(), 0);
        assert!(forest.get_tops().is_empty());
        // The forest never shrinks on deletion
        assert_eq!(forest.forest_rows(), 3);
        forest.sanity().unwrap();
    }
    #[test]
    fn test_remove_rejects_bad_targets() {
        let mut forest = forest_with(4);
        let before = forest.clone();

        assert_eq!(forest.remove(&[4]), Err(Error::InvalidTarget(4)));
        assert_eq!(forest.remove(&[1, 1]), Err(Error::DuplicateTarget(1)));
        assert_eq!(
            forest.modify(&leaves_from([9]), &[0, 7]),
            Err(Error::InvalidTarget(7))
        );
        assert_eq!(forest, before);
    }
    #[test]
    fn test_modify_and_undo() {
        // Four leaves, spend two and create one, then roll back.
        let mut forest = forest_with(4);
        let before = forest.clone();

        let undo = forest.modify(&leaves_from([4]), &[0, 2]).unwrap();
        assert_eq!(forest.num_leaves(), 3);
        assert_eq!(undo.num_leaves(), 4);
        assert_eq!(undo.num_adds(), 1);
        assert_eq!(
            undo.deleted().collect::<Vec<_>>(),
            vec![(0, &hash_from_u8(0)), (2, &hash_from_u8(2))]
        );
        assert!(forest.position(&hash_from_u8(4)).is_some());

        forest.undo(undo).unwrap();
        assert_eq!(forest, before);
    }
    #[test]
    fn test_undo_shrinks_back() {
        // Adding to a full forest grows it, undoing must put the old height back.
        let mut forest = forest_with(4);
        let before = forest.clone();

        let undo = forest.modify(&leaves_from(4..9), &[3]).unwrap();
        assert_eq!(forest.forest_rows(), 3);

        forest.undo(undo).unwrap();
        assert_eq!(forest.forest_rows(), 2);
        assert_eq!(forest, before);
    }
    #[test]
    fn test_undo_readded_leaf() {
        // Spending a leaf and creating it again in the same block.
        let mut forest = forest_with(5);
        let before = forest.clone();

        let undo = forest.modify(&leaves_from([1]), &[1]).unwrap();
        assert_eq!(forest.num_leaves(), 5);
        assert_eq!(forest.position(&hash_from_u8(1)), Some(4));

        forest.undo(undo).unwrap();
        assert_eq!(forest, before);
    }
    #[test]
    fn test_undo_rejects_wrong_height() {
        // Taller than the forest it would roll back to
        let mut forest = forest_with(4);
        let before = forest.clone();
        let undo = UndoBlock {
            num_leaves: 4,
            forest_rows: 3,
            hashes: vec![],
            positions: vec![],
            num_adds: 0,
        };
        assert!(matches!(forest.undo(undo), Err(Error::UndoMismatch(_))));
        assert_eq!(forest, before);

        // Too short to hold its own leaves
        let mut forest = forest_with(5);
        let before = forest.clone();
        let undo = UndoBlock {
            num_leaves: 5,
            forest_rows: 2,
            hashes: vec![],
            positions: vec![],
            num_adds: 0,
        };
        assert!(matches!(forest.undo(undo), Err(Error::UndoMismatch(_))));
        assert_eq!(forest, before);
    }
    #[test]
    fn test_undo_out_of_order() {
        let mut forest = forest_with(6);
        let first = forest.modify(&leaves_from([6, 7]), &[0]).unwrap();
        let _second = forest.modify(&leaves_from([8]), &[]).unwrap();
        let before = forest.clone();

        // The first block can't be undone before the second one
        assert!(matches!(forest.undo(first), Err(Error::UndoMismatch(_))));
        assert_eq!(forest, before);
    }
    #[test]
    fn test_prove_and_verify() {
        let forest = forest_with(8);
        let proof = forest.prove(&hash_from_u8(0)).unwrap();

        let expected: Vec<BitcoinNodeHash> = [
            "4bf5122f344554c53bde2ebb8cd2b7e3d1600ad631c385a5d7cce23c7785459a",
            "9576f4ade6e9bc3a6458b506ce3e4e890df29cb14cb5d3d887672aef55647a2b",
            "29590a14c1b09384b94a2c0e94bf821ca75b62eacebc47893397ca88e3bbcbd7",
        ]
        .iter()
        .map(|hash| BitcoinNodeHash::from_str(hash).unwrap())
        .collect();
        assert_eq!(proof, BlockProof::new(vec![0], expected));
        assert!(forest.verify(&proof, &[hash_from_u8(0)]));

        // Right target, wrong leaf
        assert!(!forest.verify(&proof, &[hash_from_u8(1)]));
        // Tampered proof
        let mut forged = proof.clone();
        forged.proof[1] = hash_from_u8(42);
        assert!(!forest.verify(&forged, &[hash_from_u8(0)]));

        assert_eq!(
            forest.prove(&hash_from_u8(100)),
            Err(Error::UnknownLeaf(hash_from_u8(100).to_string()))
        );
    }
    #[test]
    fn test_proof_goes_stale() {
        let mut forest = forest_with(4);
        let proof = forest.prove(&hash_from_u8(0)).unwrap();

        forest.remove(&[1]).unwrap();
        // 00 moved to position 2 and is a root now
        assert!(!forest.verify(&proof, &[hash_from_u8(0)]));
        let proof = forest.prove(&hash_from_u8(0)).unwrap();
        assert_eq!(proof.targets, vec![2]);
        assert!(proof.proof.is_empty());
        assert!(forest.verify(&proof, &[hash_from_u8(0)]));

        // A deleted leaf can't be verified with its old position
        let stale = BlockProof::new(vec![1], vec![hash_from_u8(0), hash_from_u8(42)]);
        assert!(!forest.verify(&stale, &[hash_from_u8(1)]));
    }
    #[test]
    fn test_prove_block() {
        let forest = forest_with(7);
        let spent = [hash_from_u8(6), hash_from_u8(1), hash_from_u8(4)];

        let block_proof = forest.prove_block(&spent).unwrap();
        assert_eq!(block_proof.targets, vec![6, 1, 4]);
        assert!(forest.verify(&block_proof, &spent));
        assert!(forest.verify_block_proof(&block_proof, &spent));

        let proofs = forest.prove_many(&spent).unwrap();
        assert_eq!(proofs.len(), 3);
        assert!(forest.verify_many(&proofs, &spent));
        assert!(!forest.verify_many(&proofs, &spent[..2]));
        assert!(!forest.verify_many(&proofs[..2], &spent));

        // The same leaf can't be spent twice in a block
        let mut twice = forest.prove(&hash_from_u8(1)).unwrap();
        twice.extend(forest.prove(&hash_from_u8(1)).unwrap());
        let twice_hashes = [hash_from_u8(1), hash_from_u8(1)];
        assert!(forest.verify(&twice, &twice_hashes));
        assert!(!forest.verify_block_proof(&twice, &twice_hashes));
    }
    #[test]
    fn test_spend_with_block_proof() {
        let mut forest = forest_with(13);
        let spent = [hash_from_u8(12), hash_from_u8(3), hash_from_u8(7)];
        let block_proof = forest.prove_block(&spent).unwrap();
        assert!(forest.verify_block_proof(&block_proof, &spent));

        forest.modify(&[], &block_proof.targets).unwrap();
        assert_eq!(forest.num_leaves(), 10);
        for hash in spent.iter() {
            assert_eq!(forest.position(hash), None);
        }
        for i in [0, 1, 2, 4, 5, 6, 8, 9, 10, 11] {
            let proof = forest.prove(&hash_from_u8(i)).unwrap();
            assert!(forest.verify(&proof, &[hash_from_u8(i)]));
        }
    }
    #[test]
    fn test_cleanup() {
        let mut forest = forest_with(100);
        forest.remove(&(0..90).collect::<Vec<_>>()).unwrap();
        let tops = forest.get_tops();
        let data = forest.data.clone();
        let capacity = forest.position_map.capacity();

        forest.cleanup();
        assert!(forest.position_map.capacity() < capacity);
        assert_eq!(forest.data, data);
        assert_eq!(forest.get_tops(), tops);
        forest.sanity().unwrap();
        assert!(forest.stats().starts_with("numleaves: 10 forest rows: 7"));
    }
    #[test]
    fn test_sanity_catches_corruption() {
        let mut forest = forest_with(4);
        forest.data[5] = hash_from_u8(9);
        assert!(matches!(forest.sanity(), Err(Error::Sanity(_))));

        let mut forest = forest_with(4);
        forest.position_map.insert(hash_from_u8(1), 3);
        assert!(matches!(forest.pos_map_sanity(), Err(Error::Sanity(_))));
    }
    #[test]
    fn test_display() {
        let forest = forest_with(3);
        let printed = forest.to_string();

        assert_eq!(printed.lines().count(), 3);
        assert!(printed.lines().last().unwrap().starts_with("6e34"));
        assert!(printed.contains("--"));
    }
    #[test]
    fn test_random_blocks_and_reorgs() {
        let mut rng = StdRng::seed_from_u64(0x7574_7265_6578_6f);
        let mut forest = Forest::new();
        let mut history = Vec::new();
        let mut snapshots = Vec::new();
        let mut next_leaf = 0u32;

        for _ in 0..60 {
            let num_adds = rng.gen_range(0..12);
            let adds: Vec<Leaf> = (0..num_adds)
                .map(|_| {
                    next_leaf += 1;
                    let mut hash = [0u8; 32];
                    hash[..4].copy_from_slice(&next_leaf.to_le_bytes());
                    BitcoinNodeHash::new(hash).into()
                })
                .collect();

            let mut positions: Vec<u64> = (0..forest.num_leaves()).collect();
            positions.shuffle(&mut rng);
            let num_dels = rng.gen_range(0..=positions.len().min(8));
            let dels = &positions[..num_dels];

            let spent: Vec<_> = dels.iter().map(|pos| forest.leaves()[*pos as usize]).collect();
            let block_proof = forest.prove_block(&spent).unwrap();
            assert!(forest.verify_block_proof(&block_proof, &spent));
            assert_eq!(block_proof.targets, dels);

            let rows = forest.forest_rows();
            snapshots.push(forest.clone());
            history.push(forest.modify(&adds, dels).unwrap());
            forest.sanity().unwrap();
            assert!(forest.forest_rows() >= rows);
            assert_eq!(
                forest.get_tops().len(),
                forest.num_leaves().count_ones() as usize
            );

            // Every now and then, reorg a couple of blocks out.
            if rng.gen_bool(0.2) {
                for _ in 0..rng.gen_range(1..=2usize.min(history.len())) {
                    let undo = history.pop().unwrap();
                    forest.undo(undo).unwrap();
                    assert_eq!(forest, snapshots.pop().unwrap());
                    assert_eq!(
                        forest.get_tops().len(),
                        forest.num_leaves().count_ones() as usize
                    );
                }
            }
        }

        while let Some(undo) = history.pop() {
            forest.undo(undo).unwrap();
            assert_eq!(forest, snapshots.pop().unwrap());
        }
        assert_eq!(forest, Forest::new());
    }
}
