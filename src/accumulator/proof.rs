//! A [BlockProof] proves that some leaves are in the forest. It's also what tells the forest
//! which leaves to delete, since the only time you prove an element is when it's being spent.
#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;
use tracing::debug;

use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;
use super::util;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct BlockProof<Hash: AccumulatorHash = BitcoinNodeHash> {
    /// Targets are the positions of the leaves being proven, in the order they were asked for.
    /// With the tree below, the targets can only be some of 00, 01, 02 and 03.
    ///```!
    ///  // 06
    ///  // |-------\
    ///  // 04      05
    ///  // |---\   |---\
    ///  // 00  01  02  03
    /// ```
    pub targets: Vec<u64>,

    /// The sibling hashes needed to hash each target up to its root, innermost sibling first.
    /// Hashes for each target are laid out one after the other, in `targets` order. If the
    /// target above is 00, the proof is [01, 05]. 04 and 06 are computed from them.
    pub proof: Vec<Hash>,
}

impl<Hash: AccumulatorHash> BlockProof<Hash> {
    /// Creates a proof from a vector of targets and hashes.
    /// # Example
    /// ```
    /// use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
    /// use utreexo_forest::accumulator::proof::BlockProof;
    /// // Proving 00 in a four leaf tree takes 01 and 05.
    /// let proof = BlockProof::new(
    ///     vec![0],
    ///     vec![BitcoinNodeHash::new([1; 32]), BitcoinNodeHash::new([5; 32])],
    /// );
    /// assert_eq!(proof.n_targets(), 1);
    /// ```
    pub fn new(targets: Vec<u64>, proof: Vec<Hash>) -> Self {
        BlockProof { targets, proof }
    }

    /// Returns how many targets this proof has
    pub fn n_targets(&self) -> usize {
        self.targets.len()
    }

    /// Appends another proof after this one. This is how a block proof is put together from
    /// single-leaf proofs.
    pub fn extend(&mut self, other: BlockProof<Hash>) {
        self.targets.extend(other.targets);
        self.proof.extend(other.proof);
    }

    /// Hashes each target up to its root, consuming the proof hashes target by target.
    /// Returns `(tree index, computed root)` for every target, tree indexes counting from the
    /// tallest tree. Returns None if the proof doesn't fit a forest of `num_leaves` leaves:
    /// a target past the last leaf, too few hashes, or hashes left over.
    pub(crate) fn calculate_roots(
        &self,
        leaf_hashes: &[Hash],
        num_leaves: u64,
    ) -> Option<Vec<(usize, Hash)>> {
        if leaf_hashes.len() != self.targets.len() {
            debug!(
                targets = self.targets.len(),
                hashes = leaf_hashes.len(),
                "every target needs exactly one leaf hash"
            );
            return None;
        }

        let mut hashes = self.proof.iter();
        let mut roots = Vec::with_capacity(self.targets.len());

        for (target, leaf) in self.targets.iter().zip(leaf_hashes) {
            let Some((tree, start, rows)) = util::detect_tree(*target, num_leaves) else {
                debug!(position = *target, num_leaves, "target is not a leaf of this forest");
                return None;
            };

            let offset = target - start;
            let mut hash = *leaf;
            for row in 0..rows {
                let Some(sibling) = hashes.next() else {
                    debug!(position = *target, row, "proof ran out of hashes");
                    return None;
                };
                hash = if util::is_left_niece(offset >> row) {
                    Hash::parent_hash(&hash, sibling)
                } else {
                    Hash::parent_hash(sibling, &hash)
                };
            }
            roots.push((tree, hash));
        }

        if hashes.next().is_some() {
            debug!("proof has more hashes than its targets need");
            return None;
        }

        Some(roots)
    }
}
