//! [UndoBlock] is what the forest needs to reverse one call to
//! [Forest::modify](super::forest::Forest::modify), in case the block that caused it gets
//! reorged out.
use std::ops::Range;

#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;

use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct UndoBlock<Hash: AccumulatorHash = BitcoinNodeHash> {
    /// Leaves in the forest before the modification.
    pub(crate) num_leaves: u64,
    /// Rows of the forest before the modification. Additions may have grown it.
    pub(crate) forest_rows: u8,
    /// The deleted leaves, in the order they were deleted.
    pub(crate) hashes: Vec<Hash>,
    /// Where each deleted leaf was before the modification.
    pub(crate) positions: Vec<u64>,
    /// How many leaves were appended after the deletions.
    pub(crate) num_adds: u64,
}

impl<Hash: AccumulatorHash> UndoBlock<Hash> {
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    pub fn forest_rows(&self) -> u8 {
        self.forest_rows
    }

    pub fn num_adds(&self) -> u64 {
        self.num_adds
    }

    /// The deleted leaves along with the positions they had.
    pub fn deleted(&self) -> impl Iterator<Item = (u64, &Hash)> {
        self.positions.iter().copied().zip(self.hashes.iter())
    }

    /// Positions the added leaves took.
    pub fn added_positions(&self) -> Range<u64> {
        let first = self.num_leaves.saturating_sub(self.hashes.len() as u64);
        first..first + self.num_adds
    }

    /// Leaves the forest should have right after the modification this undoes.
    pub(crate) fn leaves_after(&self) -> Option<u64> {
        self.num_leaves
            .checked_sub(self.hashes.len() as u64)?
            .checked_add(self.num_adds)
    }
}
