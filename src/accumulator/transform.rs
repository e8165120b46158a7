//! transform is how the forest re-organizes itself when a leaf is deleted, so that every tree
//! stays perfect and leaves stay packed at the left.
//!
//! Deleting a leaf shatters the tree holding it into the siblings along its path to the
//! root, one perfect subtree per row. Those, and the smaller trees to the right, are stacked
//! back from where the tree used to start, tallest first, merging equal heights just like
//! additions do. Here's leaf 01 being deleted from a four leaf forest:
//! ```!
//! // 06                            06
//! // |-------\                     |-------\
//! // 04      05          =>        04      05
//! // |---\   |---\                 |---\   |---\
//! // L0  L1  L2  L3                L2  L3  L0
//! ```
//! L0, the sibling, is promoted to a root and the subtree at 05 moves down to 04. A
//! [DeletionPlan] describes those moves as [Arrow]s between leaf offsets, which lets the forest
//! both apply a deletion and play it backwards on undo.

use super::node_hash::AccumulatorHash;
use super::util;

/// A perfect subtree of height `rows` moving from leaf offset `from` to leaf offset `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrow {
    pub from: u64,
    pub to: u64,
    pub rows: u8,
}

impl Arrow {
    fn covers(&self, pos: u64) -> bool {
        self.from <= pos && pos < self.from + (1 << self.rows)
    }
}

/// Everything that happens when the leaf at `target` is deleted from a forest of
/// `num_leaves` leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub num_leaves: u64,
    pub target: u64,
    /// First leaf of the tree holding `target`. Nothing left of it moves.
    pub start: u64,
    /// Height of the tree holding `target`.
    pub rows: u8,
    /// In stacking order: each sibling of the target's path, tallest first, followed by the
    /// smaller tree of the same height if there's one.
    pub moves: Vec<Arrow>,
}

impl DeletionPlan {
    pub fn new(num_leaves: u64, target: u64) -> DeletionPlan {
        debug_assert!(target < num_leaves);
        let trees: Vec<(u64, u8)> = util::trees(num_leaves).collect();
        let (start, rows) = trees
            .iter()
            .copied()
            .find(|(start, rows)| target < start + (1 << rows))
            .unwrap_or((target, 0));

        let offset = target - start;
        let mut moves = Vec::with_capacity(2 * rows as usize);
        let mut to = start;

        for row in (0..rows).rev() {
            let sibling = start + (((offset >> row) ^ 1) << row);
            moves.push(Arrow {
                from: sibling,
                to,
                rows: row,
            });
            to += 1 << row;

            let smaller = trees
                .iter()
                .find(|(tree_start, tree_rows)| *tree_start > start && *tree_rows == row);
            if let Some((tree_start, _)) = smaller {
                moves.push(Arrow {
                    from: *tree_start,
                    to,
                    rows: row,
                });
                to += 1 << row;
            }
        }

        DeletionPlan {
            num_leaves,
            target,
            start,
            rows,
            moves,
        }
    }

    /// Where the leaf now at `pos` goes after this deletion. Shouldn't be called for the
    /// target itself.
    pub fn moved(&self, pos: u64) -> u64 {
        self.moves
            .iter()
            .find(|arrow| arrow.covers(pos))
            .map(|arrow| pos - arrow.from + arrow.to)
            .unwrap_or(pos)
    }

    /// Whether this move carries a sibling of the target, rather than a smaller tree.
    pub fn is_sibling(&self, arrow: &Arrow) -> bool {
        arrow.from < self.start + (1 << self.rows)
    }

    /// Whether the deleted leaf sat left of its sibling on `row`.
    pub fn target_is_left(&self, row: u8) -> bool {
        util::is_left_niece((self.target - self.start) >> row)
    }
}

/// Builds the plan for each deletion of a batch. Targets are positions before any of the
/// batch is applied, so each one is followed through the moves of the deletions before it.
/// Targets must be distinct leaves of the forest.
pub fn plan_deletions(mut num_leaves: u64, targets: &[u64]) -> Vec<DeletionPlan> {
    let mut pending = targets.to_vec();
    let mut plans = Vec::with_capacity(targets.len());

    for i in 0..pending.len() {
        let plan = DeletionPlan::new(num_leaves, pending[i]);
        for pos in pending[i + 1..].iter_mut() {
            *pos = plan.moved(*pos);
        }
        plans.push(plan);
        num_leaves -= 1;
    }

    plans
}

/// A perfect subtree lifted out of the forest, one vector of hashes per row. `rows[0]` holds
/// the leaves and the last row holds the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree<Hash: AccumulatorHash> {
    rows: Vec<Vec<Hash>>,
}

impl<Hash: AccumulatorHash> Subtree<Hash> {
    pub fn leaf(hash: Hash) -> Self {
        Subtree {
            rows: vec![vec![hash]],
        }
    }

    pub fn from_rows(rows: Vec<Vec<Hash>>) -> Self {
        debug_assert!(rows
            .iter()
            .enumerate()
            .all(|(row, hashes)| hashes.len() == 1 << (rows.len() - 1 - row)));
        Subtree { rows }
    }

    /// Height of this subtree, 0 for a single leaf.
    pub fn height(&self) -> u8 {
        (self.rows.len() - 1) as u8
    }

    pub fn num_leaves(&self) -> u64 {
        1 << self.height()
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.rows[0]
    }

    pub fn row(&self, row: u8) -> &[Hash] {
        &self.rows[row as usize]
    }

    pub fn root(&self) -> Hash {
        self.rows[self.rows.len() - 1][0]
    }

    /// Joins two subtrees of the same height under a new root. Only the new root is hashed.
    pub fn merge(left: Subtree<Hash>, right: Subtree<Hash>) -> Subtree<Hash> {
        debug_assert_eq!(left.height(), right.height());
        let root = Hash::parent_hash(&left.root(), &right.root());

        let mut rows: Vec<Vec<Hash>> = left
            .rows
            .into_iter()
            .zip(right.rows)
            .map(|(mut left, right)| {
                left.extend(right);
                left
            })
            .collect();
        rows.push(vec![root]);

        Subtree { rows }
    }
}
