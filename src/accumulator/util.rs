//! Position arithmetic for the array-addressed forest.
//!
//! Positions are numbered from the bottom left, in the space of the perfect tree that can hold
//! the whole forest. Row 0 holds the leaves, and each row above starts right after the one
//! below it. With `forest_rows = 3`:
//! ```!
//! // 14
//! // |---------------\
//! // 12              13
//! // |-------\       |-------\
//! // 08      09      10      11
//! // |---\   |---\   |---\   |---\
//! // 00  01  02  03  04  05  06  07
//! ```
//! Positions that are not backed by a node hold the empty hash.

#[cfg(test)]
use super::node_hash::BitcoinNodeHash;

/// Number of slots needed to address every position of a forest with `forest_rows` rows.
pub fn forest_size(forest_rows: u8) -> usize {
    ((2u64 << forest_rows) - 1) as usize
}

// detectRow finds the current row of a node, given the position
// and the total forest rows.
pub fn detect_row(pos: u64, forest_rows: u8) -> u8 {
    let mut marker: u64 = 1 << forest_rows;
    let mut h: u8 = 0;

    while pos & marker != 0 {
        marker >>= 1;
        h += 1;
    }

    h
}

// start_position_at_row returns the smallest position a node can have in the requested row.
pub fn start_position_at_row(row: u8, forest_rows: u8) -> u64 {
    // 2 << forest_rows is 2 more than the max position
    // to get the correct offset for a given row,
    // subtract (2 << `row complement of forest_rows`) from (2 << forest_rows)
    (2 << forest_rows) - (2 << (forest_rows - row))
}

// parent returns the parent position of the passed in child
pub fn parent(pos: u64, forest_rows: u8) -> u64 {
    (pos >> 1) | (1 << forest_rows)
}

// parent_many returns the ancestor `rise` rows above pos. rise = 0 returns pos itself.
pub fn parent_many(pos: u64, rise: u8, forest_rows: u8) -> u64 {
    if rise == 0 {
        return pos;
    }
    debug_assert!(rise <= forest_rows, "cannot rise above the forest");
    let mask = (2 << forest_rows) - 1;
    (pos >> rise | (mask << (forest_rows - (rise - 1)))) & mask
}

// left_child returns the left child of a node that is not on row 0.
pub fn left_child(pos: u64, forest_rows: u8) -> u64 {
    (pos << 1) & ((2 << forest_rows) - 1)
}

pub fn is_left_niece(position: u64) -> bool {
    position & 1 == 0
}

// root_position returns the position of the root at a given row. Only meaningful if
// num_leaves has the bit for that row set.
pub fn root_position(num_leaves: u64, row: u8, forest_rows: u8) -> u64 {
    let mask = (2 << forest_rows) - 1;
    let before = num_leaves & (mask << (row + 1));

    let shifted = (before >> row) | (mask << (forest_rows + 1 - row));
    shifted & mask
}

// is_root_position checks if the current position is a root given the number of
// leaves and the entire rows of the forest.
pub fn is_root_position(position: u64, num_leaves: u64, forest_rows: u8) -> bool {
    let row = detect_row(position, forest_rows);

    let root_present = num_leaves & (1 << row) != 0;
    let root_pos = root_position(num_leaves, row, forest_rows);

    root_present && root_pos == position
}

pub fn num_roots(num_leaves: u64) -> usize {
    num_leaves.count_ones() as usize
}

/// Returns the perfect trees of a forest with `num_leaves` leaves as `(first leaf, rows)`,
/// tallest first. There's one tree for each bit set in `num_leaves`.
pub fn trees(num_leaves: u64) -> impl Iterator<Item = (u64, u8)> {
    (0..u64::BITS as u8)
        .rev()
        .filter(move |row| (num_leaves >> row) & 1 == 1)
        .scan(0u64, |start, row| {
            let tree = (*start, row);
            *start += 1 << row;
            Some(tree)
        })
}

/// Finds the tree holding the leaf at `pos`, returning `(tree index, first leaf, rows)`. The
/// index counts from the tallest tree, the same order roots are returned in.
pub fn detect_tree(pos: u64, num_leaves: u64) -> Option<(usize, u64, u8)> {
    if pos >= num_leaves {
        return None;
    }
    trees(num_leaves)
        .enumerate()
        .find(|(_, (start, rows))| pos < start + (1 << rows))
        .map(|(index, (start, rows))| (index, start, rows))
}

// in_forest tells whether a node exists at pos, i.e. whether all leaves under it are
// in [0, num_leaves).
pub fn in_forest(mut pos: u64, num_leaves: u64, forest_rows: u8) -> bool {
    // quick yes
    if pos < num_leaves {
        return true;
    }

    let marker = 1 << forest_rows;
    let mask = (marker << 1) - 1;

    if pos >= mask {
        return false;
    }

    while pos & marker != 0 {
        pos = ((pos << 1) & mask) | 1;
    }

    pos < num_leaves
}

#[cfg(test)]
pub fn hash_from_u8(value: u8) -> BitcoinNodeHash {
    use bitcoin_hashes::sha256;
    use bitcoin_hashes::Hash;
    use bitcoin_hashes::HashEngine;

    let mut engine = sha256::Hash::engine();
    engine.input(&[value]);

    sha256::Hash::from_engine(engine).into()
}
