use thiserror::Error;

use super::polnode::NodeId;

/// Errors that can occur when interacting with a forest or a pollard.
///
/// Verification failures are not errors: `verify` returns `false` for forged or stale proofs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("leaf {0} is not in the forest")]
    UnknownLeaf(String),
    #[error("position {0} is not an occupied leaf")]
    InvalidTarget(u64),
    #[error("position {0} is targeted more than once")]
    DuplicateTarget(u64),
    #[error("leaf {0} is already in the forest")]
    DuplicateLeaf(String),
    #[error("cannot add the empty hash as a leaf")]
    EmptyLeaf,
    #[error("undo data doesn't match the forest: {0}")]
    UndoMismatch(String),
    #[error("forest is corrupted: {0}")]
    Sanity(String),
    #[error("pollard node {0:?} is gone")]
    MissingNode(NodeId),
    #[error("the path to position {0} has been pruned")]
    Pruned(u64),
}
