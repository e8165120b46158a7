//! A [Leaf] is one element as it's handed to the accumulator: its hash, plus how long it
//! lived. The lifetime only decides whether a [Pollard](super::pollard::Pollard) should keep
//! proving it, the forest itself ignores it.
//! # Example
//! ```
//! use utreexo_forest::accumulator::leaf::Leaf;
//! use utreexo_forest::accumulator::leaf::RememberPolicy;
//! use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//!
//! let policy = RememberPolicy::new(1000);
//! let leaf = Leaf::new(BitcoinNodeHash::new([1; 32]), 2000, &policy);
//! assert!(leaf.remember);
//! let leaf = Leaf::new(BitcoinNodeHash::new([2; 32]), 500, &policy);
//! assert!(!leaf.remember);
//! ```
#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;

use super::node_hash::AccumulatorHash;
use super::node_hash::BitcoinNodeHash;

/// The retention threshold used to compute [Leaf::remember]. Leaves whose duration meets or
/// exceeds `threshold` are remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct RememberPolicy {
    pub threshold: u32,
}

impl Default for RememberPolicy {
    /// Remembers nothing, short of a leaf that lived `u32::MAX` blocks.
    fn default() -> Self {
        RememberPolicy {
            threshold: u32::MAX,
        }
    }
}

impl RememberPolicy {
    pub fn new(threshold: u32) -> Self {
        RememberPolicy { threshold }
    }

    pub fn remember(&self, duration: u32) -> bool {
        duration >= self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct Leaf<Hash: AccumulatorHash = BitcoinNodeHash> {
    /// The commitment we are adding.
    pub hash: Hash,
    /// How many blocks elapsed between this element's creation and its spending. If it was
    /// created at block 100 and spent at block 200, it has a duration of 100.
    pub duration: u32,
    /// Whether this leaf should be cached. It's advisory only.
    pub remember: bool,
}

impl<Hash: AccumulatorHash> Leaf<Hash> {
    pub fn new(hash: Hash, duration: u32, policy: &RememberPolicy) -> Self {
        Leaf {
            hash,
            duration,
            remember: policy.remember(duration),
        }
    }
}

impl<Hash: AccumulatorHash> From<Hash> for Leaf<Hash> {
    /// A leaf we know nothing about, it won't be remembered.
    fn from(hash: Hash) -> Self {
        Leaf {
            hash,
            duration: 0,
            remember: false,
        }
    }
}
