//! [AccumulatorHash] is the trait every hash stored in the accumulator implements, and
//! [BitcoinNodeHash] is the default implementation. It's just a wrapper around [[u8; 32]],
//! plus an empty value the [Forest](crate::accumulator::forest::Forest) uses for vacant slots.
//! # Examples
//! Building from a str
//! ```
//! use std::str::FromStr;
//!
//! use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//! let hash = BitcoinNodeHash::from_str(
//!     "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d",
//! )
//! .unwrap();
//! assert_eq!(
//!     hash.to_string().as_str(),
//!     "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
//! );
//! ```
//!
//! Computing a parent hash (i.e a hash of two nodes concatenated)
//! ```
//! use std::str::FromStr;
//!
//! use utreexo_forest::accumulator::node_hash::AccumulatorHash;
//! use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//! let left = BitcoinNodeHash::new([0; 32]);
//! let right = BitcoinNodeHash::new([1; 32]);
//! let parent = BitcoinNodeHash::parent_hash(&left, &right);
//! let expected_parent = BitcoinNodeHash::from_str(
//!     "34e33ca0c40b7bd33d28932ca9e35170def7309a3bf91ecda5e1ceb067548a12",
//! )
//! .unwrap();
//! assert_eq!(parent, expected_parent);
//! ```
use std::fmt::Debug;
use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use bitcoin_hashes::hex;
use bitcoin_hashes::sha256;
use bitcoin_hashes::sha512_256;
use bitcoin_hashes::Hash;
use bitcoin_hashes::HashEngine;
#[cfg(feature = "with-serde")]
use serde::Deserialize;
#[cfg(feature = "with-serde")]
use serde::Serialize;

/// The hash combiner every accumulator structure is generic over.
///
/// `parent_hash` must be deterministic and order sensitive: swapping `left` and `right` must
/// give a different parent. The forest never calls it with an empty child.
pub trait AccumulatorHash:
    Copy + Clone + Ord + Debug + Display + std::hash::Hash + Default + 'static
{
    fn is_empty(&self) -> bool;
    fn empty() -> Self;
    fn parent_hash(left: &Self, right: &Self) -> Self;
}

#[derive(Eq, PartialEq, Copy, Clone, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
/// A 32 byte hash of a node in the forest, or the empty value for a vacant slot.
/// # Example
/// ```
/// use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
/// let hash = BitcoinNodeHash::new([0; 32]);
/// assert_eq!(
///     hash.to_string().as_str(),
///     "0000000000000000000000000000000000000000000000000000000000000000"
/// );
/// ```
pub enum BitcoinNodeHash {
    #[default]
    Empty,
    Some([u8; 32]),
}

impl Deref for BitcoinNodeHash {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        match self {
            BitcoinNodeHash::Some(ref inner) => inner,
            _ => &[0; 32],
        }
    }
}

impl Display for BitcoinNodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        if let BitcoinNodeHash::Some(ref inner) = self {
            for byte in inner.iter() {
                write!(f, "{byte:02x}")?;
            }
            Ok(())
        } else {
            write!(f, "empty")
        }
    }
}

impl Debug for BitcoinNodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        Display::fmt(self, f)
    }
}

impl From<sha512_256::Hash> for BitcoinNodeHash {
    fn from(hash: sha512_256::Hash) -> Self {
        BitcoinNodeHash::Some(hash.to_byte_array())
    }
}

impl From<sha256::Hash> for BitcoinNodeHash {
    fn from(hash: sha256::Hash) -> Self {
        BitcoinNodeHash::Some(hash.to_byte_array())
    }
}

impl From<[u8; 32]> for BitcoinNodeHash {
    fn from(hash: [u8; 32]) -> Self {
        BitcoinNodeHash::Some(hash)
    }
}

impl From<&[u8; 32]> for BitcoinNodeHash {
    fn from(hash: &[u8; 32]) -> Self {
        BitcoinNodeHash::Some(*hash)
    }
}

impl TryFrom<&str> for BitcoinNodeHash {
    type Error = hex::HexToArrayError;
    fn try_from(hash: &str) -> Result<Self, Self::Error> {
        let inner = hex::FromHex::from_hex(hash)?;
        Ok(BitcoinNodeHash::Some(inner))
    }
}

impl FromStr for BitcoinNodeHash {
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BitcoinNodeHash::try_from(s)
    }

    type Err = hex::HexToArrayError;
}

impl BitcoinNodeHash {
    /// Creates a new BitcoinNodeHash from a 32 byte array.
    pub fn new(inner: [u8; 32]) -> Self {
        BitcoinNodeHash::Some(inner)
    }
}

impl AccumulatorHash for BitcoinNodeHash {
    /// Tells whether this hash is empty. Empty hashes mark vacant slots in the forest.
    fn is_empty(&self) -> bool {
        matches!(self, BitcoinNodeHash::Empty)
    }

    /// Creates an empty hash.
    /// # Example
    /// ```
    /// use utreexo_forest::accumulator::node_hash::AccumulatorHash;
    /// use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
    /// let hash = BitcoinNodeHash::empty();
    /// assert!(hash.is_empty());
    /// ```
    fn empty() -> Self {
        BitcoinNodeHash::Empty
    }

    /// parent_hash returns the merkle parent of the two passed in nodes: sha512_256(left || right).
    fn parent_hash(left: &Self, right: &Self) -> Self {
        let mut hash = sha512_256::Hash::engine();
        hash.input(&**left);
        hash.input(&**right);
        sha512_256::Hash::from_engine(hash).into()
    }
}
