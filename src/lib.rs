//! # utreexo-forest
//!
//! An implementation of the [Utreexo](https://eprint.iacr.org/2019/611.pdf) accumulator for
//! nodes that hold the whole set. Utreexo represents a large, frequently mutated set (like
//! Bitcoin's UTXO set) as a handful of Merkle roots. Elements are added when outputs are
//! created, deleted when they are spent, and proven with a short list of sibling hashes.
//!
//! The crate has two representations:
//!  - [Forest](accumulator::forest::Forest): the full accumulator, stored in a single array
//!    addressed by position. It can add, delete, prove, verify and undo a block.
//!  - [Pollard](accumulator::pollard::Pollard) nodes: a niece-linked, prunable representation
//!    that keeps only the hashes needed to keep proving the leaves you care about.
//!
//! For more information, check each module's documentation.

pub mod accumulator;
