//! This module is the core of the library. It contains all the basic data structures to use Utreexo,
//! such as the accumulator, proofs and undo data. The algorithms are the same for both
//! representations of the accumulator, but each one has its own advantages and disadvantages.
//!
//! # [Forest](forest::Forest)
//! A Forest holds every node of the accumulator, so it can prove any leaf. This is what a
//! bridge node keeps. Each call to `modify` returns an [UndoBlock](undo::UndoBlock), which
//! reverts that block if it gets reorged out.
//!
//! ## Example
//! ```
//!   use bitcoin_hashes::{sha256, Hash, HashEngine};
//!   use utreexo_forest::accumulator::forest::Forest;
//!   use utreexo_forest::accumulator::leaf::Leaf;
//!   use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;
//!
//!   // Hashes of the UTXOs we'll add to the accumulator
//!   let hashes: Vec<BitcoinNodeHash> = (0..4u8)
//!       .map(|i| {
//!           let mut engine = sha256::Hash::engine();
//!           engine.input(&[i]);
//!           sha256::Hash::from_engine(engine).into()
//!       })
//!       .collect();
//!   let leaves: Vec<Leaf> = hashes.iter().map(|hash| (*hash).into()).collect();
//!
//!   let mut forest = Forest::new();
//!   forest.modify(&leaves, &[]).unwrap();
//!   let tops = forest.get_tops();
//!
//!   // A block spending the second UTXO comes with a proof for it
//!   let proof = forest.prove_block(&[hashes[1]]).unwrap();
//!   assert!(forest.verify_block_proof(&proof, &[hashes[1]]));
//!   let undo = forest.modify(&[], &proof.targets).unwrap();
//!   assert!(forest.prove(&hashes[1]).is_err());
//!
//!   // The block gets reorged out
//!   forest.undo(undo).unwrap();
//!   assert_eq!(forest.get_tops(), tops);
//!   assert!(forest.prove(&hashes[1]).is_ok());
//! ```
//!
//! # [Pollard](pollard::Pollard)
//! A Pollard only keeps what it needs to prove the leaves it remembers. Its nodes point to
//! their nieces instead of their children, see [polnode] for the details.
//!
//! # Proof
//! A [BlockProof](proof::BlockProof) proves that a given element is in the accumulator. It is
//! composed of a list of positions, the targets, and a list of hashes, the siblings on the way
//! from each target to its root.
pub mod error;
pub mod forest;
pub mod leaf;
pub mod node_hash;
pub mod polnode;
pub mod pollard;
pub mod proof;
pub mod transform;
pub mod undo;
pub mod util;
