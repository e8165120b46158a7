//! Applying blocks to a forest and rolling one back, the way a bridge node handles a reorg.
//! Each block spends some existing leaves, proving them first, and creates new ones.

use std::str::FromStr;

use utreexo_forest::accumulator::forest::Forest;
use utreexo_forest::accumulator::leaf::Leaf;
use utreexo_forest::accumulator::leaf::RememberPolicy;
use utreexo_forest::accumulator::node_hash::BitcoinNodeHash;

fn main() {
    let policy = RememberPolicy::new(10);
    let utxos = vec![
        BitcoinNodeHash::from_str("b151a956139bb821d4effa34ea95c17560e0135d1e4661fc23cedc3af49dac42")
            .unwrap(),
        BitcoinNodeHash::from_str("d3bd63d53c5a70050a28612a2f4b2019f40951a653ae70736d93745efb1124fa")
            .unwrap(),
        BitcoinNodeHash::from_str("cac74661f4944e6e1fed35df40da951c6e151e7b0c8d65c3ee37d6dfd3bc3ef7")
            .unwrap(),
    ];
    let leaves: Vec<Leaf> = utxos
        .iter()
        .map(|hash| Leaf::new(*hash, 3, &policy))
        .collect();

    // Block 1 only creates outputs
    let mut forest = Forest::new();
    forest.modify(&leaves, &[]).unwrap();
    let tops_after_block_1 = forest.get_tops();
    println!("after block 1:\n{forest}");

    // Block 2 spends the second output and creates a new one. The block proof's targets
    // are the positions to delete.
    let spent = [utxos[1]];
    let proof = forest.prove_block(&spent).unwrap();
    assert!(forest.verify_block_proof(&proof, &spent));

    let new_utxo =
        BitcoinNodeHash::from_str("4d7b3ef7300acf70c892d8327db8272f54434adbc61a4e130a563cb59a0d0f47")
            .unwrap();
    let undo = forest
        .modify(&[Leaf::new(new_utxo, 12, &policy)], &proof.targets)
        .unwrap();
    println!("after block 2:\n{forest}");
    println!("{}", forest.stats());

    // The old proof no longer works, the spent output is gone
    assert!(!forest.verify(&proof, &spent));
    assert!(forest.prove(&utxos[1]).is_err());

    // Block 2 gets reorged out
    forest.undo(undo).unwrap();
    assert_eq!(forest.get_tops(), tops_after_block_1);
    assert!(forest.verify(&proof, &spent));
    println!("after undoing block 2:\n{forest}");
}
