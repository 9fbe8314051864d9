//! Merkle-branch arithmetic shared by the merged-mining verifier and builder.
//! These functions work over plain `sha256d` digests so the same code serves
//! the parent block's transaction tree and the chain merkle tree, whose
//! leaves are auxiliary block hashes rather than txids.

use bitcoin::hashes::sha256d;
use bitcoin::hashes::Hash;
use bitcoin::hashes::HashEngine;

/// Computes the hash of two sibling nodes' parent, sha256d(left || right).
pub(crate) fn parent_hash(left: &sha256d::Hash, right: &sha256d::Hash) -> sha256d::Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(left.as_byte_array());
    engine.input(right.as_byte_array());
    sha256d::Hash::from_engine(engine)
}

/// Folds `hash` up through `branch`, one level per sibling. The low bit of
/// `index` at each level tells which side the running hash is on: set means
/// it is the right child, clear means the left.
///
/// An index of -1 signals "no branch" and yields the all-zero hash.
pub fn check_merkle_branch(
    mut hash: sha256d::Hash,
    branch: &[sha256d::Hash],
    mut index: i32,
) -> sha256d::Hash {
    if index == -1 {
        return sha256d::Hash::all_zeros();
    }
    for sibling in branch {
        if index & 1 == 1 {
            hash = parent_hash(sibling, &hash);
        } else {
            hash = parent_hash(&hash, sibling);
        }
        index >>= 1;
    }
    hash
}

/// Merkle root of an ordered list of hashes. A row with an odd number of
/// nodes hashes its last node with itself. An empty list yields the all-zero
/// hash.
pub fn block_merkle_root(hashes: &[sha256d::Hash]) -> sha256d::Hash {
    if hashes.is_empty() {
        return sha256d::Hash::all_zeros();
    }
    let mut row = hashes.to_vec();
    while row.len() > 1 {
        row = row
            .chunks(2)
            .map(|pair| parent_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    row[0]
}

/// Collects the sibling path for the leaf at `pos`, such that
/// [check_merkle_branch] folds that leaf back to the root
/// [block_merkle_root] computes for the same list.
pub fn merkle_branch(hashes: &[sha256d::Hash], mut pos: u32) -> Vec<sha256d::Hash> {
    let mut branch = Vec::new();
    let mut row = hashes.to_vec();
    while row.len() > 1 {
        // The last node of an odd row is its own sibling
        let sibling = (pos ^ 1) as usize;
        branch.push(*row.get(sibling).unwrap_or(&row[pos as usize]));
        row = row
            .chunks(2)
            .map(|pair| parent_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
        pos >>= 1;
    }
    branch
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use auxpow_common::dhash;
    use bitcoin::hashes::sha256d;
    use bitcoin::hashes::Hash;

    use super::*;

    fn leaves(n: usize) -> Vec<sha256d::Hash> {
        (0..n as u8).map(|i| sha256d::Hash::hash(&[i])).collect()
    }

    #[test]
    fn fold_of_empty_branch_is_identity() {
        let leaf = sha256d::Hash::hash(b"leaf");
        assert_eq!(check_merkle_branch(leaf, &[], 0), leaf);
    }

    #[test]
    fn negative_index_yields_zero_hash() {
        let leaf = sha256d::Hash::hash(b"leaf");
        let branch = leaves(3);
        assert_eq!(
            check_merkle_branch(leaf, &branch, -1),
            sha256d::Hash::all_zeros()
        );
    }

    #[test]
    fn branch_folds_back_to_root() {
        // Including odd widths, where the last node pairs with itself
        for width in 1..=9 {
            let hashes = leaves(width);
            let root = block_merkle_root(&hashes);
            for pos in 0..width {
                let branch = merkle_branch(&hashes, pos as u32);
                let folded = check_merkle_branch(hashes[pos], &branch, pos as i32);
                assert_eq!(folded, root, "leaf {} of {} disagrees", pos, width);
            }
        }
    }

    #[test]
    fn mainnet_block_100000_root() {
        let txids = [
            dhash!("8c14f0db3df150123e6f3dbbf30f8b955a8249b62ac1d1ff16284aefa3d06d87"),
            dhash!("fff2525b8931402dd09222c50775608f75787bd2b87e56995a7bdd30f79702c4"),
            dhash!("6359f0868171b1d194cbee1af2f16ea598ae8fad666d9b012c8ed2b79a236ec4"),
            dhash!("e9a66845e05d5abc0ad04ec80f774a7e585c6e8db975962d069a522137b80c1d"),
        ];
        let root = dhash!("f3e94742aca4b5ef85488dc37c06c3282295ffec960994b2c0d5ac2a25a95766");
        assert_eq!(block_merkle_root(&txids), root);

        // The coinbase proof is the path for leaf zero
        let branch = merkle_branch(&txids, 0);
        assert_eq!(check_merkle_branch(txids[0], &branch, 0), root);
    }
}
