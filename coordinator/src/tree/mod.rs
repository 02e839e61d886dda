mod accqueue;
mod quin;

pub use accqueue::AccQueue;
pub use quin::{verify_proof, IncrementalQuinTree, MerkleProof};

use ark_bn254::Fr;

use crate::hash::{poseidon, HashError};

/// Arity of the state and ballot trees.
pub const STATE_TREE_ARITY: usize = 2;

/// Arity of the message and vote option trees.
pub const MESSAGE_TREE_ARITY: usize = 5;
pub const VOTE_OPTION_TREE_ARITY: usize = 5;

/// Node hash: Poseidon over all children.
pub fn hash_children(children: &[Fr]) -> Result<Fr, HashError>
{
    poseidon(children)
}

/// Roots of empty trees for every depth in `0..=depth`.
pub fn zeros(arity: usize, zero_value: Fr, depth: usize) -> Result<Vec<Fr>, HashError>
{
    let mut zeros = Vec::with_capacity(depth + 1);
    let mut current = zero_value;
    for _ in 0..depth
    {
        zeros.push(current);
        current = hash_children(&vec![current; arity])?;
    }
    zeros.push(current);
    Ok(zeros)
}

/// Smallest depth (at least 1) whose tree holds `num_leaves` leaves.
pub fn calc_depth_from_num_leaves(arity: usize, num_leaves: usize) -> usize
{
    let mut depth = 1;
    while (arity as u128).pow(depth as u32) < num_leaves as u128
    {
        depth += 1;
    }
    depth
}
