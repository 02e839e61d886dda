use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::hash_left_right;
use crate::tree::{IncrementalQuinTree, VOTE_OPTION_TREE_ARITY};

/// A voter's accumulated choices within one poll.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot
{
    /// Number of commands applied so far; the next valid command carries `nonce + 1`.
    pub nonce: u64,

    /// Current weight per vote option.
    #[serde(with = "crate::field::string_u128_vec")]
    pub votes: Vec<u128>,

    pub vote_option_tree_depth: usize,
}

impl Ballot
{
    pub fn new(max_vote_options: usize, vote_option_tree_depth: usize) -> Self
    {
        Ballot {
            nonce: 0,
            votes: vec![0; max_vote_options],
            vote_option_tree_depth,
        }
    }

    /// The tree of vote weights; trailing zero weights are left as empty leaves.
    pub fn vote_tree(&self) -> Result<IncrementalQuinTree, CoreError>
    {
        let last = self.votes.iter().rposition(|vote| *vote != 0).map_or(0, |i| i + 1);
        let leaves: Vec<Fr> = self.votes[..last].iter().map(|vote| Fr::from(*vote)).collect();

        IncrementalQuinTree::from_leaves(self.vote_option_tree_depth, Fr::zero(), VOTE_OPTION_TREE_ARITY, &leaves)
    }

    pub fn as_circuit_inputs(&self) -> Result<[Fr; 2], CoreError>
    {
        Ok([Fr::from(self.nonce), self.vote_tree()?.root()])
    }

    pub fn hash(&self) -> Result<Fr, CoreError>
    {
        let [nonce, root] = self.as_circuit_inputs()?;
        Ok(hash_left_right(nonce, root)?)
    }
}
