use std::collections::HashMap;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::HashError;
use crate::tree::{hash_children, zeros};

/// Inclusion proof of a leaf (or of a subtree root) in an [`IncrementalQuinTree`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof
{
    /// `arity - 1` siblings per level, bottom up.
    #[serde(with = "crate::field::decimal_matrix")]
    pub path_elements: Vec<Vec<Fr>>,

    /// Position of the proven node among its siblings, per level.
    pub path_indices: Vec<usize>,

    #[serde(with = "crate::field::decimal")]
    pub leaf: Fr,

    #[serde(with = "crate::field::decimal")]
    pub root: Fr,
}

/// A fixed depth Merkle tree of arbitrary arity with sparse node storage.
#[derive(Clone, Debug)]
pub struct IncrementalQuinTree
{
    depth: usize,
    arity: usize,
    zeros: Vec<Fr>,

    /// `nodes[level]` maps a node index within that level to its value; absent
    /// nodes are the empty subtree root of that level.
    nodes: Vec<HashMap<u64, Fr>>,

    next_index: u64,
    root: Fr,
}

impl IncrementalQuinTree
{
    pub fn new(depth: usize, zero_value: Fr, arity: usize) -> Result<Self, HashError>
    {
        let zeros = zeros(arity, zero_value, depth)?;
        let root = zeros[depth];

        Ok(IncrementalQuinTree {
            depth,
            arity,
            zeros,
            nodes: vec![HashMap::new(); depth + 1],
            next_index: 0,
            root,
        })
    }

    /// Builds a tree holding `leaves` from index 0.
    pub fn from_leaves(depth: usize, zero_value: Fr, arity: usize, leaves: &[Fr]) -> Result<Self, CoreError>
    {
        let mut tree = IncrementalQuinTree::new(depth, zero_value, arity)?;
        for leaf in leaves
        {
            tree.insert(*leaf)?;
        }
        Ok(tree)
    }

    pub fn depth(&self) -> usize
    {
        self.depth
    }

    pub fn root(&self) -> Fr
    {
        self.root
    }

    pub fn next_index(&self) -> u64
    {
        self.next_index
    }

    pub fn capacity(&self) -> u64
    {
        (self.arity as u64).checked_pow(self.depth as u32).unwrap_or(u64::MAX)
    }

    pub fn node(&self, level: usize, index: u64) -> Fr
    {
        self.nodes[level].get(&index).copied().unwrap_or(self.zeros[level])
    }

    pub fn leaf(&self, index: u64) -> Fr
    {
        self.node(0, index)
    }

    pub fn insert(&mut self, leaf: Fr) -> Result<u64, CoreError>
    {
        if self.next_index >= self.capacity()
        {
            Err(CoreError::TreeFull { capacity: self.capacity() })?
        }

        let index = self.next_index;
        self.update(index, leaf)?;
        self.next_index += 1;
        Ok(index)
    }

    /// Replaces a leaf and rehashes its path to the root.
    pub fn update(&mut self, index: u64, leaf: Fr) -> Result<(), CoreError>
    {
        if index >= self.capacity()
        {
            Err(CoreError::IndexOutOfRange { index, capacity: self.capacity() })?
        }

        self.nodes[0].insert(index, leaf);

        let arity = self.arity as u64;
        let mut index = index;
        for level in 1..=self.depth
        {
            index /= arity;
            let children: Vec<Fr> = (0..arity)
                .map(|j| self.node(level - 1, index * arity + j))
                .collect();
            let hash = hash_children(&children)?;
            self.nodes[level].insert(index, hash);
        }

        self.root = self.node(self.depth, 0);
        Ok(())
    }

    pub fn gen_proof(&self, index: u64) -> Result<MerkleProof, CoreError>
    {
        if index >= self.capacity()
        {
            Err(CoreError::IndexOutOfRange { index, capacity: self.capacity() })?
        }

        let arity = self.arity as u64;
        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);

        let mut position = index;
        for level in 0..self.depth
        {
            let offset = position % arity;
            let start = position - offset;
            path_elements.push(
                (0..arity)
                    .filter(|j| *j != offset)
                    .map(|j| self.node(level, start + j))
                    .collect(),
            );
            path_indices.push(offset as usize);
            position /= arity;
        }

        Ok(MerkleProof {
            path_elements,
            path_indices,
            leaf: self.leaf(index),
            root: self.root,
        })
    }

    /// Proves the root of the aligned subtree spanning leaves `start..end`.
    pub fn gen_subroot_proof(&self, start: u64, end: u64) -> Result<MerkleProof, CoreError>
    {
        let arity = self.arity as u64;
        let num_leaves = end.saturating_sub(start);
        if num_leaves == 0 || num_leaves > self.capacity()
        {
            Err(CoreError::InvalidSubtreeRange { start, end })?
        }

        let mut sub_depth = 0;
        while arity.pow(sub_depth as u32) != num_leaves && sub_depth < self.depth
        {
            sub_depth += 1;
        }
        if arity.pow(sub_depth as u32) != num_leaves || start % num_leaves != 0
        {
            Err(CoreError::InvalidSubtreeRange { start, end })?
        }

        let mut proof = self.gen_proof(start)?;
        proof.path_elements.drain(..sub_depth);
        proof.path_indices.drain(..sub_depth);
        proof.leaf = self.node(sub_depth, start / num_leaves);

        Ok(proof)
    }

    pub fn verify_proof(&self, proof: &MerkleProof) -> Result<bool, HashError>
    {
        verify_proof(proof)
    }
}

/// Recomputes the root from a proof and compares it with the claimed root.
pub fn verify_proof(proof: &MerkleProof) -> Result<bool, HashError>
{
    let mut current = proof.leaf;
    for (siblings, index) in proof.path_elements.iter().zip(&proof.path_indices)
    {
        let mut level = siblings.clone();
        if *index > level.len() { return Ok(false); }
        level.insert(*index, current);
        current = hash_children(&level)?;
    }
    Ok(current == proof.root)
}
