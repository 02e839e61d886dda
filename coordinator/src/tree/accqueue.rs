use std::collections::BTreeMap;

use ark_bn254::Fr;
use ark_ff::Zero;
use tracing::debug;

use crate::error::CoreError;
use crate::tree::{calc_depth_from_num_leaves, hash_children, zeros};

/// Incremental append-only Merkle accumulator.
///
/// Leaves are hashed into fixed size subtrees as they arrive. Computing a root
/// happens in two phases: [`AccQueue::merge_sub_roots`] folds the subtree roots
/// into the smallest tree that holds them all, then [`AccQueue::merge`] lifts
/// that root to a fixed depth with precomputed empty-subtree hashes.
#[derive(Clone, Debug)]
pub struct AccQueue
{
    /// Children per node, 2 or 5.
    arity: usize,

    /// Depth of each subtree of leaves.
    sub_depth: usize,

    /// Maximal depth of the main tree; bounds the leaf capacity.
    max_depth: usize,

    /// `zeros[i]` is the root of an empty tree of depth `i`.
    zeros: Vec<Fr>,

    /// Pending nodes per level of the subtree under construction.
    leaf_queue: Vec<Vec<Fr>>,

    /// Roots of the completed subtrees, in insertion order.
    sub_roots: Vec<Fr>,

    num_leaves: u64,

    /// Pending nodes per level while folding subtree roots.
    sub_root_queue: Vec<Vec<Fr>>,

    next_sr_index_to_queue: usize,

    small_srt_root: Fr,

    main_roots: BTreeMap<usize, Fr>,

    subtrees_merged: bool,
}

impl AccQueue
{
    pub fn new(sub_depth: usize, arity: usize, zero_value: Fr, max_depth: usize) -> Result<Self, CoreError>
    {
        if arity != 2 && arity != 5
        {
            Err(CoreError::InvalidDepth { depth: arity, min: 2, max: 5 })?
        }
        if sub_depth == 0 || sub_depth > max_depth
        {
            Err(CoreError::InvalidDepth { depth: sub_depth, min: 1, max: max_depth })?
        }

        Ok(AccQueue {
            arity,
            sub_depth,
            max_depth,
            zeros: zeros(arity, zero_value, max_depth)?,
            leaf_queue: vec![Vec::new(); sub_depth + 1],
            sub_roots: Vec::new(),
            num_leaves: 0,
            sub_root_queue: vec![Vec::new(); max_depth + 1],
            next_sr_index_to_queue: 0,
            small_srt_root: Fr::zero(),
            main_roots: BTreeMap::new(),
            subtrees_merged: false,
        })
    }

    pub fn arity(&self) -> usize
    {
        self.arity
    }

    pub fn sub_depth(&self) -> usize
    {
        self.sub_depth
    }

    pub fn num_leaves(&self) -> u64
    {
        self.num_leaves
    }

    pub fn zeros(&self) -> &[Fr]
    {
        &self.zeros
    }

    pub fn sub_roots(&self) -> &[Fr]
    {
        &self.sub_roots
    }

    pub fn subtrees_merged(&self) -> bool
    {
        self.subtrees_merged
    }

    pub fn capacity(&self) -> u64
    {
        (self.arity as u64).checked_pow(self.max_depth as u32).unwrap_or(u64::MAX)
    }

    pub fn subtree_capacity(&self) -> u64
    {
        (self.arity as u64).pow(self.sub_depth as u32)
    }

    /// Appends a leaf and returns its index.
    pub fn enqueue(&mut self, leaf: Fr) -> Result<u64, CoreError>
    {
        if self.num_leaves >= self.capacity()
        {
            Err(CoreError::TreeFull { capacity: self.capacity() })?
        }

        // A completed merge consumed the subroot queue; start folding afresh.
        if self.subtrees_merged
        {
            self.reset_sub_root_queue();
        }

        self.push_leaf(leaf, 0)?;

        let index = self.num_leaves;
        self.num_leaves += 1;
        self.subtrees_merged = false;
        self.small_srt_root = Fr::zero();
        self.main_roots.clear();

        if self.num_leaves % self.subtree_capacity() == 0
        {
            let root = std::mem::take(&mut self.leaf_queue[self.sub_depth]);
            self.sub_roots.push(root.first().copied().unwrap_or(self.zeros[self.sub_depth]));
            self.leaf_queue.iter_mut().for_each(Vec::clear);
        }

        Ok(index)
    }

    fn push_leaf(&mut self, leaf: Fr, level: usize) -> Result<(), CoreError>
    {
        let mut node = leaf;
        let mut level = level;

        while level <= self.sub_depth
        {
            if self.leaf_queue[level].len() < self.arity - 1
            {
                self.leaf_queue[level].push(node);
                break;
            }

            let mut children = std::mem::take(&mut self.leaf_queue[level]);
            children.push(node);
            node = hash_children(&children)?;
            level += 1;
        }

        Ok(())
    }

    /// Pads the current subtree with zeros and closes it.
    pub fn fill(&mut self) -> Result<(), CoreError>
    {
        if self.subtrees_merged
        {
            self.reset_sub_root_queue();
        }

        if self.num_leaves % self.subtree_capacity() == 0
        {
            self.sub_roots.push(self.zeros[self.sub_depth]);
        }
        else
        {
            for level in 0..self.sub_depth
            {
                if self.leaf_queue[level].is_empty() { continue; }

                let mut children = std::mem::take(&mut self.leaf_queue[level]);
                children.resize(self.arity, self.zeros[level]);
                let hashed = hash_children(&children)?;
                self.push_leaf(hashed, level + 1)?;
            }

            let root = self.leaf_queue[self.sub_depth].first().copied().unwrap_or(self.zeros[self.sub_depth]);
            self.sub_roots.push(root);
            self.leaf_queue.iter_mut().for_each(Vec::clear);
        }

        self.num_leaves = self.sub_roots.len() as u64 * self.subtree_capacity();
        self.subtrees_merged = false;
        self.small_srt_root = Fr::zero();
        self.main_roots.clear();

        Ok(())
    }

    /// Depth of the smallest tree holding every subtree root.
    pub fn calc_srt_depth(&self) -> usize
    {
        let mut srt_depth = self.sub_depth;
        let required = (self.sub_roots.len() as u128).max(1) * self.subtree_capacity() as u128;
        while (self.arity as u128).pow(srt_depth as u32) < required
        {
            srt_depth += 1;
        }
        srt_depth
    }

    /// Folds the subtree roots into the small root. With `num_ops > 0` at most
    /// that many subroots are queued per call; call again to continue.
    pub fn merge_sub_roots(&mut self, num_ops: usize) -> Result<(), CoreError>
    {
        if self.subtrees_merged { Err(CoreError::SubtreesAlreadyMerged)? }

        if self.num_leaves == 0 || self.num_leaves % self.subtree_capacity() != 0
        {
            self.fill()?;
        }

        if self.sub_roots.len() == 1
        {
            self.small_srt_root = self.sub_roots[0];
            self.subtrees_merged = true;
            return Ok(());
        }

        let depth = calc_depth_from_num_leaves(self.arity, self.sub_roots.len());

        let mut ops = 0;
        while self.next_sr_index_to_queue < self.sub_roots.len()
        {
            if num_ops != 0 && ops == num_ops
            {
                debug!(queued = self.next_sr_index_to_queue, total = self.sub_roots.len(), "partially merged subroots");
                return Ok(());
            }

            let sub_root = self.sub_roots[self.next_sr_index_to_queue];
            self.queue_sub_root(sub_root, depth)?;
            self.next_sr_index_to_queue += 1;
            ops += 1;
        }

        let padded = self.arity.pow(depth as u32);
        for _ in self.sub_roots.len()..padded
        {
            self.queue_sub_root(self.zeros[self.sub_depth], depth)?;
        }

        self.small_srt_root = self.sub_root_queue[depth].first().copied().unwrap_or(self.zeros[self.sub_depth]);
        self.subtrees_merged = true;

        Ok(())
    }

    fn queue_sub_root(&mut self, leaf: Fr, max_level: usize) -> Result<(), CoreError>
    {
        let mut node = leaf;
        let mut level = 0;

        while level <= max_level
        {
            if self.sub_root_queue[level].len() < self.arity - 1 || level == max_level
            {
                self.sub_root_queue[level].push(node);
                break;
            }

            let mut children = std::mem::take(&mut self.sub_root_queue[level]);
            children.push(node);
            node = hash_children(&children)?;
            level += 1;
        }

        Ok(())
    }

    fn reset_sub_root_queue(&mut self)
    {
        self.sub_root_queue.iter_mut().for_each(Vec::clear);
        self.next_sr_index_to_queue = 0;
    }

    /// Computes the main root at `depth` from the small root. Idempotent for a
    /// given set of leaves.
    pub fn merge(&mut self, depth: usize) -> Result<Fr, CoreError>
    {
        if !self.subtrees_merged { Err(CoreError::SubtreesNotMerged)? }

        let srt_depth = self.calc_srt_depth();
        if depth < srt_depth || depth > self.max_depth
        {
            Err(CoreError::InvalidDepth { depth, min: srt_depth, max: self.max_depth })?
        }

        let mut root = self.small_srt_root;
        for level in srt_depth..depth
        {
            let mut children = vec![root];
            children.resize(self.arity, self.zeros[level]);
            root = hash_children(&children)?;
        }

        self.main_roots.insert(depth, root);
        Ok(root)
    }

    /// Root merged at `depth` over the current leaves. Appending a leaf or
    /// filling drops every merged root until the next [`AccQueue::merge`].
    pub fn get_root(&self, depth: usize) -> Option<Fr>
    {
        self.main_roots.get(&depth).copied()
    }

    pub fn has_root(&self, depth: usize) -> bool
    {
        self.main_roots.contains_key(&depth)
    }
}
