use ark_bn254::Fr;
use ark_ff::Zero;
use tracing::{debug, info};

use crate::crypto::{Keypair, PublicKey};
use crate::domain::PAD_KEY;
use crate::error::CoreError;
use crate::poll::{Mode, Poll, TreeDepths};
use crate::tree::{AccQueue, STATE_TREE_ARITY};

/// Leaves per subtree of the signup queue, as a binary depth.
pub const STATE_TREE_SUB_DEPTH: usize = 2;

/// A slot in the poll list. Polls other than the one being coordinated are
/// kept as placeholders so that poll ids stay aligned with the chain.
#[derive(Clone, Debug)]
pub enum PollSlot
{
    Active(Box<Poll>),
    Null,
}

/// Replica of the on-chain registry: every signed up key and every deployed poll.
#[derive(Clone, Debug)]
pub struct MaciState
{
    state_tree_depth: usize,

    /// Signup registry; index 0 holds the padding key.
    public_keys: Vec<PublicKey>,

    /// Accumulator over the registry's key hashes.
    state_aq: AccQueue,

    /// Indexed by poll id.
    polls: Vec<PollSlot>,
}

impl MaciState
{
    pub fn new(state_tree_depth: usize) -> Result<Self, CoreError>
    {
        let mut state_aq = AccQueue::new(
            STATE_TREE_SUB_DEPTH.min(state_tree_depth),
            STATE_TREE_ARITY,
            Fr::zero(),
            state_tree_depth,
        )?;
        state_aq.enqueue(PAD_KEY.hash()?)?;

        Ok(MaciState {
            state_tree_depth,
            public_keys: vec![PAD_KEY],
            state_aq,
            polls: Vec::new(),
        })
    }

    pub fn state_tree_depth(&self) -> usize
    {
        self.state_tree_depth
    }

    pub fn public_keys(&self) -> &[PublicKey]
    {
        &self.public_keys
    }

    /// Registered keys including the padding key.
    pub fn num_signups(&self) -> u64
    {
        self.public_keys.len() as u64
    }

    pub fn state_aq(&self) -> &AccQueue
    {
        &self.state_aq
    }

    /// Merges the signup accumulator to the full state tree depth and
    /// returns its root.
    pub fn merge_state_aq(&mut self) -> Result<Fr, CoreError>
    {
        if let Some(root) = self.state_aq.get_root(self.state_tree_depth)
        {
            return Ok(root);
        }
        if !self.state_aq.subtrees_merged()
        {
            self.state_aq.merge_sub_roots(0)?;
        }

        let root = self.state_aq.merge(self.state_tree_depth)?;
        debug!(leaves = self.state_aq.num_leaves(), "merged signup queue");
        Ok(root)
    }

    /// Registers a key and returns its state index.
    pub fn sign_up(&mut self, public_key: PublicKey) -> Result<usize, CoreError>
    {
        self.state_aq.enqueue(public_key.hash()?)?;
        self.public_keys.push(public_key);

        debug!(index = self.public_keys.len() - 1, "signed up");
        Ok(self.public_keys.len() - 1)
    }

    /// Creates a poll under the next id and returns that id.
    pub fn deploy_poll(
        &mut self,
        poll_end_timestamp: u64,
        tree_depths: TreeDepths,
        coordinator_keypair: Keypair,
        vote_options: usize,
        mode: Mode,
    ) -> Result<u64, CoreError>
    {
        let poll_id = self.polls.len() as u64;
        let poll = Poll::new(poll_id, poll_end_timestamp, coordinator_keypair, tree_depths, vote_options, mode)?;
        self.polls.push(PollSlot::Active(Box::new(poll)));

        info!(poll_id, ?mode, vote_options, "deployed poll");
        Ok(poll_id)
    }

    /// Reserves the next poll id without holding any state for it.
    pub fn deploy_null_poll(&mut self) -> u64
    {
        self.polls.push(PollSlot::Null);
        self.polls.len() as u64 - 1
    }

    pub fn num_polls(&self) -> usize
    {
        self.polls.len()
    }

    pub fn poll(&self, poll_id: u64) -> Result<&Poll, CoreError>
    {
        match self.polls.get(poll_id as usize)
        {
            Some(PollSlot::Active(poll)) => Ok(poll.as_ref()),
            Some(PollSlot::Null) => Err(CoreError::NullPoll(poll_id)),
            None => Err(CoreError::PollNotFound(poll_id)),
        }
    }

    pub fn poll_mut(&mut self, poll_id: u64) -> Result<&mut Poll, CoreError>
    {
        match self.polls.get_mut(poll_id as usize)
        {
            Some(PollSlot::Active(poll)) => Ok(poll.as_mut()),
            Some(PollSlot::Null) => Err(CoreError::NullPoll(poll_id)),
            None => Err(CoreError::PollNotFound(poll_id)),
        }
    }

    /// Takes a poll out of the state, leaving a placeholder in its slot.
    pub fn take_poll(&mut self, poll_id: u64) -> Result<Poll, CoreError>
    {
        self.poll(poll_id)?;
        match std::mem::replace(&mut self.polls[poll_id as usize], PollSlot::Null)
        {
            PollSlot::Active(poll) => Ok(*poll),
            PollSlot::Null => Err(CoreError::NullPoll(poll_id)),
        }
    }

    /// Hands the first `num_signups` registered keys to a poll and builds its
    /// state and ballot trees.
    pub fn update_poll(&mut self, poll_id: u64, num_signups: u64) -> Result<(), CoreError>
    {
        let registry = &self.public_keys;
        let poll = match self.polls.get_mut(poll_id as usize)
        {
            Some(PollSlot::Active(poll)) => poll,
            Some(PollSlot::Null) => return Err(CoreError::NullPoll(poll_id)),
            None => return Err(CoreError::PollNotFound(poll_id)),
        };

        poll.update_poll(registry, num_signups)
    }
}
