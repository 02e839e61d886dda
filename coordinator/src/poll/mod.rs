mod persist;
mod processor;
mod tally;

pub use persist::PollSnapshot;
pub use processor::{ProcessMessagesInputs, ProcessedBatch};
pub use tally::{
    gen_spent_commitment, gen_tally_commitment, gen_tree_commitment, ResultProof, TallyCommitments, TallyInputs,
};

use std::collections::{BTreeMap, HashSet};

use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{Keypair, PublicKey};
use crate::domain::{Ballot, Message, StateLeaf, NOTHING_UP_MY_SLEEVE};
use crate::error::CoreError;
use crate::field::to_decimal;
use crate::hash::hash2;
use crate::tree::{AccQueue, IncrementalQuinTree, MESSAGE_TREE_ARITY, STATE_TREE_ARITY, VOTE_OPTION_TREE_ARITY};

/// How vote weights are charged and tallied.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode
{
    /// Quadratic voting: a weight `w` costs `w²` voice credits.
    Qv,
    /// Linear voting: a weight `w` costs `w` voice credits.
    NonQv,
    /// Linear voting where a vote must spend the voter's whole balance.
    Full,
}

impl Mode
{
    /// The on-chain encoding of the mode.
    pub fn from_index(index: u64) -> Option<Mode>
    {
        match index
        {
            0 => Some(Mode::Qv),
            1 => Some(Mode::NonQv),
            2 => Some(Mode::Full),
            _ => None,
        }
    }

    pub fn cost(&self, weight: u128) -> u128
    {
        match self
        {
            Mode::Qv => weight * weight,
            Mode::NonQv | Mode::Full => weight,
        }
    }

    pub fn is_quadratic(&self) -> bool
    {
        matches!(self, Mode::Qv)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDepths
{
    pub state_tree_depth: usize,

    /// Log2 of the number of ballots tallied per batch.
    pub tally_processing_state_tree_depth: usize,

    pub vote_option_tree_depth: usize,

    pub message_tree_depth: usize,

    /// Log5 of the number of messages processed per batch.
    pub message_tree_sub_depth: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSizes
{
    pub message_batch_size: usize,
    pub tally_batch_size: usize,
}

impl BatchSizes
{
    pub fn from_depths(depths: &TreeDepths) -> Self
    {
        BatchSizes {
            message_batch_size: MESSAGE_TREE_ARITY.pow(depths.message_tree_sub_depth as u32),
            tally_batch_size: STATE_TREE_ARITY.pow(depths.tally_processing_state_tree_depth as u32),
        }
    }
}

/// One voting round: its message stream, the per-poll voter state and the
/// progress of processing and tallying.
#[derive(Clone, Debug)]
pub struct Poll
{
    pub(crate) poll_id: u64,
    pub(crate) poll_end_timestamp: u64,
    pub(crate) coordinator_keypair: Keypair,
    pub(crate) tree_depths: TreeDepths,
    pub(crate) batch_sizes: BatchSizes,
    pub(crate) vote_options: usize,
    pub(crate) max_vote_options: usize,
    pub(crate) mode: Mode,

    /// Published messages and the ephemeral keys they were encrypted to.
    pub(crate) messages: Vec<Message>,
    pub(crate) enc_public_keys: Vec<PublicKey>,
    pub(crate) message_aq: AccQueue,

    /// Running hash over every published message.
    pub(crate) chain_hash: Fr,
    /// Chain hash at each closed batch boundary, starting with the initial value.
    pub(crate) batch_hashes: Vec<Fr>,

    /// Signup registry copied when the poll was updated.
    pub(crate) public_keys: Vec<PublicKey>,
    pub(crate) num_signups: u64,

    pub(crate) state_leaves: Vec<StateLeaf>,
    pub(crate) nullifiers: HashSet<Fr>,
    pub(crate) state_tree: IncrementalQuinTree,
    pub(crate) ballots: Vec<Ballot>,
    pub(crate) ballot_tree: IncrementalQuinTree,
    pub(crate) empty_ballot: Ballot,
    pub(crate) empty_ballot_hash: Fr,
    pub(crate) state_copied: bool,

    pub(crate) num_batches_processed: usize,
    pub(crate) current_message_batch_index: Option<usize>,
    /// State/ballot commitment salts keyed by message batch start index.
    pub(crate) sb_salts: BTreeMap<usize, Fr>,

    pub(crate) results_root_salts: BTreeMap<usize, Fr>,
    pub(crate) per_vo_spent_voice_credits_root_salts: BTreeMap<usize, Fr>,
    pub(crate) spent_voice_credit_subtotal_salts: BTreeMap<usize, Fr>,
    pub(crate) tally_result: Vec<u128>,
    pub(crate) per_vo_spent_voice_credits: Vec<u128>,
    pub(crate) total_spent_voice_credits: u128,
    pub(crate) num_batches_tallied: usize,
}

impl Poll
{
    pub fn new(
        poll_id: u64,
        poll_end_timestamp: u64,
        coordinator_keypair: Keypair,
        tree_depths: TreeDepths,
        vote_options: usize,
        mode: Mode,
    ) -> Result<Self, CoreError>
    {
        let max_vote_options = VOTE_OPTION_TREE_ARITY.pow(tree_depths.vote_option_tree_depth as u32);
        if vote_options > max_vote_options
        {
            Err(CoreError::InvalidVoteOptions { given: vote_options as u64, max: max_vote_options as u64 })?
        }

        let batch_sizes = BatchSizes::from_depths(&tree_depths);

        let message_aq = AccQueue::new(
            tree_depths.message_tree_sub_depth,
            MESSAGE_TREE_ARITY,
            NOTHING_UP_MY_SLEEVE,
            tree_depths.message_tree_depth,
        )?;

        let blank_leaf = StateLeaf::blank();
        let mut state_tree = IncrementalQuinTree::new(tree_depths.state_tree_depth, blank_leaf.hash()?, STATE_TREE_ARITY)?;
        state_tree.insert(blank_leaf.hash()?)?;

        let empty_ballot = Ballot::new(max_vote_options, tree_depths.vote_option_tree_depth);
        let empty_ballot_hash = empty_ballot.hash()?;
        let mut ballot_tree = IncrementalQuinTree::new(tree_depths.state_tree_depth, empty_ballot_hash, STATE_TREE_ARITY)?;
        ballot_tree.insert(empty_ballot_hash)?;

        Ok(Poll {
            poll_id,
            poll_end_timestamp,
            coordinator_keypair,
            tree_depths,
            batch_sizes,
            vote_options,
            max_vote_options,
            mode,
            messages: Vec::new(),
            enc_public_keys: Vec::new(),
            message_aq,
            chain_hash: NOTHING_UP_MY_SLEEVE,
            batch_hashes: vec![NOTHING_UP_MY_SLEEVE],
            public_keys: Vec::new(),
            num_signups: 0,
            state_leaves: vec![blank_leaf],
            nullifiers: HashSet::new(),
            state_tree,
            ballots: vec![empty_ballot.clone()],
            ballot_tree,
            empty_ballot,
            empty_ballot_hash,
            state_copied: false,
            num_batches_processed: 0,
            current_message_batch_index: None,
            sb_salts: BTreeMap::new(),
            results_root_salts: BTreeMap::new(),
            per_vo_spent_voice_credits_root_salts: BTreeMap::new(),
            spent_voice_credit_subtotal_salts: BTreeMap::new(),
            tally_result: vec![0; max_vote_options],
            per_vo_spent_voice_credits: vec![0; max_vote_options],
            total_spent_voice_credits: 0,
            num_batches_tallied: 0,
        })
    }

    pub fn poll_id(&self) -> u64
    {
        self.poll_id
    }

    pub fn poll_end_timestamp(&self) -> u64
    {
        self.poll_end_timestamp
    }

    pub fn coordinator_keypair(&self) -> &Keypair
    {
        &self.coordinator_keypair
    }

    pub fn tree_depths(&self) -> &TreeDepths
    {
        &self.tree_depths
    }

    pub fn batch_sizes(&self) -> &BatchSizes
    {
        &self.batch_sizes
    }

    pub fn mode(&self) -> Mode
    {
        self.mode
    }

    pub fn vote_options(&self) -> usize
    {
        self.vote_options
    }

    pub fn max_vote_options(&self) -> usize
    {
        self.max_vote_options
    }

    pub fn messages(&self) -> &[Message]
    {
        &self.messages
    }

    pub fn enc_public_keys(&self) -> &[PublicKey]
    {
        &self.enc_public_keys
    }

    pub fn chain_hash(&self) -> Fr
    {
        self.chain_hash
    }

    pub fn batch_hashes(&self) -> &[Fr]
    {
        &self.batch_hashes
    }

    pub fn state_leaves(&self) -> &[StateLeaf]
    {
        &self.state_leaves
    }

    pub fn ballots(&self) -> &[Ballot]
    {
        &self.ballots
    }

    pub fn state_root(&self) -> Fr
    {
        self.state_tree.root()
    }

    pub fn ballot_root(&self) -> Fr
    {
        self.ballot_tree.root()
    }

    pub fn num_signups(&self) -> u64
    {
        self.num_signups
    }

    pub fn tally_result(&self) -> &[u128]
    {
        &self.tally_result
    }

    pub fn per_vo_spent_voice_credits(&self) -> &[u128]
    {
        &self.per_vo_spent_voice_credits
    }

    pub fn total_spent_voice_credits(&self) -> u128
    {
        self.total_spent_voice_credits
    }

    /// Appends an encrypted message. Messages are opaque here; they are only
    /// decrypted when processed. Field elements are reduced by construction,
    /// out of range event values are rejected when decoding.
    pub fn publish_message(&mut self, message: Message, enc_public_key: PublicKey) -> Result<(), CoreError>
    {
        let leaf = message.hash(&enc_public_key)?;
        self.message_aq.enqueue(leaf)?;

        self.messages.push(message);
        self.enc_public_keys.push(enc_public_key);

        self.chain_hash = hash2([self.chain_hash, leaf])?;
        if self.messages.len() % self.batch_sizes.message_batch_size == 0
        {
            self.batch_hashes.push(self.chain_hash);
        }

        Ok(())
    }

    /// Closes a partially filled last batch. Closing twice is a no-op.
    pub fn pad_last_batch(&mut self)
    {
        if self.messages.len() % self.batch_sizes.message_batch_size != 0
            && self.batch_hashes.last() != Some(&self.chain_hash)
        {
            self.batch_hashes.push(self.chain_hash);
        }
    }

    pub fn has_joined(&self, nullifier: &Fr) -> bool
    {
        self.nullifiers.contains(nullifier)
    }

    /// Admits a voter under a fresh poll key and returns their state index.
    pub fn join_poll(
        &mut self,
        nullifier: Fr,
        public_key: PublicKey,
        voice_credit_balance: u128,
        timestamp: u64,
    ) -> Result<usize, CoreError>
    {
        if self.has_joined(&nullifier) { Err(CoreError::UserAlreadyJoined(to_decimal(&nullifier)))? }

        let leaf = StateLeaf::new(public_key, voice_credit_balance, timestamp);
        self.state_tree.insert(leaf.hash()?)?;
        self.nullifiers.insert(nullifier);
        self.state_leaves.push(leaf);

        debug!(poll_id = self.poll_id, index = self.state_leaves.len() - 1, "voter joined poll");
        Ok(self.state_leaves.len() - 1)
    }

    /// Snapshots the first `num_signups` registered keys and prepares one
    /// ballot per poll state leaf.
    pub fn update_poll(&mut self, registry: &[PublicKey], num_signups: u64) -> Result<(), CoreError>
    {
        let Some(public_keys) = registry.get(..num_signups as usize) else {
            return Err(CoreError::RegistryTooSmall { available: registry.len(), requested: num_signups as usize });
        };

        self.public_keys = public_keys.to_vec();
        self.num_signups = num_signups;
        self.copy_state()
    }

    pub(crate) fn copy_state(&mut self) -> Result<(), CoreError>
    {
        let mut state_tree = IncrementalQuinTree::new(
            self.tree_depths.state_tree_depth,
            StateLeaf::blank().hash()?,
            STATE_TREE_ARITY,
        )?;
        for leaf in &self.state_leaves
        {
            state_tree.insert(leaf.hash()?)?;
        }

        let mut ballot_tree = IncrementalQuinTree::new(
            self.tree_depths.state_tree_depth,
            self.empty_ballot_hash,
            STATE_TREE_ARITY,
        )?;
        for ballot in &self.ballots
        {
            ballot_tree.insert(ballot.hash()?)?;
        }
        while self.ballots.len() < self.state_leaves.len()
        {
            ballot_tree.insert(self.empty_ballot_hash)?;
            self.ballots.push(self.empty_ballot.clone());
        }

        self.state_tree = state_tree;
        self.ballot_tree = ballot_tree;
        self.state_copied = true;
        Ok(())
    }

    /// Hash of the state root, ballot root and salt.
    pub(crate) fn sb_commitment(&self, salt: Fr) -> Result<Fr, CoreError>
    {
        Ok(crate::hash::hash3([self.state_tree.root(), self.ballot_tree.root(), salt])?)
    }

    /// The salt of the latest state/ballot commitment.
    pub(crate) fn current_sb_salt(&self) -> Fr
    {
        self.current_message_batch_index
            .and_then(|index| self.sb_salts.get(&index).copied())
            .unwrap_or(Fr::zero())
    }
}
