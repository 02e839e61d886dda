use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::{Keypair, PublicKey};
use crate::domain::{Ballot, Message, StateLeaf, PACKED_FIELD_LIMIT};
use crate::error::CoreError;
use crate::poll::{Mode, Poll, TreeDepths};
use crate::tree::{IncrementalQuinTree, STATE_TREE_ARITY, VOTE_OPTION_TREE_ARITY};

/// Everything needed to resume a poll: its parameters, the published
/// messages, the voter state and the processing and tally progress.
///
/// Trees, the message queue and the chain hash are rebuilt on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot
{
    pub poll_id: u64,
    pub poll_end_timestamp: u64,
    pub coordinator_keypair: Keypair,
    pub tree_depths: TreeDepths,
    pub vote_options: usize,
    pub mode: Mode,

    pub messages: Vec<Message>,
    pub enc_public_keys: Vec<PublicKey>,

    pub public_keys: Vec<PublicKey>,
    pub num_signups: u64,
    pub state_leaves: Vec<StateLeaf>,
    #[serde(with = "crate::field::decimal_vec")]
    pub nullifiers: Vec<Fr>,
    pub ballots: Vec<Ballot>,
    pub state_copied: bool,

    pub num_batches_processed: usize,
    pub current_message_batch_index: Option<usize>,
    #[serde(with = "crate::field::decimal_map")]
    pub sb_salts: BTreeMap<usize, Fr>,

    #[serde(with = "crate::field::string_u128_vec")]
    pub results: Vec<u128>,
    #[serde(with = "crate::field::string_u128_vec")]
    pub per_vo_spent_voice_credits: Vec<u128>,
    #[serde(with = "crate::field::string_u128")]
    pub total_spent_voice_credits: u128,
    pub num_batches_tallied: usize,
    #[serde(with = "crate::field::decimal_map")]
    pub results_root_salts: BTreeMap<usize, Fr>,
    #[serde(with = "crate::field::decimal_map")]
    pub per_vo_spent_voice_credits_root_salts: BTreeMap<usize, Fr>,
    #[serde(with = "crate::field::decimal_map")]
    pub spent_voice_credit_subtotal_salts: BTreeMap<usize, Fr>,
}

impl PollSnapshot
{
    /// Rejects snapshots whose parts disagree with each other or with the
    /// poll parameters they carry.
    pub fn validate(&self) -> Result<(), CoreError>
    {
        if self.messages.len() != self.enc_public_keys.len()
        {
            Err(CoreError::InvalidSnapshot(format!(
                "{} messages but {} encryption keys",
                self.messages.len(),
                self.enc_public_keys.len()
            )))?
        }

        if self.state_leaves.is_empty() || self.ballots.is_empty()
        {
            Err(CoreError::InvalidSnapshot("missing the blank state leaf or ballot".to_string()))?
        }

        let ballots_match = if self.state_copied
        {
            self.ballots.len() == self.state_leaves.len()
        }
        else
        {
            self.ballots.len() <= self.state_leaves.len()
        };
        if !ballots_match
        {
            Err(CoreError::InvalidSnapshot(format!(
                "{} ballots for {} state leaves",
                self.ballots.len(),
                self.state_leaves.len()
            )))?
        }

        let max_vote_options = VOTE_OPTION_TREE_ARITY.pow(self.tree_depths.vote_option_tree_depth as u32);
        for (index, ballot) in self.ballots.iter().enumerate()
        {
            if ballot.votes.len() != max_vote_options
                || ballot.vote_option_tree_depth != self.tree_depths.vote_option_tree_depth
            {
                Err(CoreError::InvalidSnapshot(format!("ballot {index} does not fit {max_vote_options} vote options")))?
            }
            if ballot.nonce >= PACKED_FIELD_LIMIT || ballot.votes.iter().any(|vote| *vote >= PACKED_FIELD_LIMIT as u128)
            {
                Err(CoreError::InvalidSnapshot(format!("ballot {index} holds an out of range nonce or weight")))?
            }
        }

        if self.results.len() != max_vote_options || self.per_vo_spent_voice_credits.len() != max_vote_options
        {
            Err(CoreError::InvalidSnapshot(format!("tally does not fit {max_vote_options} vote options")))?
        }

        Ok(())
    }
}

impl Poll
{
    pub fn to_snapshot(&self) -> PollSnapshot
    {
        let mut nullifiers: Vec<Fr> = self.nullifiers.iter().copied().collect();
        nullifiers.sort();

        PollSnapshot {
            poll_id: self.poll_id,
            poll_end_timestamp: self.poll_end_timestamp,
            coordinator_keypair: self.coordinator_keypair.clone(),
            tree_depths: self.tree_depths,
            vote_options: self.vote_options,
            mode: self.mode,
            messages: self.messages.clone(),
            enc_public_keys: self.enc_public_keys.clone(),
            public_keys: self.public_keys.clone(),
            num_signups: self.num_signups,
            state_leaves: self.state_leaves.clone(),
            nullifiers,
            ballots: self.ballots.clone(),
            state_copied: self.state_copied,
            num_batches_processed: self.num_batches_processed,
            current_message_batch_index: self.current_message_batch_index,
            sb_salts: self.sb_salts.clone(),
            results: self.tally_result.clone(),
            per_vo_spent_voice_credits: self.per_vo_spent_voice_credits.clone(),
            total_spent_voice_credits: self.total_spent_voice_credits,
            num_batches_tallied: self.num_batches_tallied,
            results_root_salts: self.results_root_salts.clone(),
            per_vo_spent_voice_credits_root_salts: self.per_vo_spent_voice_credits_root_salts.clone(),
            spent_voice_credit_subtotal_salts: self.spent_voice_credit_subtotal_salts.clone(),
        }
    }

    pub fn from_snapshot(snapshot: PollSnapshot) -> Result<Self, CoreError>
    {
        snapshot.validate()?;

        let mut poll = Poll::new(
            snapshot.poll_id,
            snapshot.poll_end_timestamp,
            snapshot.coordinator_keypair,
            snapshot.tree_depths,
            snapshot.vote_options,
            snapshot.mode,
        )?;

        for (message, enc_public_key) in snapshot.messages.into_iter().zip(snapshot.enc_public_keys)
        {
            poll.publish_message(message, enc_public_key)?;
        }

        let state_leaf_hashes = snapshot
            .state_leaves
            .iter()
            .map(StateLeaf::hash)
            .collect::<Result<Vec<_>, _>>()?;
        let ballot_hashes = snapshot
            .ballots
            .iter()
            .map(Ballot::hash)
            .collect::<Result<Vec<_>, _>>()?;

        let depth = poll.tree_depths.state_tree_depth;
        poll.state_tree = IncrementalQuinTree::from_leaves(depth, StateLeaf::blank().hash()?, STATE_TREE_ARITY, &state_leaf_hashes)?;
        poll.ballot_tree = IncrementalQuinTree::from_leaves(depth, poll.empty_ballot_hash, STATE_TREE_ARITY, &ballot_hashes)?;

        poll.public_keys = snapshot.public_keys;
        poll.num_signups = snapshot.num_signups;
        poll.state_leaves = snapshot.state_leaves;
        poll.nullifiers = snapshot.nullifiers.into_iter().collect();
        poll.ballots = snapshot.ballots;
        poll.state_copied = snapshot.state_copied;

        poll.num_batches_processed = snapshot.num_batches_processed;
        poll.current_message_batch_index = snapshot.current_message_batch_index;
        poll.sb_salts = snapshot.sb_salts;
        if poll.num_batches_processed > 0
        {
            poll.message_aq.merge_sub_roots(0)?;
            poll.message_aq.merge(poll.tree_depths.message_tree_depth)?;
        }

        poll.tally_result = snapshot.results;
        poll.per_vo_spent_voice_credits = snapshot.per_vo_spent_voice_credits;
        poll.total_spent_voice_credits = snapshot.total_spent_voice_credits;
        poll.num_batches_tallied = snapshot.num_batches_tallied;
        poll.results_root_salts = snapshot.results_root_salts;
        poll.per_vo_spent_voice_credits_root_salts = snapshot.per_vo_spent_voice_credits_root_salts;
        poll.spent_voice_credit_subtotal_salts = snapshot.spent_voice_credit_subtotal_salts;

        Ok(poll)
    }

    /// Writes the poll state as pretty printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CoreError>
    {
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        fs::write(path.as_ref(), json)?;
        info!(poll_id = self.poll_id, path = %path.as_ref().display(), "saved poll state");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError>
    {
        let json = fs::read_to_string(path.as_ref())?;
        let snapshot: PollSnapshot = serde_json::from_str(&json)?;
        Poll::from_snapshot(snapshot)
    }
}
