use ark_bn254::Fr;
use ark_ff::Zero;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

use crate::crypto::{random_salt, Keypair};
use crate::domain::{pack_values, Ballot, Message, PCommand, StateLeaf, PAD_KEY};
use crate::error::{CoreError, ProcessMessageError};
use crate::hash::sha256_hash;
use crate::poll::{Mode, Poll};

/// Witness for one batch of the message processing circuit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessagesInputs
{
    #[serde(with = "crate::field::decimal")]
    pub poll_end_timestamp: Fr,
    /// `voteOptions | numSignups << 50 | batchStart << 100 | batchEnd << 150`.
    #[serde(with = "crate::field::decimal")]
    pub packed_vals: Fr,
    #[serde(with = "crate::field::decimal")]
    pub msg_root: Fr,
    #[serde(with = "crate::field::decimal")]
    pub input_batch_hash: Fr,
    #[serde(with = "crate::field::decimal")]
    pub output_batch_hash: Fr,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub msgs: Vec<Vec<Fr>>,
    #[serde(with = "crate::field::decimal")]
    pub coord_priv_key: Fr,
    #[serde(with = "crate::field::decimal_vec")]
    pub coord_pub_key: Vec<Fr>,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub enc_pub_keys: Vec<Vec<Fr>>,
    #[serde(with = "crate::field::decimal")]
    pub current_state_root: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_ballot_root: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_sb_commitment: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_sb_salt: Fr,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub current_state_leaves: Vec<Vec<Fr>>,
    #[serde(serialize_with = "crate::field::decimal_cube::serialize")]
    pub current_state_leaves_path_elements: Vec<Vec<Vec<Fr>>>,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub current_ballots: Vec<Vec<Fr>>,
    #[serde(serialize_with = "crate::field::decimal_cube::serialize")]
    pub current_ballots_path_elements: Vec<Vec<Vec<Fr>>>,
    #[serde(with = "crate::field::decimal_vec")]
    pub current_vote_weights: Vec<Fr>,
    #[serde(serialize_with = "crate::field::decimal_cube::serialize")]
    pub current_vote_weights_path_elements: Vec<Vec<Vec<Fr>>>,
    #[serde(with = "crate::field::decimal")]
    pub new_sb_salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub new_sb_commitment: Fr,
    #[serde(with = "crate::field::decimal")]
    pub input_hash: Fr,
}

/// Outcome of one call to [`Poll::process_messages`].
#[derive(Clone, Debug)]
pub struct ProcessedBatch
{
    pub circuit_inputs: ProcessMessagesInputs,

    /// Index of the first message in the batch.
    pub batch_start_index: usize,

    /// Messages that had no effect, with the reason.
    pub no_ops: Vec<(usize, ProcessMessageError)>,
}

/// A state transition produced by one valid message.
struct MessageUpdate
{
    state_index: usize,
    vote_option_index: usize,
    new_state_leaf: StateLeaf,
    new_ballot: Ballot,
}

/// Pre-transition view of the leaf a message touches, as the circuit sees it.
struct SlotWitness
{
    state_leaf: [Fr; 4],
    state_leaf_path: Vec<Vec<Fr>>,
    ballot: [Fr; 2],
    ballot_path: Vec<Vec<Fr>>,
    vote_weight: Fr,
    vote_weight_path: Vec<Vec<Fr>>,
}

impl Poll
{
    /// Total number of message batches, counting an empty message list as one batch.
    pub fn total_message_batches(&self) -> usize
    {
        let batch_size = self.batch_sizes.message_batch_size;
        let length = self.messages.len();

        if length <= batch_size { 1 } else { length.div_ceil(batch_size) }
    }

    pub fn has_unprocessed_messages(&self) -> bool
    {
        self.num_batches_processed < self.total_message_batches()
    }

    pub fn num_batches_processed(&self) -> usize
    {
        self.num_batches_processed
    }

    /// Processes the next batch of messages. Batches are taken newest first;
    /// within a batch messages apply in publication order.
    ///
    /// The batch is atomic: on error the poll is left exactly as it was.
    pub fn process_messages<R: RngCore + ?Sized>(&mut self, now: u64, rng: &mut R) -> Result<ProcessedBatch, CoreError>
    {
        if !self.has_unprocessed_messages() { Err(CoreError::NoMoreMessages)? }
        if now < self.poll_end_timestamp
        {
            Err(CoreError::VotingPeriodNotOver { end: self.poll_end_timestamp, now })?
        }

        let snapshot = self.clone();
        match self.process_batch(rng)
        {
            Ok(batch) => Ok(batch),
            Err(error) =>
            {
                *self = snapshot;
                Err(error)
            }
        }
    }

    /// Processes every remaining batch.
    pub fn process_all_messages<R: RngCore + ?Sized>(&mut self, now: u64, rng: &mut R) -> Result<Vec<ProcessedBatch>, CoreError>
    {
        let mut batches = Vec::with_capacity(self.total_message_batches());
        while self.has_unprocessed_messages()
        {
            batches.push(self.process_messages(now, rng)?);
        }
        Ok(batches)
    }

    fn process_batch<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<ProcessedBatch, CoreError>
    {
        if !self.state_copied { self.copy_state()?; }

        let batch_size = self.batch_sizes.message_batch_size;

        if self.num_batches_processed == 0
        {
            let length = self.messages.len();
            let remainder = length % batch_size;
            let start = if remainder == 0 { length.saturating_sub(batch_size) } else { length - remainder };

            self.current_message_batch_index = Some(start);
            self.sb_salts.insert(start, Fr::zero());

            if !self.message_aq.has_root(self.tree_depths.message_tree_depth)
            {
                self.message_aq.merge_sub_roots(0)?;
                self.message_aq.merge(self.tree_depths.message_tree_depth)?;
            }
        }

        let Some(index) = self.current_message_batch_index else {
            return Err(CoreError::NoMoreMessages);
        };

        let Some(msg_root) = self.message_aq.get_root(self.tree_depths.message_tree_depth) else {
            return Err(CoreError::SubtreesNotMerged);
        };

        let current_state_root = self.state_tree.root();
        let current_ballot_root = self.ballot_tree.root();
        let current_sb_salt = self.current_sb_salt();
        let current_sb_commitment = self.sb_commitment(current_sb_salt)?;

        let batch_end_index = (index + batch_size).min(self.messages.len());
        let packed_vals = pack_values(&[
            self.vote_options as u64,
            self.num_signups,
            index as u64,
            batch_end_index as u64,
        ]);

        let batch_number = index / batch_size;
        let input_batch_hash = self.batch_hashes.get(batch_number).copied().unwrap_or(self.chain_hash);
        let output_batch_hash = self.batch_hashes.get(batch_number + 1).copied().unwrap_or(self.chain_hash);

        let last_message = self.messages.last().copied().unwrap_or_else(Message::padding);
        let last_key = self.enc_public_keys.last().copied().unwrap_or(PAD_KEY);

        let mut msgs = Vec::with_capacity(batch_size);
        let mut enc_pub_keys = Vec::with_capacity(batch_size);
        let mut witnesses = Vec::with_capacity(batch_size);
        let mut no_ops = Vec::new();

        for position in index..index + batch_size
        {
            let message = self.messages.get(position).copied().unwrap_or(last_message);
            let key = self.enc_public_keys.get(position).copied().unwrap_or(last_key);
            msgs.push(message.as_circuit_inputs());
            enc_pub_keys.push(key.as_array().to_vec());

            if position >= self.messages.len()
            {
                witnesses.push(self.blank_witness()?);
                continue;
            }

            match self.process_message(position)
            {
                Ok(update) =>
                {
                    witnesses.push(self.witness(update.state_index, update.vote_option_index)?);
                    self.apply(update)?;
                }
                Err(reason) =>
                {
                    debug!(poll_id = self.poll_id, message = position, %reason, "message had no effect");
                    no_ops.push((position, reason));
                    witnesses.push(self.blank_witness()?);
                }
            }
        }

        self.num_batches_processed += 1;
        let next_index = index.saturating_sub(batch_size);
        self.current_message_batch_index = Some(next_index);

        let new_sb_salt = random_salt(rng);
        self.sb_salts.insert(next_index, new_sb_salt);
        let new_sb_commitment = self.sb_commitment(new_sb_salt)?;

        let poll_end_timestamp = Fr::from(self.poll_end_timestamp);
        let input_hash = sha256_hash(&[
            packed_vals,
            self.coordinator_keypair.public_key.hash()?,
            msg_root,
            current_sb_commitment,
            new_sb_commitment,
            poll_end_timestamp,
        ]);

        info!(
            poll_id = self.poll_id,
            batch = self.num_batches_processed,
            total = self.total_message_batches(),
            no_ops = no_ops.len(),
            "processed message batch"
        );

        let circuit_inputs = ProcessMessagesInputs {
            poll_end_timestamp,
            packed_vals,
            msg_root,
            input_batch_hash,
            output_batch_hash,
            msgs,
            coord_priv_key: self.coordinator_keypair.private_key.formatted_field(),
            coord_pub_key: self.coordinator_keypair.public_key.as_array().to_vec(),
            enc_pub_keys,
            current_state_root,
            current_ballot_root,
            current_sb_commitment,
            current_sb_salt,
            current_state_leaves: witnesses.iter().map(|w| w.state_leaf.to_vec()).collect(),
            current_state_leaves_path_elements: witnesses.iter().map(|w| w.state_leaf_path.clone()).collect(),
            current_ballots: witnesses.iter().map(|w| w.ballot.to_vec()).collect(),
            current_ballots_path_elements: witnesses.iter().map(|w| w.ballot_path.clone()).collect(),
            current_vote_weights: witnesses.iter().map(|w| w.vote_weight).collect(),
            current_vote_weights_path_elements: witnesses.into_iter().map(|w| w.vote_weight_path).collect(),
            new_sb_salt,
            new_sb_commitment,
            input_hash,
        };

        Ok(ProcessedBatch {
            circuit_inputs,
            batch_start_index: index,
            no_ops,
        })
    }

    /// Validates one message against the current state without mutating it.
    fn process_message(&self, position: usize) -> Result<MessageUpdate, ProcessMessageError>
    {
        let message = &self.messages[position];
        let enc_public_key = &self.enc_public_keys[position];

        let shared_key = Keypair::gen_ecdh_shared_key(&self.coordinator_keypair.private_key, enc_public_key);
        let (command, signature) = PCommand::decrypt(message, &shared_key)
            .map_err(|_| ProcessMessageError::FailedDecryption)?;

        let state_index = command.state_index as usize;
        if state_index < 1 || state_index >= self.ballots.len() || state_index >= self.state_leaves.len()
        {
            Err(ProcessMessageError::InvalidStateLeafIndex)?
        }

        let state_leaf = &self.state_leaves[state_index];
        let ballot = &self.ballots[state_index];

        if !command.verify_signature(&signature, &state_leaf.public_key)
        {
            Err(ProcessMessageError::InvalidSignature)?
        }

        if ballot.nonce.checked_add(1) != Some(command.nonce) { Err(ProcessMessageError::InvalidNonce)? }

        let vote_option_index = command.vote_option_index as usize;
        if vote_option_index >= self.vote_options { Err(ProcessMessageError::InvalidVoteOptionIndex)? }

        let Some(&previous_weight) = ballot.votes.get(vote_option_index) else {
            return Err(ProcessMessageError::InvalidVoteOptionIndex);
        };
        let new_weight = command.new_vote_weight as u128;

        let available = state_leaf.voice_credit_balance.saturating_add(self.mode.cost(previous_weight));
        let Some(remaining) = available.checked_sub(self.mode.cost(new_weight)) else {
            return Err(ProcessMessageError::InsufficientVoiceCredits);
        };

        if self.mode == Mode::Full && new_weight != 0 && remaining != 0
        {
            Err(ProcessMessageError::InvalidVoteWeight)?
        }

        let mut new_ballot = ballot.clone();
        new_ballot.nonce += 1;
        new_ballot.votes[vote_option_index] = new_weight;

        let new_state_leaf = StateLeaf::new(command.new_public_key, remaining, state_leaf.timestamp);

        Ok(MessageUpdate { state_index, vote_option_index, new_state_leaf, new_ballot })
    }

    fn apply(&mut self, update: MessageUpdate) -> Result<(), CoreError>
    {
        let index = update.state_index;

        self.state_tree.update(index as u64, update.new_state_leaf.hash()?)?;
        self.state_leaves[index] = update.new_state_leaf;

        self.ballot_tree.update(index as u64, update.new_ballot.hash()?)?;
        self.ballots[index] = update.new_ballot;

        Ok(())
    }

    fn witness(&self, state_index: usize, vote_option_index: usize) -> Result<SlotWitness, CoreError>
    {
        let ballot = &self.ballots[state_index];
        let vote_tree = ballot.vote_tree()?;

        Ok(SlotWitness {
            state_leaf: self.state_leaves[state_index].as_circuit_inputs(),
            state_leaf_path: self.state_tree.gen_proof(state_index as u64)?.path_elements,
            ballot: ballot.as_circuit_inputs()?,
            ballot_path: self.ballot_tree.gen_proof(state_index as u64)?.path_elements,
            vote_weight: Fr::from(ballot.votes.get(vote_option_index).copied().unwrap_or(0)),
            vote_weight_path: vote_tree.gen_proof(vote_option_index as u64)?.path_elements,
        })
    }

    /// No-op slots point the circuit at the blank leaf and ballot at index 0.
    fn blank_witness(&self) -> Result<SlotWitness, CoreError>
    {
        self.witness(0, 0)
    }
}
