use ark_bn254::Fr;
use ark_ff::Zero;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::random_salt;
use crate::domain::{pack_values, Ballot};
use crate::error::CoreError;
use crate::hash::{hash3, hash_left_right, sha256_hash};
use crate::poll::{Mode, Poll};
use crate::tree::{verify_proof, IncrementalQuinTree, MerkleProof, VOTE_OPTION_TREE_ARITY};

/// Witness for one batch of the tally circuit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyInputs
{
    #[serde(with = "crate::field::decimal")]
    pub state_root: Fr,
    #[serde(with = "crate::field::decimal")]
    pub ballot_root: Fr,
    #[serde(with = "crate::field::decimal")]
    pub sb_salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub sb_commitment: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_tally_commitment: Fr,
    #[serde(with = "crate::field::decimal")]
    pub new_tally_commitment: Fr,
    /// `batchStart / batchSize | numSignups << 50`.
    #[serde(with = "crate::field::decimal")]
    pub packed_vals: Fr,
    #[serde(with = "crate::field::decimal")]
    pub input_hash: Fr,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub ballots: Vec<Vec<Fr>>,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub ballot_path_elements: Vec<Vec<Fr>>,
    #[serde(serialize_with = "crate::field::decimal_matrix::serialize")]
    pub votes: Vec<Vec<Fr>>,
    #[serde(with = "crate::field::decimal_vec")]
    pub current_results: Vec<Fr>,
    #[serde(with = "crate::field::decimal")]
    pub current_results_root_salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_spent_voice_credit_subtotal: Fr,
    #[serde(with = "crate::field::decimal")]
    pub current_spent_voice_credit_subtotal_salt: Fr,
    #[serde(rename = "currentPerVOSpentVoiceCredits", with = "crate::field::decimal_vec")]
    pub current_per_vo_spent_voice_credits: Vec<Fr>,
    #[serde(rename = "currentPerVOSpentVoiceCreditsRootSalt", with = "crate::field::decimal")]
    pub current_per_vo_spent_voice_credits_root_salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub new_results_root_salt: Fr,
    #[serde(rename = "newPerVOSpentVoiceCreditsRootSalt", with = "crate::field::decimal")]
    pub new_per_vo_spent_voice_credits_root_salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub new_spent_voice_credit_subtotal_salt: Fr,
}

/// Proof that `tally` is the result for `vote_option_index`, checkable
/// against the published results commitment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultProof
{
    pub vote_option_index: usize,
    #[serde(with = "crate::field::string_u128")]
    pub tally: u128,
    pub proof: MerkleProof,
    #[serde(with = "crate::field::decimal")]
    pub salt: Fr,
}

impl ResultProof
{
    /// Checks the path and that `hashLeftRight(root, salt)` equals `commitment`.
    pub fn verify(&self, commitment: Fr) -> Result<bool, CoreError>
    {
        if self.proof.leaf != Fr::from(self.tally) { return Ok(false); }
        if !verify_proof(&self.proof)? { return Ok(false); }
        Ok(hash_left_right(self.proof.root, self.salt)? == commitment)
    }
}

/// Final commitments over a fully tallied poll, with the salts that open them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TallyCommitments
{
    pub results_salt: Fr,
    pub results_commitment: Fr,
    pub spent_salt: Fr,
    pub spent_commitment: Fr,
    /// Only present in quadratic mode.
    pub per_vo_spent: Option<(Fr, Fr)>,
    pub tally_commitment: Fr,
}

/// `hashLeftRight(root, salt)` over a vote option tree holding `values`.
pub fn gen_tree_commitment(values: &[u128], depth: usize, salt: Fr) -> Result<Fr, CoreError>
{
    let leaves: Vec<Fr> = values.iter().map(|value| Fr::from(*value)).collect();
    let tree = IncrementalQuinTree::from_leaves(depth, Fr::zero(), VOTE_OPTION_TREE_ARITY, &leaves)?;
    Ok(hash_left_right(tree.root(), salt)?)
}

pub fn gen_spent_commitment(spent: u128, salt: Fr) -> Result<Fr, CoreError>
{
    Ok(hash_left_right(Fr::from(spent), salt)?)
}

/// Combines the partial commitments the way the tally circuit of `mode` does.
pub fn gen_tally_commitment(mode: Mode, results: Fr, spent: Fr, per_vo_spent: Fr) -> Result<Fr, CoreError>
{
    if mode.is_quadratic()
    {
        Ok(hash3([results, spent, per_vo_spent])?)
    }
    else
    {
        Ok(hash_left_right(results, spent)?)
    }
}

impl Poll
{
    pub fn has_untallied_ballots(&self) -> bool
    {
        self.num_batches_tallied * self.batch_sizes.tally_batch_size < self.ballots.len()
    }

    pub fn num_batches_tallied(&self) -> usize
    {
        self.num_batches_tallied
    }

    pub fn total_tally_batches(&self) -> usize
    {
        self.ballots.len().div_ceil(self.batch_sizes.tally_batch_size)
    }

    /// Tallies the next batch of ballots, in ballot index order.
    pub fn tally_votes<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<TallyInputs, CoreError>
    {
        if self.has_unprocessed_messages() { Err(CoreError::ProcessingNotComplete)? }
        if !self.has_untallied_ballots() { Err(CoreError::AllBallotsTallied)? }

        let batch_size = self.batch_sizes.tally_batch_size;
        let batch_start = self.num_batches_tallied * batch_size;
        let depth = self.tree_depths.vote_option_tree_depth;

        let previous = batch_start.checked_sub(batch_size);
        let salt_at = |salts: &std::collections::BTreeMap<usize, Fr>| {
            previous.and_then(|index| salts.get(&index).copied()).unwrap_or(Fr::zero())
        };
        let current_results_root_salt = salt_at(&self.results_root_salts);
        let current_per_vo_salt = salt_at(&self.per_vo_spent_voice_credits_root_salts);
        let current_spent_salt = salt_at(&self.spent_voice_credit_subtotal_salts);

        let current_tally_commitment = if batch_start == 0
        {
            Fr::zero()
        }
        else
        {
            self.tally_commitment_with(current_results_root_salt, current_spent_salt, current_per_vo_salt)?
        };

        let mut results = self.tally_result.clone();
        let mut per_vo_spent = self.per_vo_spent_voice_credits.clone();
        let mut total_spent = self.total_spent_voice_credits;

        let batch_end = (batch_start + batch_size).min(self.ballots.len());
        let mut ballots: Vec<&Ballot> = Vec::with_capacity(batch_size);
        for ballot in &self.ballots[batch_start..batch_end]
        {
            for (option, vote) in ballot.votes.iter().enumerate().take(self.max_vote_options)
            {
                let spent = self.mode.cost(*vote);
                results[option] += vote;
                per_vo_spent[option] += spent;
                total_spent += spent;
            }
            ballots.push(ballot);
        }
        while ballots.len() < batch_size
        {
            ballots.push(&self.empty_ballot);
        }

        let new_results_root_salt = random_salt(rng);
        let new_per_vo_salt = random_salt(rng);
        let new_spent_salt = random_salt(rng);

        let results_commitment = gen_tree_commitment(&results, depth, new_results_root_salt)?;
        let spent_commitment = gen_spent_commitment(total_spent, new_spent_salt)?;
        let per_vo_commitment = gen_tree_commitment(&per_vo_spent, depth, new_per_vo_salt)?;
        let new_tally_commitment =
            gen_tally_commitment(self.mode, results_commitment, spent_commitment, per_vo_commitment)?;

        let state_root = self.state_tree.root();
        let ballot_root = self.ballot_tree.root();
        let sb_salt = self.current_sb_salt();
        let sb_commitment = self.sb_commitment(sb_salt)?;

        let packed_vals = pack_values(&[(batch_start / batch_size) as u64, self.num_signups]);
        let input_hash = sha256_hash(&[packed_vals, sb_commitment, current_tally_commitment, new_tally_commitment]);

        let ballot_subroot_proof = self
            .ballot_tree
            .gen_subroot_proof(batch_start as u64, (batch_start + batch_size) as u64)?;

        let ballot_inputs = ballots
            .iter()
            .map(|ballot| ballot.as_circuit_inputs().map(|inputs| inputs.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        let votes = ballots
            .iter()
            .map(|ballot| ballot.votes.iter().map(|vote| Fr::from(*vote)).collect())
            .collect();

        let inputs = TallyInputs {
            state_root,
            ballot_root,
            sb_salt,
            sb_commitment,
            current_tally_commitment,
            new_tally_commitment,
            packed_vals,
            input_hash,
            ballots: ballot_inputs,
            ballot_path_elements: ballot_subroot_proof.path_elements,
            votes,
            current_results: self.tally_result.iter().map(|value| Fr::from(*value)).collect(),
            current_results_root_salt,
            current_spent_voice_credit_subtotal: Fr::from(self.total_spent_voice_credits),
            current_spent_voice_credit_subtotal_salt: current_spent_salt,
            current_per_vo_spent_voice_credits: self.per_vo_spent_voice_credits.iter().map(|value| Fr::from(*value)).collect(),
            current_per_vo_spent_voice_credits_root_salt: current_per_vo_salt,
            new_results_root_salt,
            new_per_vo_spent_voice_credits_root_salt: new_per_vo_salt,
            new_spent_voice_credit_subtotal_salt: new_spent_salt,
        };

        self.tally_result = results;
        self.per_vo_spent_voice_credits = per_vo_spent;
        self.total_spent_voice_credits = total_spent;
        self.results_root_salts.insert(batch_start, new_results_root_salt);
        self.per_vo_spent_voice_credits_root_salts.insert(batch_start, new_per_vo_salt);
        self.spent_voice_credit_subtotal_salts.insert(batch_start, new_spent_salt);
        self.num_batches_tallied += 1;

        info!(
            poll_id = self.poll_id,
            batch = self.num_batches_tallied,
            total = self.total_tally_batches(),
            "tallied ballot batch"
        );

        Ok(inputs)
    }

    /// Tallies every remaining batch.
    pub fn tally_all_votes<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<TallyInputs>, CoreError>
    {
        let mut batches = Vec::with_capacity(self.total_tally_batches());
        while self.has_untallied_ballots()
        {
            batches.push(self.tally_votes(rng)?);
        }
        Ok(batches)
    }

    fn tally_commitment_with(&self, results_salt: Fr, spent_salt: Fr, per_vo_salt: Fr) -> Result<Fr, CoreError>
    {
        let depth = self.tree_depths.vote_option_tree_depth;
        gen_tally_commitment(
            self.mode,
            gen_tree_commitment(&self.tally_result, depth, results_salt)?,
            gen_spent_commitment(self.total_spent_voice_credits, spent_salt)?,
            gen_tree_commitment(&self.per_vo_spent_voice_credits, depth, per_vo_salt)?,
        )
    }

    /// Salts of the latest tally batch: results, spent subtotal, per option spent.
    fn final_tally_salts(&self) -> Result<(Fr, Fr, Fr), CoreError>
    {
        if self.has_untallied_ballots() || self.num_batches_tallied == 0 { Err(CoreError::TallyNotComplete)? }

        let last = (self.num_batches_tallied - 1) * self.batch_sizes.tally_batch_size;
        let lookup = |salts: &std::collections::BTreeMap<usize, Fr>| salts.get(&last).copied().unwrap_or(Fr::zero());

        Ok((
            lookup(&self.results_root_salts),
            lookup(&self.spent_voice_credit_subtotal_salts),
            lookup(&self.per_vo_spent_voice_credits_root_salts),
        ))
    }

    /// Commitments over the final tally. Fails until every ballot is tallied.
    pub fn tally_commitments(&self) -> Result<TallyCommitments, CoreError>
    {
        let (results_salt, spent_salt, per_vo_salt) = self.final_tally_salts()?;
        let depth = self.tree_depths.vote_option_tree_depth;

        let results_commitment = gen_tree_commitment(&self.tally_result, depth, results_salt)?;
        let spent_commitment = gen_spent_commitment(self.total_spent_voice_credits, spent_salt)?;
        let per_vo_commitment = gen_tree_commitment(&self.per_vo_spent_voice_credits, depth, per_vo_salt)?;
        let tally_commitment = gen_tally_commitment(self.mode, results_commitment, spent_commitment, per_vo_commitment)?;

        Ok(TallyCommitments {
            results_salt,
            results_commitment,
            spent_salt,
            spent_commitment,
            per_vo_spent: self.mode.is_quadratic().then_some((per_vo_salt, per_vo_commitment)),
            tally_commitment,
        })
    }

    /// Inclusion proof of one option's result in the final results tree.
    pub fn result_proof(&self, vote_option_index: usize) -> Result<ResultProof, CoreError>
    {
        if vote_option_index >= self.max_vote_options
        {
            Err(CoreError::VoteOptionOutOfRange { index: vote_option_index, max: self.max_vote_options })?
        }

        let (salt, _, _) = self.final_tally_salts()?;
        let leaves: Vec<Fr> = self.tally_result.iter().map(|value| Fr::from(*value)).collect();
        let tree = IncrementalQuinTree::from_leaves(
            self.tree_depths.vote_option_tree_depth,
            Fr::zero(),
            VOTE_OPTION_TREE_ARITY,
            &leaves,
        )?;

        Ok(ResultProof {
            vote_option_index,
            tally: self.tally_result[vote_option_index],
            proof: tree.gen_proof(vote_option_index as u64)?,
            salt,
        })
    }
}
