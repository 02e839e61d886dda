use std::fs;
use std::path::Path;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::poll::{gen_spent_commitment, gen_tally_commitment, gen_tree_commitment, Mode, Poll};

/// The published outcome of a poll, with the salts that open each commitment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyData
{
    pub maci: String,
    pub poll_id: String,
    pub is_quadratic: bool,
    #[serde(with = "crate::field::decimal")]
    pub new_tally_commitment: Fr,
    pub results: TallyResults,
    pub total_spent_voice_credits: SpentVoiceCredits,
    #[serde(rename = "perVOSpentVoiceCredits", default, skip_serializing_if = "Option::is_none")]
    pub per_vo_spent_voice_credits: Option<TallyResults>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TallyResults
{
    #[serde(with = "crate::field::string_u128_vec")]
    pub tally: Vec<u128>,
    #[serde(with = "crate::field::decimal")]
    pub salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub commitment: Fr,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpentVoiceCredits
{
    #[serde(with = "crate::field::string_u128")]
    pub spent: u128,
    #[serde(with = "crate::field::decimal")]
    pub salt: Fr,
    #[serde(with = "crate::field::decimal")]
    pub commitment: Fr,
}

impl TallyData
{
    /// Collects the final tally of a fully tallied poll.
    pub fn from_poll(maci: &str, poll: &Poll) -> Result<Self, CoreError>
    {
        let commitments = poll.tally_commitments()?;

        Ok(TallyData {
            maci: maci.to_string(),
            poll_id: poll.poll_id().to_string(),
            is_quadratic: poll.mode().is_quadratic(),
            new_tally_commitment: commitments.tally_commitment,
            results: TallyResults {
                tally: poll.tally_result().to_vec(),
                salt: commitments.results_salt,
                commitment: commitments.results_commitment,
            },
            total_spent_voice_credits: SpentVoiceCredits {
                spent: poll.total_spent_voice_credits(),
                salt: commitments.spent_salt,
                commitment: commitments.spent_commitment,
            },
            per_vo_spent_voice_credits: commitments.per_vo_spent.map(|(salt, commitment)| TallyResults {
                tally: poll.per_vo_spent_voice_credits().to_vec(),
                salt,
                commitment,
            }),
        })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), CoreError>
    {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        info!(path = %path.as_ref().display(), "wrote tally");
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, CoreError>
    {
        Ok(serde_json::from_str(&fs::read_to_string(path.as_ref())?)?)
    }
}

/// Recomputes every commitment in `tally` and fails on the first that does
/// not match.
pub fn verify_tally(tally: &TallyData, vote_option_tree_depth: usize) -> Result<(), CoreError>
{
    let results = &tally.results;
    if gen_tree_commitment(&results.tally, vote_option_tree_depth, results.salt)? != results.commitment
    {
        Err(CoreError::TallyMismatch("results"))?
    }

    let spent = &tally.total_spent_voice_credits;
    if gen_spent_commitment(spent.spent, spent.salt)? != spent.commitment
    {
        Err(CoreError::TallyMismatch("totalSpentVoiceCredits"))?
    }

    let (mode, per_vo_commitment) = match (&tally.per_vo_spent_voice_credits, tally.is_quadratic)
    {
        (Some(per_vo), true) =>
        {
            if gen_tree_commitment(&per_vo.tally, vote_option_tree_depth, per_vo.salt)? != per_vo.commitment
            {
                Err(CoreError::TallyMismatch("perVOSpentVoiceCredits"))?
            }
            (Mode::Qv, per_vo.commitment)
        }
        (None, true) => return Err(CoreError::TallyMismatch("perVOSpentVoiceCredits")),
        (_, false) => (Mode::NonQv, Fr::from(0u64)),
    };

    if gen_tally_commitment(mode, results.commitment, spent.commitment, per_vo_commitment)? != tally.new_tally_commitment
    {
        Err(CoreError::TallyMismatch("newTallyCommitment"))?
    }

    Ok(())
}
