use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::domain::Message;
use crate::poll::Mode;

/// A ledger event in typed form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action
{
    pub block_number: u64,
    pub transaction_index: u64,

    /// Position of the event within its block.
    #[serde(default)]
    pub log_index: u64,

    #[serde(flatten)]
    pub data: ActionData,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ActionData
{
    #[serde(rename_all = "camelCase")]
    SignUp
    {
        state_index: u64,
        public_key: PublicKey,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    DeployPoll
    {
        poll_id: u64,
        public_key: PublicKey,
        mode: Mode,
    },

    #[serde(rename_all = "camelCase")]
    PollJoined
    {
        #[serde(with = "crate::field::decimal")]
        nullifier: Fr,
        public_key: PublicKey,
        #[serde(with = "crate::field::string_u128")]
        voice_credit_balance: u128,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    PublishMessage
    {
        message: Message,
        enc_public_key: PublicKey,
    },

    #[serde(rename_all = "camelCase")]
    IpfsHashAdded
    {
        ipfs_hash: String,
    },
}

impl ActionData
{
    pub fn kind(&self) -> &'static str
    {
        match self
        {
            ActionData::SignUp { .. } => "SignUp",
            ActionData::DeployPoll { .. } => "DeployPoll",
            ActionData::PollJoined { .. } => "PollJoined",
            ActionData::PublishMessage { .. } => "PublishMessage",
            ActionData::IpfsHashAdded { .. } => "IpfsHashAdded",
        }
    }
}

impl Action
{
    pub fn new(block_number: u64, transaction_index: u64, log_index: u64, data: ActionData) -> Self
    {
        Action { block_number, transaction_index, log_index, data }
    }

    /// Ledger order of the event.
    pub fn position(&self) -> (u64, u64, u64)
    {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// Orders actions as they happened on chain. The sort is stable, so actions
/// sharing a position keep their relative order.
pub fn sort_actions(actions: &mut [Action])
{
    actions.sort_by_key(Action::position);
}
