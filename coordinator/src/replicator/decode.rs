use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::domain::{Message, MESSAGE_DATA_LENGTH};
use crate::error::DecodeError;
use crate::field::{parse, to_u128};
use crate::poll::Mode;
use crate::replicator::{Action, ActionData};

/// Event kinds queried from the ledger.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EventKind
{
    SignUp,
    DeployPoll,
    PollJoined,
    PublishMessage,
    IpfsHashAdded,
}

impl EventKind
{
    pub fn name(&self) -> &'static str
    {
        match self
        {
            EventKind::SignUp => "SignUp",
            EventKind::DeployPoll => "DeployPoll",
            EventKind::PollJoined => "PollJoined",
            EventKind::PublishMessage => "PublishMessage",
            EventKind::IpfsHashAdded => "IpfsHashAdded",
        }
    }
}

/// An event as the ledger reports it: a kind name and positional arguments.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent
{
    pub kind: String,
    pub block_number: u64,
    pub transaction_index: u64,
    #[serde(default)]
    pub log_index: u64,

    /// Emitting poll, for poll events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_id: Option<u64>,

    pub args: Vec<String>,
}

const SIGN_UP_ARITY: usize = 4;
const DEPLOY_POLL_ARITY: usize = 4;
const POLL_JOINED_ARITY: usize = 4;
const PUBLISH_MESSAGE_ARITY: usize = MESSAGE_DATA_LENGTH + 2;
const IPFS_HASH_ADDED_ARITY: usize = 1;

/// Maps a raw event onto an [`Action`], validating arity and every field.
pub fn decode_event(event: &RawEvent) -> Result<Action, DecodeError>
{
    let args = &event.args;

    let data = match event.kind.as_str()
    {
        "SignUp" =>
        {
            let kind = "SignUp";
            expect_arity(kind, args, SIGN_UP_ARITY)?;
            ActionData::SignUp {
                state_index: parse_u64(kind, &args[0])?,
                public_key: parse_public_key(kind, &args[1], &args[2])?,
                timestamp: parse_u64(kind, &args[3])?,
            }
        }
        "DeployPoll" =>
        {
            let kind = "DeployPoll";
            expect_arity(kind, args, DEPLOY_POLL_ARITY)?;
            let Some(mode) = Mode::from_index(parse_u64(kind, &args[3])?) else {
                return Err(invalid(kind, &args[3]));
            };
            ActionData::DeployPoll {
                poll_id: parse_u64(kind, &args[0])?,
                public_key: parse_public_key(kind, &args[1], &args[2])?,
                mode,
            }
        }
        "PollJoined" =>
        {
            // A trailing join timestamp is optional.
            let kind = "PollJoined";
            if args.len() != POLL_JOINED_ARITY && args.len() != POLL_JOINED_ARITY + 1
            {
                return Err(DecodeError::Arity { kind, expected: POLL_JOINED_ARITY, found: args.len() });
            }
            let Some(voice_credit_balance) = parse_field(kind, &args[3]).map(|value| to_u128(&value))? else {
                return Err(invalid(kind, &args[3]));
            };
            ActionData::PollJoined {
                nullifier: parse_field(kind, &args[0])?,
                public_key: parse_public_key(kind, &args[1], &args[2])?,
                voice_credit_balance,
                timestamp: args.get(4).map(|raw| parse_u64(kind, raw)).transpose()?.unwrap_or(0),
            }
        }
        "PublishMessage" =>
        {
            let kind = "PublishMessage";
            expect_arity(kind, args, PUBLISH_MESSAGE_ARITY)?;
            let data = args[..MESSAGE_DATA_LENGTH]
                .iter()
                .map(|raw| parse_field(kind, raw))
                .collect::<Result<Vec<_>, _>>()?;
            let Some(message) = Message::from_slice(&data) else {
                return Err(DecodeError::Arity { kind, expected: PUBLISH_MESSAGE_ARITY, found: args.len() });
            };
            ActionData::PublishMessage {
                message,
                enc_public_key: parse_public_key(kind, &args[MESSAGE_DATA_LENGTH], &args[MESSAGE_DATA_LENGTH + 1])?,
            }
        }
        "IpfsHashAdded" =>
        {
            let kind = "IpfsHashAdded";
            expect_arity(kind, args, IPFS_HASH_ADDED_ARITY)?;
            let ipfs_hash = args[0].trim();
            if ipfs_hash.is_empty() { return Err(invalid(kind, &args[0])); }
            ActionData::IpfsHashAdded { ipfs_hash: ipfs_hash.to_string() }
        }
        other => return Err(DecodeError::UnknownKind(other.to_string())),
    };

    Ok(Action::new(event.block_number, event.transaction_index, event.log_index, data))
}

fn expect_arity(kind: &'static str, args: &[String], expected: usize) -> Result<(), DecodeError>
{
    if args.len() != expected
    {
        return Err(DecodeError::Arity { kind, expected, found: args.len() });
    }
    Ok(())
}

fn invalid(kind: &'static str, value: &str) -> DecodeError
{
    DecodeError::InvalidField { kind, value: value.to_string() }
}

fn parse_field(kind: &'static str, value: &str) -> Result<Fr, DecodeError>
{
    parse(value).ok_or_else(|| invalid(kind, value))
}

fn parse_u64(kind: &'static str, value: &str) -> Result<u64, DecodeError>
{
    parse(value)
        .and_then(|field| to_u128(&field))
        .and_then(|narrow| u64::try_from(narrow).ok())
        .ok_or_else(|| invalid(kind, value))
}

fn parse_public_key(kind: &'static str, x: &str, y: &str) -> Result<PublicKey, DecodeError>
{
    Ok(PublicKey::new(parse_field(kind, x)?, parse_field(kind, y)?))
}
