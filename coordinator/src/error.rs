use thiserror::Error;

use crate::hash::HashError;
use crate::crypto::cipher::CipherError;

/// Fatal and sequencing failures of the coordinator core.
///
/// None of these leave a partially mutated poll behind: operations that fail
/// with a `CoreError` either never touched state or restored it before returning.
#[derive(Debug, Error)]
pub enum CoreError
{
    #[error("tree is full (capacity {capacity})")]
    TreeFull { capacity: u64 },

    #[error("leaf index {index} is outside a tree of capacity {capacity}")]
    IndexOutOfRange { index: u64, capacity: u64 },

    #[error("leaves {start}..{end} do not form an aligned subtree")]
    InvalidSubtreeRange { start: u64, end: u64 },

    #[error("subtrees are already merged")]
    SubtreesAlreadyMerged,

    #[error("subtrees must be merged before computing the main root")]
    SubtreesNotMerged,

    #[error("invalid merge depth {depth} (expected {min}..={max})")]
    InvalidDepth { depth: usize, min: usize, max: usize },

    #[error("the voting period ends at {end}, current time is {now}")]
    VotingPeriodNotOver { end: u64, now: u64 },

    #[error("all messages must be processed before tallying")]
    ProcessingNotComplete,

    #[error("no more messages to process")]
    NoMoreMessages,

    #[error("all ballots have been tallied")]
    AllBallotsTallied,

    #[error("tallying is not complete")]
    TallyNotComplete,

    #[error("tally file {0} does not match its commitment")]
    TallyMismatch(&'static str),

    #[error("vote option {index} is outside the {max} options of this poll")]
    VoteOptionOutOfRange { index: usize, max: usize },

    #[error("nullifier {0} has already joined this poll")]
    UserAlreadyJoined(String),

    #[error("poll {0} not found")]
    PollNotFound(u64),

    #[error("poll {0} is a placeholder and holds no state")]
    NullPoll(u64),

    #[error("coordinator key mismatch for poll {poll_id}: on-chain {on_chain}, local {local}")]
    CoordinatorKeyMismatch { poll_id: u64, on_chain: String, local: String },

    #[error("message count mismatch for poll {poll_id} (blocks {from_block}..={to_block}): folded {folded}, on-chain {on_chain}")]
    MessageCountMismatch { poll_id: u64, from_block: u64, to_block: u64, folded: u64, on_chain: u64 },

    #[error("message batch {0} is unavailable from the gateway and no backup was supplied")]
    MissingIpfsBatch(String),

    #[error("invalid vote options: {given} exceeds the maximum of {max}")]
    InvalidVoteOptions { given: u64, max: u64 },

    #[error("value {0} is not a field element")]
    ValueOutOfRange(String),

    #[error("signup registry holds {available} keys, {requested} requested")]
    RegistryTooSmall { available: usize, requested: usize },

    #[error("inconsistent poll snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("relay: {0}")]
    Relay(String),

    #[error("ledger: {0}")]
    Ledger(String),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Reasons a single message has no effect during batch processing.
///
/// These are expected outcomes, never batch failures.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ProcessMessageError
{
    #[error("failed to decrypt the message")]
    FailedDecryption,

    #[error("state leaf index out of range")]
    InvalidStateLeafIndex,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid nonce")]
    InvalidNonce,

    #[error("insufficient voice credits")]
    InsufficientVoiceCredits,

    #[error("vote option index out of range")]
    InvalidVoteOptionIndex,

    #[error("vote weight must spend the full remaining balance")]
    InvalidVoteWeight,
}

/// Malformed ledger events. Always fatal: an event is never skipped.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError
{
    #[error("{kind} event carries {found} arguments, expected {expected}")]
    Arity { kind: &'static str, expected: usize, found: usize },

    #[error("{kind} event has an invalid field `{value}`")]
    InvalidField { kind: &'static str, value: String },

    #[error("unknown event kind `{0}`")]
    UnknownKind(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
