use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::CoreError;
use crate::poll::TreeDepths;
use crate::replicator::{EventKind, RawEvent};

/// Poll parameters and counters as the ledger reports them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollInfo
{
    pub poll_id: u64,
    pub coordinator_public_key: PublicKey,
    pub poll_end_timestamp: u64,
    pub tree_depths: TreeDepths,
    pub vote_options: usize,

    /// Signups visible to the poll, including the padding key.
    pub num_signups: u64,
    pub num_messages: u64,
}

/// Read access to the registry and poll events.
#[async_trait]
pub trait Ledger: Send + Sync
{
    async fn block_number(&self) -> Result<u64, CoreError>;

    async fn state_tree_depth(&self) -> Result<usize, CoreError>;

    /// Registry events of `kind` emitted in `from..=to`.
    async fn registry_events(&self, kind: EventKind, from: u64, to: u64) -> Result<Vec<RawEvent>, CoreError>;

    /// Events of `kind` emitted by poll `poll_id` in `from..=to`.
    async fn poll_events(&self, poll_id: u64, kind: EventKind, from: u64, to: u64) -> Result<Vec<RawEvent>, CoreError>;

    async fn poll_info(&self, poll_id: u64) -> Result<PollInfo, CoreError>;
}

/// A ledger replayed from a JSON recording of its events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedLedger
{
    pub state_tree_depth: usize,
    pub block_number: u64,
    pub polls: Vec<PollInfo>,
    pub events: Vec<RawEvent>,
}

impl RecordedLedger
{
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError>
    {
        let json = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&json)?)
    }

    fn events_in(&self, kind: EventKind, from: u64, to: u64) -> impl Iterator<Item = &RawEvent>
    {
        self.events
            .iter()
            .filter(move |event| event.kind == kind.name() && (from..=to).contains(&event.block_number))
    }
}

#[async_trait]
impl Ledger for RecordedLedger
{
    async fn block_number(&self) -> Result<u64, CoreError>
    {
        Ok(self.block_number)
    }

    async fn state_tree_depth(&self) -> Result<usize, CoreError>
    {
        Ok(self.state_tree_depth)
    }

    async fn registry_events(&self, kind: EventKind, from: u64, to: u64) -> Result<Vec<RawEvent>, CoreError>
    {
        Ok(self.events_in(kind, from, to).cloned().collect())
    }

    async fn poll_events(&self, poll_id: u64, kind: EventKind, from: u64, to: u64) -> Result<Vec<RawEvent>, CoreError>
    {
        Ok(self
            .events_in(kind, from, to)
            .filter(|event| event.poll_id == Some(poll_id))
            .cloned()
            .collect())
    }

    async fn poll_info(&self, poll_id: u64) -> Result<PollInfo, CoreError>
    {
        self.polls
            .iter()
            .find(|poll| poll.poll_id == poll_id)
            .cloned()
            .ok_or(CoreError::PollNotFound(poll_id))
    }
}
