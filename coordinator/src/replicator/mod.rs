//! Rebuilds coordinator state from ledger events.
//!
//! Events are fetched in block windows, every kind of a window concurrently,
//! so they arrive in no particular order. They are sorted by ledger position
//! before anything is folded; the fold itself is a pure function of that
//! sorted sequence.

mod action;
mod decode;
mod ledger;

pub use action::{sort_actions, Action, ActionData};
pub use decode::{decode_event, EventKind, RawEvent};
pub use ledger::{Ledger, PollInfo, RecordedLedger};

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::crypto::Keypair;
use crate::error::CoreError;
use crate::field::to_decimal;
use crate::relay::{IpfsMessage, MessageRelay};
use crate::state::MaciState;

/// Which poll to rebuild and how to walk the ledger.
#[derive(Clone, Debug)]
pub struct ReplayOptions
{
    pub maci_address: String,
    pub poll_id: u64,
    pub from_block: u64,
    pub end_block: Option<u64>,
    pub blocks_per_request: u64,
    pub sleep: Option<Duration>,
    pub logs_output_path: Option<PathBuf>,
}

/// Fetched actions, sorted, with the messages of every referenced batch.
#[derive(Clone, Debug, Default)]
pub struct FetchedActions
{
    pub actions: Vec<Action>,
    pub batches: HashMap<String, Vec<IpfsMessage>>,
    pub to_block: u64,
}

/// Debug log of a replay.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionLog<'a>
{
    maci_address: &'a str,
    poll_id: String,
    from_block: u64,
    to_block: u64,
    timestamp: String,
    actions: &'a [Action],
}

pub struct Replicator<'a, L: Ledger>
{
    ledger: &'a L,
    relay: &'a MessageRelay,
    options: ReplayOptions,
}

impl<'a, L: Ledger> Replicator<'a, L>
{
    pub fn new(ledger: &'a L, relay: &'a MessageRelay, options: ReplayOptions) -> Self
    {
        Replicator { ledger, relay, options }
    }

    /// Fetches every registry event and every event of the target poll up to
    /// the end block, resolves referenced message batches, and returns the
    /// actions in ledger order.
    pub async fn fetch_actions(&self) -> Result<FetchedActions, CoreError>
    {
        let to_block = match self.options.end_block
        {
            Some(block) => block,
            None => self.ledger.block_number().await?,
        };
        let step = self.options.blocks_per_request.max(1);
        let poll_id = self.options.poll_id;

        let mut actions = Vec::new();
        let mut batches = HashMap::new();

        let mut from = self.options.from_block;
        while from <= to_block
        {
            let window_end = from.saturating_add(step).min(to_block);

            let (sign_ups, deploys, joins, publishes, hashes) = futures::try_join!(
                self.ledger.registry_events(EventKind::SignUp, from, window_end),
                self.ledger.registry_events(EventKind::DeployPoll, from, window_end),
                self.ledger.poll_events(poll_id, EventKind::PollJoined, from, window_end),
                self.ledger.poll_events(poll_id, EventKind::PublishMessage, from, window_end),
                self.ledger.poll_events(poll_id, EventKind::IpfsHashAdded, from, window_end),
            )?;

            let before = actions.len();
            for event in sign_ups.iter().chain(&deploys).chain(&joins).chain(&hashes).chain(&publishes)
            {
                actions.push(decode_event(event)?);
            }

            let content_hashes: Vec<String> = actions[before..]
                .iter()
                .filter_map(|action| match &action.data
                {
                    ActionData::IpfsHashAdded { ipfs_hash } => Some(ipfs_hash.clone()),
                    _ => None,
                })
                .collect();
            let resolved = try_join_all(content_hashes.iter().map(|hash| self.relay.read(hash))).await?;
            batches.extend(content_hashes.into_iter().zip(resolved));

            info!(from, to = window_end, actions = actions.len() - before, "fetched block window");

            if window_end == u64::MAX { break; }
            from = window_end + 1;

            if let Some(pause) = self.options.sleep
            {
                tokio::time::sleep(pause).await;
            }
        }

        sort_actions(&mut actions);
        let actions = splice_batches(actions, &batches);

        Ok(FetchedActions { actions, batches, to_block })
    }

    /// Replays the ledger into a [`MaciState`] holding the target poll, with
    /// its state copied and every cross-check against the ledger passed.
    pub async fn generate_state(&self, coordinator_keypair: &Keypair) -> Result<MaciState, CoreError>
    {
        let poll_id = self.options.poll_id;
        let state_tree_depth = self.ledger.state_tree_depth().await?;
        let fetched = self.fetch_actions().await?;

        let deployed = fetched.actions.iter().any(|action| {
            matches!(action.data, ActionData::DeployPoll { poll_id: id, .. } if id == poll_id)
        });
        if !deployed { Err(CoreError::PollNotFound(poll_id))? }

        let info = self.ledger.poll_info(poll_id).await?;
        if info.coordinator_public_key != coordinator_keypair.public_key
        {
            Err(CoreError::CoordinatorKeyMismatch {
                poll_id,
                on_chain: format_key(&info.coordinator_public_key),
                local: format_key(&coordinator_keypair.public_key),
            })?
        }

        let mut state = fold_actions(state_tree_depth, &fetched.actions, &info, coordinator_keypair)?;

        let folded = state.poll(poll_id)?.messages().len() as u64;
        if folded != info.num_messages
        {
            Err(CoreError::MessageCountMismatch {
                poll_id,
                from_block: self.options.from_block,
                to_block: fetched.to_block,
                folded,
                on_chain: info.num_messages,
            })?
        }

        state.update_poll(poll_id, info.num_signups)?;
        state.poll_mut(poll_id)?.pad_last_batch();
        let signup_root = state.merge_state_aq()?;

        if let Some(path) = &self.options.logs_output_path
        {
            self.write_action_log(path, &fetched)?;
        }

        info!(
            poll_id,
            messages = folded,
            signups = info.num_signups,
            signup_root = %to_decimal(&signup_root),
            "rebuilt coordinator state"
        );
        Ok(state)
    }

    fn write_action_log(&self, path: &PathBuf, fetched: &FetchedActions) -> Result<(), CoreError>
    {
        let log = ActionLog {
            maci_address: &self.options.maci_address,
            poll_id: self.options.poll_id.to_string(),
            from_block: self.options.from_block,
            to_block: fetched.to_block,
            timestamp: chrono::Utc::now().to_rfc3339(),
            actions: &fetched.actions,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&log)?)?;

        debug!(path = %path.display(), "wrote action log");
        Ok(())
    }
}

/// Places the messages of each resolved batch right after the event that
/// referenced it, at that event's ledger position.
pub fn splice_batches(actions: Vec<Action>, batches: &HashMap<String, Vec<IpfsMessage>>) -> Vec<Action>
{
    let mut spliced = Vec::with_capacity(actions.len());
    for action in actions
    {
        let resolved = match &action.data
        {
            ActionData::IpfsHashAdded { ipfs_hash } => batches.get(ipfs_hash),
            _ => None,
        };
        let position = action.position();
        spliced.push(action);

        for message in resolved.into_iter().flatten()
        {
            spliced.push(Action::new(
                position.0,
                position.1,
                position.2,
                ActionData::PublishMessage { message: message.data, enc_public_key: message.public_key },
            ));
        }
    }
    spliced
}

/// Folds sorted actions into a fresh [`MaciState`]. Only the poll described
/// by `info` is deployed with state; other polls become placeholders.
pub fn fold_actions(
    state_tree_depth: usize,
    actions: &[Action],
    info: &PollInfo,
    coordinator_keypair: &Keypair,
) -> Result<MaciState, CoreError>
{
    let mut state = MaciState::new(state_tree_depth)?;

    for action in actions
    {
        match &action.data
        {
            ActionData::SignUp { public_key, .. } =>
            {
                state.sign_up(*public_key)?;
            }
            ActionData::DeployPoll { poll_id, mode, .. } if *poll_id == info.poll_id =>
            {
                state.deploy_poll(
                    info.poll_end_timestamp,
                    info.tree_depths,
                    coordinator_keypair.clone(),
                    info.vote_options,
                    *mode,
                )?;
            }
            ActionData::DeployPoll { .. } =>
            {
                state.deploy_null_poll();
            }
            ActionData::PollJoined { nullifier, public_key, voice_credit_balance, timestamp } =>
            {
                state.poll_mut(info.poll_id)?.join_poll(*nullifier, *public_key, *voice_credit_balance, *timestamp)?;
            }
            ActionData::PublishMessage { message, enc_public_key } =>
            {
                state.poll_mut(info.poll_id)?.publish_message(*message, *enc_public_key)?;
            }
            ActionData::IpfsHashAdded { .. } => (),
        }
        debug!(kind = action.data.kind(), block = action.block_number, "folded action");
    }

    Ok(state)
}

fn format_key(key: &crate::crypto::PublicKey) -> String
{
    format!("[{}, {}]", to_decimal(&key.x()), to_decimal(&key.y()))
}
