//! Off-chain coordinator core for MACI polls.
//!
//! Replays ledger events into a local replica of the registry and one poll,
//! processes the poll's encrypted messages in batches, tallies the resulting
//! ballots, and emits the circuit inputs and commitments the on-chain
//! verifier checks.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod field;
pub mod hash;
pub mod logging;
pub mod output;
pub mod poll;
pub mod relay;
pub mod replicator;
pub mod state;
pub mod tree;


pub use error::{CoreError, CoreResult, DecodeError, ProcessMessageError};
pub use poll::{Mode, Poll, TreeDepths};
pub use state::{MaciState, PollSlot};
