mod ballot;
mod command;
mod message;
mod state_leaf;

pub use ballot::Ballot;
pub use command::{pack_values, PCommand, PACKED_FIELD_LIMIT};
pub use message::{Message, MESSAGE_DATA_LENGTH};
pub use state_leaf::StateLeaf;

use ark_bn254::Fr;
use ark_ff::MontFp;

use crate::crypto::{Point, PublicKey};

/// `keccak256("Maci") mod p`, the publicly known padding value.
pub const NOTHING_UP_MY_SLEEVE: Fr =
    MontFp!("8370432830353022751713833565135785980866757267633941821328460903436894336785");

/// Public key of the blank state leaf and of padding messages. Nobody knows
/// its private key.
pub const PAD_KEY: PublicKey = PublicKey {
    point: Point {
        x: MontFp!("10457101036533406547632367118273992217979173478358440826365724437999023779287"),
        y: MontFp!("19824078218392094440610104313265183977899662750282163392862422243483260492317"),
    },
};
