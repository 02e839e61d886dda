use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::domain::PAD_KEY;
use crate::hash::{hash4, HashError};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateLeaf
{
    /// The key that must sign the voter's next command.
    pub public_key: PublicKey,

    #[serde(with = "crate::field::string_u128")]
    pub voice_credit_balance: u128,

    pub timestamp: u64,
}

impl StateLeaf
{
    pub fn new(public_key: PublicKey, voice_credit_balance: u128, timestamp: u64) -> Self
    {
        StateLeaf { public_key, voice_credit_balance, timestamp }
    }

    /// The leaf at index 0 of every state tree; it absorbs no-op messages.
    pub fn blank() -> Self
    {
        StateLeaf::new(PAD_KEY, 0, 0)
    }

    pub fn as_circuit_inputs(&self) -> [Fr; 4]
    {
        [
            self.public_key.x(),
            self.public_key.y(),
            Fr::from(self.voice_credit_balance),
            Fr::from(self.timestamp),
        ]
    }

    pub fn hash(&self) -> Result<Fr, HashError>
    {
        hash4(self.as_circuit_inputs())
    }
}
