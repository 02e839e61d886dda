use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::PublicKey;
use crate::domain::NOTHING_UP_MY_SLEEVE;
use crate::hash::{hash13, HashError};

/// Field elements in an encrypted command.
pub const MESSAGE_DATA_LENGTH: usize = 10;

/// An encrypted command as published on chain. Opaque until processed with
/// the coordinator's key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Message
{
    pub data: [Fr; MESSAGE_DATA_LENGTH],
}

impl Message
{
    pub fn new(data: [Fr; MESSAGE_DATA_LENGTH]) -> Self
    {
        Message { data }
    }

    /// Builds a message from a slice, which must hold exactly ten elements.
    pub fn from_slice(data: &[Fr]) -> Option<Self>
    {
        let data: [Fr; MESSAGE_DATA_LENGTH] = data.try_into().ok()?;
        Some(Message { data })
    }

    /// The well-known message used to close partial batches. It never
    /// decrypts to a valid command.
    pub fn padding() -> Self
    {
        let mut data = [Fr::zero(); MESSAGE_DATA_LENGTH];
        data[0] = NOTHING_UP_MY_SLEEVE;
        Message { data }
    }

    pub fn as_circuit_inputs(&self) -> Vec<Fr>
    {
        self.data.to_vec()
    }

    /// Leaf of the message tree: the data followed by the encryption key.
    pub fn hash(&self, enc_public_key: &PublicKey) -> Result<Fr, HashError>
    {
        let mut inputs = self.data.to_vec();
        inputs.extend_from_slice(&enc_public_key.as_array());
        hash13(&inputs)
    }
}

impl Serialize for Message
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        crate::field::decimal_vec::serialize(&self.data, serializer)
    }
}

impl<'de> Deserialize<'de> for Message
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let data = crate::field::decimal_vec::deserialize(deserializer)?;
        Message::from_slice(&data).ok_or_else(|| {
            serde::de::Error::invalid_length(data.len(), &"ten field elements")
        })
    }
}
