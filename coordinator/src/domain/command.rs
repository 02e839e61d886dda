use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use uint::construct_uint;

use crate::crypto::cipher::{self, CipherError};
use crate::crypto::{eddsa, Point, PrivateKey, PublicKey, Signature};
use crate::domain::Message;
use crate::error::CoreError;
use crate::field::to_bytes_be;
use crate::hash::{hash4, HashError};

construct_uint! {
    /// 256-bit integer used to pack the small command fields into one element.
    pub struct U256(4);
}

/// Every packed command field must stay below 2^50.
pub const PACKED_FIELD_LIMIT: u64 = 1 << 50;

const PACKED_FIELD_BITS: usize = 50;

/// Packs values into consecutive 50-bit slots of one field element, the
/// first value in the lowest bits. At most five values fit.
pub fn pack_values(values: &[u64]) -> Fr
{
    let packed = values
        .iter()
        .take(5)
        .enumerate()
        .fold(U256::zero(), |acc, (i, value)| acc + (U256::from(*value) << (i * PACKED_FIELD_BITS)));

    let mut bytes = [0u8; 32];
    packed.to_big_endian(&mut bytes);
    Fr::from_be_bytes_mod_order(&bytes)
}

/// Plaintext elements: the four command elements then `R8.x`, `R8.y`, `S`.
const PLAINTEXT_LENGTH: usize = 7;

/// A vote command. It only ever exists in plaintext on the voter's side and
/// transiently inside the message processor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PCommand
{
    pub state_index: u64,
    pub new_public_key: PublicKey,
    pub vote_option_index: u64,
    pub new_vote_weight: u64,
    pub nonce: u64,
    pub poll_id: u64,
    #[serde(with = "crate::field::decimal")]
    pub salt: Fr,
}

impl PCommand
{
    pub fn new(
        state_index: u64,
        new_public_key: PublicKey,
        vote_option_index: u64,
        new_vote_weight: u64,
        nonce: u64,
        poll_id: u64,
        salt: Fr,
    ) -> Result<Self, CoreError>
    {
        for value in [state_index, vote_option_index, new_vote_weight, nonce, poll_id]
        {
            if value >= PACKED_FIELD_LIMIT { Err(CoreError::ValueOutOfRange(value.to_string()))? }
        }

        Ok(PCommand {
            state_index,
            new_public_key,
            vote_option_index,
            new_vote_weight,
            nonce,
            poll_id,
            salt,
        })
    }

    /// `stateIndex | voteOptionIndex << 50 | weight << 100 | nonce << 150 | pollId << 200`.
    pub fn packed(&self) -> Fr
    {
        pack_values(&[
            self.state_index,
            self.vote_option_index,
            self.new_vote_weight,
            self.nonce,
            self.poll_id,
        ])
    }

    pub fn as_array(&self) -> [Fr; 4]
    {
        [self.packed(), self.new_public_key.x(), self.new_public_key.y(), self.salt]
    }

    pub fn hash(&self) -> Result<Fr, HashError>
    {
        hash4(self.as_array())
    }

    pub fn sign(&self, private_key: &PrivateKey) -> Result<Signature, HashError>
    {
        eddsa::sign(private_key, self.hash()?)
    }

    pub fn verify_signature(&self, signature: &Signature, public_key: &PublicKey) -> bool
    {
        match self.hash()
        {
            Ok(hash) => eddsa::verify(public_key, hash, signature),
            Err(_) => false,
        }
    }

    /// Encrypts the command and its signature under an ECDH shared key.
    pub fn encrypt(&self, signature: &Signature, shared_key: &PublicKey) -> Result<Message, CipherError>
    {
        let mut plaintext = self.as_array().to_vec();
        plaintext.extend_from_slice(&[signature.r8.x, signature.r8.y, signature.s]);

        let ciphertext = cipher::encrypt(&plaintext, shared_key, 0)?;
        Message::from_slice(&ciphertext).ok_or(CipherError::InvalidCiphertextLength {
            length: PLAINTEXT_LENGTH,
            found: ciphertext.len(),
        })
    }

    /// Exact inverse of [`PCommand::encrypt`]. The signature is returned
    /// unverified.
    pub fn decrypt(message: &Message, shared_key: &PublicKey) -> Result<(PCommand, Signature), CipherError>
    {
        let plaintext = cipher::decrypt(&message.data, shared_key, 0, PLAINTEXT_LENGTH)?;

        let packed = U256::from_big_endian(&to_bytes_be(&plaintext[0]));
        let mask = (U256::one() << PACKED_FIELD_BITS) - U256::one();
        let extract = |position: usize| ((packed >> (position * PACKED_FIELD_BITS)) & mask).low_u64();

        let command = PCommand {
            state_index: extract(0),
            vote_option_index: extract(1),
            new_vote_weight: extract(2),
            nonce: extract(3),
            poll_id: extract(4),
            new_public_key: PublicKey::new(plaintext[1], plaintext[2]),
            salt: plaintext[3],
        };

        let signature = Signature {
            r8: Point { x: plaintext[4], y: plaintext[5] },
            s: plaintext[6],
        };

        Ok((command, signature))
    }
}
