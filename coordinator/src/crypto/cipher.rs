//! Poseidon duplex sponge encryption keyed by an ECDH shared point.

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use thiserror::Error;

use crate::crypto::keys::PublicKey;
use crate::hash::{HashError, Poseidon};

const RATE: usize = 3;

#[derive(Debug, Error)]
pub enum CipherError
{
    #[error("ciphertext of {found} elements cannot hold {length} plaintext elements")]
    InvalidCiphertextLength { length: usize, found: usize },

    #[error("non-zero padding in decrypted plaintext")]
    InvalidPadding,

    #[error("authentication tag mismatch")]
    InvalidAuthTag,

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Number of ciphertext elements produced for a plaintext of `length` elements.
pub fn ciphertext_length(length: usize) -> usize
{
    length.div_ceil(RATE) * RATE + 1
}

fn initial_state(key: &PublicKey, nonce: u128, length: usize) -> [Fr; 4]
{
    let two_128 = Fr::from(u128::MAX) + Fr::one();
    [Fr::zero(), key.x(), key.y(), Fr::from(nonce) + Fr::from(length as u64) * two_128]
}

pub fn encrypt(plaintext: &[Fr], key: &PublicKey, nonce: u128) -> Result<Vec<Fr>, CipherError>
{
    let mut permutation = Poseidon::with_width(RATE + 1)?;
    let mut state = initial_state(key, nonce, plaintext.len()).to_vec();

    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len().div_ceil(RATE) * RATE, Fr::zero());

    let mut ciphertext = Vec::with_capacity(ciphertext_length(plaintext.len()));
    for chunk in padded.chunks(RATE)
    {
        state = permutation.permute(&state)?;
        for (i, element) in chunk.iter().enumerate()
        {
            state[i + 1] += element;
            ciphertext.push(state[i + 1]);
        }
    }

    state = permutation.permute(&state)?;
    ciphertext.push(state[1]);

    Ok(ciphertext)
}

/// Inverse of [`encrypt`]; `length` is the expected plaintext length.
pub fn decrypt(ciphertext: &[Fr], key: &PublicKey, nonce: u128, length: usize) -> Result<Vec<Fr>, CipherError>
{
    if ciphertext.len() != ciphertext_length(length)
    {
        Err(CipherError::InvalidCiphertextLength { length, found: ciphertext.len() })?
    }

    let mut permutation = Poseidon::with_width(RATE + 1)?;
    let mut state = initial_state(key, nonce, length).to_vec();

    let blocks = length.div_ceil(RATE);
    let mut plaintext = Vec::with_capacity(blocks * RATE);
    for chunk in ciphertext[..blocks * RATE].chunks(RATE)
    {
        state = permutation.permute(&state)?;
        for (i, element) in chunk.iter().enumerate()
        {
            plaintext.push(*element - state[i + 1]);
            state[i + 1] = *element;
        }
    }

    if length > RATE
    {
        let padding = blocks * RATE - length;
        if plaintext[plaintext.len() - padding..].iter().any(|element| !element.is_zero())
        {
            Err(CipherError::InvalidPadding)?
        }
    }

    state = permutation.permute(&state)?;
    if ciphertext[blocks * RATE] != state[1]
    {
        Err(CipherError::InvalidAuthTag)?
    }

    plaintext.truncate(length);
    Ok(plaintext)
}
