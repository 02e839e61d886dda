mod poseidon;

pub use poseidon::{Poseidon, PoseidonHasher, MAX_WIDTH, MIN_WIDTH};

use ark_bn254::Fr;
use ark_ff::{PrimeField, Zero};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::field::to_bytes_be;

#[derive(Debug, Error)]
pub enum HashError
{
    #[error("invalid number of inputs {inputs}, expected {max_limit}")]
    InvalidNumberOfInputs { inputs: usize, max_limit: usize },

    #[error("no poseidon parameters for width {0}")]
    InvalidWidth(usize),

    #[error(transparent)]
    Parameters(#[from] light_poseidon::PoseidonError),
}

/// Poseidon hash of an arbitrary (1 to 12 element) input.
pub fn poseidon(inputs: &[Fr]) -> Result<Fr, HashError>
{
    Poseidon::new_circom(inputs.len())?.hash(inputs)
}

pub fn hash_left_right(left: Fr, right: Fr) -> Result<Fr, HashError>
{
    poseidon(&[left, right])
}

pub fn hash2(inputs: [Fr; 2]) -> Result<Fr, HashError>
{
    poseidon(&inputs)
}

pub fn hash3(inputs: [Fr; 3]) -> Result<Fr, HashError>
{
    poseidon(&inputs)
}

pub fn hash4(inputs: [Fr; 4]) -> Result<Fr, HashError>
{
    poseidon(&inputs)
}

pub fn hash5(inputs: [Fr; 5]) -> Result<Fr, HashError>
{
    poseidon(&inputs)
}

/// Hashes up to 13 elements as a two level tree of width-6 hashes, zero
/// padding missing inputs.
pub fn hash13(inputs: &[Fr]) -> Result<Fr, HashError>
{
    if inputs.len() > 13
    {
        Err(HashError::InvalidNumberOfInputs { inputs: inputs.len(), max_limit: 13 })?
    }

    let mut e = [Fr::zero(); 13];
    e[..inputs.len()].copy_from_slice(inputs);

    hash5([
        e[0],
        hash5([e[1], e[2], e[3], e[4], e[5]])?,
        hash5([e[6], e[7], e[8], e[9], e[10]])?,
        e[11],
        e[12],
    ])
}

/// Single element hash, `poseidon([x, 0])`.
pub fn hash_one(value: Fr) -> Result<Fr, HashError>
{
    poseidon(&[value, Fr::zero()])
}

/// SHA-256 of the 32 byte big-endian encodings, reduced into the field.
/// This is how public inputs are compressed into a single circuit input.
pub fn sha256_hash(inputs: &[Fr]) -> Fr
{
    let mut hasher = Sha256::new();
    for input in inputs
    {
        hasher.update(to_bytes_be(input));
    }
    Fr::from_be_bytes_mod_order(&hasher.finalize())
}
