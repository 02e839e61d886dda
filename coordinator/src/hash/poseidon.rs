use ark_bn254::Fr;
use ark_ff::{Field, Zero};
use light_poseidon::{parameters::bn254_x5, PoseidonParameters};
use once_cell::sync::OnceCell;

use crate::hash::HashError;

/// Smallest and largest state widths with circom-compatible parameters.
pub const MIN_WIDTH: usize = 2;
pub const MAX_WIDTH: usize = 13;

const UNINITIALISED: OnceCell<PoseidonParameters<Fr>> = OnceCell::new();
static PARAMETERS: [OnceCell<PoseidonParameters<Fr>>; MAX_WIDTH - MIN_WIDTH + 1] = [UNINITIALISED; MAX_WIDTH - MIN_WIDTH + 1];

/// Round constants and MDS matrix for the given state width, generated once
/// per process.
fn parameters(width: usize) -> Result<&'static PoseidonParameters<Fr>, HashError>
{
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) { Err(HashError::InvalidWidth(width))? }

    PARAMETERS[width - MIN_WIDTH].get_or_try_init(|| {
        bn254_x5::get_poseidon_parameters::<Fr>(width as u8).map_err(HashError::from)
    })
}

/// Trait for hashing inputs that are prime field elements.
pub trait PoseidonHasher
{
    /// Calculates a Poseidon hash for the given input of prime fields and
    /// returns the result as a prime field.
    fn hash(&mut self, inputs: &[Fr]) -> Result<Fr, HashError>;
}

/// The x^5 Poseidon permutation over BN254 with circom's round constants.
pub struct Poseidon
{
    params: &'static PoseidonParameters<Fr>,
    state: Vec<Fr>,
}

impl Poseidon
{
    /// Returns a hasher absorbing exactly `nr_inputs` elements.
    pub fn new_circom(nr_inputs: usize) -> Result<Self, HashError>
    {
        Self::with_width(nr_inputs + 1)
    }

    pub fn with_width(width: usize) -> Result<Self, HashError>
    {
        let params = parameters(width)?;
        Ok(Self {
            params,
            state: Vec::with_capacity(width),
        })
    }

    pub fn width(&self) -> usize
    {
        self.params.width
    }

    #[inline(always)]
    fn apply_ark(&mut self, round: usize)
    {
        let width = self.params.width;
        self.state.iter_mut().enumerate().for_each(|(i, a)| {
            *a += self.params.ark[round * width + i];
        });
    }

    #[inline(always)]
    fn apply_sbox_full(&mut self)
    {
        let alpha = self.params.alpha;
        self.state.iter_mut().for_each(|a| {
            *a = a.pow([alpha]);
        });
    }

    #[inline(always)]
    fn apply_sbox_partial(&mut self)
    {
        self.state[0] = self.state[0].pow([self.params.alpha]);
    }

    #[inline(always)]
    fn apply_mds(&mut self)
    {
        let new_state: Vec<Fr> = (0..self.state.len())
            .map(|i| {
                self.state
                    .iter()
                    .enumerate()
                    .fold(Fr::zero(), |acc, (j, a)| acc + *a * self.params.mds[i][j])
            })
            .collect();
        self.state = new_state;
    }

    /// Applies the full permutation to `state`, which must match the width.
    pub fn permute(&mut self, state: &[Fr]) -> Result<Vec<Fr>, HashError>
    {
        if state.len() != self.params.width
        {
            Err(HashError::InvalidNumberOfInputs {
                inputs: state.len(),
                max_limit: self.params.width,
            })?
        }

        self.state.clear();
        self.state.extend_from_slice(state);

        let all_rounds = self.params.full_rounds + self.params.partial_rounds;
        let half_rounds = self.params.full_rounds / 2;

        for round in 0..half_rounds
        {
            self.apply_ark(round);
            self.apply_sbox_full();
            self.apply_mds();
        }

        for round in half_rounds..half_rounds + self.params.partial_rounds
        {
            self.apply_ark(round);
            self.apply_sbox_partial();
            self.apply_mds();
        }

        for round in half_rounds + self.params.partial_rounds..all_rounds
        {
            self.apply_ark(round);
            self.apply_sbox_full();
            self.apply_mds();
        }

        Ok(std::mem::take(&mut self.state))
    }
}

impl PoseidonHasher for Poseidon
{
    fn hash(&mut self, inputs: &[Fr]) -> Result<Fr, HashError>
    {
        if inputs.len() != self.params.width - 1
        {
            Err(HashError::InvalidNumberOfInputs {
                inputs: inputs.len(),
                max_limit: self.params.width - 1,
            })?
        }

        let mut state = Vec::with_capacity(self.params.width);
        state.push(Fr::zero());
        state.extend_from_slice(inputs);

        let state = self.permute(&state)?;
        Ok(state[0])
    }
}
