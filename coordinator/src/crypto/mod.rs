pub mod babyjub;
pub mod cipher;
pub mod eddsa;
pub mod keys;

pub use babyjub::Point;
pub use eddsa::Signature;
pub use keys::{Keypair, PrivateKey, PublicKey};

use ark_bn254::Fr;
use rand::RngCore;

/// A random value below the Baby Jubjub subgroup order, used for commitment salts.
pub fn random_salt<R: RngCore + ?Sized>(rng: &mut R) -> Fr
{
    PrivateKey::random(rng).raw()
}
