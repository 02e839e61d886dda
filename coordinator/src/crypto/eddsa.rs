use ark_bn254::Fr;
use blake_hash::{Blake512, Digest};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::babyjub::{suborder, Point, BASE8};
use crate::crypto::keys::{expand, pruned_scalar, PrivateKey, PublicKey};
use crate::field::{from_biguint, to_biguint};
use crate::hash::{poseidon, HashError};

/// EdDSA-Poseidon signature over Baby Jubjub.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature
{
    #[serde(with = "r8_serde")]
    pub r8: Point,
    #[serde(with = "crate::field::decimal")]
    pub s: Fr,
}

mod r8_serde
{
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::crypto::babyjub::Point;
    use crate::crypto::keys::PublicKey;

    pub fn serialize<S: Serializer>(point: &Point, serializer: S) -> Result<S::Ok, S::Error>
    {
        PublicKey { point: *point }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point, D::Error>
    {
        Ok(PublicKey::deserialize(deserializer)?.point)
    }
}

fn challenge(r8: &Point, public_key: &Point, message: Fr) -> Result<BigUint, HashError>
{
    let hm = poseidon(&[r8.x, r8.y, public_key.x, public_key.y, message])?;
    Ok(to_biguint(&hm))
}

/// Signs a single field element.
pub fn sign(private_key: &PrivateKey, message: Fr) -> Result<Signature, HashError>
{
    let expanded = expand(&private_key.raw());
    let s = pruned_scalar(&expanded);
    let a = BASE8.mul_scalar(&(&s >> 3));

    let mut message_le = to_biguint(&message).to_bytes_le();
    message_le.resize(32, 0);

    let mut nonce_input = Vec::with_capacity(64);
    nonce_input.extend_from_slice(&expanded[32..]);
    nonce_input.extend_from_slice(&message_le);

    let order = suborder();
    let r = BigUint::from_bytes_le(&Blake512::digest(&nonce_input[..])) % &order;
    let r8 = BASE8.mul_scalar(&r);

    let hm = challenge(&r8, &a, message)?;
    let s = (r + hm * s) % &order;

    Ok(Signature { r8, s: from_biguint(&s) })
}

/// Checks `S·B8 == R8 + 8·hm·A` with both points on the curve and `S < l`.
pub fn verify(public_key: &PublicKey, message: Fr, signature: &Signature) -> bool
{
    if !signature.r8.in_curve() || !public_key.point.in_curve() { return false; }

    let s = to_biguint(&signature.s);
    if s >= suborder() { return false; }

    let Ok(hm) = challenge(&signature.r8, &public_key.point, message) else { return false; };

    let left = BASE8.mul_scalar(&s);
    let right = signature.r8.add(&public_key.point.mul_scalar(&(hm * 8u32)));

    left == right
}
