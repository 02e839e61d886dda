use std::fmt;

use ark_bn254::Fr;
use blake_hash::{Blake512, Digest};
use num_bigint::BigUint;
use rand::RngCore;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::babyjub::{suborder, Point, BASE8};
use crate::error::CoreError;
use crate::field::{from_biguint, modulus, parse, to_biguint, to_decimal};
use crate::hash::{hash2, hash_left_right, HashError};

const SERIALIZED_PRIVATE_KEY_PREFIX: &str = "macisk.";

/// Smallest 256-bit value accepted when sampling a private key,
/// `2^256 mod l` for the subgroup order `l`. The accepted range then spans a
/// whole number of multiples of `l`, so reducing by `l` stays uniform.
pub(crate) fn sampling_floor() -> BigUint
{
    (BigUint::from(1u8) << 256u32) % suborder()
}

/// The 64 byte blake512 expansion of a raw private key.
pub(crate) fn expand(raw: &Fr) -> [u8; 64]
{
    let bytes = to_biguint(raw).to_bytes_be();
    let digest = Blake512::digest(&bytes[..]);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Prunes the lower half of the expansion into the signing scalar.
pub(crate) fn pruned_scalar(expanded: &[u8; 64]) -> BigUint
{
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&expanded[..32]);
    bytes[0] &= 0xF8;
    bytes[31] &= 0x7F;
    bytes[31] |= 0x40;
    BigUint::from_bytes_le(&bytes)
}

#[derive(Clone, Eq, PartialEq)]
pub struct PrivateKey
{
    raw: Fr,
}

impl PrivateKey
{
    pub fn new(raw: Fr) -> Self
    {
        PrivateKey { raw }
    }

    /// Samples a uniformly distributed key in the Baby Jubjub subgroup.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self
    {
        let min = sampling_floor();
        let order = suborder();
        loop
        {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let candidate = BigUint::from_bytes_be(&bytes);
            if candidate >= min
            {
                return PrivateKey { raw: from_biguint(&(candidate % &order)) };
            }
        }
    }

    pub fn raw(&self) -> Fr
    {
        self.raw
    }

    /// The scalar form used in circuits and for key derivation.
    pub fn formatted(&self) -> BigUint
    {
        pruned_scalar(&expand(&self.raw)) >> 3
    }

    pub fn formatted_field(&self) -> Fr
    {
        from_biguint(&self.formatted())
    }

    pub fn to_serialized(&self) -> String
    {
        format!("{SERIALIZED_PRIVATE_KEY_PREFIX}{}", to_biguint(&self.raw).to_str_radix(16))
    }

    pub fn from_serialized(value: &str) -> Result<Self, CoreError>
    {
        let Some(hex) = value.trim().strip_prefix(SERIALIZED_PRIVATE_KEY_PREFIX) else {
            return Err(CoreError::InvalidKey(format!("missing `{SERIALIZED_PRIVATE_KEY_PREFIX}` prefix")));
        };
        let hex = hex.strip_prefix("0x").unwrap_or(hex);

        let Some(raw) = BigUint::parse_bytes(hex.as_bytes(), 16).filter(|raw| *raw < modulus()) else {
            return Err(CoreError::InvalidKey(format!("`{hex}` is not a field element")));
        };

        Ok(PrivateKey { raw: from_biguint(&raw) })
    }
}

impl fmt::Debug for PrivateKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str("PrivateKey(..)")
    }
}

impl Serialize for PrivateKey
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        serializer.serialize_str(&self.to_serialized())
    }
}

impl<'de> Deserialize<'de> for PrivateKey
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let raw = String::deserialize(deserializer)?;
        PrivateKey::from_serialized(&raw).map_err(D::Error::custom)
    }
}

/// A point on Baby Jubjub; serialized as `[x, y]` decimal strings.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PublicKey
{
    pub point: Point,
}

impl PublicKey
{
    pub fn new(x: Fr, y: Fr) -> Self
    {
        PublicKey { point: Point { x, y } }
    }

    pub fn x(&self) -> Fr
    {
        self.point.x
    }

    pub fn y(&self) -> Fr
    {
        self.point.y
    }

    pub fn as_array(&self) -> [Fr; 2]
    {
        [self.point.x, self.point.y]
    }

    pub fn hash(&self) -> Result<Fr, HashError>
    {
        hash_left_right(self.point.x, self.point.y)
    }

    pub fn is_valid(&self) -> bool
    {
        self.point.in_curve()
    }
}

impl Serialize for PublicKey
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        [to_decimal(&self.point.x), to_decimal(&self.point.y)].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let [x, y] = <[String; 2]>::deserialize(deserializer)?;
        let (Some(px), Some(py)) = (parse(&x), parse(&y)) else {
            return Err(D::Error::custom(format!("invalid public key [{x}, {y}]")));
        };
        Ok(PublicKey::new(px, py))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair
{
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl Keypair
{
    pub fn new(private_key: PrivateKey) -> Self
    {
        let public_key = PublicKey { point: BASE8.mul_scalar(&private_key.formatted()) };
        Keypair { private_key, public_key }
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self
    {
        Keypair::new(PrivateKey::random(rng))
    }

    /// ECDH shared key between a private key and someone else's public key.
    pub fn gen_ecdh_shared_key(private_key: &PrivateKey, public_key: &PublicKey) -> PublicKey
    {
        PublicKey { point: public_key.point.mul_scalar(&private_key.formatted()) }
    }

    /// `poseidon([formatted private key, pollId])`, revealed once per poll on join.
    pub fn nullifier(&self, poll_id: u64) -> Result<Fr, HashError>
    {
        hash2([self.private_key.formatted_field(), Fr::from(poll_id)])
    }
}
