use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;

/// Big-endian 32 byte representation of a field element.
pub fn to_bytes_be(value: &Fr) -> [u8; 32]
{
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

pub fn to_biguint(value: &Fr) -> BigUint
{
    BigUint::from_bytes_be(&value.into_bigint().to_bytes_be())
}

/// Reduces an arbitrary integer into the field.
pub fn from_biguint(value: &BigUint) -> Fr
{
    Fr::from_be_bytes_mod_order(&value.to_bytes_be())
}

pub fn modulus() -> BigUint
{
    BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be())
}

pub fn to_decimal(value: &Fr) -> String
{
    to_biguint(value).to_str_radix(10)
}

/// Parses a decimal or `0x` prefixed hexadecimal string. Values that are not
/// strictly smaller than the field modulus are rejected rather than reduced.
pub fn parse(value: &str) -> Option<Fr>
{
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(trimmed.as_bytes(), 10),
    }?;

    if parsed >= modulus() { return None; }

    Some(from_biguint(&parsed))
}

/// Narrows a field element to a `u128`, if it fits.
pub fn to_u128(value: &Fr) -> Option<u128>
{
    let bytes = to_bytes_be(value);
    if bytes[..16].iter().any(|byte| *byte != 0) { return None; }

    let mut low = [0u8; 16];
    low.copy_from_slice(&bytes[16..]);
    Some(u128::from_be_bytes(low))
}

/// Serde adapters rendering field elements as decimal strings, the encoding
/// expected by circom witness generators and the on-chain tooling.
pub mod decimal
{
    use ark_bn254::Fr;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_decimal(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid field element `{raw}`")))
    }
}

pub mod decimal_vec
{
    use ark_bn254::Fr;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values
        {
            seq.serialize_element(&super::to_decimal(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| super::parse(raw).ok_or_else(|| D::Error::custom(format!("invalid field element `{raw}`"))))
            .collect()
    }
}

pub mod decimal_matrix
{
    use ark_bn254::Fr;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(rows: &[Vec<Fr>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for row in rows
        {
            let row: Vec<String> = row.iter().map(super::to_decimal).collect();
            seq.serialize_element(&row)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<Fr>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Vec<String>>::deserialize(deserializer)?
            .iter()
            .map(|row| {
                row.iter()
                    .map(|raw| super::parse(raw).ok_or_else(|| D::Error::custom(format!("invalid field element `{raw}`"))))
                    .collect()
            })
            .collect()
    }
}

/// Salts keyed by batch start index.
pub mod decimal_map
{
    use std::collections::BTreeMap;

    use ark_bn254::Fr;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(values: &BTreeMap<usize, Fr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        values
            .iter()
            .map(|(index, value)| (*index, super::to_decimal(value)))
            .collect::<BTreeMap<usize, String>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<usize, Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<usize, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(index, raw)| {
                super::parse(&raw)
                    .map(|value| (index, value))
                    .ok_or_else(|| D::Error::custom(format!("invalid field element `{raw}`")))
            })
            .collect()
    }
}

/// Path elements of a batch of merkle proofs: one `[level][sibling]` matrix per leaf.
pub mod decimal_cube
{
    use ark_bn254::Fr;
    use serde::{ser::SerializeSeq, Serializer};

    pub fn serialize<S>(proofs: &[Vec<Vec<Fr>>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(proofs.len()))?;
        for proof in proofs
        {
            let proof: Vec<Vec<String>> = proof
                .iter()
                .map(|level| level.iter().map(super::to_decimal).collect())
                .collect();
            seq.serialize_element(&proof)?;
        }
        seq.end()
    }
}

pub mod string_u128
{
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|_| D::Error::custom(format!("invalid integer `{raw}`")))
    }
}

pub mod string_u128_vec
{
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[u128], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values
        {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| raw.parse().map_err(|_| D::Error::custom(format!("invalid integer `{raw}`"))))
            .collect()
    }
}
