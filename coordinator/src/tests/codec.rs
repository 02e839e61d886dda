use ark_bn254::Fr;
use ark_ff::Zero;

use crate::crypto::{random_salt, Keypair};
use crate::domain::{pack_values, Ballot, Message, PCommand, StateLeaf, PACKED_FIELD_LIMIT, PAD_KEY};
use crate::error::CoreError;
use crate::field::{parse, to_decimal, to_u128};
use crate::hash::{hash4, hash_left_right};
use crate::tests::rng;

/// Values occupy consecutive 50-bit slots, lowest first.
#[test]
fn packing_layout()
{
    let two_50 = Fr::from(1u64 << 50);

    assert_eq!(pack_values(&[7]), Fr::from(7u64));
    assert_eq!(pack_values(&[1, 2]), Fr::from(1u64) + Fr::from(2u64) * two_50);
    assert_eq!(
        pack_values(&[3, 0, 5]),
        Fr::from(3u64) + Fr::from(5u64) * two_50 * two_50
    );
    assert_eq!(pack_values(&[]), Fr::zero());
}

/// A command decrypts to exactly what was encrypted, with a valid signature.
#[test]
fn command_encryption()
{
    let mut rng = rng(11);
    let voter = Keypair::random(&mut rng);
    let coordinator = Keypair::random(&mut rng);
    let ephemeral = Keypair::random(&mut rng);

    let command = PCommand::new(3, voter.public_key, 2, 9, 1, 4, random_salt(&mut rng)).unwrap();
    let signature = command.sign(&voter.private_key).unwrap();

    let voter_side = Keypair::gen_ecdh_shared_key(&ephemeral.private_key, &coordinator.public_key);
    let message = command.encrypt(&signature, &voter_side).unwrap();

    let coordinator_side = Keypair::gen_ecdh_shared_key(&coordinator.private_key, &ephemeral.public_key);
    let (decrypted, recovered) = PCommand::decrypt(&message, &coordinator_side).unwrap();

    assert_eq!(decrypted, command);
    assert_eq!(recovered, signature);
    assert!(decrypted.verify_signature(&recovered, &voter.public_key));
    assert!(!decrypted.verify_signature(&recovered, &coordinator.public_key));

    let stranger = Keypair::gen_ecdh_shared_key(&Keypair::random(&mut rng).private_key, &ephemeral.public_key);
    assert!(PCommand::decrypt(&message, &stranger).is_err());
}

/// Every packed field must fit in fifty bits.
#[test]
fn command_field_limits()
{
    let key = Keypair::random(&mut rng(12)).public_key;

    assert!(PCommand::new(PACKED_FIELD_LIMIT - 1, key, 0, 0, 0, 0, Fr::zero()).is_ok());
    assert!(matches!(
        PCommand::new(PACKED_FIELD_LIMIT, key, 0, 0, 0, 0, Fr::zero()),
        Err(CoreError::ValueOutOfRange(_))
    ));
    assert!(PCommand::new(0, key, 0, 0, 0, PACKED_FIELD_LIMIT, Fr::zero()).is_err());
}

#[test]
fn command_hash()
{
    let key = Keypair::random(&mut rng(13)).public_key;
    let command = PCommand::new(1, key, 2, 3, 4, 5, Fr::from(6u64)).unwrap();

    assert_eq!(command.packed(), pack_values(&[1, 2, 3, 4, 5]));
    assert_eq!(
        command.hash().unwrap(),
        hash4([command.packed(), key.x(), key.y(), Fr::from(6u64)]).unwrap()
    );
}

/// The padding message never decrypts.
#[test]
fn padding_message_is_opaque()
{
    let coordinator = Keypair::random(&mut rng(14));
    let shared = Keypair::gen_ecdh_shared_key(&coordinator.private_key, &PAD_KEY);
    assert!(PCommand::decrypt(&Message::padding(), &shared).is_err());
}

/// Message leaves commit to the encryption key as well as the data.
#[test]
fn message_leaf()
{
    let mut rng = rng(15);
    let message = Message::new([Fr::from(1u64); 10]);
    let a = Keypair::random(&mut rng).public_key;
    let b = Keypair::random(&mut rng).public_key;

    assert_ne!(message.hash(&a).unwrap(), message.hash(&b).unwrap());
    assert!(Message::from_slice(&[Fr::zero(); 9]).is_none());

    let json = serde_json::to_string(&message).unwrap();
    assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), message);
}

/// Ballot hashes ignore trailing zero weights.
#[test]
fn ballot_hash()
{
    let empty = Ballot::new(5, 1);
    let mut voted = empty.clone();
    voted.votes[3] = 4;
    voted.nonce = 1;

    assert_eq!(empty.hash().unwrap(), hash_left_right(Fr::zero(), empty.vote_tree().unwrap().root()).unwrap());
    assert_ne!(empty.hash().unwrap(), voted.hash().unwrap());

    let proof = voted.vote_tree().unwrap().gen_proof(3).unwrap();
    assert_eq!(proof.leaf, Fr::from(4u64));
}

#[test]
fn state_leaf_hash()
{
    let key = Keypair::random(&mut rng(16)).public_key;
    let leaf = StateLeaf::new(key, 100, 42);

    assert_eq!(
        leaf.hash().unwrap(),
        hash4([key.x(), key.y(), Fr::from(100u64), Fr::from(42u64)]).unwrap()
    );
    assert_eq!(StateLeaf::blank().public_key, PAD_KEY);
}

/// Decimal and hex strings parse; values at or above the modulus do not.
#[test]
fn field_parsing()
{
    assert_eq!(parse("255"), Some(Fr::from(255u64)));
    assert_eq!(parse("0xff"), Some(Fr::from(255u64)));
    assert_eq!(parse(" 12 "), Some(Fr::from(12u64)));
    assert_eq!(parse("abc"), None);
    assert_eq!(
        parse("21888242871839275222246405745257275088548364400416034343698204186575808495617"),
        None
    );

    let value = Fr::from(u128::MAX);
    assert_eq!(to_u128(&value), Some(u128::MAX));
    assert_eq!(to_u128(&(value + Fr::from(1u64))), None);
    assert_eq!(to_decimal(&Fr::from(1234u64)), "1234");
}
