use ark_bn254::Fr;
use ark_ff::Zero;

use crate::crypto::Keypair;
use crate::domain::{pack_values, Message, PCommand, PAD_KEY};
use crate::error::{CoreError, ProcessMessageError};
use crate::hash::hash3;
use crate::poll::Mode;
use crate::tests::{depths, election, rng, POLL_END, VOTE_OPTIONS};

/// A valid vote moves credits from the state leaf into the ballot.
#[test]
fn valid_vote()
{
    let mut rng = rng(21);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 2, 3, 1);
    election.close();

    let poll = election.poll_mut();
    let batches = poll.process_all_messages(POLL_END, &mut rng).unwrap();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].no_ops.is_empty());

    assert_eq!(poll.ballots()[1].nonce, 1);
    assert_eq!(poll.ballots()[1].votes, vec![0, 0, 3, 0, 0]);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 1);
}

/// Only the command whose nonce is one above the ballot's takes effect.
#[test]
fn nonce_must_advance_by_one()
{
    let mut rng = rng(22);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::NonQv);
    election.vote(&mut rng, 0, 0, 1, 1);
    election.vote(&mut rng, 0, 1, 1, 1);
    election.vote(&mut rng, 0, 2, 1, 3);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(
        batch.no_ops,
        vec![(1, ProcessMessageError::InvalidNonce), (2, ProcessMessageError::InvalidNonce)]
    );
    assert_eq!(poll.ballots()[1].nonce, 1);
    assert_eq!(poll.ballots()[1].votes, vec![1, 0, 0, 0, 0]);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 9);
}

/// Changing a vote refunds the cost of the previous weight.
#[test]
fn revote_refunds_previous_weight()
{
    let mut rng = rng(23);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 0, 3, 1);
    election.vote(&mut rng, 0, 0, 2, 2);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert!(batch.no_ops.is_empty());
    assert_eq!(poll.ballots()[1].votes[0], 2);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 6);
}

#[test]
fn insufficient_voice_credits()
{
    let mut rng = rng(24);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 0, 4, 1);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(batch.no_ops, vec![(0, ProcessMessageError::InsufficientVoiceCredits)]);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 10);
    assert_eq!(poll.ballots()[1].nonce, 0);
}

/// Commands must be signed by the key currently held in the target leaf.
#[test]
fn signature_binds_state_leaf()
{
    let mut rng = rng(25);
    let mut election = election(&mut rng, 2, 10, depths(2), Mode::NonQv);
    let intruder = election.voters[0].clone();
    election.vote_as(&mut rng, &intruder, 2, 0, 1, 1);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(batch.no_ops, vec![(0, ProcessMessageError::InvalidSignature)]);
    assert_eq!(poll.ballots()[2].nonce, 0);
}

/// A key change takes effect for every later command.
#[test]
fn key_change()
{
    let mut rng = rng(26);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::NonQv);
    let original = election.voters[0].clone();
    let rotated = Keypair::random(&mut rng);

    // Signed by the original key, installing the rotated one.
    let coordinator_key = election.poll().coordinator_keypair().public_key;
    let command = PCommand::new(1, rotated.public_key, 0, 1, 1, 0, Fr::from(7u64)).unwrap();
    let signature = command.sign(&original.private_key).unwrap();
    let ephemeral = Keypair::random(&mut rng);
    let shared = Keypair::gen_ecdh_shared_key(&ephemeral.private_key, &coordinator_key);
    let message = command.encrypt(&signature, &shared).unwrap();
    election.poll_mut().publish_message(message, ephemeral.public_key).unwrap();

    election.vote_as(&mut rng, &original, 1, 1, 1, 2);
    election.vote_as(&mut rng, &rotated, 1, 2, 1, 2);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(batch.no_ops, vec![(1, ProcessMessageError::InvalidSignature)]);
    assert_eq!(poll.state_leaves()[1].public_key, rotated.public_key);
    assert_eq!(poll.ballots()[1].votes, vec![1, 0, 1, 0, 0]);
}

#[test]
fn out_of_range_indices()
{
    let mut rng = rng(27);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::NonQv);
    let voter = election.voters[0].clone();
    election.vote_as(&mut rng, &voter, 0, 0, 1, 1);
    election.vote_as(&mut rng, &voter, 2, 0, 1, 1);
    election.vote(&mut rng, 0, VOTE_OPTIONS as u64, 1, 1);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(
        batch.no_ops,
        vec![
            (0, ProcessMessageError::InvalidStateLeafIndex),
            (1, ProcessMessageError::InvalidStateLeafIndex),
            (2, ProcessMessageError::InvalidVoteOptionIndex),
        ]
    );
}

/// In full credit mode a non-zero vote must spend the whole balance.
#[test]
fn full_credit_mode()
{
    let mut rng = rng(28);
    let mut election = election(&mut rng, 2, 10, depths(2), Mode::Full);
    election.vote(&mut rng, 0, 0, 4, 1);
    election.vote(&mut rng, 1, 3, 10, 1);
    election.close();

    let poll = election.poll_mut();
    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();

    assert_eq!(batch.no_ops, vec![(0, ProcessMessageError::InvalidVoteWeight)]);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 10);
    assert_eq!(poll.state_leaves()[2].voice_credit_balance, 0);
    assert_eq!(poll.ballots()[2].votes[3], 10);
}

/// A message that fails to decrypt changes nothing, and the new commitment
/// is taken over the unchanged roots.
#[test]
fn undecryptable_message_is_noop()
{
    let mut rng = rng(29);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    election.poll_mut().publish_message(Message::padding(), PAD_KEY).unwrap();
    election.close();

    let poll = election.poll_mut();
    let state_root = poll.state_root();
    let ballot_root = poll.ballot_root();

    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();
    let inputs = &batch.circuit_inputs;

    assert_eq!(batch.no_ops, vec![(0, ProcessMessageError::FailedDecryption)]);
    assert_eq!(poll.state_root(), state_root);
    assert_eq!(poll.ballot_root(), ballot_root);

    assert_eq!(inputs.current_sb_salt, Fr::zero());
    assert_eq!(inputs.current_sb_commitment, hash3([state_root, ballot_root, Fr::zero()]).unwrap());
    assert_eq!(inputs.new_sb_commitment, hash3([state_root, ballot_root, inputs.new_sb_salt]).unwrap());
}

/// Nothing can be processed before the poll ends, and nothing is left after
/// the last batch.
#[test]
fn processing_window()
{
    let mut rng = rng(30);
    let mut election = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 0, 1, 1);
    election.close();

    let poll = election.poll_mut();
    let before = poll.state_root();
    assert!(matches!(
        poll.process_messages(POLL_END - 1, &mut rng),
        Err(CoreError::VotingPeriodNotOver { end: POLL_END, now }) if now == POLL_END - 1
    ));
    assert_eq!(poll.num_batches_processed(), 0);
    assert_eq!(poll.state_root(), before);

    poll.process_messages(POLL_END, &mut rng).unwrap();
    assert!(!poll.has_unprocessed_messages());
    assert!(matches!(poll.process_messages(POLL_END, &mut rng), Err(CoreError::NoMoreMessages)));
}

/// A poll without messages still has one batch to process.
#[test]
fn empty_poll_has_one_batch()
{
    let mut rng = rng(31);
    let mut election = election(&mut rng, 2, 10, depths(2), Mode::Qv);
    election.close();

    let poll = election.poll_mut();
    assert_eq!(poll.total_message_batches(), 1);

    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();
    assert_eq!(batch.batch_start_index, 0);
    assert!(batch.no_ops.is_empty());
    assert_eq!(batch.circuit_inputs.msgs.len(), 5);
    assert!(!poll.has_unprocessed_messages());
}

/// Batches are taken newest first; messages inside a batch in publication order.
#[test]
fn batches_run_newest_first()
{
    let mut rng = rng(32);
    let mut election = election(&mut rng, 1, 20, depths(2), Mode::NonQv);
    election.vote(&mut rng, 0, 0, 1, 1);
    for _ in 0..4
    {
        election.poll_mut().publish_message(Message::padding(), PAD_KEY).unwrap();
    }
    // Sixth message, second batch: processed before the first batch.
    election.vote(&mut rng, 0, 1, 2, 2);
    election.close();

    let poll = election.poll_mut();
    assert_eq!(poll.total_message_batches(), 2);
    assert_eq!(poll.batch_hashes().len(), 2);

    let newest = poll.process_messages(POLL_END, &mut rng).unwrap();
    assert_eq!(newest.batch_start_index, 5);
    assert_eq!(newest.no_ops, vec![(5, ProcessMessageError::InvalidNonce)]);

    let oldest = poll.process_messages(POLL_END, &mut rng).unwrap();
    assert_eq!(oldest.batch_start_index, 0);
    assert_eq!(oldest.circuit_inputs.current_sb_commitment, newest.circuit_inputs.new_sb_commitment);

    assert_eq!(poll.ballots()[1].votes, vec![1, 0, 0, 0, 0]);
    assert_eq!(poll.state_leaves()[1].voice_credit_balance, 19);
}

/// The circuit inputs of a partial batch are padded to the batch size and
/// carry the batch metadata.
#[test]
fn circuit_inputs_shape()
{
    let mut rng = rng(33);
    let mut election = election(&mut rng, 3, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 0, 1, 1);
    election.vote(&mut rng, 1, 1, 2, 1);
    election.vote(&mut rng, 2, 2, 3, 1);
    election.close();

    let poll = election.poll_mut();
    let num_signups = poll.num_signups();
    let chain_hash = poll.chain_hash();
    let initial_hash = poll.batch_hashes()[0];

    let batch = poll.process_messages(POLL_END, &mut rng).unwrap();
    let inputs = &batch.circuit_inputs;

    assert_eq!(num_signups, 4);
    assert_eq!(inputs.packed_vals, pack_values(&[VOTE_OPTIONS as u64, num_signups, 0, 3]));
    assert_eq!(inputs.input_batch_hash, initial_hash);
    assert_eq!(inputs.output_batch_hash, chain_hash);

    assert_eq!(inputs.msgs.len(), 5);
    assert_eq!(inputs.msgs[3], inputs.msgs[2]);
    assert_eq!(inputs.enc_pub_keys.len(), 5);
    assert_eq!(inputs.current_state_leaves.len(), 5);
    assert!(inputs.current_state_leaves_path_elements.iter().all(|path| path.len() == 6));
    assert!(inputs.current_vote_weights_path_elements.iter().all(|path| path.len() == 1));

    let json = serde_json::to_value(inputs).unwrap();
    assert!(json["currentSbCommitment"].is_string());
    assert_eq!(json["msgs"].as_array().unwrap().len(), 5);
}

/// Processing is deterministic given the same randomness.
#[test]
fn processing_is_reproducible()
{
    let run = || {
        let mut rng = rng(34);
        let mut election = election(&mut rng, 2, 10, depths(2), Mode::Qv);
        election.vote(&mut rng, 0, 1, 2, 1);
        election.vote(&mut rng, 1, 4, 3, 1);
        election.close();

        let poll = election.poll_mut();
        let batch = poll.process_messages(POLL_END, &mut rng).unwrap();
        (poll.state_root(), poll.ballot_root(), batch.circuit_inputs.input_hash)
    };

    assert_eq!(run(), run());
}

/// Padding closes a partial last batch at the current chain hash.
#[test]
fn pad_last_batch()
{
    let mut rng = rng(35);
    let mut partial = election(&mut rng, 3, 10, depths(2), Mode::Qv);
    for voter in 0..3
    {
        partial.vote(&mut rng, voter, 0, 1, 1);
        partial.vote(&mut rng, voter, 1, 1, 2);
    }
    partial.vote(&mut rng, 0, 2, 1, 3);

    let poll = partial.poll_mut();
    assert_eq!(poll.messages().len(), 7);
    assert_eq!(poll.batch_hashes().len(), 2);

    poll.pad_last_batch();
    assert_eq!(poll.batch_hashes().len(), 3);
    assert_eq!(poll.batch_hashes()[2], poll.chain_hash());

    poll.pad_last_batch();
    assert_eq!(poll.batch_hashes().len(), 3);

    let mut full = election(&mut rng, 1, 10, depths(2), Mode::Qv);
    for nonce in 1..=5
    {
        full.vote(&mut rng, 0, 0, 1, nonce);
    }
    full.poll_mut().pad_last_batch();
    assert_eq!(full.poll().batch_hashes().len(), 2);
}
