use ark_bn254::Fr;
use ark_ff::Zero;
use rand::rngs::StdRng;

use crate::error::CoreError;
use crate::hash::{hash3, hash_left_right};
use crate::output::{verify_tally, TallyData};
use crate::poll::{gen_spent_commitment, gen_tree_commitment, Mode, Poll};
use crate::tests::{depths, election, rng, Election, POLL_END};

/// Voter `i` gives `weight` to option `i % 5`; every message is processed.
fn processed_election(rng: &mut StdRng, count: usize, mode: Mode, tally_depth: usize, weight: u64) -> Election
{
    let mut election = election(rng, count, 10, depths(tally_depth), mode);
    for voter in 0..count
    {
        election.vote(rng, voter, (voter % 5) as u64, weight, 1);
    }
    election.close();
    election.poll_mut().process_all_messages(POLL_END, rng).unwrap();
    election
}

/// Thirty one-credit votes spread over five options.
#[test]
fn thirty_voters()
{
    let mut rng = rng(41);
    let mut election = processed_election(&mut rng, 30, Mode::Qv, 3, 1);
    let poll = election.poll_mut();
    assert_eq!(poll.num_batches_processed(), 6);

    let batches = poll.tally_all_votes(&mut rng).unwrap();
    assert_eq!(batches.len(), 4);
    assert_eq!(poll.total_tally_batches(), 4);

    assert_eq!(poll.tally_result(), &[6, 6, 6, 6, 6]);
    assert_eq!(poll.per_vo_spent_voice_credits(), &[6, 6, 6, 6, 6]);
    assert_eq!(poll.total_spent_voice_credits(), 30);

    let commitments = poll.tally_commitments().unwrap();
    let (per_vo_salt, per_vo_commitment) = commitments.per_vo_spent.unwrap();
    assert_eq!(
        commitments.results_commitment,
        gen_tree_commitment(poll.tally_result(), 1, commitments.results_salt).unwrap()
    );
    assert_eq!(commitments.spent_commitment, gen_spent_commitment(30, commitments.spent_salt).unwrap());
    assert_eq!(
        per_vo_commitment,
        gen_tree_commitment(poll.per_vo_spent_voice_credits(), 1, per_vo_salt).unwrap()
    );
    assert_eq!(
        commitments.tally_commitment,
        hash3([commitments.results_commitment, commitments.spent_commitment, per_vo_commitment]).unwrap()
    );
    assert_eq!(batches.last().unwrap().new_tally_commitment, commitments.tally_commitment);
}

/// Thirty one-credit votes for the same option.
#[test]
fn thirty_votes_for_one_option()
{
    let mut rng = rng(40);
    let mut election = election(&mut rng, 30, 10, depths(3), Mode::Qv);
    for voter in 0..30
    {
        election.vote(&mut rng, voter, 0, 1, 1);
    }
    election.close();

    let poll = election.poll_mut();
    poll.process_all_messages(POLL_END, &mut rng).unwrap();
    poll.tally_all_votes(&mut rng).unwrap();

    assert_eq!(poll.tally_result(), &[30, 0, 0, 0, 0]);
    assert_eq!(poll.total_spent_voice_credits(), 30);
    assert_eq!(poll.per_vo_spent_voice_credits()[0], 30);
}

/// Each batch starts from the commitment the previous batch produced.
#[test]
fn tally_commitment_chain()
{
    let mut rng = rng(42);
    let mut election = processed_election(&mut rng, 9, Mode::Qv, 2, 2);
    let poll = election.poll_mut();
    let num_signups = poll.num_signups();

    let batches = poll.tally_all_votes(&mut rng).unwrap();
    assert_eq!(batches.len(), 3);

    assert_eq!(batches[0].current_tally_commitment, Fr::zero());
    for pair in batches.windows(2)
    {
        assert_eq!(pair[1].current_tally_commitment, pair[0].new_tally_commitment);
        assert_eq!(pair[1].current_results_root_salt, pair[0].new_results_root_salt);
    }

    assert_eq!(batches[2].packed_vals, crate::domain::pack_values(&[2, num_signups]));
    assert_eq!(batches[2].ballots.len(), 4);
    assert_eq!(batches[2].votes.len(), 4);
    assert_eq!(batches[0].ballot_path_elements.len(), 6 - 2);
}

/// Tallying waits for processing and stops after the last ballot.
#[test]
fn tally_sequencing()
{
    let mut rng = rng(43);
    let mut election = election(&mut rng, 3, 10, depths(2), Mode::Qv);
    election.vote(&mut rng, 0, 1, 1, 1);
    election.close();

    let poll = election.poll_mut();
    assert!(matches!(poll.tally_votes(&mut rng), Err(CoreError::ProcessingNotComplete)));
    assert!(matches!(poll.tally_commitments(), Err(CoreError::TallyNotComplete)));

    poll.process_all_messages(POLL_END, &mut rng).unwrap();
    poll.tally_votes(&mut rng).unwrap();
    assert!(!poll.has_untallied_ballots());
    assert!(matches!(poll.tally_votes(&mut rng), Err(CoreError::AllBallotsTallied)));
    assert_eq!(poll.tally_result(), &[0, 1, 0, 0, 0]);
}

/// Results do not depend on how ballots are split into batches.
#[test]
fn batch_size_does_not_change_results()
{
    let tally = |tally_depth: usize| {
        let mut rng = rng(44);
        let mut election = processed_election(&mut rng, 12, Mode::Qv, tally_depth, 3);
        let poll = election.poll_mut();
        poll.tally_all_votes(&mut rng).unwrap();
        (
            poll.num_batches_tallied(),
            poll.tally_result().to_vec(),
            poll.per_vo_spent_voice_credits().to_vec(),
            poll.total_spent_voice_credits(),
        )
    };

    let (small_batches, results, per_vo, spent) = tally(1);
    let (large_batches, large_results, large_per_vo, large_spent) = tally(4);

    assert_eq!(small_batches, 7);
    assert_eq!(large_batches, 1);
    assert_eq!(results, large_results);
    assert_eq!(per_vo, large_per_vo);
    assert_eq!(spent, large_spent);
    assert_eq!(results, vec![9, 9, 6, 6, 6]);
    assert_eq!(spent, 12 * 9);
}

/// Linear modes charge the weight itself and commit without a per-option tree.
#[test]
fn linear_tally()
{
    let mut rng = rng(45);
    let mut election = processed_election(&mut rng, 5, Mode::NonQv, 2, 4);
    let poll = election.poll_mut();
    poll.tally_all_votes(&mut rng).unwrap();

    assert_eq!(poll.total_spent_voice_credits(), 20);
    assert_eq!(poll.per_vo_spent_voice_credits(), &[4, 4, 4, 4, 4]);

    let commitments = poll.tally_commitments().unwrap();
    assert!(commitments.per_vo_spent.is_none());
    assert_eq!(
        commitments.tally_commitment,
        hash_left_right(commitments.results_commitment, commitments.spent_commitment).unwrap()
    );

    let tally = TallyData::from_poll("0xmaci", poll).unwrap();
    assert!(!tally.is_quadratic);
    assert!(tally.per_vo_spent_voice_credits.is_none());
    verify_tally(&tally, 1).unwrap();
}

/// Inclusion proofs for single results check against the results commitment.
#[test]
fn result_proofs()
{
    let mut rng = rng(46);
    let mut election = processed_election(&mut rng, 7, Mode::Qv, 3, 1);
    let poll = election.poll_mut();
    assert!(matches!(poll.result_proof(0), Err(CoreError::TallyNotComplete)));

    poll.tally_all_votes(&mut rng).unwrap();
    let commitment = poll.tally_commitments().unwrap().results_commitment;

    let proof = poll.result_proof(1).unwrap();
    assert_eq!(proof.tally, 2);
    assert!(proof.verify(commitment).unwrap());

    let mut forged = proof.clone();
    forged.tally = 3;
    assert!(!forged.verify(commitment).unwrap());
    assert!(!proof.verify(commitment + Fr::from(1u64)).unwrap());

    assert!(matches!(
        poll.result_proof(5),
        Err(CoreError::VoteOptionOutOfRange { index: 5, max: 5 })
    ));
}

/// Every altered field of a tally file is caught.
#[test]
fn tally_file_tampering()
{
    let mut rng = rng(47);
    let mut election = processed_election(&mut rng, 4, Mode::Qv, 2, 2);
    let poll = election.poll_mut();
    poll.tally_all_votes(&mut rng).unwrap();

    let tally = TallyData::from_poll("0xmaci", poll).unwrap();
    verify_tally(&tally, 1).unwrap();

    let mut results = tally.clone();
    results.results.tally[0] += 1;
    assert!(matches!(verify_tally(&results, 1), Err(CoreError::TallyMismatch("results"))));

    let mut spent = tally.clone();
    spent.total_spent_voice_credits.spent -= 1;
    assert!(matches!(verify_tally(&spent, 1), Err(CoreError::TallyMismatch("totalSpentVoiceCredits"))));

    let mut per_vo = tally.clone();
    per_vo.per_vo_spent_voice_credits = None;
    assert!(matches!(verify_tally(&per_vo, 1), Err(CoreError::TallyMismatch("perVOSpentVoiceCredits"))));

    let mut commitment = tally.clone();
    commitment.new_tally_commitment += Fr::from(1u64);
    assert!(matches!(verify_tally(&commitment, 1), Err(CoreError::TallyMismatch("newTallyCommitment"))));
}

/// The tally file keeps the published field names and reads back unchanged.
#[test]
fn tally_file_round_trip()
{
    let mut rng = rng(48);
    let mut election = processed_election(&mut rng, 3, Mode::Qv, 2, 1);
    let poll = election.poll_mut();
    poll.tally_all_votes(&mut rng).unwrap();

    let tally = TallyData::from_poll("0xmaci", poll).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.json");
    tally.write(&path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["pollId"], "0");
    assert_eq!(json["isQuadratic"], true);
    assert!(json["newTallyCommitment"].is_string());
    assert_eq!(json["results"]["tally"][0], "1");
    assert!(json["perVOSpentVoiceCredits"]["commitment"].is_string());

    assert_eq!(TallyData::read(&path).unwrap(), tally);
}

/// A poll saved between batches resumes where it stopped.
#[test]
fn resume_from_saved_state()
{
    let mut rng = rng(49);
    let mut election = election(&mut rng, 8, 10, depths(2), Mode::Qv);
    for voter in 0..8
    {
        election.vote(&mut rng, voter, (voter % 3) as u64, 2, 1);
    }
    election.close();

    let mut reference = election.poll().clone();
    reference.process_all_messages(POLL_END, &mut rng).unwrap();
    reference.tally_all_votes(&mut rng).unwrap();

    let poll = election.poll_mut();
    let first = poll.process_messages(POLL_END, &mut rng).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poll.json");
    poll.save(&path).unwrap();

    let mut resumed = Poll::load(&path).unwrap();
    assert_eq!(resumed.state_root(), poll.state_root());
    assert_eq!(resumed.ballot_root(), poll.ballot_root());
    assert_eq!(resumed.chain_hash(), poll.chain_hash());
    assert_eq!(resumed.num_batches_processed(), 1);

    let second = resumed.process_messages(POLL_END, &mut rng).unwrap();
    assert_eq!(second.circuit_inputs.current_sb_commitment, first.circuit_inputs.new_sb_commitment);
    assert_eq!(second.circuit_inputs.msg_root, first.circuit_inputs.msg_root);

    resumed.tally_all_votes(&mut rng).unwrap();
    assert_eq!(resumed.state_root(), reference.state_root());
    assert_eq!(resumed.tally_result(), reference.tally_result());
    assert_eq!(resumed.total_spent_voice_credits(), 32);
    assert!(resumed.has_joined(&election.voters[3].nullifier(0).unwrap()));
}

/// Saves a poll, edits its JSON and reloads it.
fn load_edited(poll: &Poll, edit: impl FnOnce(&mut serde_json::Value)) -> Result<Poll, CoreError>
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poll.json");
    poll.save(&path).unwrap();

    let mut json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    edit(&mut json);
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    Poll::load(&path)
}

/// A snapshot whose parts disagree is refused rather than half loaded.
#[test]
fn inconsistent_snapshot()
{
    let mut rng = rng(50);
    let mut election = election(&mut rng, 3, 10, depths(2), Mode::Qv);
    for voter in 0..3
    {
        election.vote(&mut rng, voter, 3, 1, 1);
    }
    election.close();
    let poll = election.poll_mut();
    poll.process_messages(POLL_END, &mut rng).unwrap();

    assert!(load_edited(poll, |_| ()).is_ok());

    let cases: Vec<Box<dyn FnOnce(&mut serde_json::Value)>> = vec![
        Box::new(|json| {
            json["encPublicKeys"].as_array_mut().unwrap().pop();
        }),
        Box::new(|json| {
            json["ballots"][1]["votes"].as_array_mut().unwrap().truncate(1);
        }),
        Box::new(|json| {
            json["ballots"][1]["voteOptionTreeDepth"] = serde_json::json!(1);
        }),
        Box::new(|json| {
            json["ballots"][1]["nonce"] = serde_json::json!(u64::MAX);
        }),
        Box::new(|json| {
            json["ballots"].as_array_mut().unwrap().pop();
        }),
        Box::new(|json| {
            json["stateLeaves"] = serde_json::json!([]);
        }),
        Box::new(|json| {
            json["results"].as_array_mut().unwrap().pop();
        }),
    ];
    for edit in cases
    {
        assert!(matches!(load_edited(poll, edit), Err(CoreError::InvalidSnapshot(_))));
    }
}
