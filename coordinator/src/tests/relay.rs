use std::fs;

use ark_bn254::Fr;

use crate::crypto::Keypair;
use crate::domain::Message;
use crate::error::CoreError;
use crate::relay::{parse_batch, IpfsMessage, MessageRelay};
use crate::tests::{rng, PinnedGateway};

fn batch(count: u64) -> Vec<IpfsMessage>
{
    let mut rng = rng(count);
    (0..count)
        .map(|i| IpfsMessage {
            data: Message::new([Fr::from(i + 1); 10]),
            public_key: Keypair::random(&mut rng).public_key,
            hash: None,
        })
        .collect()
}

/// The legacy layout keeps messages and keys in parallel arrays.
fn legacy_body(messages: &[IpfsMessage]) -> String
{
    serde_json::json!({
        "messages": messages.iter().map(|m| m.data).collect::<Vec<_>>(),
        "encPubKeys": messages.iter().map(|m| m.public_key).collect::<Vec<_>>(),
    })
    .to_string()
}

#[test]
fn parse_both_layouts()
{
    let messages = batch(3);

    let current = serde_json::to_string(&messages).unwrap();
    assert_eq!(parse_batch(&current).unwrap(), messages);
    assert_eq!(parse_batch(&legacy_body(&messages)).unwrap(), messages);
}

/// Parallel arrays of different lengths are rejected.
#[test]
fn legacy_layout_length_mismatch()
{
    let messages = batch(2);
    let body = serde_json::json!({
        "messages": messages.iter().map(|m| m.data).collect::<Vec<_>>(),
        "encPubKeys": [messages[0].public_key],
    })
    .to_string();

    assert!(matches!(parse_batch(&body), Err(CoreError::Relay(_))));
    assert!(parse_batch("{\"unexpected\": true}").is_err());
}

#[tokio::test]
async fn reads_from_gateway()
{
    let messages = batch(2);
    let gateway = PinnedGateway::default().pin("QmBatch", serde_json::to_string(&messages).unwrap());
    let relay = MessageRelay::new(Box::new(gateway));

    assert_eq!(relay.read("QmBatch").await.unwrap(), messages);
}

/// An empty or failed gateway read falls back to a backup file named after
/// the content hash.
#[tokio::test]
async fn falls_back_to_backup_file()
{
    let messages = batch(4);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("QmEmpty.json");
    fs::write(&path, legacy_body(&messages)).unwrap();

    let gateway = PinnedGateway::default().pin("QmEmpty", "").pin("QmNone", "[]");
    let mut relay = MessageRelay::new(Box::new(gateway)).with_backup_files(&[&path]).unwrap();
    relay.add_backup("QmNone", messages[..1].to_vec());
    relay.add_backup("QmDown", messages[1..].to_vec());

    assert_eq!(relay.read("QmEmpty").await.unwrap(), messages);
    assert_eq!(relay.read("QmNone").await.unwrap(), messages[..1].to_vec());
    assert_eq!(relay.read("QmDown").await.unwrap(), messages[1..].to_vec());
}

#[tokio::test]
async fn missing_batch_is_fatal()
{
    let relay = MessageRelay::new(Box::new(PinnedGateway::default().pin("QmEmpty", "[]")));

    assert!(matches!(relay.read("QmGone").await, Err(CoreError::MissingIpfsBatch(hash)) if hash == "QmGone"));
    assert!(matches!(relay.read("QmEmpty").await, Err(CoreError::MissingIpfsBatch(_))));
}

/// Unreadable backup files fail when the relay is built.
#[test]
fn invalid_backup_file()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("QmBroken.json");
    fs::write(&path, "not json").unwrap();

    let relay = MessageRelay::new(Box::new(PinnedGateway::default())).with_backup_files(&[&path]);
    assert!(matches!(relay, Err(CoreError::Json(_))));

    let missing = MessageRelay::new(Box::new(PinnedGateway::default()))
        .with_backup_files(&[dir.path().join("QmAbsent.json")]);
    assert!(matches!(missing, Err(CoreError::Io(_))));
}
