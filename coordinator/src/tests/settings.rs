use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CoordinatorConfig;
use crate::error::CoreError;
use crate::tests::coordinator;

fn write_config(dir: &Path, body: &str) -> PathBuf
{
    let path = dir.join("coordinator.toml");
    fs::write(&path, body).unwrap();
    path
}

/// Only the address, poll, key and ledger are required.
#[test]
fn defaults()
{
    let dir = tempfile::tempdir().unwrap();
    let body = format!(
        "maci_address = \"0xmaci\"\npoll_id = 3\ncoordinator_private_key = \"{}\"\nledger_dump = \"ledger.json\"\n",
        coordinator().private_key.to_serialized()
    );
    let config = CoordinatorConfig::from_path(write_config(dir.path(), &body)).unwrap();

    assert_eq!(config.maci_address, "0xmaci");
    assert_eq!(config.poll_id, 3);
    assert_eq!(config.from_block, 0);
    assert_eq!(config.end_block, None);
    assert_eq!(config.blocks_per_request, 50);
    assert_eq!(config.sleep_ms, None);
    assert_eq!(config.ipfs.gateway_url, "https://ipfs.io/ipfs");
    assert_eq!(config.ipfs.timeout_secs, 30);
    assert!(config.ipfs_backup_files.is_empty());
    assert_eq!(config.ledger_dump, PathBuf::from("ledger.json"));
    assert_eq!(config.tally_output_path, PathBuf::from("tally.json"));
    assert!(config.logs_output_path.is_none());
    assert!(config.state_output_path.is_none());

    assert_eq!(config.coordinator_keypair().unwrap(), coordinator());
}

#[test]
fn full_file()
{
    let dir = tempfile::tempdir().unwrap();
    let body = format!(
        r#"
maci_address = "0xmaci"
poll_id = 0
coordinator_private_key = "{}"
from_block = 120
end_block = 480
blocks_per_request = 10
sleep_ms = 250
ipfs_backup_files = ["QmA.json", "QmB.json"]
ledger_dump = "ledger.json"
logs_output_path = "logs/actions.json"
tally_output_path = "out/tally.json"

[ipfs]
gateway_url = "http://127.0.0.1:8080/ipfs"
timeout_secs = 5
"#,
        coordinator().private_key.to_serialized()
    );
    let config = CoordinatorConfig::from_path(write_config(dir.path(), &body)).unwrap();

    assert_eq!(config.from_block, 120);
    assert_eq!(config.end_block, Some(480));
    assert_eq!(config.blocks_per_request, 10);
    assert_eq!(config.sleep_ms, Some(250));
    assert_eq!(config.ipfs.gateway_url, "http://127.0.0.1:8080/ipfs");
    assert_eq!(config.ipfs.timeout_secs, 5);
    assert_eq!(config.ipfs_backup_files.len(), 2);
    assert_eq!(config.logs_output_path, Some(PathBuf::from("logs/actions.json")));
    assert_eq!(config.tally_output_path, PathBuf::from("out/tally.json"));
}

#[test]
fn missing_required_field()
{
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "maci_address = \"0xmaci\"\npoll_id = 0\n");

    assert!(matches!(CoordinatorConfig::from_path(path), Err(CoreError::Config(_))));
}

/// The key must carry the serialization prefix and be a field element.
#[test]
fn invalid_private_key()
{
    let dir = tempfile::tempdir().unwrap();
    for key in ["c0ffee", "macisk.zz"]
    {
        let body = format!(
            "maci_address = \"0xmaci\"\npoll_id = 0\ncoordinator_private_key = \"{key}\"\nledger_dump = \"ledger.json\"\n"
        );
        let config = CoordinatorConfig::from_path(write_config(dir.path(), &body)).unwrap();
        assert!(matches!(config.coordinator_keypair(), Err(CoreError::InvalidKey(_))));
    }
}
