use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::crypto::{Keypair, PrivateKey};
use crate::error::CoreError;

/// Environment variables overriding file settings start with this prefix,
/// e.g. `MACI__POLL_ID` or `MACI__IPFS__GATEWAY_URL`.
pub const ENV_PREFIX: &str = "MACI";

#[derive(Clone, Debug, Deserialize)]
pub struct CoordinatorConfig
{
    pub maci_address: String,
    pub poll_id: u64,

    /// Serialized as `macisk.<hex>`.
    pub coordinator_private_key: String,

    #[serde(default)]
    pub from_block: u64,

    /// Last block to replay; defaults to the head of the recorded ledger.
    #[serde(default)]
    pub end_block: Option<u64>,

    #[serde(default = "default_blocks_per_request")]
    pub blocks_per_request: u64,

    /// Pause between block windows, in milliseconds.
    #[serde(default)]
    pub sleep_ms: Option<u64>,

    #[serde(default)]
    pub ipfs: IpfsConfig,

    /// Local copies of IPFS message batches, each named `<contentHash>.json`.
    #[serde(default)]
    pub ipfs_backup_files: Vec<PathBuf>,

    /// Recorded ledger events to replay.
    pub ledger_dump: PathBuf,

    #[serde(default)]
    pub logs_output_path: Option<PathBuf>,

    #[serde(default = "default_tally_output_path")]
    pub tally_output_path: PathBuf,

    #[serde(default)]
    pub state_output_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IpfsConfig
{
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IpfsConfig
{
    fn default() -> Self
    {
        IpfsConfig {
            gateway_url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_blocks_per_request() -> u64
{
    50
}

fn default_tally_output_path() -> PathBuf
{
    PathBuf::from("tally.json")
}

fn default_gateway_url() -> String
{
    "https://ipfs.io/ipfs".to_string()
}

fn default_timeout_secs() -> u64
{
    30
}

impl CoordinatorConfig
{
    /// Reads the file at `path` (format chosen by extension), then applies
    /// environment overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError>
    {
        debug!(path = %path.as_ref().display(), "reading coordinator config");

        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn coordinator_keypair(&self) -> Result<Keypair, CoreError>
    {
        let private_key = PrivateKey::from_serialized(&self.coordinator_private_key)?;
        Ok(Keypair::new(private_key))
    }
}
