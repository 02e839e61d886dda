use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::IpfsConfig;
use crate::crypto::PublicKey;
use crate::domain::Message;
use crate::error::CoreError;

/// One message of an off-chain batch, with the key it was encrypted to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpfsMessage
{
    pub data: Message,
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// The two layouts a stored batch may have.
#[derive(Deserialize)]
#[serde(untagged)]
enum IpfsBatch
{
    Messages(Vec<IpfsMessage>),
    #[serde(rename_all = "camelCase")]
    Legacy
    {
        messages: Vec<Message>,
        enc_pub_keys: Vec<PublicKey>,
    },
}

/// Parses a batch in either layout.
pub fn parse_batch(body: &str) -> Result<Vec<IpfsMessage>, CoreError>
{
    match serde_json::from_str::<IpfsBatch>(body)?
    {
        IpfsBatch::Messages(messages) => Ok(messages),
        IpfsBatch::Legacy { messages, enc_pub_keys } =>
        {
            if messages.len() != enc_pub_keys.len()
            {
                Err(CoreError::Relay(format!(
                    "batch holds {} messages but {} encryption keys",
                    messages.len(),
                    enc_pub_keys.len()
                )))?
            }

            Ok(messages
                .into_iter()
                .zip(enc_pub_keys)
                .map(|(data, public_key)| IpfsMessage { data, public_key, hash: None })
                .collect())
        }
    }
}

/// A content addressed store returning the raw body stored under a hash.
#[async_trait]
pub trait ContentGateway: Send + Sync
{
    async fn fetch(&self, content_hash: &str) -> Result<String, CoreError>;
}

/// Reads content through an HTTP gateway at `<gateway_url>/<hash>`.
pub struct HttpGateway
{
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpGateway
{
    pub fn new(config: &IpfsConfig) -> Result<Self, CoreError>
    {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CoreError::Relay(error.to_string()))?;

        Ok(HttpGateway {
            client,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentGateway for HttpGateway
{
    async fn fetch(&self, content_hash: &str) -> Result<String, CoreError>
    {
        let url = format!("{}/{content_hash}", self.gateway_url);
        debug!(%url, "fetching message batch");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| CoreError::Relay(error.to_string()))?;

        response.text().await.map_err(|error| CoreError::Relay(error.to_string()))
    }
}

/// Resolves message batches referenced on chain, falling back to local
/// backups when the gateway fails or returns nothing.
pub struct MessageRelay
{
    gateway: Box<dyn ContentGateway>,
    backups: HashMap<String, Vec<IpfsMessage>>,
}

impl MessageRelay
{
    pub fn new(gateway: Box<dyn ContentGateway>) -> Self
    {
        MessageRelay { gateway, backups: HashMap::new() }
    }

    /// Loads backup files; each file's stem is the content hash it stands in for.
    pub fn with_backup_files<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<Self, CoreError>
    {
        for path in paths
        {
            let path = path.as_ref();
            let Some(content_hash) = path.file_stem().and_then(|stem| stem.to_str()) else {
                return Err(CoreError::Relay(format!("cannot name a batch after {}", path.display())));
            };

            let messages = parse_batch(&fs::read_to_string(path)?)?;
            debug!(%content_hash, messages = messages.len(), "loaded backup batch");
            self.backups.insert(content_hash.to_string(), messages);
        }
        Ok(self)
    }

    pub fn add_backup(&mut self, content_hash: impl Into<String>, messages: Vec<IpfsMessage>)
    {
        self.backups.insert(content_hash.into(), messages);
    }

    pub async fn read(&self, content_hash: &str) -> Result<Vec<IpfsMessage>, CoreError>
    {
        let fetched = match self.gateway.fetch(content_hash).await
        {
            Ok(body) => parse_batch(&body),
            Err(error) => Err(error),
        };

        match fetched
        {
            Ok(messages) if !messages.is_empty() =>
            {
                info!(%content_hash, messages = messages.len(), "resolved message batch");
                return Ok(messages);
            }
            Ok(_) => warn!(%content_hash, "gateway returned an empty batch"),
            Err(error) => warn!(%content_hash, %error, "gateway read failed"),
        }

        match self.backups.get(content_hash)
        {
            Some(messages) if !messages.is_empty() =>
            {
                info!(%content_hash, messages = messages.len(), "resolved message batch from backup");
                Ok(messages.clone())
            }
            _ => Err(CoreError::MissingIpfsBatch(content_hash.to_string())),
        }
    }
}
