//! Provider types and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Maximum number of entries accepted by one batched call
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::AwsSqs => 10,
            Self::InMemory => 10,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwsSqs => write!(f, "AwsSqs"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// Provider-specific configuration
///
/// Serialized with a `type` tag. When reading, a section without `type`
/// is an SQS configuration, so `provider: { region: eu-west-1 }` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", from = "ProviderSection")]
pub enum ProviderConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ProviderTag {
    #[default]
    AwsSqs,
    InMemory,
}

/// Provider section as written in configuration
///
/// Every provider's fields are read from the same map; only the ones of
/// the tagged provider are kept.
#[derive(Deserialize)]
struct ProviderSection {
    #[serde(rename = "type", default)]
    tag: ProviderTag,
    #[serde(flatten)]
    aws_sqs: AwsSqsConfig,
    #[serde(flatten)]
    in_memory: InMemoryConfig,
}

impl From<ProviderSection> for ProviderConfig {
    fn from(section: ProviderSection) -> Self {
        match section.tag {
            ProviderTag::AwsSqs => Self::AwsSqs(section.aws_sqs),
            ProviderTag::InMemory => Self::InMemory(section.in_memory),
        }
    }
}

impl ProviderConfig {
    /// Provider type this configuration creates
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AwsSqs(_) => ProviderType::AwsSqs,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::AwsSqs(AwsSqsConfig::default())
    }
}

/// AWS SQS configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSqsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Overrides the regional endpoint, e.g. for LocalStack
    pub endpoint_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for AwsSqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
            request_timeout_seconds: 30,
        }
    }
}

impl AwsSqsConfig {
    /// Fill in credentials missing from configuration using the standard
    /// `AWS_*` environment variables
    pub fn with_env_credentials(mut self) -> Self {
        if self.access_key_id.is_none() {
            self.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
        }
        if self.secret_access_key.is_none() {
            self.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        }
        if self.session_token.is_none() {
            self.session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        }
        self
    }
}

impl fmt::Debug for AwsSqsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Queues that exist when the provider starts
    pub queues: Vec<String>,
    pub max_queue_size: usize,
    pub visibility_timeout_seconds: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            max_queue_size: 10000,
            visibility_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
