//! AWS SQS backend implementation using the HTTP query API.
//!
//! This module talks to SQS with direct HTTP calls instead of the AWS SDK,
//! which keeps the backend testable against a mocked HTTP endpoint.
//!
//! ## Key Features
//!
//! - **Query API**: form-encoded `POST` requests, XML responses
//! - **AWS Signature V4**: manual request signing, optional session token
//! - **Batch operations**: up to 10 entries per `SendMessageBatch` /
//!   `DeleteMessageBatch`, with per-entry results reported back
//! - **Verbatim bodies**: message bodies are forwarded as the exact text
//!   SQS delivered, without re-encoding
//! - **Endpoint override**: `endpoint_url` targets LocalStack or a test server
//!
//! The backend does not cache queue URLs. Endpoint memoization belongs to
//! the caller so that its lifetime is explicit.
//!
//! ## Example
//!
//! ```no_run
//! use queue_relay_runtime::providers::AwsSqsBackend;
//! use queue_relay_runtime::{AwsSqsConfig, QueueBackend, QueueName};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = AwsSqsBackend::new(AwsSqsConfig::default().with_env_credentials())
//!     .map_err(|e| e.to_queue_error())?;
//! let endpoint = backend
//!     .resolve_queue(&QueueName::new("fromQueueName".to_string())?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueBackend;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{
    BatchEntryFailure, BatchOutcome, DeleteEntry, MessageId, QueueEndpoint, QueueName,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, SendEntry, Timestamp,
};
use crate::provider::{AwsSqsConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};
use url::Url;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
/// SQS rejects long-poll waits above 20 seconds
const MAX_WAIT_TIME_SECONDS: i64 = 20;

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("SQS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AwsError {
    /// Map AWS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(msg) => QueueError::AuthenticationFailed { message: msg },
            Self::AccessDenied(operation) => QueueError::PermissionDenied { operation },
            Self::NetworkError(msg) => QueueError::ConnectionFailed { message: msg },
            Self::Timeout(message) => QueueError::Timeout { message },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue) => QueueError::QueueNotFound { queue_name: queue },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::ConfigurationError(msg) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message: msg })
            }
            Self::SerializationError(msg) => {
                QueueError::SerializationError(SerializationError::MalformedResponse {
                    message: msg,
                })
            }
        }
    }
}

fn xml_error(error: impl fmt::Display) -> AwsError {
    AwsError::SerializationError(format!("XML parsing error: {}", error))
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
///
/// ## References
///
/// - [AWS Signature V4](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    ) -> Self {
        Self {
            access_key,
            secret_key,
            session_token,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a form-encoded POST request
    ///
    /// Returns the headers to add to the request: `Authorization`,
    /// `x-amz-date`, `content-type` and, with temporary credentials,
    /// `x-amz-security-token`.
    fn sign_request(
        &self,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers must be lowercase and sorted by name
        let mut headers = vec![
            ("content-type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("host".to_string(), host.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        // Task 1: canonical request (the query string is empty for POST)
        let canonical_request = format!(
            "POST\n{}\n\n{}\n{}\n{}",
            path, canonical_headers, signed_headers, payload_hash
        );

        // Task 2: string to sign
        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        // Task 3: signature
        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        // Task 4: authorization header
        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let mut request_headers = vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
            ("content-type".to_string(), FORM_CONTENT_TYPE.to_string()),
        ];
        if let Some(ref token) = self.session_token {
            request_headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        request_headers
    }

    /// Calculate AWS Signature V4 signature
    ///
    /// kSecret = "AWS4" + secret_key, then HMAC over date, region, service
    /// and "aws4_request" to derive the signing key.
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Form-encode request parameters
fn encode_form(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// AWS SQS Backend
// ============================================================================

/// AWS SQS queue backend
///
/// Stateless apart from the HTTP connection pool, so it can be shared
/// across tasks behind an `Arc`.
pub struct AwsSqsBackend {
    http_client: HttpClient,
    signer: AwsV4Signer,
    config: AwsSqsConfig,
    endpoint: Url,
}

impl AwsSqsBackend {
    /// Create new AWS SQS backend
    ///
    /// # Errors
    ///
    /// Returns error if the region is empty, a credential is missing, the
    /// endpoint override is not a valid URL, or the HTTP client cannot be
    /// built.
    pub fn new(config: AwsSqsConfig) -> Result<Self, AwsError> {
        if config.region.is_empty() {
            return Err(AwsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }

        let signer = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => AwsV4Signer::new(
                access_key.clone(),
                secret_key.clone(),
                config.session_token.clone(),
                config.region.clone(),
            ),
            _ => {
                return Err(AwsError::Authentication(
                    "Access key id and secret access key are both required".to_string(),
                ))
            }
        };

        let endpoint = match config.endpoint_url {
            Some(ref endpoint_url) => endpoint_url.clone(),
            None => format!("https://sqs.{}.amazonaws.com", config.region),
        };
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            AwsError::ConfigurationError(format!("Invalid endpoint URL '{}': {}", endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(AwsError::ConfigurationError(format!(
                "Endpoint URL '{}' has no host",
                endpoint
            )));
        }

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
        })
    }

    /// Host header value for signing, including a non-default port
    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Make a signed query API call and return the response body
    async fn make_request(&self, params: &[(String, String)]) -> Result<String, AwsError> {
        let body = encode_form(params);
        let path = self.endpoint.path().to_string();
        let auth_headers =
            self.signer
                .sign_request(&self.host_header(), &path, &body, &Utc::now());

        let mut request = self.http_client.post(self.endpoint.clone());
        for (key, value) in auth_headers {
            request = request.header(key.as_str(), value);
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::Timeout(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(self.parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }

    fn action_params(action: &str, endpoint: Option<&QueueEndpoint>) -> Vec<(String, String)> {
        let mut params = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
        ];
        if let Some(endpoint) = endpoint {
            params.push(("QueueUrl".to_string(), endpoint.as_str().to_string()));
        }
        params
    }

    fn validate_batch_size(&self, size: usize) -> Result<(), QueueError> {
        let max_size = self.max_batch_size() as usize;
        if size > max_size {
            return Err(QueueError::BatchTooLarge { size, max_size });
        }
        Ok(())
    }

    /// Build `SendMessageBatch` parameters, keeping each body verbatim
    ///
    /// Payload size limits are left to SQS, which rejects an oversized
    /// request with `BatchRequestTooLong`.
    fn send_batch_params(
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<Vec<(String, String)>, QueueError> {
        let mut params = Self::action_params("SendMessageBatch", Some(endpoint));
        for (idx, entry) in entries.iter().enumerate() {
            let body = std::str::from_utf8(&entry.body)
                .map_err(|_| QueueError::SerializationError(SerializationError::InvalidUtf8))?;

            params.push((
                format!("SendMessageBatchRequestEntry.{}.Id", idx + 1),
                entry.id.as_str().to_string(),
            ));
            params.push((
                format!("SendMessageBatchRequestEntry.{}.MessageBody", idx + 1),
                body.to_string(),
            ));
        }
        Ok(params)
    }

    fn delete_batch_params(
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Vec<(String, String)> {
        let mut params = Self::action_params("DeleteMessageBatch", Some(endpoint));
        for (idx, entry) in entries.iter().enumerate() {
            params.push((
                format!("DeleteMessageBatchRequestEntry.{}.Id", idx + 1),
                entry.id.as_str().to_string(),
            ));
            params.push((
                format!("DeleteMessageBatchRequestEntry.{}.ReceiptHandle", idx + 1),
                entry.receipt_handle.handle().to_string(),
            ));
        }
        params
    }

    fn receive_params(
        endpoint: &QueueEndpoint,
        max_messages: u32,
        options: &ReceiveOptions,
    ) -> Vec<(String, String)> {
        let mut params = Self::action_params("ReceiveMessage", Some(endpoint));
        params.push((
            "MaxNumberOfMessages".to_string(),
            max_messages.to_string(),
        ));
        params.push((
            "AttributeName.1".to_string(),
            "ApproximateReceiveCount".to_string(),
        ));
        if let Some(wait_time) = options.wait_time {
            params.push((
                "WaitTimeSeconds".to_string(),
                wait_time
                    .num_seconds()
                    .clamp(0, MAX_WAIT_TIME_SECONDS)
                    .to_string(),
            ));
        }
        if let Some(visibility) = options.visibility_timeout {
            params.push((
                "VisibilityTimeout".to_string(),
                visibility.num_seconds().max(0).to_string(),
            ));
        }
        params
    }

    // ------------------------------------------------------------------------
    // Response parsing
    // ------------------------------------------------------------------------

    /// Parse GetQueueUrl XML response
    fn parse_queue_url_response(&self, xml: &str) -> Result<QueueEndpoint, AwsError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut in_queue_url = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"QueueUrl" => {
                    in_queue_url = true;
                }
                Ok(Event::Text(e)) if in_queue_url => {
                    let url = e.unescape().map_err(xml_error)?.into_owned();
                    return QueueEndpoint::new(url)
                        .map_err(|e| AwsError::SerializationError(e.to_string()));
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(e)),
                _ => {}
            }
            buf.clear();
        }

        Err(AwsError::SerializationError(
            "QueueUrl not found in response".to_string(),
        ))
    }

    /// Parse error response from XML
    fn parse_error_response(&self, xml: &str, status_code: u16) -> AwsError {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut error_code = None;
        let mut error_message = None;
        let mut in_error = false;
        let mut in_code = false;
        let mut in_message = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"Error" => in_error = true,
                    b"Code" if in_error => in_code = true,
                    b"Message" if in_error => in_message = true,
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if in_code {
                        error_code = e.unescape().ok().map(|s| s.into_owned());
                        in_code = false;
                    } else if in_message {
                        error_message = e.unescape().ok().map(|s| s.into_owned());
                        in_message = false;
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"Error" => in_error = false,
                    b"Code" => in_code = false,
                    b"Message" => in_message = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
            buf.clear();
        }

        let code = error_code.unwrap_or_else(|| format!("HTTP{}", status_code));
        let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

        match code.as_str() {
            "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
                AwsError::QueueNotFound(message)
            }
            "InvalidClientTokenId"
            | "UnrecognizedClientException"
            | "SignatureDoesNotMatch"
            | "MissingAuthenticationToken"
            | "ExpiredToken" => AwsError::Authentication(format!("{}: {}", code, message)),
            "AccessDenied" | "AccessDeniedException" => {
                AwsError::AccessDenied(format!("{}: {}", code, message))
            }
            "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" => AwsError::InvalidReceipt(message),
            _ if status_code == 401 => AwsError::Authentication(format!("{}: {}", code, message)),
            _ if status_code == 403 => AwsError::AccessDenied(format!("{}: {}", code, message)),
            _ => AwsError::ServiceError { code, message },
        }
    }

    /// Parse ReceiveMessage XML response
    ///
    /// Whitespace is not trimmed so that bodies survive byte-for-byte.
    fn parse_receive_message_response(&self, xml: &str) -> Result<Vec<ReceivedMessage>, AwsError> {
        let mut reader = Reader::from_str(xml);

        let mut messages = Vec::new();
        let mut current: Option<PartialMessage> = None;
        let mut field: Option<MessageField> = None;
        let mut attribute_name: Option<String> = None;
        let mut text = String::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"Message" if current.is_none() => current = Some(PartialMessage::default()),
                    name if current.is_some() => {
                        field = MessageField::from_tag(name);
                        text.clear();
                    }
                    _ => {}
                },
                Ok(Event::Empty(ref e)) if current.is_some() => {
                    // `<Body/>` is an empty body, not a missing one
                    if e.name().as_ref() == b"Body" {
                        if let Some(ref mut message) = current {
                            message.body = Some(String::new());
                        }
                    }
                }
                Ok(Event::Text(e)) if field.is_some() => {
                    text.push_str(&e.unescape().map_err(xml_error)?);
                }
                Ok(Event::CData(e)) if field.is_some() => {
                    let data = std::str::from_utf8(&e).map_err(xml_error)?;
                    text.push_str(data);
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"Message" {
                        if let Some(partial) = current.take() {
                            messages.push(partial.into_message()?);
                        }
                        field = None;
                        attribute_name = None;
                    } else if let (Some(f), Some(message)) = (field.take(), current.as_mut()) {
                        let value = std::mem::take(&mut text);
                        match f {
                            MessageField::MessageId => message.message_id = Some(value),
                            MessageField::ReceiptHandle => message.receipt_handle = Some(value),
                            MessageField::Body => message.body = Some(value),
                            MessageField::AttributeName => attribute_name = Some(value),
                            MessageField::AttributeValue => {
                                if attribute_name.as_deref() == Some("ApproximateReceiveCount") {
                                    message.receive_count = value.trim().parse().ok();
                                }
                                attribute_name = None;
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(messages)
    }

    /// Parse SendMessageBatch / DeleteMessageBatch XML responses
    ///
    /// `result_tag` names the success entry element; failures always arrive
    /// as `BatchResultErrorEntry`.
    fn parse_batch_response(&self, xml: &str, result_tag: &[u8]) -> Result<BatchOutcome, AwsError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut outcome = BatchOutcome::default();
        let mut in_success = false;
        let mut failure: Option<PartialFailure> = None;
        let mut current_field: Option<Vec<u8>> = None;
        let mut success_id: Option<String> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = e.name().as_ref().to_vec();
                    if name == result_tag {
                        in_success = true;
                        success_id = None;
                    } else if name == b"BatchResultErrorEntry" {
                        failure = Some(PartialFailure::default());
                    } else if in_success || failure.is_some() {
                        current_field = Some(name);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(ref field) = current_field {
                        let value = e.unescape().map_err(xml_error)?.into_owned();
                        if in_success && field.as_slice() == b"Id" {
                            success_id = Some(value);
                        } else if let Some(ref mut failure) = failure {
                            match field.as_slice() {
                                b"Id" => failure.id = Some(value),
                                b"Code" => failure.code = Some(value),
                                b"Message" => failure.message = Some(value),
                                b"SenderFault" => failure.sender_fault = value == "true",
                                _ => {}
                            }
                        }
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = e.name().as_ref().to_vec();
                    if name == result_tag {
                        in_success = false;
                        let id = success_id.take().ok_or_else(|| {
                            AwsError::SerializationError("Batch result entry without Id".to_string())
                        })?;
                        outcome.successful.push(parse_entry_id(&id)?);
                    } else if name == b"BatchResultErrorEntry" {
                        if let Some(partial) = failure.take() {
                            outcome.failed.push(partial.into_failure()?);
                        }
                    }
                    current_field = None;
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(outcome)
    }
}

fn parse_entry_id(id: &str) -> Result<MessageId, AwsError> {
    MessageId::from_str(id).map_err(|e| AwsError::SerializationError(e.to_string()))
}

/// Elements of a `<Message>` whose text is captured
#[derive(Debug, Clone, Copy)]
enum MessageField {
    MessageId,
    ReceiptHandle,
    Body,
    AttributeName,
    AttributeValue,
}

impl MessageField {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"MessageId" => Some(Self::MessageId),
            b"ReceiptHandle" => Some(Self::ReceiptHandle),
            b"Body" => Some(Self::Body),
            b"Name" => Some(Self::AttributeName),
            b"Value" => Some(Self::AttributeValue),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: Option<String>,
    receive_count: Option<u32>,
}

impl PartialMessage {
    fn into_message(self) -> Result<ReceivedMessage, AwsError> {
        let message_id = self
            .message_id
            .ok_or_else(|| AwsError::SerializationError("Message without MessageId".to_string()))?;
        let receipt_handle = self.receipt_handle.ok_or_else(|| {
            AwsError::SerializationError(format!("Message {} without ReceiptHandle", message_id))
        })?;

        Ok(ReceivedMessage {
            message_id: parse_entry_id(&message_id)?,
            body: Bytes::from(self.body.unwrap_or_default()),
            receipt_handle: ReceiptHandle::new(receipt_handle, ProviderType::AwsSqs),
            delivery_count: self.receive_count.unwrap_or(1),
            received_at: Timestamp::now(),
        })
    }
}

#[derive(Debug, Default)]
struct PartialFailure {
    id: Option<String>,
    code: Option<String>,
    message: Option<String>,
    sender_fault: bool,
}

impl PartialFailure {
    fn into_failure(self) -> Result<BatchEntryFailure, AwsError> {
        let id = self.id.ok_or_else(|| {
            AwsError::SerializationError("BatchResultErrorEntry without Id".to_string())
        })?;
        Ok(BatchEntryFailure {
            id: parse_entry_id(&id)?,
            code: self.code.unwrap_or_else(|| "Unknown".to_string()),
            message: self.message.unwrap_or_default(),
            sender_fault: self.sender_fault,
        })
    }
}

impl fmt::Debug for AwsSqsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsBackend")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

#[async_trait]
impl QueueBackend for AwsSqsBackend {
    #[instrument(skip(self, queue), fields(queue = %queue))]
    async fn resolve_queue(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        let mut params = Self::action_params("GetQueueUrl", None);
        params.push(("QueueName".to_string(), queue.as_str().to_string()));

        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        let endpoint = self
            .parse_queue_url_response(&response)
            .map_err(|e| e.to_queue_error())?;
        debug!(endpoint = %endpoint, "Resolved queue URL");
        Ok(endpoint)
    }

    #[instrument(skip(self, endpoint, options), fields(endpoint = %endpoint))]
    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        self.validate_batch_size(max_messages as usize)?;

        let params = Self::receive_params(endpoint, max_messages, options);
        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        let messages = self
            .parse_receive_message_response(&response)
            .map_err(|e| e.to_queue_error())?;
        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    #[instrument(skip(self, endpoint, entries), fields(endpoint = %endpoint, entries = entries.len()))]
    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<BatchOutcome, QueueError> {
        if entries.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.validate_batch_size(entries.len())?;

        let params = Self::send_batch_params(endpoint, entries)?;
        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        self.parse_batch_response(&response, b"SendMessageBatchResultEntry")
            .map_err(|e| e.to_queue_error())
    }

    #[instrument(skip(self, endpoint, entries), fields(endpoint = %endpoint, entries = entries.len()))]
    async fn delete_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Result<BatchOutcome, QueueError> {
        if entries.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.validate_batch_size(entries.len())?;

        let params = Self::delete_batch_params(endpoint, entries);
        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        self.parse_batch_response(&response, b"DeleteMessageBatchResultEntry")
            .map_err(|e| e.to_queue_error())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::AwsSqs.max_batch_size()
    }
}
