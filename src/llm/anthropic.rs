//! Anthropic Messages API gateway

use super::error::ServiceError;
use super::types::{Completion, CompletionRequest, DeliveryMode, FragmentStream, Reply, Usage};
use super::CompletionGateway;
use crate::conversation::Role;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Gateway backed by the Anthropic Messages API
pub struct AnthropicGateway {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicGateway {
    pub fn new(api_key: String, model: String, base_url: Option<&str>) -> Self {
        let endpoint = match base_url {
            Some(url) => format!("{}/v1/messages", url.trim_end_matches('/')),
            None => DEFAULT_ENDPOINT.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            endpoint,
        }
    }

    fn translate_request(&self, request: &CompletionRequest) -> WireRequest {
        let messages = request
            .turns
            .iter()
            .map(|turn| WireMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: turn.text.clone(),
            })
            .collect();

        WireRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages,
            stream: matches!(request.mode, DeliveryMode::Streaming).then_some(true),
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, ServiceError> {
        let wire = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::network(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    ServiceError::network(format!("connection failed: {e}"))
                } else {
                    ServiceError::network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionGateway for AnthropicGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        match request.mode {
            DeliveryMode::Atomic => {
                let response = self.send(request).await?;
                let body = response
                    .text()
                    .await
                    .map_err(|e| ServiceError::network(format!("failed to read response: {e}")))?;
                let wire: WireResponse = serde_json::from_str(&body)
                    .map_err(|e| ServiceError::malformed(format!("unparseable response: {e}")))?;
                Ok(Completion::Atomic(normalize_response(wire)))
            }
            DeliveryMode::Streaming => {
                let response = self.send(request).await?;
                Ok(Completion::Stream(fragment_stream(response)))
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> ServiceError {
    match status.as_u16() {
        401 | 403 => ServiceError::auth(format!("authentication failed: {body}")),
        429 => {
            let mut err = ServiceError::rate_limit(format!("rate limited: {body}"));
            // The provider may include an explicit retry-after in the body
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
                if let Some(retry_after) = parsed
                    .get("error")
                    .and_then(|e| e.get("retry_after"))
                    .and_then(|r| r.as_f64())
                {
                    err = err.with_retry_after(Duration::from_secs_f64(retry_after));
                }
            }
            err
        }
        400 => ServiceError::invalid_request(format!("invalid request: {body}")),
        500..=599 => ServiceError::server(format!("server error: {body}")),
        _ => ServiceError::malformed(format!("HTTP {status}: {body}")),
    }
}

/// Adapt the provider's SSE body into a stream of text fragments
fn fragment_stream(response: reqwest::Response) -> FragmentStream {
    let stream = try_stream! {
        let mut parser = SseParser::new();
        let mut bytes = response.bytes_stream();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk
                .map_err(|e| ServiceError::network(format!("stream interrupted: {e}")))?;
            for event in parser.feed(&chunk) {
                match event {
                    StreamEvent::Fragment(text) => yield text,
                    StreamEvent::Stop => break 'read,
                    StreamEvent::Error(err) => {
                        Err(err)?;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

/// An event extracted from the provider's SSE stream
#[derive(Debug)]
pub(crate) enum StreamEvent {
    /// A piece of assistant text
    Fragment(String),
    /// Terminal marker; the reply is complete
    Stop,
    /// The provider reported a mid-stream failure
    Error(ServiceError),
}

/// Incremental SSE frame parser.
///
/// Network chunks split frames at arbitrary byte boundaries; frames are only
/// emitted once their terminating blank line has arrived.
pub(crate) struct SseParser {
    buffer: String,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed raw bytes; returns every event completed by this chunk, in order
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame = self.buffer[..end].to_string();
            self.buffer.drain(..end + 2);
            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let data = frame.lines().find_map(|line| line.strip_prefix("data: "))?;
    let value: serde_json::Value = serde_json::from_str(data).ok()?;

    match value.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let text = value
                .get("delta")
                .filter(|d| d.get("type").and_then(|t| t.as_str()) == Some("text_delta"))
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())?;
            Some(StreamEvent::Fragment(text.to_string()))
        }
        Some("message_stop") => Some(StreamEvent::Stop),
        Some("error") => {
            let detail = value.get("error");
            let message = detail
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("stream error")
                .to_string();
            let err = match detail
                .and_then(|e| e.get("type"))
                .and_then(|t| t.as_str())
            {
                Some("overloaded_error") | Some("api_error") => ServiceError::server(message),
                Some("rate_limit_error") => ServiceError::rate_limit(message),
                _ => ServiceError::malformed(message),
            };
            Some(StreamEvent::Error(err))
        }
        // message_start, content_block_start, message_delta, ping
        _ => None,
    }
}

fn normalize_response(resp: WireResponse) -> Reply {
    let text = resp
        .content
        .iter()
        .filter_map(|block| match block {
            WireContentBlock::Text { text } => Some(text.as_str()),
            WireContentBlock::Unknown => None,
        })
        .collect::<Vec<_>>()
        .join("");

    Reply {
        text,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}
