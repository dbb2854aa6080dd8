//! Messages API client behind the AI text utilities.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, Error)]
pub enum ClaudeApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    TimedOut,
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("api key rejected")]
    Unauthorized,
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("could not decode reply: {0}")]
    Decode(String),
    #[error("empty response from model")]
    EmptyResponse,
}

impl ClaudeApiError {
    /// Timeouts, dropped connections, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::TimedOut | Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::Unauthorized | Self::Decode(_) | Self::EmptyResponse => false,
        }
    }
}

impl From<reqwest::Error> for ClaudeApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::TimedOut
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ReplyBlock>,
    usage: TokenUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Text of a finished completion and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anything that can turn a prompt into text. [`ClaudeApiClient`] is the production implementation.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete_text(
        &self,
        prompt: &str,
        system: Option<String>,
        max_tokens: u32,
    ) -> Result<Completion, ClaudeApiError>;
}

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: usize,
    min_delay: Duration,
    max_delay: Duration,
    /// Upper bound on a server-requested `Retry-After` wait
    max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.attempts)
            .with_jitter()
    }

    /// Wait at least as long as a rate-limited reply asked for. `None` means no attempts are left.
    fn delay_after(&self, error: &ClaudeApiError, planned: Option<Duration>) -> Option<Duration> {
        match (error, planned) {
            (ClaudeApiError::RateLimited { retry_after_secs: Some(secs) }, Some(planned)) => {
                Some(planned.max(Duration::from_secs(*secs).min(self.max_retry_after)))
            }
            _ => planned,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeApiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl ClaudeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(
        api_key: String,
        model: Option<String>,
        api_url: Option<String>,
    ) -> Result<Self, ClaudeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry: RetryPolicy::default(),
        })
    }

    async fn post_once(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ClaudeApiError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<MessagesResponse>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClaudeApiError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeApiError::RateLimited {
                retry_after_secs: retry_after_secs(&response),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                let body = body.chars().take(MAX_ERROR_BODY).collect();
                Err(ClaudeApiError::Upstream {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl CompletionClient for ClaudeApiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_text(
        &self,
        prompt: &str,
        system: Option<String>,
        max_tokens: u32,
    ) -> Result<Completion, ClaudeApiError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system: system.as_deref(),
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = (|| self.post_once(&request))
            .retry(self.retry.backoff())
            .when(ClaudeApiError::is_transient)
            .adjust(|e, planned| self.retry.delay_after(e, planned))
            .notify(|e, after| warn!(error = %e, retry_in_ms = after.as_millis() as u64, "Completion request failed, retrying"))
            .await?;

        let text = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ReplyBlock::Text { text } => Some(text),
                ReplyBlock::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        if text.is_empty() {
            return Err(ClaudeApiError::EmptyResponse);
        }

        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion finished"
        );
        Ok(Completion {
            text: text.to_string(),
            model: response.model,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}

/// Deserialize the JSON a model was asked to reply with. Code fences and chatter around the
/// payload are tolerated.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, ClaudeApiError> {
    let candidate = json_candidate(reply).ok_or(ClaudeApiError::EmptyResponse)?;
    serde_json::from_str(candidate).map_err(|e| {
        debug!(error = %e, preview = %candidate.chars().take(120).collect::<String>(), "Reply is not the expected JSON");
        ClaudeApiError::Decode(e.to_string())
    })
}

/// The fenced block if there is one, else the outermost `{...}` or `[...]` span, else the trimmed text.
fn json_candidate(reply: &str) -> Option<&str> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }

    let mut fences = reply.split("```");
    if let (Some(_), Some(block)) = (fences.next(), fences.next()) {
        // Drop a language tag such as `json` on the opening fence line
        let body = match block.split_once('\n') {
            Some((tag, rest)) if !tag.trim_start().starts_with(['{', '[']) => rest,
            _ => block,
        };
        return Some(body.trim()).filter(|b| !b.is_empty());
    }

    let start = reply.find(['{', '[']);
    let end = reply.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => Some(&reply[start..=end]),
        _ => Some(reply),
    }
}
