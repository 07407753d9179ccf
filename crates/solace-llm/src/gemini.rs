use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use solace_core::errors::GatewayError;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::policy::SystemPrompt;
use solace_core::provider::{ChunkStream, ConversationHandle, ProviderGateway};
use solace_core::security::ApiKey;

use crate::converter;
use crate::sse::SseStream;
use crate::types::{GenerationConfig, HarmBlockThreshold};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    pub generation: GenerationConfig,
    pub safety_threshold: HarmBlockThreshold,
    /// Send only the last N prior messages. `None` sends everything.
    pub history_window: Option<usize>,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            generation: GenerationConfig::default(),
            safety_threshold: HarmBlockThreshold::default(),
            history_window: None,
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: SSE_IDLE_TIMEOUT,
        }
    }
}

/// Google Gemini over the `streamGenerateContent` SSE endpoint.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: Option<ApiKey>,
}

impl GeminiProvider {
    /// A missing key is not an error here: the provider is built, and
    /// `open_conversation` reports `Configuration` instead.
    pub fn new(config: GeminiConfig, api_key: Option<ApiKey>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn key(&self) -> Result<&ApiKey, GatewayError> {
        self.api_key
            .as_ref()
            .ok_or_else(|| GatewayError::Configuration("no Gemini API key available".into()))
    }
}

#[async_trait]
impl ProviderGateway for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn open_conversation(
        &self,
        session_id: SessionId,
        system_prompt: &SystemPrompt,
        prior: &[Message],
    ) -> Result<ConversationHandle, GatewayError> {
        self.key()?;
        Ok(ConversationHandle::new(
            session_id,
            system_prompt.clone(),
            prior.to_vec(),
        ))
    }

    #[instrument(skip_all, fields(model = %self.config.model, session_id = %handle.session_id))]
    async fn send_and_stream(
        &self,
        handle: &ConversationHandle,
        user_text: &str,
    ) -> Result<ChunkStream, GatewayError> {
        let key = self.key()?;
        let body = converter::build_request(handle, user_text, &self.config);

        debug!(
            contents = body.contents.len(),
            history = handle.history.len(),
            "starting Gemini stream"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", key.expose())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = resp.text().await.unwrap_or_default();
            let err = classify_http_error(status, &body, retry_after);
            warn!(status = status.as_u16(), kind = %err.kind(), "Gemini request rejected");
            return Err(err);
        }

        Ok(Box::pin(SseStream::new(
            resp.bytes_stream(),
            handle.session_id.clone(),
            self.config.idle_timeout,
        )))
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() || e.is_timeout() {
        GatewayError::NetworkUnavailable(e.to_string())
    } else {
        GatewayError::Unknown {
            status: e.status().map(|s| s.as_u16()),
            diagnostic: e.to_string(),
        }
    }
}

/// Map a non-success response to the failure taxonomy.
pub fn classify_http_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> GatewayError {
    let (message, reasons) = parse_api_error(body, status.as_u16());
    match status.as_u16() {
        401 | 403 => GatewayError::Unauthorized(message),
        400 if reasons.iter().any(|r| r == "API_KEY_INVALID") => {
            GatewayError::Unauthorized(message)
        }
        429 => GatewayError::RateLimited { retry_after },
        code => GatewayError::Unknown {
            status: Some(code),
            diagnostic: message,
        },
    }
}

/// Extract the error message and any structured `reason` values.
fn parse_api_error(body: &str, status: u16) -> (String, Vec<String>) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return (format!("HTTP {status}: {body}"), Vec::new());
    };
    let error = &json["error"];
    let message = error["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));
    let reasons = error["details"]
        .as_array()
        .map(|details| {
            details
                .iter()
                .filter_map(|d| d["reason"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    (message, reasons)
}

/// `Retry-After` as delay-seconds or an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay = date.signed_duration_since(chrono::Utc::now());
    Some(delay.to_std().unwrap_or(Duration::ZERO))
}
