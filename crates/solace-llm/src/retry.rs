use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use rand::Rng;
use tracing::warn;

use solace_core::errors::GatewayError;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::policy::SystemPrompt;
use solace_core::provider::{ChunkStream, ConversationHandle, ProviderGateway};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.2,
        }
    }
}

/// Wraps a gateway with automatic retries for transient failures.
///
/// - Only `NetworkUnavailable` and 5xx `Unknown` failures are retried
/// - A failure is retried only if no chunk has been yielded yet. The first
///   item of each attempt is awaited here, so a stream that fails before
///   producing output is retried too
/// - Once a chunk has been yielded the stream is committed and passed
///   through untouched
pub struct RetryingGateway<G: ProviderGateway> {
    inner: G,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<G: ProviderGateway> RetryingGateway<G> {
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: G) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Exponential backoff with jitter, capped at `max_delay`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp.min(self.config.max_delay.as_millis() as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    /// Await the first item. `Ok` means the stream is committed.
    async fn start(&self, handle: &ConversationHandle, user_text: &str) -> Result<ChunkStream, GatewayError> {
        let mut stream = self.inner.send_and_stream(handle, user_text).await?;
        match stream.next().await {
            Some(Ok(first)) => Ok(Box::pin(stream::once(async move { Ok(first) }).chain(stream))),
            Some(Err(e)) => Err(e),
            None => Ok(Box::pin(stream::empty())),
        }
    }
}

#[async_trait]
impl<G: ProviderGateway> ProviderGateway for RetryingGateway<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn open_conversation(
        &self,
        session_id: SessionId,
        system_prompt: &SystemPrompt,
        prior: &[Message],
    ) -> Result<ConversationHandle, GatewayError> {
        self.inner.open_conversation(session_id, system_prompt, prior)
    }

    async fn send_and_stream(
        &self,
        handle: &ConversationHandle,
        user_text: &str,
    ) -> Result<ChunkStream, GatewayError> {
        let mut attempt = 0;
        loop {
            let err = match self.start(handle, user_text).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.config.max_retries {
                return Err(err);
            }

            let delay = self.retry_delay(attempt);
            self.total_retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind(),
                session_id = %handle.session_id,
                "retrying after transient error"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
