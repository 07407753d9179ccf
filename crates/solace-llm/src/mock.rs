use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;

use solace_core::errors::GatewayError;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::policy::SystemPrompt;
use solace_core::provider::{ChunkStream, ConversationHandle, ProviderGateway};
use solace_core::stream::StreamChunk;

/// Pre-programmed replies for deterministic testing without network calls.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Yield these deltas, the last one marked final, then end.
    Chunks(Vec<String>),
    /// Yield these deltas, then fail.
    FailAfter(Vec<String>, GatewayError),
    /// Fail the `send_and_stream` call itself.
    Error(GatewayError),
    /// Wait, then resolve the inner reply.
    Delay(Duration, Box<MockReply>),
    /// Yield these deltas, then never end.
    Pending(Vec<String>),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self::Chunks(vec![text.to_string()])
    }

    pub fn chunks(deltas: &[&str]) -> Self {
        Self::Chunks(deltas.iter().map(|d| d.to_string()).collect())
    }

    pub fn fail_after(deltas: &[&str], error: GatewayError) -> Self {
        Self::FailAfter(deltas.iter().map(|d| d.to_string()).collect(), error)
    }

    pub fn pending(deltas: &[&str]) -> Self {
        Self::Pending(deltas.iter().map(|d| d.to_string()).collect())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// What the gateway saw on one `send_and_stream` call.
#[derive(Clone, Debug)]
pub struct MockRequest {
    pub session_id: SessionId,
    pub user_text: String,
    pub history: Vec<Message>,
    pub system_prompt: SystemPrompt,
}

/// Gateway that plays back scripted replies in order and records requests.
pub struct MockGateway {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<MockRequest>>,
    call_count: AtomicUsize,
    configured: bool,
}

impl MockGateway {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            configured: true,
        }
    }

    /// A gateway with no credential: `open_conversation` always fails.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn push(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn open_conversation(
        &self,
        session_id: SessionId,
        system_prompt: &SystemPrompt,
        prior: &[Message],
    ) -> Result<ConversationHandle, GatewayError> {
        if !self.configured {
            return Err(GatewayError::Configuration("mock gateway has no credential".into()));
        }
        Ok(ConversationHandle::new(session_id, system_prompt.clone(), prior.to_vec()))
    }

    async fn send_and_stream(
        &self,
        handle: &ConversationHandle,
        user_text: &str,
    ) -> Result<ChunkStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(MockRequest {
            session_id: handle.session_id.clone(),
            user_text: user_text.to_string(),
            history: handle.history.clone(),
            system_prompt: handle.system_prompt.clone(),
        });

        let reply = self.replies.lock().pop_front();
        let Some(mut reply) = reply else {
            return Err(GatewayError::unknown(format!(
                "MockGateway: no reply configured for call {idx}"
            )));
        };

        // Unroll nested delays iteratively to avoid recursive async.
        loop {
            match reply {
                MockReply::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    reply = *inner;
                }
                other => return resolve(other, &handle.session_id),
            }
        }
    }
}

fn resolve(reply: MockReply, session_id: &SessionId) -> Result<ChunkStream, GatewayError> {
    let deltas = |items: Vec<String>| -> Vec<Result<StreamChunk, GatewayError>> {
        items
            .into_iter()
            .map(|d| Ok(StreamChunk::delta(session_id.clone(), d)))
            .collect()
    };

    match reply {
        MockReply::Chunks(items) => {
            let mut chunks = deltas(items);
            if let Some(Ok(last)) = chunks.last_mut() {
                last.is_final = true;
            }
            Ok(Box::pin(stream::iter(chunks)))
        }
        MockReply::FailAfter(items, error) => {
            let mut chunks = deltas(items);
            chunks.push(Err(error));
            Ok(Box::pin(stream::iter(chunks)))
        }
        MockReply::Pending(items) => Ok(Box::pin(stream::iter(deltas(items)).chain(stream::pending()))),
        MockReply::Error(error) => Err(error),
        MockReply::Delay(..) => Err(GatewayError::unknown("MockGateway: unresolved delay")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(gw: &MockGateway) -> ConversationHandle {
        gw.open_conversation(
            SessionId::from_raw("sess_mock"),
            &SystemPrompt::new("prompt"),
            &[Message::assistant("hi there")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn chunks_reply_marks_last_final() {
        let gw = MockGateway::new(vec![MockReply::chunks(&["Hel", "lo"])]);
        let h = open(&gw);
        let items: Vec<_> = gw.send_and_stream(&h, "hi").await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        let first = items[0].as_ref().unwrap();
        let last = items[1].as_ref().unwrap();
        assert_eq!(first.delta, "Hel");
        assert!(!first.is_final);
        assert!(last.is_final);
        assert_eq!(last.session_id.as_str(), "sess_mock");
    }

    #[tokio::test]
    async fn fail_after_yields_then_errors() {
        let gw = MockGateway::new(vec![MockReply::fail_after(
            &["Par"],
            GatewayError::NetworkUnavailable("gone".into()),
        )]);
        let h = open(&gw);
        let items: Vec<_> = gw.send_and_stream(&h, "hi").await.unwrap().collect().await;
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(GatewayError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn error_reply_and_exhaustion() {
        let gw = MockGateway::new(vec![MockReply::Error(GatewayError::Unauthorized("bad".into()))]);
        let h = open(&gw);
        assert!(matches!(
            gw.send_and_stream(&h, "a").await.err(),
            Some(GatewayError::Unauthorized(_))
        ));
        assert!(matches!(
            gw.send_and_stream(&h, "b").await.err(),
            Some(GatewayError::Unknown { .. })
        ));
        assert_eq!(gw.call_count(), 2);
    }

    #[tokio::test]
    async fn records_requests() {
        let gw = MockGateway::new(vec![MockReply::text("ok")]);
        let h = open(&gw);
        let _ = gw.send_and_stream(&h, "how are you").await.unwrap();
        let reqs = gw.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].user_text, "how are you");
        assert_eq!(reqs[0].history.len(), 1);
        assert_eq!(reqs[0].system_prompt.as_str(), "prompt");
    }

    #[tokio::test]
    async fn delayed_reply_waits() {
        tokio::time::pause();
        let gw = MockGateway::new(vec![MockReply::delayed(
            Duration::from_secs(2),
            MockReply::text("after delay"),
        )]);
        let h = open(&gw);
        let start = tokio::time::Instant::now();
        let stream = gw.send_and_stream(&h, "hi").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn pending_reply_never_ends() {
        let gw = MockGateway::new(vec![MockReply::pending(&["stuck"])]);
        let h = open(&gw);
        let mut stream = gw.send_and_stream(&h, "hi").await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        let next = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(next.is_err(), "stream should still be pending");
    }

    #[test]
    fn unconfigured_refuses_to_open() {
        let gw = MockGateway::unconfigured();
        let err = gw
            .open_conversation(SessionId::new(), &SystemPrompt::new("p"), &[])
            .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn push_appends_replies() {
        let gw = MockGateway::new(vec![]);
        gw.push(MockReply::text("later"));
        assert_eq!(gw.replies.lock().len(), 1);
    }
}
