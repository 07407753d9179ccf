use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::GatewayError;
use crate::ids::SessionId;
use crate::messages::Message;
use crate::policy::SystemPrompt;
use crate::stream::StreamChunk;

/// Finite, lazily-pulled sequence of reply chunks. Dropping it releases the
/// underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>;

/// Provider-side conversation state: the system prompt it was opened with
/// and the exchanges it has seen so far.
#[derive(Clone, Debug)]
pub struct ConversationHandle {
    pub session_id: SessionId,
    pub system_prompt: SystemPrompt,
    pub history: Vec<Message>,
}

impl ConversationHandle {
    pub fn new(session_id: SessionId, system_prompt: SystemPrompt, history: Vec<Message>) -> Self {
        Self {
            session_id,
            system_prompt,
            history,
        }
    }

    /// Append a completed user/assistant pair so the next request carries it.
    pub fn record_exchange(&mut self, user: Message, assistant: Message) {
        self.history.push(user);
        self.history.push(assistant);
    }
}

/// A hosted model reachable over the network.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Fails with `GatewayError::Configuration` when no credential is
    /// available. Callers treat that as "sending disabled", not fatal.
    fn open_conversation(
        &self,
        session_id: SessionId,
        system_prompt: &SystemPrompt,
        prior: &[Message],
    ) -> Result<ConversationHandle, GatewayError>;

    async fn send_and_stream(
        &self,
        handle: &ConversationHandle,
        user_text: &str,
    ) -> Result<ChunkStream, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_exchange_appends_pair() {
        let mut handle = ConversationHandle::new(
            SessionId::from_raw("sess_x"),
            SystemPrompt::new("be kind"),
            vec![Message::assistant("greeting")],
        );
        handle.record_exchange(Message::user("hi"), Message::assistant("hello"));
        assert_eq!(handle.history.len(), 3);
        assert!(handle.history[1].is_user());
        assert_eq!(handle.history[2].content, "hello");
        assert!(crate::messages::follows_turn_order(&handle.history));
    }
}
