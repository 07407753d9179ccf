use solace_core::errors::ErrorKind;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::policy::SystemPrompt;
use solace_core::provider::ConversationHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
    Streaming,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingResponse => "awaiting_response",
            Self::Streaming => "streaming",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a conversation, as handed to the presentation layer.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub system_prompt: SystemPrompt,
    pub messages: Vec<Message>,
    pub state: SessionState,
    /// False when the provider could not be configured (no credential).
    pub sending_enabled: bool,
    /// The most recent failure, kept for inline display until the next
    /// successful turn.
    pub last_error: Option<ErrorKind>,
}

impl Session {
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// The manager's own record: the public view plus what never leaves the crate.
pub(crate) struct LiveSession {
    pub(crate) session: Session,
    pub(crate) conversation: Option<ConversationHandle>,
    pub(crate) disabled_reason: Option<String>,
    /// Cancelled when the session is replaced. Each turn holds a child.
    pub(crate) cancel: CancellationToken,
}

impl LiveSession {
    pub(crate) fn is_current(&self, id: &SessionId) -> bool {
        &self.session.id == id
    }
}
