use solace_core::errors::ErrorKind;
use solace_core::ids::SessionId;
use solace_core::messages::Message;

/// Broadcast to presentation-layer subscribers as a turn progresses.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A new delta arrived. `text` is everything received so far this turn.
    Partial {
        session_id: SessionId,
        delta: String,
        text: String,
    },
    Completed {
        session_id: SessionId,
        message: Message,
    },
    Failed {
        session_id: SessionId,
        kind: ErrorKind,
        user_message: String,
    },
    Cleared {
        old: SessionId,
        new: SessionId,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Partial { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. } => session_id,
            Self::Cleared { new, .. } => new,
        }
    }
}
