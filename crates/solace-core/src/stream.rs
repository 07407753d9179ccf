use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// One incremental piece of a reply. Deltas are yielded in provider order
/// and are never retracted.
///
/// A chunk with `is_final` may precede the end of the stream; the end of
/// the stream itself is what completes a turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub session_id: SessionId,
    pub delta: String,
    pub is_final: bool,
}

impl StreamChunk {
    pub fn delta(session_id: SessionId, delta: impl Into<String>) -> Self {
        Self {
            session_id,
            delta: delta.into(),
            is_final: false,
        }
    }

    pub fn last(session_id: SessionId, delta: impl Into<String>) -> Self {
        Self {
            session_id,
            delta: delta.into(),
            is_final: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }
}
