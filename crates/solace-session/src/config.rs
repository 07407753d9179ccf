use std::time::Duration;

use solace_core::identity::Identity;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Everything a [`SessionManager`](crate::SessionManager) needs from its
/// surroundings, built once at startup and passed in.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Used only to personalise the greeting.
    pub identity: Identity,
    /// Fail a turn with `NetworkUnavailable` once this much time has passed
    /// since `submit`.
    pub turn_deadline: Option<Duration>,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: Identity::anonymous(),
            turn_deadline: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_turn_deadline(mut self, deadline: Duration) -> Self {
        self.turn_deadline = Some(deadline);
        self
    }
}
