use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a conversation log. Never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// True when no two adjacent messages share a role.
///
/// A log may open with a single assistant message (the seeded greeting);
/// that is already covered by the adjacency rule.
pub fn follows_turn_order(messages: &[Message]) -> bool {
    messages.windows(2).all(|w| w[0].role != w[1].role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_serialization() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn assistant_message_serialization() {
        let msg = Message::assistant("world");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "world");
    }

    #[test]
    fn serde_roundtrip_preserves_timestamp() {
        let msg = Message::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn role_predicates() {
        assert!(Message::user("a").is_user());
        assert!(!Message::user("a").is_assistant());
        assert!(Message::assistant("b").is_assistant());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn turn_order_accepts_seeded_greeting() {
        let log = vec![
            Message::assistant("greeting"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        assert!(follows_turn_order(&log));
        assert!(follows_turn_order(&log[..1]));
        assert!(follows_turn_order(&[]));
    }

    #[test]
    fn turn_order_rejects_adjacent_same_role() {
        let two_users = vec![Message::user("a"), Message::user("b")];
        assert!(!follows_turn_order(&two_users));

        let two_assistants = vec![
            Message::assistant("greeting"),
            Message::assistant("again"),
        ];
        assert!(!follows_turn_order(&two_assistants));
    }
}
