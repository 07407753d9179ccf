use solace_core::messages::{Message, Role};
use solace_core::provider::ConversationHandle;

use crate::gemini::GeminiConfig;
use crate::types::{
    safety_settings, GeminiContent, GeminiRequest, SystemInstruction, TextPart,
};

/// Gemini's name for a message author.
pub fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Convert the conversation plus the new user text into a request body.
pub fn build_request(
    handle: &ConversationHandle,
    user_text: &str,
    config: &GeminiConfig,
) -> GeminiRequest {
    let mut contents: Vec<GeminiContent> = windowed_history(&handle.history, config.history_window)
        .iter()
        .map(convert_message)
        .collect();

    contents.push(GeminiContent {
        role: gemini_role(Role::User).to_string(),
        parts: vec![TextPart::new(user_text)],
    });

    GeminiRequest {
        system_instruction: SystemInstruction {
            parts: vec![TextPart::new(handle.system_prompt.as_str())],
        },
        contents,
        generation_config: config.generation.clone(),
        safety_settings: safety_settings(config.safety_threshold),
    }
}

/// The slice of history sent with a request: at most `window` trailing
/// messages, never starting on a model turn (Gemini rejects a conversation
/// whose first content is not from the user).
pub fn windowed_history(history: &[Message], window: Option<usize>) -> &[Message] {
    let start = match window {
        Some(n) => history.len().saturating_sub(n),
        None => 0,
    };
    let tail = &history[start..];
    let first_user = tail.iter().position(Message::is_user).unwrap_or(tail.len());
    &tail[first_user..]
}

fn convert_message(msg: &Message) -> GeminiContent {
    GeminiContent {
        role: gemini_role(msg.role).to_string(),
        parts: vec![TextPart::new(msg.content.as_str())],
    }
}
