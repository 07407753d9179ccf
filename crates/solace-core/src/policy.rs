//! The fixed directives every conversation is opened with, plus the static
//! copy shown around the chat (greeting, starter prompts, crisis contacts).

use std::sync::Arc;

use serde::Serialize;

use crate::identity::Identity;

/// Opaque directive text handed to the provider once per conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemPrompt(Arc<str>);

impl SystemPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SystemPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CrisisResource {
    pub name: &'static str,
    pub contact: &'static str,
    pub description: &'static str,
}

pub trait PromptPolicy: Send + Sync {
    fn system_prompt(&self) -> SystemPrompt;

    /// Assistant message seeded at position 0 of every new session.
    fn greeting(&self, identity: &Identity) -> String;

    fn quick_prompts(&self) -> &[&'static str];

    fn crisis_resources(&self) -> &[CrisisResource];
}

const WELLNESS_DIRECTIVE: &str = "\
You are a compassionate mental health support assistant. You provide emotional support, \
coping strategies, and wellness guidance, but you are NOT a replacement for professional \
mental health care.

CORE PRINCIPLES:
- Safety first: prioritize user well-being
- Empathetic, non-judgmental listening
- Educational and encouraging
- Evidence-based coping strategies

YOU CAN:
- Provide emotional validation and active listening
- Offer coping strategies (breathing exercises, mindfulness, grounding techniques)
- Share general mental health information
- Suggest self-care activities
- Encourage professional help when needed

YOU CANNOT:
- Diagnose mental health conditions
- Prescribe medications
- Provide therapy or replace professional counseling
- Make definitive statements about mental health status

CRISIS PROTOCOL:
If the user expresses suicidal thoughts, self-harm, or severe distress:
1. Express concern and validate their courage in sharing
2. Provide crisis resources:
   - National Suicide Prevention Lifeline: 988 (US)
   - Crisis Text Line: Text HOME to 741741
   - Emergency: 911
3. Emphasize the need for professional help
4. Stay supportive but redirect to appropriate resources

RESPONSE STYLE:
- Warm, conversational, and empathetic
- Professional yet approachable
- Patient and understanding
- Culturally sensitive

ALWAYS REMIND: \"I'm here to provide support and information, but I'm not a substitute for \
professional mental health care. For persistent or severe symptoms, please consider reaching \
out to a mental health professional.\"

Respond to each user message with empathy, appropriate resources, and helpful coping \
strategies while maintaining these guidelines.";

const GREETING: &str =
    "Hello! I'm here to support you on your wellness journey. How are you feeling today?";

const QUICK_PROMPTS: &[&str] = &[
    "I'm feeling anxious",
    "Help me with breathing exercises",
    "I need motivation",
    "Suggest a coping strategy",
    "I want to talk about my day",
    "Help me set a goal",
];

const CRISIS_RESOURCES: &[CrisisResource] = &[
    CrisisResource {
        name: "National Suicide Prevention Lifeline",
        contact: "988",
        description: "Call or text 988 (US), available 24/7",
    },
    CrisisResource {
        name: "Crisis Text Line",
        contact: "Text HOME to 741741",
        description: "Free, confidential support by text",
    },
    CrisisResource {
        name: "Emergency Services",
        contact: "911",
        description: "If you or someone else is in immediate danger",
    },
];

/// The wellness companion's policy. Stateless; every call returns the same text.
#[derive(Clone, Debug, Default)]
pub struct WellnessPolicy;

impl WellnessPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl PromptPolicy for WellnessPolicy {
    fn system_prompt(&self) -> SystemPrompt {
        SystemPrompt::new(WELLNESS_DIRECTIVE)
    }

    fn greeting(&self, identity: &Identity) -> String {
        match identity.greeting_name() {
            Some(name) => GREETING.replacen("Hello!", &format!("Hello, {name}!"), 1),
            None => GREETING.to_string(),
        }
    }

    fn quick_prompts(&self) -> &[&'static str] {
        QUICK_PROMPTS
    }

    fn crisis_resources(&self) -> &[CrisisResource] {
        CRISIS_RESOURCES
    }
}
