//! Gemini `streamGenerateContent` wire types.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Safety
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        Self::Harassment,
        Self::HateSpeech,
        Self::SexuallyExplicit,
        Self::DangerousContent,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmBlockThreshold {
    #[serde(rename = "BLOCK_NONE")]
    BlockNone,
    #[serde(rename = "BLOCK_ONLY_HIGH")]
    BlockOnlyHigh,
    #[default]
    #[serde(rename = "BLOCK_MEDIUM_AND_ABOVE")]
    BlockMediumAndAbove,
    #[serde(rename = "BLOCK_LOW_AND_ABOVE")]
    BlockLowAndAbove,
}

impl HarmBlockThreshold {
    /// Accepts the API spelling (`BLOCK_ONLY_HIGH`) or a relaxed one (`only_high`).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        let normalized = normalized.strip_prefix("BLOCK_").unwrap_or(&normalized);
        match normalized {
            "NONE" => Some(Self::BlockNone),
            "ONLY_HIGH" => Some(Self::BlockOnlyHigh),
            "MEDIUM_AND_ABOVE" => Some(Self::BlockMediumAndAbove),
            "LOW_AND_ABOVE" => Some(Self::BlockLowAndAbove),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// One setting per harm category, all at the same threshold.
pub fn safety_settings(threshold: HarmBlockThreshold) -> Vec<SafetySetting> {
    HarmCategory::ALL
        .iter()
        .map(|&category| SafetySetting { category, threshold })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            top_k: Some(40),
            top_p: Some(0.95),
            max_output_tokens: Some(1024),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thought: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub system_instruction: SystemInstruction,
    pub contents: Vec<GeminiContent>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming response
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiStreamChunk {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<GeminiApiError>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CandidateContent {
    /// Non-text parts deserialize with `text: None` and are skipped.
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GeminiApiError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GeminiCandidate {
    /// Concatenated visible text of this candidate (thought parts excluded).
    pub fn visible_text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Finish reasons that mean the reply was withheld rather than completed.
pub fn is_blocked_finish(reason: &str) -> bool {
    matches!(
        reason,
        "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "RECITATION"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults_serialize_camel_case() {
        let json = serde_json::to_value(GenerationConfig::default()).unwrap();
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["topK"], 40);
        assert_eq!(json["topP"], 0.95);
        assert_eq!(json["maxOutputTokens"], 1024);
    }

    #[test]
    fn unset_generation_fields_are_omitted() {
        let cfg = GenerationConfig {
            temperature: None,
            top_k: None,
            top_p: None,
            max_output_tokens: Some(64),
        };
        let json = serde_json::to_value(cfg).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["maxOutputTokens"], 64);
    }

    #[test]
    fn safety_settings_cover_four_categories() {
        let settings = safety_settings(HarmBlockThreshold::default());
        assert_eq!(settings.len(), 4);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json[0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(json[3]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn threshold_parse_variants() {
        assert_eq!(
            HarmBlockThreshold::parse("BLOCK_ONLY_HIGH"),
            Some(HarmBlockThreshold::BlockOnlyHigh)
        );
        assert_eq!(
            HarmBlockThreshold::parse("low-and-above"),
            Some(HarmBlockThreshold::BlockLowAndAbove)
        );
        assert_eq!(HarmBlockThreshold::parse("none"), Some(HarmBlockThreshold::BlockNone));
        assert_eq!(HarmBlockThreshold::parse("sometimes"), None);
    }

    #[test]
    fn chunk_skips_thought_parts() {
        let chunk: GeminiStreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"pondering","thought":true},
                {"text":"Hi "},
                {"text":"there"}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.candidates[0].visible_text(), "Hi there");
        assert!(chunk.candidates[0].finish_reason.is_none());
    }

    #[test]
    fn chunk_with_error_object() {
        let chunk: GeminiStreamChunk = serde_json::from_str(
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#,
        )
        .unwrap();
        let err = chunk.error.unwrap();
        assert_eq!(err.code, Some(503));
        assert_eq!(err.status.as_deref(), Some("UNAVAILABLE"));
    }

    #[test]
    fn blocked_finish_reasons() {
        assert!(is_blocked_finish("SAFETY"));
        assert!(!is_blocked_finish("STOP"));
        assert!(!is_blocked_finish("MAX_TOKENS"));
    }
}
