//! Gemini completion client.
//!
//! Builds a `generateContent` request from the stored settings plus the
//! user's text, and reduces the provider's response to displayable text.
//! The provider can return empty candidate lists, safety-filtered
//! candidates, or candidates without text parts; [`extract_text`] absorbs
//! all of those into a human-readable string so callers never see an empty
//! success.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::settings::SettingsStore;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const USER_AGENT: &str = "JulyAgent/1.0.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const NO_RESPONSE_TEXT: &str = "No response generated";

/// Static model catalog; not queried from the provider.
pub const AVAILABLE_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-1.0-pro",
    "gemini-1.0-pro-vision",
];

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("network error calling the completion API: {0}")]
    Network(#[from] reqwest::Error),
    #[error("API request failed with status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to parse API response: {0}")]
    Parse(#[from] serde_json::Error),
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SafetyRating {
    category: String,
    probability: String,
}

// ─── Client ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    store: SettingsStore,
}

impl GeminiClient {
    pub fn new(store: SettingsStore) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, store })
    }

    /// Generate a completion for `user_text` and reduce it to plain text.
    ///
    /// Always returns displayable text on success, even when the provider
    /// filtered or truncated the answer (see [`extract_text`]).
    pub async fn generate(&self, user_text: &str, model: &str) -> Result<String, GeminiError> {
        let response = self.generate_detailed(user_text, model).await?;
        Ok(extract_text(&response))
    }

    /// Send one `generateContent` request and return the parsed response.
    ///
    /// The stored system prompt is prepended to the user's text; the API key
    /// is re-read from the settings file on every call.
    pub async fn generate_detailed(
        &self,
        user_text: &str,
        model: &str,
    ) -> Result<GenerateResponse, GeminiError> {
        let settings = self.store.load();
        let api_key = settings.api_key().ok_or(GeminiError::MissingApiKey)?;

        let full_prompt = format!("{}\n\nUser request: {}", settings.prompt, user_text);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: full_prompt }],
            }],
            generation_config: GenerationConfig::default(),
        };

        let url = format!("{BASE_URL}/models/{model}:generateContent?key={api_key}");
        info!(model, "sending generation request");

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(%status, "generation request failed");
            return Err(GeminiError::Api { status, body });
        }

        info!(model, "generation response received");
        Ok(serde_json::from_str(&body)?)
    }
}

/// Cheap client-side shape check; no call to the provider.
pub fn is_valid_api_key(api_key: &str) -> bool {
    !api_key.trim().is_empty() && api_key.len() > 10
}

pub fn available_models() -> &'static [&'static str] {
    AVAILABLE_MODELS
}

/// Reduce a parsed response to displayable text.
///
/// Fallback order, in priority:
/// 1. No candidates at all: the prompt-feedback safety ratings if present,
///    otherwise a fixed "no response" text.
/// 2. Every non-empty text part across all candidates, joined by blank lines.
/// 3. No text anywhere: the first candidate's finish reason plus its safety
///    ratings and the prompt-level ratings.
pub fn extract_text(response: &GenerateResponse) -> String {
    let prompt_ratings = response
        .prompt_feedback
        .as_ref()
        .map(|f| f.safety_ratings.as_slice())
        .unwrap_or_default();

    let Some(first) = response.candidates.first() else {
        if prompt_ratings.is_empty() {
            return NO_RESPONSE_TEXT.to_string();
        }
        return format!(
            "Request blocked by safety filters: {}",
            render_ratings(prompt_ratings)
        );
    };

    let texts: Vec<&str> = response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| &c.parts)
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect();
    if !texts.is_empty() {
        return texts.join("\n\n");
    }

    let finish_reason = first
        .finish_reason
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or("UNKNOWN");
    format!(
        "No text returned (finish reason: {finish_reason}; candidate safety: {}; prompt safety: {})",
        render_ratings(&first.safety_ratings),
        render_ratings(prompt_ratings),
    )
}

fn render_ratings(ratings: &[SafetyRating]) -> String {
    if ratings.is_empty() {
        return "none".to_string();
    }
    ratings
        .iter()
        .map(|r| format!("{}:{}", r.category, r.probability))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn no_candidates_and_no_ratings_yields_fixed_text() {
        assert_eq!(extract_text(&response("{}")), NO_RESPONSE_TEXT);
        assert_eq!(extract_text(&response(r#"{"candidates":[]}"#)), NO_RESPONSE_TEXT);
    }

    #[test]
    fn no_candidates_with_prompt_feedback_lists_ratings() {
        let r = response(
            r#"{"promptFeedback":{"safetyRatings":[
                {"category":"HARM","probability":"HIGH"},
                {"category":"HATE","probability":"LOW"}]}}"#,
        );
        let text = extract_text(&r);
        assert!(text.contains("HARM:HIGH"), "{text}");
        assert!(text.contains("HATE:LOW"), "{text}");
    }

    #[test]
    fn text_parts_join_across_candidates_with_blank_lines() {
        let r = response(
            r#"{"candidates":[
                {"content":{"parts":[{"text":"A"}]}},
                {"content":{"parts":[{"text":"B"}]}}]}"#,
        );
        assert_eq!(extract_text(&r), "A\n\nB");
    }

    #[test]
    fn empty_parts_are_skipped_when_joining() {
        let r = response(
            r#"{"candidates":[
                {"content":{"parts":[{"text":""},{"text":"first"},{}]}},
                {"content":{"parts":[{"text":"second"}]}}]}"#,
        );
        assert_eq!(extract_text(&r), "first\n\nsecond");
    }

    #[test]
    fn safety_filtered_candidate_reports_finish_reason_and_ratings() {
        let r = response(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"SAFETY"}],
                "promptFeedback":{"safetyRatings":[{"category":"HARM","probability":"HIGH"}]}}"#,
        );
        let text = extract_text(&r);
        assert!(text.contains("SAFETY"), "{text}");
        assert!(text.contains("HARM:HIGH"), "{text}");
    }

    #[test]
    fn blank_finish_reason_renders_as_unknown() {
        let r = response(r#"{"candidates":[{"finishReason":""}]}"#);
        let text = extract_text(&r);
        assert!(text.contains("UNKNOWN"), "{text}");
        assert!(text.contains("none"), "{text}");
    }

    #[test]
    fn candidate_safety_ratings_appear_in_diagnostic() {
        let r = response(
            r#"{"candidates":[{"finishReason":"RECITATION",
                "safetyRatings":[{"category":"SEXUAL","probability":"MEDIUM"}]}]}"#,
        );
        let text = extract_text(&r);
        assert!(text.contains("RECITATION"), "{text}");
        assert!(text.contains("SEXUAL:MEDIUM"), "{text}");
    }

    #[test]
    fn api_key_shape_check() {
        assert!(!is_valid_api_key(""));
        assert!(!is_valid_api_key("   "));
        assert!(!is_valid_api_key("short"));
        assert!(is_valid_api_key("a-sufficiently-long-key"));
    }

    #[test]
    fn model_catalog_is_ordered_and_defaults_first() {
        assert_eq!(available_models()[0], crate::settings::DEFAULT_MODEL);
        assert_eq!(available_models().len(), 6);
    }

    #[test]
    fn request_body_matches_provider_schema() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: GenerationConfig::default(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["topP"], 0.95);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }
}
