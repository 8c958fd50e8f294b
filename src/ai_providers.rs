use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{AiConfig, GigaChatConfig, GoogleConfig};

/// Bound on every outbound provider call, including the GigaChat token
/// exchange. A hung provider delays a request by at most this long before the
/// chain moves on.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_OUTPUT_TOKENS: u32 = 256;
const TEMPERATURE: f32 = 0.2;

/// Outcome of a single provider call.
///
/// The resolver treats `Empty` and `Failed` identically (try the next
/// provider); they stay distinct so logs and tests can tell a provider that
/// answered nothing from one that broke.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answer(String),
    Empty,
    Failed(String),
}

impl AskOutcome {
    /// Trimmed non-empty answer text, if any
    pub fn into_answer(self) -> Option<String> {
        match self {
            AskOutcome::Answer(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            AskOutcome::Empty | AskOutcome::Failed(_) => None,
        }
    }
}

fn result_to_outcome(result: Result<String>) -> AskOutcome {
    match result {
        Ok(text) if !text.trim().is_empty() => AskOutcome::Answer(text.trim().to_string()),
        Ok(_) => AskOutcome::Empty,
        Err(e) => AskOutcome::Failed(e.to_string()),
    }
}

/// A single external language-model endpoint. `ask` never panics and never
/// returns an error type; every transport or schema problem collapses into
/// `Empty`/`Failed`.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ask(&self, context: &str, question: &str, system_text: &str) -> AskOutcome;
}

/// Maps a provider name to a fresh client instance
pub trait ProviderFactory: Send + Sync {
    fn create(&self, name: &str) -> Box<dyn AiProvider>;
}

/// Parse a configured comma-separated provider list and apply an optional
/// caller override. The override (trimmed, lowercased) is forced to the front
/// and removed from the rest of the list. An empty base list with no override
/// yields an empty chain; callers must handle that.
pub fn build_chain(default_list: &str, override_name: Option<&str>) -> Vec<String> {
    let base: Vec<String> = default_list
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let ov = override_name
        .map(|o| o.trim().to_lowercase())
        .filter(|o| !o.is_empty());

    match ov {
        Some(ov) => {
            let mut chain = vec![ov.clone()];
            chain.extend(base.into_iter().filter(|p| *p != ov));
            chain
        }
        None => base,
    }
}

// ============================================================================
// Google Gemini
// ============================================================================

#[derive(Debug, Clone)]
pub struct GoogleGeminiProvider {
    client: Client,
    config: GoogleConfig,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GoogleGeminiProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn generate(&self, context: &str, question: &str, system_text: &str) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(anyhow::anyhow!("GOOGLE_API_KEY is not configured"));
        }

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: format!(
                        "{}\n\nCONTEXT:\n{}\n\nQUESTION:\n{}",
                        system_text, context, question
                    ),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        debug!(
            provider = self.name(),
            model = %self.config.model,
            question_length = question.len(),
            "Making provider request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow::anyhow!("Gemini API returned status {}", status));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        Ok(extract_gemini_text(&gemini_response))
    }
}

/// First non-empty part text across all candidates, trimmed. Missing fields
/// and empty candidate lists yield an empty string.
fn extract_gemini_text(response: &GeminiResponse) -> String {
    for candidate in &response.candidates {
        let Some(content) = &candidate.content else {
            continue;
        };
        for part in &content.parts {
            if let Some(text) = &part.text {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }
    String::new()
}

#[async_trait]
impl AiProvider for GoogleGeminiProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn ask(&self, context: &str, question: &str, system_text: &str) -> AskOutcome {
        result_to_outcome(self.generate(context, question, system_text).await)
    }
}

// ============================================================================
// Sber GigaChat
// ============================================================================

#[derive(Debug, Clone)]
pub struct GigaChatProvider {
    client: Client,
    config: GigaChatConfig,
}

#[derive(Debug, Serialize)]
struct GigaChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct GigaChatRequest {
    model: String,
    messages: Vec<GigaChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GigaChatTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GigaChatResponse {
    #[serde(default)]
    choices: Vec<GigaChatChoice>,
}

#[derive(Debug, Deserialize)]
struct GigaChatChoice {
    message: Option<GigaChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct GigaChatResponseMessage {
    content: Option<GigaChatContent>,
}

/// GigaChat returns message content either as a plain string or as a list of
/// typed segments
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GigaChatContent {
    Text(String),
    Segments(Vec<GigaChatSegment>),
}

#[derive(Debug, Deserialize)]
struct GigaChatSegment {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

impl GigaChatProvider {
    pub fn new(config: GigaChatConfig) -> Self {
        // The Sber endpoints present certificates from a CA that is not in
        // the default trust store
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .danger_accept_invalid_certs(true)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    /// Exchange the static basic credential for a short-lived bearer token.
    /// Any failure here surfaces as an error on the content call.
    async fn fetch_token(&self) -> Result<String> {
        if self.config.basic_auth.is_empty() {
            return Err(anyhow::anyhow!("SBER_BASIC_AUTH is not configured"));
        }

        let response = self
            .client
            .post(&self.config.auth_url)
            .header("Authorization", format!("Basic {}", self.config.basic_auth))
            .header("Accept", "application/json")
            .header("RqUID", Uuid::new_v4().to_string())
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow::anyhow!("GigaChat auth returned status {}", status));
        }

        let token_response: GigaChatTokenResponse = response.json().await?;
        token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("GigaChat auth response had no access_token"))
    }

    async fn generate(&self, context: &str, question: &str, system_text: &str) -> Result<String> {
        let token = self.fetch_token().await?;

        let request_body = GigaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                GigaChatMessage {
                    role: "system".to_string(),
                    content: system_text.to_string(),
                },
                GigaChatMessage {
                    role: "user".to_string(),
                    content: format!("CONTEXT:\n{}\n\nQUESTION:\n{}", context, question),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        debug!(
            provider = self.name(),
            model = %self.config.model,
            question_length = question.len(),
            "Making provider request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow::anyhow!("GigaChat API returned status {}", status));
        }

        let chat_response: GigaChatResponse = response.json().await?;
        Ok(extract_gigachat_text(&chat_response))
    }
}

/// Pull the answer text out of the first choice, handling both content
/// shapes. Only segments tagged as textual output count; they are joined
/// with single spaces.
fn extract_gigachat_text(response: &GigaChatResponse) -> String {
    let Some(content) = response
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.as_ref())
    else {
        return String::new();
    };

    match content {
        GigaChatContent::Text(text) => text.trim().to_string(),
        GigaChatContent::Segments(segments) => {
            let parts: Vec<&str> = segments
                .iter()
                .filter(|s| {
                    matches!(s.kind.as_deref(), Some("text") | Some("output_text"))
                })
                .filter_map(|s| s.text.as_deref())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            parts.join(" ")
        }
    }
}

#[async_trait]
impl AiProvider for GigaChatProvider {
    fn name(&self) -> &'static str {
        "gigachat"
    }

    async fn ask(&self, context: &str, question: &str, system_text: &str) -> AskOutcome {
        result_to_outcome(self.generate(context, question, system_text).await)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Static mapping from provider name to client constructor. Unknown or empty
/// names fall back to GigaChat; the lookup never fails.
pub struct ProviderRegistry {
    config: AiConfig,
}

impl ProviderRegistry {
    pub fn new(config: AiConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for ProviderRegistry {
    fn create(&self, name: &str) -> Box<dyn AiProvider> {
        match name.trim().to_lowercase().as_str() {
            "google" => Box::new(GoogleGeminiProvider::new(self.config.google.clone())),
            "gigachat" => Box::new(GigaChatProvider::new(self.config.gigachat.clone())),
            other => {
                if !other.is_empty() {
                    info!(provider = other, "Unknown provider name, defaulting to gigachat");
                } else {
                    error!("Empty provider name, defaulting to gigachat");
                }
                Box::new(GigaChatProvider::new(self.config.gigachat.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_chain_basic() {
        assert_eq!(build_chain("google,gigachat", None), vec!["google", "gigachat"]);
        assert_eq!(
            build_chain(" Google , GIGACHAT ", None),
            vec!["google", "gigachat"]
        );
    }

    #[test]
    fn test_build_chain_override_moves_to_front() {
        assert_eq!(
            build_chain("google,gigachat", Some("gigachat")),
            vec!["gigachat", "google"]
        );
        assert_eq!(
            build_chain("google,gigachat", Some("google")),
            vec!["google", "gigachat"]
        );
    }

    #[test]
    fn test_build_chain_unknown_override_prepended() {
        assert_eq!(
            build_chain("google,gigachat", Some("mystery")),
            vec!["mystery", "google", "gigachat"]
        );
    }

    #[test]
    fn test_build_chain_empty_inputs() {
        assert_eq!(build_chain("", None), Vec::<String>::new());
        assert_eq!(build_chain(" , , ", None), Vec::<String>::new());
        assert_eq!(build_chain("", Some("  ")), Vec::<String>::new());
        assert_eq!(build_chain("", Some("google")), vec!["google"]);
    }

    #[test]
    fn test_build_chain_tolerates_duplicate_base_entries() {
        assert_eq!(
            build_chain("google,google,gigachat", Some("google")),
            vec!["google", "gigachat"]
        );
    }

    #[test]
    fn test_outcome_into_answer() {
        assert_eq!(
            AskOutcome::Answer("  hello  ".to_string()).into_answer(),
            Some("hello".to_string())
        );
        assert_eq!(AskOutcome::Answer("   ".to_string()).into_answer(), None);
        assert_eq!(AskOutcome::Empty.into_answer(), None);
        assert_eq!(AskOutcome::Failed("boom".to_string()).into_answer(), None);
    }

    #[test]
    fn test_gigachat_content_extraction_string_shape() {
        let response: GigaChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  plain answer  "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_gigachat_text(&response), "plain answer");
    }

    #[test]
    fn test_gigachat_content_extraction_segment_shape() {
        let response: GigaChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":[
                {"type":"text","text":" part one "},
                {"type":"image","text":"ignored"},
                {"type":"output_text","text":"part two"},
                {"type":"text"}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_gigachat_text(&response), "part one part two");
    }

    #[test]
    fn test_gigachat_content_extraction_defensive() {
        let response: GigaChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(extract_gigachat_text(&response), "");

        let response: GigaChatResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(extract_gigachat_text(&response), "");

        let response: GigaChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":null}]}"#).unwrap();
        assert_eq!(extract_gigachat_text(&response), "");
    }

    #[test]
    fn test_gemini_text_extraction() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[
                {"content":{"parts":[{"text":"   "}]}},
                {"content":{"parts":[{"text":"  grounded answer "}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(extract_gemini_text(&response), "grounded answer");

        let response: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(extract_gemini_text(&response), "");

        let response: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"content":null}]}"#).unwrap();
        assert_eq!(extract_gemini_text(&response), "");

        let response: GeminiResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(extract_gemini_text(&response), "");
    }
}
