use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::ai_providers::{build_chain, ProviderFactory};
use crate::log_ai_operation;

/// Default instruction for prompts that do not carry their own system text
const DEFAULT_SYSTEM_TEXT: &str = "You are a helpful assistant. Answer clearly and to the point.";

/// System instruction for context-grounded lesson Q&A
const TUTOR_SYSTEM_TEXT: &str = "You are an AI tutor. Give a thorough but precise answer based \
    only on the provided context. If the context does not contain the answer, say exactly: \
    'Answer not found in the lesson context.'";

/// Returned to the student when every provider comes back empty
pub const NO_ANSWER_FALLBACK: &str = "Answer not found in the lesson context.";

/// Lesson content is clipped before being sent as grounding context
const MAX_CONTEXT_CHARS: usize = 8000;

/// Answer resolved through the provider chain, along with the provider that
/// produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAnswer {
    pub text: String,
    pub provider: String,
}

/// Task and reference solution extracted from a generation response.
/// `solution_text` is empty when the provider did not return parseable
/// structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub task_text: String,
    pub solution_text: String,
}

#[derive(Debug, Deserialize)]
struct TaskFields {
    task: Option<String>,
    solution: Option<String>,
}

/// Drives the ordered provider fallback chain and the two prompt policies
/// built on top of it (task generation and answer verification).
#[derive(Clone)]
pub struct TutorService {
    factory: Arc<dyn ProviderFactory>,
    default_providers: String,
}

impl TutorService {
    pub fn new(factory: Arc<dyn ProviderFactory>, default_providers: String) -> Self {
        Self {
            factory,
            default_providers,
        }
    }

    /// The configured default ordering with no override applied
    pub fn default_chain(&self) -> Vec<String> {
        build_chain(&self.default_providers, None)
    }

    /// The configured default ordering with an optional override forced to
    /// the front
    pub fn chain_with_override(&self, override_name: Option<&str>) -> Vec<String> {
        build_chain(&self.default_providers, override_name)
    }

    /// Try each provider in order and return the first non-empty trimmed
    /// answer. Provider failures are swallowed; an exhausted chain yields an
    /// empty string.
    pub async fn resolve(
        &self,
        prompt: &str,
        chain: &[String],
        system_text: &str,
        context: &str,
    ) -> String {
        self.resolve_detailed(prompt, chain, system_text, context)
            .await
            .map(|r| r.text)
            .unwrap_or_default()
    }

    async fn resolve_detailed(
        &self,
        prompt: &str,
        chain: &[String],
        system_text: &str,
        context: &str,
    ) -> Option<ResolvedAnswer> {
        for name in chain {
            log_ai_operation!(start, "resolve", provider = name);
            let provider = self.factory.create(name);
            let outcome = provider.ask(context, prompt, system_text).await;

            match outcome.into_answer() {
                Some(text) => {
                    log_ai_operation!(success, "resolve", provider = name, response_length = text.len());
                    return Some(ResolvedAnswer {
                        text,
                        provider: name.clone(),
                    });
                }
                None => {
                    log_ai_operation!(skip, "resolve", provider = name, "no usable answer");
                }
            }
        }

        log_ai_operation!(exhausted, "resolve", chain_length = chain.len());
        None
    }

    /// Answer a student question grounded in the lesson content. Never fails:
    /// when the whole chain comes up empty the response carries the fallback
    /// message and the head of the chain as the provider.
    pub async fn ask_lesson(
        &self,
        lesson_content: &str,
        question: &str,
        provider_override: Option<&str>,
    ) -> ResolvedAnswer {
        let chain = self.chain_with_override(provider_override);
        let context = clip_context(lesson_content);

        match self
            .resolve_detailed(question, &chain, TUTOR_SYSTEM_TEXT, context)
            .await
        {
            Some(answer) => answer,
            None => ResolvedAnswer {
                text: NO_ANSWER_FALLBACK.to_string(),
                provider: chain.first().cloned().unwrap_or_default(),
            },
        }
    }

    /// Generate a practice task with a reference solution for a lesson.
    /// Structured output that fails to parse degrades to the raw response as
    /// the task text with an empty solution; generation itself never fails.
    pub async fn generate_task(
        &self,
        lesson_title: &str,
        lesson_content: &str,
        provider_override: Option<&str>,
    ) -> TaskDraft {
        let chain = self.chain_with_override(provider_override);

        let prompt = format!(
            "Generate one practical task on the topic: '{}. {}'. \
             The task must be unique and test understanding of the key concepts. \
             Difficulty level - introductory. \
             Also provide a reference solution for checking. \
             Return the answer strictly as JSON with fields: task (string), solution (string).",
            lesson_title,
            clip_context(lesson_content)
        );

        let raw = self
            .resolve(&prompt, &chain, DEFAULT_SYSTEM_TEXT, "")
            .await;

        parse_task_draft(&raw)
    }

    /// Compare a student answer against the stored reference solution. The
    /// verdict comes from literal `true`/`false` substrings in the normalized
    /// response; anything ambiguous counts as incorrect.
    pub async fn verify_answer(&self, stored_solution: &str, student_answer: &str) -> bool {
        let chain = self.default_chain();

        let prompt = format!(
            "Compare the student's answer '{}' with the reference solution '{}'. \
             Is the student's answer correct? Reply ONLY 'true' or 'false'.",
            student_answer, stored_solution
        );

        let raw = self
            .resolve(&prompt, &chain, DEFAULT_SYSTEM_TEXT, "")
            .await;

        derive_verdict(&raw)
    }
}

fn clip_context(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Parse the generation response into task/solution fields, accepting JSON
/// wrapped in markdown code fences. Malformed output is not an error: the raw
/// text becomes the task and the solution stays empty.
fn parse_task_draft(raw: &str) -> TaskDraft {
    let json_content = extract_json_from_response(raw);

    match serde_json::from_str::<TaskFields>(&json_content) {
        Ok(fields) => TaskDraft {
            task_text: fields.task.unwrap_or_default().trim().to_string(),
            solution_text: fields.solution.unwrap_or_default().trim().to_string(),
        },
        Err(e) => {
            debug!(error = %e, "Generation response was not structured JSON, storing raw text");
            TaskDraft {
                task_text: raw.trim().to_string(),
                solution_text: String::new(),
            }
        }
    }
}

/// Extract JSON from responses that might be wrapped in markdown or other
/// formatting
fn extract_json_from_response(content: &str) -> String {
    // JSON within markdown code blocks
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            let json_start = start + 7;
            let json_end = json_start + end;
            return content[json_start..json_end].trim().to_string();
        }
    }

    // JSON within plain code blocks
    if let Some(start) = content.find("```") {
        if let Some(end) = content[start + 3..].find("```") {
            let json_start = start + 3;
            let json_end = json_start + end;
            let potential_json = content[json_start..json_end].trim();
            if potential_json.starts_with('{') {
                return potential_json.to_string();
            }
        }
    }

    // Standalone JSON object
    if let Some(start) = content.find('{') {
        if let Some(end) = content.rfind('}') {
            if end > start {
                return content[start..=end].to_string();
            }
        }
    }

    content.trim().to_string()
}

/// Ternary verdict derivation: correct only when the normalized text contains
/// "true" and does not contain "false". Both present or neither present
/// resolve to incorrect.
pub fn derive_verdict(raw: &str) -> bool {
    let normalized = raw.trim().to_lowercase();
    let has_true = normalized.contains("true");
    let has_false = normalized.contains("false");
    has_true && !has_false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_verdict_plain_cases() {
        assert!(derive_verdict("true"));
        assert!(derive_verdict(" the answer is true "));
        assert!(derive_verdict("TRUE"));
        assert!(!derive_verdict("false"));
        assert!(!derive_verdict("False."));
    }

    #[test]
    fn test_derive_verdict_ambiguous_resolves_to_incorrect() {
        assert!(!derive_verdict("false, not true"));
        assert!(!derive_verdict("true but also false"));
        assert!(!derive_verdict("maybe"));
        assert!(!derive_verdict(""));
    }

    #[test]
    fn test_parse_task_draft_structured() {
        let draft = parse_task_draft(r#"{"task":" Sort a list ","solution":" use sort() "}"#);
        assert_eq!(draft.task_text, "Sort a list");
        assert_eq!(draft.solution_text, "use sort()");
    }

    #[test]
    fn test_parse_task_draft_missing_fields_default_empty() {
        let draft = parse_task_draft(r#"{"task":"Sort a list"}"#);
        assert_eq!(draft.task_text, "Sort a list");
        assert_eq!(draft.solution_text, "");

        let draft = parse_task_draft(r#"{}"#);
        assert_eq!(draft.task_text, "");
        assert_eq!(draft.solution_text, "");
    }

    #[test]
    fn test_parse_task_draft_malformed_keeps_raw_text() {
        let draft = parse_task_draft("do X");
        assert_eq!(draft.task_text, "do X");
        assert_eq!(draft.solution_text, "");
    }

    #[test]
    fn test_parse_task_draft_fenced_json() {
        let raw = "Here you go:\n```json\n{\"task\":\"Write a loop\",\"solution\":\"for i in 0..10\"}\n```";
        let draft = parse_task_draft(raw);
        assert_eq!(draft.task_text, "Write a loop");
        assert_eq!(draft.solution_text, "for i in 0..10");
    }

    #[test]
    fn test_extract_json_from_plain_fence() {
        let raw = "```\n{\"task\":\"t\"}\n```";
        assert_eq!(extract_json_from_response(raw), "{\"task\":\"t\"}");
    }

    #[test]
    fn test_clip_context_bounds() {
        assert_eq!(clip_context("  short  "), "short");
        let long = "x".repeat(9000);
        assert_eq!(clip_context(&long).len(), 8000);
    }
}
