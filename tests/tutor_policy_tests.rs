use async_trait::async_trait;
use edunext::ai_providers::{AiProvider, AskOutcome, ProviderFactory};
use edunext::tutor_service::{TutorService, NO_ANSWER_FALLBACK};
use std::sync::{Arc, Mutex};

/// Factory whose providers all return the same outcome, recording the prompts
/// they were asked
struct FixedFactory {
    outcome: AskOutcome,
    prompts: Arc<Mutex<Vec<String>>>,
    providers_used: Arc<Mutex<Vec<String>>>,
}

impl FixedFactory {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: AskOutcome::Answer(text.to_string()),
            prompts: Arc::new(Mutex::new(Vec::new())),
            providers_used: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn silent() -> Arc<Self> {
        Arc::new(Self {
            outcome: AskOutcome::Empty,
            prompts: Arc::new(Mutex::new(Vec::new())),
            providers_used: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

struct FixedProvider {
    outcome: AskOutcome,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AiProvider for FixedProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn ask(&self, _context: &str, question: &str, _system_text: &str) -> AskOutcome {
        self.prompts.lock().unwrap().push(question.to_string());
        self.outcome.clone()
    }
}

impl ProviderFactory for FixedFactory {
    fn create(&self, name: &str) -> Box<dyn AiProvider> {
        self.providers_used.lock().unwrap().push(name.to_string());
        Box::new(FixedProvider {
            outcome: self.outcome.clone(),
            prompts: Arc::clone(&self.prompts),
        })
    }
}

// Answer verification

#[tokio::test]
async fn test_verdict_true_substring_means_correct() {
    let factory = FixedFactory::answering(" the answer is true ");
    let tutor = TutorService::new(factory, "mock".to_string());
    assert!(tutor.verify_answer("reference", "student answer").await);
}

#[tokio::test]
async fn test_verdict_case_insensitive() {
    let factory = FixedFactory::answering("TRUE");
    let tutor = TutorService::new(factory, "mock".to_string());
    assert!(tutor.verify_answer("reference", "student answer").await);
}

#[tokio::test]
async fn test_verdict_both_substrings_resolve_to_incorrect() {
    let factory = FixedFactory::answering("false, not true");
    let tutor = TutorService::new(factory, "mock".to_string());
    assert!(!tutor.verify_answer("reference", "student answer").await);
}

#[tokio::test]
async fn test_verdict_neither_substring_resolves_to_incorrect() {
    let factory = FixedFactory::answering("maybe");
    let tutor = TutorService::new(factory, "mock".to_string());
    assert!(!tutor.verify_answer("reference", "student answer").await);
}

#[tokio::test]
async fn test_verdict_exhausted_chain_resolves_to_incorrect() {
    let factory = FixedFactory::silent();
    let tutor = TutorService::new(factory, "mock".to_string());
    assert!(!tutor.verify_answer("reference", "student answer").await);
}

#[tokio::test]
async fn test_verification_prompt_carries_answer_and_solution() {
    let factory = FixedFactory::answering("true");
    let prompts = Arc::clone(&factory.prompts);
    let tutor = TutorService::new(factory, "mock".to_string());

    tutor.verify_answer("4 apples", "four apples").await;

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("four apples"));
    assert!(prompts[0].contains("4 apples"));
    assert!(prompts[0].contains("'true' or 'false'"));
}

// Task generation

#[tokio::test]
async fn test_generation_parses_structured_output() {
    let factory =
        FixedFactory::answering(r#"{"task":"Explain recursion","solution":"A function calling itself"}"#);
    let tutor = TutorService::new(factory, "mock".to_string());

    let draft = tutor.generate_task("Recursion", "Lesson body", None).await;
    assert_eq!(draft.task_text, "Explain recursion");
    assert_eq!(draft.solution_text, "A function calling itself");
}

#[tokio::test]
async fn test_generation_degrades_to_raw_text_on_malformed_output() {
    let factory = FixedFactory::answering("do X");
    let tutor = TutorService::new(factory, "mock".to_string());

    let draft = tutor.generate_task("Topic", "Lesson body", None).await;
    assert_eq!(draft.task_text, "do X");
    assert_eq!(draft.solution_text, "");
}

#[tokio::test]
async fn test_generation_accepts_fenced_json() {
    let factory = FixedFactory::answering(
        "Sure!\n```json\n{\"task\":\"Write a sort\",\"solution\":\"bubble sort\"}\n```",
    );
    let tutor = TutorService::new(factory, "mock".to_string());

    let draft = tutor.generate_task("Sorting", "Lesson body", None).await;
    assert_eq!(draft.task_text, "Write a sort");
    assert_eq!(draft.solution_text, "bubble sort");
}

#[tokio::test]
async fn test_generation_override_is_consulted_first() {
    let factory = FixedFactory::answering(r#"{"task":"t","solution":"s"}"#);
    let providers_used = Arc::clone(&factory.providers_used);
    let tutor = TutorService::new(factory, "google,gigachat".to_string());

    tutor.generate_task("Topic", "Body", Some("gigachat")).await;

    assert_eq!(providers_used.lock().unwrap().first().unwrap(), "gigachat");
}

// Lesson Q&A

#[tokio::test]
async fn test_ask_lesson_returns_answer_and_provider() {
    let factory = FixedFactory::answering("light to energy");
    let tutor = TutorService::new(factory, "google".to_string());

    let answer = tutor
        .ask_lesson(
            "Photosynthesis converts light to energy.",
            "What does photosynthesis convert?",
            None,
        )
        .await;

    assert_eq!(answer.text, "light to energy");
    assert_eq!(answer.provider, "google");
}

#[tokio::test]
async fn test_ask_lesson_exhausted_chain_yields_fallback_message() {
    let factory = FixedFactory::silent();
    let tutor = TutorService::new(factory, "google,gigachat".to_string());

    let answer = tutor.ask_lesson("Lesson content", "A question", None).await;
    assert_eq!(answer.text, NO_ANSWER_FALLBACK);
    assert_eq!(answer.provider, "google");
}

#[tokio::test]
async fn test_ask_lesson_empty_chain_yields_fallback_message() {
    let factory = FixedFactory::silent();
    let tutor = TutorService::new(factory, String::new());

    let answer = tutor.ask_lesson("Lesson content", "A question", None).await;
    assert_eq!(answer.text, NO_ANSWER_FALLBACK);
    assert_eq!(answer.provider, "");
}

#[tokio::test]
async fn test_ask_lesson_override_reorders_chain() {
    let factory = FixedFactory::answering("answer");
    let providers_used = Arc::clone(&factory.providers_used);
    let tutor = TutorService::new(factory, "google,gigachat".to_string());

    let answer = tutor
        .ask_lesson("Lesson content", "A question", Some("GigaChat"))
        .await;

    assert_eq!(answer.provider, "gigachat");
    assert_eq!(providers_used.lock().unwrap().as_slice(), ["gigachat"]);
}
