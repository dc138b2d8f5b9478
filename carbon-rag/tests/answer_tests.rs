//! Tests for answer composition with stub text generators.

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use carbon_rag::{
    AnswerComposer, HashingEmbedder, NO_CONTEXT, PromptTemplate, RagError, RetrievalPipeline,
    TextGenerator,
};

/// Records the last prompt and answers with a fixed reply.
#[derive(Default)]
struct RecordingGenerator {
    last_prompt: Mutex<Option<String>>,
}

impl RecordingGenerator {
    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> carbon_rag::Result<String> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok("Scope 1 covers direct emissions (GHG Protocol).".to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> carbon_rag::Result<String> {
        Err(RagError::GenerationServiceError {
            provider: "failing".to_string(),
            message: "rate limited".to_string(),
        })
    }
}

fn scope_pipeline(root: &std::path::Path) -> Arc<RetrievalPipeline> {
    fs::write(
        root.join("scope1.txt"),
        "Scope 1 emissions are direct emissions from owned sources.",
    )
    .unwrap();
    fs::write(
        root.join("scope2.txt"),
        "Scope 2 emissions are indirect emissions from purchased energy.",
    )
    .unwrap();
    let pipeline = RetrievalPipeline::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .knowledge_base(root)
        .build()
        .unwrap();
    Arc::new(pipeline)
}

#[tokio::test]
async fn prompt_contains_context_and_question() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let composer = AnswerComposer::new(scope_pipeline(dir.path()), generator.clone());

    let answer = composer.answer("What is Scope 1?").await;
    assert!(!answer.degraded);
    assert_eq!(answer.text, "Scope 1 covers direct emissions (GHG Protocol).");
    assert_eq!(answer.sources.len(), 2);

    let prompt = generator.last_prompt();
    assert!(prompt.starts_with("You are an expert in carbon accounting"));
    assert!(prompt.contains("Context: [Source 1]: Scope 1 emissions are direct"));
    assert!(prompt.contains("Question: What is Scope 1?"));
    assert!(prompt.trim_end().ends_with("Answer:"));
}

#[tokio::test]
async fn custom_template_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let template = PromptTemplate::new("Q: {question}\nC: {context}").unwrap();
    let composer =
        AnswerComposer::new(scope_pipeline(dir.path()), generator.clone()).with_template(template);

    composer.answer("What is Scope 2?").await;
    assert!(generator.last_prompt().starts_with("Q: What is Scope 2?\nC: [Source 1]: Scope 2"));
}

#[tokio::test]
async fn generation_failure_becomes_error_answer() {
    let dir = tempfile::tempdir().unwrap();
    let composer = AnswerComposer::new(scope_pipeline(dir.path()), Arc::new(FailingGenerator));

    let answer = composer.answer("What is Scope 1?").await;
    assert!(answer.degraded);
    assert!(answer.sources.is_empty());
    assert!(answer.text.starts_with("Error processing query:"));
    assert!(answer.text.contains("rate limited"));
}

#[tokio::test]
async fn empty_knowledge_base_still_reaches_generator() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = RetrievalPipeline::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .knowledge_base(dir.path())
        .build()
        .unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let composer = AnswerComposer::new(Arc::new(pipeline), generator.clone());

    let answer = composer.answer("What is Scope 3?").await;
    assert!(answer.degraded);
    assert!(answer.sources.is_empty());
    assert!(generator.last_prompt().contains(NO_CONTEXT));
}
