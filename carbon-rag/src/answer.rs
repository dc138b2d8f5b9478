//! Answer composition on top of retrieval.
//!
//! [`AnswerComposer`] retrieves context through a [`RetrievalPipeline`],
//! renders it into a [`PromptTemplate`] together with the question, and hands
//! the prompt to a [`TextGenerator`]. Any backend that can turn a prompt into
//! text can implement the trait; retrieval logic never sees the provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::pipeline::RetrievalPipeline;

/// Placeholder replaced by the assembled context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";
/// Placeholder replaced by the user's question.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Default carbon-accounting prompt.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are an expert in carbon accounting, emissions tracking, and environmental regulations.
Use the following pieces of context to answer the question at the end.
If you don't know the answer based on the context, just say that you don't know, \
don't try to make up an answer.
Always cite the relevant regulations or standards when applicable.

Context: {context}

Question: {question}

Answer: ";

/// An external text-generation service.
///
/// # Example
///
/// ```rust,ignore
/// struct Echo;
///
/// #[async_trait]
/// impl TextGenerator for Echo {
///     fn name(&self) -> &str { "echo" }
///     async fn generate(&self, prompt: &str) -> carbon_rag::Result<String> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    ///
    /// Implementations report backend failures as
    /// [`RagError::GenerationServiceError`].
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a template, checking that both placeholders are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a placeholder is missing.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// Substitute the placeholders in a single pass.
    ///
    /// Placeholder-like text inside `context` or `question` is left as is.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_PROMPT_TEMPLATE.to_string() }
    }
}

/// A generated answer and the sources it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The generated text, or an error description when generation failed.
    pub text: String,
    /// Retrieved chunks that were placed in the prompt.
    pub sources: Vec<SearchResult>,
    /// `true` if retrieval or generation failed.
    pub degraded: bool,
}

/// Composes retrieval and text generation into question answering.
pub struct AnswerComposer {
    pipeline: Arc<RetrievalPipeline>,
    generator: Arc<dyn TextGenerator>,
    template: PromptTemplate,
}

impl AnswerComposer {
    /// Create a composer using [`PromptTemplate::default()`].
    pub fn new(pipeline: Arc<RetrievalPipeline>, generator: Arc<dyn TextGenerator>) -> Self {
        Self { pipeline, generator, template: PromptTemplate::default() }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Return the underlying pipeline.
    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    /// Answer `question` from the knowledge base.
    ///
    /// Never fails. A generation failure produces an answer whose text
    /// begins with `Error processing query:` and which carries no sources.
    pub async fn answer(&self, question: &str) -> Answer {
        let outcome = self.pipeline.query(question).await;
        let prompt = self.template.render(&outcome.context, question);

        match self.generator.generate(&prompt).await {
            Ok(text) => {
                info!(
                    generator = self.generator.name(),
                    source_count = outcome.sources.len(),
                    "answer generated"
                );
                let degraded = outcome.is_degraded();
                Answer { text, sources: outcome.sources, degraded }
            }
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "answer generation failed");
                Answer {
                    text: format!("Error processing query: {e}"),
                    sources: Vec::new(),
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_both_placeholders() {
        assert!(PromptTemplate::new(DEFAULT_PROMPT_TEMPLATE).is_ok());
    }

    #[test]
    fn missing_placeholder_is_rejected() {
        assert!(matches!(PromptTemplate::new("Context: {context}"), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn render_is_single_pass() {
        let template = PromptTemplate::new("C={context} Q={question} {other}").unwrap();
        let rendered = template.render("mentions {question}", "why?");
        assert_eq!(rendered, "C=mentions {question} Q=why? {other}");
    }
}
