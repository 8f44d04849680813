//! Structured extraction: prompt, model call, parse, validate

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::parser::parse_reply;
use crate::prompt::PromptBuilder;
use crate::ranking::RankedSection;
use crate::retry::{run_blocking, RetryPolicy};
use crate::validation::RecordValidator;
use lectern_domain::{Article, Binding, ExtractionRecord, LlmProvider, Retryable, Schema, SectionId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Asks the model for one record per (binding, article) pair
pub struct StructuredExtractor<L>
where
    L: LlmProvider,
{
    llm: Arc<L>,
    schema: Arc<Schema>,
    prompts: PromptBuilder,
    validator: RecordValidator,
    retry: RetryPolicy,
}

impl<L> StructuredExtractor<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Retryable + fmt::Display + Send + 'static,
{
    /// Create an extractor for `schema`
    pub fn new(
        llm: Arc<L>,
        schema: Arc<Schema>,
        config: &ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        let prompts = PromptBuilder::new(Arc::clone(&schema))?;
        Ok(Self {
            llm,
            schema,
            prompts,
            validator: RecordValidator::new(config.single_value_overflow),
            retry: RetryPolicy::from_config(&config.retry, config.completion_timeout()),
        })
    }

    /// Replace the retry policy for completion calls
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Schema the extractor validates against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Model identifier of the provider
    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Render the prompt for a pair
    pub fn prompt(
        &self,
        binding: &Binding,
        article: &Article,
        ranked: &[RankedSection],
    ) -> Result<String, ExtractorError> {
        Ok(self.prompts.build(binding, article, ranked)?)
    }

    /// Extract a validated record from the ranked sections of `article`
    pub async fn extract(
        &self,
        binding: &Binding,
        article: &Article,
        ranked: &[RankedSection],
    ) -> Result<ExtractionRecord, ExtractorError> {
        let prompt = self.prompt(binding, article, ranked)?;
        debug!(article_id = article.id(), prompt_chars = prompt.len(), "Prompt built");

        let response = self.call_llm(prompt).await?;
        debug!(article_id = article.id(), response_chars = response.len(), "Model replied");

        let reply = parse_reply(&response, &self.schema)?;
        let shown: Vec<SectionId> = ranked.iter().map(|r| r.id).collect();
        let record = self
            .validator
            .validate(&self.schema, binding, article.id(), reply, &shown)?;

        info!(
            article_id = article.id(),
            binding = %binding,
            warnings = record.warnings().len(),
            "Record accepted"
        );
        Ok(record)
    }

    /// Call the LLM provider on the blocking pool, under the retry policy
    async fn call_llm(&self, prompt: String) -> Result<String, ExtractorError> {
        let prompt = Arc::new(prompt);
        self.retry
            .run_detached("completion", || {
                let llm = Arc::clone(&self.llm);
                let prompt = Arc::clone(&prompt);
                run_blocking(move || llm.complete(&prompt))
            })
            .await
            .map_err(|e| ExtractorError::from_retry(e, ExtractorError::Llm))
    }
}
