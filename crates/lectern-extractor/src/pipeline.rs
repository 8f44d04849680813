//! The sequential screening loop

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::extractor::StructuredExtractor;
use crate::persistence::PersistenceCoordinator;
use crate::ranking::PassageRanker;
use crate::retry::{run_blocking, RetryPolicy};
use crate::summary::RunSummary;
use crate::types::{FailureKind, KeyDecision, WriteOutcome};
use lectern_domain::{
    Article, ArticleSource, Binding, DocumentParser, LlmProvider, Retryable, RowKey, RowStore,
    Schema, Section, TableLayout,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation request, shared between the pipeline and its caller
///
/// Checked at the start of each binding; work already started for a binding
/// runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// A flag that has not been raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run document parse cache
#[derive(Default)]
struct RunCache {
    parsed: HashMap<String, Vec<Section>>,
    parse_failed: HashSet<String>,
}

enum PairOutcome {
    Written(WriteOutcome),
    Skipped,
}

struct PairFailure {
    kind: FailureKind,
    error: ExtractorError,
}

impl PairFailure {
    fn new(kind: FailureKind, error: ExtractorError) -> Self {
        Self { kind, error }
    }
}

/// Runs every binding of a schema against the article source
///
/// For each binding the pipeline searches for candidate articles, then for
/// each article: checks the row key, fetches the article, parses an attached
/// document, ranks sections, extracts a record and writes it. Failures are
/// isolated to their pair and counted in the [`RunSummary`].
pub struct Pipeline<L, A, P, S>
where
    L: LlmProvider,
    A: ArticleSource,
    P: DocumentParser,
    S: RowStore,
{
    schema: Arc<Schema>,
    config: ExtractorConfig,
    source: Arc<A>,
    parser: Arc<P>,
    ranker: PassageRanker,
    extractor: StructuredExtractor<L>,
    persistence: PersistenceCoordinator<S>,
    network_retry: RetryPolicy,
    cancel: CancellationFlag,
}

impl<L, A, P, S> Pipeline<L, A, P, S>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Retryable + fmt::Display + Send + 'static,
    A: ArticleSource + Send + Sync + 'static,
    A::Error: Retryable + fmt::Display + Send + 'static,
    P: DocumentParser + Send + Sync + 'static,
    P::Error: Retryable + fmt::Display + Send + 'static,
    S: RowStore + Send + 'static,
    S::Error: Retryable + fmt::Display + Send + 'static,
{
    /// Assemble a pipeline
    pub fn new(
        schema: Arc<Schema>,
        config: ExtractorConfig,
        llm: Arc<L>,
        source: Arc<A>,
        parser: Arc<P>,
        store: Arc<Mutex<S>>,
        layout: TableLayout,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;

        let network_retry = RetryPolicy::from_config(&config.retry, config.network_timeout());
        let extractor = StructuredExtractor::new(llm, Arc::clone(&schema), &config)?;
        let persistence = PersistenceCoordinator::new(
            store,
            layout,
            config.overwrite_existing,
            network_retry.clone(),
        );

        Ok(Self {
            ranker: PassageRanker::from_config(&config),
            schema,
            config,
            source,
            parser,
            extractor,
            persistence,
            network_retry,
            cancel: CancellationFlag::new(),
        })
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run at the next binding
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Schema the pipeline runs
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Persistence coordinator of the destination table
    pub fn persistence(&self) -> &PersistenceCoordinator<S> {
        &self.persistence
    }

    /// Retrieval query for a binding, with the configured extra keywords
    pub fn search_query(&self, binding: &Binding) -> String {
        let query = self.schema.search_query(binding);
        let keywords = self.config.additional_search_keywords.trim();
        if keywords.is_empty() {
            query
        } else {
            format!("{} {}", query, keywords)
        }
    }

    /// Run every binding
    ///
    /// Returns an error only for conditions that make the whole run
    /// impossible (the table cannot be prepared, the question cannot be
    /// rendered). Everything else is counted in the summary.
    pub async fn run(&self) -> Result<RunSummary, ExtractorError> {
        let started = Instant::now();
        let mut summary = RunSummary::new();
        let bindings = self.schema.bindings();

        info!(
            run_id = %summary.run_id,
            bindings = bindings.len(),
            table = self.persistence.layout().table(),
            model = self.extractor.model_name(),
            "Starting run"
        );

        self.persistence.prepare().await?;

        let mut cache = RunCache::default();
        for binding in &bindings {
            if self.cancel.is_cancelled() {
                warn!(run_id = %summary.run_id, "Cancellation requested, stopping before binding '{}'", binding);
                summary.cancelled = true;
                break;
            }
            self.process_binding(binding, &mut cache, &mut summary).await?;
        }

        summary.elapsed = started.elapsed();
        info!(
            run_id = %summary.run_id,
            accepted = summary.accepted,
            replaced = summary.replaced,
            skipped = summary.skipped_existing,
            rejected = summary.rejected,
            failed = summary.failed,
            "Run complete"
        );
        Ok(summary)
    }

    async fn process_binding(
        &self,
        binding: &Binding,
        cache: &mut RunCache,
        summary: &mut RunSummary,
    ) -> Result<(), ExtractorError> {
        let ranking_query = self.schema.ranking_query(binding)?;
        let query = self.search_query(binding);
        info!(binding = %binding, query = %query, "Processing binding");

        let ids = match self.search(query).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(binding = %binding, error = %e, "Search failed");
                summary.record_search_failure(binding.to_string(), e.to_string());
                return Ok(());
            }
        };
        info!(binding = %binding, articles = ids.len(), "Search complete");

        for id in ids {
            let key = binding.key(&id);
            match self.process_pair(binding, &id, &key, &ranking_query, cache).await {
                Ok(PairOutcome::Written(WriteOutcome::Inserted)) => summary.record_accepted(),
                Ok(PairOutcome::Written(WriteOutcome::Replaced)) => summary.record_replaced(),
                Ok(PairOutcome::Skipped) => {
                    debug!(key = %key, "Row exists, skipped");
                    summary.record_skipped();
                }
                Err(failure) if failure.kind == FailureKind::Rejected => {
                    warn!(key = %key, error = %failure.error, "Record rejected");
                    summary.record_rejected(key.to_string(), failure.error.to_string());
                }
                Err(failure) => {
                    warn!(key = %key, stage = %failure.kind, error = %failure.error, "Pair failed");
                    summary.record_failure(key.to_string(), failure.kind, failure.error.to_string());
                }
            }
        }
        Ok(())
    }

    async fn process_pair(
        &self,
        binding: &Binding,
        article_id: &str,
        key: &RowKey,
        ranking_query: &str,
        cache: &mut RunCache,
    ) -> Result<PairOutcome, PairFailure> {
        // 1. Existing rows are skipped before any retrieval
        let decision = self
            .persistence
            .decide(key)
            .await
            .map_err(|e| PairFailure::new(FailureKind::Persistence, e))?;
        if decision == KeyDecision::Skip {
            return Ok(PairOutcome::Skipped);
        }

        if cache.parse_failed.contains(article_id) {
            return Err(PairFailure::new(
                FailureKind::Parse,
                ExtractorError::Parse("document failed to parse earlier in this run".to_string()),
            ));
        }

        // 2. Retrieval
        let article = self
            .fetch(article_id)
            .await
            .map_err(|e| PairFailure::new(FailureKind::Retrieval, e))?
            .ok_or_else(|| {
                PairFailure::new(
                    FailureKind::Retrieval,
                    ExtractorError::Retrieval(format!("article {} not found", article_id)),
                )
            })?;

        // 3. Document upgrade
        let article = self.upgrade(article, cache).await?;
        if article.is_empty() {
            return Err(PairFailure::new(
                FailureKind::NoContent,
                ExtractorError::Retrieval("article has no extractable content".to_string()),
            ));
        }

        // 4. Ranking
        let ranked = self.ranker.rank(
            article.sections(),
            ranking_query,
            self.schema.information_to_exclude(),
        );
        debug!(
            article_id,
            format = %article.format(),
            selected = ranked.len(),
            "Sections ranked"
        );

        // 5. Extraction
        let record = self
            .extractor
            .extract(binding, &article, &ranked)
            .await
            .map_err(|e| {
                let kind = if e.is_rejection() {
                    FailureKind::Rejected
                } else {
                    FailureKind::Completion
                };
                PairFailure::new(kind, e)
            })?;

        // 6. Persistence
        let outcome = self
            .persistence
            .write(&record, &article, &ranked)
            .await
            .map_err(|e| PairFailure::new(FailureKind::Persistence, e))?;
        Ok(PairOutcome::Written(outcome))
    }

    /// Replace the body of an article that carries a raw document
    async fn upgrade(&self, article: Article, cache: &mut RunCache) -> Result<Article, PairFailure> {
        let Some(raw) = article.raw_document() else {
            return Ok(article);
        };

        if let Some(sections) = cache.parsed.get(article.id()) {
            return Ok(article.with_parsed_sections(sections.clone()));
        }

        match self.parse(raw.to_vec()).await {
            Ok(sections) => {
                debug!(article_id = article.id(), sections = sections.len(), "Document parsed");
                cache.parsed.insert(article.id().to_string(), sections.clone());
                Ok(article.with_parsed_sections(sections))
            }
            Err(e) => {
                cache.parse_failed.insert(article.id().to_string());
                Err(PairFailure::new(FailureKind::Parse, e))
            }
        }
    }

    async fn search(&self, query: String) -> Result<Vec<String>, ExtractorError> {
        let query = Arc::new(query);
        let max_results = self.config.max_articles_per_search;
        self.network_retry
            .run_detached("search", || {
                let source = Arc::clone(&self.source);
                let query = Arc::clone(&query);
                run_blocking(move || source.search(&query, max_results))
            })
            .await
            .map_err(|e| ExtractorError::from_retry(e, ExtractorError::Retrieval))
    }

    async fn fetch(&self, article_id: &str) -> Result<Option<Article>, ExtractorError> {
        let article_id = Arc::new(article_id.to_string());
        self.network_retry
            .run_detached("fetch", || {
                let source = Arc::clone(&self.source);
                let article_id = Arc::clone(&article_id);
                run_blocking(move || source.fetch(&article_id))
            })
            .await
            .map_err(|e| ExtractorError::from_retry(e, ExtractorError::Retrieval))
    }

    async fn parse(&self, raw: Vec<u8>) -> Result<Vec<Section>, ExtractorError> {
        let raw = Arc::new(raw);
        self.network_retry
            .run_detached("parse", || {
                let parser = Arc::clone(&self.parser);
                let raw = Arc::clone(&raw);
                run_blocking(move || parser.parse(&raw))
            })
            .await
            .map_err(|e| ExtractorError::from_retry(e, ExtractorError::Parse))
    }
}
