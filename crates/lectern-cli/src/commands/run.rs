//! Run command implementation.

use super::open_store;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use crate::provider::ConfiguredProvider;
use lectern_extractor::{CancellationFlag, Pipeline, RunSummary};
use lectern_sources::{DirectorySource, HeadingParser};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Execute the run command.
///
/// `cancel` is raised by the Ctrl+C handler; the pipeline stops before the
/// next binding.
pub async fn execute_run(
    config: &AppConfig,
    formatter: &Formatter,
    cancel: CancellationFlag,
) -> Result<RunSummary> {
    config.validate()?;
    let schema = Arc::new(config.schema()?);
    let layout = config.layout(&schema)?;

    // The HTTP client blocks while it starts, so build it off the async workers
    let llm_config = config.llm.clone();
    let timeout = config.extractor.completion_timeout();
    let llm = tokio::task::spawn_blocking(move || ConfiguredProvider::from_config(&llm_config, timeout))
        .await
        .map_err(|e| CliError::Task(e.to_string()))??;

    let source = DirectorySource::new(&config.source.articles_dir)?;
    info!(
        articles = source.len(),
        store = %config.store.path.display(),
        "Inputs opened"
    );
    let store = open_store(config)?;

    let pipeline = Pipeline::new(
        schema,
        config.extractor.clone(),
        Arc::new(llm),
        Arc::new(source),
        Arc::new(HeadingParser::new()),
        Arc::new(Mutex::new(store)),
        layout,
    )?
    .with_cancellation(cancel);

    let summary = match pipeline.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Run aborted");
            return Err(e.into());
        }
    };
    info!("{}", summary.summary());

    println!("{}", formatter.format_summary(&summary));
    if summary.cancelled {
        println!("{}", formatter.warning("Stopped early; rerun to resume, existing rows are skipped"));
    } else {
        println!("{}", formatter.success(&format!("{} row(s) written", summary.total_written())));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(dir: &std::path::Path) -> AppConfig {
        fs::create_dir(dir.join("articles")).unwrap();
        fs::write(
            dir.join("articles/1.json"),
            r#"{"id": "PMID1", "format": "PMC", "title": "TTX potency",
                "sections": [{"heading": "Results", "text": "TTX IC50 was 18 nM."}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("lectern.toml"),
            r#"
[schema]
research_goal = "to collect potency measurements"
research_question = "What is the IC50 of {drug}?"

[[schema.input_parameters]]
name = "drug"
max_length = 20

[[schema.input_parameters.values]]
name = "TTX"

[[schema.output_features]]
name = "ic50"
data_type = "decimal"

[extractor.retry]
initial_backoff_ms = 1
max_backoff_ms = 2

[llm]
provider = "mock"
mock_response = '{"ic50": {"value": 18, "citations": ["section_1"]}}'

[store]
path = "data/screen.db"
"#,
        )
        .unwrap();
        AppConfig::load(&dir.join("lectern.toml")).unwrap()
    }

    #[tokio::test]
    async fn test_run_with_mock_provider() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let summary = execute_run(&config, &Formatter::new(false), CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(summary.accepted, 1);
        assert!(dir.path().join("data/screen.db").exists());

        let again = execute_run(&config, &Formatter::new(false), CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(again.skipped_existing, 1);
        assert_eq!(again.total_written(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let summary = execute_run(&config, &Formatter::new(false), cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.total_pairs(), 0);
    }

    #[tokio::test]
    async fn test_missing_corpus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.source.articles_dir = dir.path().join("absent");

        let err = execute_run(&config, &Formatter::new(false), CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Source(_)));
    }
}
