//! Check-config command implementation.

use crate::config::AppConfig;
use crate::error::Result;
use crate::output::Formatter;
use lectern_extractor::PromptBuilder;
use std::sync::Arc;

/// Execute the check-config command.
///
/// Validates every section of the configuration, renders the examples and
/// each binding's question, then prints the table layout and the bindings.
pub fn execute_check_config(config: &AppConfig, formatter: &Formatter) -> Result<()> {
    config.validate()?;
    let schema = Arc::new(config.schema()?);
    let layout = config.layout(&schema)?;

    // Examples and every binding's question must render before a run starts
    PromptBuilder::new(Arc::clone(&schema))?;
    let bindings = schema.bindings();
    for binding in &bindings {
        schema.format_question(binding)?;
        schema.ranking_query(binding)?;
    }

    println!("{}", formatter.format_layout(&layout));
    println!("{}", formatter.format_bindings(&schema, &bindings));

    if !config.source.articles_dir.is_dir() {
        println!(
            "{}",
            formatter.warning(&format!(
                "Article directory {} does not exist",
                config.source.articles_dir.display()
            ))
        );
    }
    println!(
        "{}",
        formatter.success(&format!(
            "Configuration valid: {} binding(s), {} output feature(s)",
            bindings.len(),
            schema.output_features().len()
        ))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    const CONFIG: &str = r#"
[schema]
research_goal = "g"
research_question = "What is the IC50 of {drug} on {channel}?"

[[schema.input_parameters]]
name = "drug"
max_length = 20

[[schema.input_parameters.values]]
name = "TTX"

[[schema.input_parameters.values]]
name = "lidocaine"

[[schema.input_parameters]]
name = "channel"
max_length = 10

[[schema.input_parameters.values]]
name = "Nav1.7"

[[schema.output_features]]
name = "ic50"
data_type = "decimal"
"#;

    #[test]
    fn test_valid_config() {
        let config = AppConfig::from_toml(CONFIG).unwrap();
        assert!(execute_check_config(&config, &Formatter::new(false)).is_ok());
    }

    #[test]
    fn test_invalid_extractor_config() {
        let mut config = AppConfig::from_toml(CONFIG).unwrap();
        config.extractor.bm25_k1 = -1.0;
        let err = execute_check_config(&config, &Formatter::new(false)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_undeclared_placeholder() {
        let config = AppConfig::from_toml(&CONFIG.replace("{channel}", "{target}")).unwrap();
        let err = execute_check_config(&config, &Formatter::new(false)).unwrap_err();
        assert!(matches!(err, CliError::Schema(_)));
    }
}
