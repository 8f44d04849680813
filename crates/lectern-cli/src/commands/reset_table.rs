//! Reset-table command implementation.

use super::open_store;
use crate::cli::ResetTableArgs;
use crate::config::AppConfig;
use crate::error::Result;
use crate::output::Formatter;
use lectern_extractor::{PersistenceCoordinator, RetryPolicy};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

/// Execute the reset-table command.
///
/// Returns whether the table was reset.
pub async fn execute_reset_table(
    args: ResetTableArgs,
    config: &AppConfig,
    formatter: &Formatter,
) -> Result<bool> {
    let schema = config.schema()?;
    let layout = config.layout(&schema)?;

    if !args.yes && !confirm(&mut io::stdin().lock(), layout.table())? {
        println!("{}", formatter.info("Operation cancelled"));
        return Ok(false);
    }

    let retry = RetryPolicy::from_config(&config.extractor.retry, config.extractor.network_timeout());
    let store = Arc::new(Mutex::new(open_store(config)?));
    let persistence = PersistenceCoordinator::new(store, layout, false, retry);
    persistence.reset().await?;

    println!(
        "{}",
        formatter.success(&format!("Table '{}' dropped and recreated", persistence.layout().table()))
    );
    Ok(true)
}

/// Ask before dropping `table`; anything but `y` declines.
fn confirm(input: &mut impl BufRead, table: &str) -> Result<bool> {
    print!("About to drop every row of table '{}'. Continue? [y/N] ", table);
    io::stdout().flush()?;

    let mut response = String::new();
    input.read_line(&mut response)?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_domain::{ColumnValue, RowKey, RowStore, TableRow};
    use std::fs;

    #[test]
    fn test_confirm() {
        assert!(confirm(&mut "y\n".as_bytes(), "t").unwrap());
        assert!(confirm(&mut " Y \n".as_bytes(), "t").unwrap());
        assert!(!confirm(&mut "\n".as_bytes(), "t").unwrap());
        assert!(!confirm(&mut "yes\n".as_bytes(), "t").unwrap());
    }

    #[tokio::test]
    async fn test_reset_drops_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lectern.toml");
        fs::write(
            &path,
            r#"
[schema]
research_goal = "g"
research_question = "What is the IC50 of {drug}?"

[[schema.input_parameters]]
name = "drug"
max_length = 20

[[schema.input_parameters.values]]
name = "TTX"

[[schema.output_features]]
name = "ic50"
data_type = "decimal"

[store]
path = "screen.db"
metadata_columns = ["pubmed_id"]
"#,
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        let schema = config.schema().unwrap();
        let layout = config.layout(&schema).unwrap();

        {
            let mut store = open_store(&config).unwrap();
            store.prepare(&layout).unwrap();
            let mut row = TableRow::new();
            row.push("pubmed_id", ColumnValue::Text("PMID1".to_string()));
            row.push("drug", ColumnValue::Text("TTX".to_string()));
            row.push("ic50", ColumnValue::Real(18.0));
            store
                .upsert(&layout, &RowKey::new(vec!["TTX".to_string()], "PMID1"), &row)
                .unwrap();
            assert_eq!(store.count(&layout).unwrap(), 1);
        }

        let reset = execute_reset_table(ResetTableArgs { yes: true }, &config, &Formatter::new(false))
            .await
            .unwrap();
        assert!(reset);
        assert_eq!(open_store(&config).unwrap().count(&layout).unwrap(), 0);
    }
}
