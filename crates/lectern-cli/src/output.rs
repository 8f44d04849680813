//! Output formatting for the CLI.

use colored::*;
use lectern_domain::{Binding, ColumnRole, Schema, TableLayout};
use lectern_extractor::RunSummary;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(color_enabled: bool) -> Self {
        Self { color_enabled }
    }

    /// Format the end-of-run report: counters, then one row per failure.
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Outcome", "Count"]);
        for (label, count) in [
            ("Accepted", summary.accepted),
            ("Replaced", summary.replaced),
            ("Skipped (existing)", summary.skipped_existing),
            ("Rejected", summary.rejected),
            ("Failed", summary.failed),
            ("Failed searches", summary.searches_failed),
        ] {
            builder.push_record([label.to_string(), count.to_string()]);
        }

        let mut out = vec![
            self.colorize(&format!("Run {}", summary.run_id), "cyan"),
            self.table(builder),
            format!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64()),
        ];

        if summary.cancelled {
            out.push(self.warning("Run cancelled before all bindings were processed"));
        }

        if !summary.failures.is_empty() {
            let mut failures = Builder::default();
            failures.push_record(["Key", "Stage", "Reason"]);
            for failure in &summary.failures {
                failures.push_record([
                    failure.subject.clone(),
                    failure.kind.to_string(),
                    failure.reason.clone(),
                ]);
            }
            out.push(self.table(failures));
        }

        out.join("\n")
    }

    /// Format the destination table's columns.
    pub fn format_layout(&self, layout: &TableLayout) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Column", "Type", "Role", "Key"]);
        for column in layout.columns() {
            let role = match column.role {
                ColumnRole::Metadata(_) => "metadata",
                ColumnRole::Input => "input",
                ColumnRole::Output => "output",
            };
            builder.push_record([
                column.name.clone(),
                column.column_type.to_string(),
                role.to_string(),
                if column.key { "yes" } else { "" }.to_string(),
            ]);
        }
        format!("Table '{}'\n{}", layout.table(), self.table(builder))
    }

    /// Format every binding with its retrieval query and question.
    pub fn format_bindings(&self, schema: &Schema, bindings: &[Binding]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Binding", "Search query", "Question"]);
        for binding in bindings {
            let question = schema
                .format_question(binding)
                .unwrap_or_else(|e| self.error(&e.to_string()));
            builder.push_record([binding.to_string(), schema.search_query(binding), question]);
        }
        self.table(builder)
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_domain::{MetadataColumn, SchemaDefinition};
    use lectern_extractor::FailureKind;

    fn schema() -> Schema {
        let def: SchemaDefinition = toml::from_str(
            r#"
research_goal = "g"
research_question = "What is the IC50 of {drug}?"

[[input_parameters]]
name = "drug"
max_length = 20

[[input_parameters.values]]
name = "TTX"
search_aliases = ["tetrodotoxin"]

[[output_features]]
name = "ic50"
data_type = "decimal"
"#,
        )
        .unwrap();
        Schema::new(def).unwrap()
    }

    #[test]
    fn test_summary_lists_counts_and_failures() {
        let mut summary = RunSummary::new();
        summary.record_accepted();
        summary.record_rejected("(TTX, PMID1)", "ic50 missing");
        summary.record_failure("(TTX, PMID2)", FailureKind::Retrieval, "not found");

        let output = Formatter::new(false).format_summary(&summary);
        assert!(output.contains("Accepted"));
        assert!(output.contains("(TTX, PMID1)"));
        assert!(output.contains("retrieval"));
        assert!(!output.contains("cancelled"));
    }

    #[test]
    fn test_cancelled_summary_warns() {
        let mut summary = RunSummary::new();
        summary.cancelled = true;
        let output = Formatter::new(false).format_summary(&summary);
        assert!(output.contains("⚠ Run cancelled"));
    }

    #[test]
    fn test_layout_table() {
        let schema = schema();
        let layout = TableLayout::new("screening", &schema, &[MetadataColumn::PubmedId]).unwrap();
        let output = Formatter::new(false).format_layout(&layout);
        assert!(output.starts_with("Table 'screening'"));
        assert!(output.contains("pubmed_id"));
        assert!(output.contains("VARCHAR(10)"));
        assert!(output.contains("FLOAT"));
    }

    #[test]
    fn test_bindings_table() {
        let schema = schema();
        let output = Formatter::new(false).format_bindings(&schema, &schema.bindings());
        assert!(output.contains("(TTX OR tetrodotoxin)"));
        assert!(output.contains("What is the IC50 of TTX?"));
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(false);
        assert_eq!(formatter.success("test"), "✓ test");
    }
}
