//! Integration tests for the directory-backed article source

use lectern_domain::{ArticleFormat, ArticleSource, DocumentParser};
use lectern_sources::{DirectorySource, HeadingParser, SourceError};
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.json",
        r#"{
            "id": "1001",
            "format": "PMC",
            "title": "Tetrodotoxin block of Nav1.7",
            "sections": [
                {"heading": "Abstract", "text": "TTX blocked Nav1.7 with an IC50 of 18 nM."},
                {"heading": "Methods", "text": "Whole-cell recordings in HEK293 cells."}
            ]
        }"#,
    );
    write(
        dir.path(),
        "b.json",
        r#"{
            "id": "1002",
            "sections": [{"heading": "Abstract", "text": "Lidocaine use-dependent block of sodium channels."}],
            "attachment": "1002.md"
        }"#,
    );
    write(
        dir.path(),
        "1002.md",
        "# Introduction\nLocal anaesthetics.\n# Results\nIC50 of 200 uM.\n# References\nHille 2001",
    );
    write(dir.path(), "notes.txt", "not an article");
    dir
}

#[test]
fn test_index_and_search() {
    let dir = corpus();
    let source = DirectorySource::new(dir.path()).unwrap();
    assert_eq!(source.len(), 2);

    let hits = source.search("(TTX OR tetrodotoxin) AND (Nav1.7)", 10).unwrap();
    assert_eq!(hits, vec!["1001".to_string()]);

    let hits = source.search("(sodium OR Nav1.7)", 10).unwrap();
    assert_eq!(hits, vec!["1001".to_string(), "1002".to_string()]);

    let hits = source.search("(sodium OR Nav1.7)", 1).unwrap();
    assert_eq!(hits, vec!["1001".to_string()]);

    assert!(source.search("(saxitoxin)", 10).unwrap().is_empty());
}

#[test]
fn test_quoted_phrase_with_parentheses() {
    let dir = corpus();
    let source = DirectorySource::new(dir.path()).unwrap();
    let hits = source
        .search(r#"(saxitoxin OR "IC50 of 18 nM.") AND (Nav1.7)"#, 10)
        .unwrap();
    assert_eq!(hits, vec!["1001".to_string()]);
}

#[test]
fn test_additional_keywords_narrow_results() {
    let dir = corpus();
    let source = DirectorySource::new(dir.path()).unwrap();
    let hits = source.search("(sodium OR Nav1.7) lidocaine", 10).unwrap();
    assert_eq!(hits, vec!["1002".to_string()]);
}

#[test]
fn test_fetch_with_attachment() {
    let dir = corpus();
    let source = DirectorySource::new(dir.path()).unwrap();

    let full = source.fetch("1001").unwrap().unwrap();
    assert_eq!(full.format(), ArticleFormat::FullText);
    assert_eq!(full.sections().len(), 2);
    assert!(full.raw_document().is_none());

    let abstract_only = source.fetch("1002").unwrap().unwrap();
    assert_eq!(abstract_only.format(), ArticleFormat::Abstract);
    let raw = abstract_only.raw_document().unwrap().to_vec();

    let parsed = HeadingParser::new().parse(&raw).unwrap();
    assert_eq!(parsed.len(), 2);
    let upgraded = abstract_only.with_parsed_sections(parsed);
    assert_eq!(upgraded.format(), ArticleFormat::ParsedDocument);
    assert_eq!(upgraded.sections()[0].heading, "Abstract");
    assert_eq!(upgraded.sections()[2].heading, "Results");

    assert!(source.fetch("9999").unwrap().is_none());
}

#[test]
fn test_missing_attachment_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "x.json",
        r#"{"id": "1", "sections": [], "attachment": "missing.pdf"}"#,
    );
    let source = DirectorySource::new(dir.path()).unwrap();
    assert!(matches!(source.fetch("1"), Err(SourceError::Io { .. })));
}

#[test]
fn test_duplicate_ids_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.json", r#"{"id": "7"}"#);
    write(dir.path(), "b.json", r#"{"id": "7"}"#);
    assert!(matches!(
        DirectorySource::new(dir.path()),
        Err(SourceError::DuplicateArticle(id)) if id == "7"
    ));
}

#[test]
fn test_malformed_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.json", r#"{"sections": []}"#);
    assert!(matches!(
        DirectorySource::new(dir.path()),
        Err(SourceError::Malformed { .. })
    ));
}

#[test]
fn test_missing_directory() {
    assert!(matches!(
        DirectorySource::new("/definitely/not/here"),
        Err(SourceError::Io { .. })
    ));
}
