//! Articles and their sections

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a section inside its article
///
/// Citations refer to sections through this identifier rather than by
/// holding the section itself. Rendered as `section_<n>` with `n` 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionId(usize);

impl SectionId {
    /// Identifier for the section at `index` (0-based)
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// 0-based index into the article's sections
    pub fn index(&self) -> usize {
        self.0
    }

    /// Label used in prompts and in the `sections` column
    ///
    /// ```
    /// use lectern_domain::SectionId;
    ///
    /// assert_eq!(SectionId::new(0).label(), "section_1");
    /// assert_eq!(SectionId::parse_label("section_3"), Some(SectionId::new(2)));
    /// ```
    pub fn label(&self) -> String {
        format!("section_{}", self.0 + 1)
    }

    /// Parse a `section_<n>` label; case and surrounding whitespace are ignored
    pub fn parse_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_ascii_lowercase();
        let number = lowered.strip_prefix("section_")?;
        let n: usize = number.parse().ok()?;
        if n == 0 {
            return None;
        }
        Some(Self(n - 1))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A titled block of article text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section heading (may be empty, e.g. for an abstract paragraph)
    #[serde(default)]
    pub heading: String,

    /// Section body text
    pub text: String,
}

impl Section {
    /// Create a section
    pub fn new(heading: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            text: text.into(),
        }
    }
}

/// Where an article's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArticleFormat {
    /// Full text from an open-access archive
    #[serde(rename = "PMC", alias = "full_text")]
    FullText,

    /// Abstract only
    #[serde(rename = "PUBMED", alias = "abstract")]
    Abstract,

    /// Abstract extended with sections parsed from an attached document
    #[serde(rename = "PUBMED | PDF", alias = "parsed_document")]
    ParsedDocument,
}

impl ArticleFormat {
    /// Value written to the `format` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleFormat::FullText => "PMC",
            ArticleFormat::Abstract => "PUBMED",
            ArticleFormat::ParsedDocument => "PUBMED | PDF",
        }
    }
}

impl fmt::Display for ArticleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved article
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    id: String,
    format: ArticleFormat,
    sections: Vec<Section>,
    raw_document: Option<Vec<u8>>,
}

impl Article {
    /// Create an article with the given sections
    pub fn new(id: impl Into<String>, format: ArticleFormat, sections: Vec<Section>) -> Self {
        Self {
            id: id.into(),
            format,
            sections,
            raw_document: None,
        }
    }

    /// Attach an unparsed document (e.g. a PDF) to be run through a document parser
    pub fn with_raw_document(mut self, raw: Vec<u8>) -> Self {
        self.raw_document = Some(raw);
        self
    }

    /// External identifier (e.g. PubMed ID)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Format of the article text
    pub fn format(&self) -> ArticleFormat {
        self.format
    }

    /// Sections in document order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section by identifier
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.index())
    }

    /// Attached unparsed document, if any
    pub fn raw_document(&self) -> Option<&[u8]> {
        self.raw_document.as_deref()
    }

    /// True when the article has no sections to extract from
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Append sections parsed from the attached document
    ///
    /// The attachment is consumed; existing sections (the abstract) stay first.
    pub fn with_parsed_sections(mut self, parsed: Vec<Section>) -> Self {
        self.raw_document = None;
        if parsed.is_empty() {
            return self;
        }
        self.sections.extend(parsed);
        self.format = ArticleFormat::ParsedDocument;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_label_round_trip() {
        for i in [0usize, 1, 9, 41] {
            let id = SectionId::new(i);
            assert_eq!(SectionId::parse_label(&id.label()), Some(id));
        }
    }

    #[test]
    fn test_parse_label_rejects_garbage() {
        assert_eq!(SectionId::parse_label("section_0"), None);
        assert_eq!(SectionId::parse_label("chapter_1"), None);
        assert_eq!(SectionId::parse_label("section_x"), None);
        assert_eq!(SectionId::parse_label(" Section_2 "), Some(SectionId::new(1)));
    }

    #[test]
    fn test_format_strings() {
        assert_eq!(ArticleFormat::FullText.as_str(), "PMC");
        assert_eq!(ArticleFormat::Abstract.as_str(), "PUBMED");
        assert_eq!(ArticleFormat::ParsedDocument.as_str(), "PUBMED | PDF");
    }

    #[test]
    fn test_parsed_sections_upgrade_format() {
        let article = Article::new(
            "123",
            ArticleFormat::Abstract,
            vec![Section::new("Abstract", "short")],
        )
        .with_raw_document(b"%PDF".to_vec());

        let upgraded = article.with_parsed_sections(vec![Section::new("Methods", "long")]);
        assert_eq!(upgraded.format(), ArticleFormat::ParsedDocument);
        assert_eq!(upgraded.sections().len(), 2);
        assert_eq!(upgraded.sections()[0].heading, "Abstract");
        assert!(upgraded.raw_document().is_none());
    }

    #[test]
    fn test_empty_parse_keeps_format() {
        let article = Article::new("1", ArticleFormat::Abstract, vec![Section::new("", "a")])
            .with_raw_document(vec![1, 2, 3]);
        let same = article.with_parsed_sections(Vec::new());
        assert_eq!(same.format(), ArticleFormat::Abstract);
        assert_eq!(same.sections().len(), 1);
    }
}
