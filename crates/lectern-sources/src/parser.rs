//! Heading-based document parser

use crate::SourceError;
use lectern_domain::{DocumentParser, Section};

/// Headings whose sections carry no findings
const DEFAULT_SKIPPED: &[&str] = &[
    "references",
    "bibliography",
    "acknowledgements",
    "acknowledgments",
    "funding",
    "conflict of interest",
];

/// Splits UTF-8 documents into sections at markdown (`# Title`) or numbered
/// (`2. Methods`, `3.1 Patch clamp`) headings
///
/// Documents without headings become one section per paragraph. Sections
/// whose heading is in the skip list (references, acknowledgements, ...) are
/// dropped.
#[derive(Debug, Clone)]
pub struct HeadingParser {
    skipped: Vec<String>,
    max_heading_len: usize,
}

impl Default for HeadingParser {
    fn default() -> Self {
        Self {
            skipped: DEFAULT_SKIPPED.iter().map(|s| s.to_string()).collect(),
            max_heading_len: 120,
        }
    }
}

impl HeadingParser {
    /// Parser with the default skip list
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list of skipped headings (compared case-insensitively)
    pub fn with_skipped_headings<I, S>(mut self, headings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped = headings.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Heading text if `line` is a heading
    fn heading(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().count() > self.max_heading_len {
            return None;
        }

        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            return (!title.is_empty()).then(|| title.to_string());
        }

        // Numbered heading: digits and dots, then a capitalised title without a final period
        let numbering: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if numbering.is_empty() || !numbering.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let title = trimmed[numbering.len()..].trim();
        let starts_upper = title.chars().next().is_some_and(char::is_uppercase);
        if starts_upper && !title.ends_with('.') && title.split_whitespace().count() <= 12 {
            return Some(title.to_string());
        }
        None
    }

    fn is_skipped(&self, heading: &str) -> bool {
        let lowered = heading.to_lowercase();
        self.skipped.iter().any(|s| *s == lowered)
    }

    /// Split text into sections
    pub fn parse_text(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current: Option<(String, String)> = None;
        let mut saw_heading = false;

        for line in text.lines() {
            if let Some(heading) = self.heading(line) {
                saw_heading = true;
                if let Some((h, body)) = current.take() {
                    sections.push(Section::new(h, body.trim()));
                }
                current = Some((heading, String::new()));
                continue;
            }
            let (_, body) = current.get_or_insert_with(|| (String::new(), String::new()));
            body.push_str(line);
            body.push('\n');
        }
        if let Some((h, body)) = current {
            sections.push(Section::new(h, body.trim()));
        }

        if !saw_heading {
            return text
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| Section::new("", p))
                .collect();
        }

        sections
            .into_iter()
            .filter(|s| !s.text.is_empty() && !self.is_skipped(&s.heading))
            .collect()
    }
}

impl DocumentParser for HeadingParser {
    type Error = SourceError;

    fn parse(&self, raw: &[u8]) -> Result<Vec<Section>, Self::Error> {
        let text = std::str::from_utf8(raw).map_err(|_| SourceError::NotText)?;
        let sections = self.parse_text(text);
        if sections.is_empty() {
            return Err(SourceError::EmptyDocument);
        }
        Ok(sections)
    }
}
