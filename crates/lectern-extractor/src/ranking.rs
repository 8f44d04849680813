//! BM25 passage ranking over the sections of one article

use crate::config::ExtractorConfig;
use lectern_domain::{Section, SectionId};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// English stop words removed before stemming unless retained
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Case-folding, stemming tokenizer
pub struct Tokenizer {
    stemmer: Stemmer,
    stop_words: Option<HashSet<&'static str>>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("algorithm", &"english")
            .field("keep_stop_words", &self.stop_words.is_none())
            .finish()
    }
}

impl Tokenizer {
    /// English Snowball tokenizer
    pub fn new(keep_stop_words: bool) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words: (!keep_stop_words).then(|| STOP_WORDS.iter().copied().collect()),
        }
    }

    /// Split `text` into stemmed terms, in order of appearance
    ///
    /// ```
    /// use lectern_extractor::Tokenizer;
    ///
    /// let tokens = Tokenizer::new(false).tokenize("The channels were Blocking");
    /// assert_eq!(tokens, vec!["channel", "block"]);
    /// ```
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .filter(|w| {
                self.stop_words
                    .as_ref()
                    .is_none_or(|stop| !stop.contains(w.as_str()))
            })
            .map(|w| self.stemmer.stem(&w).into_owned())
            .collect()
    }

    /// Distinct terms of `text`, first occurrence order
    fn distinct_terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

/// A section selected for the prompt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSection {
    /// Position of the section in its article
    pub id: SectionId,
    /// Relevance score (higher is better)
    pub score: f64,
}

/// Term statistics of one article
struct Corpus {
    docs: Vec<HashMap<String, usize>>,
    lengths: Vec<usize>,
    avgdl: f64,
    df: HashMap<String, usize>,
}

impl Corpus {
    fn new(tokenized: Vec<Vec<String>>) -> Self {
        let lengths: Vec<usize> = tokenized.iter().map(Vec::len).collect();
        let total: usize = lengths.iter().sum();
        let avgdl = if tokenized.is_empty() {
            0.0
        } else {
            total as f64 / tokenized.len() as f64
        };

        let mut df: HashMap<String, usize> = HashMap::new();
        let docs: Vec<HashMap<String, usize>> = tokenized
            .into_iter()
            .map(|tokens| {
                let mut tf: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *tf.entry(token).or_insert(0) += 1;
                }
                for term in tf.keys() {
                    *df.entry(term.clone()).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        Self {
            docs,
            lengths,
            avgdl,
            df,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.df.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score(&self, doc: usize, terms: &[String], k1: f64, b: f64) -> f64 {
        let length_ratio = if self.avgdl > 0.0 {
            self.lengths[doc] as f64 / self.avgdl
        } else {
            0.0
        };
        terms
            .iter()
            .map(|term| {
                let tf = self.docs[doc].get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let norm = k1 * (1.0 - b + b * length_ratio);
                self.idf(term) * tf * (k1 + 1.0) / (tf + norm)
            })
            .sum()
    }
}

/// Selects the sections of an article most relevant to a query
///
/// Sections are scored with Okapi BM25, statistics taken from the article's
/// own sections. Terms of the negative context that are not also query
/// terms lower a section's score by `negative_weight` times their BM25
/// contribution.
#[derive(Debug)]
pub struct PassageRanker {
    top_n: usize,
    k1: f64,
    b: f64,
    negative_weight: f64,
    tokenizer: Tokenizer,
}

impl PassageRanker {
    /// Ranker returning at most `top_n` sections, with default BM25 parameters
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            k1: 1.5,
            b: 0.75,
            negative_weight: 0.5,
            tokenizer: Tokenizer::new(false),
        }
    }

    /// Ranker configured from the extractor settings
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            top_n: config.top_sections_per_article,
            k1: config.bm25_k1,
            b: config.bm25_b,
            negative_weight: config.negative_weight,
            tokenizer: Tokenizer::new(config.keep_stop_words),
        }
    }

    /// Override the BM25 parameters
    pub fn with_bm25(mut self, k1: f64, b: f64) -> Self {
        self.k1 = k1;
        self.b = b;
        self
    }

    /// Override the negative-context weight
    pub fn with_negative_weight(mut self, weight: f64) -> Self {
        self.negative_weight = weight;
        self
    }

    /// Maximum number of sections returned
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Score every section against `query`, minus the `negative` context
    pub fn score_all(&self, sections: &[Section], query: &str, negative: &str) -> Vec<f64> {
        let corpus = Corpus::new(
            sections
                .iter()
                .map(|s| self.tokenizer.tokenize(&format!("{} {}", s.heading, s.text)))
                .collect(),
        );
        let positive = self.tokenizer.distinct_terms(query);
        let negative: Vec<String> = self
            .tokenizer
            .distinct_terms(negative)
            .into_iter()
            .filter(|t| !positive.contains(t))
            .collect();

        (0..sections.len())
            .map(|doc| {
                let mut score = corpus.score(doc, &positive, self.k1, self.b);
                if !negative.is_empty() && self.negative_weight > 0.0 {
                    score -= self.negative_weight * corpus.score(doc, &negative, self.k1, self.b);
                }
                score
            })
            .collect()
    }

    /// Top sections for `query`, best first, ties by document order
    ///
    /// An article with at most `top_n` sections yields all of them in
    /// document order; an article without sections yields nothing.
    pub fn rank(&self, sections: &[Section], query: &str, negative: &str) -> Vec<RankedSection> {
        if sections.is_empty() {
            return Vec::new();
        }

        let scores = self.score_all(sections, query, negative);
        let mut ranked: Vec<RankedSection> = scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| RankedSection {
                id: SectionId::new(i),
                score,
            })
            .collect();

        if ranked.len() > self.top_n {
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
            ranked.truncate(self.top_n);
        }

        debug!(
            sections = sections.len(),
            selected = ranked.len(),
            top_score = ranked.first().map(|r| r.score),
            "Ranked sections"
        );
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ttx_sections() -> Vec<Section> {
        vec![
            Section::new(
                "Results",
                "TTX blocked Nav1.7 currents with an IC50 of 18 nM in HEK293 cells.",
            ),
            Section::new(
                "Methods",
                "Cells were cultured at 37 degrees and recorded by whole-cell patch clamp.",
            ),
            Section::new(
                "Discussion",
                "Tetrodotoxin sensitivity of Nav1.7 distinguishes it from Nav1.8.",
            ),
        ]
    }

    #[test]
    fn test_tokenizer_stems_and_drops_stop_words() {
        let tokenizer = Tokenizer::new(false);
        assert_eq!(tokenizer.tokenize("The blocking of channels"), vec!["block", "channel"]);
        let keep = Tokenizer::new(true);
        assert_eq!(keep.tokenize("The blocking"), vec!["the", "block"]);
        assert!(tokenizer.tokenize("  ,.;  ").is_empty());
    }

    #[test]
    fn test_top_two_for_ttx_query() {
        let ranker = PassageRanker::new(2);
        let ranked = ranker.rank(
            &ttx_sections(),
            "What is the IC50 of TTX tetrodotoxin on Nav1.7?",
            "",
        );
        let ids: Vec<usize> = ranked.iter().map(|r| r.id.index()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&0));
        assert!(ids.contains(&2));
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_few_sections_returned_in_document_order() {
        let ranker = PassageRanker::new(5);
        let ranked = ranker.rank(&ttx_sections(), "tetrodotoxin", "");
        let ids: Vec<usize> = ranked.iter().map(|r| r.id.index()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_article() {
        assert!(PassageRanker::new(3).rank(&[], "anything", "").is_empty());
    }

    #[test]
    fn test_ties_broken_by_document_order() {
        let sections = vec![
            Section::new("", "unrelated text"),
            Section::new("", "other words"),
            Section::new("", "nothing here"),
        ];
        let ranked = PassageRanker::new(2).rank(&sections, "tetrodotoxin", "");
        let ids: Vec<usize> = ranked.iter().map(|r| r.id.index()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_negative_context_demotes_sections() {
        let sections = vec![
            Section::new("", "lidocaine block in animal models of neuropathic pain"),
            Section::new("", "lidocaine block measured in human cells"),
            Section::new("", "unrelated"),
        ];
        let ranker = PassageRanker::new(1);
        let plain = ranker.rank(&sections, "lidocaine block", "");
        assert_eq!(plain[0].id.index(), 0);

        let demoted = ranker.rank(&sections, "lidocaine block", "animal models");
        assert_eq!(demoted[0].id.index(), 1);
    }

    #[test]
    fn test_negative_terms_shared_with_query_are_ignored() {
        let sections = ttx_sections();
        let ranker = PassageRanker::new(3);
        let plain = ranker.score_all(&sections, "tetrodotoxin", "");
        let shared = ranker.score_all(&sections, "tetrodotoxin", "tetrodotoxin");
        assert_eq!(plain, shared);
    }

    proptest! {
        #[test]
        fn prop_ranking_is_deterministic(
            texts in prop::collection::vec("[a-z ]{0,40}", 0..8),
            query in "[a-z ]{0,20}",
            top_n in 1usize..6,
        ) {
            let sections: Vec<Section> = texts.iter().map(|t| Section::new("", t.clone())).collect();
            let ranker = PassageRanker::new(top_n);
            let first = ranker.rank(&sections, &query, "");
            let second = ranker.rank(&sections, &query, "");
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), sections.len().min(top_n));

            let mut ids: Vec<usize> = first.iter().map(|r| r.id.index()).collect();
            if sections.len() <= top_n {
                prop_assert_eq!(ids.clone(), (0..sections.len()).collect::<Vec<_>>());
            }
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), first.len());
        }
    }
}
