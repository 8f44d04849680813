//! Literature index over a directory of article files

use crate::SourceError;
use lectern_domain::{Article, ArticleFormat, ArticleSource, Section};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ArticleFile {
    id: String,
    #[serde(default = "default_format")]
    format: ArticleFormat,
    #[serde(default)]
    title: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    attachment: Option<PathBuf>,
}

fn default_format() -> ArticleFormat {
    ArticleFormat::Abstract
}

#[derive(Debug)]
struct IndexedArticle {
    file: ArticleFile,
    searchable: String,
}

/// Article source reading `*.json` article files from one directory
///
/// Files are indexed once at construction. Search results are ordered by
/// article id.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    articles: BTreeMap<String, IndexedArticle>,
}

impl DirectorySource {
    /// Index every `*.json` file in `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        let io_err = |path: &Path, source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&root).map_err(|e| io_err(&root, e))? {
            let path = entry.map_err(|e| io_err(&root, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut articles = BTreeMap::new();
        for path in paths {
            let content = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let file: ArticleFile =
                serde_json::from_str(&content).map_err(|e| SourceError::Malformed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if file.id.trim().is_empty() {
                return Err(SourceError::Malformed {
                    path,
                    reason: "empty article id".to_string(),
                });
            }

            let mut searchable = format!("{}\n{}\n", file.title, file.keywords.join("\n"));
            for section in &file.sections {
                searchable.push_str(&section.heading);
                searchable.push('\n');
                searchable.push_str(&section.text);
                searchable.push('\n');
            }

            let id = file.id.clone();
            let indexed = IndexedArticle {
                file,
                searchable: searchable.to_lowercase(),
            };
            if articles.insert(id.clone(), indexed).is_some() {
                return Err(SourceError::DuplicateArticle(id));
            }
        }

        info!(root = %root.display(), articles = articles.len(), "Article directory indexed");
        Ok(Self { root, articles })
    }

    /// Number of indexed articles
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    /// True when the directory holds no articles
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl ArticleSource for DirectorySource {
    type Error = SourceError;

    fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, Self::Error> {
        let parsed = Query::parse(query)?;
        let ids: Vec<String> = self
            .articles
            .iter()
            .filter(|(_, article)| parsed.matches(&article.searchable))
            .map(|(id, _)| id.clone())
            .take(max_results)
            .collect();
        debug!(query, hits = ids.len(), "Directory search");
        Ok(ids)
    }

    fn fetch(&self, article_id: &str) -> Result<Option<Article>, Self::Error> {
        let Some(indexed) = self.articles.get(article_id) else {
            return Ok(None);
        };
        let file = &indexed.file;
        let mut article = Article::new(file.id.clone(), file.format, file.sections.clone());
        if let Some(attachment) = &file.attachment {
            let path = self.root.join(attachment);
            let raw = fs::read(&path).map_err(|source| SourceError::Io { path, source })?;
            article = article.with_raw_document(raw);
        }
        Ok(Some(article))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Word(String),
    Phrase(String),
}

fn tokenize(query: &str) -> Result<Vec<Token>, SourceError> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let phrase: String = chars.by_ref().take_while(|&ch| ch != '"').collect();
                tokens.push(Token::Phrase(phrase));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    if tokens.is_empty() {
        return Err(SourceError::InvalidQuery("empty query".to_string()));
    }
    Ok(tokens)
}

/// Boolean query: every clause must match; a clause matches when any of its
/// phrases occurs in the article text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Query {
    clauses: Vec<Vec<String>>,
}

impl Query {
    /// Parse `(a OR b) AND (c) d` style queries
    ///
    /// Terms outside parentheses are joined with an implicit AND. Inside
    /// parentheses, consecutive words form one phrase and `OR` separates
    /// phrases. Nesting is not supported.
    pub(crate) fn parse(query: &str) -> Result<Self, SourceError> {
        let tokens = tokenize(query)?;
        let invalid = |msg: &str| SourceError::InvalidQuery(format!("{}: {}", msg, query));

        let mut clauses: Vec<Vec<String>> = Vec::new();
        let mut pending_or = false;
        let mut iter = tokens.into_iter();

        while let Some(token) = iter.next() {
            let group = match token {
                Token::Word(w) if w == "AND" => {
                    if pending_or {
                        return Err(invalid("AND after OR"));
                    }
                    continue;
                }
                Token::Word(w) if w == "OR" => {
                    if clauses.is_empty() || pending_or {
                        return Err(invalid("dangling OR"));
                    }
                    pending_or = true;
                    continue;
                }
                Token::Word(w) | Token::Phrase(w) => vec![w.to_lowercase()],
                Token::Close => return Err(invalid("unmatched ')'")),
                Token::Open => {
                    let mut alternatives = Vec::new();
                    let mut phrase: Vec<String> = Vec::new();
                    let mut closed = false;
                    for inner in iter.by_ref() {
                        match inner {
                            Token::Close => {
                                closed = true;
                                break;
                            }
                            Token::Open => return Err(invalid("nested parentheses")),
                            Token::Word(w) if w == "OR" => {
                                if phrase.is_empty() {
                                    return Err(invalid("empty alternative"));
                                }
                                alternatives.push(phrase.join(" ").to_lowercase());
                                phrase.clear();
                            }
                            Token::Word(w) if w == "AND" => {
                                return Err(invalid("AND inside parentheses"))
                            }
                            Token::Word(w) | Token::Phrase(w) => phrase.push(w),
                        }
                    }
                    if !closed {
                        return Err(invalid("unclosed '('"));
                    }
                    if phrase.is_empty() {
                        return Err(invalid("empty alternative"));
                    }
                    alternatives.push(phrase.join(" ").to_lowercase());
                    alternatives
                }
            };

            match clauses.last_mut() {
                Some(last) if pending_or => last.extend(group),
                _ => clauses.push(group),
            }
            pending_or = false;
        }

        if pending_or {
            return Err(invalid("dangling OR"));
        }
        Ok(Self { clauses })
    }

    /// Whether lowercased `text` satisfies the query
    pub(crate) fn matches(&self, text: &str) -> bool {
        self.clauses
            .iter()
            .all(|alternatives| alternatives.iter().any(|phrase| text.contains(phrase.as_str())))
    }
}
