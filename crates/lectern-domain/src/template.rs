//! Research-question templates with `{placeholder}` slots
//!
//! Placeholders name input parameters. Literal braces are written doubled
//! (`{{` and `}}`).

use std::fmt;
use thiserror::Error;

/// Error raised while rendering a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A placeholder had no value in the supplied bindings
    #[error("Placeholder '{{{0}}}' has no bound value")]
    Unbound(String),
}

/// Error raised while parsing a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed template at byte {position}: {reason}")]
pub struct TemplateSyntaxError {
    /// Byte offset of the offending character
    pub position: usize,
    /// What was wrong
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string
    ///
    /// # Examples
    ///
    /// ```
    /// use lectern_domain::Template;
    ///
    /// let template = Template::parse("What is the IC50 of {drug}?").unwrap();
    /// assert_eq!(template.placeholders(), vec!["drug"]);
    /// ```
    pub fn parse(source: &str) -> Result<Self, TemplateSyntaxError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateSyntaxError {
                            position: pos,
                            reason: "unclosed '{'".to_string(),
                        });
                    }
                    if name.is_empty()
                        || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
                    {
                        return Err(TemplateSyntaxError {
                            position: pos,
                            reason: format!("invalid placeholder name '{}'", name),
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateSyntaxError {
                            position: pos,
                            reason: "unmatched '}'".to_string(),
                        });
                    }
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The unparsed template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of first appearance, without duplicates
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render the template, resolving each placeholder through `lookup`
    pub fn render<F>(&self, mut lookup: F) -> Result<String, RenderError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = lookup(name).ok_or_else(|| RenderError::Unbound(name.clone()))?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }

    /// Text of the template with every placeholder removed
    pub fn literal_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(text) => Some(text.as_str()),
                Segment::Placeholder(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholders() {
        let t = Template::parse("Effect of {drug} on {target} and {drug} again").unwrap();
        assert_eq!(t.placeholders(), vec!["drug", "target"]);
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let t = Template::parse("JSON like {{\"a\": 1}} for {drug}").unwrap();
        assert_eq!(t.placeholders(), vec!["drug"]);
        let out = t.render(|_| Some("TTX".to_string())).unwrap();
        assert_eq!(out, "JSON like {\"a\": 1} for TTX");
    }

    #[test]
    fn test_unclosed_brace() {
        let err = Template::parse("What about {drug").unwrap_err();
        assert_eq!(err.position, 11);
    }

    #[test]
    fn test_unmatched_closing_brace() {
        assert!(Template::parse("oops } here").is_err());
    }

    #[test]
    fn test_invalid_placeholder_name() {
        assert!(Template::parse("bad {drug name}").is_err());
        assert!(Template::parse("empty {}").is_err());
    }

    #[test]
    fn test_render_unbound() {
        let t = Template::parse("{drug}").unwrap();
        let err = t.render(|_| None).unwrap_err();
        assert_eq!(err, RenderError::Unbound("drug".to_string()));
    }

    #[test]
    fn test_literal_text() {
        let t = Template::parse("IC50 of {drug} in {cell}?").unwrap();
        assert_eq!(t.literal_text(), "IC50 of  in ?");
    }

    proptest::proptest! {
        #[test]
        fn prop_brace_free_text_renders_unchanged(text in "[^{}]{0,64}") {
            let t = Template::parse(&text).unwrap();
            proptest::prop_assert!(t.placeholders().is_empty());
            proptest::prop_assert_eq!(t.render(|_| None).unwrap(), text);
        }
    }
}
