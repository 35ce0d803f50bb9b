//! Tag template parsing and expansion.
//!
//! A template is a string with scalar placeholders (`{name}`, `{version}`)
//! and list placeholders (`{mutable_tags[]}`, `{immutable_tags[]}`). It is
//! parsed once into a token list and expanded by structural recursion: each
//! recursion step substitutes exactly one list token with one value from the
//! referenced list, so the remaining placeholders survive untouched and the
//! list-token count strictly decreases until only scalars remain.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::metadata::ImageMetadata;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Name,
    Version,
    MutableTags,
    ImmutableTags,
}

#[derive(Debug, Clone)]
pub struct TagTemplate {
    raw: String,
    tokens: Vec<Token>,
}

impl TagTemplate {
    /// Parse a template string. Unknown or unterminated placeholders are a
    /// defect, not a silently-ignored no-op.
    pub fn parse(template: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices();

        while let Some((start, c)) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }

            let rest = &template[start + 1..];
            let Some(end) = rest.find('}') else {
                return Err(Error::template_invalid(
                    template,
                    "unterminated '{' placeholder",
                ));
            };

            let token = match &rest[..end] {
                "name" => Token::Name,
                "version" => Token::Version,
                "mutable_tags[]" => Token::MutableTags,
                "immutable_tags[]" => Token::ImmutableTags,
                other => {
                    return Err(Error::template_invalid(
                        template,
                        format!("unknown placeholder '{{{}}}'", other),
                    ));
                }
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);

            // Skip past the placeholder body and its closing brace.
            for _ in 0..=end {
                chars.next();
            }
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            tokens,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Expand the template against one image's metadata.
    ///
    /// Returns the concrete identifier strings in expansion order, with
    /// duplicates removed (two distinct expansion paths may coincide).
    pub fn expand(&self, meta: &ImageMetadata) -> Vec<String> {
        let mut out = Vec::new();
        expand_tokens(&self.tokens, meta, &mut out);

        let mut seen = HashSet::new();
        out.retain(|tag| seen.insert(tag.clone()));
        out
    }
}

fn expand_tokens(tokens: &[Token], meta: &ImageMetadata, out: &mut Vec<String>) {
    // List placeholders are consumed in fixed priority order: mutable first.
    let position = tokens
        .iter()
        .position(|t| *t == Token::MutableTags)
        .or_else(|| tokens.iter().position(|t| *t == Token::ImmutableTags));

    let Some(index) = position else {
        out.push(render_scalars(tokens, meta));
        return;
    };

    let values = match tokens[index] {
        Token::MutableTags => &meta.mutable_tags,
        _ => &meta.immutable_tags,
    };

    for value in values {
        let mut candidate = tokens.to_vec();
        candidate[index] = Token::Literal(value.clone());
        expand_tokens(&candidate, meta, out);
    }
}

fn render_scalars(tokens: &[Token], meta: &ImageMetadata) -> String {
    let mut result = String::new();
    for token in tokens {
        match token {
            Token::Literal(text) => result.push_str(text),
            Token::Name => result.push_str(&meta.name),
            Token::Version => result.push_str(&meta.version),
            // Unreachable: callers only render once no list tokens remain.
            Token::MutableTags | Token::ImmutableTags => {}
        }
    }
    result
}

/// Parse a configured template list up front so a bad template fails the run
/// before any unit is processed.
pub fn parse_all(templates: &[String]) -> Result<Vec<TagTemplate>> {
    templates.iter().map(|t| TagTemplate::parse(t)).collect()
}

/// Expand every template in a list and union the results, preserving first
/// occurrence order.
pub fn expand_all(templates: &[TagTemplate], meta: &ImageMetadata) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for template in templates {
        for tag in template.expand(meta) {
            if seen.insert(tag.clone()) {
                out.push(tag);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mutable: &[&str], immutable: &[&str]) -> ImageMetadata {
        ImageMetadata {
            folder: "foo".to_string(),
            name: "foo".to_string(),
            version: "1.2.3".to_string(),
            mutable_tags: mutable.iter().map(|s| s.to_string()).collect(),
            immutable_tags: immutable.iter().map(|s| s.to_string()).collect(),
            description: None,
            maintainer: None,
            usage: None,
            url: None,
        }
    }

    #[test]
    fn scalar_only_template_is_literal_substitution() {
        let template = TagTemplate::parse("ghcr.io/x/{name}:{version}").unwrap();
        assert_eq!(
            template.expand(&meta(&[], &[])),
            vec!["ghcr.io/x/foo:1.2.3".to_string()]
        );
    }

    #[test]
    fn placeholder_free_template_expands_to_itself() {
        let template = TagTemplate::parse("ghcr.io/x/foo:stable").unwrap();
        assert_eq!(
            template.expand(&meta(&["a"], &["b"])),
            vec!["ghcr.io/x/foo:stable".to_string()]
        );
    }

    #[test]
    fn single_list_placeholder_expands_to_list_length() {
        let template = TagTemplate::parse("{name}:{mutable_tags[]}").unwrap();
        let expanded = template.expand(&meta(&["latest", "stable", "edge"], &[]));
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0], "foo:latest");
        assert_eq!(expanded[1], "foo:stable");
        assert_eq!(expanded[2], "foo:edge");
    }

    #[test]
    fn immutable_list_end_to_end() {
        let template = TagTemplate::parse("ghcr.io/x/{name}:{immutable_tags[]}").unwrap();
        let expanded = template.expand(&meta(&[], &["v1", "v1.2"]));
        assert_eq!(
            expanded,
            vec!["ghcr.io/x/foo:v1".to_string(), "ghcr.io/x/foo:v1.2".to_string()]
        );
    }

    #[test]
    fn both_lists_expand_as_cross_product() {
        let template = TagTemplate::parse("{name}:{mutable_tags[]}-{immutable_tags[]}").unwrap();
        let expanded = template.expand(&meta(&["a", "b"], &["1", "2"]));
        assert_eq!(expanded, vec!["foo:a-1", "foo:a-2", "foo:b-1", "foo:b-2"]);
    }

    #[test]
    fn repeated_list_placeholder_expands_one_occurrence_per_step() {
        // Each recursion step consumes a single token, so expansion
        // terminates even when the same list appears twice.
        let template = TagTemplate::parse("{name}:{mutable_tags[]}-{mutable_tags[]}").unwrap();
        let expanded = template.expand(&meta(&["a", "b"], &[]));
        assert_eq!(expanded, vec!["foo:a-a", "foo:a-b", "foo:b-a", "foo:b-b"]);
    }

    #[test]
    fn empty_list_expands_to_nothing() {
        let template = TagTemplate::parse("{name}:{mutable_tags[]}").unwrap();
        assert!(template.expand(&meta(&[], &["x"])).is_empty());
    }

    #[test]
    fn coincident_expansion_paths_deduplicate() {
        let template = TagTemplate::parse("{name}:{mutable_tags[]}").unwrap();
        let expanded = template.expand(&meta(&["same", "same"], &[]));
        assert_eq!(expanded, vec!["foo:same".to_string()]);
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = TagTemplate::parse("{name}:{branch}").unwrap_err();
        assert!(err.message.contains("{branch}"));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        assert!(TagTemplate::parse("{name}:{version").is_err());
    }

    #[test]
    fn expand_all_unions_and_dedupes() {
        let templates = parse_all(&[
            "{name}:{version}".to_string(),
            "{name}:{immutable_tags[]}".to_string(),
            "{name}:{version}".to_string(),
        ])
        .unwrap();
        let expanded = expand_all(&templates, &meta(&[], &["v1"]));
        assert_eq!(expanded, vec!["foo:1.2.3".to_string(), "foo:v1".to_string()]);
    }
}
