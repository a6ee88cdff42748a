// src/pattern.rs

use crate::error::{Error, Result};
use regex::Regex;

/// A run-tag selector.
///
/// - `A*` matches `A-1`, `A-2`, ... exactly
/// - `A~` matches every tag starting with `A`
/// - `A**-x` matches `A-1-x`, `A-2-x`, ...
///
/// A pattern also matches a tag equal to itself.
#[derive(Debug, Clone)]
pub struct TagPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Numbered(Regex),
    Prefix(String),
    Infix(Regex),
}

impl TagPattern {
    /// Fails immediately unless exactly one of the three forms applies.
    pub fn parse(raw: &str) -> Result<Self> {
        let numbered = raw.ends_with('*');
        let prefix = raw.ends_with('~');
        let infix = raw.contains("**");

        let kind = match (numbered, prefix, infix) {
            (true, false, false) => {
                let stem = regex::escape(&raw[..raw.len() - 1]);
                PatternKind::Numbered(compile(raw, &format!(r"^{}-\d+$", stem))?)
            }
            (false, true, false) => PatternKind::Prefix(raw[..raw.len() - 1].to_string()),
            (false, false, true) => {
                let pieces: Vec<String> = raw.split("**").map(regex::escape).collect();
                PatternKind::Infix(compile(raw, &format!("^{}", pieces.join(r"-\d+")))?)
            }
            _ => return Err(Error::InvalidPattern(raw.to_string())),
        };

        Ok(TagPattern {
            raw: raw.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, tag: &str) -> bool {
        if tag == self.raw {
            return true;
        }
        match &self.kind {
            PatternKind::Numbered(re) | PatternKind::Infix(re) => re.is_match(tag),
            PatternKind::Prefix(prefix) => tag.starts_with(prefix.as_str()),
        }
    }

    /// Name under which runs selected by this pattern are combined.
    pub fn stem(&self) -> String {
        match self.kind {
            PatternKind::Infix(_) => self.raw.replace("**", ""),
            _ => self.raw[..self.raw.len() - 1].to_string(),
        }
    }
}

fn compile(raw: &str, expression: &str) -> Result<Regex> {
    Regex::new(expression).map_err(|_| Error::InvalidPattern(raw.to_string()))
}

pub fn is_match_any(patterns: &[TagPattern], tag: &str) -> bool {
    patterns.iter().any(|p| p.is_match(tag))
}
