//! Keyword filter for post text.
//!
//! The expression is written in a small csv-like grammar: commas separate
//! alternatives (OR), spaces separate terms that must all appear (AND).
//! `"Google Docs, Google Drive"` reads as `(google AND docs) OR (google AND drive)`.

use std::fmt;
use std::str::FromStr;

/// Terms that must all be present in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    terms: Vec<String>,
}

impl KeywordGroup {
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    fn matches_lowercase(&self, text: &str) -> bool {
        self.terms.iter().all(|term| text.contains(term.as_str()))
    }
}

/// Any-of groups. An expression without groups matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordExpression {
    groups: Vec<KeywordGroup>,
}

impl KeywordExpression {
    /// The expression that accepts every text.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn parse(csv_text: &str) -> Self {
        let groups = csv_text
            .split(',')
            .map(|group| {
                group
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .filter(|terms| !terms.is_empty())
            .map(|terms| KeywordGroup { terms })
            .collect();

        Self { groups }
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let text = text.to_lowercase();
        self.groups.iter().any(|group| group.matches_lowercase(&text))
    }

    pub fn is_match_all(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }
}

impl FromStr for KeywordExpression {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for KeywordExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return write!(f, "<all posts>");
        }
        let rendered: Vec<String> = self.groups.iter().map(|g| g.terms.join(" ")).collect();
        write!(f, "{}", rendered.join(", "))
    }
}
