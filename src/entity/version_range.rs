// src/entity/version_range.rs

//! Version ranges as written in catalog content
//!
//! Ranges are comparator sets separated by whitespace (all must match),
//! optionally joined with `||` (any set may match):
//!
//! ```text
//! >=1.0.0 <2.0.0
//! <1.2.3 || >=2.0.0
//! !=1.4.0
//! 1.2.3            exact match
//! 1.2.x            any patch of 1.2
//! ```

use crate::error::{Error, Result};
use semver::Version;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Compare(semver::Comparator),
    NotEqual(Version),
}

impl Term {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Term::Compare(comparator) => comparator.matches(version),
            Term::NotEqual(excluded) => version != excluded,
        }
    }
}

/// A parsed version range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<Vec<Term>>,
}

impl VersionRange {
    /// Parse a range expression
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "empty range"));
        }

        let mut alternatives = Vec::new();
        for alternative in trimmed.split("||") {
            let tokens = merge_operator_tokens(alternative.split_whitespace());
            if tokens.is_empty() {
                return Err(invalid(raw, "empty comparator set"));
            }
            let terms = tokens
                .iter()
                .map(|token| parse_term(token).map_err(|reason| invalid(raw, &reason)))
                .collect::<Result<Vec<_>>>()?;
            alternatives.push(terms);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    /// Whether the version falls inside the range
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|terms| terms.iter().all(|term| term.matches(version)))
    }

    /// The range as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn invalid(range: &str, reason: &str) -> Error {
    Error::InvalidVersionRange {
        range: range.to_string(),
        reason: reason.to_string(),
    }
}

/// Join a bare operator token with the version that follows it (`>= 1.0.0`)
fn merge_operator_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;
    for token in tokens {
        if let Some(op) = pending.take() {
            merged.push(format!("{op}{token}"));
        } else if token.chars().all(|c| "<>=!".contains(c)) {
            pending = Some(token);
        } else {
            merged.push(token.to_string());
        }
    }
    if let Some(op) = pending {
        merged.push(op.to_string());
    }
    merged
}

fn parse_term(token: &str) -> std::result::Result<Term, String> {
    if let Some(rest) = token.strip_prefix("!=") {
        let version = Version::parse(rest).map_err(|e| format!("{token}: {e}"))?;
        return Ok(Term::NotEqual(version));
    }

    let normalized = if let Some(rest) = token.strip_prefix("==") {
        format!("={rest}")
    } else if token.starts_with(|c: char| c.is_ascii_digit()) && !has_wildcard(token) {
        // A bare version is an exact match, not a caret requirement
        format!("={token}")
    } else {
        token.to_string()
    };

    semver::Comparator::from_str(&normalized)
        .map(Term::Compare)
        .map_err(|e| format!("{token}: {e}"))
}

fn has_wildcard(token: &str) -> bool {
    token
        .split('.')
        .any(|part| part == "x" || part == "X" || part == "*")
}
