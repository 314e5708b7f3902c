// src/core/router/glob.rs

//! Single-wildcard pattern matching for routing rules.
//!
//! A pattern holds at most one `*`, which stands for any (possibly empty)
//! run of bytes. Everything outside the wildcard is compared byte for byte.
//! There is no backtracking: the pattern splits into a prefix and a suffix,
//! and the datum must start with one and end with the other.

use thiserror::Error;

pub const WILDCARD: u8 = b'*';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern '{0}' has more than one wildcard")]
    MultipleWildcards(String),
}

/// A validated routing pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glob<'a> {
    pattern: &'a [u8],
    wildcard: Option<usize>,
}

impl<'a> Glob<'a> {
    pub fn new(pattern: &'a str) -> Result<Self, PatternError> {
        let bytes = pattern.as_bytes();
        let mut stars = bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == WILDCARD)
            .map(|(i, _)| i);
        let wildcard = stars.next();
        if stars.next().is_some() {
            return Err(PatternError::MultipleWildcards(pattern.to_string()));
        }
        Ok(Self {
            pattern: bytes,
            wildcard,
        })
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard.is_some()
    }

    pub fn matches(&self, datum: &str) -> bool {
        let datum = datum.as_bytes();

        let Some(star) = self.wildcard else {
            return self.pattern == datum;
        };

        // The datum can't be shorter than the pattern without its wildcard.
        if datum.len() < self.pattern.len() - 1 {
            return false;
        }

        let prefix = &self.pattern[..star];
        let suffix = &self.pattern[star + 1..];

        if !datum.starts_with(prefix) {
            return false;
        }
        if suffix.is_empty() {
            return true;
        }

        // A tail that would reach back past the prefix is not a match.
        match datum.len().checked_sub(suffix.len()) {
            Some(tail) if tail >= prefix.len() => &datum[tail..] == suffix,
            _ => false,
        }
    }
}

/// Validates `pattern` and matches it against `datum` in one step.
pub fn glob_match(pattern: &str, datum: &str) -> Result<bool, PatternError> {
    Ok(Glob::new(pattern)?.matches(datum))
}
