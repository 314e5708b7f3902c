// src/core/router/rules.rs

//! The administrator's routing file.
//!
//! Each rule line is
//! `operation type description callout-info program [args...]`
//! with whitespace between fields. Lines are consulted in file order and a
//! line is only tokenised as far as it keeps matching, so a line rejected
//! by its first pattern is never checked any further.

use super::glob::Glob;
use crate::core::UpcallError;
use std::fs;
use std::sync::Arc;
use tracing::debug;

/// Longest line accepted in the routing file.
pub const MAX_LINE_LEN: usize = 4096;

/// A rule whose four patterns all matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub path: String,
    pub line: usize,
    pub patterns: [String; 4],
    /// The command template: program path followed by argument templates.
    pub action: String,
}

impl RoutingRule {
    /// An error attributed to this rule's line.
    pub fn error(&self, message: impl Into<String>) -> UpcallError {
        UpcallError::config(&self.path, self.line, message)
    }
}

/// The contents of a routing file.
#[derive(Debug, Clone)]
pub struct RuleFile {
    path: String,
    contents: String,
}

/// Splits off the next whitespace-delimited field. A field must be followed
/// by more text; a field that ends the line is a syntax error.
fn next_field(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start();
    let end = rest.find(char::is_whitespace)?;
    let (field, tail) = rest.split_at(end);
    if field.is_empty() || tail.trim().is_empty() {
        return None;
    }
    Some((field, tail))
}

impl RuleFile {
    pub fn load(path: &str) -> Result<Self, UpcallError> {
        let contents =
            fs::read_to_string(path).map_err(|e| UpcallError::ConfigUnreadable {
                path: path.to_string(),
                source: Arc::new(e),
            })?;
        Ok(Self::from_string(path, contents))
    }

    pub fn from_string(path: &str, contents: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Finds the first rule whose patterns match `data`
    /// (operation, type, description, callout info).
    pub fn lookup(&self, data: [&str; 4]) -> Result<RoutingRule, UpcallError> {
        'lines: for (index, line) in self.contents.lines().enumerate() {
            let line_no = index + 1;
            let syntax_error = || UpcallError::config(&self.path, line_no, "Syntax error");

            if line.len() > MAX_LINE_LEN {
                return Err(UpcallError::config(&self.path, line_no, "Line too long"));
            }
            if line.is_empty() || line.starts_with('#') || line.starts_with(char::is_whitespace)
            {
                continue;
            }

            let mut rest = line;
            let mut patterns: [&str; 4] = [""; 4];
            for (slot, datum) in data.iter().enumerate() {
                let (field, tail) = next_field(rest).ok_or_else(syntax_error)?;
                let glob = Glob::new(field)
                    .map_err(|e| UpcallError::config(&self.path, line_no, e.to_string()))?;
                let matched = glob.matches(datum);
                debug!(
                    "match({},{}) = {}",
                    field,
                    datum,
                    if matched { "yes" } else { "no" }
                );
                if !matched {
                    continue 'lines;
                }
                patterns[slot] = field;
                rest = tail;
            }

            // `next_field` guarantees text follows the last pattern.
            let action = rest.trim();

            debug!("Line {} matches", line_no);
            return Ok(RoutingRule {
                path: self.path.clone(),
                line: line_no,
                patterns: patterns.map(str::to_string),
                action: action.to_string(),
            });
        }

        Err(UpcallError::NoMatchingRule {
            path: self.path.clone(),
        })
    }
}
