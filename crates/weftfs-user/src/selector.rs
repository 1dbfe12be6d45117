//! Equality-based label selectors over user metadata.
//!
//! Supports the conjunction of `key=value`, `key==value`, and
//! `key!=value` terms, comma-separated. An empty selector matches every
//! user.

use std::collections::HashMap;

use crate::error::{Result, UserError};

#[derive(Clone, Debug)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
}

/// A parsed label selector.
#[derive(Clone, Debug, Default)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parses a selector string. `InvalidArgument` on malformed terms.
    pub fn parse(selector: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for term in selector.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            if let Some((key, value)) = term.split_once("!=") {
                requirements.push(Requirement::NotEquals(
                    valid_key(key)?.to_string(),
                    value.trim().to_string(),
                ));
            } else if let Some((key, value)) = term.split_once("==") {
                requirements.push(Requirement::Equals(
                    valid_key(key)?.to_string(),
                    value.trim().to_string(),
                ));
            } else if let Some((key, value)) = term.split_once('=') {
                requirements.push(Requirement::Equals(
                    valid_key(key)?.to_string(),
                    value.trim().to_string(),
                ));
            } else {
                return Err(UserError::InvalidArgument(format!(
                    "unparseable selector term '{}'",
                    term
                )));
            }
        }
        Ok(Self { requirements })
    }

    /// True when the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// True when every requirement holds against the given labels.
    /// A `key!=value` term also holds when the key is absent.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.requirements.iter().all(|req| match req {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
        })
    }
}

fn valid_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(UserError::InvalidArgument(
            "selector key must not be empty".to_string(),
        ));
    }
    Ok(key)
}
