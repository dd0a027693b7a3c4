//! Response-shape validation collaborator.

use regex::Regex;
use serde::Serialize;

use crate::config::ResponseConfig;
use crate::error::LoopError;

/// Result of checking a reply against response-shape rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub failed_checks: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            failed_checks: Vec::new(),
        }
    }

    pub fn from_failures(failed_checks: Vec<String>) -> Self {
        Self {
            is_valid: failed_checks.is_empty(),
            failed_checks,
        }
    }

    /// Convert a failing report into the matching error.
    pub fn into_result(self) -> Result<(), LoopError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(LoopError::Validation(self.failed_checks))
        }
    }
}

/// Checks a completed assistant reply. Failures are advisory only.
pub trait ResponseValidator: Send + Sync {
    fn validate_response(&self, text: &str) -> ValidationReport;
}

/// Simple rule set: length ceiling, banned phrases, banned patterns.
#[derive(Debug, Clone, Default)]
pub struct ResponseRules {
    pub max_chars: Option<usize>,
    pub forbidden_phrases: Vec<String>,
    pub forbidden_patterns: Vec<Regex>,
}

impl ResponseRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_chars(mut self, limit: usize) -> Self {
        self.max_chars = Some(limit);
        self
    }

    pub fn forbid_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.forbidden_phrases.push(phrase.into());
        self
    }

    /// Build rules from config. `None` when no rule is configured.
    pub fn from_config(config: &ResponseConfig) -> Result<Option<Self>, LoopError> {
        if config.is_empty() {
            return Ok(None);
        }
        let mut rules = Self {
            max_chars: config.max_chars,
            forbidden_phrases: config.forbidden_phrases.clone(),
            forbidden_patterns: Vec::with_capacity(config.forbidden_patterns.len()),
        };
        for pattern in &config.forbidden_patterns {
            rules = rules.forbid_pattern(pattern)?;
        }
        Ok(Some(rules))
    }

    pub fn forbid_pattern(mut self, pattern: &str) -> Result<Self, LoopError> {
        let regex = Regex::new(pattern)
            .map_err(|e| LoopError::Configuration(format!("invalid pattern {pattern:?}: {e}")))?;
        self.forbidden_patterns.push(regex);
        Ok(self)
    }
}

impl ResponseValidator for ResponseRules {
    fn validate_response(&self, text: &str) -> ValidationReport {
        let mut failed = Vec::new();

        if let Some(limit) = self.max_chars {
            let count = text.chars().count();
            if count > limit {
                failed.push(format!("max_chars ({count} > {limit})"));
            }
        }

        let lowered = text.to_lowercase();
        for phrase in &self.forbidden_phrases {
            if lowered.contains(&phrase.to_lowercase()) {
                failed.push(format!("forbidden_phrase ({phrase})"));
            }
        }

        for pattern in &self.forbidden_patterns {
            if pattern.is_match(text) {
                failed.push(format!("forbidden_pattern ({})", pattern.as_str()));
            }
        }

        ValidationReport::from_failures(failed)
    }
}
