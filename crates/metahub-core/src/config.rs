//! Engine configuration.
//!
//! Settings are validated at construction so that a malformed separator or
//! an empty scripting-language name surfaces as a [`Configuration`] error
//! before any document is processed, not in the middle of a run.
//!
//! [`Configuration`]: crate::error::Error::Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Characters that collide with the search-predicate grammar and are
/// therefore forbidden inside the path separator.
const RESERVED_SEPARATOR_CHARS: &[char] = &['(', ')', '=', '!', '\'', '"'];

/// What the curation pipeline does when one document's rules fail.
///
/// Either choice leaves the previous curated set intact; the difference is
/// whether the remaining documents of the run are still processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationFailurePolicy {
    /// Abort the whole run on the first failing document.
    #[default]
    AbortRun,
    /// Log the failure, record the document in the run report, continue.
    SkipDocument,
}

/// Validated engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Separator between path levels in flattened attribute names.
    pub separator: String,
    /// Language identifier the scripting registry is resolved against.
    pub scripting_language: String,
    /// Failure policy for per-document curation errors.
    pub failure_policy: CurationFailurePolicy,
    /// Timeout applied to store query execution and script delegation.
    pub operation_timeout: Duration,
}

impl Settings {
    /// Creates settings with the given separator and scripting language,
    /// keeping default policy and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the separator is empty, contains
    /// whitespace, or contains characters reserved by the predicate
    /// grammar, or if the language name is empty.
    pub fn new(separator: impl Into<String>, scripting_language: impl Into<String>) -> Result<Self> {
        let settings = Self {
            separator: separator.into(),
            scripting_language: scripting_language.into(),
            failure_policy: CurationFailurePolicy::default(),
            operation_timeout: Duration::from_secs(30),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Sets the curation failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: CurationFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on any malformed field.
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(Error::configuration("separator must be non-empty"));
        }
        if self.separator.chars().any(char::is_whitespace) {
            return Err(Error::configuration(
                "separator must not contain whitespace",
            ));
        }
        if self
            .separator
            .chars()
            .any(|c| RESERVED_SEPARATOR_CHARS.contains(&c))
        {
            return Err(Error::configuration(format!(
                "separator {:?} contains characters reserved by the predicate grammar",
                self.separator
            )));
        }
        if self.scripting_language.trim().is_empty() {
            return Err(Error::configuration("scripting language must be non-empty"));
        }
        Ok(())
    }
}

impl Default for Settings {
    /// The default separator is `>`, matching the attribute paths the
    /// upstream catalogues are documented with.
    fn default() -> Self {
        Self {
            separator: ">".into(),
            scripting_language: "lua".into(),
            failure_policy: CurationFailurePolicy::default(),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn empty_separator_is_rejected() {
        let err = Settings::new("", "lua").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn reserved_separator_chars_are_rejected() {
        assert!(Settings::new("=", "lua").is_err());
        assert!(Settings::new("('", "lua").is_err());
        assert!(Settings::new(" ", "lua").is_err());
    }

    #[test]
    fn multi_char_separator_is_accepted() {
        let settings = Settings::new("->", "lua").unwrap();
        assert_eq!(settings.separator, "->");
    }

    #[test]
    fn empty_language_is_rejected() {
        assert!(Settings::new(">", "  ").is_err());
    }
}
