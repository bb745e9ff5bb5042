//! Error types and result aliases for metahub.
//!
//! Errors are structured for programmatic handling: callers match on the
//! variant, log messages carry the context. Extraction and curation runs
//! surface failures through these types rather than returning partial or
//! empty results.

use thiserror::Error;

/// The result type used throughout metahub.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in metahub operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A hub, version, object type, or other resource does not exist.
    #[error("not found: {resource_type} {id}")]
    NotFound {
        /// The type of resource that was looked up.
        resource_type: &'static str,
        /// The identifier or name that was looked up.
        id: String,
    },

    /// The engine is misconfigured (missing scripting engine, malformed
    /// separator, and so on). Raised before any document is processed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// User-supplied input failed validation (for example a search
    /// predicate that does not parse). Raised before any store access.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of what failed to validate.
        message: String,
    },

    /// A store query or script execution failed or timed out.
    #[error("execution failed: {message}")]
    Execution {
        /// Description of the execution failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A state change raced with another writer (for example two
    /// activations of different versions of the same hub).
    #[error("concurrent modification: {message}")]
    ConcurrentModification {
        /// Description of the detected race.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new execution error without an underlying cause.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new execution error with a source cause.
    #[must_use]
    pub fn execution_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new concurrent-modification error.
    #[must_use]
    pub fn concurrent(message: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is a not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_resource_and_id() {
        let err = Error::not_found("hub", "ihec");
        assert_eq!(err.to_string(), "not found: hub ihec");
        assert!(err.is_not_found());
    }

    #[test]
    fn execution_error_preserves_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        let err = Error::execution_with_source("store query timed out", inner);
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_found());
    }
}
