//! Huginn error types

/// Huginn error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum HuginnError {
    // Client-side validation
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    // Backend lookups
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // Transport/backend errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Serverless collaborators
    /// The save-event webhook reported that a required database extension is missing.
    #[error("required database extension missing: {0}")]
    MissingExtension(String),

    #[error("webhook error ({status}): {message}")]
    Webhook { status: u16, message: String },

    // Cache errors
    /// A cached value was read back as a different type than it was stored with.
    #[error("cached value under {key} has an unexpected type")]
    TypeMismatch { key: String },

    #[error("query cache has been disposed")]
    Disposed,

    /// The fetch a caller was waiting on was superseded before producing a result.
    #[error("fetch cancelled")]
    Cancelled,
}

impl HuginnError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        HuginnError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing row.
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        HuginnError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Errors that retrying cannot fix.
    ///
    /// Authentication failures, missing rows and client-side validation are
    /// terminal; so are misconfiguration and misuse of the cache itself.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HuginnError::Validation { .. }
                | HuginnError::NotFound { .. }
                | HuginnError::Unauthorized(_)
                | HuginnError::Configuration(_)
                | HuginnError::TypeMismatch { .. }
                | HuginnError::Disposed
                | HuginnError::Api { status: 404, .. }
        )
    }

    /// Errors worth retrying: everything that is not terminal.
    pub fn is_transient(&self) -> bool {
        !self.is_terminal()
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            HuginnError::Api { status, .. } | HuginnError::Webhook { status, .. } => Some(*status),
            HuginnError::NotFound { .. } => Some(404),
            HuginnError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HuginnError {
    fn from(err: serde_json::Error) -> Self {
        HuginnError::Json(err.to_string())
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_not_transient() {
        assert!(HuginnError::not_found("events", "e1").is_terminal());
        assert!(HuginnError::Unauthorized("expired".into()).is_terminal());
        assert!(HuginnError::validation("title", "required").is_terminal());
        assert!(!HuginnError::not_found("events", "e1").is_transient());
        let missing_route = HuginnError::Api {
            status: 404,
            code: None,
            message: "no such route".into(),
        };
        assert!(missing_route.is_terminal());
    }

    #[test]
    fn backend_failures_are_transient() {
        let err = HuginnError::Api {
            status: 500,
            code: None,
            message: "boom".into(),
        };
        assert!(err.is_transient());
        assert!(HuginnError::Http("connection reset".into()).is_transient());
        assert!(HuginnError::Cancelled.is_transient());
    }

    #[test]
    fn display_includes_context() {
        let err = HuginnError::not_found("events", "e1");
        assert_eq!(err.to_string(), "events not found: e1");

        let err = HuginnError::validation("price", "must not be negative");
        assert_eq!(err.to_string(), "invalid price: must not be negative");
    }

    #[test]
    fn status_codes() {
        assert_eq!(HuginnError::not_found("x", "y").status(), Some(404));
        assert_eq!(HuginnError::Http("x".into()).status(), None);
    }
}
