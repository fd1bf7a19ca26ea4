//! Error types for rebind operations.
//!
//! Every failure carries a structured [`ErrorCode`] so callers can branch on the
//! kind of problem without matching message text.

use thiserror::Error;

/// Result type alias for rebind operations.
pub type RebindResult<T> = Result<T, RebindError>;

/// Main error type for all rebind operations.
#[derive(Error, Debug)]
pub enum RebindError {
    /// A relation target could not be resolved (strict mode only).
    #[error("Unresolved relation: {message}")]
    UnresolvedRelation {
        message: String,
        code: ErrorCode,
        model: String,
        field: String,
    },

    /// Model kind is not part of the exportable registry.
    #[error("Unknown model: {model}")]
    UnknownModel { model: String, code: ErrorCode },

    /// A primary key value cannot be canonicalized.
    #[error("Invalid key: {message}")]
    InvalidKey { message: String, code: ErrorCode },

    /// Record does not exist in the source store.
    #[error("Record not found: {message}")]
    RecordNotFound {
        message: String,
        code: ErrorCode,
        model: String,
    },

    /// A model serializer failed for one record.
    #[error("Serializer error: {message}")]
    Serializer {
        message: String,
        code: ErrorCode,
        model: String,
    },

    /// The data access layer failed.
    #[error("Data source error: {message}")]
    DataSource {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Relations (REL_xxx)
    RelMissingTarget,
    RelUnknownTargetModel,
    RelInvalidValue,

    // Models (MOD_xxx)
    ModUnknown,

    // Keys (KEY_xxx)
    KeyInvalid,

    // Records (REC_xxx)
    RecNotFound,
    RecSerializeFailed,

    // Data source (SRC_xxx)
    SrcReadFailed,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RelMissingTarget => "REL_001",
            ErrorCode::RelUnknownTargetModel => "REL_002",
            ErrorCode::RelInvalidValue => "REL_003",
            ErrorCode::ModUnknown => "MOD_001",
            ErrorCode::KeyInvalid => "KEY_001",
            ErrorCode::RecNotFound => "REC_001",
            ErrorCode::RecSerializeFailed => "REC_002",
            ErrorCode::SrcReadFailed => "SRC_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl RebindError {
    /// Create an unresolved relation error for a missing target record.
    pub fn missing_target(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnresolvedRelation {
            message: message.into(),
            code: ErrorCode::RelMissingTarget,
            model: model.into(),
            field: field.into(),
        }
    }

    /// Create an unresolved relation error for a target kind outside the registry.
    pub fn unknown_target(
        model: impl Into<String>,
        field: impl Into<String>,
        target: &str,
    ) -> Self {
        let field = field.into();
        Self::UnresolvedRelation {
            message: format!("field '{}' targets non-exportable model '{}'", field, target),
            code: ErrorCode::RelUnknownTargetModel,
            model: model.into(),
            field,
        }
    }

    /// Create an unresolved relation error for a malformed relation value.
    pub fn invalid_relation(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnresolvedRelation {
            message: message.into(),
            code: ErrorCode::RelInvalidValue,
            model: model.into(),
            field: field.into(),
        }
    }

    /// Create an unknown model error.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
            code: ErrorCode::ModUnknown,
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
            code: ErrorCode::KeyInvalid,
        }
    }

    /// Create a record not found error.
    pub fn not_found(model: impl Into<String>, key: impl std::fmt::Display) -> Self {
        let model = model.into();
        Self::RecordNotFound {
            message: format!("{}({})", model, key),
            code: ErrorCode::RecNotFound,
            model,
        }
    }

    /// Create a serializer error.
    pub fn serializer(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serializer {
            message: message.into(),
            code: ErrorCode::RecSerializeFailed,
            model: model.into(),
        }
    }

    /// Create a data source error.
    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource {
            message: message.into(),
            code: ErrorCode::SrcReadFailed,
            source: None,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a database error wrapping its cause.
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnresolvedRelation { code, .. } => *code,
            Self::UnknownModel { code, .. } => *code,
            Self::InvalidKey { code, .. } => *code,
            Self::RecordNotFound { code, .. } => *code,
            Self::Serializer { code, .. } => *code,
            Self::DataSource { code, .. } => *code,
            Self::Database { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error came from an unresolvable relation target.
    pub fn is_unresolved_relation(&self) -> bool {
        matches!(self, Self::UnresolvedRelation { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::UnresolvedRelation { .. } => {
                Some("Export without strict mode to omit unresolved relation fields")
            }
            Self::UnknownModel { .. } => {
                Some("Check that the model exists and is neither transient nor abstract")
            }
            Self::InvalidKey { .. } => {
                Some("Keys must be integers, strings, booleans, or flat lists/objects of them")
            }
            Self::Database { .. } => Some("Please check your database path and permissions"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_target_error() {
        let err = RebindError::missing_target("res.partner", "parent_id", "res.partner(99)");
        assert_eq!(err.code(), ErrorCode::RelMissingTarget);
        assert!(err.is_unresolved_relation());
        assert!(err.to_string().contains("res.partner(99)"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_unknown_target_error() {
        let err = RebindError::unknown_target("res.partner", "wizard_id", "base.wizard");
        assert_eq!(err.code(), ErrorCode::RelUnknownTargetModel);
        assert!(err.to_string().contains("base.wizard"));
    }

    #[test]
    fn test_not_found_error() {
        let err = RebindError::not_found("res.users", 7);
        assert_eq!(err.code(), ErrorCode::RecNotFound);
        assert_eq!(err.to_string(), "Record not found: res.users(7)");
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::RelMissingTarget.as_str(), "REL_001");
        assert_eq!(ErrorCode::KeyInvalid.as_str(), "KEY_001");
        assert_eq!(RebindError::Internal("x".into()).code(), ErrorCode::Internal);
    }
}
