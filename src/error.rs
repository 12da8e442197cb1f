// ⚠️ Error Taxonomy - user faults vs infrastructure faults
// Validation errors stop at the writer, store errors are retried at the store boundary

use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// VALIDATION ERRORS (user input, never retried)
// ============================================================================

/// Form field a validation error is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Email,
    Category,
    Amount,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Category => "category",
            Field::Amount => "amount",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        ValidationError {
            field,
            message: message.into(),
        }
    }
}

// ============================================================================
// STORE ERRORS (infrastructure)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Missing or rejected credentials. Fatal until an operator fixes config.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Spreadsheet or worksheet does not exist
    #[error("row store misconfigured: {0}")]
    Misconfigured(String),

    #[error("connection failed: {message}")]
    Connection { message: String, transient: bool },

    #[error("read failed: {message}")]
    Read { message: String, transient: bool },

    #[error("write failed: {message}")]
    Write { message: String, transient: bool },
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection {
            message: message.into(),
            transient: true,
        }
    }

    pub fn read(message: impl Into<String>, transient: bool) -> Self {
        StoreError::Read {
            message: message.into(),
            transient,
        }
    }

    pub fn write(message: impl Into<String>, transient: bool) -> Self {
        StoreError::Write {
            message: message.into(),
            transient,
        }
    }

    /// Rate limits, timeouts and dropped connections are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Auth(_) | StoreError::Misconfigured(_) => false,
            StoreError::Connection { transient, .. }
            | StoreError::Read { transient, .. }
            | StoreError::Write { transient, .. } => *transient,
        }
    }

    /// Auth and config problems need an operator, not a retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Auth(_) | StoreError::Misconfigured(_))
    }

    /// Text safe to show an end user. Never includes internal detail.
    pub fn user_message(&self) -> &'static str {
        if self.is_fatal() {
            "Registration is temporarily unavailable. Please contact the organizers."
        } else {
            "Something went wrong talking to the registration sheet. Please try again."
        }
    }
}

// ============================================================================
// REGISTER ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid registration: {}", join_fields(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegisterError {
    /// Fields rejected by validation (empty for store failures)
    pub fn fields(&self) -> Vec<Field> {
        match self {
            RegisterError::Validation(errors) => errors.iter().map(|e| e.field).collect(),
            RegisterError::Store(_) => Vec::new(),
        }
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.fields().contains(&field)
    }
}

fn join_fields(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::connection("reset").is_transient());
        assert!(StoreError::read("429", true).is_transient());
        assert!(!StoreError::write("400", false).is_transient());
        assert!(!StoreError::Auth("no token".to_string()).is_transient());
        assert!(StoreError::Misconfigured("no sheet".to_string()).is_fatal());
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = StoreError::read("quota exceeded for project 1234", true);
        assert!(!err.user_message().contains("1234"));
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn test_register_error_fields() {
        let err = RegisterError::Validation(vec![
            ValidationError::new(Field::Email, "bad"),
            ValidationError::new(Field::Amount, "too small"),
        ]);

        assert!(err.has_field(Field::Amount));
        assert!(!err.has_field(Field::Name));
        assert_eq!(err.to_string(), "invalid registration: email, amount");
    }
}
