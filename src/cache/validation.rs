use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation operations whose eligibility checks are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Retry,
    Acknowledge,
    Resolve,
    Cancel,
}

impl OperationType {
    pub const ALL: [OperationType; 4] = [
        OperationType::Retry,
        OperationType::Acknowledge,
        OperationType::Resolve,
        OperationType::Cancel,
    ];
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Acknowledge => write!(f, "acknowledge"),
            Self::Resolve => write!(f, "resolve"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Machine-readable validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(transaction_id: &str) -> Self {
        Self::new(
            "EXCEPTION_NOT_FOUND",
            format!("Exception not found for transaction: {transaction_id}"),
        )
    }
}

/// Outcome of an eligibility check; a pure function of exception/attempt
/// state at computation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub check: String,
    pub transaction_id: String,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn success(check: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            check: check.into(),
            transaction_id: transaction_id.into(),
            errors: Vec::new(),
        }
    }

    pub fn failure(
        check: impl Into<String>,
        transaction_id: impl Into<String>,
        errors: Vec<ValidationError>,
    ) -> Self {
        Self {
            valid: false,
            check: check.into(),
            transaction_id: transaction_id.into(),
            errors,
        }
    }

    /// First error code, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.errors.first().map(|e| e.code.as_str())
    }
}
