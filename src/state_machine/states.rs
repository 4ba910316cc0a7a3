use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states for a captured interface exception.
///
/// `Resolved` and `Closed` are terminal; `RetriedSuccess` is terminal for
/// retry purposes (the exception has been replayed successfully and only
/// audit reads remain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionStatus {
    /// Initial state when an exception is captured
    New,
    /// An operator has seen the exception and taken ownership
    Acknowledged,
    /// A retry attempt completed successfully
    RetriedSuccess,
    /// The most recent retry attempt failed
    RetriedFailed,
    /// Escalated for out-of-band handling
    Escalated,
    /// Resolved by an operator or automation
    Resolved,
    /// Administratively closed
    Closed,
}

impl ExceptionStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::RetriedSuccess)
    }

    /// Check if a retry may be admitted from this state
    pub fn allows_retry(&self) -> bool {
        matches!(self, Self::New | Self::RetriedFailed | Self::Escalated)
    }

    /// Check if acknowledge/resolve style management operations are allowed
    pub fn allows_management(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ExceptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::RetriedSuccess => write!(f, "RETRIED_SUCCESS"),
            Self::RetriedFailed => write!(f, "RETRIED_FAILED"),
            Self::Escalated => write!(f, "ESCALATED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl std::str::FromStr for ExceptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "RETRIED_SUCCESS" => Ok(Self::RetriedSuccess),
            "RETRIED_FAILED" => Ok(Self::RetriedFailed),
            "ESCALATED" => Ok(Self::Escalated),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(format!("Invalid exception status: {s}")),
        }
    }
}

impl Default for ExceptionStatus {
    fn default() -> Self {
        Self::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ExceptionStatus::Resolved.is_terminal());
        assert!(ExceptionStatus::Closed.is_terminal());
        assert!(ExceptionStatus::RetriedSuccess.is_terminal());
        assert!(!ExceptionStatus::New.is_terminal());
        assert!(!ExceptionStatus::Escalated.is_terminal());
    }

    #[test]
    fn test_retry_admission_states() {
        assert!(ExceptionStatus::New.allows_retry());
        assert!(ExceptionStatus::RetriedFailed.allows_retry());
        assert!(ExceptionStatus::Escalated.allows_retry());
        assert!(!ExceptionStatus::Acknowledged.allows_retry());
        assert!(!ExceptionStatus::Resolved.allows_retry());
        assert!(!ExceptionStatus::Closed.allows_retry());
        assert!(!ExceptionStatus::RetriedSuccess.allows_retry());
    }

    #[test]
    fn test_string_round_trip() {
        assert_eq!(ExceptionStatus::RetriedFailed.to_string(), "RETRIED_FAILED");
        assert_eq!(
            "RETRIED_FAILED".parse::<ExceptionStatus>().unwrap(),
            ExceptionStatus::RetriedFailed
        );

        let json = serde_json::to_string(&ExceptionStatus::Acknowledged).unwrap();
        assert_eq!(json, "\"ACKNOWLEDGED\"");
    }
}
