use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorError {
    StoreError(String),
    StateTransitionError(String),
    RetryError(String),
    MessagingError(String),
    ConnectionError(String),
    ValidationError(String),
    ConfigurationError(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorError::StoreError(msg) => write!(f, "Store error: {msg}"),
            CollectorError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            CollectorError::RetryError(msg) => write!(f, "Retry error: {msg}"),
            CollectorError::MessagingError(msg) => write!(f, "Messaging error: {msg}"),
            CollectorError::ConnectionError(msg) => write!(f, "Connection error: {msg}"),
            CollectorError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            CollectorError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for CollectorError {}

pub type Result<T> = std::result::Result<T, CollectorError>;
