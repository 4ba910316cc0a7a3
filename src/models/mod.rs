//! Domain models for captured interface exceptions and their retry history.

pub mod interface_exception;
pub mod retry_attempt;

pub use interface_exception::{
    ExceptionCategory, ExceptionSeverity, ExceptionSummary, InterfaceException, InterfaceType,
    NewInterfaceException, ResolutionMethod,
};
pub use retry_attempt::{RetryAttempt, RetryOutcome, RetryStatistics, RetryStatus};
