//! # Concurrency Admission Control
//!
//! Bounds how many mutation operations may run at once, system-wide and
//! per caller, with short bounded waits. The semaphores guard admission
//! to otherwise-async work, not the work itself.

pub mod limiter;

pub use limiter::{
    ActiveOperation, AdmissionController, AdmissionError, CallerConcurrencyStats,
    ConcurrencyStats, OperationPermit,
};
