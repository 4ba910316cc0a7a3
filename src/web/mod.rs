//! # Web API
//!
//! REST surface for the exception/retry lifecycle. Mutation endpoints run
//! under an admission permit; eligibility failures map to 404/409 with
//! machine-readable codes and capacity exhaustion to 429.

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
