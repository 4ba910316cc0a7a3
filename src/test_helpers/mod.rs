//! Shared test infrastructure: mock transports, mock source clients and
//! model factories used by unit and integration tests.

pub mod factories;
pub mod mock_source_client;
pub mod mock_transport;
