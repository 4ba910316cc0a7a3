//! # Source Service Clients
//!
//! Resilient access to the source services that originally produced the
//! failed operations. The connection manager owns the long-lived
//! streaming channel (reconnect, fallback, status); `SourceServiceClient`
//! implementations layer payload retrieval and retry submission on top,
//! selected per interface type by the registry.

pub mod connection_manager;
pub mod registry;
pub mod streaming_client;
pub mod tcp_transport;
pub mod traits;
pub mod transport;

pub use connection_manager::{ConnectionError, ConnectionManager, ConnectionStatus};
pub use registry::SourceClientRegistry;
pub use streaming_client::StreamingOrderServiceClient;
pub use tcp_transport::TcpStreamingTransport;
pub use traits::{ClientError, PayloadResponse, SourceServiceClient, SubmitResult};
pub use transport::{RequesterHandle, StreamingTransport, TransportError};
