//! RouteGuide Server
//!
//! Serves feature lookups, region listings, route statistics and
//! location-tagged chat over one multiplexed TCP connection per client.
//!
//! # Methods
//!
//! - **GetFeature**: unary
//! - **ListFeatures**: server-streaming
//! - **RecordRoute**: client-streaming
//! - **RouteChat**: bidirectional streaming
//!
//! # Example
//!
//! ```ignore
//! use routeguide_server::run_server;
//!
//! run_server(listener, store, shutdown).await?;
//! ```

pub mod config;
pub mod handler;
pub mod protocol;
pub mod transport;

pub use config::{ConfigError, ServerConfig, TransportConfig};
pub use handler::Handler;
pub use protocol::{CallContext, ResponseSink, RouteGuide, Streaming};

// Wire types for raw-frame clients and tests
pub use routeguide_rpc as rpc;
pub use routeguide_rpc::{RpcClientCodec, Status};

// Re-export default transport for convenience
pub use transport::rpc::{run_server, serve};
