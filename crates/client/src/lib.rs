//! RouteGuide Client
//!
//! Native Rust client for the RouteGuide service.
//!
//! # Calls
//!
//! - [`RouteGuideClient::get_feature`]: one point in, one feature out
//! - [`RouteGuideClient::list_features`]: a stream of features in a rectangle
//! - [`RouteGuideClient::record_route`]: stream points, get a summary
//! - [`RouteGuideClient::route_chat`]: exchange notes in both directions
//!
//! # Example
//!
//! ```ignore
//! use routeguide_client::RouteGuideClient;
//!
//! let client = RouteGuideClient::connect(addr).await?;
//! let feature = client.get_feature(Point::new(409146138, -746188906)).await?;
//! ```

pub mod call;
pub mod transport;

pub use call::{RecordRouteCall, RequestSink, ResponseStream};
pub use transport::rpc::{ClientConfig, ClientError, Result, RouteGuideClient};

pub use routeguide_rpc::{Code, Status};
pub use routeguide_types::{Feature, Point, Rectangle, RouteNote, RouteSummary};
