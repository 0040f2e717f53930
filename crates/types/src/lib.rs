//! # routeguide-types
//!
//! Data types and pure geometry shared by the RouteGuide server and client.
//!
//! - **Points**: [`geo::Point`], latitude/longitude as degrees scaled by `1e7`
//! - **Rectangles**: [`bbox::Rectangle`], two unordered corners
//! - **Features**: [`feature::Feature`], a named location
//! - **Routes**: [`route::RouteNote`] and [`route::RouteSummary`]
//!
//! All types are serializable with Serde.
//!
//! ## Examples
//!
//! ```rust
//! use routeguide_types::{Point, Rectangle};
//! use routeguide_types::geo::distance;
//!
//! let a = Point::new(407_838_351, -746_143_763);
//! let b = Point::new(408_122_808, -743_999_179);
//! let area = Rectangle::new(b, a);
//!
//! assert!(area.contains(&a));
//! assert!(distance(&a, &b) > 0);
//! ```

pub mod bbox;
pub mod feature;
pub mod geo;
pub mod route;

pub use bbox::Rectangle;
pub use feature::Feature;
pub use crate::geo::Point;
pub use route::{RouteNote, RouteSummary};
