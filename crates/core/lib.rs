//! In-memory state behind the RouteGuide service.
//!
//! ## Components
//! - **Feature store**: load-once, read-only list of named locations with
//!   point lookup and rectangle scans
//! - **Route note log**: per-location, append-only chat history guarded by a
//!   single lock, returning owned snapshots on every append
//!
//! ```rust
//! use routeguide::{FeatureStore, RouteNoteLog};
//! use routeguide::types::{Point, Rectangle, RouteNote};
//!
//! let store = FeatureStore::bundled()?;
//! let trail = Point::new(409_146_138, -746_188_906);
//! assert!(store.find_at(&trail).is_some());
//!
//! let area = Rectangle::new(Point::new(400_000_000, -750_000_000), Point::new(420_000_000, -730_000_000));
//! assert!(store.scan_in(&area).count() > 0);
//!
//! let log = RouteNoteLog::new();
//! let history = log.append(RouteNote::new(trail, "nice view"));
//! assert_eq!(history.len(), 1);
//! # Ok::<(), routeguide::LoadError>(())
//! ```

pub mod error;
pub mod notes;
pub mod store;

pub use error::{LoadError, Result};
pub use notes::{LocationKey, RouteNoteLog};
pub use store::{BUNDLED_FEATURES, FeatureStore};

pub use routeguide_types as types;
