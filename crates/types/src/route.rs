use crate::geo::Point;
use serde::{Deserialize, Serialize};

/// A chat message attached to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNote {
    pub location: Point,
    pub message: String,
}

impl RouteNote {
    pub fn new(location: Point, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// Statistics about a route recorded by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Number of points received
    pub point_count: i32,
    /// Number of known features passed while traversing the route
    pub feature_count: i32,
    /// Distance covered in meters
    pub distance: i32,
    /// Duration of the traversal in seconds
    pub elapsed_time: i32,
}
