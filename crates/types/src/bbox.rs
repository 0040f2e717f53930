use crate::geo::{Point, in_rectangle};
use serde::{Deserialize, Serialize};

/// A latitude/longitude rectangle given by two opposite corners.
///
/// The corners are kept exactly as supplied: `lo` is not required to hold the
/// smaller coordinates. Containment normalizes them per query.
///
/// # Examples
///
/// ```
/// use routeguide_types::bbox::Rectangle;
/// use routeguide_types::geo::Point;
///
/// let rect = Rectangle::new(Point::new(420_000_000, -730_000_000), Point::new(400_000_000, -750_000_000));
/// assert!(rect.contains(&Point::new(410_000_000, -740_000_000)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rectangle {
    /// One corner of the rectangle.
    pub lo: Point,
    /// The opposite corner.
    pub hi: Point,
}

impl Rectangle {
    pub const fn new(lo: Point, hi: Point) -> Self {
        Self { lo, hi }
    }

    /// Whether `point` lies inside this rectangle, boundary included.
    #[inline]
    pub fn contains(&self, point: &Point) -> bool {
        in_rectangle(point, self)
    }
}
