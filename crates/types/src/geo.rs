//! Scaled-integer geographic points and the geometry used by the service.
//!
//! Coordinates are stored as degrees multiplied by [`COORD_FACTOR`] so that
//! equality is exact and the wire encoding never drifts.

use crate::bbox::Rectangle;
use geo::Intersects;
use serde::{Deserialize, Serialize};

/// Scale applied to degrees in every [`Point`] field.
pub const COORD_FACTOR: f64 = 1e7;

/// Mean earth radius in meters used by [`distance`].
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A geographic point in degrees scaled by `1e7`.
///
/// # Examples
///
/// ```
/// use routeguide_types::geo::Point;
///
/// let p = Point::new(409_146_138, -746_188_906);
/// assert_eq!(p.latitude, 409_146_138);
/// assert_eq!(p.to_string(), "(409146138, -746188906)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub latitude: i32,
    #[serde(default)]
    pub longitude: i32,
}

impl Point {
    #[inline]
    pub const fn new(latitude: i32, longitude: i32) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Integer coordinate with x as longitude and y as latitude.
    #[inline]
    pub fn coord(&self) -> geo::Coord<i32> {
        geo::coord! { x: self.longitude, y: self.latitude }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Exact equality of the scaled latitude/longitude pairs.
#[inline]
pub fn points_equal(a: &Point, b: &Point) -> bool {
    a.latitude == b.latitude && a.longitude == b.longitude
}

/// Whether `point` falls inside `rect` on both axes, boundary included.
///
/// The rectangle corners may be given in any order; they are normalized on
/// every call.
pub fn in_rectangle(point: &Point, rect: &Rectangle) -> bool {
    // `Rect::new` orders min/max per axis.
    let bounds = geo::Rect::new(rect.lo.coord(), rect.hi.coord());
    bounds.intersects(&point.coord())
}

/// Convert a `1e7`-scaled degree value to radians.
#[inline]
pub fn to_radians(degrees_scaled_by_e7: i32) -> f64 {
    (degrees_scaled_by_e7 as f64 / COORD_FACTOR).to_radians()
}

/// Great-circle distance in meters between two points, rounded to the
/// nearest meter.
///
/// # Examples
///
/// ```
/// use routeguide_types::geo::{distance, Point};
///
/// let a = Point::new(407_838_351, -746_143_763);
/// let b = Point::new(408_122_808, -743_999_179);
/// assert_eq!(distance(&a, &b), distance(&b, &a));
/// assert_eq!(distance(&a, &a), 0);
/// ```
pub fn distance(a: &Point, b: &Point) -> i32 {
    let phi1 = to_radians(a.latitude);
    let phi2 = to_radians(b.latitude);
    let d_phi = phi2 - phi1;
    let d_lambda = to_radians(b.longitude) - to_radians(a.longitude);

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push near-antipodal pairs just past 1.0.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_METERS * c).round() as i32
}

/// Sum of [`distance`] over each consecutive pair in `points`.
pub fn path_distance(points: &[Point]) -> i32 {
    points
        .windows(2)
        .map(|pair| distance(&pair[0], &pair[1]))
        .fold(0i32, i32::saturating_add)
}
