use crate::geo::Point;
use serde::{Deserialize, Serialize};

/// A named geographic feature.
///
/// An empty `name` means the location is known but unnamed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Point,
}

impl Feature {
    pub fn new(name: impl Into<String>, location: Point) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }

    /// A feature with no name at `location`.
    pub fn unnamed(location: Point) -> Self {
        Self {
            name: String::new(),
            location,
        }
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}
