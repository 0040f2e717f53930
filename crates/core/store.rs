//! Feature store: the immutable set of known features
//!
//! The store is built once, before the service accepts calls, and is only
//! read afterwards. It is shared across tasks behind an `Arc` without any
//! locking.

use crate::error::{LoadError, Result};
use routeguide_types::geo::points_equal;
use routeguide_types::{Feature, Point, Rectangle};
use std::path::Path;

/// Dataset compiled into the crate, used when no path is configured.
pub const BUNDLED_FEATURES: &[u8] = include_bytes!("data/route_guide_db.json");

/// Ordered, read-only collection of features.
///
/// Load order is preserved: lookups return the first match and scans emit in
/// that order.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    features: Vec<Feature>,
}

impl FeatureStore {
    /// Decode a JSON array of `{name, location}` records.
    ///
    /// # Errors
    /// Returns [`LoadError::Decode`] if the blob is not a valid dataset.
    pub fn load(raw: &[u8]) -> Result<Self> {
        let features: Vec<Feature> = serde_json::from_slice(raw)?;
        log::debug!("Decoded {} features", features.len());
        Ok(Self { features })
    }

    /// Read and decode a dataset file.
    ///
    /// # Errors
    /// Returns [`LoadError::Io`] if the file cannot be read and
    /// [`LoadError::Decode`] if its contents are malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::load(&raw)?;
        log::info!("Loaded {} features from {}", store.len(), path.display());
        Ok(store)
    }

    /// Load the dataset shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::load(BUNDLED_FEATURES)
    }

    /// Build a store from features already in memory.
    pub fn from_features(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// First feature, in load order, located exactly at `point`.
    pub fn find_at(&self, point: &Point) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| points_equal(&f.location, point))
    }

    /// Number of features located exactly at `point`.
    ///
    /// Several features may share a location; each one is counted.
    pub fn count_at(&self, point: &Point) -> usize {
        self.features
            .iter()
            .filter(|f| points_equal(&f.location, point))
            .count()
    }

    /// Every feature inside `rect`, in load order. Unnamed features are
    /// included.
    pub fn scan_in<'a>(&'a self, rect: &'a Rectangle) -> impl Iterator<Item = &'a Feature> + 'a {
        self.features.iter().filter(move |f| rect.contains(&f.location))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
