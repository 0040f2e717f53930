//! Error types for loading the feature dataset

use std::path::PathBuf;
use thiserror::Error;

/// Failure to build a [`FeatureStore`](crate::FeatureStore).
///
/// Loading happens once at startup; any of these is fatal.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read feature data from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode feature data: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
