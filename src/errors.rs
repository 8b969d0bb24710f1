//! Centralized error handling for climvar
//!
//! Every fallible operation in the crate returns [`Result`]. The variants mirror
//! how far a failure reaches: configuration problems abort a whole run, while
//! dimension or data-length problems only cost the dataset they occurred in.

use thiserror::Error;

/// Main error type for climvar operations
#[derive(Error, Debug)]
pub enum ClimVarError {
    /// Missing or invalid configuration option, fatal before any dataset is read
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing lat/lon/level axis or a grid that does not match the others
    #[error("Dimension error for dataset '{dataset}': {message}")]
    Dimension { dataset: String, message: String },

    /// Empty or inverted year window
    #[error("Insufficient time range: {0}")]
    InsufficientRange(String),

    /// Record too short for the requested statistic
    #[error("Insufficient data for dataset '{dataset}': {message}")]
    InsufficientData { dataset: String, message: String },

    /// Region box selects no valid grid cell
    #[error("Region [{lat_min}, {lat_max}] x [{lon_min}, {lon_max}] contains no valid grid cells")]
    EmptyRegion {
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
    },

    /// Region keyword not found in the lookup table
    #[error("Unknown region '{name}' (known regions: {known})")]
    UnknownRegion { name: String, known: String },

    /// Statistics computation errors
    #[error("Statistics computation error: {0}")]
    Statistics(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Bundle or configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClimVarError {
    /// Shorthand for a [`ClimVarError::Dimension`] error
    pub fn dimension(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dimension {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`ClimVarError::InsufficientData`] error
    pub fn insufficient_data(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InsufficientData {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    /// Whether the error stops the whole diagnostic rather than a single dataset.
    ///
    /// Configuration problems, unknown regions and empty region boxes are the same
    /// for every dataset, so the dataset loop gives up on them immediately.
    #[must_use]
    pub const fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UnknownRegion { .. } | Self::EmptyRegion { .. } | Self::ThreadPool(_)
        )
    }
}

/// Result type alias for climvar operations
pub type Result<T> = std::result::Result<T, ClimVarError>;
