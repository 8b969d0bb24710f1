//! climvar: variability statistics for gridded climate-model output
//!
//! A Rust library for turning multi-dimensional model output into the variability
//! fields used by model-evaluation diagnostics: interannual variability of
//! (pre-industrial control) runs, its multi-model mean, area means and trends over
//! named regions, and the model variability index against a reference dataset.
//!
//! ## Key Features
//!
//! - **Labeled grids**: Arrays with named time/level/lat/lon axes and a fill value
//! - **Calendar-aware reductions**: Yearly, annual and seasonal means with DJF wrapping
//! - **Detrending**: Linear or quadratic polynomial removal along any axis
//! - **Variability**: Whole-record or segmented interannual standard deviation
//! - **Area statistics**: Cosine-latitude weighted sums and means over region boxes
//! - **Parallel Processing**: Per-cell lanes and per-dataset work on Rayon's pool
//!
//! ## Module Organization
//!
//! - [`grid`]: Labeled grid arrays and axis naming
//! - [`statistics`]: Statistical reductions, variability and aggregation
//! - [`region`]: Named region boxes
//! - [`data_source`]: The [`DataReader`] seam and an in-memory reader
//! - [`config`]: Diagnostic options and their validation
//! - [`pipeline`]: Dataset loops for the two diagnostics
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use climvar::prelude::*;
//! use std::path::Path;
//!
//! let config = DiagnosticConfig::from_json_str(r#"{"time_avg": "annualclim"}"#).unwrap();
//! let reader = InMemoryReader::from_path(Path::new("datasets.json")).unwrap();
//!
//! let report = climvar::run_iav(&reader, &config).unwrap();
//! println!("{}", report.multi_model_mean.comment);
//! ```

// Core modules
pub mod config;
pub mod data_source;
pub mod errors;
pub mod grid;
pub mod parallel;
pub mod pipeline;
pub mod region;
pub mod statistics;

// Direct re-exports for the public API
pub use config::{DiagnosticConfig, ScalarSettings};
pub use data_source::{DataReader, DatasetEntry, DatasetMeta, InMemoryReader};
pub use errors::{ClimVarError, Result};
pub use grid::{AxisKind, Coordinates, GridArray, GridAxis, VarAttributes, DEFAULT_FILL_VALUE};
pub use parallel::{ParallelConfig, ParallelInfo};
pub use pipeline::{
    run_iav, run_scalar_diagnostics, IavReport, ScalarDiagnostic, ScalarReport, SkippedDataset,
};
pub use region::{Region, RegionBox, RegionSelector};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::DiagnosticConfig;
    pub use crate::data_source::{DataReader, DatasetMeta, InMemoryReader};
    pub use crate::errors::{ClimVarError, Result};
    pub use crate::grid::{AxisKind, GridArray, GridAxis};
    pub use crate::parallel::ParallelConfig;
    pub use crate::region::RegionSelector;
    pub use crate::statistics::{
        AreaOperation, AreaReducer, Detrender, MaskedReduction, PeriodKind, ReduceOptions,
        StatOperation, TimeAvg, TimeReducer, TrendDegree, VariabilityEngine, VariabilitySettings,
    };
}
