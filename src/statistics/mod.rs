//! Statistical computations over labeled grids
//!
//! This module provides the reductions the variability diagnostics are built from.
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`operations`]: Masked lane statistics and the [`MaskedReduction`] trait
//! - [`parallel`]: Parallel lane mapping shared by every reduction
//! - [`time`]: Calendar-aligned time reductions and seasons
//! - [`detrend`]: Polynomial detrending along an axis
//! - [`variability`]: Whole-period and segmented interannual variability
//! - [`area`]: Area-weighted sums and means over region boxes
//! - [`aggregate`]: Multi-model mean and model variability index
//! - [`trend`]: Least squares trends against calendar year

pub mod aggregate;
pub mod area;
pub mod detrend;
pub mod operations;
pub mod parallel;
pub mod time;
pub mod trend;
pub mod variability;

// Re-export the main types and functions for convenience
pub use aggregate::{
    common_grid, fold_iav, model_variability_index, mvi_field, yearly_sigma, IavAccumulator,
    MultiModelMean, IAV_SCALING, MVI_CAP, MVI_THRESHOLD,
};
pub use area::{
    area_series, scale, AreaOperation, AreaReducer, UnitConversion, EARTH_RADIUS_M, SECONDS_PER_YEAR,
};
pub use detrend::{Detrender, TrendDegree};
pub use operations::{masked_mean, masked_std, masked_sum, MaskedReduction, StatOperation};
pub use parallel::{map_lanes, reduce_lanes};
pub use time::{
    remove_seasonal_cycle, season_axis, PeriodKind, ReduceOptions, Season, TimeOperation,
    TimeReducer, YearWindow,
};
pub use trend::{linear_trend, trend_field, LinearTrend};
pub use variability::{
    usable_window, IavMode, Period, TimeAvg, VariabilityEngine, VariabilityResult,
    VariabilitySettings, MIN_CONTROL_YEARS, SPINUP_YEARS,
};
