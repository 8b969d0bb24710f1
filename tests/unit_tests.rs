//! Unit tests for the climvar building blocks
//!
//! These cover the grid model, the masked statistics and every reduction stage
//! on small synthetic grids whose results can be worked out by hand.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use chrono::{Datelike, NaiveDate};
use climvar::{
    config::DiagnosticConfig,
    data_source::DatasetMeta,
    errors::{ClimVarError, Result},
    grid::{AxisKind, Coordinates, GridArray, GridAxis, DEFAULT_FILL_VALUE},
    parallel::{ParallelConfig, ParallelInfo},
    region::{RegionBox, RegionSelector},
    statistics::{
        detrend::polyfit, linear_trend, map_lanes, masked_mean, masked_std, masked_sum,
        model_variability_index, mvi_field, remove_seasonal_cycle, trend_field, usable_window,
        AreaOperation, AreaReducer, Detrender, MaskedReduction, Period, PeriodKind, ReduceOptions,
        Season, StatOperation, TimeAvg, TimeOperation, TimeReducer, TrendDegree, UnitConversion,
        YearWindow, EARTH_RADIUS_M, MVI_CAP, SECONDS_PER_YEAR,
    },
};
use ndarray::{ArrayD, IxDyn};
use std::f64::consts::PI;

fn date(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 15).unwrap()
}

/// Monthly [time, lat, lon] grid; `value` gets (year, month, cell index)
fn monthly_grid(
    start_year: i32,
    years: i32,
    lats: &[f64],
    lons: &[f64],
    value: impl Fn(i32, u32, usize) -> f64,
) -> GridArray {
    let dates: Vec<NaiveDate> = (start_year..start_year + years)
        .flat_map(|y| (1..=12).map(move |m| date(y, m)))
        .collect();
    let shape = [dates.len(), lats.len(), lons.len()];
    let data = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        let d = dates[idx[0]];
        value(d.year(), d.month(), idx[1] * lons.len() + idx[2])
    });
    GridArray::new(
        data,
        vec![
            GridAxis::time(dates),
            GridAxis::new(AxisKind::Lat, lats.to_vec()),
            GridAxis::new(AxisKind::Lon, lons.to_vec()),
        ],
        DEFAULT_FILL_VALUE,
    )
    .unwrap()
}

/// One-dimensional series with one sample per year dated 1 July
fn yearly_series(start_year: i32, values: &[f64]) -> GridArray {
    let dates = (0..values.len())
        .map(|i| NaiveDate::from_ymd_opt(start_year + i as i32, 7, 1).unwrap())
        .collect();
    GridArray::new(
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap(),
        vec![GridAxis::time(dates)],
        DEFAULT_FILL_VALUE,
    )
    .unwrap()
}

fn global_grid(step: f64) -> (Vec<f64>, Vec<f64>) {
    let n_lat = (180.0 / step) as usize;
    let n_lon = (360.0 / step) as usize;
    let lats = (0..n_lat).map(|i| -90.0 + step / 2.0 + i as f64 * step).collect();
    let lons = (0..n_lon).map(|i| step / 2.0 + i as f64 * step).collect();
    (lats, lons)
}

fn spatial_field(lats: &[f64], lons: &[f64], value: impl Fn(f64, f64) -> f64) -> GridArray {
    let data = ArrayD::from_shape_fn(IxDyn(&[lats.len(), lons.len()]), |idx| {
        value(lats[idx[0]], lons[idx[1]])
    });
    GridArray::new(
        data,
        vec![
            GridAxis::new(AxisKind::Lat, lats.to_vec()),
            GridAxis::new(AxisKind::Lon, lons.to_vec()),
        ],
        DEFAULT_FILL_VALUE,
    )
    .unwrap()
}

#[test]
fn test_error_types() {
    let err = ClimVarError::dimension("MPI-ESM", "required axis 'lat' not found");
    assert_eq!(
        err.to_string(),
        "Dimension error for dataset 'MPI-ESM': required axis 'lat' not found"
    );
    assert!(!err.is_run_fatal());

    let err = ClimVarError::insufficient_data("CanESM", "too short");
    assert!(err.to_string().contains("Insufficient data for dataset 'CanESM'"));
    assert!(!err.is_run_fatal());

    assert!(ClimVarError::Config("missing".into()).is_run_fatal());
    assert!(ClimVarError::UnknownRegion {
        name: "atlantis".into(),
        known: String::new(),
    }
    .is_run_fatal());
    assert!(ClimVarError::EmptyRegion {
        lat_min: 0.0,
        lat_max: 1.0,
        lon_min: 0.0,
        lon_max: 1.0
    }
    .is_run_fatal());
    assert!(!ClimVarError::InsufficientRange("empty".into()).is_run_fatal());
}

#[test]
fn test_axis_aliases() {
    for name in ["lat", "rlat", "j", "latitude", "LAT"] {
        assert_eq!(AxisKind::resolve(name), Some(AxisKind::Lat), "{name}");
    }
    for name in ["lon", "rlon", "i", "longitude"] {
        assert_eq!(AxisKind::resolve(name), Some(AxisKind::Lon), "{name}");
    }
    for name in ["lev", "plev", "level"] {
        assert_eq!(AxisKind::resolve(name), Some(AxisKind::Level), "{name}");
    }
    assert_eq!(AxisKind::resolve("time"), Some(AxisKind::Time));
    assert_eq!(AxisKind::resolve("depth"), None);
    assert_eq!(AxisKind::Level.to_string(), "lev");
}

#[test]
fn test_grid_from_named_axes() -> Result<()> {
    let data = ArrayD::zeros(IxDyn(&[2, 3]));
    let grid = GridArray::from_named(
        data,
        vec![
            ("rlat".to_string(), Coordinates::Values(vec![-10.0, 10.0])),
            ("i".to_string(), Coordinates::Values(vec![0.0, 120.0, 240.0])),
        ],
        DEFAULT_FILL_VALUE,
    )?;
    assert_eq!(grid.axis_index(AxisKind::Lat), Some(0));
    assert_eq!(grid.axis_index(AxisKind::Lon), Some(1));
    assert_eq!(grid.coordinate_values(AxisKind::Lon)?, &[0.0, 120.0, 240.0]);

    let unknown = GridArray::from_named(
        ArrayD::zeros(IxDyn(&[2])),
        vec![("depth".to_string(), Coordinates::Values(vec![1.0, 2.0]))],
        DEFAULT_FILL_VALUE,
    );
    assert!(matches!(unknown, Err(ClimVarError::Dimension { .. })));
    Ok(())
}

#[test]
fn test_grid_invariants() {
    let duplicate = GridArray::new(
        ArrayD::zeros(IxDyn(&[2, 2])),
        vec![
            GridAxis::new(AxisKind::Lat, vec![0.0, 1.0]),
            GridAxis::new(AxisKind::Lat, vec![0.0, 1.0]),
        ],
        DEFAULT_FILL_VALUE,
    );
    assert!(matches!(duplicate, Err(ClimVarError::Dimension { .. })));

    let wrong_extent = GridArray::new(
        ArrayD::zeros(IxDyn(&[2, 3])),
        vec![
            GridAxis::new(AxisKind::Lat, vec![0.0, 1.0]),
            GridAxis::new(AxisKind::Lon, vec![0.0, 1.0]),
        ],
        DEFAULT_FILL_VALUE,
    );
    assert!(matches!(wrong_extent, Err(ClimVarError::Dimension { .. })));

    let wrong_rank = GridArray::new(
        ArrayD::zeros(IxDyn(&[2, 3])),
        vec![GridAxis::new(AxisKind::Lat, vec![0.0, 1.0])],
        DEFAULT_FILL_VALUE,
    );
    assert!(wrong_rank.is_err());
}

#[test]
fn test_missing_value_handling() {
    let grid = yearly_series(2000, &[1.0, DEFAULT_FILL_VALUE, f64::NAN, 4.0]);
    assert_eq!(grid.valid_count(), 2);
    assert!(grid.is_missing(DEFAULT_FILL_VALUE));
    assert!(grid.is_missing(f64::NAN));
    assert_eq!(grid.masked(4.0), Some(4.0));
}

#[test]
fn test_masked_statistics() {
    let values = [Some(2.0), None, Some(4.0), Some(9.0)];
    assert_relative_eq!(masked_mean(&values, 1).unwrap(), 5.0);
    assert_eq!(masked_mean(&values, 4), None);
    assert_relative_eq!(masked_sum(&values).unwrap(), 15.0);
    // sample standard deviation of 2, 4, 9
    assert_relative_eq!(masked_std(&values).unwrap(), 13.0_f64.sqrt(), epsilon = 1e-12);

    assert_eq!(masked_mean(&[None, None], 1), None);
    assert_eq!(masked_sum(&[None]), None);
    assert_eq!(masked_std(&[Some(1.0)]), None);
    assert_eq!(masked_std(&[Some(0.3); 5]), Some(0.0));

    assert_eq!(StatOperation::StdDev.as_str(), "stddev");
    assert_eq!(StatOperation::Sum.apply(&values), Some(15.0));
}

#[test]
fn test_reduce_along_skips_missing() -> Result<()> {
    let data = ArrayD::from_shape_vec(
        IxDyn(&[3, 2]),
        vec![1.0, DEFAULT_FILL_VALUE, 3.0, DEFAULT_FILL_VALUE, 5.0, DEFAULT_FILL_VALUE],
    )?;
    let grid = GridArray::new(
        data,
        vec![
            GridAxis::new(AxisKind::Period, vec![0.0, 1.0, 2.0]),
            GridAxis::new(AxisKind::Lat, vec![-45.0, 45.0]),
        ],
        DEFAULT_FILL_VALUE,
    )?;

    let mean = grid.reduce_along(AxisKind::Period, StatOperation::Mean)?;
    assert_eq!(mean.shape(), &[2]);
    assert_relative_eq!(mean.data()[[0]], 3.0);
    assert_eq!(mean.data()[[1]], DEFAULT_FILL_VALUE);

    let missing_axis = grid.reduce_along(AxisKind::Time, StatOperation::Mean);
    assert!(matches!(missing_axis, Err(ClimVarError::Dimension { .. })));
    Ok(())
}

#[test]
fn test_map_lanes_preserves_layout() -> Result<()> {
    let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |idx| {
        (idx[0] * 100 + idx[1] * 10 + idx[2]) as f64
    });
    let doubled = map_lanes(&data, 1, 3, DEFAULT_FILL_VALUE, |lane| {
        lane.iter().map(|v| v.map(|x| x * 2.0)).collect()
    })?;
    assert_eq!(doubled.shape(), data.shape());
    assert_eq!(doubled[[1, 2, 3]], 246.0);

    assert!(map_lanes(&data, 3, 1, DEFAULT_FILL_VALUE, |_| vec![None]).is_err());
    Ok(())
}

#[test]
fn test_detrend_residuals_have_zero_mean() {
    let detrender = Detrender::new(TrendDegree::Quadratic);
    let lane: Vec<Option<f64>> = (0..50)
        .map(|i| {
            let t = f64::from(i);
            Some(3.0 + 0.5 * t - 0.02 * t * t + (t * 1.7).sin())
        })
        .collect();
    let residuals = detrender.detrend_lane(&lane);
    let mean = masked_mean(&residuals, 1).unwrap();
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-10);

    // missing samples are excluded from the fit and stay missing
    let mut gappy = lane.clone();
    gappy[3] = None;
    gappy[17] = None;
    let residuals = detrender.detrend_lane(&gappy);
    assert_eq!(residuals[3], None);
    assert_eq!(residuals[17], None);
    assert_abs_diff_eq!(masked_mean(&residuals, 1).unwrap(), 0.0, epsilon = 1e-10);
}

#[test]
fn test_detrend_removes_exact_polynomials() {
    let quadratic: Vec<Option<f64>> = (0..30)
        .map(|i| Some(1000.0 + 2.0 * f64::from(i) + 0.1 * f64::from(i * i)))
        .collect();
    for r in Detrender::new(TrendDegree::Quadratic).detrend_lane(&quadratic) {
        assert_abs_diff_eq!(r.unwrap(), 0.0, epsilon = 1e-8);
    }

    let linear: Vec<Option<f64>> = (0..10).map(|i| Some(5.0 - 0.25 * f64::from(i))).collect();
    for r in Detrender::new(TrendDegree::Linear).detrend_lane(&linear) {
        assert_abs_diff_eq!(r.unwrap(), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_detrend_minimum_samples_and_restored_mean() {
    let detrender = Detrender::new(TrendDegree::Quadratic);
    assert_eq!(TrendDegree::Quadratic.min_samples(), 4);
    let short = [Some(1.0), None, Some(2.0), Some(4.0), None];
    assert!(detrender.detrend_lane(&short).iter().all(Option::is_none));

    let lane: Vec<Option<f64>> = [4.0, 7.0, 1.0, 8.0, 3.0, 9.0].iter().map(|&v| Some(v)).collect();
    let restored = Detrender::new(TrendDegree::Linear)
        .with_restored_mean(true)
        .detrend_lane(&lane);
    assert_relative_eq!(
        masked_mean(&restored, 1).unwrap(),
        masked_mean(&lane, 1).unwrap(),
        epsilon = 1e-10
    );
}

#[test]
fn test_polyfit_recovers_coefficients() {
    let xs: Vec<f64> = (0..7).map(|i| -1.0 + f64::from(i) / 3.0).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 0.5 - 2.0 * x + 3.0 * x * x).collect();
    let coefficients = polyfit(&xs, &ys, 2).unwrap();
    assert_relative_eq!(coefficients[0], 0.5, epsilon = 1e-10);
    assert_relative_eq!(coefficients[1], -2.0, epsilon = 1e-10);
    assert_relative_eq!(coefficients[2], 3.0, epsilon = 1e-10);

    // a single distinct abscissa cannot determine a line
    assert!(polyfit(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 1).is_none());
    // fewer samples than coefficients
    assert!(polyfit(&[0.0, 1.0], &[1.0, 2.0], 2).is_none());
}

#[test]
fn test_polyfit_residuals_are_orthogonal_to_design() {
    let xs: Vec<f64> = (0..40).map(|i| -1.0 + f64::from(i) / 19.5).collect();
    let ys: Vec<f64> = xs
        .iter()
        .enumerate()
        .map(|(i, x)| 1.0 + 0.4 * x - 0.7 * x * x + if i % 3 == 0 { 0.25 } else { -0.1 })
        .collect();
    let coefficients = polyfit(&xs, &ys, 2).unwrap();

    let residuals: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| y - (coefficients[0] + coefficients[1] * x + coefficients[2] * x * x))
        .collect();
    for power in 0..3 {
        let dot: f64 = xs.iter().zip(&residuals).map(|(x, r)| x.powi(power) * r).sum();
        assert_relative_eq!(dot, 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_detrend_grid_along_axis() -> Result<()> {
    let grid = monthly_grid(2000, 5, &[0.0], &[0.0, 90.0], |y, m, cell| {
        f64::from(y - 2000) * 12.0 + f64::from(m) + cell as f64 * 100.0
    });
    let residuals = Detrender::new(TrendDegree::Linear).detrend(&grid, AxisKind::Time)?;
    assert_eq!(residuals.shape(), grid.shape());
    assert!(residuals.data().iter().all(|r| r.abs() < 1e-8));
    Ok(())
}

#[test]
fn test_yearly_reduction_is_idempotent() -> Result<()> {
    let grid = monthly_grid(1990, 6, &[-30.0, 30.0], &[100.0], |y, m, cell| {
        f64::from(y) + f64::from(m) / 10.0 + cell as f64
    });
    let reducer = TimeReducer::default();
    let yearly = reducer.reduce(&grid, 1990, 1995, &PeriodKind::Yearly)?;
    assert_eq!(yearly.shape(), &[6, 2, 1]);
    assert_relative_eq!(yearly.data()[[0, 0, 0]], 1990.65, epsilon = 1e-9);

    let again = reducer.reduce(&yearly, 1990, 1995, &PeriodKind::Yearly)?;
    assert!(again.same_grid(&yearly));
    for (a, b) in again.data().iter().zip(yearly.data()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }

    // a single-year annual mean of a yearly series is that year's value
    let annual = reducer.reduce(&yearly, 1993, 1993, &PeriodKind::Annual)?;
    assert_eq!(annual.shape(), &[1, 2, 1]);
    assert_eq!(annual.coordinate_values(AxisKind::Season)?, &[0.0]);
    assert_relative_eq!(annual.data()[[0, 1, 0]], yearly.data()[[3, 1, 0]], epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_time_reducer_window_errors() {
    let grid = monthly_grid(2000, 3, &[0.0], &[0.0], |_, _, _| 1.0);
    let reducer = TimeReducer::default();
    assert!(matches!(
        reducer.reduce(&grid, 2002, 2000, &PeriodKind::Annual),
        Err(ClimVarError::InsufficientRange(_))
    ));
    assert!(matches!(
        reducer.reduce(&grid, 1900, 1910, &PeriodKind::Annual),
        Err(ClimVarError::InsufficientRange(_))
    ));

    let clamped = TimeReducer::new(ReduceOptions {
        normalize_bounds: true,
        ..ReduceOptions::default()
    });
    let yearly = clamped.reduce(&grid, 1950, 2050, &PeriodKind::Yearly).unwrap();
    assert_eq!(yearly.shape()[0], 3);
}

#[test]
fn test_extract_returns_sliced_grid() -> Result<()> {
    let grid = monthly_grid(2000, 4, &[0.0], &[0.0], |y, m, _| f64::from(y * 100) + f64::from(m));
    let reducer = TimeReducer::new(ReduceOptions {
        operation: TimeOperation::Extract,
        ..ReduceOptions::default()
    });
    let sliced = reducer.reduce(&grid, 2001, 2002, &PeriodKind::Annual)?;
    assert_eq!(sliced.shape(), &[24, 1, 1]);
    assert_eq!(sliced.times()?[0], date(2001, 1));
    Ok(())
}

#[test]
fn test_missing_fraction_marks_sparse_years() -> Result<()> {
    // 2001 keeps 5 of 12 months, 2002 keeps 6
    let grid = monthly_grid(2000, 3, &[0.0], &[0.0], |y, m, _| match (y, m) {
        (2001, 1..=7) | (2002, 1..=6) => DEFAULT_FILL_VALUE,
        _ => 1.0,
    });
    let yearly = TimeReducer::default().reduce(&grid, 2000, 2002, &PeriodKind::Yearly)?;
    assert_relative_eq!(yearly.data()[[0, 0, 0]], 1.0);
    assert_eq!(yearly.data()[[1, 0, 0]], DEFAULT_FILL_VALUE);
    assert_relative_eq!(yearly.data()[[2, 0, 0]], 1.0);
    Ok(())
}

#[test]
fn test_djf_belongs_to_following_year() -> Result<()> {
    let grid = monthly_grid(2000, 3, &[0.0], &[0.0], |y, m, _| f64::from(y * 100) + f64::from(m));
    let djf = Season::standard().remove(0);
    assert_eq!(djf.label(), "DJF");
    assert_eq!(djf.season_year(date(2000, 12)), Some(2001));
    assert_eq!(djf.season_year(date(2001, 1)), Some(2001));
    assert_eq!(djf.season_year(date(2001, 6)), None);

    let series = TimeReducer::default().season_series(&grid, 2000, 2002, &djf)?;
    let years: Vec<i32> = series.times()?.iter().map(|d| d.year()).collect();
    assert_eq!(years, vec![2000, 2001, 2002]);
    assert_relative_eq!(
        series.data()[[1, 0, 0]],
        (200_012.0 + 200_101.0 + 200_102.0) / 3.0,
        epsilon = 1e-9
    );

    // the first DJF only has January and February; strict policy rejects it
    let strict = TimeReducer::new(ReduceOptions {
        max_missing_fraction: 0.0,
        ..ReduceOptions::default()
    });
    let series = strict.season_series(&grid, 2000, 2002, &djf)?;
    assert_eq!(series.data()[[0, 0, 0]], DEFAULT_FILL_VALUE);
    Ok(())
}

#[test]
fn test_seasonal_reduction_axis() -> Result<()> {
    let grid = monthly_grid(2000, 4, &[0.0], &[0.0], |_, m, _| f64::from(m));
    let seasons = Season::from_indices(&[1, 2])?;
    let reduced = TimeReducer::default().reduce(&grid, 2000, 2003, &PeriodKind::Seasonal(seasons))?;
    assert_eq!(reduced.shape(), &[2, 1, 1]);
    assert_eq!(reduced.coordinate_values(AxisKind::Season)?, &[1.0, 2.0]);
    assert_relative_eq!(reduced.data()[[0, 0, 0]], 4.0, epsilon = 1e-12);
    assert_relative_eq!(reduced.data()[[1, 0, 0]], 7.0, epsilon = 1e-12);

    let son = Season::from_indices(&[3])?;
    let single = TimeReducer::default().reduce(&grid, 2000, 2003, &PeriodKind::Seasonal(son))?;
    assert_eq!(single.coordinate_values(AxisKind::Season)?, &[0.0]);
    assert_relative_eq!(single.data()[[0, 0, 0]], 10.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_season_validation() {
    assert!(matches!(Season::from_indices(&[]), Err(ClimVarError::Config(_))));
    assert!(matches!(Season::from_indices(&[4]), Err(ClimVarError::Config(_))));
    assert!(matches!(Season::from_indices(&[1, 1]), Err(ClimVarError::Config(_))));
    assert!(Season::custom(7, "NDJ", vec![11, 12, 1]).is_ok());
    assert!(Season::custom(7, "bad", vec![0]).is_err());

    let ndj = Season::custom(7, "NDJ", vec![11, 12, 1]).unwrap();
    assert_eq!(ndj.season_year(date(1999, 11)), Some(2000));
    assert_eq!(ndj.season_year(date(2000, 1)), Some(2000));
}

#[test]
fn test_remove_seasonal_cycle() -> Result<()> {
    let grid = monthly_grid(2000, 3, &[0.0], &[0.0], |_, m, _| 10.0 * f64::from(m));
    let anomalies = remove_seasonal_cycle(&grid)?;
    assert!(anomalies.data().iter().all(|v| v.abs() < 1e-12));
    Ok(())
}

#[test]
fn test_period_partition() {
    // 600-year control run starting 1850: 500 usable years
    let meta = DatasetMeta::new("piControl", 1850, 2449);
    let window = usable_window(&meta).unwrap();
    assert_eq!(window, YearWindow { start: 1950, end: 2449 });
    let periods = Period::partition(window.start, window.end, 20);
    assert_eq!(periods.len(), 25);
    assert!(periods.iter().all(|p| p.years() == 20));

    // 615 years: the last period absorbs the 15-year rest
    let periods = Period::partition(1950, 2464, 20);
    assert_eq!(periods.len(), 25);
    let last = periods.last().unwrap();
    assert_eq!((last.start_year, last.end_year), (2430, 2464));
    assert_eq!(last.years(), 35);

    assert!(Period::partition(1950, 1959, 20).is_empty());
    assert!(Period::partition(1950, 2000, 0).is_empty());
}

#[test]
fn test_usable_window_rejects_short_records() {
    let meta = DatasetMeta::new("short", 1850, 1940);
    assert!(matches!(
        usable_window(&meta),
        Err(ClimVarError::InsufficientData { .. })
    ));
}

#[test]
fn test_linear_trend() -> Result<()> {
    let years: Vec<i32> = (1980..1990).collect();
    let values: Vec<Option<f64>> = years.iter().map(|&y| Some(2.0 + 0.3 * f64::from(y - 1980))).collect();
    let trend = linear_trend(&years, &values).unwrap();
    assert_relative_eq!(trend.slope, 0.3, epsilon = 1e-10);
    assert_relative_eq!(trend.value_at(1985), 3.5, epsilon = 1e-8);
    assert_eq!(trend.samples, 10);
    assert!(linear_trend(&[2000], &[Some(1.0)]).is_none());

    let series = yearly_series(1980, &values.iter().map(|v| v.unwrap()).collect::<Vec<_>>());
    let slope = trend_field(&series, Some(YearWindow::new(1982, 1986)?))?;
    assert_eq!(slope.ndim(), 0);
    assert_relative_eq!(slope.data().iter().copied().next().unwrap(), 0.3, epsilon = 1e-10);
    Ok(())
}

#[test]
fn test_region_lookup() {
    let global = RegionSelector::resolve("Global").unwrap();
    assert_eq!(global.display_name, "Global");
    assert_eq!(global.bounds, RegionBox::new(-90.0, 90.0, 0.0, 360.0));

    assert!(matches!(
        RegionSelector::resolve("atlantis"),
        Err(ClimVarError::UnknownRegion { ref name, .. }) if name == "atlantis"
    ));
    let message = RegionSelector::resolve("atlantis").unwrap_err().to_string();
    assert!(message.contains("'atlantis'"));
    assert!(message.contains("nino3.4"));
    assert!(RegionSelector::names().contains(&"nino3.4"));

    let europe = RegionSelector::resolve("europe").unwrap().bounds;
    assert!(europe.contains(50.0, 5.0));
    assert!(europe.contains(50.0, 355.0));
    assert!(europe.contains(50.0, -5.0));
    assert!(!europe.contains(50.0, 180.0));
    assert!(!europe.contains(20.0, 5.0));
}

#[test]
fn test_area_average_of_uniform_field() -> Result<()> {
    let (lats, lons) = global_grid(5.0);
    let field = spatial_field(&lats, &lons, |_, _| 1.0);
    let global = RegionSelector::resolve("global")?.bounds;
    let mean = AreaReducer::new(global, AreaOperation::Average).reduce(&field)?;
    assert_eq!(mean.ndim(), 0);
    assert_relative_eq!(mean.data().iter().copied().next().unwrap(), 1.0, epsilon = 1e-12);

    // a hemispheric step seen from the matching hemisphere is uniform too
    let step = spatial_field(&lats, &lons, |lat, _| if lat > 0.0 { 1.0 } else { 0.0 });
    let nh = RegionSelector::resolve("nh")?.bounds;
    let mean = AreaReducer::new(nh, AreaOperation::Average).reduce(&step)?;
    assert_relative_eq!(mean.data().iter().copied().next().unwrap(), 1.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_area_sum_scales_with_area() -> Result<()> {
    let (lats, lons) = global_grid(5.0);
    let global = RegionSelector::resolve("global")?.bounds;
    let reducer = AreaReducer::new(global, AreaOperation::Sum);

    let mut unit = spatial_field(&lats, &lons, |_, _| 1.0);
    unit.attributes_mut().units = "kg m-2 s-1".to_string();
    let total = reducer.reduce(&unit)?;
    let total_value = total.data().iter().copied().next().unwrap();
    assert_relative_eq!(
        total_value,
        4.0 * PI * EARTH_RADIUS_M * EARTH_RADIUS_M,
        max_relative = 1e-3
    );
    assert_eq!(total.attributes().units, "kg s-1");

    let doubled = spatial_field(&lats, &lons, |_, _| 2.0);
    let doubled_value = reducer.reduce(&doubled)?.data().iter().copied().next().unwrap();
    assert_relative_eq!(doubled_value, 2.0 * total_value, max_relative = 1e-12);

    let tropics = RegionSelector::resolve("tropics")?.bounds;
    let tropical = AreaReducer::new(tropics, AreaOperation::Sum).reduce(&unit)?;
    let ratio = tropical.data().iter().copied().next().unwrap() / total_value;
    // sin(20 deg) of the sphere lies within 20 degrees of the equator
    assert_relative_eq!(ratio, 20.0_f64.to_radians().sin(), max_relative = 1e-2);
    Ok(())
}

#[test]
fn test_area_excludes_missing_cells() -> Result<()> {
    let (lats, lons) = global_grid(30.0);
    let field = spatial_field(&lats, &lons, |lat, _| if lat < 0.0 { DEFAULT_FILL_VALUE } else { 3.0 });
    let global = RegionSelector::resolve("global")?.bounds;
    let mean = AreaReducer::new(global, AreaOperation::Average).reduce(&field)?;
    assert_relative_eq!(mean.data().iter().copied().next().unwrap(), 3.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_empty_region() {
    let field = spatial_field(&[-45.0, 45.0], &[90.0, 270.0], |_, _| 1.0);
    let nino3 = RegionSelector::resolve("nino3").unwrap().bounds;
    assert!(matches!(
        AreaReducer::new(nino3, AreaOperation::Average).reduce(&field),
        Err(ClimVarError::EmptyRegion { .. })
    ));

    let missing = spatial_field(&[-45.0, 45.0], &[90.0, 270.0], |_, _| DEFAULT_FILL_VALUE);
    let global = RegionSelector::resolve("global").unwrap().bounds;
    assert!(matches!(
        AreaReducer::new(global, AreaOperation::Average).reduce(&missing),
        Err(ClimVarError::EmptyRegion { .. })
    ));
}

#[test]
fn test_area_operation_and_units() {
    assert_eq!(AreaOperation::for_units("kg m-2 s-1"), AreaOperation::Sum);
    assert_eq!(AreaOperation::for_units("K"), AreaOperation::Average);
    assert_eq!(AreaOperation::for_units("m s-1"), AreaOperation::Average);

    let flux = UnitConversion::for_units("kg s-1");
    assert_eq!(flux.units, "PgC y-1");
    assert_relative_eq!(flux.factor, SECONDS_PER_YEAR * 1e-12, max_relative = 1e-12);
    assert!(UnitConversion::for_units("K").is_identity());
}

#[test]
fn test_mvi_two_tier_clamp() {
    // sigma ratio r gives a raw index of (r - 1/r)^2
    let r9 = (3.0 + 13.0_f64.sqrt()) / 2.0;
    let raw9 = model_variability_index(Some(r9), Some(1.0)).unwrap();
    assert_relative_eq!(raw9, 9.0, epsilon = 1e-10);

    let r12 = (12.0_f64.sqrt() + 4.0) / 2.0;
    assert_eq!(model_variability_index(Some(r12), Some(1.0)), Some(MVI_CAP));
    assert_eq!(model_variability_index(Some(1.0), Some(r12)), Some(MVI_CAP));

    assert_eq!(model_variability_index(Some(2.5), Some(2.5)), Some(0.0));
    assert_eq!(model_variability_index(Some(0.0), Some(1.0)), None);
    assert_eq!(model_variability_index(Some(1.0), Some(0.0)), None);
    assert_eq!(model_variability_index(None, Some(1.0)), None);
}

#[test]
fn test_mvi_field() -> Result<()> {
    let r9 = (3.0 + 13.0_f64.sqrt()) / 2.0;
    let reference = spatial_field(&[0.0], &[0.0, 180.0], |_, _| 1.0).with_dataset("obs");
    let model = spatial_field(&[0.0], &[0.0, 180.0], |_, lon| if lon > 0.0 { 0.0 } else { r9 });
    let mvi = mvi_field(&model, &reference)?;
    assert_relative_eq!(mvi.data()[[0, 0]], 9.0, epsilon = 1e-10);
    assert_eq!(mvi.data()[[0, 1]], DEFAULT_FILL_VALUE);
    assert_eq!(mvi.attributes().units, "1");

    let other_grid = spatial_field(&[10.0], &[0.0, 180.0], |_, _| 1.0);
    assert!(matches!(
        mvi_field(&model, &other_grid),
        Err(ClimVarError::Dimension { .. })
    ));
    Ok(())
}

#[test]
fn test_config_validation() {
    let config = DiagnosticConfig::from_json_str(r#"{"time_avg": "seasonalclim", "seasons": [0, 2]}"#)
        .unwrap();
    let settings = config.iav_settings().unwrap();
    assert_eq!(settings.time_avg, TimeAvg::SeasonalClim);
    assert_eq!(settings.seasons.len(), 2);
    assert_eq!(settings.period_length, None);

    let missing = DiagnosticConfig::default();
    assert!(matches!(missing.iav_settings(), Err(ClimVarError::Config(_))));

    let bad_avg = DiagnosticConfig::from_json_str(r#"{"time_avg": "monthlyclim"}"#).unwrap();
    assert!(matches!(bad_avg.iav_settings(), Err(ClimVarError::Config(_))));

    let zero_period = DiagnosticConfig::from_json_str(r#"{"time_avg": "annualclim", "periodlength": 0}"#)
        .unwrap();
    assert!(matches!(zero_period.iav_settings(), Err(ClimVarError::Config(_))));

    let bad_fraction =
        DiagnosticConfig::from_json_str(r#"{"time_avg": "annualclim", "max_missing_fraction": 1.5}"#)
            .unwrap();
    assert!(matches!(bad_fraction.iav_settings(), Err(ClimVarError::Config(_))));
}

#[test]
fn test_scalar_config_validation() {
    let config = DiagnosticConfig::from_json_str(
        r#"{
            "time_avg": "annualclim",
            "region": "Tropics",
            "reference_dataset": "obs",
            "trend_time_range": [1980, 2000]
        }"#,
    )
    .unwrap();
    let settings = config.scalar_settings().unwrap();
    assert_eq!(settings.reference, "obs");
    assert_eq!(settings.region.display_name, "Tropics");
    assert_eq!(settings.trend_window, Some(YearWindow { start: 1980, end: 2000 }));
    assert_eq!(settings.mean_window, None);

    let no_region = DiagnosticConfig::from_json_str(r#"{"time_avg": "annualclim", "ref_dataset": "obs"}"#)
        .unwrap();
    assert!(matches!(no_region.scalar_settings(), Err(ClimVarError::Config(_))));

    let no_reference = DiagnosticConfig::from_json_str(r#"{"time_avg": "annualclim", "region": "global"}"#)
        .unwrap();
    assert!(matches!(no_reference.scalar_settings(), Err(ClimVarError::Config(_))));

    let unknown = DiagnosticConfig::from_json_str(
        r#"{"time_avg": "annualclim", "region": "atlantis", "ref_dataset": "obs"}"#,
    )
    .unwrap();
    assert!(matches!(unknown.scalar_settings(), Err(ClimVarError::UnknownRegion { .. })));

    let inverted = DiagnosticConfig::from_json_str(
        r#"{"time_avg": "annualclim", "region": "global", "ref_dataset": "obs", "mvi_time_range": [2000, 1990]}"#,
    )
    .unwrap();
    assert!(matches!(inverted.scalar_settings(), Err(ClimVarError::Config(_))));
}

#[test]
fn test_parallel_config() {
    assert_eq!(ParallelConfig::default().num_threads, None);
    assert_eq!(ParallelConfig::new(Some(4)).num_threads, Some(4));
    assert!(ParallelConfig::all_cores().num_threads.unwrap() > 0);

    // no explicit count leaves the pool alone
    assert!(ParallelConfig::default().setup_global_pool().is_ok());
    assert!(matches!(
        ParallelConfig::new(Some(0)).setup_global_pool(),
        Err(ClimVarError::ThreadPool(_))
    ));

    let info = ParallelInfo::current();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
}
