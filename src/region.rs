//! Named region lookup
//!
//! Resolves region keywords used in diagnostic configurations into latitude/longitude
//! bounding boxes. Longitudes follow the 0..360 convention; boxes whose `lon_min`
//! exceeds `lon_max` wrap through the prime meridian.

use crate::errors::{ClimVarError, Result};
use serde::Serialize;

/// Latitude/longitude bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl RegionBox {
    #[must_use]
    pub const fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Whether a grid point lies inside the box (edges inclusive)
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.lat_min || lat > self.lat_max {
            return false;
        }
        if self.lon_max - self.lon_min >= 360.0 {
            return true;
        }

        let lon = lon.rem_euclid(360.0);
        let lo = self.lon_min.rem_euclid(360.0);
        let hi = self.lon_max.rem_euclid(360.0);
        if lo <= hi {
            lon >= lo && lon <= hi
        } else {
            lon >= lo || lon <= hi
        }
    }
}

/// A resolved region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub display_name: &'static str,
    pub bounds: RegionBox,
}

/// (keyword, display name, lat_min, lat_max, lon_min, lon_max)
const REGIONS: &[(&str, &str, f64, f64, f64, f64)] = &[
    ("global", "Global", -90.0, 90.0, 0.0, 360.0),
    ("tropics", "Tropics", -20.0, 20.0, 0.0, 360.0),
    ("nh extratropics", "NH extratropics", 20.0, 90.0, 0.0, 360.0),
    ("sh extratropics", "SH extratropics", -90.0, -20.0, 0.0, 360.0),
    ("nh", "Northern Hemisphere", 0.0, 90.0, 0.0, 360.0),
    ("sh", "Southern Hemisphere", -90.0, 0.0, 0.0, 360.0),
    ("nh midlatitudes", "NH midlatitudes", 35.0, 60.0, 0.0, 360.0),
    ("sh midlatitudes", "SH midlatitudes", -60.0, -35.0, 0.0, 360.0),
    ("arctic", "Arctic", 60.0, 90.0, 0.0, 360.0),
    ("antarctic", "Antarctic", -90.0, -60.0, 0.0, 360.0),
    ("equatorial", "Equatorial", -10.0, 10.0, 0.0, 360.0),
    ("southern ocean", "Southern Ocean", -90.0, -40.0, 0.0, 360.0),
    ("nino3", "Nino 3", -5.0, 5.0, 210.0, 270.0),
    ("nino3.4", "Nino 3.4", -5.0, 5.0, 190.0, 240.0),
    ("nino4", "Nino 4", -5.0, 5.0, 160.0, 210.0),
    ("north atlantic", "North Atlantic", 0.0, 60.0, 280.0, 360.0),
    ("north pacific", "North Pacific", 20.0, 65.0, 120.0, 240.0),
    ("indian ocean", "Indian Ocean", -40.0, 25.0, 40.0, 110.0),
    ("europe", "Europe", 35.0, 72.0, 350.0, 40.0),
    ("north america", "North America", 15.0, 72.0, 190.0, 310.0),
    ("south america", "South America", -56.0, 13.0, 278.0, 326.0),
    ("africa", "Africa", -35.0, 37.0, 342.0, 52.0),
    ("asia", "Asia", 5.0, 75.0, 60.0, 180.0),
    ("australia", "Australia", -45.0, -10.0, 110.0, 155.0),
];

/// Lookup over the fixed set of named regions
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionSelector;

impl RegionSelector {
    /// Resolve a region keyword (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::UnknownRegion`] for names outside the table.
    pub fn resolve(region_name: &str) -> Result<Region> {
        let key = region_name.trim().to_ascii_lowercase();
        REGIONS
            .iter()
            .find(|(name, ..)| *name == key)
            .map(|&(_, display_name, lat_min, lat_max, lon_min, lon_max)| Region {
                display_name,
                bounds: RegionBox::new(lat_min, lat_max, lon_min, lon_max),
            })
            .ok_or_else(|| ClimVarError::UnknownRegion {
                name: region_name.to_string(),
                known: Self::names().join(", "),
            })
    }

    /// Keywords accepted by [`RegionSelector::resolve`]
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        REGIONS.iter().map(|(name, ..)| *name).collect()
    }
}
