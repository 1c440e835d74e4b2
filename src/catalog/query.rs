//! Structured catalog query building
//!
//! Matching predicates are assembled as typed filters and only serialized to
//! the catalog's ADQL dialect at the client boundary, so the matcher logic
//! stays testable without string assertions.

use std::fmt::Write;

/// Archive collection every query is pinned to
pub const COLLECTION: &str = "GEMINI";

/// Instrument every query is pinned to
pub const INSTRUMENT: &str = "NIRI";

/// Columns the data finder needs from the catalog
const COLUMNS: &str = "publisherID, productID, observationID, \
                       energy_bandpassName, time_exposure, time_bounds_lower";

/// Observation type recorded by the archive for calibration frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationType {
    Flat,
    Dark,
}

impl ObservationType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::Dark => "DARK",
        }
    }
}

/// Exposure-time constraint for dark matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExposureFilter {
    /// Within `tolerance` seconds of `seconds`
    Near { seconds: f64, tolerance: f64 },
    /// Inside an inclusive range
    Between { lower: f64, upper: f64 },
}

/// One catalog query, built filter by filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    observation_type: Option<ObservationType>,
    observation_prefix: Option<String>,
    time_window: Option<(f64, f64)>,
    bandpass: Option<String>,
    exposure: Option<ExposureFilter>,
}

impl CatalogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain to calibration frames of the given archive type
    pub fn observation_type(mut self, observation_type: ObservationType) -> Self {
        self.observation_type = Some(observation_type);
        self
    }

    /// Constrain to observation ids starting with `prefix`
    pub fn observation_prefix(mut self, prefix: &str) -> Self {
        self.observation_prefix = Some(prefix.to_string());
        self
    }

    /// Constrain exposure start to a symmetric window of `days` around `center`
    pub fn within_days(mut self, center: f64, days: f64) -> Self {
        self.time_window = Some((center - days, center + days));
        self
    }

    /// Constrain to a single filter
    pub fn bandpass(mut self, bandpass: &str) -> Self {
        self.bandpass = Some(bandpass.to_string());
        self
    }

    /// Constrain the integration time
    pub fn exposure(mut self, filter: ExposureFilter) -> Self {
        self.exposure = Some(filter);
        self
    }

    /// Serialize to the catalog's ADQL dialect.
    ///
    /// Only the client boundary should call this.
    pub fn to_adql(&self) -> String {
        let mut query = format!(
            "SELECT {COLUMNS} \
             FROM caom2.Plane AS Plane \
             JOIN caom2.Observation AS Observation ON Plane.obsID = Observation.obsID \
             WHERE Observation.collection = '{COLLECTION}' \
             AND Observation.instrument_name = '{INSTRUMENT}' \
             AND Plane.dataProductType = 'image'"
        );

        if let Some(observation_type) = self.observation_type {
            let _ = write!(
                query,
                " AND Observation.type = '{}'",
                observation_type.as_str()
            );
        }
        if let Some(prefix) = &self.observation_prefix {
            let _ = write!(
                query,
                " AND Observation.observationID LIKE '{}%'",
                escape(prefix)
            );
        }
        if let Some((lower, upper)) = self.time_window {
            let _ = write!(
                query,
                " AND Plane.time_bounds_lower >= {lower} AND Plane.time_bounds_lower <= {upper}"
            );
        }
        if let Some(bandpass) = &self.bandpass {
            let _ = write!(
                query,
                " AND Plane.energy_bandpassName = '{}'",
                escape(bandpass)
            );
        }
        match self.exposure {
            Some(ExposureFilter::Near { seconds, tolerance }) => {
                let _ = write!(
                    query,
                    " AND Plane.time_exposure >= {} AND Plane.time_exposure <= {}",
                    seconds - tolerance,
                    seconds + tolerance
                );
            }
            Some(ExposureFilter::Between { lower, upper }) => {
                let _ = write!(
                    query,
                    " AND Plane.time_exposure >= {lower} AND Plane.time_exposure <= {upper}"
                );
            }
            None => {}
        }

        query.push_str(" ORDER BY productID");
        query
    }
}

/// Double single quotes per ADQL string-literal rules
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_query() {
        let adql = CatalogQuery::new()
            .observation_prefix("GN-2019A-FT-108-12")
            .to_adql();

        assert!(adql.contains("Observation.collection = 'GEMINI'"));
        assert!(adql.contains("Observation.instrument_name = 'NIRI'"));
        assert!(adql.contains("Plane.dataProductType = 'image'"));
        assert!(adql.contains("Observation.observationID LIKE 'GN-2019A-FT-108-12%'"));
        assert!(adql.ends_with("ORDER BY productID"));
        assert!(!adql.contains("Observation.type"));
    }

    #[test]
    fn test_flat_query() {
        let adql = CatalogQuery::new()
            .observation_type(ObservationType::Flat)
            .within_days(58000.0, 2.0)
            .bandpass("J")
            .to_adql();

        assert!(adql.contains("Observation.type = 'FLAT'"));
        assert!(adql.contains("Plane.time_bounds_lower >= 57998"));
        assert!(adql.contains("Plane.time_bounds_lower <= 58002"));
        assert!(adql.contains("Plane.energy_bandpassName = 'J'"));
    }

    #[test]
    fn test_longdark_query_uses_tolerance() {
        let adql = CatalogQuery::new()
            .observation_type(ObservationType::Dark)
            .within_days(58000.0, 2.0)
            .exposure(ExposureFilter::Near {
                seconds: 60.0,
                tolerance: 0.01,
            })
            .to_adql();

        assert!(adql.contains("Observation.type = 'DARK'"));
        assert!(adql.contains("Plane.time_exposure >= 59.99"));
        assert!(adql.contains("Plane.time_exposure <= 60.01"));
    }

    #[test]
    fn test_shortdark_query_range() {
        let adql = CatalogQuery::new()
            .observation_type(ObservationType::Dark)
            .within_days(58000.0, 2.0)
            .exposure(ExposureFilter::Between {
                lower: 0.99,
                upper: 1.01,
            })
            .to_adql();

        assert!(adql.contains("Plane.time_exposure >= 0.99"));
        assert!(adql.contains("Plane.time_exposure <= 1.01"));
    }

    #[test]
    fn test_escapes_single_quotes() {
        let adql = CatalogQuery::new().bandpass("J'; DROP").to_adql();
        assert!(adql.contains("'J''; DROP'"));
    }
}
