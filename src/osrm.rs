//! OSRM HTTP adapter for road-network travel matrices.

use std::time::Duration;

use serde::Deserialize;

use crate::error::DistanceError;
use crate::model::Location;
use crate::traits::{DistanceMatrixProvider, TravelMatrix};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_ms: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, DistanceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, locations: &[Location]) -> String {
        let coords = locations
            .iter()
            .map(|location| format!("{:.6},{:.6}", location.lng, location.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=duration,distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[Location]) -> Result<TravelMatrix, DistanceError> {
        if locations.is_empty() {
            return Ok(TravelMatrix::default());
        }

        let body = self
            .client
            .get(self.table_url(locations))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>())?;

        body.into_matrix(locations.len())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    fn into_matrix(self, expected: usize) -> Result<TravelMatrix, DistanceError> {
        if self.code != "Ok" {
            return Err(DistanceError::Service(self.code));
        }

        let durations = convert_rows(self.durations.unwrap_or_default(), expected, |secs| {
            secs.round() as i64
        })?;
        // Distances are optional on older servers; meters to km.
        let distances_km = match self.distances {
            Some(rows) => convert_rows(rows, expected, |meters| meters / 1000.0)?,
            None => vec![vec![0.0; expected]; expected],
        };

        Ok(TravelMatrix {
            durations,
            distances_km,
        })
    }
}

fn convert_rows<T>(
    rows: Vec<Vec<Option<f64>>>,
    expected: usize,
    convert: impl Fn(f64) -> T,
) -> Result<Vec<Vec<T>>, DistanceError> {
    let cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.len() != expected || rows.iter().any(|row| row.len() != expected) {
        return Err(DistanceError::Dimension {
            rows: rows.len(),
            cols,
            expected,
        });
    }

    rows.into_iter()
        .enumerate()
        .map(|(from, row)| {
            row.into_iter()
                .enumerate()
                .map(|(to, value)| {
                    value
                        .map(&convert)
                        .ok_or(DistanceError::Unreachable { from, to })
                })
                .collect::<Result<Vec<T>, DistanceError>>()
        })
        .collect()
}
