//! Location indexing and matrix selection with great-circle fallback.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::haversine::HaversineMatrix;
use crate::model::Location;
use crate::traits::{DistanceMatrixProvider, TravelMatrix};

/// Unique locations of a planning cycle and their matrix positions.
///
/// Coordinates equal to six decimals (~0.1 m) share a position.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    locations: Vec<Location>,
    positions: HashMap<(i64, i64), usize>,
}

impl LocationIndex {
    pub fn build(locations: impl IntoIterator<Item = Location>) -> Self {
        let mut index = Self::default();
        for location in locations {
            index.insert(location);
        }
        index
    }

    /// Position of `location`, adding it if unseen.
    pub fn insert(&mut self, location: Location) -> usize {
        let next = self.locations.len();
        let position = *self.positions.entry(location_key(location)).or_insert(next);
        if position == next {
            self.locations.push(location);
        }
        position
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn position(&self, location: Location) -> Option<usize> {
        self.positions.get(&location_key(location)).copied()
    }
}

/// Microdegree grid cell. Integer keys put `-0.0` and `0.0` together.
fn location_key(location: Location) -> (i64, i64) {
    (microdegrees(location.lat), microdegrees(location.lng))
}

fn microdegrees(degrees: f64) -> i64 {
    (degrees * 1e6).round() as i64
}

/// Matrix plus how it was obtained.
#[derive(Debug, Clone)]
pub struct MatrixOutcome {
    pub matrix: TravelMatrix,
    /// True when great-circle estimates were used.
    pub approximate: bool,
    /// Why the road-network backend was not used, if it was requested.
    pub warning: Option<String>,
}

/// Build the travel matrix for `locations`.
///
/// With a road-network backend the external matrix is used when it succeeds
/// and has the right shape. Any failure degrades to the haversine estimate.
/// Never fails.
pub fn build_travel_matrix(
    locations: &[Location],
    road_network: Option<&dyn DistanceMatrixProvider>,
    speed_kmh: f64,
) -> MatrixOutcome {
    let fallback = HaversineMatrix::new(speed_kmh);

    let Some(provider) = road_network else {
        debug!(locations = locations.len(), "using great-circle travel matrix");
        return MatrixOutcome {
            matrix: fallback.compute(locations),
            approximate: true,
            warning: None,
        };
    };

    let warning = match provider.matrix_for(locations) {
        Ok(matrix) if matrix.is_complete_for(locations.len()) => {
            debug!(locations = locations.len(), "using road-network travel matrix");
            return MatrixOutcome {
                matrix,
                approximate: false,
                warning: None,
            };
        }
        Ok(matrix) => format!(
            "distance service returned {} rows for {} locations",
            matrix.len(),
            locations.len()
        ),
        Err(err) => err.to_string(),
    };

    warn!(%warning, "distance service unavailable, falling back to great-circle estimate");
    MatrixOutcome {
        matrix: fallback.compute(locations),
        approximate: true,
        warning: Some(warning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DistanceError;

    struct Failing;

    impl DistanceMatrixProvider for Failing {
        fn matrix_for(&self, _locations: &[Location]) -> Result<TravelMatrix, DistanceError> {
            Err(DistanceError::Service("NoRoute".to_string()))
        }
    }

    struct Truncated;

    impl DistanceMatrixProvider for Truncated {
        fn matrix_for(&self, _locations: &[Location]) -> Result<TravelMatrix, DistanceError> {
            Ok(TravelMatrix {
                durations: vec![vec![0]],
                distances_km: vec![vec![0.0]],
            })
        }
    }

    fn points() -> Vec<Location> {
        vec![Location::new(32.77, -96.79), Location::new(32.95, -96.82)]
    }

    #[test]
    fn dedupes_within_epsilon() {
        let index = LocationIndex::build([
            Location::new(32.7767, -96.7970),
            Location::new(32.77670001, -96.79700001),
            Location::new(32.9545, -96.8200),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.position(Location::new(32.7767, -96.797)), Some(0));
        assert_eq!(index.position(Location::new(32.9545, -96.82)), Some(1));
        assert_eq!(index.position(Location::new(0.0, 0.0)), None);
    }

    #[test]
    fn signed_zero_and_rounding_neighbours_share_a_position() {
        let index = LocationIndex::build([
            Location::new(-0.0, 0.0),
            Location::new(0.0, -0.0),
            Location::new(1.0000001, 2.0),
            Location::new(0.9999999, 2.0),
        ]);
        assert_eq!(index.position(Location::new(0.0, 0.0)), Some(0));
        assert_eq!(index.position(Location::new(1.0, 2.0)), Some(1));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn without_backend_is_approximate() {
        let outcome = build_travel_matrix(&points(), None, 40.0);
        assert!(outcome.approximate);
        assert!(outcome.warning.is_none());
        assert!(outcome.matrix.duration(0, 1) > 0);
    }

    #[test]
    fn failing_backend_falls_back() {
        let outcome = build_travel_matrix(&points(), Some(&Failing), 40.0);
        assert!(outcome.approximate);
        assert!(outcome.warning.unwrap().contains("NoRoute"));
        assert_eq!(outcome.matrix, HaversineMatrix::new(40.0).compute(&points()));
    }

    #[test]
    fn misshapen_backend_matrix_falls_back() {
        let outcome = build_travel_matrix(&points(), Some(&Truncated), 40.0);
        assert!(outcome.approximate);
        assert!(outcome.matrix.is_complete_for(2));
    }

    #[test]
    fn working_backend_is_exact() {
        let outcome = build_travel_matrix(&points(), Some(&HaversineMatrix::new(60.0)), 40.0);
        assert!(!outcome.approximate);
        assert_eq!(outcome.matrix, HaversineMatrix::new(60.0).compute(&points()));
    }
}
