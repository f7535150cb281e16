//! Seams for pluggable backends.

use crate::error::DistanceError;
use crate::model::{Location, Seconds};

/// Pairwise travel times and distances, indexed by location position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TravelMatrix {
    pub durations: Vec<Vec<Seconds>>,
    pub distances_km: Vec<Vec<f64>>,
}

impl TravelMatrix {
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn duration(&self, from: usize, to: usize) -> Seconds {
        self.durations[from][to]
    }

    pub fn distance_km(&self, from: usize, to: usize) -> f64 {
        self.distances_km[from][to]
    }

    /// Square and sized for `expected` locations.
    pub fn is_complete_for(&self, expected: usize) -> bool {
        self.durations.len() == expected
            && self.distances_km.len() == expected
            && self.durations.iter().all(|row| row.len() == expected)
            && self.distances_km.iter().all(|row| row.len() == expected)
    }
}

/// Provides a distance/time matrix for a set of locations.
///
/// The matrix is indexed by the provided location order. Implementations
/// that depend on external services report failures instead of returning a
/// partial matrix; the caller decides how to degrade.
pub trait DistanceMatrixProvider: Sync {
    fn matrix_for(&self, locations: &[Location]) -> Result<TravelMatrix, DistanceError>;
}

impl<T: DistanceMatrixProvider + ?Sized> DistanceMatrixProvider for &T {
    fn matrix_for(&self, locations: &[Location]) -> Result<TravelMatrix, DistanceError> {
        (**self).matrix_for(locations)
    }
}
