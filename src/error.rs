//! Error types.
//!
//! Only invalid input aborts a planning call. Infeasible jobs are reported in
//! the plan, and distance-service failures degrade to the great-circle model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("invalid input at {field}: {reason}")]
    InvalidInput { field: String, reason: String },
}

impl PlanningError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanningError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            PlanningError::InvalidInput { field, .. } => field,
        }
    }
}

/// Failure of an external distance backend.
#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("distance service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("distance service returned code {0}")]
    Service(String),

    #[error("distance service returned a {rows}x{cols} matrix for {expected} locations")]
    Dimension {
        rows: usize,
        cols: usize,
        expected: usize,
    },

    #[error("distance service has no route between locations {from} and {to}")]
    Unreachable { from: usize, to: usize },
}
