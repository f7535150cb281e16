//! Planning configuration.

use serde::{Deserialize, Serialize};

use crate::error::PlanningError;
use crate::model::Seconds;

/// Named travel-speed assumptions for the great-circle estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedProfile {
    Urban,
    Suburban,
    Highway,
    RushHour,
}

impl SpeedProfile {
    pub fn kmh(self) -> f64 {
        match self {
            SpeedProfile::Urban => 30.0,
            SpeedProfile::Suburban => 45.0,
            SpeedProfile::Highway => 65.0,
            SpeedProfile::RushHour => 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Wall-clock budget for the whole call.
    pub time_budget_ms: u64,
    /// Moves sampled per local-search iteration.
    pub max_candidate_sample: usize,
    /// Jobs at or above this priority are emergencies.
    pub critical_priority_threshold: f64,
    pub use_external_distance: bool,
    pub distance_service_endpoint: Option<String>,
    pub distance_service_timeout_ms: u64,
    pub distance_service_profile: String,
    pub average_speed_kmh: f64,
    /// Overrides `average_speed_kmh` when set.
    pub speed_profile: Option<SpeedProfile>,
    pub seed: u64,
    pub max_non_improving_iterations: usize,
    pub max_iterations: usize,
    pub travel_cost_per_second: f64,
    /// Multiplied by the job priority (at least 1).
    pub lateness_penalty_per_second: f64,
    pub high_priority_threshold: f64,
    /// Subtracted (times priority) for each on-time high-priority job.
    pub priority_bonus: f64,
    /// Added to the insertion cost when re-optimization moves a job to
    /// another technician.
    pub reassignment_penalty: f64,
    pub reoptimize_budget_fraction: f64,
    /// Current clock; non-frozen work never starts earlier.
    pub planning_start: Option<Seconds>,
    pub parallel_move_evaluation: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 1000,
            max_candidate_sample: 30,
            critical_priority_threshold: 9.0,
            use_external_distance: false,
            distance_service_endpoint: None,
            distance_service_timeout_ms: 2000,
            distance_service_profile: "driving".to_string(),
            average_speed_kmh: 40.0,
            speed_profile: None,
            seed: 0x5EED,
            max_non_improving_iterations: 50,
            max_iterations: 10_000,
            travel_cost_per_second: 1.0,
            lateness_penalty_per_second: 2.0,
            high_priority_threshold: 3.0,
            priority_bonus: 60.0,
            reassignment_penalty: 300.0, // ~5 minutes equivalent
            reoptimize_budget_fraction: 0.25,
            planning_start: None,
            parallel_move_evaluation: true,
        }
    }
}

impl OptimizationConfig {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_profile
            .map(SpeedProfile::kmh)
            .unwrap_or(self.average_speed_kmh)
    }

    pub fn is_critical(&self, priority: f64) -> bool {
        priority >= self.critical_priority_threshold
    }

    pub fn validate(&self) -> Result<(), PlanningError> {
        let speed = self.speed_kmh();
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlanningError::invalid(
                "config.average_speed_kmh",
                "must be a positive number",
            ));
        }
        if !self.critical_priority_threshold.is_finite() {
            return Err(PlanningError::invalid(
                "config.critical_priority_threshold",
                "must be finite",
            ));
        }
        let weights = [
            ("config.travel_cost_per_second", self.travel_cost_per_second),
            (
                "config.lateness_penalty_per_second",
                self.lateness_penalty_per_second,
            ),
            ("config.priority_bonus", self.priority_bonus),
            ("config.reassignment_penalty", self.reassignment_penalty),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanningError::invalid(field, "must be a non-negative number"));
            }
        }
        if !(0.0..=1.0).contains(&self.reoptimize_budget_fraction) {
            return Err(PlanningError::invalid(
                "config.reoptimize_budget_fraction",
                "must be within [0, 1]",
            ));
        }
        if self.use_external_distance && self.distance_service_timeout_ms == 0 {
            return Err(PlanningError::invalid(
                "config.distance_service_timeout_ms",
                "must be positive when external distance is enabled",
            ));
        }
        Ok(())
    }
}
