//! dispatch-planner
//!
//! Assigns field-service jobs to technicians and orders each technician's
//! day: cheapest feasible insertion, then sampled local search, with
//! emergencies placed first and mid-day re-optimization that never moves
//! started work.

pub mod config;
pub mod constraints;
mod construction;
pub mod error;
pub mod haversine;
pub mod local_search;
pub mod matrix;
pub mod model;
pub mod osrm;
pub mod plan;
mod problem;
pub mod reoptimize;
pub mod solver;
pub mod traits;

pub use config::{OptimizationConfig, SpeedProfile};
pub use constraints::Infeasibility;
pub use error::{DistanceError, PlanningError};
pub use model::{
    Job, JobId, JobStatus, Location, Seconds, ServiceType, Shift, Technician, TechnicianId,
    TechnicianStatus, TimeWindow,
};
pub use plan::{
    ArrivalChange, Diagnostics, NAIVE_ROUTING_FACTOR, PlannedStop, RoutePlan, SavingsEstimate,
    TechnicianRoute, UnassignedJob, UnassignedReason,
};
pub use reoptimize::{reoptimize, reoptimize_with_provider};
pub use solver::{optimize, optimize_with_provider};
pub use traits::{DistanceMatrixProvider, TravelMatrix};
