//! Planning entry points.
//!
//! `optimize` runs the full pipeline: validate, build the travel matrix,
//! construct with cheapest feasible insertion, then improve with sampled local
//! search until the budget or the no-improvement limit is hit.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::config::OptimizationConfig;
use crate::constraints::{RouteSchedule, stop_cost};
use crate::construction::{Rejection, construct};
use crate::error::PlanningError;
use crate::local_search::{SearchStats, improve};
use crate::model::{Job, Technician};
use crate::osrm::{OsrmClient, OsrmConfig};
use crate::plan::{
    Diagnostics, PlannedStop, RoutePlan, TechnicianRoute, UnassignedJob, UnassignedReason,
};
use crate::problem::{DispatchProblem, TechnicianSeed, WorkingPlan};
use crate::traits::DistanceMatrixProvider;

/// Plan `jobs` across `technicians`.
///
/// Uses the road-network service when `config.use_external_distance` is set
/// and an endpoint is configured; otherwise great-circle estimates.
pub fn optimize(
    technicians: &[Technician],
    jobs: &[Job],
    config: &OptimizationConfig,
) -> Result<RoutePlan, PlanningError> {
    let road_network = road_network_client(config);
    optimize_with_provider(
        technicians,
        jobs,
        config,
        road_network
            .as_ref()
            .map(|client| client as &dyn DistanceMatrixProvider),
    )
}

/// Same as [`optimize`] with a caller-supplied road-network backend.
/// Failures of the backend degrade to great-circle estimates.
#[instrument(skip_all, fields(technicians = technicians.len(), jobs = jobs.len()))]
pub fn optimize_with_provider(
    technicians: &[Technician],
    jobs: &[Job],
    config: &OptimizationConfig,
    road_network: Option<&dyn DistanceMatrixProvider>,
) -> Result<RoutePlan, PlanningError> {
    let started = Instant::now();
    validate_config(config)?;
    validate_technicians(technicians)?;
    validate_jobs(jobs, "jobs")?;

    let plannable: Vec<Job> = jobs
        .iter()
        .filter(|job| {
            let keep = job.status.is_plannable();
            if !keep {
                debug!(job = %job.id, status = ?job.status, "skipping job that is not plannable");
            }
            keep
        })
        .cloned()
        .collect();

    let seeds = technicians
        .iter()
        .cloned()
        .map(TechnicianSeed::fresh)
        .collect();
    let problem = DispatchProblem::build(seeds, plannable, config, road_network);
    let mut plan = WorkingPlan::empty(&problem);

    let queue = (0..problem.jobs.len()).collect();
    let prior = vec![None; problem.jobs.len()];
    let rejections = construct(&problem, &mut plan, queue, &prior);

    let deadline = started + Duration::from_millis(config.time_budget_ms);
    let stats = improve(&problem, &mut plan, deadline, config.seed);

    let route_plan = assemble(&problem, &plan, rejections, stats);
    log_summary(&route_plan, started);
    Ok(route_plan)
}

pub(crate) fn road_network_client(config: &OptimizationConfig) -> Option<OsrmClient> {
    if !config.use_external_distance {
        return None;
    }
    let endpoint = config.distance_service_endpoint.as_ref()?;
    let client = OsrmClient::new(OsrmConfig {
        base_url: endpoint.clone(),
        profile: config.distance_service_profile.clone(),
        timeout_ms: config.distance_service_timeout_ms,
    });
    match client {
        Ok(client) => Some(client),
        Err(err) => {
            tracing::warn!(error = %err, "could not build distance service client");
            None
        }
    }
}

pub(crate) fn log_summary(plan: &RoutePlan, started: Instant) {
    info!(
        assigned = plan.assigned_job_count(),
        unassigned = plan.unassigned.len(),
        emergencies_unplaced = plan.diagnostics.unassignable_emergencies.len(),
        cost = plan.total_cost,
        approximate = plan.diagnostics.approximate_distances,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "route plan ready"
    );
}

pub(crate) fn validate_config(config: &OptimizationConfig) -> Result<(), PlanningError> {
    config.validate()
}

pub(crate) fn validate_technicians(technicians: &[Technician]) -> Result<(), PlanningError> {
    let mut seen = HashSet::new();
    for technician in technicians {
        let field = |name: &str| format!("technicians[{}].{}", technician.id, name);
        if technician.id.as_str().is_empty() {
            return Err(PlanningError::invalid("technicians[].id", "must not be empty"));
        }
        if !seen.insert(&technician.id) {
            return Err(PlanningError::invalid(field("id"), "duplicate technician id"));
        }
        if !technician.start.is_valid() {
            return Err(PlanningError::invalid(field("start"), "coordinates out of range"));
        }
        if technician.capacity < 0 {
            return Err(PlanningError::invalid(field("capacity"), "must not be negative"));
        }
        if technician.current_load < 0 {
            return Err(PlanningError::invalid(field("current_load"), "must not be negative"));
        }
        if technician.shift.start > technician.shift.end {
            return Err(PlanningError::invalid(field("shift"), "shift ends before it starts"));
        }
    }
    Ok(())
}

pub(crate) fn validate_jobs(jobs: &[Job], list: &str) -> Result<(), PlanningError> {
    let mut seen = HashSet::new();
    for job in jobs {
        let field = |name: &str| format!("{}[{}].{}", list, job.id, name);
        if job.id.as_str().is_empty() {
            return Err(PlanningError::invalid(format!("{list}[].id"), "must not be empty"));
        }
        if !seen.insert(&job.id) {
            return Err(PlanningError::invalid(field("id"), "duplicate job id"));
        }
        if !job.location.is_valid() {
            return Err(PlanningError::invalid(field("location"), "coordinates out of range"));
        }
        if job.service_seconds < 0 {
            return Err(PlanningError::invalid(field("service_seconds"), "must not be negative"));
        }
        if job.window.is_inverted() {
            return Err(PlanningError::invalid(
                field("window"),
                "earliest start is after latest start",
            ));
        }
        if !job.priority.is_finite() || job.priority < 0.0 {
            return Err(PlanningError::invalid(field("priority"), "must be a non-negative number"));
        }
        if job.load < 0 {
            return Err(PlanningError::invalid(field("load"), "must not be negative"));
        }
    }
    Ok(())
}

/// Turn the working state into the caller-facing plan.
pub(crate) fn assemble(
    problem: &DispatchProblem<'_>,
    plan: &WorkingPlan,
    rejections: Vec<Rejection>,
    search: SearchStats,
) -> RoutePlan {
    let config = problem.config;
    let routes: Vec<TechnicianRoute> = problem
        .technicians
        .iter()
        .zip(&plan.schedules)
        .map(|(slot, schedule)| {
            let mut route = TechnicianRoute {
                technician_id: slot.technician.id.clone(),
                stops: Vec::with_capacity(slot.frozen.len() + schedule.stops.len()),
                travel_seconds: 0,
                distance_km: 0.0,
                lateness_seconds: 0,
                load: 0,
                cost: 0.0,
            };
            for stop in &slot.frozen {
                route.travel_seconds += stop.travel_seconds;
                route.distance_km += stop.distance_km;
                route.lateness_seconds += stop.lateness_seconds;
                route.load += stop.job.load;
                route.cost += stop_cost(config, &stop.job, stop.travel_seconds, stop.lateness_seconds);
                route.stops.push(stop.clone());
            }
            append_schedule(problem, schedule, &mut route);
            route
        })
        .collect();

    let mut unassignable_emergencies = Vec::new();
    let unassigned = rejections
        .into_iter()
        .map(|rejection| {
            let job = problem.jobs[rejection.job].clone();
            let reason = if rejection.emergency {
                unassignable_emergencies.push(job.id.clone());
                UnassignedReason::UnassignableEmergency(rejection.reason)
            } else {
                UnassignedReason::Infeasible(rejection.reason)
            };
            UnassignedJob { job, reason }
        })
        .collect();

    RoutePlan {
        total_cost: routes.iter().map(|route| route.cost).sum(),
        total_travel_seconds: routes.iter().map(|route| route.travel_seconds).sum(),
        total_distance_km: routes.iter().map(|route| route.distance_km).sum(),
        total_lateness_seconds: routes.iter().map(|route| route.lateness_seconds).sum(),
        routes,
        unassigned,
        diagnostics: Diagnostics {
            approximate_distances: problem.approximate,
            distance_warning: problem.distance_warning.clone(),
            no_technicians: problem.technicians.is_empty(),
            unassignable_emergencies,
            orphaned_started_jobs: Vec::new(),
            search,
        },
    }
}

fn append_schedule(
    problem: &DispatchProblem<'_>,
    schedule: &RouteSchedule,
    route: &mut TechnicianRoute,
) {
    for timing in &schedule.stops {
        let job = &problem.jobs[timing.job];
        route.stops.push(PlannedStop {
            job: job.clone(),
            reached_at: timing.reached_at,
            arrival: timing.arrival,
            departure: timing.departure,
            travel_seconds: timing.travel_seconds,
            distance_km: timing.distance_km,
            wait_seconds: timing.wait_seconds,
            lateness_seconds: timing.lateness_seconds,
            slack: job.window.slack(timing.arrival),
            frozen: false,
        });
    }
    route.travel_seconds += schedule.travel_seconds;
    route.distance_km += schedule.distance_km;
    route.lateness_seconds += schedule.lateness_seconds;
    route.load += schedule.load;
    route.cost += schedule.cost;
}
