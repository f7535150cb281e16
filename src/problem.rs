//! Per-call planning snapshot shared by the construction and search phases.

use std::collections::BTreeSet;

use crate::config::OptimizationConfig;
use crate::constraints::RouteSchedule;
use crate::matrix::{LocationIndex, build_travel_matrix};
use crate::model::{Job, Seconds, Technician, capability_set};
use crate::plan::PlannedStop;
use crate::traits::{DistanceMatrixProvider, TravelMatrix};

/// A technician plus the frozen part of its day.
#[derive(Debug, Clone)]
pub(crate) struct TechnicianSeed {
    pub technician: Technician,
    pub frozen: Vec<PlannedStop>,
}

impl TechnicianSeed {
    pub fn fresh(technician: Technician) -> Self {
        Self {
            technician,
            frozen: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TechnicianSlot {
    pub technician: Technician,
    pub capabilities: BTreeSet<String>,
    /// Matrix position the movable part of the route starts from.
    pub start_location: usize,
    /// Earliest time the movable part may start.
    pub available_from: Seconds,
    /// Load still available to movable stops.
    pub capacity: i32,
    pub frozen: Vec<PlannedStop>,
}

impl TechnicianSlot {
    pub fn is_available(&self) -> bool {
        self.technician.status.is_available()
    }

    pub fn can_serve(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }
}

/// Immutable inputs for one planning call. Technicians are ordered by id so
/// index order is the tie-break order.
pub(crate) struct DispatchProblem<'a> {
    pub config: &'a OptimizationConfig,
    pub jobs: Vec<Job>,
    pub job_location: Vec<usize>,
    pub job_capabilities: Vec<BTreeSet<String>>,
    pub critical: Vec<bool>,
    pub technicians: Vec<TechnicianSlot>,
    pub matrix: TravelMatrix,
    pub approximate: bool,
    pub distance_warning: Option<String>,
}

impl<'a> DispatchProblem<'a> {
    pub fn build(
        mut seeds: Vec<TechnicianSeed>,
        jobs: Vec<Job>,
        config: &'a OptimizationConfig,
        road_network: Option<&dyn DistanceMatrixProvider>,
    ) -> Self {
        seeds.sort_by(|a, b| a.technician.id.cmp(&b.technician.id));

        let mut index = LocationIndex::default();
        let mut start_locations = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let start = seed
                .frozen
                .last()
                .map(|stop| stop.job.location)
                .unwrap_or(seed.technician.start);
            index.insert(seed.technician.start);
            for stop in &seed.frozen {
                index.insert(stop.job.location);
            }
            start_locations.push(index.insert(start));
        }
        let job_location: Vec<usize> = jobs.iter().map(|job| index.insert(job.location)).collect();

        let outcome = build_travel_matrix(index.locations(), road_network, config.speed_kmh());

        let technicians = seeds
            .into_iter()
            .zip(start_locations)
            .map(|(seed, start_location)| {
                let technician = seed.technician;
                let frozen_departure = seed.frozen.last().map(|stop| stop.departure);
                let available_from = [
                    Some(technician.shift.start),
                    config.planning_start,
                    frozen_departure,
                ]
                .into_iter()
                .flatten()
                .max()
                .unwrap_or(technician.shift.start);
                let frozen_load: i32 = seed.frozen.iter().map(|stop| stop.job.load).sum();

                TechnicianSlot {
                    capabilities: capability_set(&technician.capabilities),
                    start_location,
                    available_from,
                    capacity: (technician.remaining_capacity() - frozen_load).max(0),
                    frozen: seed.frozen,
                    technician,
                }
            })
            .collect();

        Self {
            config,
            job_capabilities: jobs
                .iter()
                .map(|job| capability_set(&job.required_capabilities))
                .collect(),
            critical: jobs
                .iter()
                .map(|job| config.is_critical(job.priority))
                .collect(),
            job_location,
            jobs,
            technicians,
            matrix: outcome.matrix,
            approximate: outcome.approximate,
            distance_warning: outcome.warning,
        }
    }

    /// Does any technician hold every capability the job requires?
    pub fn has_qualified_technician(&self, job: usize) -> bool {
        self.technicians
            .iter()
            .any(|slot| slot.can_serve(&self.job_capabilities[job]))
    }

    /// Window tightness used for ordering: narrower first.
    pub fn window_width(&self, job: usize) -> Seconds {
        self.jobs[job].window.width()
    }
}

/// Mutable assignment state: the movable part of every technician's route.
#[derive(Debug, Clone)]
pub(crate) struct WorkingPlan {
    pub routes: Vec<Vec<usize>>,
    pub schedules: Vec<RouteSchedule>,
    /// Jobs whose hard window was waived to place an emergency.
    pub relaxed: Vec<bool>,
}

impl WorkingPlan {
    pub fn empty(problem: &DispatchProblem<'_>) -> Self {
        Self {
            routes: vec![Vec::new(); problem.technicians.len()],
            schedules: vec![RouteSchedule::default(); problem.technicians.len()],
            relaxed: vec![false; problem.jobs.len()],
        }
    }

    pub fn set_route(&mut self, technician: usize, sequence: Vec<usize>, schedule: RouteSchedule) {
        self.routes[technician] = sequence;
        self.schedules[technician] = schedule;
    }

    pub fn cost(&self) -> f64 {
        self.schedules.iter().map(|schedule| schedule.cost).sum()
    }

    pub fn lateness(&self) -> Seconds {
        self.schedules
            .iter()
            .map(|schedule| schedule.lateness_seconds)
            .sum()
    }
}
