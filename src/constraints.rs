//! Feasibility checks and route schedule evaluation.
//!
//! A route is simulated stop by stop from the technician's start. Arriving
//! before a job's earliest start means waiting; arriving after its latest
//! start is lateness, which is penalized unless the window is hard.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OptimizationConfig;
use crate::model::{Job, Seconds};
use crate::problem::DispatchProblem;

/// Why a job cannot go on a technician's route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Infeasibility {
    CapabilityMismatch,
    ShiftOverflow,
    HardWindowMissed,
    CapacityExceeded,
}

impl Infeasibility {
    /// How far the checks got before failing; used to pick the most
    /// informative reason across technicians.
    pub fn depth(self) -> u8 {
        match self {
            Infeasibility::CapabilityMismatch => 0,
            Infeasibility::ShiftOverflow => 1,
            Infeasibility::HardWindowMissed => 2,
            Infeasibility::CapacityExceeded => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Infeasibility::CapabilityMismatch => "capability_mismatch",
            Infeasibility::ShiftOverflow => "shift_overflow",
            Infeasibility::HardWindowMissed => "hard_window_missed",
            Infeasibility::CapacityExceeded => "capacity_exceeded",
        }
    }

    pub fn deeper(self, other: Infeasibility) -> Infeasibility {
        if other.depth() > self.depth() { other } else { self }
    }
}

impl fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing of one simulated stop. `job` indexes the problem's job list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StopTiming {
    pub job: usize,
    pub reached_at: Seconds,
    /// Service start, never before the window's earliest start.
    pub arrival: Seconds,
    pub departure: Seconds,
    pub travel_seconds: Seconds,
    pub distance_km: f64,
    pub wait_seconds: Seconds,
    pub lateness_seconds: Seconds,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct RouteSchedule {
    pub stops: Vec<StopTiming>,
    pub travel_seconds: Seconds,
    pub distance_km: f64,
    pub lateness_seconds: Seconds,
    pub load: i32,
    pub cost: f64,
}

/// Cost contribution of a single stop.
pub fn stop_cost(config: &OptimizationConfig, job: &Job, travel: Seconds, lateness: Seconds) -> f64 {
    let mut cost = travel as f64 * config.travel_cost_per_second;
    if lateness > 0 {
        cost += lateness as f64 * config.lateness_penalty_per_second * job.priority.max(1.0);
    } else if job.priority >= config.high_priority_threshold {
        cost -= config.priority_bonus * job.priority;
    }
    cost
}

/// Hard windows reject lateness. Emergencies have zero tolerance unless
/// their window was relaxed to get them placed.
pub(crate) fn has_hard_window(problem: &DispatchProblem<'_>, relaxed: &[bool], job: usize) -> bool {
    (problem.jobs[job].window.hard || problem.critical[job]) && !relaxed[job]
}

/// Simulate `sequence` on `technician`'s route after its frozen stops.
///
/// Checks run capability, working hours, time windows, then capacity.
pub(crate) fn evaluate_route(
    problem: &DispatchProblem<'_>,
    relaxed: &[bool],
    technician: usize,
    sequence: &[usize],
) -> Result<RouteSchedule, Infeasibility> {
    if sequence.is_empty() {
        return Ok(RouteSchedule::default());
    }

    let slot = &problem.technicians[technician];
    if sequence
        .iter()
        .any(|&job| !slot.can_serve(&problem.job_capabilities[job]))
    {
        return Err(Infeasibility::CapabilityMismatch);
    }
    if !slot.is_available() {
        return Err(Infeasibility::ShiftOverflow);
    }

    let config = problem.config;
    let shift_end = slot.technician.shift.end;
    let mut schedule = RouteSchedule {
        stops: Vec::with_capacity(sequence.len()),
        ..Default::default()
    };
    let mut time = slot.available_from;
    let mut previous = slot.start_location;

    for &job_idx in sequence {
        let job = &problem.jobs[job_idx];
        let location = problem.job_location[job_idx];
        let travel = problem.matrix.duration(previous, location);
        let distance = problem.matrix.distance_km(previous, location);

        let reached_at = time + travel;
        let arrival = job
            .window
            .earliest
            .map_or(reached_at, |earliest| reached_at.max(earliest));
        let departure = arrival + job.service_seconds;
        if departure > shift_end {
            return Err(Infeasibility::ShiftOverflow);
        }

        let lateness = job.window.lateness(arrival);
        if lateness > 0 && has_hard_window(problem, relaxed, job_idx) {
            return Err(Infeasibility::HardWindowMissed);
        }

        schedule.travel_seconds += travel;
        schedule.distance_km += distance;
        schedule.lateness_seconds += lateness;
        schedule.load += job.load;
        schedule.cost += stop_cost(config, job, travel, lateness);
        schedule.stops.push(StopTiming {
            job: job_idx,
            reached_at,
            arrival,
            departure,
            travel_seconds: travel,
            distance_km: distance,
            wait_seconds: arrival - reached_at,
            lateness_seconds: lateness,
        });

        time = departure;
        previous = location;
    }

    if schedule.load > slot.capacity {
        return Err(Infeasibility::CapacityExceeded);
    }

    Ok(schedule)
}

/// Can `job` be inserted at `position` of `technician`'s current sequence?
///
/// Returns the resulting schedule, or the first violated constraint.
pub(crate) fn feasible(
    problem: &DispatchProblem<'_>,
    relaxed: &[bool],
    technician: usize,
    job: usize,
    position: usize,
    sequence: &[usize],
) -> Result<RouteSchedule, Infeasibility> {
    if !problem.technicians[technician].can_serve(&problem.job_capabilities[job]) {
        return Err(Infeasibility::CapabilityMismatch);
    }

    let mut candidate = Vec::with_capacity(sequence.len() + 1);
    candidate.extend_from_slice(&sequence[..position]);
    candidate.push(job);
    candidate.extend_from_slice(&sequence[position..]);

    evaluate_route(problem, relaxed, technician, &candidate)
}
