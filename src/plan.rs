//! Route plan returned to the caller.
//!
//! A plan carries point-in-time snapshots of the jobs it schedules so it can
//! be handed back to re-optimization as-is. It is proposed, never applied:
//! the system of record decides what to persist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constraints::Infeasibility;
use crate::local_search::SearchStats;
use crate::model::{Job, JobId, JobStatus, Seconds, TechnicianId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStop {
    pub job: Job,
    /// When the technician gets to the site.
    pub reached_at: Seconds,
    /// Service start; never before the window's earliest start.
    pub arrival: Seconds,
    pub departure: Seconds,
    pub travel_seconds: Seconds,
    pub distance_km: f64,
    pub wait_seconds: Seconds,
    pub lateness_seconds: Seconds,
    /// Latest start minus arrival; `None` for open-ended windows.
    pub slack: Option<Seconds>,
    /// Started or completed work that re-optimization must not move.
    pub frozen: bool,
}

impl PlannedStop {
    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianRoute {
    pub technician_id: TechnicianId,
    pub stops: Vec<PlannedStop>,
    pub travel_seconds: Seconds,
    pub distance_km: f64,
    pub lateness_seconds: Seconds,
    pub load: i32,
    pub cost: f64,
}

impl TechnicianRoute {
    pub fn job_ids(&self) -> Vec<&JobId> {
        self.stops.iter().map(PlannedStop::job_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "constraint", rename_all = "snake_case")]
pub enum UnassignedReason {
    /// No technician can take the job; expected and common.
    Infeasible(Infeasibility),
    /// A critical job could not be placed even with relaxed slack. Needs a
    /// human dispatcher.
    UnassignableEmergency(Infeasibility),
}

impl UnassignedReason {
    pub fn constraint(&self) -> Infeasibility {
        match self {
            UnassignedReason::Infeasible(reason) | UnassignedReason::UnassignableEmergency(reason) => {
                *reason
            }
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, UnassignedReason::UnassignableEmergency(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedJob {
    pub job: Job,
    pub reason: UnassignedReason,
}

impl UnassignedJob {
    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Travel times come from the great-circle estimate.
    pub approximate_distances: bool,
    /// Why the road-network service was not used, when it was requested.
    pub distance_warning: Option<String>,
    pub no_technicians: bool,
    pub unassignable_emergencies: Vec<JobId>,
    /// Started jobs from the prior plan whose technician left the roster.
    /// They appear in neither routes nor unassigned and need a dispatcher.
    #[serde(default)]
    pub orphaned_started_jobs: Vec<JobId>,
    pub search: SearchStats,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePlan {
    pub routes: Vec<TechnicianRoute>,
    pub unassigned: Vec<UnassignedJob>,
    pub total_cost: f64,
    pub total_travel_seconds: Seconds,
    pub total_distance_km: f64,
    pub total_lateness_seconds: Seconds,
    pub diagnostics: Diagnostics,
}

/// Arrival change for one job between two plans, for customer ETA updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalChange {
    pub job_id: JobId,
    pub previous_technician: Option<TechnicianId>,
    pub technician: Option<TechnicianId>,
    pub previous_arrival: Option<Seconds>,
    pub arrival: Option<Seconds>,
    /// New minus previous arrival when both exist.
    pub delta_seconds: Option<Seconds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsEstimate {
    pub optimized_km: f64,
    pub naive_estimate_km: f64,
    pub savings_km: f64,
    pub savings_pct: f64,
    pub total_travel_minutes: i64,
    pub jobs_assigned: usize,
}

/// Default naive-routing overhead used by [`RoutePlan::savings_estimate`].
pub const NAIVE_ROUTING_FACTOR: f64 = 1.4;

impl RoutePlan {
    pub fn route_for(&self, technician: &TechnicianId) -> Option<&TechnicianRoute> {
        self.routes
            .iter()
            .find(|route| &route.technician_id == technician)
    }

    /// Technician and stop for an assigned job.
    pub fn stop_for(&self, job: &JobId) -> Option<(&TechnicianId, &PlannedStop)> {
        self.routes.iter().find_map(|route| {
            route
                .stops
                .iter()
                .find(|stop| stop.job_id() == job)
                .map(|stop| (&route.technician_id, stop))
        })
    }

    pub fn is_assigned(&self, job: &JobId) -> bool {
        self.stop_for(job).is_some()
    }

    pub fn assigned_job_count(&self) -> usize {
        self.routes.iter().map(|route| route.stops.len()).sum()
    }

    pub fn unassigned_reason(&self, job: &JobId) -> Option<UnassignedReason> {
        self.unassigned
            .iter()
            .find(|unassigned| unassigned.job_id() == job)
            .map(|unassigned| unassigned.reason)
    }

    /// Per-job arrival changes relative to `previous`, in route order then
    /// unassigned order. Jobs whose technician and arrival are unchanged are
    /// omitted.
    pub fn arrival_changes(&self, previous: &RoutePlan) -> Vec<ArrivalChange> {
        let mut before: HashMap<&JobId, (&TechnicianId, Seconds)> = HashMap::new();
        for route in &previous.routes {
            for stop in &route.stops {
                before.insert(stop.job_id(), (&route.technician_id, stop.arrival));
            }
        }

        let mut changes = Vec::new();
        for route in &self.routes {
            for stop in &route.stops {
                let prior = before.remove(stop.job_id());
                if let Some((technician, arrival)) = prior {
                    if technician == &route.technician_id && arrival == stop.arrival {
                        continue;
                    }
                }
                changes.push(ArrivalChange {
                    job_id: stop.job_id().clone(),
                    previous_technician: prior.map(|(technician, _)| technician.clone()),
                    technician: Some(route.technician_id.clone()),
                    previous_arrival: prior.map(|(_, arrival)| arrival),
                    arrival: Some(stop.arrival),
                    delta_seconds: prior.map(|(_, arrival)| stop.arrival - arrival),
                });
            }
        }

        // Jobs that dropped out of the schedule.
        for route in &previous.routes {
            for stop in &route.stops {
                if before.contains_key(stop.job_id()) {
                    changes.push(ArrivalChange {
                        job_id: stop.job_id().clone(),
                        previous_technician: Some(route.technician_id.clone()),
                        technician: None,
                        previous_arrival: Some(stop.arrival),
                        arrival: None,
                        delta_seconds: None,
                    });
                }
            }
        }

        changes
    }

    /// Status each job should move to if the collaborator applies this plan.
    /// Frozen stops keep their status.
    pub fn proposed_statuses(&self) -> Vec<(JobId, JobStatus)> {
        let assigned = self
            .routes
            .iter()
            .flat_map(|route| route.stops.iter())
            .filter(|stop| !stop.frozen)
            .map(|stop| (stop.job_id().clone(), JobStatus::Assigned));
        let pending = self
            .unassigned
            .iter()
            .map(|unassigned| (unassigned.job_id().clone(), JobStatus::Pending));
        assigned.chain(pending).collect()
    }

    /// Travel compared against a naive assignment `naive_factor` times longer.
    pub fn savings_estimate(&self, naive_factor: f64) -> SavingsEstimate {
        let optimized_km = self.total_distance_km;
        let naive_estimate_km = optimized_km * naive_factor;
        let savings_pct = if naive_estimate_km > 0.0 {
            round1((1.0 - optimized_km / naive_estimate_km) * 100.0)
        } else {
            0.0
        };

        SavingsEstimate {
            optimized_km: round1(optimized_km),
            naive_estimate_km: round1(naive_estimate_km),
            savings_km: round1(naive_estimate_km - optimized_km),
            savings_pct,
            total_travel_minutes: self.total_travel_seconds / 60,
            jobs_assigned: self.assigned_job_count(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
