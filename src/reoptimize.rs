//! Mid-horizon re-optimization.
//!
//! Started work stays where it is. Emergencies are inserted first, seeing only
//! started work, and each technician then gets its remaining pending stops back
//! behind them as a warm start. Whatever no longer fits joins the pool for
//! cheapest insertion with a reassignment penalty, and a shortened
//! local-search pass smooths the result.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{instrument, warn};

use crate::config::OptimizationConfig;
use crate::constraints::evaluate_route;
use crate::construction::construct;
use crate::error::PlanningError;
use crate::local_search::improve;
use crate::model::{Job, JobId, Technician, TechnicianId};
use crate::plan::{PlannedStop, RoutePlan};
use crate::problem::{DispatchProblem, TechnicianSeed, WorkingPlan};
use crate::solver::{
    assemble, log_summary, road_network_client, validate_config, validate_jobs,
    validate_technicians,
};
use crate::traits::DistanceMatrixProvider;

/// Update `existing_plan` for new, removed and started jobs and for changes in
/// the technician roster.
///
/// `frozen_jobs` lists jobs that must not move; jobs whose latest record is
/// in progress or completed are frozen as well. Records in `new_jobs` replace
/// the plan's snapshot of a job with the same id.
pub fn reoptimize(
    existing_plan: &RoutePlan,
    frozen_jobs: &[JobId],
    new_jobs: &[Job],
    removed_job_ids: &[JobId],
    technicians: &[Technician],
    config: &OptimizationConfig,
) -> Result<RoutePlan, PlanningError> {
    let road_network = road_network_client(config);
    reoptimize_with_provider(
        existing_plan,
        frozen_jobs,
        new_jobs,
        removed_job_ids,
        technicians,
        config,
        road_network
            .as_ref()
            .map(|client| client as &dyn DistanceMatrixProvider),
    )
}

/// Same as [`reoptimize`] with a caller-supplied road-network backend.
#[instrument(skip_all, fields(new_jobs = new_jobs.len(), removed = removed_job_ids.len()))]
pub fn reoptimize_with_provider(
    existing_plan: &RoutePlan,
    frozen_jobs: &[JobId],
    new_jobs: &[Job],
    removed_job_ids: &[JobId],
    technicians: &[Technician],
    config: &OptimizationConfig,
    road_network: Option<&dyn DistanceMatrixProvider>,
) -> Result<RoutePlan, PlanningError> {
    let started = Instant::now();
    validate_config(config)?;
    validate_technicians(technicians)?;
    validate_jobs(new_jobs, "new_jobs")?;

    let snapshot = Snapshot::new(existing_plan, frozen_jobs, new_jobs, removed_job_ids, technicians);
    let split = snapshot.split();

    let seeds = technicians
        .iter()
        .map(|technician| TechnicianSeed {
            technician: technician.clone(),
            frozen: split
                .frozen
                .get(&technician.id)
                .cloned()
                .unwrap_or_default(),
        })
        .collect();

    let mut jobs = Vec::new();
    let mut warm: HashMap<TechnicianId, Vec<usize>> = HashMap::new();
    let mut prior_owner = Vec::new();
    for (technician, job) in split.warm {
        warm.entry(technician.clone()).or_default().push(jobs.len());
        prior_owner.push(Some(technician));
        jobs.push(job);
    }
    let mut pool: Vec<usize> = Vec::new();
    for (job, owner) in split.pool {
        pool.push(jobs.len());
        prior_owner.push(owner);
        jobs.push(job);
    }

    let problem = DispatchProblem::build(seeds, jobs, config, road_network);
    let slot_of: HashMap<&TechnicianId, usize> = problem
        .technicians
        .iter()
        .enumerate()
        .map(|(index, slot)| (&slot.technician.id, index))
        .collect();
    let prior: Vec<Option<usize>> = prior_owner
        .iter()
        .map(|owner| owner.as_ref().and_then(|id| slot_of.get(id).copied()))
        .collect();

    let mut plan = WorkingPlan::empty(&problem);
    let (critical, mut pool): (Vec<usize>, Vec<usize>) =
        pool.into_iter().partition(|&job| problem.critical[job]);
    // Emergencies see only started work; warm routes are restored around them.
    let mut rejections = construct(&problem, &mut plan, critical, &prior);

    for (technician, index) in &slot_of {
        let Some(kept) = warm.remove(*technician) else {
            continue;
        };
        let placed = plan.routes[*index].len();
        let mut sequence = plan.routes[*index].clone();
        sequence.extend(kept);
        while sequence.len() > placed {
            match evaluate_route(&problem, &plan.relaxed, *index, &sequence) {
                Ok(schedule) => {
                    plan.set_route(*index, sequence, schedule);
                    break;
                }
                Err(_) => pool.extend(sequence.pop()),
            }
        }
    }
    // Warm routes of technicians no longer on the roster.
    for (_, sequence) in warm {
        pool.extend(sequence);
    }
    pool.sort_unstable();

    rejections.extend(construct(&problem, &mut plan, pool, &prior));

    let budget = config.time_budget_ms as f64 * config.reoptimize_budget_fraction;
    let deadline = started + Duration::from_millis(budget as u64);
    let stats = improve(&problem, &mut plan, deadline, config.seed);

    let mut route_plan = assemble(&problem, &plan, rejections, stats);
    route_plan.diagnostics.orphaned_started_jobs = split.orphaned;
    log_summary(&route_plan, started);
    Ok(route_plan)
}

/// Latest view of every job the prior plan or the caller knows about.
struct Snapshot<'a> {
    plan: &'a RoutePlan,
    frozen_ids: HashSet<&'a JobId>,
    removed: HashSet<&'a JobId>,
    updates: HashMap<&'a JobId, &'a Job>,
    new_jobs: &'a [Job],
    technicians: HashMap<&'a TechnicianId, &'a Technician>,
}

/// Jobs sorted into what stays fixed, what keeps its technician for now, and
/// what goes back to the pool.
struct Split {
    frozen: HashMap<TechnicianId, Vec<PlannedStop>>,
    warm: Vec<(TechnicianId, Job)>,
    pool: Vec<(Job, Option<TechnicianId>)>,
    /// Started jobs with no technician on the roster to hold them.
    orphaned: Vec<JobId>,
}

impl<'a> Snapshot<'a> {
    fn new(
        plan: &'a RoutePlan,
        frozen_jobs: &'a [JobId],
        new_jobs: &'a [Job],
        removed_job_ids: &'a [JobId],
        technicians: &'a [Technician],
    ) -> Self {
        Self {
            plan,
            frozen_ids: frozen_jobs.iter().collect(),
            removed: removed_job_ids.iter().collect(),
            updates: new_jobs.iter().map(|job| (&job.id, job)).collect(),
            new_jobs,
            technicians: technicians
                .iter()
                .map(|technician| (&technician.id, technician))
                .collect(),
        }
    }

    fn current(&self, job: &'a Job) -> &'a Job {
        self.updates.get(&job.id).copied().unwrap_or(job)
    }

    fn is_frozen(&self, job: &Job) -> bool {
        self.frozen_ids.contains(&job.id) || job.status.is_started()
    }

    /// Still wanted and still waiting to start.
    fn is_open(&self, job: &Job) -> bool {
        !self.removed.contains(&job.id) && job.status.is_plannable()
    }

    fn split(&self) -> Split {
        let mut split = Split {
            frozen: HashMap::new(),
            warm: Vec::new(),
            pool: Vec::new(),
            orphaned: Vec::new(),
        };
        let plan: &'a RoutePlan = self.plan;
        let mut seen: HashSet<&'a JobId> = HashSet::new();

        for route in &plan.routes {
            let technician = self.technicians.get(&route.technician_id).copied();
            let keeps_work = technician.is_some_and(|t| t.status.is_available());

            for stop in &route.stops {
                let job = self.current(&stop.job);
                if !seen.insert(&job.id) {
                    continue;
                }

                if self.is_frozen(job) {
                    if self.removed.contains(&job.id) {
                        warn!(job = %job.id, "ignoring removal of a started job");
                    }
                    if technician.is_none() {
                        warn!(
                            job = %job.id,
                            technician = %route.technician_id,
                            "started job belongs to a technician missing from the roster"
                        );
                        split.orphaned.push(job.id.clone());
                        continue;
                    }
                    let mut frozen = stop.clone();
                    frozen.job = job.clone();
                    frozen.frozen = true;
                    split
                        .frozen
                        .entry(route.technician_id.clone())
                        .or_default()
                        .push(frozen);
                } else if self.is_open(job) {
                    if keeps_work {
                        split.warm.push((route.technician_id.clone(), job.clone()));
                    } else {
                        split.pool.push((job.clone(), Some(route.technician_id.clone())));
                    }
                }
            }
        }

        let unplaced = plan
            .unassigned
            .iter()
            .map(|unassigned| self.current(&unassigned.job))
            .chain(self.new_jobs.iter());
        for job in unplaced {
            if !seen.insert(&job.id) {
                continue;
            }
            if self.is_frozen(job) {
                warn!(job = %job.id, "started job has no place in the prior plan");
                split.orphaned.push(job.id.clone());
                continue;
            }
            if self.is_open(job) {
                split.pool.push((job.clone(), None));
            }
        }

        split
    }
}
