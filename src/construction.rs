//! Cheapest feasible insertion.
//!
//! Emergencies are placed first and may relax their window or displace one
//! lower-priority job. Everything else is inserted in priority order at the
//! position with the lowest marginal cost.

use tracing::{debug, instrument, warn};

use crate::constraints::{Infeasibility, RouteSchedule, evaluate_route, feasible};
use crate::problem::{DispatchProblem, WorkingPlan};

/// Outcome for a job the constructor could not place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub job: usize,
    pub reason: Infeasibility,
    pub emergency: bool,
}

struct Insertion {
    technician: usize,
    sequence: Vec<usize>,
    schedule: RouteSchedule,
    marginal: f64,
}

/// Insert every job in `queue` into `plan`.
///
/// `prior[job]` is the technician that held the job in a previous plan;
/// moving it elsewhere adds the reassignment penalty to the marginal cost.
#[instrument(skip_all, fields(jobs = queue.len()))]
pub(crate) fn construct(
    problem: &DispatchProblem<'_>,
    plan: &mut WorkingPlan,
    queue: Vec<usize>,
    prior: &[Option<usize>],
) -> Vec<Rejection> {
    let mut rejections = Vec::new();
    let (mut emergencies, mut regular): (Vec<usize>, Vec<usize>) =
        queue.into_iter().partition(|&job| problem.critical[job]);

    sort_queue(problem, &mut emergencies);
    for job in emergencies {
        if !problem.has_qualified_technician(job) {
            warn!(job = %problem.jobs[job].id, "no technician qualified for emergency");
            rejections.push(Rejection {
                job,
                reason: Infeasibility::CapabilityMismatch,
                emergency: true,
            });
            continue;
        }
        match insert_emergency(problem, plan, job, prior) {
            Ok(displaced) => regular.extend(displaced),
            Err(reason) => {
                warn!(job = %problem.jobs[job].id, %reason, "emergency could not be placed");
                rejections.push(Rejection {
                    job,
                    reason,
                    emergency: true,
                });
            }
        }
    }

    sort_queue(problem, &mut regular);
    for job in regular {
        if !problem.has_qualified_technician(job) {
            rejections.push(Rejection {
                job,
                reason: Infeasibility::CapabilityMismatch,
                emergency: false,
            });
            continue;
        }
        match best_insertion(problem, plan, job, prior) {
            Ok(insertion) => apply(plan, insertion),
            Err(reason) => {
                debug!(job = %problem.jobs[job].id, %reason, "job left unassigned");
                rejections.push(Rejection {
                    job,
                    reason,
                    emergency: false,
                });
            }
        }
    }

    rejections
}

/// Priority descending, then narrower window, then id.
pub(crate) fn sort_queue(problem: &DispatchProblem<'_>, queue: &mut [usize]) {
    queue.sort_by(|&a, &b| {
        let (job_a, job_b) = (&problem.jobs[a], &problem.jobs[b]);
        job_b
            .priority
            .total_cmp(&job_a.priority)
            .then_with(|| problem.window_width(a).cmp(&problem.window_width(b)))
            .then_with(|| job_a.id.cmp(&job_b.id))
    });
}

fn apply(plan: &mut WorkingPlan, insertion: Insertion) {
    plan.set_route(insertion.technician, insertion.sequence, insertion.schedule);
}

/// Lowest marginal-cost feasible position over all technicians.
///
/// Candidates are scanned in technician then position order and only a
/// strictly cheaper one replaces the incumbent, so ties keep the lowest
/// technician id and earliest position.
fn best_insertion(
    problem: &DispatchProblem<'_>,
    plan: &WorkingPlan,
    job: usize,
    prior: &[Option<usize>],
) -> Result<Insertion, Infeasibility> {
    let mut best: Option<Insertion> = None;
    let mut failure = Infeasibility::CapabilityMismatch;

    for technician in 0..problem.technicians.len() {
        let sequence = &plan.routes[technician];
        let current_cost = plan.schedules[technician].cost;
        let penalty = reassignment_penalty(problem, prior, job, technician);

        for position in 0..=sequence.len() {
            match feasible(problem, &plan.relaxed, technician, job, position, sequence) {
                Ok(schedule) => {
                    let marginal = schedule.cost - current_cost + penalty;
                    if best.as_ref().is_none_or(|incumbent| marginal < incumbent.marginal) {
                        let mut candidate = sequence.clone();
                        candidate.insert(position, job);
                        best = Some(Insertion {
                            technician,
                            sequence: candidate,
                            schedule,
                            marginal,
                        });
                    }
                }
                Err(Infeasibility::CapabilityMismatch) => break,
                Err(reason) => failure = failure.deeper(reason),
            }
        }
    }

    best.ok_or(failure)
}

fn reassignment_penalty(
    problem: &DispatchProblem<'_>,
    prior: &[Option<usize>],
    job: usize,
    technician: usize,
) -> f64 {
    match prior.get(job).copied().flatten() {
        Some(previous) if previous != technician => problem.config.reassignment_penalty,
        _ => 0.0,
    }
}

/// Place an emergency, relaxing its window and then displacing one
/// non-critical job if needed. Returns the displaced jobs.
fn insert_emergency(
    problem: &DispatchProblem<'_>,
    plan: &mut WorkingPlan,
    job: usize,
    prior: &[Option<usize>],
) -> Result<Vec<usize>, Infeasibility> {
    let strict = match best_insertion(problem, plan, job, prior) {
        Ok(insertion) => {
            apply(plan, insertion);
            return Ok(Vec::new());
        }
        Err(reason) => reason,
    };

    plan.relaxed[job] = true;
    if let Ok(insertion) = best_insertion(problem, plan, job, prior) {
        debug!(job = %problem.jobs[job].id, "emergency placed with relaxed window");
        apply(plan, insertion);
        return Ok(Vec::new());
    }

    if let Some((insertion, victim)) = best_displacement(problem, plan, job) {
        debug!(
            job = %problem.jobs[job].id,
            displaced = %problem.jobs[victim].id,
            "emergency placed by displacing a job"
        );
        apply(plan, insertion);
        return Ok(vec![victim]);
    }

    plan.relaxed[job] = false;
    Err(strict)
}

/// Cheapest way to fit `job` by removing one non-critical stop from a
/// qualified technician's route.
fn best_displacement(
    problem: &DispatchProblem<'_>,
    plan: &WorkingPlan,
    job: usize,
) -> Option<(Insertion, usize)> {
    let mut best: Option<(Insertion, usize)> = None;

    for technician in 0..problem.technicians.len() {
        let slot = &problem.technicians[technician];
        if !slot.is_available() || !slot.can_serve(&problem.job_capabilities[job]) {
            continue;
        }
        let sequence = &plan.routes[technician];
        let current_cost = plan.schedules[technician].cost;

        let mut victims: Vec<usize> = (0..sequence.len())
            .filter(|&position| !problem.critical[sequence[position]])
            .collect();
        // Cheapest jobs to lose first.
        victims.sort_by(|&a, &b| {
            problem.jobs[sequence[a]]
                .priority
                .total_cmp(&problem.jobs[sequence[b]].priority)
                .then(b.cmp(&a))
        });

        for removed in victims {
            let mut reduced = sequence.clone();
            let victim = reduced.remove(removed);
            if evaluate_route(problem, &plan.relaxed, technician, &reduced).is_err() {
                continue;
            }
            for position in 0..=reduced.len() {
                let Ok(schedule) =
                    feasible(problem, &plan.relaxed, technician, job, position, &reduced)
                else {
                    continue;
                };
                let marginal = schedule.cost - current_cost;
                if best
                    .as_ref()
                    .is_none_or(|(incumbent, _)| marginal < incumbent.marginal)
                {
                    let mut candidate = reduced.clone();
                    candidate.insert(position, job);
                    best = Some((
                        Insertion {
                            technician,
                            sequence: candidate,
                            schedule,
                            marginal,
                        },
                        victim,
                    ));
                }
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizationConfig;
    use crate::haversine::HaversineMatrix;
    use crate::model::{Job, Technician};
    use crate::problem::TechnicianSeed;

    fn build<'a>(
        config: &'a OptimizationConfig,
        technicians: Vec<Technician>,
        jobs: Vec<Job>,
    ) -> DispatchProblem<'a> {
        DispatchProblem::build(
            technicians.into_iter().map(TechnicianSeed::fresh).collect(),
            jobs,
            config,
            Some(&HaversineMatrix::default()),
        )
    }

    #[test]
    fn queue_orders_by_priority_then_tightness_then_id() {
        let config = OptimizationConfig::default();
        let problem = build(
            &config,
            vec![],
            vec![
                Job::new("b", (0.0, 0.0)),
                Job::new("a", (0.0, 0.0)),
                Job::new("tight", (0.0, 0.0)).window(0, 3600),
                Job::new("urgent", (0.0, 0.0)).priority(5.0),
            ],
        );
        let mut queue = vec![0, 1, 2, 3];
        sort_queue(&problem, &mut queue);
        assert_eq!(queue, vec![3, 2, 1, 0]);
    }

    #[test]
    fn ties_go_to_lowest_technician_id() {
        let config = OptimizationConfig::default();
        // Both technicians start at the same spot, so every insertion costs the same.
        let problem = build(
            &config,
            vec![
                Technician::new("zed", (32.77, -96.79)),
                Technician::new("amy", (32.77, -96.79)),
            ],
            vec![Job::new("j1", (32.78, -96.80))],
        );
        let mut plan = WorkingPlan::empty(&problem);
        let rejections = construct(&problem, &mut plan, vec![0], &[None]);
        assert!(rejections.is_empty());
        assert_eq!(problem.technicians[0].technician.id.as_str(), "amy");
        assert_eq!(plan.routes[0], vec![0]);
        assert!(plan.routes[1].is_empty());
    }

    #[test]
    fn reports_deepest_reason() {
        let config = OptimizationConfig::default();
        let problem = build(
            &config,
            vec![
                Technician::new("t1", (32.77, -96.79)).capacity(0),
                Technician::new("t2", (32.77, -96.79)).shift(8 * 3600, 8 * 3600 + 600),
            ],
            vec![Job::new("j1", (32.78, -96.80))],
        );
        let mut plan = WorkingPlan::empty(&problem);
        let rejections = construct(&problem, &mut plan, vec![0], &[None]);
        assert_eq!(
            rejections,
            vec![Rejection {
                job: 0,
                reason: Infeasibility::CapacityExceeded,
                emergency: false
            }]
        );
    }

    #[test]
    fn emergency_displaces_lower_priority_job() {
        let config = OptimizationConfig::default();
        let problem = build(
            &config,
            vec![Technician::new("t1", (32.77, -96.79)).capacity(1)],
            vec![
                Job::new("routine", (32.78, -96.80)).priority(1.0),
                Job::new("burst-pipe", (32.79, -96.81)).priority(10.0),
            ],
        );
        let mut plan = WorkingPlan::empty(&problem);
        construct(&problem, &mut plan, vec![0], &[None, None]);
        assert_eq!(plan.routes[0], vec![0]);

        let rejections = construct(&problem, &mut plan, vec![1], &[None, None]);
        assert_eq!(plan.routes[0], vec![1]);
        assert_eq!(
            rejections,
            vec![Rejection {
                job: 0,
                reason: Infeasibility::CapacityExceeded,
                emergency: false
            }]
        );
    }

    #[test]
    fn emergency_relaxes_window_before_giving_up() {
        let config = OptimizationConfig::default();
        let problem = build(
            &config,
            vec![Technician::new("t1", (32.77, -96.79)).shift(8 * 3600, 18 * 3600)],
            // Window closes before the technician's shift even starts.
            vec![Job::new("gas-leak", (32.78, -96.80)).window(0, 3600).priority(10.0)],
        );
        let mut plan = WorkingPlan::empty(&problem);
        let rejections = construct(&problem, &mut plan, vec![0], &[None]);
        assert!(rejections.is_empty());
        assert!(plan.relaxed[0]);
        assert!(plan.schedules[0].lateness_seconds > 0);
    }

    #[test]
    fn unqualified_emergency_is_flagged() {
        let config = OptimizationConfig::default();
        let problem = build(
            &config,
            vec![Technician::new("t1", (32.77, -96.79))],
            vec![Job::new("gas-leak", (32.78, -96.80)).requires("gas").priority(10.0)],
        );
        let mut plan = WorkingPlan::empty(&problem);
        let rejections = construct(&problem, &mut plan, vec![0], &[None]);
        assert_eq!(
            rejections,
            vec![Rejection {
                job: 0,
                reason: Infeasibility::CapabilityMismatch,
                emergency: true
            }]
        );
    }
}
