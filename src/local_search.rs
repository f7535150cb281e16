//! Sampled local search: relocate, swap and 2-opt.
//!
//! Each iteration draws a fixed-size random sample of moves, evaluates them
//! (optionally on the rayon pool) and applies the best strictly improving
//! one. Acceptance is serial and the sample comes from a seeded RNG, so the
//! result does not depend on the thread count.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::constraints::{RouteSchedule, evaluate_route};
use crate::model::Seconds;
use crate::problem::{DispatchProblem, WorkingPlan};

/// Improvements smaller than this are treated as ties.
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Summary of a local-search run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    pub accepted_moves: usize,
    /// Plan cost before the first iteration and after each one.
    pub cost_trace: Vec<f64>,
    /// Stopped because the deadline passed.
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    /// Move the job at `from_pos` of `from` to `to_pos` of `to` (positions
    /// in `to` are after removal when `from == to`).
    Relocate {
        from: usize,
        from_pos: usize,
        to: usize,
        to_pos: usize,
    },
    /// Exchange jobs between two different routes.
    Swap {
        a: usize,
        a_pos: usize,
        b: usize,
        b_pos: usize,
    },
    /// Reverse `start..=end` of one route.
    TwoOpt { route: usize, start: usize, end: usize },
}

struct Candidate {
    changes: Vec<(usize, Vec<usize>, RouteSchedule)>,
    delta: f64,
    lateness: Seconds,
}

#[instrument(skip_all, fields(seed = seed))]
pub(crate) fn improve(
    problem: &DispatchProblem<'_>,
    plan: &mut WorkingPlan,
    deadline: Instant,
    seed: u64,
) -> SearchStats {
    let config = problem.config;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = SearchStats {
        cost_trace: vec![plan.cost()],
        ..Default::default()
    };
    let mut non_improving = 0;

    loop {
        if Instant::now() >= deadline {
            stats.budget_exhausted = true;
            break;
        }
        if stats.iterations >= config.max_iterations
            || non_improving >= config.max_non_improving_iterations
        {
            break;
        }

        let moves: Vec<Move> = (0..config.max_candidate_sample)
            .filter_map(|_| sample_move(problem, plan, &mut rng))
            .collect();
        if moves.is_empty() {
            // No route has anything to move.
            break;
        }

        let current: &WorkingPlan = plan;
        let evaluated: Vec<Option<Candidate>> = if config.parallel_move_evaluation {
            moves
                .par_iter()
                .map(|mv| evaluate_move(problem, current, *mv))
                .collect()
        } else {
            moves
                .iter()
                .map(|mv| evaluate_move(problem, current, *mv))
                .collect()
        };

        stats.iterations += 1;
        match select_best(evaluated) {
            Some(candidate) => {
                for (route, sequence, schedule) in candidate.changes {
                    plan.set_route(route, sequence, schedule);
                }
                stats.accepted_moves += 1;
                non_improving = 0;
            }
            None => non_improving += 1,
        }
        stats.cost_trace.push(plan.cost());
    }

    debug!(
        iterations = stats.iterations,
        accepted = stats.accepted_moves,
        cost = plan.cost(),
        "local search finished"
    );
    stats
}

/// Best strictly improving candidate: lowest delta, then lowest resulting
/// lateness, then earliest in the sample.
fn select_best(candidates: Vec<Option<Candidate>>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates.into_iter().flatten() {
        if candidate.delta >= -IMPROVEMENT_EPSILON {
            continue;
        }
        let replace = match &best {
            None => true,
            Some(incumbent) => {
                candidate.delta < incumbent.delta - IMPROVEMENT_EPSILON
                    || ((candidate.delta - incumbent.delta).abs() <= IMPROVEMENT_EPSILON
                        && candidate.lateness < incumbent.lateness)
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    best
}

fn sample_move(problem: &DispatchProblem<'_>, plan: &WorkingPlan, rng: &mut StdRng) -> Option<Move> {
    let loaded: Vec<usize> = (0..plan.routes.len())
        .filter(|&route| !plan.routes[route].is_empty())
        .collect();
    if loaded.is_empty() {
        return None;
    }

    match rng.random_range(0..3) {
        0 => {
            let from = loaded[rng.random_range(0..loaded.len())];
            let from_pos = rng.random_range(0..plan.routes[from].len());
            let to = rng.random_range(0..problem.technicians.len());
            let slots = if to == from {
                plan.routes[from].len()
            } else {
                plan.routes[to].len() + 1
            };
            let to_pos = rng.random_range(0..slots);
            if to == from && to_pos == from_pos {
                return None;
            }
            Some(Move::Relocate {
                from,
                from_pos,
                to,
                to_pos,
            })
        }
        1 => {
            if loaded.len() < 2 {
                return None;
            }
            let first = rng.random_range(0..loaded.len());
            let mut second = rng.random_range(0..loaded.len() - 1);
            if second >= first {
                second += 1;
            }
            let (a, b) = (loaded[first], loaded[second]);
            Some(Move::Swap {
                a,
                a_pos: rng.random_range(0..plan.routes[a].len()),
                b,
                b_pos: rng.random_range(0..plan.routes[b].len()),
            })
        }
        _ => {
            let route = loaded[rng.random_range(0..loaded.len())];
            let len = plan.routes[route].len();
            if len < 2 {
                return None;
            }
            let start = rng.random_range(0..len - 1);
            let end = rng.random_range(start + 1..len);
            Some(Move::TwoOpt { route, start, end })
        }
    }
}

fn evaluate_move(problem: &DispatchProblem<'_>, plan: &WorkingPlan, mv: Move) -> Option<Candidate> {
    let sequences: Vec<(usize, Vec<usize>)> = match mv {
        Move::Relocate {
            from,
            from_pos,
            to,
            to_pos,
        } => {
            let mut source = plan.routes[from].clone();
            let job = source.remove(from_pos);
            if from == to {
                source.insert(to_pos, job);
                vec![(from, source)]
            } else {
                let mut target = plan.routes[to].clone();
                target.insert(to_pos, job);
                vec![(from, source), (to, target)]
            }
        }
        Move::Swap { a, a_pos, b, b_pos } => {
            let mut first = plan.routes[a].clone();
            let mut second = plan.routes[b].clone();
            std::mem::swap(&mut first[a_pos], &mut second[b_pos]);
            vec![(a, first), (b, second)]
        }
        Move::TwoOpt { route, start, end } => {
            let mut sequence = plan.routes[route].clone();
            sequence[start..=end].reverse();
            vec![(route, sequence)]
        }
    };

    let mut delta = 0.0;
    let mut lateness = plan.lateness();
    let mut changes = Vec::with_capacity(sequences.len());
    for (route, sequence) in sequences {
        let schedule = evaluate_route(problem, &plan.relaxed, route, &sequence).ok()?;
        let current = &plan.schedules[route];
        delta += schedule.cost - current.cost;
        lateness += schedule.lateness_seconds - current.lateness_seconds;
        changes.push((route, sequence, schedule));
    }

    Some(Candidate {
        changes,
        delta,
        lateness,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

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

    fn zigzag_plan(problem: &DispatchProblem<'_>) -> WorkingPlan {
        let mut plan = WorkingPlan::empty(problem);
        // Deliberately bad order: far, near, far, near.
        let sequence = vec![3, 0, 2, 1];
        let schedule = evaluate_route(problem, &plan.relaxed, 0, &sequence).unwrap();
        plan.set_route(0, sequence, schedule);
        plan
    }

    fn line_jobs() -> Vec<Job> {
        (0..4)
            .map(|i| Job::new(format!("j{i}"), (32.80 + 0.02 * i as f64, -96.80)).service_minutes(20))
            .collect()
    }

    fn search_config() -> OptimizationConfig {
        OptimizationConfig {
            max_non_improving_iterations: 30,
            ..Default::default()
        }
    }

    #[test]
    fn cost_never_increases() {
        let config = search_config();
        let problem = build(&config, vec![Technician::new("t1", (32.78, -96.80))], line_jobs());
        let mut plan = zigzag_plan(&problem);
        let before = plan.cost();

        let stats = improve(&problem, &mut plan, Instant::now() + Duration::from_secs(10), 7);

        assert!(plan.cost() < before, "zigzag route should be improved");
        assert!(stats.accepted_moves > 0);
        for pair in stats.cost_trace.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "cost went up: {:?}", pair);
        }
        assert_eq!(stats.cost_trace.len(), stats.iterations + 1);
    }

    #[test]
    fn expired_deadline_skips_search() {
        let config = search_config();
        let problem = build(&config, vec![Technician::new("t1", (32.78, -96.80))], line_jobs());
        let mut plan = zigzag_plan(&problem);
        let before = plan.routes.clone();

        let stats = improve(&problem, &mut plan, Instant::now(), 7);

        assert!(stats.budget_exhausted);
        assert_eq!(stats.iterations, 0);
        assert_eq!(plan.routes, before);
    }

    #[test]
    fn parallel_and_serial_agree() {
        let serial_config = OptimizationConfig {
            parallel_move_evaluation: false,
            ..search_config()
        };
        let parallel_config = search_config();
        let technicians = vec![
            Technician::new("t1", (32.78, -96.80)),
            Technician::new("t2", (32.86, -96.80)),
        ];

        let mut results = Vec::new();
        for config in [&serial_config, &parallel_config] {
            let problem = build(config, technicians.clone(), line_jobs());
            let mut plan = zigzag_plan(&problem);
            improve(&problem, &mut plan, Instant::now() + Duration::from_secs(10), 11);
            results.push((plan.routes.clone(), plan.cost()));
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn empty_plan_stops_immediately() {
        let config = search_config();
        let problem = build(&config, vec![Technician::new("t1", (32.78, -96.80))], vec![]);
        let mut plan = WorkingPlan::empty(&problem);
        let stats = improve(&problem, &mut plan, Instant::now() + Duration::from_secs(10), 1);
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.cost_trace, vec![0.0]);
    }

    #[test]
    fn ties_prefer_lower_lateness() {
        let quick = Candidate {
            changes: Vec::new(),
            delta: -10.0,
            lateness: 50,
        };
        let punctual = Candidate {
            changes: Vec::new(),
            delta: -10.0,
            lateness: 0,
        };
        let worse = Candidate {
            changes: Vec::new(),
            delta: 5.0,
            lateness: 0,
        };
        let best = select_best(vec![Some(quick), None, Some(worse), Some(punctual)]).unwrap();
        assert_eq!(best.lateness, 0);
    }
}
