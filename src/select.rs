//! Plan selection: heuristic scoring and timed trial runs.
//!
//! Candidates are loop orders crossed with parallelism strategies. The
//! estimating method trusts the heuristics outright; the measuring methods
//! run each candidate over a sampled prefix of its outermost range,
//! extrapolate to full size, and keep the fastest, under a wall-clock
//! budget. Trials run on the real buffers: when `beta != 0` the output is
//! snapshotted first and restored after every trial.

use std::time::Instant;

use crate::config::engine_config;
use crate::element::Element;
use crate::execute::run_plan;
use crate::normalize::Descriptor;
use crate::order::{candidate_orders, loop_cost};
use crate::parallel::{best_strategy, enumerate_strategies, load_balance, num_tasks};
use crate::plan::{build_plan, level_iterations, Plan};
use crate::transpose::SelectionMethod;

/// Trials sample roughly this fraction of the outermost range.
const SAMPLE_DIVISOR: usize = 16;

/// Below this many elements timing noise dominates any real difference
/// between candidates; the heuristic choice is used directly.
const SMALL_TENSOR_THRESHOLD: usize = 1024;

/// Extra parallelism strategies tried per loop order by measuring methods.
fn strategies_per_order(method: SelectionMethod) -> usize {
    match method {
        SelectionMethod::Estimate => 1,
        SelectionMethod::Measure => 2,
        SelectionMethod::Patient | SelectionMethod::Crazy => 4,
    }
}

/// Select the master plan for a normalized problem.
pub(crate) fn select_plan<T: Element>(
    desc: &Descriptor,
    method: SelectionMethod,
    threads: usize,
    alpha: T,
    beta: T,
    a: &[T],
    b: &mut [T],
) -> Plan {
    let orders = candidate_orders(desc, method);

    if matches!(method, SelectionMethod::Estimate)
        || orders.len() <= 1
        || desc.total_logical() <= SMALL_TENSOR_THRESHOLD
    {
        let order = &orders[0];
        let iters = level_iterations(desc, order, T::BLOCK);
        let strategy = best_strategy(&iters, &simd_mask(order), threads);
        return build_plan(desc, order, &strategy, T::BLOCK);
    }

    // Cross loop orders with their best few strategies, ranked by the
    // heuristic so the most promising candidates are timed first.
    let mut candidates: Vec<(f64, Plan)> = Vec::new();
    for order in &orders {
        let iters = level_iterations(desc, order, T::BLOCK);
        let mask = simd_mask(order);
        let mut strategies = enumerate_strategies(&iters, &mask, threads);
        let preferred = best_strategy(&iters, &mask, threads);
        strategies.retain(|s| *s != preferred);
        strategies.insert(0, preferred);
        strategies.truncate(strategies_per_order(method));

        let cost = loop_cost(desc, order);
        for strategy in strategies {
            let balance = load_balance(&iters, &strategy);
            let idle = threads as f64 / num_tasks(&strategy).max(1) as f64;
            let score = cost * idle * (2.0 - balance);
            candidates.push((score, build_plan(desc, order, &strategy, T::BLOCK)));
        }
    }
    candidates.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());

    let budget = engine_config().timing_budget.as_secs_f64()
        * match method {
            SelectionMethod::Estimate | SelectionMethod::Measure => 1.0,
            SelectionMethod::Patient => 4.0,
            SelectionMethod::Crazy => 16.0,
        };

    let snapshot: Option<Vec<T>> = if beta.is_zero() { None } else { Some(b.to_vec()) };

    let started = Instant::now();
    let mut best: Option<(f64, usize)> = None;
    let mut timed = 0usize;
    for (i, (_, plan)) in candidates.iter().enumerate() {
        if started.elapsed().as_secs_f64() >= budget {
            break;
        }
        let Some((trial, factor)) = sampled_plan(plan) else {
            continue;
        };

        let t0 = Instant::now();
        unsafe {
            if beta.is_zero() {
                run_plan::<T, true, true>(&trial, a.as_ptr(), b.as_mut_ptr(), alpha, beta, true);
            } else {
                run_plan::<T, false, true>(&trial, a.as_ptr(), b.as_mut_ptr(), alpha, beta, true);
            }
        }
        let estimate = t0.elapsed().as_secs_f64() * factor;
        timed += 1;

        if let Some(snap) = &snapshot {
            b.copy_from_slice(snap);
        }

        if best.map_or(true, |(t, _)| estimate < t) {
            best = Some((estimate, i));
        }
    }

    match best {
        Some((estimate, i)) => {
            log::debug!(
                "selected plan {} of {} after {} trial(s), projected {:.3e} s",
                i + 1,
                candidates.len(),
                timed,
                estimate
            );
            candidates.swap_remove(i).1
        }
        None => {
            // Budget exhausted before any trial finished; fall back to the
            // heuristic choice.
            log::warn!(
                "trial budget of {budget:.2} s expired before any candidate was measured; \
                 falling back to the heuristic plan"
            );
            candidates.swap_remove(0).1
        }
    }
}

/// Parallelizability mask for a loop order: every level except ones over
/// A's unit-stride (SIMD) axis.
fn simd_mask(order: &[usize]) -> Vec<bool> {
    order.iter().map(|&axis| axis != 0).collect()
}

/// A copy of `plan` whose root ranges are truncated to a sampled prefix,
/// plus the work ratio for extrapolating the measured time.
///
/// Returns `None` for plans with no outer loops (nothing to sample; such
/// plans have a single candidate anyway).
fn sampled_plan(plan: &Plan) -> Option<(Plan, f64)> {
    if plan.trees.iter().all(|t| t.nodes.is_empty()) {
        return None;
    }

    let mut trial = plan.clone();
    let mut full = 0usize;
    let mut sampled = 0usize;
    for tree in &mut trial.trees {
        let Some(root) = tree.nodes.first_mut() else {
            continue;
        };
        let span = (root.end - root.start).div_ceil(root.inc);
        if span == 0 {
            continue;
        }
        let take = (span / SAMPLE_DIVISOR).max(1);
        root.end = root.end.min(root.start + take * root.inc);
        full += span;
        sampled += take;
    }
    if sampled == 0 {
        return None;
    }
    Some((trial, full as f64 / sampled as f64))
}
