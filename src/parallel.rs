//! Parallelism assignment: factor the thread count across loop levels.
//!
//! The thread count is decomposed into prime factors, which are distributed
//! over the loop levels of a candidate order. A factor lands on a level only
//! if the level has that many tiles to give away; the unit-stride SIMD axis
//! is never split. Distributions are ranked by achieved task count and load
//! balance against a floor that relaxes when nothing qualifies.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::normalize::SVec;

/// Initial load-balance floor.
pub(crate) const MIN_BALANCING: f64 = 0.80;
/// The floor relaxes in steps of this size down to [`MIN_BALANCING_LAST`].
pub(crate) const MIN_BALANCING_STEP: f64 = 0.05;
pub(crate) const MIN_BALANCING_LAST: f64 = 0.50;

/// Cap on enumerated distributions per loop order.
const STRATEGY_CAP: usize = 512;

/// Prime factors of `n`, largest first. `prime_factors(1)` is empty.
pub(crate) fn prime_factors(mut n: usize) -> SVec<usize> {
    let mut factors: SVec<usize> = SmallVec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.reverse();
    factors
}

/// Ratio of the least-loaded worker to the most-loaded worker under the
/// block-cyclic partition of `iters` across `threads`, per level.
///
/// A level of `n` iterations split `p` ways yields chunks of `ceil(n/p)`
/// with a short (possibly empty) tail; worker loads are products of their
/// per-level chunks, so the ratio is the product of per-level ratios.
pub(crate) fn load_balance(iters: &[usize], threads: &[usize]) -> f64 {
    let mut min_work = 1.0f64;
    let mut max_work = 1.0f64;
    for (&n, &p) in iters.iter().zip(threads) {
        if p <= 1 {
            continue;
        }
        let chunk = n.div_ceil(p);
        let tail = n as isize - (chunk * (p - 1)) as isize;
        min_work *= tail.max(0) as f64;
        max_work *= chunk as f64;
    }
    if max_work == 0.0 {
        return 0.0;
    }
    min_work / max_work
}

/// Total tasks of a distribution.
pub(crate) fn num_tasks(threads: &[usize]) -> usize {
    threads.iter().product::<usize>().max(1)
}

/// Greedy distribution: place each prime factor, largest first, on the
/// outermost level that can still absorb it.
pub(crate) fn greedy_strategy(
    iters: &[usize],
    parallelizable: &[bool],
    num_threads: usize,
) -> SVec<usize> {
    let mut p: SVec<usize> = smallvec::smallvec![1; iters.len()];
    for &f in &prime_factors(num_threads) {
        for l in 0..iters.len() {
            if parallelizable[l] && p[l] * f <= iters[l] {
                p[l] *= f;
                break;
            }
        }
    }
    p
}

/// All distributions of the prime factors over the levels, ranked by task
/// count then balance. A factor is left unused only in branches where no
/// level can absorb it, so every distribution achieves the most parallelism
/// its branch allows.
pub(crate) fn enumerate_strategies(
    iters: &[usize],
    parallelizable: &[bool],
    num_threads: usize,
) -> Vec<SVec<usize>> {
    let factors = prime_factors(num_threads);
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut p: SVec<usize> = smallvec::smallvec![1; iters.len()];
    assign(&factors, 0, &mut p, iters, parallelizable, &mut seen);

    let mut out: Vec<SVec<usize>> = seen
        .into_iter()
        .map(|v| SmallVec::from_vec(v))
        .collect();
    out.sort_by(|a, b| {
        num_tasks(b)
            .cmp(&num_tasks(a))
            .then_with(|| {
                load_balance(iters, b)
                    .partial_cmp(&load_balance(iters, a))
                    .unwrap()
            })
            .then_with(|| a.as_slice().cmp(b.as_slice()))
    });
    out
}

fn assign(
    factors: &[usize],
    idx: usize,
    p: &mut SVec<usize>,
    iters: &[usize],
    parallelizable: &[bool],
    seen: &mut HashSet<Vec<usize>>,
) {
    if seen.len() >= STRATEGY_CAP {
        return;
    }
    if idx == factors.len() {
        seen.insert(p.to_vec());
        return;
    }
    let f = factors[idx];
    let mut placed = false;
    for l in 0..p.len() {
        if parallelizable[l] && p[l] * f <= iters[l] {
            placed = true;
            p[l] *= f;
            assign(factors, idx + 1, p, iters, parallelizable, seen);
            p[l] /= f;
        }
    }
    if !placed {
        // The factor fits nowhere in this branch; run with fewer tasks.
        assign(factors, idx + 1, p, iters, parallelizable, seen);
    }
}

/// The distribution used for heuristic-only selection: the qualifying
/// strategy with the most tasks, under a balance floor that relaxes from
/// [`MIN_BALANCING`] to [`MIN_BALANCING_LAST`]; failing that, the best
/// balance achievable.
pub(crate) fn best_strategy(
    iters: &[usize],
    parallelizable: &[bool],
    num_threads: usize,
) -> SVec<usize> {
    // The greedy placement usually balances well; enumerate only when it
    // misses the floor.
    let greedy = greedy_strategy(iters, parallelizable, num_threads);
    if load_balance(iters, &greedy) >= MIN_BALANCING {
        return greedy;
    }

    let ranked = enumerate_strategies(iters, parallelizable, num_threads);
    debug_assert!(!ranked.is_empty());

    let mut floor = MIN_BALANCING;
    while floor >= MIN_BALANCING_LAST - 1e-9 {
        if let Some(s) = ranked
            .iter()
            .find(|s| load_balance(iters, s) >= floor - 1e-9)
        {
            if floor < MIN_BALANCING {
                log::debug!(
                    "load-balance floor relaxed to {floor:.2} for thread distribution {:?}",
                    s.as_slice()
                );
            }
            return s.clone();
        }
        floor -= MIN_BALANCING_STEP;
    }

    // Last resort: best achievable balance, then most tasks.
    ranked
        .iter()
        .max_by(|a, b| {
            load_balance(iters, a)
                .partial_cmp(&load_balance(iters, b))
                .unwrap()
                .then_with(|| num_tasks(a).cmp(&num_tasks(b)))
                .then_with(|| b.as_slice().cmp(a.as_slice()))
        })
        .cloned()
        .unwrap_or_else(|| smallvec::smallvec![1; iters.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_factors() {
        assert!(prime_factors(1).is_empty());
        assert_eq!(prime_factors(2).as_slice(), &[2]);
        assert_eq!(prime_factors(12).as_slice(), &[3, 2, 2]);
        assert_eq!(prime_factors(16).as_slice(), &[2, 2, 2, 2]);
        assert_eq!(prime_factors(13).as_slice(), &[13]);
    }

    #[test]
    fn test_load_balance_even_split() {
        assert_eq!(load_balance(&[8], &[2]), 1.0);
        assert_eq!(load_balance(&[8, 6], &[2, 3]), 1.0);
        assert_eq!(load_balance(&[4], &[1]), 1.0);
        assert_eq!(load_balance(&[], &[]), 1.0);
    }

    #[test]
    fn test_load_balance_uneven_split() {
        // 8 iterations over 3 workers: chunks 3, 3, 2.
        assert!((load_balance(&[8], &[3]) - 2.0 / 3.0).abs() < 1e-12);
        // A level with an empty worker zeroes the balance.
        assert_eq!(load_balance(&[1], &[2]), 0.0);
    }

    #[test]
    fn test_greedy_fills_outermost_first() {
        let p = greedy_strategy(&[4, 4], &[true, true], 4);
        assert_eq!(p.as_slice(), &[4, 1]);
        let p = greedy_strategy(&[2, 4], &[true, true], 4);
        assert_eq!(p.as_slice(), &[2, 2]);
    }

    #[test]
    fn test_greedy_respects_simd_exclusion() {
        let p = greedy_strategy(&[64, 64], &[false, true], 4);
        assert_eq!(p.as_slice(), &[1, 4]);
    }

    #[test]
    fn test_greedy_drops_unplaceable_factors() {
        // 5 threads over two levels of 4: the prime 5 fits nowhere.
        let p = greedy_strategy(&[4, 4], &[true, true], 5);
        assert_eq!(p.as_slice(), &[1, 1]);
    }

    #[test]
    fn test_enumerate_places_all_factors() {
        let all = enumerate_strategies(&[8, 8], &[true, true], 4);
        // Both factors of 4 always fit, so every distribution runs 4 tasks.
        assert!(all.iter().all(|s| num_tasks(s) == 4));
        assert!(all.iter().any(|s| s.as_slice() == [2, 2]));
        assert!(all.iter().any(|s| s.as_slice() == [4, 1]));
        assert_eq!(num_tasks(&all[0]), 4);
    }

    #[test]
    fn test_best_strategy_perfect_split() {
        let s = best_strategy(&[8, 6], &[true, true], 4);
        assert_eq!(num_tasks(&s), 4);
        assert!(load_balance(&[8, 6], &s) >= MIN_BALANCING);
    }

    #[test]
    fn test_best_strategy_relaxes_floor() {
        // 8 tiles over 3 workers balances at 2/3; only the relaxed floor
        // accepts it, but it still beats running serial.
        let s = best_strategy(&[8], &[true], 3);
        assert_eq!(s.as_slice(), &[3]);
    }

    #[test]
    fn test_best_strategy_accepts_at_final_floor() {
        // 3 iterations over 2 workers: chunks 2 and 1 balance at exactly
        // the final 0.50 floor.
        let s = best_strategy(&[3], &[true], 2);
        assert_eq!(s.as_slice(), &[2]);
    }

    #[test]
    fn test_best_strategy_last_resort_keeps_idle_worker() {
        // 5 tiles over 4 workers: chunks of 2 leave the last worker empty,
        // balance 0. No floor accepts it; it is still the only way to use
        // the threads.
        let s = best_strategy(&[5], &[true], 4);
        assert_eq!(s.as_slice(), &[4]);
    }
}
