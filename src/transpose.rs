//! Public surface: plan creation, reuse, and execution.

use crate::config::engine_config;
use crate::element::Element;
use crate::execute::run_plan;
use crate::normalize::Descriptor;
use crate::parallel::best_strategy;
use crate::plan::{build_plan, level_iterations, Plan};
use crate::select::select_plan;
use crate::{Result, TransposeError};

/// How aggressively the planner searches and times candidate plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethod {
    /// Pick the best candidate by heuristic cost; no timing.
    Estimate,
    /// Time a handful of candidates on sampled slices and keep the fastest.
    Measure,
    /// Like `Measure`, with a wider candidate pool and budget.
    Patient,
    /// Exhaustive loop-order enumeration, bounded at rank 8; beyond that it
    /// behaves like `Patient`.
    Crazy,
}

/// A reusable transposition plan for element type `T`.
///
/// Built once per problem geometry by [`create_plan`]; `execute` may then be
/// called any number of times with any buffers of that geometry. The
/// selected loop structure is immutable; `alpha`, `beta` and the thread
/// count have setters.
#[derive(Debug, Clone)]
pub struct TransposePlan<T: Element> {
    desc: Descriptor,
    master: Plan,
    alpha: T,
    beta: T,
    num_threads: usize,
}

/// Build a transposition plan computing `B[pi(i)] = alpha * A[i] + beta *
/// B[pi(i)]`.
///
/// - `size_a`: logical extent of each A-axis; axis 0 is unit-stride.
/// - `perm`: `perm[k]` is the A-axis varying along B-axis `k`.
/// - `outer_size_a` / `outer_size_b`: padded allocation extents per axis;
///   `None` means unpadded.
/// - `a` / `b`: the operand buffers. They are borrowed only for this call
///   (measuring methods run timed trials on them); later `execute` calls
///   may use any buffers of the same geometry.
/// - `method`: how hard to search for the plan.
/// - `num_threads`: worker count; 0 selects the `HPTT_NUM_THREADS` /
///   thread-pool default.
///
/// With a measuring method and `beta != 0`, B is snapshotted and restored
/// around every trial, so B must not be read concurrently during plan
/// creation.
#[allow(clippy::too_many_arguments)]
pub fn create_plan<T: Element>(
    size_a: &[usize],
    perm: &[usize],
    outer_size_a: Option<&[usize]>,
    outer_size_b: Option<&[usize]>,
    alpha: T,
    a: &[T],
    beta: T,
    b: &mut [T],
    method: SelectionMethod,
    num_threads: usize,
) -> Result<TransposePlan<T>> {
    let desc = Descriptor::build(size_a, perm, outer_size_a, outer_size_b)?;

    // Best-effort aliasing check; disjointness of the borrows already rules
    // this out for safely constructed slices.
    if std::ptr::eq(a.as_ptr(), b.as_ptr()) {
        return Err(TransposeError::AliasedBuffers);
    }
    check_extents(&desc, a.len(), b.len())?;

    let threads = resolve_threads(num_threads);
    let master = select_plan(&desc, method, threads, alpha, beta, a, b);

    let cfg = engine_config();
    if cfg.verbose >= 1 {
        let size_b: Vec<usize> = (0..desc.dim()).map(|k| desc.size_b(k)).collect();
        eprintln!(
            "[strided-transpose] fused sizes {:?} -> {:?}; selected {}",
            desc.size_a.as_slice(),
            size_b,
            master.describe()
        );
    }

    Ok(TransposePlan {
        desc,
        master,
        alpha,
        beta,
        num_threads: threads,
    })
}

impl<T: Element> TransposePlan<T> {
    pub fn alpha(&self) -> T {
        self.alpha
    }

    pub fn beta(&self) -> T {
        self.beta
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn set_alpha(&mut self, alpha: T) {
        self.alpha = alpha;
    }

    pub fn set_beta(&mut self, beta: T) {
        self.beta = beta;
    }

    /// Change the worker count. The selected loop order is kept; the
    /// parallelism vector and task trees are re-derived for the new count.
    pub fn set_num_threads(&mut self, num_threads: usize) {
        let threads = resolve_threads(num_threads);
        if threads == self.num_threads {
            return;
        }
        self.num_threads = threads;

        let order = self.master.loop_order.clone();
        let iters = level_iterations(&self.desc, &order, T::BLOCK);
        let mask: Vec<bool> = order.iter().map(|&axis| axis != 0).collect();
        let strategy = best_strategy(&iters, &mask, threads);
        self.master = build_plan(&self.desc, &order, &strategy, T::BLOCK);
    }

    /// Execute the transposition with the stored `alpha`/`beta`.
    ///
    /// Dispatches once to the specialization matching `beta`; streaming
    /// stores and worker spawning stay enabled. Buffer extents must match
    /// the planned geometry; violations are bugs and abort.
    pub fn execute(&self, a: &[T], b: &mut [T]) {
        if self.beta.is_zero() {
            self.execute_expert::<true, true, true>(a, b);
        } else {
            self.execute_expert::<true, true, false>(a, b);
        }
    }

    /// Execute with the hot-path specializations bound at compile time.
    ///
    /// - `USE_STREAMING_STORES`: allow the bulk-store path on the `beta = 0`
    ///   leaf.
    /// - `SPAWN_THREADS`: fan tasks out over the thread pool; disable when
    ///   the caller already runs inside a parallel region.
    /// - `BETA_IS_ZERO`: elide the B load; must agree with the stored
    ///   `beta`.
    pub fn execute_expert<
        const USE_STREAMING_STORES: bool,
        const SPAWN_THREADS: bool,
        const BETA_IS_ZERO: bool,
    >(
        &self,
        a: &[T],
        b: &mut [T],
    ) {
        assert!(
            a.len() >= self.desc.elems_a() && b.len() >= self.desc.elems_b(),
            "buffer extents do not match the planned geometry"
        );
        debug_assert_eq!(BETA_IS_ZERO, self.beta.is_zero());

        unsafe {
            if BETA_IS_ZERO {
                run_plan::<T, true, USE_STREAMING_STORES>(
                    &self.master,
                    a.as_ptr(),
                    b.as_mut_ptr(),
                    self.alpha,
                    self.beta,
                    SPAWN_THREADS,
                );
            } else {
                run_plan::<T, false, USE_STREAMING_STORES>(
                    &self.master,
                    a.as_ptr(),
                    b.as_mut_ptr(),
                    self.alpha,
                    self.beta,
                    SPAWN_THREADS,
                );
            }
        }
    }
}

fn resolve_threads(num_threads: usize) -> usize {
    if num_threads == 0 {
        engine_config().default_threads
    } else {
        num_threads
    }
}

fn check_extents(desc: &Descriptor, got_a: usize, got_b: usize) -> Result<()> {
    let need_a = desc.elems_a();
    if got_a < need_a {
        return Err(TransposeError::BufferTooSmall {
            got: got_a,
            need: need_a,
        });
    }
    let need_b = desc.elems_b();
    if got_b < need_b {
        return Err(TransposeError::BufferTooSmall {
            got: got_b,
            need: need_b,
        });
    }
    Ok(())
}
