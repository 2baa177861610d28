//! Plan representation: per-task loop descriptor chains.
//!
//! A plan pairs a loop order with a parallelism vector and materializes one
//! compute tree per task. Trees share their shape; they differ only in the
//! `[start, end)` bounds of parallelized levels. Each tree is a contiguous
//! vector of nodes walked by depth, terminating in the kernel leaf.

use smallvec::SmallVec;

use crate::normalize::{Descriptor, SVec};

/// One loop level of a task's compute tree.
#[derive(Debug, Clone)]
pub(crate) struct ComputeNode {
    /// First iteration index (elements along the axis).
    pub start: usize,
    /// One-past-last iteration index.
    pub end: usize,
    /// Tile increment: the macro-tile edge on blocked axes, 1 elsewhere.
    pub inc: usize,
    /// A stride for this axis.
    pub lda: isize,
    /// B stride for this axis.
    pub ldb: isize,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Plain loop, one element per iteration.
    Step,
    /// Tiled loop over A's unit-stride axis; sets the kernel's A extent.
    BlockedA,
    /// Tiled loop over the axis that is B's unit-stride axis; sets the
    /// kernel's B extent.
    BlockedB,
}

/// Terminal operation of every tree in a plan.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Leaf {
    /// Register-tiled transpose; strides step the non-unit direction of
    /// each operand within the tile.
    Tile { lda: isize, ldb: isize },
    /// Contiguous scaled copy of `len` elements (shared unit-stride axis).
    Run { len: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct TaskTree {
    /// Loop levels, outermost first; the leaf follows the last node.
    pub nodes: Vec<ComputeNode>,
}

/// An immutable execution plan: one compute tree per task.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    /// Axes in nesting order, outermost first. Excludes the shared
    /// unit-stride axis on the strided-copy path.
    pub loop_order: SVec<usize>,
    /// Parallel degree per loop level; the product is the task count.
    pub threads_at_loop: SVec<usize>,
    pub num_tasks: usize,
    pub leaf: Leaf,
    pub trees: Vec<TaskTree>,
}

impl Plan {
    /// One-line human-readable form for diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "loop order {:?}, parallelism {:?}, {} task(s)",
            self.loop_order.as_slice(),
            self.threads_at_loop.as_slice(),
            self.num_tasks
        )
    }
}

/// Axes iterated by loop nodes, outermost candidates first.
///
/// On the transpose path every axis appears (the two kernel axes are
/// blocked); on the strided-copy path axis 0 belongs to the leaf.
pub(crate) fn loop_axes(desc: &Descriptor) -> SVec<usize> {
    if desc.const_stride1() {
        (1..desc.dim()).collect()
    } else {
        (0..desc.dim()).collect()
    }
}

/// Whether loop nodes over `axis` step in macro-tile increments.
pub(crate) fn is_blocked_axis(desc: &Descriptor, axis: usize) -> bool {
    !desc.const_stride1() && (axis == 0 || axis == desc.perm[0])
}

/// Iteration count of each loop level (tiles on blocked axes).
pub(crate) fn level_iterations(desc: &Descriptor, order: &[usize], block: usize) -> SVec<usize> {
    order
        .iter()
        .map(|&axis| {
            let size = desc.size_a[axis];
            if is_blocked_axis(desc, axis) {
                size.div_ceil(block)
            } else {
                size
            }
        })
        .collect()
}

/// Build the per-task trees for a loop order and parallelism vector.
///
/// Task `t` locates its slice on each parallelized level through the
/// mixed-radix decomposition of `t` over `threads_at_loop` (outermost digit
/// slowest). Each level is split into contiguous chunks of
/// `ceil(iterations / threads)` tiles; trailing tasks may come up short or
/// empty.
pub(crate) fn build_plan(
    desc: &Descriptor,
    order: &[usize],
    threads_at_loop: &[usize],
    block: usize,
) -> Plan {
    debug_assert_eq!(order.len(), threads_at_loop.len());

    let leaf = if desc.const_stride1() {
        Leaf::Run {
            len: desc.size_a[0],
        }
    } else {
        Leaf::Tile {
            lda: desc.lda[desc.perm[0]] as isize,
            ldb: desc.ldb[desc.inv_perm[0]] as isize,
        }
    };

    let num_tasks: usize = threads_at_loop.iter().product::<usize>().max(1);
    let levels = order.len();

    // Radix strides for decomposing the task id, outermost slowest.
    let mut radix: SVec<usize> = smallvec::smallvec![1; levels];
    for l in (0..levels.saturating_sub(1)).rev() {
        radix[l] = radix[l + 1] * threads_at_loop[l + 1];
    }

    let mut trees = Vec::with_capacity(num_tasks);
    for t in 0..num_tasks {
        let mut nodes = Vec::with_capacity(levels);
        for (l, &axis) in order.iter().enumerate() {
            let size = desc.size_a[axis];
            let blocked = is_blocked_axis(desc, axis);
            let inc = if blocked { block } else { 1 };
            let iters = size.div_ceil(inc);

            let p = threads_at_loop[l];
            let coord = (t / radix[l]) % p;
            let chunk = iters.div_ceil(p);
            let start_iter = (coord * chunk).min(iters);
            let end_iter = (start_iter + chunk).min(iters);

            nodes.push(ComputeNode {
                start: (start_iter * inc).min(size),
                end: (end_iter * inc).min(size),
                inc,
                lda: desc.lda[axis] as isize,
                ldb: desc.ldb[desc.inv_perm[axis]] as isize,
                kind: if !blocked {
                    NodeKind::Step
                } else if axis == 0 {
                    NodeKind::BlockedA
                } else {
                    NodeKind::BlockedB
                },
            });
        }
        trees.push(TaskTree { nodes });
    }

    Plan {
        loop_order: SmallVec::from_slice(order),
        threads_at_loop: SmallVec::from_slice(threads_at_loop),
        num_tasks,
        leaf,
        trees,
    }
}
