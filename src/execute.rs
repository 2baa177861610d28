//! Plan execution: per-task tree walk bottoming out in the tiled kernels.
//!
//! Each worker walks its own node chain top-down. Blocked nodes step in
//! macro-tile increments and carry the current tile extent down to the
//! leaf; plain nodes advance both operand pointers by their per-axis
//! strides. Workers write disjoint B slices by construction, so the fan-out
//! needs no locks and no atomics.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::element::Element;
use crate::macro_kernel::{axpby_run, macro_kernel};
use crate::plan::{ComputeNode, Leaf, NodeKind, Plan, TaskTree};

/// Raw pointer wrappers that cross the rayon fan-out.
///
/// # Safety
/// The plan partitions B into disjoint per-task slices and A is only read,
/// so no two tasks race on any element for the duration of the call.
#[derive(Clone, Copy)]
struct SendConst<T>(*const T);
unsafe impl<T> Send for SendConst<T> {}
unsafe impl<T> Sync for SendConst<T> {}

#[derive(Clone, Copy)]
struct SendMut<T>(*mut T);
unsafe impl<T> Send for SendMut<T> {}
unsafe impl<T> Sync for SendMut<T> {}

/// Execute every task tree of a plan.
///
/// With `spawn` the tasks fan out over the rayon pool, one job per task,
/// each running its tree to completion; otherwise (or with a single task)
/// they run on the caller's thread.
///
/// # Safety
/// - `a` must be valid for reads over A's full padded extent, `b` for reads
///   and writes over B's; the plan must have been built for these extents.
/// - The buffers must not overlap.
pub(crate) unsafe fn run_plan<T: Element, const BETA_ZERO: bool, const STREAM: bool>(
    plan: &Plan,
    a: *const T,
    b: *mut T,
    alpha: T,
    beta: T,
    spawn: bool,
) {
    if !spawn || plan.num_tasks == 1 {
        for tree in &plan.trees {
            run_task::<T, BETA_ZERO, STREAM>(tree, plan.leaf, a, b, alpha, beta);
        }
        return;
    }

    let pa = SendConst(a);
    let pb = SendMut(b);
    plan.trees.par_iter().for_each(|tree| {
        let (pa, pb) = (pa, pb);
        unsafe {
            run_task::<T, BETA_ZERO, STREAM>(tree, plan.leaf, pa.0, pb.0, alpha, beta);
        }
    });
}

#[inline]
unsafe fn run_task<T: Element, const BETA_ZERO: bool, const STREAM: bool>(
    tree: &TaskTree,
    leaf: Leaf,
    a: *const T,
    b: *mut T,
    alpha: T,
    beta: T,
) {
    walk::<T, BETA_ZERO, STREAM>(&tree.nodes, 0, a, b, 0, 0, leaf, alpha, beta);
}

/// Recursive descent over the node chain; `depth` indexes the current node.
///
/// `tile_a`/`tile_b` hold the kernel extents established by the enclosing
/// blocked loops; on the strided-copy path no node is blocked and they stay
/// unused.
#[allow(clippy::too_many_arguments)]
unsafe fn walk<T: Element, const BETA_ZERO: bool, const STREAM: bool>(
    nodes: &[ComputeNode],
    depth: usize,
    a: *const T,
    b: *mut T,
    tile_a: usize,
    tile_b: usize,
    leaf: Leaf,
    alpha: T,
    beta: T,
) {
    if depth == nodes.len() {
        match leaf {
            Leaf::Tile { lda, ldb } => {
                debug_assert!(tile_a > 0 && tile_b > 0);
                macro_kernel::<T, BETA_ZERO>(a, lda, tile_a, b, ldb, tile_b, alpha, beta);
            }
            Leaf::Run { len } => {
                axpby_run::<T, BETA_ZERO, STREAM>(a, b, len, alpha, beta);
            }
        }
        return;
    }

    let node = &nodes[depth];
    match node.kind {
        NodeKind::Step => {
            let mut ap = a.offset(node.start as isize * node.lda);
            let mut bp = b.offset(node.start as isize * node.ldb);
            for _ in node.start..node.end {
                walk::<T, BETA_ZERO, STREAM>(
                    nodes, depth + 1, ap, bp, tile_a, tile_b, leaf, alpha, beta,
                );
                ap = ap.offset(node.lda);
                bp = bp.offset(node.ldb);
            }
        }
        NodeKind::BlockedA => {
            let mut i = node.start;
            while i < node.end {
                let tile = node.inc.min(node.end - i);
                walk::<T, BETA_ZERO, STREAM>(
                    nodes,
                    depth + 1,
                    a.offset(i as isize * node.lda),
                    b.offset(i as isize * node.ldb),
                    tile,
                    tile_b,
                    leaf,
                    alpha,
                    beta,
                );
                i += node.inc;
            }
        }
        NodeKind::BlockedB => {
            let mut i = node.start;
            while i < node.end {
                let tile = node.inc.min(node.end - i);
                walk::<T, BETA_ZERO, STREAM>(
                    nodes,
                    depth + 1,
                    a.offset(i as isize * node.lda),
                    b.offset(i as isize * node.ldb),
                    tile_a,
                    tile,
                    leaf,
                    alpha,
                    beta,
                );
                i += node.inc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Descriptor;
    use crate::plan::build_plan;

    /// Reference implementation: walk every logical index of A.
    fn reference<T: Element>(desc: &Descriptor, alpha: T, a: &[T], beta: T, b: &mut [T]) {
        let dim = desc.dim();
        let mut idx = vec![0usize; dim];
        loop {
            let off_a: usize = (0..dim).map(|k| idx[k] * desc.lda[k]).sum();
            let off_b: usize = (0..dim)
                .map(|k| idx[desc.perm[k]] * desc.ldb[k])
                .sum();
            b[off_b] = T::axpby(alpha, a[off_a], beta, b[off_b]);

            let mut k = 0;
            loop {
                if k == dim {
                    return;
                }
                idx[k] += 1;
                if idx[k] < desc.size_a[k] {
                    break;
                }
                idx[k] = 0;
                k += 1;
            }
        }
    }

    fn check_plan(size: &[usize], perm: &[usize], threads_hint: &[usize]) {
        let desc = Descriptor::build(size, perm, None, None).unwrap();
        let order: Vec<usize> = crate::plan::loop_axes(&desc).to_vec();
        let threads: Vec<usize> = if threads_hint.is_empty() {
            vec![1; order.len()]
        } else {
            threads_hint.to_vec()
        };
        let plan = build_plan(&desc, &order, &threads, <f64 as Element>::BLOCK);

        let a: Vec<f64> = (0..desc.elems_a()).map(|i| i as f64).collect();
        let mut b = vec![0.0f64; desc.elems_b()];
        let mut expected = b.clone();

        unsafe {
            run_plan::<f64, false, true>(&plan, a.as_ptr(), b.as_mut_ptr(), 2.0, 0.5, true);
        }
        reference(&desc, 2.0, &a, 0.5, &mut expected);
        assert_eq!(b, expected, "size {size:?} perm {perm:?}");
    }

    #[test]
    fn test_run_2d_transpose() {
        check_plan(&[3, 2], &[1, 0], &[]);
        check_plan(&[40, 24], &[1, 0], &[]);
    }

    #[test]
    fn test_run_3d_permutes() {
        check_plan(&[5, 7, 9], &[2, 1, 0], &[]);
        check_plan(&[17, 4, 20], &[1, 0, 2], &[]);
    }

    #[test]
    fn test_run_with_parallel_tasks() {
        check_plan(&[33, 18], &[1, 0], &[2, 1]);
        check_plan(&[35, 37, 6], &[2, 1, 0], &[2, 3, 1]);
    }

    #[test]
    fn test_run_const_stride1() {
        check_plan(&[8, 5, 6], &[0, 2, 1], &[]);
    }

    #[test]
    fn test_run_rank1_copy() {
        let desc = Descriptor::build(&[1024], &[0], None, None).unwrap();
        let plan = build_plan(&desc, &[], &[], <f64 as Element>::BLOCK);
        let a: Vec<f64> = (0..1024).map(|i| i as f64).collect();
        let mut b = vec![0.0f64; 1024];
        unsafe {
            run_plan::<f64, true, true>(&plan, a.as_ptr(), b.as_mut_ptr(), 3.0, 0.0, false);
        }
        for (i, &x) in b.iter().enumerate() {
            assert_eq!(x, 3.0 * i as f64);
        }
    }

    #[test]
    fn test_padding_left_untouched() {
        // A padded on axis 0, B padded on axis 1 (its own axis 1).
        let desc =
            Descriptor::build(&[5, 5], &[1, 0], Some(&[8, 5]), Some(&[6, 7])).unwrap();
        let order: Vec<usize> = crate::plan::loop_axes(&desc).to_vec();
        let plan = build_plan(&desc, &order, &[1; 2], <f64 as Element>::BLOCK);

        let a: Vec<f64> = (0..desc.elems_a()).map(|i| (i + 1) as f64).collect();
        let mut b = vec![-1.0f64; desc.elems_b()];
        unsafe {
            run_plan::<f64, true, true>(&plan, a.as_ptr(), b.as_mut_ptr(), 1.0, 0.0, false);
        }

        for j1 in 0..7usize {
            for j0 in 0..6usize {
                let off = j0 + 6 * j1;
                let inside = j0 < 5 && j1 < 5;
                if inside {
                    assert_eq!(b[off], a[j1 + 8 * j0]);
                } else {
                    assert_eq!(b[off], -1.0, "padding modified at ({j0}, {j1})");
                }
            }
        }
    }
}
