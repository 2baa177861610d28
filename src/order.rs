//! Loop-order search: enumerate and rank candidate loop nests.
//!
//! A loop order is a permutation of the loop axes, outermost first. The
//! heuristic cost weighs each axis's combined A/B stride by a factor that
//! halves per level moving outward from the innermost loop, so minimizing
//! it drives small (unit) strides inward and large strides outward on both
//! operands.

use smallvec::SmallVec;

use crate::normalize::{Descriptor, SVec};
use crate::plan::loop_axes;
use crate::transpose::SelectionMethod;

/// Full enumeration is bounded by 8! orders; beyond that the exhaustive
/// method degrades to the patient one.
pub(crate) const ENUMERATION_CAP: usize = 40320;

/// Combined address stride of an axis across both operands.
fn stride_weight(desc: &Descriptor, axis: usize) -> f64 {
    (desc.lda[axis] + desc.ldb[desc.inv_perm[axis]]) as f64
}

/// Heuristic cost of a loop order (lower is better).
pub(crate) fn loop_cost(desc: &Descriptor, order: &[usize]) -> f64 {
    let levels = order.len();
    let mut cost = 0.0;
    for (l, &axis) in order.iter().enumerate() {
        let decay = (levels - 1 - l) as f64;
        cost += stride_weight(desc, axis) * (-decay).exp2();
    }
    cost
}

/// The cost-minimizing order: axes sorted by combined stride, descending,
/// so the largest strides sit outermost.
pub(crate) fn heuristic_order(desc: &Descriptor) -> SVec<usize> {
    let mut axes = loop_axes(desc);
    axes.sort_by(|&x, &y| {
        stride_weight(desc, y)
            .partial_cmp(&stride_weight(desc, x))
            .unwrap()
            .then(x.cmp(&y))
    });
    axes
}

/// Candidate loop orders for a selection method, best heuristic first.
///
/// Small ranks are enumerated exhaustively and truncated to the method's
/// cap. Ranks too large to enumerate start from the heuristic order and add
/// transposition neighbors.
pub(crate) fn candidate_orders(desc: &Descriptor, method: SelectionMethod) -> Vec<SVec<usize>> {
    let axes = loop_axes(desc);
    let levels = axes.len();
    let cap = match method {
        SelectionMethod::Estimate => 1,
        SelectionMethod::Measure => 16,
        SelectionMethod::Patient => 64,
        SelectionMethod::Crazy => {
            if factorial(levels) <= ENUMERATION_CAP {
                ENUMERATION_CAP
            } else {
                64
            }
        }
    };

    if levels <= 1 {
        return vec![axes];
    }

    let mut orders: Vec<SVec<usize>> = Vec::new();
    if factorial(levels) <= ENUMERATION_CAP {
        let mut scratch: SVec<usize> = axes.clone();
        let n = scratch.len();
        heap_permute(&mut scratch, n, &mut |perm| {
            orders.push(SmallVec::from_slice(perm));
        });
    } else {
        let best = heuristic_order(desc);
        orders.push(best.clone());
        for i in 0..levels {
            for j in (i + 1)..levels {
                let mut o = best.clone();
                o.swap(i, j);
                orders.push(o);
            }
        }
    }

    orders.sort_by(|a, b| {
        loop_cost(desc, a)
            .partial_cmp(&loop_cost(desc, b))
            .unwrap()
            .then_with(|| a.as_slice().cmp(b.as_slice()))
    });
    orders.dedup();
    orders.truncate(cap.max(1));
    orders
}

/// Saturating factorial; high ranks only need to compare against the cap.
fn factorial(n: usize) -> usize {
    (1..=n)
        .try_fold(1usize, |acc, k| acc.checked_mul(k))
        .unwrap_or(usize::MAX)
}

/// Heap's algorithm over the first `k` positions.
fn heap_permute(arr: &mut SVec<usize>, k: usize, f: &mut impl FnMut(&[usize])) {
    if k <= 1 {
        f(arr);
        return;
    }
    for i in 0..k {
        heap_permute(arr, k - 1, f);
        if k % 2 == 0 {
            arr.swap(i, k - 1);
        } else {
            arr.swap(0, k - 1);
        }
    }
}
