//! Problem normalization: validation, axis fusion, leading dimensions.
//!
//! The permutation convention: `perm[k]` names the A-axis whose index varies
//! along B-axis `k`, so `size_b[k] = size_a[perm[k]]`. Axis 0 is the
//! fastest-varying (unit-stride) axis of each operand.

use smallvec::SmallVec;

use crate::{Result, TransposeError};

/// Stack-allocated vector for per-axis bookkeeping.
pub(crate) type SVec<T> = SmallVec<[T; 8]>;

/// Normalized problem geometry shared by planner and executor.
///
/// Invariants: `perm` is a bijection, all sizes are positive,
/// `outer >= size` per axis, and no adjacent pair of axes is fusible.
#[derive(Debug, Clone)]
pub(crate) struct Descriptor {
    /// Logical extent per A-axis.
    pub size_a: SVec<usize>,
    /// A-axis varying along each B-axis.
    pub perm: SVec<usize>,
    /// B-axis along which each A-axis varies (inverse of `perm`).
    pub inv_perm: SVec<usize>,
    /// Padded allocation extent per A-axis.
    pub outer_a: SVec<usize>,
    /// Padded allocation extent per B-axis.
    pub outer_b: SVec<usize>,
    /// Element stride per A-axis: prefix products of `outer_a`.
    pub lda: SVec<usize>,
    /// Element stride per B-axis: prefix products of `outer_b`.
    pub ldb: SVec<usize>,
}

impl Descriptor {
    /// Validate and normalize raw parameters.
    ///
    /// `outer_size_a`/`outer_size_b` default to the logical sizes when
    /// absent. Fusible axis pairs (consecutively permuted, unpadded on both
    /// sides) are coalesced until none remain; unpadded size-1 axes are
    /// elided.
    pub fn build(
        size_a: &[usize],
        perm: &[usize],
        outer_size_a: Option<&[usize]>,
        outer_size_b: Option<&[usize]>,
    ) -> Result<Self> {
        let dim = size_a.len();
        if dim == 0 {
            return Err(TransposeError::RankZero);
        }
        if perm.len() != dim {
            return Err(TransposeError::LengthMismatch(dim, perm.len()));
        }

        let mut seen = vec![false; dim];
        for &p in perm {
            if p >= dim || seen[p] {
                return Err(TransposeError::NotAPermutation(perm.to_vec(), dim));
            }
            seen[p] = true;
        }

        for (axis, &s) in size_a.iter().enumerate() {
            if s == 0 {
                return Err(TransposeError::ZeroSize { axis });
            }
        }

        let mut size_a: SVec<usize> = SmallVec::from_slice(size_a);
        let mut perm: SVec<usize> = SmallVec::from_slice(perm);

        let mut outer_a: SVec<usize> = match outer_size_a {
            Some(o) => {
                if o.len() != dim {
                    return Err(TransposeError::LengthMismatch(dim, o.len()));
                }
                SmallVec::from_slice(o)
            }
            None => size_a.clone(),
        };
        let mut outer_b: SVec<usize> = match outer_size_b {
            Some(o) => {
                if o.len() != dim {
                    return Err(TransposeError::LengthMismatch(dim, o.len()));
                }
                SmallVec::from_slice(o)
            }
            None => perm.iter().map(|&p| size_a[p]).collect(),
        };

        for axis in 0..dim {
            if outer_a[axis] < size_a[axis] {
                return Err(TransposeError::OuterTooSmall {
                    axis,
                    outer: outer_a[axis],
                    size: size_a[axis],
                });
            }
            let size_b = size_a[perm[axis]];
            if outer_b[axis] < size_b {
                return Err(TransposeError::OuterTooSmall {
                    axis,
                    outer: outer_b[axis],
                    size: size_b,
                });
            }
        }

        fuse_axes(&mut size_a, &mut perm, &mut outer_a, &mut outer_b);
        elide_unit_axes(&mut size_a, &mut perm, &mut outer_a, &mut outer_b);

        let dim = size_a.len();
        let mut inv_perm: SVec<usize> = smallvec::smallvec![0; dim];
        for (k, &p) in perm.iter().enumerate() {
            inv_perm[p] = k;
        }

        let lda = leading_dims(&outer_a);
        let ldb = leading_dims(&outer_b);

        Ok(Descriptor {
            size_a,
            perm,
            inv_perm,
            outer_a,
            outer_b,
            lda,
            ldb,
        })
    }

    pub fn dim(&self) -> usize {
        self.size_a.len()
    }

    /// Logical extent per B-axis.
    pub fn size_b(&self, k: usize) -> usize {
        self.size_a[self.perm[k]]
    }

    /// Allocation extent of A in elements.
    pub fn elems_a(&self) -> usize {
        self.outer_a.iter().product()
    }

    /// Allocation extent of B in elements.
    pub fn elems_b(&self) -> usize {
        self.outer_b.iter().product()
    }

    /// Total logical elements moved per execution.
    pub fn total_logical(&self) -> usize {
        self.size_a.iter().product()
    }

    /// Whether the unit-stride axis is shared by both operands
    /// (`perm[0] == 0`), selecting the strided-copy leaf.
    pub fn const_stride1(&self) -> bool {
        self.perm[0] == 0
    }
}

/// Prefix products: `ld[0] = 1`, `ld[k] = ld[k-1] * outer[k-1]`.
fn leading_dims(outer: &[usize]) -> SVec<usize> {
    let mut ld: SVec<usize> = SmallVec::with_capacity(outer.len());
    let mut acc = 1usize;
    for &o in outer {
        ld.push(acc);
        acc *= o;
    }
    ld
}

/// Repeatedly coalesce adjacent consecutively-permuted axes.
///
/// B-axes `k` and `k+1` fuse when they map to consecutive A-axes
/// (`perm[k] + 1 == perm[k+1]`) and the lower axis of the pair carries no
/// padding on either side. Scanning runs from the highest pair down so the
/// unit-stride axis keeps position 0 where possible; the scan restarts after
/// every fuse and terminates when a full pass finds nothing.
fn fuse_axes(
    size_a: &mut SVec<usize>,
    perm: &mut SVec<usize>,
    outer_a: &mut SVec<usize>,
    outer_b: &mut SVec<usize>,
) {
    'retry: loop {
        let dim = size_a.len();
        for k in (0..dim.saturating_sub(1)).rev() {
            let p = perm[k];
            if perm[k + 1] != p + 1 {
                continue;
            }
            // The lower axis must be unpadded in both operands.
            if outer_a[p] != size_a[p] || outer_b[k] != size_a[p] {
                continue;
            }
            let low = size_a[p];
            size_a[p] = low * size_a[p + 1];
            outer_a[p] = low * outer_a[p + 1];
            outer_b[k] = low * outer_b[k + 1];
            size_a.remove(p + 1);
            outer_a.remove(p + 1);
            outer_b.remove(k + 1);
            perm.remove(k + 1);
            for q in perm.iter_mut() {
                if *q > p {
                    *q -= 1;
                }
            }
            continue 'retry;
        }
        break;
    }
}

/// Drop axes of logical and padded extent 1 on both sides.
///
/// Such axes contribute a single iteration and a stride factor of 1; keeping
/// at least one axis preserves the rank >= 1 invariant.
fn elide_unit_axes(
    size_a: &mut SVec<usize>,
    perm: &mut SVec<usize>,
    outer_a: &mut SVec<usize>,
    outer_b: &mut SVec<usize>,
) {
    let mut k = perm.len();
    while k > 0 && perm.len() > 1 {
        k -= 1;
        let p = perm[k];
        if size_a[p] != 1 || outer_a[p] != 1 || outer_b[k] != 1 {
            continue;
        }
        size_a.remove(p);
        outer_a.remove(p);
        outer_b.remove(k);
        perm.remove(k);
        for q in perm.iter_mut() {
            if *q > p {
                *q -= 1;
            }
        }
        k = perm.len();
    }
}
