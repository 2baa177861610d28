//! Macro-kernel leaves: a tile of up to `BLOCK x BLOCK` elements built from
//! a grid of micro tiles, and the contiguous scaled-copy run used when the
//! unit-stride axis is shared by both operands.

use crate::element::Element;
use crate::micro_kernel::transpose_micro;

/// Process a tile of `tile_a x tile_b` elements (`<= BLOCK` each).
///
/// - `src` points at the tile origin; its unit-stride axis runs along
///   `tile_a`, and `lda` steps along `tile_b`.
/// - `dst` points at the transposed origin; its unit-stride axis runs along
///   `tile_b`, and `ldb` steps along `tile_a`.
///
/// Full `MICRO x MICRO` sub-tiles go through the micro-kernel; the right,
/// bottom and corner remainders take scalar loops.
///
/// # Safety
/// `src`/`dst` must be valid for the given tile extents and strides, and
/// must not overlap.
pub(crate) unsafe fn macro_kernel<T: Element, const BETA_ZERO: bool>(
    src: *const T,
    lda: isize,
    tile_a: usize,
    dst: *mut T,
    ldb: isize,
    tile_b: usize,
    alpha: T,
    beta: T,
) {
    let micro = T::MICRO;
    let full_a = tile_a / micro;
    let rem_a = tile_a % micro;
    let full_b = tile_b / micro;
    let rem_b = tile_b % micro;

    for jb in 0..full_b {
        let j = (jb * micro) as isize;
        for ia in 0..full_a {
            let i = (ia * micro) as isize;
            transpose_micro::<T, BETA_ZERO>(
                src.offset(i + j * lda),
                lda,
                dst.offset(j + i * ldb),
                ldb,
                alpha,
                beta,
            );
        }
        if rem_a > 0 {
            let i = full_a * micro;
            scalar_patch::<T, BETA_ZERO>(src, lda, i, rem_a, dst, ldb, j as usize, micro, alpha, beta);
        }
    }

    if rem_b > 0 {
        let j = full_b * micro;
        for ia in 0..full_a {
            let i = ia * micro;
            scalar_patch::<T, BETA_ZERO>(src, lda, i, micro, dst, ldb, j, rem_b, alpha, beta);
        }
        if rem_a > 0 {
            let i = full_a * micro;
            scalar_patch::<T, BETA_ZERO>(src, lda, i, rem_a, dst, ldb, j, rem_b, alpha, beta);
        }
    }
}

/// Scalar edge loop over a `len_a x len_b` patch at `(i0, j0)`.
#[inline]
unsafe fn scalar_patch<T: Element, const BETA_ZERO: bool>(
    src: *const T,
    lda: isize,
    i0: usize,
    len_a: usize,
    dst: *mut T,
    ldb: isize,
    j0: usize,
    len_b: usize,
    alpha: T,
    beta: T,
) {
    for jj in 0..len_b as isize {
        let j = j0 as isize + jj;
        for ii in 0..len_a as isize {
            let i = i0 as isize + ii;
            let a = *src.offset(i + j * lda);
            let d = dst.offset(j + i * ldb);
            if BETA_ZERO {
                *d = T::scale(alpha, a);
            } else {
                *d = T::axpby(alpha, a, beta, *d);
            }
        }
    }
}

/// Contiguous scaled-copy leaf for the shared unit-stride path:
/// `dst[r] = alpha * src[r] (+ beta * dst[r])` for `r in 0..len`.
///
/// With `BETA_ZERO`, `STREAM` and `alpha == 1` the run degenerates to a
/// bulk copy, which large transfers turn into wide (write-combining)
/// stores.
///
/// # Safety
/// `src` readable and `dst` writable for `len` contiguous elements;
/// non-overlapping.
#[inline(always)]
pub(crate) unsafe fn axpby_run<T: Element, const BETA_ZERO: bool, const STREAM: bool>(
    src: *const T,
    dst: *mut T,
    len: usize,
    alpha: T,
    beta: T,
) {
    if BETA_ZERO {
        if STREAM && alpha.is_one() {
            std::ptr::copy_nonoverlapping(src, dst, len);
            return;
        }
        for r in 0..len {
            *dst.add(r) = T::scale(alpha, *src.add(r));
        }
    } else {
        for r in 0..len {
            let d = dst.add(r);
            *d = T::axpby(alpha, *src.add(r), beta, *d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_tile(
        src: &[f64],
        lda: usize,
        tile_a: usize,
        dst0: &[f64],
        ldb: usize,
        tile_b: usize,
        alpha: f64,
        beta: f64,
    ) -> Vec<f64> {
        let mut out = dst0.to_vec();
        for j in 0..tile_b {
            for i in 0..tile_a {
                out[j + i * ldb] = alpha * src[i + j * lda] + beta * dst0[j + i * ldb];
            }
        }
        out
    }

    #[test]
    fn test_macro_full_block() {
        let n = <f64 as Element>::BLOCK;
        let src: Vec<f64> = (0..n * n).map(|i| i as f64).collect();
        let mut dst = vec![0.0f64; n * n];

        unsafe {
            macro_kernel::<f64, true>(
                src.as_ptr(),
                n as isize,
                n,
                dst.as_mut_ptr(),
                n as isize,
                n,
                1.0,
                0.0,
            );
        }

        let expected = reference_tile(&src, n, n, &vec![0.0; n * n], n, n, 1.0, 0.0);
        assert_eq!(dst, expected);
    }

    #[test]
    fn test_macro_with_remainders() {
        // 15 x 17 tile: remainders on both edges for MICRO=4.
        let tile_a = 15;
        let tile_b = 17;
        let lda = 20;
        let ldb = 18;
        let src: Vec<f64> = (0..lda * tile_b).map(|i| (i + 1) as f64).collect();
        let dst0: Vec<f64> = (0..ldb * tile_a).map(|i| (i as f64) * 0.5).collect();
        let mut dst = dst0.clone();

        unsafe {
            macro_kernel::<f64, false>(
                src.as_ptr(),
                lda as isize,
                tile_a,
                dst.as_mut_ptr(),
                ldb as isize,
                tile_b,
                2.0,
                -1.0,
            );
        }

        let expected = reference_tile(&src, lda, tile_a, &dst0, ldb, tile_b, 2.0, -1.0);
        assert_eq!(dst, expected);
    }

    #[test]
    fn test_macro_smaller_than_micro() {
        let tile_a = 3;
        let tile_b = 2;
        let lda = 5;
        let ldb = 4;
        let src: Vec<f64> = (0..lda * tile_b).map(|i| i as f64).collect();
        let mut dst = vec![0.0f64; ldb * tile_a];

        unsafe {
            macro_kernel::<f64, true>(
                src.as_ptr(),
                lda as isize,
                tile_a,
                dst.as_mut_ptr(),
                ldb as isize,
                tile_b,
                3.0,
                0.0,
            );
        }

        for j in 0..tile_b {
            for i in 0..tile_a {
                assert_eq!(dst[j + i * ldb], 3.0 * src[i + j * lda]);
            }
        }
    }

    #[test]
    fn test_axpby_run_scaled() {
        let src = vec![1.0f64, 2.0, 3.0, 4.0];
        let mut dst = vec![10.0f64; 4];
        unsafe {
            axpby_run::<f64, false, false>(src.as_ptr(), dst.as_mut_ptr(), 4, 3.0, -1.0);
        }
        assert_eq!(dst, vec![-7.0, -4.0, -1.0, 2.0]);
    }

    #[test]
    fn test_axpby_run_bulk_copy() {
        let src = vec![1.0f64, 2.0, 3.0];
        let mut dst = vec![0.0f64; 3];
        unsafe {
            axpby_run::<f64, true, true>(src.as_ptr(), dst.as_mut_ptr(), 3, 1.0, 0.0);
        }
        assert_eq!(dst, src);
    }
}
