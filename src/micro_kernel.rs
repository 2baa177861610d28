//! Register-tile transpose micro-kernel with fused scale-and-accumulate.
//!
//! Plain nested loops over a `MICRO x MICRO` tile; the trip counts are
//! monomorphized constants, so LLVM unrolls and vectorizes the body into
//! lane-shuffle form. The `BETA_ZERO` variant never loads from the
//! destination.

use crate::element::Element;

/// Transpose one full `MICRO x MICRO` tile:
/// `dst[i + j*ldb] = alpha * src[i*lda + j] (+ beta * dst[i + j*ldb])`.
///
/// `j` runs along the source's unit-stride axis, `i` along the
/// destination's.
///
/// # Safety
/// - `src` must be readable for `MICRO` elements at unit stride in each of
///   `MICRO` rows of stride `lda`.
/// - `dst` must be readable (when `BETA_ZERO` is false) and writable for
///   `MICRO` elements at unit stride in each of `MICRO` rows of stride
///   `ldb`.
/// - The tiles must not overlap.
#[inline(always)]
pub(crate) unsafe fn transpose_micro<T: Element, const BETA_ZERO: bool>(
    src: *const T,
    lda: isize,
    dst: *mut T,
    ldb: isize,
    alpha: T,
    beta: T,
) {
    for j in 0..T::MICRO as isize {
        for i in 0..T::MICRO as isize {
            let a = *src.offset(i * lda + j);
            let d = dst.offset(i + j * ldb);
            if BETA_ZERO {
                *d = T::scale(alpha, a);
            } else {
                *d = T::axpby(alpha, a, beta, *d);
            }
        }
    }
}
