//! Element-type traits for the tiled kernels.
//!
//! The blocking scheme is derived from the SIMD register width: a micro tile
//! is `LANES x LANES` elements and a macro tile is four micro tiles per side.
//! Complex types run over the same lanes as interleaved real/imaginary
//! pairs, so their lane count is halved relative to the underlying real.

use num_complex::Complex;
use num_traits::{One, Zero};

/// SIMD register width assumed by the blocking scheme, in bits.
#[cfg(target_arch = "aarch64")]
pub const REGISTER_BITS: usize = 128;
/// SIMD register width assumed by the blocking scheme, in bits.
#[cfg(not(target_arch = "aarch64"))]
pub const REGISTER_BITS: usize = 256;

/// A numeric element the transpose engine can operate on.
///
/// The kernels are generic over this trait and monomorphized per type; the
/// associated constants fix the register-tile and macro-tile geometry.
pub trait Element:
    Copy
    + Send
    + Sync
    + PartialEq
    + std::fmt::Debug
    + Zero
    + One
    + std::ops::Add<Output = Self>
    + std::ops::Mul<Output = Self>
    + 'static
{
    /// SIMD lanes available for this type: register bits / element bits.
    const LANES: usize;
    /// Micro-tile edge, in elements.
    const MICRO: usize;
    /// Macro-tile edge: four micro tiles.
    const BLOCK: usize;

    /// `alpha * a`.
    #[inline(always)]
    fn scale(alpha: Self, a: Self) -> Self {
        alpha * a
    }

    /// `alpha * a + beta * b`, fused where the hardware allows.
    #[inline(always)]
    fn axpby(alpha: Self, a: Self, beta: Self, b: Self) -> Self {
        alpha * a + beta * b
    }
}

macro_rules! impl_real_element {
    ($t:ty) => {
        impl Element for $t {
            const LANES: usize = REGISTER_BITS / 8 / std::mem::size_of::<$t>();
            const MICRO: usize = Self::LANES;
            const BLOCK: usize = 4 * Self::LANES;

            #[inline(always)]
            fn axpby(alpha: Self, a: Self, beta: Self, b: Self) -> Self {
                alpha.mul_add(a, beta * b)
            }
        }
    };
}

macro_rules! impl_complex_element {
    ($t:ty) => {
        impl Element for Complex<$t> {
            // Interleaved re/im pairs share the lanes of the real type.
            const LANES: usize = REGISTER_BITS / 8 / std::mem::size_of::<Complex<$t>>();
            const MICRO: usize = Self::LANES;
            const BLOCK: usize = 4 * Self::LANES;
        }
    };
}

impl_real_element!(f32);
impl_real_element!(f64);
impl_complex_element!(f32);
impl_complex_element!(f64);
