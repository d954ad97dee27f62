//! Numeric type definitions.
//!
//! The kernel family supports four element representations:
//!
//! | Type | Storage | Accumulator | Vector width | Notes |
//! |------|---------|-------------|--------------|-------|
//! | `f32` | 32-bit IEEE | `f32` | 4 | |
//! | [`f16`] | 16-bit IEEE | `f16` | 8 | accumulates at half precision |
//! | [`Qs8`] | `i8` | `i16` | 16 | fixed point, fractional bits per tensor |
//! | [`Qs16`] | `i16` | `i32` | 8 | fixed point, fractional bits per tensor |
//!
//! The vector width is the number of lanes in a 16-byte vector register and
//! is also the width of the transposed row-blocks produced by the
//! transpose-1xW reshape.
//!
//! # Fixed point
//!
//! A fixed-point tensor stores raw integers and declares one fractional
//! position for the whole tensor (`DataType::Qs8 { frac_bits }`). Arithmetic
//! goes through the [`Fixed`] value type, which carries its width and
//! fractional position with it:
//!
//! ```rust
//! use gles_gemm::types::{Fixed, FixedWidth};
//!
//! // 1.5 and 2.0 in Q4.3 (3 fractional bits)
//! let a = Fixed::from_f32(1.5, FixedWidth::W8, 3);
//! let b = Fixed::from_f32(2.0, FixedWidth::W8, 3);
//! assert_eq!(a.saturating_mul(b).to_f32(), 3.0);
//!
//! // The product overflows Q4.3 and saturates to the maximum.
//! let big = Fixed::from_f32(15.0, FixedWidth::W8, 3);
//! assert_eq!(big.saturating_mul(big).raw(), i8::MAX as i32);
//! ```
//!
//! # Core Traits
//!
//! - [`GemmScalar`]: the operations the tiling templates are generic over
//!   (accumulate, narrow, scale, scaled add).

mod data_type;
mod fixed;
mod scalar;
mod traits;

pub use data_type::{DataType, ElementKind};
pub use fixed::{Fixed, FixedWidth};
pub use half::f16;
pub use scalar::{Qs16, Qs8};
pub use traits::GemmScalar;
