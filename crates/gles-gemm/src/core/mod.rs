//! GEMM kernel family.
//!
//! A multiply `dst = alpha · A × B` runs as up to three launches:
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │ Interleave4x4 (A)    │   │ Transpose1xW (B)     │   reshaped path only
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            └────────────┬─────────────┘
//!                ┌────────▼─────────┐
//!                │ MatrixMultiply   │  4×W tiles (reshaped) or rows×cols (direct)
//!                └────────┬─────────┘
//!                ┌────────▼─────────┐
//!                │ MatrixAddition   │  dst += beta · C, when beta ≠ 0
//!                └──────────────────┘
//! ```
//!
//! # Reshaped layout
//!
//! With W the vector width of the type, H the transpose multiplicity and V
//! the interleave multiplicity:
//!
//! | Operand | Element | Destination (row, column) |
//! |---------|---------|---------------------------|
//! | A (M×K) | `A[4r + i][k]` | `(r / V, k·4V + (r % V)·4 + i)` |
//! | B (K×N) | `B[k][cW + j]` | `(c / H, k·W·H + (c % H)·W + j)` |
//!
//! Incomplete blocks are zero-filled, so the multiply loop never masks.
//!
//! # Module Contents
//!
//! - [`tiling`](tiling): reshape and tile geometry
//! - [`reshape`](reshape): interleave, transpose-1xW and plain transpose kernels
//! - [`kernel`](kernel): tile templates and Midgard/Bifrost schedules
//! - [`gemm`](gemm): the configured multiply kernel
//! - [`epilogue`](epilogue): the matrix addition kernel

mod epilogue;
mod gemm;
mod kernel;
mod reshape;
mod tiling;

pub use epilogue::MatrixAdditionKernel;
pub use gemm::MatrixMultiplyKernel;
pub use kernel::{
    direct_work_item, reshaped_work_item, Bifrost, Midgard, MultiplyArgs, Schedule, Tile,
};
pub use reshape::{Interleave4x4Kernel, Transpose1xWKernel, TransposeKernel};
pub use tiling::{ReshapeInfo, TileShape, INTERLEAVE_HEIGHT, MAX_DIRECT_COLS, MAX_DIRECT_ROWS};
