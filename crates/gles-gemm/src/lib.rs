//! Blocked GEMM kernels for mobile GPUs, executed on the host.
//!
//! The crate reproduces the GLES compute GEMM family of a Mali inference
//! backend: every kernel is a work-item body replicated over a launch grid,
//! reading and writing strided tensor views.
//!
//! # Quick Start
//!
//! ```
//! use gles_gemm::matmul;
//!
//! let a = vec![1.0f32, 2.0, 3.0, 4.0];
//! let b = vec![5.0f32, 6.0, 7.0, 8.0];
//! let c = matmul(&a, 2, 2, &b, 2).unwrap();
//! assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
//! ```
//!
//! # Kernel-level API
//!
//! Kernels are configured once from [`TensorInfo`]s and launched on
//! [`TensorView`]s:
//!
//! ```
//! use gles_gemm::{
//!     DataType, GemmConfig, GpuTarget, Interleave4x4Kernel, MatrixMultiplyKernel,
//!     TensorInfo, TensorShape, TensorView, Transpose1xWKernel,
//! };
//!
//! let (m, n, k) = (5, 6, 3);
//! let mut a: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
//! let mut b: Vec<f32> = (0..k * n).map(|i| i as f32).collect();
//! let mut c = vec![0.0f32; m * n];
//!
//! let config = GemmConfig::reshaped(GpuTarget::Bifrost, 2, 2);
//! let a_info = TensorInfo::new(TensorShape::new(&[k, m]), DataType::F32);
//! let b_info = TensorInfo::new(TensorShape::new(&[n, k]), DataType::F32);
//! let c_info = TensorInfo::new(TensorShape::new(&[n, m]), DataType::F32);
//! let a_tmp_info = Interleave4x4Kernel::output_info(&a_info, 2);
//! let b_tmp_info = Transpose1xWKernel::output_info(&b_info, 2);
//!
//! let interleave = Interleave4x4Kernel::configure(&a_info, &a_tmp_info, 2).unwrap();
//! let transpose = Transpose1xWKernel::configure(&b_info, &b_tmp_info, 2).unwrap();
//! let multiply = MatrixMultiplyKernel::configure(&a_tmp_info, &b_tmp_info, &c_info, 1.0, &config).unwrap();
//!
//! let mut a_tmp = vec![0.0f32; a_tmp_info.shape().total_size()];
//! let mut b_tmp = vec![0.0f32; b_tmp_info.shape().total_size()];
//! unsafe {
//!     let a_tmp_view = TensorView::new(a_tmp.as_mut_ptr() as *mut u8, a_tmp_info);
//!     let b_tmp_view = TensorView::new(b_tmp.as_mut_ptr() as *mut u8, b_tmp_info);
//!     interleave.run(&TensorView::new(a.as_mut_ptr() as *mut u8, a_info), &a_tmp_view);
//!     transpose.run(&TensorView::new(b.as_mut_ptr() as *mut u8, b_info), &b_tmp_view);
//!     multiply.run(&a_tmp_view, &b_tmp_view, &TensorView::new(c.as_mut_ptr() as *mut u8, c_info));
//! }
//! assert_eq!(c[0], 0.0 * 0.0 + 1.0 * 6.0 + 2.0 * 12.0);
//! ```
//!
//! # Numeric types
//!
//! | Type | Storage | Accumulator | Vector width |
//! |------|---------|-------------|--------------|
//! | `f32` | 32-bit float | f32 | 4 |
//! | [`f16`] | 16-bit float | f16 | 8 |
//! | [`Qs8`] | 8-bit fixed point | 16-bit, saturating | 16 |
//! | [`Qs16`] | 16-bit fixed point | 32-bit, saturating | 8 |
//!
//! # Features
//!
//! - `parallel` (default): run grid rows on the rayon thread pool

pub mod api;
pub mod arch;
pub mod core;
pub mod error;
pub mod launch;
pub mod tensor;
pub mod types;

pub use api::{matmul, matmul_reference, matmul_strided_batched, Gemm};
pub use arch::{
    default_registry, gpu_target, GemmConfig, GemmPath, GpuTarget, KernelDispatch,
    KernelRegistry, ShapeClass,
};
pub use crate::core::{
    Bifrost, Interleave4x4Kernel, MatrixAdditionKernel, MatrixMultiplyKernel, Midgard,
    ReshapeInfo, Schedule, TileShape, Transpose1xWKernel, TransposeKernel,
};
pub use error::{GemmError, Result};
pub use launch::{launch, Grid};
pub use tensor::{Coordinates, KernelArg, Padding, TensorInfo, TensorShape, TensorView};
pub use types::{f16, DataType, ElementKind, Fixed, FixedWidth, GemmScalar, Qs16, Qs8};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::{matmul, matmul_strided_batched, Gemm};
    pub use crate::arch::{GemmConfig, GpuTarget, KernelDispatch};
    pub use crate::tensor::{TensorInfo, TensorShape, TensorView};
    pub use crate::types::{f16, DataType, GemmScalar, Qs16, Qs8};
}
