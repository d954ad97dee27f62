//! Target detection, tuning and kernel dispatch.
//!
//! # Targets
//!
//! | Target | GPUs | Schedule |
//! |--------|------|----------|
//! | [`GpuTarget::Midgard`] | Mali-T6xx..T8xx | unroll 2, multiply then add |
//! | [`GpuTarget::Bifrost`] | Mali-G5x..G7x | unroll 8, preload then fused multiply-add |
//!
//! # Configuration
//!
//! [`KernelRegistry`] maps (element kind, [`ShapeClass`], target) to a
//! [`GemmPath`]. The built-in table:
//!
//! | Target | Small (M ≤ 16) | Large |
//! |--------|----------------|-------|
//! | Midgard | direct, 2 rows × W | reshaped, H = 1, V = 1 |
//! | Bifrost | direct, 4 rows × W | reshaped, V = 2, H = 2 (F32) or 1 |
//!
//! Environment overrides, read once:
//! - `GLES_GEMM_TARGET`: target name or GPU name
//! - `GLES_GEMM_FORCE_RESHAPE`: `1`/`true` takes the reshaped path for every size

mod detect;
mod dispatch;
mod registry;

pub(crate) use dispatch::dispatch_data_type;
pub use detect::{gpu_target, GpuTarget, TARGET_ENV};
pub use dispatch::KernelDispatch;
pub use registry::{
    default_registry, GemmConfig, GemmPath, KernelRegistry, ShapeClass, FORCE_RESHAPE_ENV,
    SMALL_M_THRESHOLD,
};
