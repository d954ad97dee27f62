//! Runtime kernel selection.
//!
//! Kernels are monomorphised per element type and schedule. Two levels of
//! dispatch pick the instance at run time:
//! 1. [`dispatch_data_type!`] maps a [`DataType`](crate::types::DataType) to
//!    its storage type
//! 2. [`KernelDispatch`] maps a [`GpuTarget`] to its [`Schedule`]

use half::f16;

use crate::core::{
    direct_work_item, reshaped_work_item, Bifrost, Midgard, MultiplyArgs, ReshapeInfo, Schedule,
    TileShape,
};
use crate::launch::{launch, Grid};
use crate::types::{GemmScalar, Qs16, Qs8};

use super::detect::GpuTarget;

/// Evaluate `$body` with `$t` bound to the storage type of `$data_type`.
///
/// Only the multiply types (F32, F16, QS8, QS16) are handled; callers reject
/// other types when configuring.
macro_rules! dispatch_data_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type.kind() {
            $crate::types::ElementKind::F32 => {
                type $t = f32;
                $body
            }
            $crate::types::ElementKind::F16 => {
                type $t = ::half::f16;
                $body
            }
            $crate::types::ElementKind::Qs8 => {
                type $t = $crate::types::Qs8;
                $body
            }
            $crate::types::ElementKind::Qs16 => {
                type $t = $crate::types::Qs16;
                $body
            }
            $crate::types::ElementKind::S32 => {
                unreachable!("S32 is rejected when configuring")
            }
        }
    };
}

pub(crate) use dispatch_data_type;

/// Launch entry points for one element type, routed by target.
pub trait KernelDispatch: GemmScalar {
    fn launch_reshaped(
        name: &str,
        target: GpuTarget,
        args: MultiplyArgs,
        reshape: ReshapeInfo,
        alpha: Option<Self>,
        grid: Grid,
    ) {
        match target {
            GpuTarget::Midgard => launch_reshaped_with::<Self, Midgard>(name, args, reshape, alpha, grid),
            GpuTarget::Bifrost => launch_reshaped_with::<Self, Bifrost>(name, args, reshape, alpha, grid),
        }
    }

    fn launch_direct(
        name: &str,
        target: GpuTarget,
        args: MultiplyArgs,
        tile: TileShape,
        alpha: Option<Self>,
        grid: Grid,
    ) {
        match target {
            GpuTarget::Midgard => launch_direct_with::<Self, Midgard>(name, args, tile, alpha, grid),
            GpuTarget::Bifrost => launch_direct_with::<Self, Bifrost>(name, args, tile, alpha, grid),
        }
    }
}

fn launch_reshaped_with<T: GemmScalar, S: Schedule>(
    name: &str,
    args: MultiplyArgs,
    reshape: ReshapeInfo,
    alpha: Option<T>,
    grid: Grid,
) {
    launch(name, grid, move |gid| {
        reshaped_work_item::<T, S>(&args, &reshape, alpha, gid)
    });
}

fn launch_direct_with<T: GemmScalar, S: Schedule>(
    name: &str,
    args: MultiplyArgs,
    tile: TileShape,
    alpha: Option<T>,
    grid: Grid,
) {
    launch(name, grid, move |gid| direct_work_item::<T, S>(&args, &tile, alpha, gid));
}

macro_rules! impl_kernel_dispatch {
    ($($t:ty),* $(,)?) => {
        $(impl KernelDispatch for $t {})*
    };
}

impl_kernel_dispatch!(f32, f16, Qs8, Qs16);

#[cfg(test)]
mod tests {
    use crate::types::{DataType, GemmScalar};

    #[test]
    fn test_dispatch_data_type_binds_storage_type() {
        let width = |dt: DataType| dispatch_data_type!(dt, T => <T as GemmScalar>::VECTOR_WIDTH);
        assert_eq!(width(DataType::F32), 4);
        assert_eq!(width(DataType::F16), 8);
        assert_eq!(width(DataType::Qs8 { frac_bits: 1 }), 16);
        assert_eq!(width(DataType::Qs16 { frac_bits: 1 }), 8);
    }
}
