//! Tensor addressing model.
//!
//! Every kernel in the crate reaches memory through the same arithmetic:
//!
//! ```text
//! address(x, y, z, ...) = base + offset_first_element + x·stride_x + y·stride_y + z·stride_z + ...
//! ```
//!
//! - [`TensorShape`]: logical extents, innermost (x) first
//! - [`TensorInfo`]: shape + data type + byte strides + padding
//! - [`TensorView`]: base pointer + info; computes byte offsets, loads, stores
//! - [`KernelArg`]: per-work-item form (stride and step per dimension)
//!
//! Views never own, resize or reallocate memory. Offsets are computed in
//! O(rank) with no bounds checks.

mod info;
mod shape;
mod view;

pub use info::{Padding, TensorInfo};
pub use shape::{Coordinates, Strides, TensorShape, MAX_DIMS};
pub use view::{KernelArg, TensorView};
