use half::f16;

use crate::types::{DataType, Qs16, Qs8};

use super::info::TensorInfo;
use super::shape::{Coordinates, MAX_DIMS};

/// A strided view over tensor memory: base pointer plus [`TensorInfo`].
///
/// Views do not own memory. Every address is
/// `base + offset_first_element + Σ index[d] * stride[d]`, computed without
/// bounds checks; callers guarantee indices are in range.
#[derive(Debug, Clone, Copy)]
pub struct TensorView {
    base: *mut u8,
    info: TensorInfo,
}

// Work-items of one launch write disjoint regions through copies of the same
// view; the memory behind the pointer outlives the launch.
unsafe impl Send for TensorView {}
unsafe impl Sync for TensorView {}

impl TensorView {
    /// # Safety
    /// `base` must point to at least `info.total_size()` bytes that stay valid
    /// for as long as the view (or any copy of it) is used.
    pub unsafe fn new(base: *mut u8, info: TensorInfo) -> Self {
        Self { base, info }
    }

    /// # Safety
    /// Same as [`TensorView::new`]. The view must only be read through.
    pub unsafe fn new_const(base: *const u8, info: TensorInfo) -> Self {
        Self {
            base: base as *mut u8,
            info,
        }
    }

    #[inline(always)]
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    #[inline(always)]
    pub fn data_type(&self) -> DataType {
        self.info.data_type()
    }

    #[inline(always)]
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Byte offset of `(x, y)` from the base pointer.
    #[inline(always)]
    pub fn offset_2d(&self, x: usize, y: usize) -> usize {
        let s = self.info.strides();
        self.info.offset_first_element() + x * s[0] + y * s[1]
    }

    /// Byte offset of `(x, y, z)`: the 2D offset plus `z * stride_z`.
    #[inline(always)]
    pub fn offset_3d(&self, x: usize, y: usize, z: usize) -> usize {
        self.offset_2d(x, y) + z * self.info.stride(2)
    }

    #[inline(always)]
    pub fn offset_4d(&self, x: usize, y: usize, z: usize, w: usize) -> usize {
        self.offset_3d(x, y, z) + w * self.info.stride(3)
    }

    /// Byte offset of an N-D index.
    #[inline(always)]
    pub fn offset(&self, coords: &Coordinates) -> usize {
        let s = self.info.strides();
        let index = coords.as_array();
        let mut offset = self.info.offset_first_element();
        for d in 0..MAX_DIMS {
            offset += index[d] * s[d];
        }
        offset
    }

    /// # Safety
    /// `offset` must lie inside the tensor's buffer.
    #[inline(always)]
    pub unsafe fn ptr_at(&self, offset: usize) -> *mut u8 {
        self.base.add(offset)
    }

    /// # Safety
    /// `offset` must address a valid `T` inside the buffer.
    #[inline(always)]
    pub unsafe fn load<T: Copy>(&self, offset: usize) -> T {
        std::ptr::read_unaligned(self.base.add(offset) as *const T)
    }

    /// # Safety
    /// `offset` must address a valid `T` inside the buffer, and no other
    /// work-item may touch it concurrently.
    #[inline(always)]
    pub unsafe fn store<T: Copy>(&self, offset: usize, value: T) {
        std::ptr::write_unaligned(self.base.add(offset) as *mut T, value)
    }

    /// Load one element of any supported data type as `f32`.
    ///
    /// # Safety
    /// As for [`TensorView::load`].
    #[inline]
    pub unsafe fn load_f32(&self, offset: usize) -> f32 {
        match self.info.data_type() {
            DataType::F32 => self.load::<f32>(offset),
            DataType::F16 => self.load::<f16>(offset).to_f32(),
            DataType::Qs8 { frac_bits } => self.load::<Qs8>(offset).to_f32(frac_bits),
            DataType::Qs16 { frac_bits } => self.load::<Qs16>(offset).to_f32(frac_bits),
            DataType::S32 => self.load::<i32>(offset) as f32,
        }
    }

    /// Store an `f32` converted to the tensor's data type.
    ///
    /// # Safety
    /// As for [`TensorView::store`].
    #[inline]
    pub unsafe fn store_f32(&self, offset: usize, value: f32) {
        match self.info.data_type() {
            DataType::F32 => self.store(offset, value),
            DataType::F16 => self.store(offset, f16::from_f32(value)),
            DataType::Qs8 { frac_bits } => self.store(offset, Qs8::from_f32(value, frac_bits)),
            DataType::Qs16 { frac_bits } => self.store(offset, Qs16::from_f32(value, frac_bits)),
            DataType::S32 => self.store(offset, value.round() as i32),
        }
    }

    /// The per-work-item argument form of this view.
    ///
    /// `elements_per_item[d]` is how many elements one work-item covers along
    /// dimension `d`.
    pub fn kernel_arg(&self, elements_per_item: [usize; 3]) -> KernelArg {
        let s = self.info.strides();
        KernelArg {
            base: self.base,
            offset_first_element: self.info.offset_first_element(),
            strides: [s[0], s[1], s[2]],
            steps: [
                s[0] * elements_per_item[0],
                s[1] * elements_per_item[1],
                s[2] * elements_per_item[2],
            ],
        }
    }
}

/// Operand as passed to one kernel: pointer, offset of the first element,
/// per-dimension stride and step.
///
/// The step is the stride multiplied by the number of elements each
/// work-item processes along that dimension, so a work-item's first element
/// sits at `base + offset_first_element + Σ gid[d] * step[d]`.
#[derive(Debug, Clone, Copy)]
pub struct KernelArg {
    base: *mut u8,
    offset_first_element: usize,
    strides: [usize; 3],
    steps: [usize; 3],
}

unsafe impl Send for KernelArg {}
unsafe impl Sync for KernelArg {}

impl KernelArg {
    #[inline(always)]
    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    #[inline(always)]
    pub fn step(&self, dim: usize) -> usize {
        self.steps[dim]
    }

    /// Byte offset of a work-item's first element.
    #[inline(always)]
    pub fn work_item_offset(&self, gid: [usize; 3]) -> usize {
        self.offset_first_element
            + gid[0] * self.steps[0]
            + gid[1] * self.steps[1]
            + gid[2] * self.steps[2]
    }

    /// # Safety
    /// The work-item must lie inside the tensor.
    #[inline(always)]
    pub unsafe fn work_item_ptr(&self, gid: [usize; 3]) -> *mut u8 {
        self.base.add(self.work_item_offset(gid))
    }
}
