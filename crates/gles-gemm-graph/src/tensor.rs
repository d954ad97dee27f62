//! Backing buffers and graph tensors.
//!
//! A [`GcBuffer`] stands in for a GLES shader storage buffer: a fixed-size
//! block of bytes that kernels read and write through [`TensorView`]s. A
//! [`GcTensor`] pairs a buffer with its [`TensorInfo`]. Graph [`Tensor`]s
//! carry a descriptor and, once allocated on the GC target, a backing
//! [`GcTensor`].

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use gles_gemm::{Coordinates, DataType, TensorInfo, TensorShape, TensorView};

use crate::error::{BackendError, Result};

/// Graph-level tensor identifier.
pub type TensorId = usize;

/// Execution target a tensor or node is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Neon,
    Cl,
    Gc,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Neon => "NEON",
            Target::Cl => "CL",
            Target::Gc => "GC",
        };
        f.write_str(name)
    }
}

/// Device buffer shared between kernels.
///
/// Kernels launched on the buffer write disjoint elements, so the bytes sit
/// in `UnsafeCell`s and are only touched through raw pointers.
pub struct GcBuffer {
    bytes: Box<[UnsafeCell<u8>]>,
}

unsafe impl Send for GcBuffer {}
unsafe impl Sync for GcBuffer {}

impl GcBuffer {
    /// Allocate `size` zeroed bytes.
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: (0..size).map(|_| UnsafeCell::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.bytes.as_ptr())
    }
}

impl fmt::Debug for GcBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcBuffer").field("len", &self.len()).finish()
    }
}

/// Visit every element coordinate of `shape`, x fastest.
pub(crate) fn for_each_coordinate(shape: &TensorShape, mut f: impl FnMut(&Coordinates)) {
    let total = shape.total_size();
    let dims = shape.as_slice();
    let mut index = vec![0usize; dims.len()];
    for _ in 0..total {
        f(&Coordinates::new(&index));
        for (d, extent) in dims.iter().enumerate() {
            index[d] += 1;
            if index[d] < *extent {
                break;
            }
            index[d] = 0;
        }
    }
}

/// A tensor allocated on the GC target.
#[derive(Debug, Clone)]
pub struct GcTensor {
    info: TensorInfo,
    buffer: Arc<GcBuffer>,
}

impl GcTensor {
    /// Allocate a zeroed tensor.
    pub fn new(info: TensorInfo) -> Self {
        Self {
            info,
            buffer: Arc::new(GcBuffer::zeroed(info.total_size())),
        }
    }

    /// Wrap an existing buffer.
    pub fn from_buffer(info: TensorInfo, buffer: Arc<GcBuffer>) -> Result<Self> {
        if buffer.len() < info.total_size() {
            return Err(BackendError::ShapeMismatch(format!(
                "buffer of {} bytes cannot hold {} ({} bytes)",
                buffer.len(),
                info.shape(),
                info.total_size()
            )));
        }
        Ok(Self { info, buffer })
    }

    /// Pooled buffers are acquired with at least `info.total_size()` bytes.
    pub(crate) fn from_pooled(info: TensorInfo, buffer: Arc<GcBuffer>) -> Self {
        debug_assert!(buffer.len() >= info.total_size());
        Self { info, buffer }
    }

    /// Allocate a tensor and fill it from `values` in x-fastest order,
    /// converting to the tensor's data type.
    pub fn from_f32(info: TensorInfo, values: &[f32]) -> Result<Self> {
        let tensor = Self::new(info);
        tensor.write_f32(values)?;
        Ok(tensor)
    }

    /// Allocate a tensor and copy `values` in as raw elements.
    pub fn from_slice<T: Copy>(info: TensorInfo, values: &[T]) -> Result<Self> {
        if std::mem::size_of::<T>() != info.element_size() {
            return Err(BackendError::UnsupportedDataType(info.data_type()));
        }
        let tensor = Self::new(info);
        tensor.check_len(values.len())?;
        let view = tensor.view();
        let mut values = values.iter();
        for_each_coordinate(info.shape(), |coords| {
            if let Some(&value) = values.next() {
                unsafe { view.store(view.offset(coords), value) };
            }
        });
        Ok(tensor)
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn shape(&self) -> &TensorShape {
        self.info.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.info.data_type()
    }

    pub fn buffer(&self) -> &Arc<GcBuffer> {
        &self.buffer
    }

    /// Same buffer seen under another shape.
    pub fn reinterpret(&self, shape: TensorShape) -> Result<Self> {
        Ok(Self {
            info: self.info.reinterpret(shape)?,
            buffer: Arc::clone(&self.buffer),
        })
    }

    /// Kernel view of the tensor.
    pub fn view(&self) -> TensorView {
        // the buffer is at least `info.total_size()` bytes long
        unsafe { TensorView::new(self.buffer.as_mut_ptr(), self.info) }
    }

    /// Overwrite the tensor from `values` in x-fastest order.
    pub fn write_f32(&self, values: &[f32]) -> Result<()> {
        self.check_len(values.len())?;
        let view = self.view();
        let mut values = values.iter();
        for_each_coordinate(self.info.shape(), |coords| {
            if let Some(&value) = values.next() {
                unsafe { view.store_f32(view.offset(coords), value) };
            }
        });
        Ok(())
    }

    /// Read the tensor back as `f32`s in x-fastest order.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let view = self.view();
        let mut out = Vec::with_capacity(self.info.shape().total_size());
        for_each_coordinate(self.info.shape(), |coords| {
            out.push(unsafe { view.load_f32(view.offset(coords)) });
        });
        out
    }

    /// Read the tensor back as raw elements in x-fastest order.
    pub fn to_vec<T: Copy>(&self) -> Result<Vec<T>> {
        if std::mem::size_of::<T>() != self.info.element_size() {
            return Err(BackendError::UnsupportedDataType(self.data_type()));
        }
        let view = self.view();
        let mut out = Vec::with_capacity(self.info.shape().total_size());
        for_each_coordinate(self.info.shape(), |coords| {
            out.push(unsafe { view.load::<T>(view.offset(coords)) });
        });
        Ok(out)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        let expected = self.info.shape().total_size();
        if len != expected {
            return Err(BackendError::ShapeMismatch(format!(
                "expected {} elements for {}, got {}",
                expected,
                self.info.shape(),
                len
            )));
        }
        Ok(())
    }
}

/// Shape, data type and target of a graph tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub shape: TensorShape,
    pub data_type: DataType,
    pub target: Target,
}

impl TensorDescriptor {
    pub fn new(shape: TensorShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            target: Target::Gc,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn info(&self) -> TensorInfo {
        TensorInfo::new(self.shape, self.data_type)
    }
}

/// Graph tensor: a descriptor plus its backing tensor once allocated.
#[derive(Debug, Clone)]
pub struct Tensor {
    id: TensorId,
    desc: TensorDescriptor,
    handle: Option<GcTensor>,
}

impl Tensor {
    /// A tensor with no backing memory yet.
    pub fn new(id: TensorId, desc: TensorDescriptor) -> Self {
        Self {
            id,
            desc,
            handle: None,
        }
    }

    /// A tensor backed by a fresh zeroed allocation.
    pub fn allocated(id: TensorId, desc: TensorDescriptor) -> Self {
        Self {
            id,
            desc,
            handle: Some(GcTensor::new(desc.info())),
        }
    }

    /// A tensor backed by an existing GC tensor.
    pub fn with_handle(id: TensorId, desc: TensorDescriptor, handle: GcTensor) -> Self {
        Self {
            id,
            desc,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn desc(&self) -> &TensorDescriptor {
        &self.desc
    }

    pub fn handle(&self) -> Option<&GcTensor> {
        self.handle.as_ref()
    }
}
