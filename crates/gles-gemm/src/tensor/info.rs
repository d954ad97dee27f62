use crate::error::{GemmError, Result};
use crate::types::DataType;

use super::shape::{Strides, TensorShape, MAX_DIMS};

/// Border padding around the first two dimensions, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Padding {
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
    pub left: usize,
}

impl Padding {
    pub const fn uniform(size: usize) -> Self {
        Self {
            top: size,
            right: size,
            bottom: size,
            left: size,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Shape, data type and memory layout of a tensor.
///
/// Strides are in bytes. For a contiguous tensor
/// `stride[d] == element_size * Π extent[0..d]`; padded tensors have larger
/// strides and a non-zero offset to their first element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    shape: TensorShape,
    data_type: DataType,
    strides: Strides,
    padding: Padding,
    offset_first_element: usize,
    total_size: usize,
}

impl TensorInfo {
    /// A contiguous tensor.
    pub fn new(shape: TensorShape, data_type: DataType) -> Self {
        Self::with_padding(shape, data_type, Padding::default())
    }

    /// A tensor whose x/y planes are surrounded by `padding` elements.
    pub fn with_padding(shape: TensorShape, data_type: DataType, padding: Padding) -> Self {
        let element_size = data_type.element_size();
        let padded_x = shape.x() + padding.left + padding.right;
        let padded_y = shape.y() + padding.top + padding.bottom;

        let mut strides = [0; MAX_DIMS];
        strides[0] = element_size;
        strides[1] = element_size * padded_x;
        strides[2] = strides[1] * padded_y;
        for d in 3..MAX_DIMS {
            strides[d] = strides[d - 1] * shape.dim(d - 1);
        }

        let offset_first_element = padding.top * strides[1] + padding.left * strides[0];
        let total_size = strides[MAX_DIMS - 1] * shape.dim(MAX_DIMS - 1);

        Self {
            shape,
            data_type,
            strides,
            padding,
            offset_first_element,
            total_size,
        }
    }

    #[inline(always)]
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    #[inline(always)]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline(always)]
    pub fn dimension(&self, dim: usize) -> usize {
        self.shape.dim(dim)
    }

    pub fn num_dimensions(&self) -> usize {
        self.shape.num_dimensions()
    }

    #[inline(always)]
    pub fn element_size(&self) -> usize {
        self.data_type.element_size()
    }

    #[inline(always)]
    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    #[inline(always)]
    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    #[inline(always)]
    pub fn offset_first_element(&self) -> usize {
        self.offset_first_element
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Bytes the backing buffer must hold.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn is_contiguous(&self) -> bool {
        self.padding.is_empty()
    }

    /// Number of matrices stacked above the first two dimensions.
    pub fn batches(&self) -> usize {
        self.shape.total_size_upper(2)
    }

    /// The same contiguous memory under a different shape.
    pub fn reinterpret(&self, shape: TensorShape) -> Result<Self> {
        if !self.is_contiguous() {
            return Err(GemmError::InvalidConfig(
                "cannot reinterpret a padded tensor".to_string(),
            ));
        }
        if shape.total_size() != self.shape.total_size() {
            return Err(GemmError::DimensionMismatch(format!(
                "cannot reinterpret {} as {}",
                self.shape, shape
            )));
        }
        Ok(Self::new(shape, self.data_type))
    }

    /// A copy with a different data type and the same shape and padding.
    pub fn with_data_type(&self, data_type: DataType) -> Self {
        Self::with_padding(self.shape, data_type, self.padding)
    }
}
