use std::fmt;

/// Maximum number of tensor dimensions.
pub const MAX_DIMS: usize = 6;

/// Logical shape of a tensor.
///
/// Dimension 0 is the innermost one (x, the columns of a matrix), dimension 1
/// is y (rows), dimension 2 is z (channels or matrix batches) and dimension 3
/// is w (batches of 3D activations). Dimensions past `num_dimensions` read as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorShape {
    dims: [usize; MAX_DIMS],
    num_dimensions: usize,
}

impl TensorShape {
    /// Build a shape from its extents, innermost first.
    ///
    /// Trailing extents of 1 do not count as dimensions.
    pub fn new(dims: &[usize]) -> Self {
        assert!(dims.len() <= MAX_DIMS, "at most {} dimensions", MAX_DIMS);
        let mut shape = Self {
            dims: [1; MAX_DIMS],
            num_dimensions: 0,
        };
        for (i, &d) in dims.iter().enumerate() {
            shape.set(i, d);
        }
        shape
    }

    /// Set one extent, growing `num_dimensions` if needed.
    pub fn set(&mut self, dim: usize, extent: usize) {
        assert!(dim < MAX_DIMS, "dimension {} out of range", dim);
        self.dims[dim] = extent;
        if extent != 1 && dim >= self.num_dimensions {
            self.num_dimensions = dim + 1;
        } else if dim + 1 == self.num_dimensions && extent == 1 {
            while self.num_dimensions > 0 && self.dims[self.num_dimensions - 1] == 1 {
                self.num_dimensions -= 1;
            }
        }
    }

    #[inline(always)]
    pub fn dim(&self, dim: usize) -> usize {
        if dim < MAX_DIMS {
            self.dims[dim]
        } else {
            1
        }
    }

    #[inline(always)]
    pub fn x(&self) -> usize {
        self.dims[0]
    }

    #[inline(always)]
    pub fn y(&self) -> usize {
        self.dims[1]
    }

    #[inline(always)]
    pub fn z(&self) -> usize {
        self.dims[2]
    }

    #[inline(always)]
    pub fn w(&self) -> usize {
        self.dims[3]
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions.max(1)
    }

    pub fn total_size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Product of the extents from `dim` upwards.
    pub fn total_size_upper(&self, dim: usize) -> usize {
        self.dims[dim.min(MAX_DIMS)..].iter().product()
    }

    /// Product of the extents below `dim`.
    pub fn total_size_lower(&self, dim: usize) -> usize {
        self.dims[..dim.min(MAX_DIMS)].iter().product()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.dims[..self.num_dimensions()]
    }
}

impl Default for TensorShape {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.as_slice().iter().map(|d| d.to_string()).collect();
        f.write_str(&dims.join("x"))
    }
}

/// Per-dimension byte strides.
pub type Strides = [usize; MAX_DIMS];

/// An N-D index, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coordinates([usize; MAX_DIMS]);

impl Coordinates {
    pub fn new(index: &[usize]) -> Self {
        let mut coords = [0; MAX_DIMS];
        coords[..index.len()].copy_from_slice(index);
        Self(coords)
    }

    #[inline(always)]
    pub fn get(&self, dim: usize) -> usize {
        self.0[dim]
    }

    #[inline(always)]
    pub fn set(&mut self, dim: usize, value: usize) {
        self.0[dim] = value;
    }

    pub fn as_array(&self) -> &[usize; MAX_DIMS] {
        &self.0
    }
}

impl From<[usize; 4]> for Coordinates {
    fn from(index: [usize; 4]) -> Self {
        Self::new(&index)
    }
}
