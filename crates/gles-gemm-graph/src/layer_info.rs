//! Layer attributes carried by graph nodes.

use std::fmt;

/// Activation function applied element-wise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationFunction {
    Logistic,
    Relu,
    /// `min(a, max(0, x))`
    BoundedRelu,
    /// `min(a, max(b, x))`
    LuBoundedRelu,
    /// `x > 0 ? x : a·x`
    LeakyRelu,
    /// `log(1 + e^x)`
    SoftRelu,
    Abs,
    Square,
    Sqrt,
    /// `a·x + b`
    Linear,
    /// `a·tanh(b·x)`
    Tanh,
}

/// Activation function with its `a` and `b` parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationLayerInfo {
    pub function: ActivationFunction,
    pub a: f32,
    pub b: f32,
}

impl ActivationLayerInfo {
    pub fn new(function: ActivationFunction, a: f32, b: f32) -> Self {
        Self { function, a, b }
    }

    pub fn relu() -> Self {
        Self::new(ActivationFunction::Relu, 0.0, 0.0)
    }

    pub fn apply(&self, x: f32) -> f32 {
        let (a, b) = (self.a, self.b);
        match self.function {
            ActivationFunction::Logistic => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Relu => x.max(0.0),
            ActivationFunction::BoundedRelu => x.max(0.0).min(a),
            ActivationFunction::LuBoundedRelu => x.max(b).min(a),
            ActivationFunction::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    a * x
                }
            }
            ActivationFunction::SoftRelu => x.exp().ln_1p(),
            ActivationFunction::Abs => x.abs(),
            ActivationFunction::Square => x * x,
            ActivationFunction::Sqrt => x.sqrt(),
            ActivationFunction::Linear => a * x + b,
            ActivationFunction::Tanh => a * (b * x).tanh(),
        }
    }
}

/// How output extents are rounded when the stride does not divide the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionRoundingType {
    #[default]
    Floor,
    Ceil,
}

/// Stride and zero padding of a sliding-window layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadStrideInfo {
    pub stride_x: usize,
    pub stride_y: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
    pub round: DimensionRoundingType,
}

impl PadStrideInfo {
    /// Symmetric padding.
    pub fn new(stride_x: usize, stride_y: usize, pad_x: usize, pad_y: usize) -> Self {
        Self {
            stride_x,
            stride_y,
            pad_left: pad_x,
            pad_right: pad_x,
            pad_top: pad_y,
            pad_bottom: pad_y,
            round: DimensionRoundingType::Floor,
        }
    }

    pub fn with_round(mut self, round: DimensionRoundingType) -> Self {
        self.round = round;
        self
    }

    pub fn has_padding(&self) -> bool {
        self.pad_left + self.pad_right + self.pad_top + self.pad_bottom != 0
    }

    /// Output width and height of a `kernel_w` × `kernel_h` window sliding
    /// over a `width` × `height` input.
    pub fn scaled_dimensions(&self, width: usize, height: usize, kernel_w: usize, kernel_h: usize) -> (usize, usize) {
        let extent = |size: usize, pad: usize, kernel: usize, stride: usize| {
            let span = (size + pad).saturating_sub(kernel);
            let steps = match self.round {
                DimensionRoundingType::Floor => span / stride,
                DimensionRoundingType::Ceil => span.div_ceil(stride),
            };
            steps + 1
        };
        (
            extent(width, self.pad_left + self.pad_right, kernel_w, self.stride_x),
            extent(height, self.pad_top + self.pad_bottom, kernel_h, self.stride_y),
        )
    }
}

impl Default for PadStrideInfo {
    fn default() -> Self {
        Self::new(1, 1, 0, 0)
    }
}

/// Local response normalization region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    /// Across neighbouring channels.
    CrossMap,
    /// Along x within a channel.
    InMap1D,
    /// Over an x/y window within a channel.
    InMap2D,
}

/// Parameters of a normalization layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationLayerInfo {
    pub norm_type: NormType,
    pub norm_size: usize,
    pub alpha: f32,
    pub beta: f32,
    pub kappa: f32,
    pub is_scaled: bool,
}

impl NormalizationLayerInfo {
    pub fn new(norm_type: NormType, norm_size: usize) -> Self {
        Self {
            norm_type,
            norm_size,
            alpha: 0.0001,
            beta: 0.5,
            kappa: 1.0,
            is_scaled: true,
        }
    }

    /// Multiplier applied to the sum of squares.
    pub fn scale_coeff(&self) -> f32 {
        if !self.is_scaled {
            return self.alpha;
        }
        let size = match self.norm_type {
            NormType::InMap2D => self.norm_size * self.norm_size,
            NormType::CrossMap | NormType::InMap1D => self.norm_size,
        };
        self.alpha / size as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingType {
    Max,
    Avg,
    L2,
}

/// Parameters of a pooling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingLayerInfo {
    pub pool_type: PoolingType,
    pub pool_size: usize,
    pub pad_stride: PadStrideInfo,
    pub exclude_padding: bool,
    pub is_global: bool,
}

impl PoolingLayerInfo {
    pub fn new(pool_type: PoolingType, pool_size: usize, pad_stride: PadStrideInfo) -> Self {
        Self {
            pool_type,
            pool_size,
            pad_stride,
            exclude_padding: false,
            is_global: false,
        }
    }

    /// Pool over the whole x/y plane.
    pub fn global(pool_type: PoolingType) -> Self {
        Self {
            pool_type,
            pool_size: 0,
            pad_stride: PadStrideInfo::default(),
            exclude_padding: false,
            is_global: true,
        }
    }

    pub fn exclude_padding(mut self, exclude: bool) -> Self {
        self.exclude_padding = exclude;
        self
    }
}

/// Overflow policy of fixed-point element-wise arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertPolicy {
    Wrap,
    #[default]
    Saturate,
}

/// Convolution algorithm requested by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvolutionMethod {
    #[default]
    Default,
    Direct,
    Gemm,
}

/// Depthwise convolution algorithm requested by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthwiseConvolutionMethod {
    #[default]
    Default,
    Generic,
    Optimized3x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseOperation {
    Add,
    Sub,
    Mul,
}

impl fmt::Display for EltwiseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EltwiseOperation::Add => "ADD",
            EltwiseOperation::Sub => "SUB",
            EltwiseOperation::Mul => "MUL",
        };
        f.write_str(name)
    }
}
