//! Executable layer functions.
//!
//! Every function is configured once from its backing tensors, validating
//! shapes and data types, and then run any number of times. Layers other
//! than the element-wise ones compute in `f32` and store in the tensor's
//! data type.
//!
//! | Function | Data types | Memory managed |
//! |----------|------------|----------------|
//! | [`GcActivationLayer`] | F32, F16 | no |
//! | [`GcBatchNormalizationLayer`] | F32, F16 | no |
//! | [`GcDirectConvolutionLayer`] | F32, F16 | no |
//! | [`GcConvolutionLayer`] | F32, F16 | yes |
//! | [`GcDepthConcatenateLayer`] | all | no |
//! | [`GcDepthwiseConvolutionLayer3x3`] | F32, F16 | no |
//! | [`GcArithmeticAddition`] | F32, F16, QS8, QS16 | no |
//! | [`GcPixelWiseMultiplication`] | F32, F16, QS8, QS16 | no |
//! | [`GcFullyConnectedLayer`] | F32, F16 | yes |
//! | [`GcNormalizationLayer`] | F32, F16 | no |
//! | [`GcPoolingLayer`] | F32, F16 | no |
//! | [`GcSoftmaxLayer`] | F32, F16 | yes |
//! | [`GcGemm`] | F32, F16, QS8, QS16 | yes |

mod activation;
mod arithmetic;
mod batch_normalization;
mod convolution;
mod depth_concatenate;
mod depthwise_convolution;
mod fully_connected;
mod gemm;
mod normalization;
mod pooling;
mod softmax;

pub use activation::GcActivationLayer;
pub use arithmetic::{GcArithmeticAddition, GcPixelWiseMultiplication};
pub use batch_normalization::GcBatchNormalizationLayer;
pub use convolution::{GcConvolutionLayer, GcDirectConvolutionLayer};
pub use depth_concatenate::GcDepthConcatenateLayer;
pub use depthwise_convolution::GcDepthwiseConvolutionLayer3x3;
pub use fully_connected::GcFullyConnectedLayer;
pub use gemm::{GcGemm, GemmInfo};
pub use normalization::GcNormalizationLayer;
pub use pooling::GcPoolingLayer;
pub use softmax::GcSoftmaxLayer;

use gles_gemm::{launch, DataType, Grid, TensorInfo, TensorShape};

use crate::error::{BackendError, Result};

/// A configured unit of work.
pub trait Function: Send {
    /// Name of the function, for logging.
    fn name(&self) -> &'static str;

    /// One-off work before the first run, such as reshaping weights.
    ///
    /// `run` calls it when it has not happened yet.
    fn prepare(&mut self) {}

    fn run(&mut self);
}

pub(crate) fn check_float(info: &TensorInfo) -> Result<()> {
    match info.data_type() {
        DataType::F32 | DataType::F16 => Ok(()),
        other => Err(BackendError::UnsupportedDataType(other)),
    }
}

pub(crate) fn check_same_type(a: &TensorInfo, b: &TensorInfo) -> Result<()> {
    if a.data_type() != b.data_type() {
        return Err(BackendError::Kernel(gles_gemm::GemmError::DataTypeMismatch(
            a.data_type(),
            b.data_type(),
        )));
    }
    Ok(())
}

pub(crate) fn check_same_shape(what: &str, a: &TensorInfo, b: &TensorInfo) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(BackendError::ShapeMismatch(format!(
            "{}: {} vs {}",
            what,
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

/// Launch `body(x, y, z, w)` for every element of `shape`; all dimensions
/// above z fold into w.
pub(crate) fn launch_elements<F>(name: &str, shape: &TensorShape, body: F)
where
    F: Fn(usize, usize, usize, usize) + Send + Sync,
{
    let depth = shape.z();
    let grid = Grid::new(shape.x(), shape.y(), depth * shape.total_size_upper(3));
    launch(name, grid, move |[x, y, zw]| body(x, y, zw % depth, zw / depth));
}
