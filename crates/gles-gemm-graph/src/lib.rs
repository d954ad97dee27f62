//! GLES-compute graph backend built on [`gles_gemm`].
//!
//! Graph nodes are lowered to executable [`Function`]s by the
//! [`FunctionFactory`]. Functions own their persistent operands and borrow
//! transient scratch tensors from a per-target [`MemoryManager`] while they
//! run, so buffers are shared between functions of one graph.
//!
//! ```
//! use std::sync::Arc;
//!
//! use gles_gemm::{DataType, TensorInfo, TensorShape};
//! use gles_gemm_graph::{
//!     ActivationLayerInfo, FunctionFactory, GraphContext, Node, NodeKind, Tensor, TensorDescriptor,
//! };
//!
//! let desc = TensorDescriptor::new(TensorShape::new(&[4]), DataType::F32);
//! let input = Arc::new(Tensor::allocated(0, desc));
//! let output = Arc::new(Tensor::allocated(1, desc));
//! input.handle().unwrap().write_f32(&[-2.0, -1.0, 1.0, 2.0]).unwrap();
//!
//! let node = Node::new(0, "relu", NodeKind::Activation { info: ActivationLayerInfo::relu() })
//!     .input_tensor(Some(Arc::clone(&input)))
//!     .output_tensor(Some(Arc::clone(&output)));
//!
//! let ctx = GraphContext::default();
//! let mut function = FunctionFactory::create(&node, &ctx).unwrap();
//! function.run();
//! assert_eq!(output.handle().unwrap().to_f32_vec(), vec![0.0, 0.0, 1.0, 2.0]);
//! ```
//!
//! # Configuration
//!
//! [`GraphConfig`] selects whether scratch tensors are pooled and which GPU
//! generation the GEMM schedules target. Without an explicit target the
//! `GLES_GEMM_TARGET` environment variable is consulted, as in
//! [`gles_gemm::gpu_target`].

pub mod context;
pub mod error;
pub mod factory;
pub mod functions;
pub mod layer_info;
pub mod memory;
pub mod nodes;
pub mod tensor;

pub use context::{default_context, GraphConfig, GraphContext};
pub use error::{BackendError, Result};
pub use factory::{get_backing_tensor, FunctionFactory};
pub use functions::{
    Function, GcActivationLayer, GcArithmeticAddition, GcBatchNormalizationLayer, GcConvolutionLayer,
    GcDepthConcatenateLayer, GcDepthwiseConvolutionLayer3x3, GcDirectConvolutionLayer, GcFullyConnectedLayer,
    GcGemm, GcNormalizationLayer, GcPixelWiseMultiplication, GcPoolingLayer, GcSoftmaxLayer, GemmInfo,
};
pub use layer_info::{
    ActivationFunction, ActivationLayerInfo, ConvertPolicy, ConvolutionMethod, DepthwiseConvolutionMethod,
    DimensionRoundingType, EltwiseOperation, NormType, NormalizationLayerInfo, PadStrideInfo, PoolingLayerInfo,
    PoolingType,
};
pub use memory::{MemoryGroup, MemoryManager, MemoryScope, Slot};
pub use nodes::{Node, NodeId, NodeKind};
pub use tensor::{GcBuffer, GcTensor, Target, Tensor, TensorDescriptor, TensorId};
