//! Graph nodes as seen by the function factory.
//!
//! Shape inference has already run: every output tensor arrives with its
//! final descriptor.

use std::sync::Arc;

use crate::layer_info::{
    ActivationLayerInfo, ConvertPolicy, ConvolutionMethod, DepthwiseConvolutionMethod, EltwiseOperation,
    NormalizationLayerInfo, PadStrideInfo, PoolingLayerInfo,
};
use crate::tensor::Tensor;

/// Graph-level node identifier.
pub type NodeId = usize;

/// Operation of a node, with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Activation {
        info: ActivationLayerInfo,
    },
    BatchNormalization {
        epsilon: f32,
        fused_activation: Option<ActivationLayerInfo>,
    },
    Convolution {
        info: PadStrideInfo,
        method: ConvolutionMethod,
    },
    DepthConcatenate {
        enabled: bool,
    },
    DepthwiseConvolution {
        info: PadStrideInfo,
        method: DepthwiseConvolutionMethod,
    },
    Eltwise {
        operation: EltwiseOperation,
        convert_policy: ConvertPolicy,
    },
    FullyConnected,
    Normalization {
        info: NormalizationLayerInfo,
    },
    Pooling {
        info: PoolingLayerInfo,
    },
    Softmax {
        beta: f32,
    },
    Input,
    Output,
    Const,
    Reshape,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Activation { .. } => "ActivationLayer",
            NodeKind::BatchNormalization { .. } => "BatchNormalizationLayer",
            NodeKind::Convolution { .. } => "ConvolutionLayer",
            NodeKind::DepthConcatenate { .. } => "DepthConcatenateLayer",
            NodeKind::DepthwiseConvolution { .. } => "DepthwiseConvolutionLayer",
            NodeKind::Eltwise { .. } => "EltwiseLayer",
            NodeKind::FullyConnected => "FullyConnectedLayer",
            NodeKind::Normalization { .. } => "NormalizationLayer",
            NodeKind::Pooling { .. } => "PoolingLayer",
            NodeKind::Softmax { .. } => "SoftmaxLayer",
            NodeKind::Input => "Input",
            NodeKind::Output => "Output",
            NodeKind::Const => "Const",
            NodeKind::Reshape => "Reshape",
        }
    }
}

/// A node with its operand tensors.
///
/// Unconnected operand positions are `None`.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    inputs: Vec<Option<Arc<Tensor>>>,
    outputs: Vec<Option<Arc<Tensor>>>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append an input operand.
    pub fn input_tensor(mut self, tensor: Option<Arc<Tensor>>) -> Self {
        self.inputs.push(tensor);
        self
    }

    /// Append an output operand.
    pub fn output_tensor(mut self, tensor: Option<Arc<Tensor>>) -> Self {
        self.outputs.push(tensor);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, index: usize) -> Option<&Tensor> {
        self.inputs.get(index).and_then(|t| t.as_deref())
    }

    pub fn output(&self, index: usize) -> Option<&Tensor> {
        self.outputs.get(index).and_then(|t| t.as_deref())
    }
}
