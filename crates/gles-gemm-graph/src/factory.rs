//! Maps graph nodes to configured GC functions.
//!
//! Precondition violations (wrong operand count, a missing required operand,
//! a tensor assigned to another target, an operation the GLES backend does
//! not implement) are programming errors in graph construction and panic.

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::GraphContext;
use crate::error::Result;
use crate::functions::{
    Function, GcActivationLayer, GcArithmeticAddition, GcBatchNormalizationLayer, GcConvolutionLayer,
    GcDepthConcatenateLayer, GcDepthwiseConvolutionLayer3x3, GcDirectConvolutionLayer, GcFullyConnectedLayer,
    GcNormalizationLayer, GcPixelWiseMultiplication, GcPoolingLayer, GcSoftmaxLayer,
};
use crate::layer_info::{
    ActivationLayerInfo, ConvertPolicy, ConvolutionMethod, DepthwiseConvolutionMethod, EltwiseOperation,
    NormalizationLayerInfo, PadStrideInfo, PoolingLayerInfo,
};
use crate::nodes::{Node, NodeKind};
use crate::tensor::{GcTensor, Target, Tensor};

/// Backing GC tensor of a graph tensor.
///
/// `None` for an absent tensor or one that has not been allocated yet.
///
/// # Panics
/// If the tensor is assigned to a target other than GC.
pub fn get_backing_tensor(tensor: Option<&Tensor>) -> Option<GcTensor> {
    let tensor = tensor?;
    assert_eq!(
        tensor.desc().target,
        Target::Gc,
        "tensor {} is not assigned to the GC target",
        tensor.id()
    );
    tensor.handle().cloned()
}

fn validate_node(node: &Node, num_expected_inputs: usize, num_expected_outputs: usize) {
    debug!(
        "Creating GC {} node with ID : {} and Name: {}",
        node.kind().name(),
        node.id(),
        node.name()
    );
    assert_eq!(
        node.num_inputs(),
        num_expected_inputs,
        "{} node {} expects {} inputs",
        node.kind().name(),
        node.id(),
        num_expected_inputs
    );
    assert_eq!(
        node.num_outputs(),
        num_expected_outputs,
        "{} node {} expects {} outputs",
        node.kind().name(),
        node.id(),
        num_expected_outputs
    );
}

fn required(tensor: Option<GcTensor>, node: &Node, what: &str) -> GcTensor {
    match tensor {
        Some(tensor) => tensor,
        None => panic!("{} node {}: missing {} tensor", node.kind().name(), node.id(), what),
    }
}

fn backing_input(node: &Node, index: usize) -> Option<GcTensor> {
    get_backing_tensor(node.input(index))
}

fn backing_output(node: &Node, index: usize) -> Option<GcTensor> {
    get_backing_tensor(node.output(index))
}

/// Creates the executable function of a node.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionFactory;

impl FunctionFactory {
    /// Function for `node`, or `None` when the node needs no computation
    /// (graph inputs and outputs, constants, reshapes, a disabled depth
    /// concatenation).
    ///
    /// # Panics
    /// On any precondition violation, and when configuring the function
    /// fails: the graph has been validated before lowering.
    pub fn create(node: &Node, ctx: &GraphContext) -> Option<Box<dyn Function>> {
        Self::try_create(node, ctx)
            .unwrap_or_else(|e| panic!("failed to configure {} node {}: {}", node.kind().name(), node.id(), e))
    }

    /// As [`FunctionFactory::create`], but configuration errors are returned.
    pub fn try_create(node: &Node, ctx: &GraphContext) -> Result<Option<Box<dyn Function>>> {
        let function: Box<dyn Function> = match node.kind() {
            NodeKind::Activation { info } => create_activation_layer(node, *info)?,
            NodeKind::BatchNormalization {
                epsilon,
                fused_activation,
            } => create_batch_normalization_layer(node, *epsilon, *fused_activation)?,
            NodeKind::Convolution { info, method } => create_convolution_layer(node, ctx, *info, *method)?,
            NodeKind::DepthConcatenate { enabled } => match create_depth_concatenate_layer(node, *enabled)? {
                Some(function) => function,
                None => return Ok(None),
            },
            NodeKind::DepthwiseConvolution { info, method } => {
                create_depthwise_convolution_layer(node, *info, *method)?
            }
            NodeKind::Eltwise {
                operation,
                convert_policy,
            } => create_eltwise_layer(node, *operation, *convert_policy)?,
            NodeKind::FullyConnected => create_fully_connected_layer(node, ctx)?,
            NodeKind::Normalization { info } => create_normalization_layer(node, *info)?,
            NodeKind::Pooling { info } => create_pooling_layer(node, *info)?,
            NodeKind::Softmax { beta } => create_softmax_layer(node, ctx, *beta)?,
            NodeKind::Input | NodeKind::Output | NodeKind::Const | NodeKind::Reshape => return Ok(None),
        };
        Ok(Some(function))
    }
}

fn create_activation_layer(node: &Node, act_info: ActivationLayerInfo) -> Result<Box<dyn Function>> {
    validate_node(node, 1, 1);

    let input = required(backing_input(node, 0), node, "input");
    let output = backing_output(node, 0);
    let in_place = output.as_ref().map_or(true, |o| Arc::ptr_eq(o.buffer(), input.buffer()));
    let func = GcActivationLayer::configure(&input, output.as_ref().filter(|_| !in_place), act_info)?;

    info!(
        "Instantiated GCActivationLayer Data Type: {} Shape: {} Activation function: {:?} a: {} b: {} InPlace : {}",
        input.data_type(),
        input.shape(),
        act_info.function,
        act_info.a,
        act_info.b,
        in_place
    );
    Ok(Box::new(func))
}

fn create_batch_normalization_layer(
    node: &Node,
    epsilon: f32,
    fused_act: Option<ActivationLayerInfo>,
) -> Result<Box<dyn Function>> {
    validate_node(node, 5, 1);

    let input = required(backing_input(node, 0), node, "input");
    let mean = required(backing_input(node, 1), node, "mean");
    let var = required(backing_input(node, 2), node, "variance");
    let beta = backing_input(node, 3);
    let gamma = backing_input(node, 4);
    let output = required(backing_output(node, 0), node, "output");

    let func = GcBatchNormalizationLayer::configure(
        &input,
        &output,
        &mean,
        &var,
        beta.as_ref(),
        gamma.as_ref(),
        epsilon,
        fused_act,
    )?;

    info!(
        "Instantiated GCBatchNormalizationLayer Data Type: {} Shape: {} Epsilon: {} InPlace : {}{}",
        input.data_type(),
        input.shape(),
        epsilon,
        Arc::ptr_eq(input.buffer(), output.buffer()),
        fused_act.map_or(String::new(), |act| format!(" {:?} Activation", act.function))
    );
    Ok(Box::new(func))
}

fn create_convolution_layer(
    node: &Node,
    ctx: &GraphContext,
    conv_info: PadStrideInfo,
    method: ConvolutionMethod,
) -> Result<Box<dyn Function>> {
    validate_node(node, 3, 1);

    let input = required(backing_input(node, 0), node, "input");
    let weights = required(backing_input(node, 1), node, "weights");
    let biases = backing_input(node, 2);
    let output = required(backing_output(node, 0), node, "output");

    let (func, func_name): (Box<dyn Function>, &str) = match method {
        ConvolutionMethod::Direct => (
            Box::new(GcDirectConvolutionLayer::configure(
                &input,
                &weights,
                biases.as_ref(),
                &output,
                conv_info,
            )?),
            "GCDirectConvolutionLayer",
        ),
        ConvolutionMethod::Gemm | ConvolutionMethod::Default => (
            Box::new(GcConvolutionLayer::configure(
                &input,
                &weights,
                biases.as_ref(),
                &output,
                conv_info,
                ctx.memory_manager(Target::Gc),
                ctx.gpu_target(),
            )?),
            "GCConvolutionLayer",
        ),
    };

    info!(
        "Instantiated {} Data Type: {} Input shape: {} Weights shape: {} Output shape: {}",
        func_name,
        input.data_type(),
        input.shape(),
        weights.shape(),
        output.shape()
    );
    Ok(func)
}

fn create_depth_concatenate_layer(node: &Node, enabled: bool) -> Result<Option<Box<dyn Function>>> {
    debug!(
        "Creating GC DepthConcatenate node with ID : {} and Name: {}",
        node.id(),
        node.name()
    );
    assert_eq!(node.num_outputs(), 1, "DepthConcatenate node {} expects 1 output", node.id());

    if !enabled {
        debug!("DepthConcatenate node {} is disabled", node.id());
        return Ok(None);
    }

    let inputs: Vec<GcTensor> = (0..node.num_inputs())
        .map(|i| required(backing_input(node, i), node, "input"))
        .collect();
    let output = required(backing_output(node, 0), node, "output");
    let func = GcDepthConcatenateLayer::configure(&inputs, &output)?;

    info!(
        "Instantiated GCDepthConcatenateLayer Data Type: {} Shape: {} Num Inputs: {}",
        output.data_type(),
        output.shape(),
        inputs.len()
    );
    Ok(Some(Box::new(func)))
}

fn create_depthwise_convolution_layer(
    node: &Node,
    conv_info: PadStrideInfo,
    method: DepthwiseConvolutionMethod,
) -> Result<Box<dyn Function>> {
    validate_node(node, 3, 1);

    let input = required(backing_input(node, 0), node, "input");
    let weights = required(backing_input(node, 1), node, "weights");
    let biases = backing_input(node, 2);
    let output = required(backing_output(node, 0), node, "output");

    let func = match method {
        DepthwiseConvolutionMethod::Optimized3x3 => {
            GcDepthwiseConvolutionLayer3x3::configure(&input, &weights, biases.as_ref(), &output, conv_info)?
        }
        DepthwiseConvolutionMethod::Generic | DepthwiseConvolutionMethod::Default => {
            panic!("Generic DepthwiseConvolutionLayer is not supported in GLES backend")
        }
    };

    info!(
        "Instantiated GCDepthwiseConvolutionLayer3x3 Data Type: {} Input shape: {} Weights shape: {} Output shape: {}",
        input.data_type(),
        input.shape(),
        weights.shape(),
        output.shape()
    );
    Ok(Box::new(func))
}

fn create_eltwise_layer(
    node: &Node,
    operation: EltwiseOperation,
    convert_policy: ConvertPolicy,
) -> Result<Box<dyn Function>> {
    validate_node(node, 2, 1);

    let input1 = required(backing_input(node, 0), node, "first input");
    let input2 = required(backing_input(node, 1), node, "second input");
    let output = required(backing_output(node, 0), node, "output");

    let (func, func_name): (Box<dyn Function>, &str) = match operation {
        EltwiseOperation::Add => (
            Box::new(GcArithmeticAddition::configure(&input1, &input2, &output, convert_policy)?),
            "GCArithmeticAddition",
        ),
        EltwiseOperation::Sub => panic!("Arithmetic subtraction is not supported in GLES backend"),
        EltwiseOperation::Mul => (
            Box::new(GcPixelWiseMultiplication::configure(&input1, &input2, &output, 1.0)?),
            "GCPixelWiseMultiplication",
        ),
    };

    info!(
        "Instantiated {} Data Type: {} Shape: {} Operation: {}",
        func_name,
        input1.data_type(),
        input1.shape(),
        operation
    );
    Ok(func)
}

fn create_fully_connected_layer(node: &Node, ctx: &GraphContext) -> Result<Box<dyn Function>> {
    validate_node(node, 3, 1);

    let input = required(backing_input(node, 0), node, "input");
    let weights = required(backing_input(node, 1), node, "weights");
    let biases = backing_input(node, 2);
    let output = required(backing_output(node, 0), node, "output");

    let func = GcFullyConnectedLayer::configure(
        &input,
        &weights,
        biases.as_ref(),
        &output,
        ctx.memory_manager(Target::Gc),
        ctx.gpu_target(),
    )?;

    info!(
        "Instantiated GCFullyConnectedLayer Data Type: {} Input shape: {} Weights shape: {} Output shape: {}",
        input.data_type(),
        input.shape(),
        weights.shape(),
        output.shape()
    );
    Ok(Box::new(func))
}

fn create_normalization_layer(node: &Node, norm_info: NormalizationLayerInfo) -> Result<Box<dyn Function>> {
    validate_node(node, 1, 1);

    let input = required(backing_input(node, 0), node, "input");
    let output = required(backing_output(node, 0), node, "output");
    let func = GcNormalizationLayer::configure(&input, &output, norm_info)?;

    info!(
        "Instantiated GCNormalizationLayer Data Type: {} Input shape: {} Output shape: {} Normalization info: {:?}",
        input.data_type(),
        input.shape(),
        output.shape(),
        norm_info.norm_type
    );
    Ok(Box::new(func))
}

fn create_pooling_layer(node: &Node, pool_info: PoolingLayerInfo) -> Result<Box<dyn Function>> {
    validate_node(node, 1, 1);

    let input = required(backing_input(node, 0), node, "input");
    let output = required(backing_output(node, 0), node, "output");
    let func = GcPoolingLayer::configure(&input, &output, pool_info)?;

    info!(
        "Instantiated GCPoolingLayer Data Type: {} Input shape: {} Output shape: {} Pooling info: {:?}",
        input.data_type(),
        input.shape(),
        output.shape(),
        pool_info.pool_type
    );
    Ok(Box::new(func))
}

fn create_softmax_layer(node: &Node, ctx: &GraphContext, beta: f32) -> Result<Box<dyn Function>> {
    validate_node(node, 1, 1);

    let input = required(backing_input(node, 0), node, "input");
    let output = required(backing_output(node, 0), node, "output");
    let func = GcSoftmaxLayer::configure(&input, &output, beta, ctx.memory_manager(Target::Gc))?;

    info!(
        "Instantiated GCSoftmaxLayer Data Type: {} Input shape: {} Output shape: {}",
        input.data_type(),
        input.shape(),
        output.shape()
    );
    Ok(Box::new(func))
}

