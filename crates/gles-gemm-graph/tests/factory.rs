use std::sync::Arc;

use gles_gemm::{DataType, GpuTarget, TensorShape};
use gles_gemm_graph::{
    ActivationLayerInfo, BackendError, ConvertPolicy, ConvolutionMethod, DepthwiseConvolutionMethod,
    EltwiseOperation, FunctionFactory, GraphConfig, GraphContext, Node, NodeKind, PadStrideInfo,
    PoolingLayerInfo, PoolingType, Target, Tensor, TensorDescriptor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn context(target: GpuTarget) -> GraphContext {
    GraphContext::new(GraphConfig {
        use_memory_manager: true,
        gpu_target: Some(target),
    })
}

fn tensor(id: usize, dims: &[usize], values: &[f32]) -> Arc<Tensor> {
    let t = Tensor::allocated(id, TensorDescriptor::new(TensorShape::new(dims), DataType::F32));
    t.handle().unwrap().write_f32(values).unwrap();
    Arc::new(t)
}

fn zeros(id: usize, dims: &[usize]) -> Arc<Tensor> {
    Arc::new(Tensor::allocated(id, TensorDescriptor::new(TensorShape::new(dims), DataType::F32)))
}

fn random(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn values(tensor: &Tensor) -> Vec<f32> {
    tensor.handle().unwrap().to_f32_vec()
}

fn node(kind: NodeKind, inputs: &[Option<Arc<Tensor>>], outputs: &[Option<Arc<Tensor>>]) -> Node {
    let node = inputs
        .iter()
        .cloned()
        .fold(Node::new(7, "node", kind), Node::input_tensor);
    outputs.iter().cloned().fold(node, Node::output_tensor)
}

#[test]
fn test_activation_in_place_when_output_is_input() {
    let ctx = context(GpuTarget::Midgard);
    let t = tensor(0, &[4], &[-1.0, 0.5, 2.0, -3.0]);
    let n = node(
        NodeKind::Activation {
            info: ActivationLayerInfo::relu(),
        },
        &[Some(Arc::clone(&t))],
        &[Some(Arc::clone(&t))],
    );
    let mut function = FunctionFactory::create(&n, &ctx).unwrap();
    assert_eq!(function.name(), "GCActivationLayer");
    function.run();
    assert_eq!(values(&t), vec![0.0, 0.5, 2.0, 0.0]);
}

#[test]
fn test_gemm_convolution_matches_direct() {
    let mut rng = StdRng::seed_from_u64(5);
    let (w, h, ifm, ofm) = (6, 5, 3, 4);
    let input = tensor(0, &[w, h, ifm], &random(&mut rng, w * h * ifm));
    let weights = tensor(1, &[3, 3, ifm, ofm], &random(&mut rng, 9 * ifm * ofm));
    let bias = tensor(2, &[ofm], &random(&mut rng, ofm));
    let info = PadStrideInfo::new(1, 1, 1, 1);

    for target in [GpuTarget::Midgard, GpuTarget::Bifrost] {
        let ctx = context(target);
        let direct_out = zeros(3, &[w, h, ofm]);
        let gemm_out = zeros(4, &[w, h, ofm]);
        let inputs = [Some(Arc::clone(&input)), Some(Arc::clone(&weights)), Some(Arc::clone(&bias))];

        let direct = node(
            NodeKind::Convolution {
                info,
                method: ConvolutionMethod::Direct,
            },
            &inputs,
            &[Some(Arc::clone(&direct_out))],
        );
        let gemm = node(
            NodeKind::Convolution {
                info,
                method: ConvolutionMethod::Default,
            },
            &inputs,
            &[Some(Arc::clone(&gemm_out))],
        );

        let mut direct = FunctionFactory::create(&direct, &ctx).unwrap();
        let mut gemm = FunctionFactory::create(&gemm, &ctx).unwrap();
        assert_eq!(direct.name(), "GCDirectConvolutionLayer");
        assert_eq!(gemm.name(), "GCConvolutionLayer");

        direct.run();
        gemm.run();
        let manager = ctx.memory_manager(Target::Gc).unwrap();
        let allocations = manager.num_allocations();
        gemm.run();
        assert_eq!(manager.num_allocations(), allocations);

        for (d, g) in values(&direct_out).iter().zip(values(&gemm_out)) {
            assert!((d - g).abs() < 1e-4, "{:?}: {} vs {}", target, d, g);
        }
    }
}

#[test]
fn test_eltwise_add_and_mul() {
    let ctx = context(GpuTarget::Bifrost);
    let a = tensor(0, &[3], &[1.0, 2.0, 3.0]);
    let b = tensor(1, &[3], &[4.0, 5.0, 6.0]);

    for (operation, expected, name) in [
        (EltwiseOperation::Add, vec![5.0, 7.0, 9.0], "GCArithmeticAddition"),
        (EltwiseOperation::Mul, vec![4.0, 10.0, 18.0], "GCPixelWiseMultiplication"),
    ] {
        let out = zeros(2, &[3]);
        let n = node(
            NodeKind::Eltwise {
                operation,
                convert_policy: ConvertPolicy::Saturate,
            },
            &[Some(Arc::clone(&a)), Some(Arc::clone(&b))],
            &[Some(Arc::clone(&out))],
        );
        let mut function = FunctionFactory::create(&n, &ctx).unwrap();
        assert_eq!(function.name(), name);
        function.run();
        assert_eq!(values(&out), expected);
    }
}

#[test]
#[should_panic(expected = "Arithmetic subtraction is not supported in GLES backend")]
fn test_eltwise_sub_panics() {
    let ctx = context(GpuTarget::Midgard);
    let n = node(
        NodeKind::Eltwise {
            operation: EltwiseOperation::Sub,
            convert_policy: ConvertPolicy::Saturate,
        },
        &[Some(zeros(0, &[2])), Some(zeros(1, &[2]))],
        &[Some(zeros(2, &[2]))],
    );
    FunctionFactory::create(&n, &ctx);
}

#[test]
#[should_panic(expected = "Generic DepthwiseConvolutionLayer is not supported in GLES backend")]
fn test_generic_depthwise_panics() {
    let ctx = context(GpuTarget::Midgard);
    let n = node(
        NodeKind::DepthwiseConvolution {
            info: PadStrideInfo::new(1, 1, 1, 1),
            method: DepthwiseConvolutionMethod::Generic,
        },
        &[Some(zeros(0, &[4, 4, 2])), Some(zeros(1, &[3, 3, 2])), None],
        &[Some(zeros(2, &[4, 4, 2]))],
    );
    FunctionFactory::create(&n, &ctx);
}

#[test]
fn test_optimized_depthwise_created() {
    let ctx = context(GpuTarget::Midgard);
    let n = node(
        NodeKind::DepthwiseConvolution {
            info: PadStrideInfo::new(1, 1, 1, 1),
            method: DepthwiseConvolutionMethod::Optimized3x3,
        },
        &[Some(zeros(0, &[4, 4, 2])), Some(zeros(1, &[3, 3, 2])), None],
        &[Some(zeros(2, &[4, 4, 2]))],
    );
    let function = FunctionFactory::create(&n, &ctx).unwrap();
    assert_eq!(function.name(), "GCDepthwiseConvolutionLayer3x3");
}

#[test]
#[should_panic]
fn test_batch_normalization_needs_five_inputs() {
    let ctx = context(GpuTarget::Midgard);
    let n = node(
        NodeKind::BatchNormalization {
            epsilon: 0.001,
            fused_activation: None,
        },
        &[
            Some(zeros(0, &[2, 2, 3])),
            Some(zeros(1, &[3])),
            Some(zeros(2, &[3])),
            Some(zeros(3, &[3])),
        ],
        &[Some(zeros(4, &[2, 2, 3]))],
    );
    FunctionFactory::create(&n, &ctx);
}

#[test]
fn test_batch_normalization_optional_beta_gamma() {
    let ctx = context(GpuTarget::Midgard);
    let input = tensor(0, &[1, 1, 2], &[3.0, 5.0]);
    let mean = tensor(1, &[2], &[1.0, 1.0]);
    let var = tensor(2, &[2], &[4.0, 16.0]);
    let out = zeros(3, &[1, 1, 2]);
    let n = node(
        NodeKind::BatchNormalization {
            epsilon: 0.0,
            fused_activation: None,
        },
        &[Some(input), Some(mean), Some(var), None, None],
        &[Some(Arc::clone(&out))],
    );
    FunctionFactory::create(&n, &ctx).unwrap().run();
    assert_eq!(values(&out), vec![1.0, 1.0]);
}

#[test]
#[should_panic(expected = "missing output tensor")]
fn test_missing_required_operand_panics() {
    let ctx = context(GpuTarget::Midgard);
    let n = node(
        NodeKind::Softmax { beta: 1.0 },
        &[Some(zeros(0, &[4]))],
        &[None],
    );
    FunctionFactory::create(&n, &ctx);
}

#[test]
#[should_panic(expected = "is not assigned to the GC target")]
fn test_foreign_target_panics() {
    let ctx = context(GpuTarget::Midgard);
    let desc = TensorDescriptor::new(TensorShape::new(&[4]), DataType::F32).with_target(Target::Cl);
    let foreign = Arc::new(Tensor::allocated(0, desc));
    let n = node(
        NodeKind::Softmax { beta: 1.0 },
        &[Some(foreign)],
        &[Some(zeros(1, &[4]))],
    );
    FunctionFactory::create(&n, &ctx);
}

#[test]
fn test_depth_concatenate() {
    let ctx = context(GpuTarget::Midgard);
    let a = tensor(0, &[2, 2, 1], &[1.0, 2.0, 3.0, 4.0]);
    let b = tensor(1, &[2, 2, 2], &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    let out = zeros(2, &[2, 2, 3]);
    let inputs = [Some(a), Some(b)];

    let disabled = node(NodeKind::DepthConcatenate { enabled: false }, &inputs, &[Some(Arc::clone(&out))]);
    assert!(FunctionFactory::create(&disabled, &ctx).is_none());

    let enabled = node(NodeKind::DepthConcatenate { enabled: true }, &inputs, &[Some(Arc::clone(&out))]);
    let mut function = FunctionFactory::create(&enabled, &ctx).unwrap();
    assert_eq!(function.name(), "GCDepthConcatenateLayer");
    function.run();
    assert_eq!(values(&out), (1..=12).map(|v| v as f32).collect::<Vec<_>>());
}

#[test]
fn test_nodes_without_computation() {
    let ctx = context(GpuTarget::Midgard);
    for kind in [NodeKind::Input, NodeKind::Output, NodeKind::Const, NodeKind::Reshape] {
        let n = node(kind, &[], &[Some(zeros(0, &[4]))]);
        assert!(FunctionFactory::create(&n, &ctx).is_none());
    }
}

#[test]
fn test_configuration_error_is_reported() {
    let ctx = context(GpuTarget::Midgard);
    let info = PoolingLayerInfo::new(PoolingType::Max, 2, PadStrideInfo::new(2, 2, 0, 0));
    let n = node(
        NodeKind::Pooling { info },
        &[Some(zeros(0, &[4, 4]))],
        &[Some(zeros(1, &[3, 3]))],
    );
    assert!(matches!(
        FunctionFactory::try_create(&n, &ctx),
        Err(BackendError::ShapeMismatch(_))
    ));
}

#[test]
fn test_fully_connected_then_softmax_share_pool() {
    let mut rng = StdRng::seed_from_u64(9);
    let ctx = context(GpuTarget::Bifrost);
    let (inputs, outputs, batches) = (12, 5, 3);
    let x = tensor(0, &[inputs, batches], &random(&mut rng, inputs * batches));
    let weights = tensor(1, &[inputs, outputs], &random(&mut rng, inputs * outputs));
    let logits = zeros(2, &[outputs, batches]);
    let probs = zeros(3, &[outputs, batches]);

    let fc = node(
        NodeKind::FullyConnected,
        &[Some(x), Some(weights), None],
        &[Some(Arc::clone(&logits))],
    );
    let softmax = node(
        NodeKind::Softmax { beta: 1.0 },
        &[Some(Arc::clone(&logits))],
        &[Some(Arc::clone(&probs))],
    );
    let mut functions: Vec<_> = [fc, softmax]
        .iter()
        .map(|n| FunctionFactory::create(n, &ctx).unwrap())
        .collect();

    let manager = ctx.memory_manager(Target::Gc).unwrap();
    functions.iter_mut().for_each(|f| f.run());
    let allocations = manager.num_allocations();
    functions.iter_mut().for_each(|f| f.run());
    assert_eq!(manager.num_allocations(), allocations);

    for row in values(&probs).chunks(outputs) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
