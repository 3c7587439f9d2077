use super::*;
use crate::backend::{ArgKind, HostBackend, IndexSpace, Kernel};
use crate::error::BackendError;
use std::cell::RefCell;

/// Delegates to [`HostBackend`] and records every dispatch.
#[derive(Default)]
struct RecordingBackend {
    calls: RefCell<Vec<Call>>,
}

#[derive(Debug, Clone)]
struct Call {
    kernel: Kernel,
    kinds: Vec<ArgKind>,
    scalars: Vec<u32>,
    space: [usize; 3],
}

impl RecordingBackend {
    fn kernels(&self) -> Vec<Kernel> {
        self.calls.borrow().iter().map(|call| call.kernel).collect()
    }
}

impl ComputeBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &mut [KernelArg<'_>],
        space: IndexSpace,
    ) -> Result<(), BackendError> {
        self.calls.borrow_mut().push(Call {
            kernel,
            kinds: args.iter().map(KernelArg::kind).collect(),
            scalars: args.iter().filter_map(KernelArg::scalar_bits).collect(),
            space: space.dims(),
        });
        HostBackend.dispatch(kernel, args, space)
    }
}

fn shape(width: usize, height: usize, channels: usize) -> TensorShape {
    TensorShape::new(width, height, channels).unwrap()
}

fn run(layer: &Layer<'_>, input: Tensor) -> Tensor {
    layer.apply(&HostBackend, input.shape(), input).unwrap()
}

#[test]
fn zero_padding_grows_and_preserves_the_original_region() {
    let input = Tensor::from_fn(shape(3, 2, 2), |x, y, c| (1 + x * 10 + y * 3 + c) as f32);
    let layer = Layer::ZeroPadding(ZeroPadding2d::new(0, 1, 0, 1));
    let output = run(&layer, input.clone());

    assert_eq!(output.shape(), shape(4, 3, 2));
    for x in 0..4 {
        for y in 0..3 {
            for c in 0..2 {
                let expected = if x < 3 && y < 2 { input.get(x, y, c) } else { 0.0 };
                assert_eq!(output.get(x, y, c), expected, "({x}, {y}, {c})");
            }
        }
    }
}

#[test]
fn zero_padding_honours_leading_pads() {
    let input = Tensor::from_fn(shape(1, 1, 1), |_, _, _| 7.0);
    let output = run(&Layer::ZeroPadding(ZeroPadding2d::new(1, 0, 2, 0)), input);
    assert_eq!(output.shape(), shape(2, 3, 1));
    assert_eq!(output.get(1, 2, 0), 7.0);
    assert_eq!(output.data().iter().sum::<f32>(), 7.0);
}

#[test]
fn relu_clamps_negatives_and_is_idempotent() {
    let input = Tensor::from_fn(shape(4, 3, 2), |x, y, c| x as f32 - y as f32 * 1.5 + c as f32 * 0.25);
    let once = run(&Layer::Relu, input.clone());
    assert_eq!(once.shape(), input.shape());
    for (out, src) in once.data().iter().zip(input.data()) {
        assert_eq!(*out, src.max(0.0));
    }
    let twice = run(&Layer::Relu, once.clone());
    assert_eq!(twice, once);
}

#[test]
fn global_average_pooling_takes_channel_means() {
    let backend = RecordingBackend::default();
    let input = Tensor::from_fn(shape(2, 3, 2), |x, y, c| if c == 0 { (x * 3 + y) as f32 } else { 4.0 });
    let output = Layer::GlobalAveragePooling
        .apply(&backend, input.shape(), input)
        .unwrap();

    assert_eq!(output.shape(), shape(1, 1, 2));
    assert!((output.data()[0] - 2.5).abs() < 1e-6);
    assert!((output.data()[1] - 4.0).abs() < 1e-6);
    assert_eq!(
        backend.kernels(),
        vec![Kernel::SumByChannels, Kernel::ApplyReduction]
    );
    let calls = backend.calls.borrow();
    assert_eq!(calls[1].scalars, vec![6.0f32.to_bits()]);
}

#[test]
fn dense_softmax_runs_four_ordered_stages() {
    let backend = RecordingBackend::default();
    let weights = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
    let layer = Layer::Dense(Dense::new(2, &weights, None));
    let input = Tensor::new(shape(1, 1, 3), vec![1.0, 2.0, 3.0]).unwrap();
    let output = layer.apply(&backend, input.shape(), input).unwrap();

    assert_eq!(
        backend.kernels(),
        vec![
            Kernel::MatrixMultiplication,
            Kernel::MaxValue,
            Kernel::Softmax,
            Kernel::ApplyReduction,
        ]
    );
    // The maximum read back after stage two is bound into stage three.
    let calls = backend.calls.borrow();
    assert_eq!(calls[2].scalars, vec![3.0f32.to_bits()]);
    assert_eq!(calls[0].scalars, vec![3]);

    let probs = output.data();
    assert_eq!(output.shape(), shape(1, 1, 2));
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(probs[1] > probs[0]);
    let expected = 1.0 / (1.0 + (-2.0f32).exp());
    assert!((probs[1] - expected).abs() < 1e-6);
}

fn identity(units: usize) -> Vec<f32> {
    (0..units * units)
        .map(|i| if i / units == i % units { 1.0 } else { 0.0 })
        .collect()
}

#[test]
fn dense_softmax_is_stable_for_large_logits() {
    let weights = identity(2);
    let layer = Layer::Dense(Dense::new(2, &weights, None));
    let input = Tensor::new(shape(1, 1, 2), vec![1000.0, 999.0]).unwrap();
    let output = run(&layer, input);

    let probs = output.data();
    assert!(probs.iter().all(|p| p.is_finite()), "{probs:?}");
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5, "{probs:?}");
    let expected = 1.0 / (1.0 + (-1.0f32).exp());
    assert!((probs[0] - expected).abs() < 1e-5, "{probs:?}");
    assert!((probs[1] - (1.0 - expected)).abs() < 1e-5, "{probs:?}");
}

#[test]
fn dense_softmax_preserves_the_argmax() {
    const UNITS: usize = 5;
    let weights = identity(UNITS);
    let layer = Layer::Dense(Dense::new(UNITS, &weights, None));
    let mut state = 0x2545_f491_u32;
    for _ in 0..20 {
        let logits: Vec<f32> = (0..UNITS)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1 << 24) as f32 * 200.0 - 100.0
            })
            .collect();
        let argmax = |values: &[f32]| {
            values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap()
        };
        let input = Tensor::new(shape(1, 1, UNITS), logits.clone()).unwrap();
        let output = run(&layer, input);
        assert_eq!(argmax(output.data()), argmax(&logits), "{logits:?}");
        assert!((output.data().iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn dense_with_bias_uses_the_bias_kernel() {
    let backend = RecordingBackend::default();
    let weights = [0.0; 4];
    let bias = [5.0, 1.0];
    let layer = Layer::Dense(Dense::new(2, &weights, Some(&bias)));
    let input = Tensor::new(shape(1, 1, 2), vec![1.0, 1.0]).unwrap();
    let output = layer.apply(&backend, input.shape(), input).unwrap();

    assert_eq!(backend.kernels()[0], Kernel::MatrixMultiplicationBias);
    assert!(output.data()[0] > output.data()[1]);
    assert!((output.data().iter().sum::<f32>() - 1.0).abs() < 1e-5);
}

#[test]
fn valid_conv_fixture_sums_to_forty_five() {
    let input = Tensor::from_fn(shape(3, 3, 1), |x, y, _| (x * 3 + y + 1) as f32);
    let weights = [1.0; 9];
    let bias = [0.0];
    let layer = Layer::Conv2d(Conv2d::new(1, (3, 3), 1, Padding::Valid, &weights, &bias));
    let output = run(&layer, input);
    assert_eq!(output.shape(), shape(2, 2, 1));
    assert_eq!(output.get(0, 0, 0), 45.0);
}

#[test]
fn strided_valid_conv_matches_the_true_valid_window() {
    // Width 5 at stride 2: floor(4 / 2) = 2 outputs, each window fully inside.
    let input = Tensor::from_fn(shape(5, 5, 2), |x, y, c| (x + 2 * y + c) as f32);
    let weights: Vec<f32> = (0..3 * 3 * 2 * 3).map(|i| (i % 5) as f32 * 0.1).collect();
    let bias = [0.5, -0.5, 1.0];
    let layer = Layer::Conv2d(Conv2d::new(3, (3, 3), 2, Padding::Valid, &weights, &bias));
    let output = run(&layer, input.clone());
    assert_eq!(output.shape(), shape(2, 2, 3));

    for x in 0..2 {
        for y in 0..2 {
            for d in 0..3 {
                let mut expected = bias[d];
                for i in 0..3 {
                    for j in 0..3 {
                        for c in 0..2 {
                            expected += input.get(x * 2 + i, y * 2 + j, c)
                                * weights[((i * 3 + j) * 2 + c) * 3 + d];
                        }
                    }
                }
                assert!((output.get(x, y, d) - expected).abs() < 1e-4);
            }
        }
    }
}

#[test]
fn pointwise_conv_mixes_channels() {
    let input = Tensor::from_fn(shape(2, 2, 2), |x, y, c| (x + y) as f32 + c as f32 * 10.0);
    // Weights (1, 1, 2, 3).
    let weights = [1.0, 0.0, 2.0, 0.0, 1.0, 3.0];
    let bias = [0.0, 1.0, 0.0];
    let layer = Layer::Conv2d(Conv2d::new(3, (1, 1), 1, Padding::Same, &weights, &bias));
    let output = run(&layer, input.clone());
    assert_eq!(output.shape(), shape(2, 2, 3));
    let (a, b) = (input.get(1, 0, 0), input.get(1, 0, 1));
    assert_eq!(output.get(1, 0, 0), a);
    assert_eq!(output.get(1, 0, 1), b + 1.0);
    assert_eq!(output.get(1, 0, 2), 2.0 * a + 3.0 * b);
}

#[test]
fn conv_dispatch_binds_arguments_in_contract_order() {
    let backend = RecordingBackend::default();
    let input = Tensor::zeros(shape(5, 4, 2));
    let weights = vec![0.0; 3 * 3 * 2 * 4];
    let bias = [0.0; 4];
    let layer = Layer::Conv2d(Conv2d::new(4, (3, 3), 2, Padding::Valid, &weights, &bias));
    layer.apply(&backend, input.shape(), input).unwrap();

    let calls = backend.calls.borrow();
    let call = &calls[0];
    assert_eq!(call.kernel, Kernel::Conv2d9Valid);
    assert_eq!(
        call.kinds[..4],
        [ArgKind::Input, ArgKind::Output, ArgKind::Input, ArgKind::Input]
    );
    // stride, in_channels, in_width, in_height, out_width, out_height, out_depth
    assert_eq!(call.scalars, vec![2, 2, 5, 4, 2, 1, 4]);
    assert_eq!(call.space, [2, 1, 4]);
}

#[test]
fn same_depthwise_keeps_spatial_size_at_stride_two() {
    let input = Tensor::from_fn(shape(4, 4, 2), |x, y, c| (x * 4 + y) as f32 + c as f32);
    let weights = [1.0; 18];
    let bias = [0.0, 0.0];
    let layer = Layer::DepthwiseConv2d(DepthwiseConv2d::new((3, 3), 2, Padding::Same, &weights, &bias));
    let output = run(&layer, input.clone());
    assert_eq!(output.shape(), shape(4, 4, 2));

    let window = |xs: std::ops::RangeInclusive<usize>, ys: std::ops::RangeInclusive<usize>, c| {
        xs.flat_map(|x| ys.clone().map(move |y| (x, y)))
            .map(|(x, y)| input.get(x, y, c))
            .sum::<f32>()
    };
    // Output (0, 0) reads the full window anchored at the origin.
    assert_eq!(output.get(0, 0, 0), window(0..=2, 0..=2, 0));
    // Output (1, 1) starts at (2, 2); taps at 4 fall off the edge.
    assert_eq!(output.get(1, 1, 1), window(2..=3, 2..=3, 1));
    // From x = 2 on the window lies entirely past the input.
    assert_eq!(output.get(2, 2, 0), 0.0);
    assert_eq!(output.get(3, 3, 1), 0.0);
}

#[test]
fn valid_depthwise_keeps_channels_separate() {
    let input = Tensor::from_fn(shape(3, 3, 2), |_, _, c| if c == 0 { 1.0 } else { 2.0 });
    let mut weights = [0.0; 18];
    for tap in 0..9 {
        weights[tap * 2] = 1.0;
        weights[tap * 2 + 1] = -1.0;
    }
    let bias = [0.5, 0.0];
    let layer = Layer::DepthwiseConv2d(DepthwiseConv2d::new((3, 3), 2, Padding::Valid, &weights, &bias));
    let output = run(&layer, input);
    assert_eq!(output.shape(), shape(1, 1, 2));
    assert_eq!(output.data(), &[9.5, -18.0]);
}

#[test]
fn unsupported_configurations_are_rejected() {
    let weights = [0.0; 75];
    let bias = [0.0; 3];
    let input = shape(8, 8, 3);
    let rejected = [
        Layer::Conv2d(Conv2d::new(1, (5, 5), 1, Padding::Valid, &weights, &bias)),
        Layer::Conv2d(Conv2d::new(1, (3, 3), 1, Padding::Same, &weights, &bias)),
        Layer::Conv2d(Conv2d::new(1, (1, 1), 1, Padding::Valid, &weights, &bias)),
        Layer::Conv2d(Conv2d::new(1, (1, 1), 2, Padding::Same, &weights, &bias)),
        Layer::Conv2d(Conv2d::new(1, (3, 3), 0, Padding::Valid, &weights, &bias)),
        Layer::DepthwiseConv2d(DepthwiseConv2d::new((5, 5), 1, Padding::Same, &weights, &bias)),
    ];
    for layer in &rejected {
        let err = layer.output_shape(input).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }), "{layer:?}: {err}");
        let err = layer
            .apply(&HostBackend, input, Tensor::zeros(input))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }), "{err}");
    }
}

#[test]
fn declared_shape_must_match_the_tensor() {
    let input = Tensor::zeros(shape(2, 2, 1));
    let err = Layer::Relu
        .apply(&HostBackend, shape(1, 4, 1), input)
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)), "{err}");
}

#[test]
fn mis_sized_weights_fail_before_dispatch() {
    let backend = RecordingBackend::default();
    let weights = [0.0; 8];
    let bias = [0.0];
    let layer = Layer::Conv2d(Conv2d::new(1, (3, 3), 1, Padding::Valid, &weights, &bias));
    let input = Tensor::zeros(shape(3, 3, 1));
    let err = layer.apply(&backend, input.shape(), input).unwrap_err();
    assert!(matches!(err, Error::InvalidParameters(_)), "{err}");
    assert!(backend.calls.borrow().is_empty());
}
