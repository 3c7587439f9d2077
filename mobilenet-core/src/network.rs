//! The MobileNet layer table and the forward-pass driver.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use crate::layers::{
    Conv2d, Dense, DepthwiseConv2d, Layer, LayerKind, Padding, ZeroPadding2d,
};
use crate::params::ParameterStore;
use crate::tensor::{Tensor, TensorShape};

use log::debug;

/// Channel count of the images the network accepts.
pub const INPUT_CHANNELS: usize = 3;

/// Parameter-free description of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSpec {
    ZeroPadding {
        pad_start_0: usize,
        pad_end_0: usize,
        pad_start_1: usize,
        pad_end_1: usize,
    },
    Conv2d {
        filters: usize,
        kernel_size: (usize, usize),
        stride: usize,
        padding: Padding,
    },
    DepthwiseConv2d {
        kernel_size: (usize, usize),
        stride: usize,
        padding: Padding,
    },
    Relu,
    GlobalAveragePooling,
    Dense {
        units: usize,
        bias: bool,
    },
}

const fn pad() -> LayerSpec {
    LayerSpec::ZeroPadding {
        pad_start_0: 0,
        pad_end_0: 1,
        pad_start_1: 0,
        pad_end_1: 1,
    }
}

const fn pointwise(filters: usize) -> LayerSpec {
    LayerSpec::Conv2d {
        filters,
        kernel_size: (1, 1),
        stride: 1,
        padding: Padding::Same,
    }
}

const fn depthwise(stride: usize, padding: Padding) -> LayerSpec {
    LayerSpec::DepthwiseConv2d {
        kernel_size: (3, 3),
        stride,
        padding,
    }
}

const RELU: LayerSpec = LayerSpec::Relu;

/// The 61-layer MobileNet. Layer `n` (1-based) reads its parameters from `layer_n`.
pub const MOBILENET_ARCHITECTURE: [LayerSpec; 61] = [
    pad(),
    LayerSpec::Conv2d {
        filters: 8,
        kernel_size: (3, 3),
        stride: 2,
        padding: Padding::Valid,
    },
    RELU,
    depthwise(2, Padding::Same),
    RELU,
    pointwise(16),
    RELU,
    pad(),
    depthwise(2, Padding::Valid),
    RELU,
    pointwise(32),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(32),
    RELU,
    pad(),
    depthwise(2, Padding::Valid),
    RELU,
    pointwise(64),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(64),
    RELU,
    pad(),
    depthwise(2, Padding::Valid),
    RELU,
    pointwise(128),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(128),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(128),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(128),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(128),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(128),
    RELU,
    pad(),
    depthwise(2, Padding::Valid),
    RELU,
    pointwise(256),
    RELU,
    depthwise(1, Padding::Same),
    RELU,
    pointwise(256),
    RELU,
    LayerSpec::GlobalAveragePooling,
    LayerSpec::Dense {
        units: 2,
        bias: false,
    },
];

impl LayerSpec {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerSpec::ZeroPadding { .. } => LayerKind::ZeroPadding,
            LayerSpec::Conv2d { .. } => LayerKind::Conv2d,
            LayerSpec::DepthwiseConv2d { .. } => LayerKind::DepthwiseConv2d,
            LayerSpec::Relu => LayerKind::Relu,
            LayerSpec::GlobalAveragePooling => LayerKind::GlobalAveragePooling,
            LayerSpec::Dense { .. } => LayerKind::Dense,
        }
    }

    /// Channels produced from `in_channels` inputs.
    pub fn output_channels(&self, in_channels: usize) -> usize {
        match self {
            LayerSpec::Conv2d { filters, .. } => *filters,
            LayerSpec::Dense { units, .. } => *units,
            _ => in_channels,
        }
    }

    /// `(weights, bias)` lengths for `in_channels` inputs, `None` for
    /// parameter-free layers. Dense layers take a 1x1 spatial input.
    pub fn parameter_sizes(&self, in_channels: usize) -> Option<(usize, Option<usize>)> {
        match *self {
            LayerSpec::Conv2d {
                filters,
                kernel_size: (k0, k1),
                ..
            } => Some((k0 * k1 * in_channels * filters, Some(filters))),
            LayerSpec::DepthwiseConv2d {
                kernel_size: (k0, k1),
                ..
            } => Some((k0 * k1 * in_channels, Some(in_channels))),
            LayerSpec::Dense { units, bias } => {
                Some((units * in_channels, bias.then_some(units)))
            }
            _ => None,
        }
    }

    /// Attach parameters, checking their sizes against `in_channels`.
    fn bind<'p>(
        &self,
        layer: usize,
        in_channels: usize,
        store: &'p ParameterStore,
    ) -> Result<Layer<'p>> {
        let Some((weight_len, bias_len)) = self.parameter_sizes(in_channels) else {
            return Ok(match *self {
                LayerSpec::ZeroPadding {
                    pad_start_0,
                    pad_end_0,
                    pad_start_1,
                    pad_end_1,
                } => Layer::ZeroPadding(ZeroPadding2d::new(
                    pad_start_0,
                    pad_end_0,
                    pad_start_1,
                    pad_end_1,
                )),
                LayerSpec::GlobalAveragePooling => Layer::GlobalAveragePooling,
                _ => Layer::Relu,
            });
        };

        let params = store.require(layer)?;
        if params.weights.len() != weight_len {
            return Err(Error::InvalidParameters(format!(
                "layer_{layer} ({}) has {} weights, expected {weight_len}",
                self.kind(),
                params.weights.len()
            )));
        }
        let bias = match (bias_len, params.bias()) {
            (Some(expected), Some(bias)) if bias.len() == expected => Some(bias),
            (None, None) => None,
            (expected, found) => {
                return Err(Error::InvalidParameters(format!(
                    "layer_{layer} ({}) has {} biases, expected {}",
                    self.kind(),
                    found.map_or(0, <[f32]>::len),
                    expected.unwrap_or(0)
                )));
            }
        };
        let weights = params.weights.as_slice();

        Ok(match *self {
            LayerSpec::Conv2d {
                filters,
                kernel_size,
                stride,
                padding,
            } => Layer::Conv2d(Conv2d::new(
                filters,
                kernel_size,
                stride,
                padding,
                weights,
                bias.unwrap_or_default(),
            )),
            LayerSpec::DepthwiseConv2d {
                kernel_size,
                stride,
                padding,
            } => Layer::DepthwiseConv2d(DepthwiseConv2d::new(
                kernel_size,
                stride,
                padding,
                weights,
                bias.unwrap_or_default(),
            )),
            LayerSpec::Dense { units, .. } => Layer::Dense(Dense::new(units, weights, bias)),
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "{} has no parameters to bind",
                    self.kind()
                )));
            }
        })
    }
}

/// Receives every intermediate tensor of a forward pass.
pub trait ForwardObserver {
    /// Called after layer `index` (0-based) produced `output`.
    fn layer_completed(&mut self, index: usize, layer: &Layer<'_>, output: &Tensor) -> Result<()>;
}

impl ForwardObserver for () {
    fn layer_completed(&mut self, _: usize, _: &Layer<'_>, _: &Tensor) -> Result<()> {
        Ok(())
    }
}

/// An assembled network whose layers borrow from a [`ParameterStore`].
#[derive(Debug, Clone)]
pub struct MobileNet<'p> {
    layers: Vec<Layer<'p>>,
}

impl<'p> MobileNet<'p> {
    /// Assemble [`MOBILENET_ARCHITECTURE`] from `store`.
    pub fn new(store: &'p ParameterStore) -> Result<Self> {
        Self::from_architecture(&MOBILENET_ARCHITECTURE, store)
    }

    /// Assemble an arbitrary layer table, validating every parameter size.
    pub fn from_architecture(architecture: &[LayerSpec], store: &'p ParameterStore) -> Result<Self> {
        let mut channels = INPUT_CHANNELS;
        let mut layers = Vec::with_capacity(architecture.len());
        for (position, spec) in architecture.iter().enumerate() {
            layers.push(spec.bind(position + 1, channels, store)?);
            channels = spec.output_channels(channels);
        }
        debug!(
            target: "mobilenet::network",
            "assembled {} layers ending in {channels} outputs",
            layers.len()
        );
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer<'p>] {
        &self.layers
    }

    /// Shape of every layer's output for an input of `input` shape.
    pub fn shapes(&self, input: TensorShape) -> Result<Vec<TensorShape>> {
        let mut shape = input;
        self.layers
            .iter()
            .map(|layer| {
                shape = layer.output_shape(shape)?;
                Ok(shape)
            })
            .collect()
    }

    /// Run every layer in order and return the final tensor.
    pub fn forward(&self, backend: &dyn ComputeBackend, image: Tensor) -> Result<Tensor> {
        self.forward_with(backend, image, &mut ())
    }

    /// [`forward`](Self::forward), reporting each intermediate tensor to `observer`.
    pub fn forward_with(
        &self,
        backend: &dyn ComputeBackend,
        image: Tensor,
        observer: &mut dyn ForwardObserver,
    ) -> Result<Tensor> {
        if image.shape().channels() != INPUT_CHANNELS {
            return Err(Error::InputFormat(format!(
                "expected {INPUT_CHANNELS} channels, got a {} image",
                image.shape()
            )));
        }

        let mut current = image;
        for (index, layer) in self.layers.iter().enumerate() {
            current.check_invariant()?;
            let shape = current.shape();
            current = layer.apply(backend, shape, current)?;
            debug!(
                target: "mobilenet::network",
                "layer {} {}: {shape} -> {}",
                index + 1,
                layer.kind(),
                current.shape()
            );
            observer.layer_completed(index, layer, &current)?;
        }
        Ok(current)
    }
}
