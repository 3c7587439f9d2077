//! Network layers, each expressed as one or more backend dispatches.

mod activation;
mod conv2d;
mod dense;
mod depthwise;
mod padding;
mod pooling;
#[cfg(test)]
mod tests;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use depthwise::DepthwiseConv2d;
pub use padding::ZeroPadding2d;

use crate::backend::{ComputeBackend, KernelArg};
use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorShape};

use std::fmt;

/// Convolution border handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Valid,
    Same,
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Valid => f.write_str("VALID"),
            Padding::Same => f.write_str("SAME"),
        }
    }
}

/// Discriminant of [`Layer`], used in logs and layer dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    ZeroPadding,
    Conv2d,
    DepthwiseConv2d,
    Relu,
    GlobalAveragePooling,
    Dense,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::ZeroPadding => "ZeroPadding2D",
            LayerKind::Conv2d => "Conv2D",
            LayerKind::DepthwiseConv2d => "DepthwiseConv2D",
            LayerKind::Relu => "Relu2D",
            LayerKind::GlobalAveragePooling => "GlobalAveragePooling2D",
            LayerKind::Dense => "Dense2D",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One network layer. Parameter slices are borrowed from a
/// [`ParameterStore`](crate::params::ParameterStore).
#[derive(Debug, Clone)]
pub enum Layer<'p> {
    ZeroPadding(ZeroPadding2d),
    Conv2d(Conv2d<'p>),
    DepthwiseConv2d(DepthwiseConv2d<'p>),
    Relu,
    GlobalAveragePooling,
    Dense(Dense<'p>),
}

impl<'p> Layer<'p> {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::ZeroPadding(_) => LayerKind::ZeroPadding,
            Layer::Conv2d(_) => LayerKind::Conv2d,
            Layer::DepthwiseConv2d(_) => LayerKind::DepthwiseConv2d,
            Layer::Relu => LayerKind::Relu,
            Layer::GlobalAveragePooling => LayerKind::GlobalAveragePooling,
            Layer::Dense(_) => LayerKind::Dense,
        }
    }

    /// Shape this layer produces for `input`, or why it cannot run on it.
    pub fn output_shape(&self, input: TensorShape) -> Result<TensorShape> {
        match self {
            Layer::ZeroPadding(layer) => layer.output_shape(input),
            Layer::Conv2d(layer) => layer.output_shape(input),
            Layer::DepthwiseConv2d(layer) => layer.output_shape(input),
            Layer::Relu => Ok(input),
            Layer::GlobalAveragePooling => TensorShape::new(1, 1, input.channels()),
            Layer::Dense(layer) => layer.output_shape(input),
        }
    }

    /// Run the layer on `input`, whose shape must equal `shape`.
    ///
    /// Blocks until every dispatch has completed; the returned tensor is fresh.
    pub fn apply(
        &self,
        backend: &dyn ComputeBackend,
        shape: TensorShape,
        input: Tensor,
    ) -> Result<Tensor> {
        if input.shape() != shape {
            return Err(Error::InvariantViolation(format!(
                "{} received a {} tensor but was told {}",
                self.kind(),
                input.shape(),
                shape
            )));
        }
        input.check_invariant()?;

        let output = match self {
            Layer::ZeroPadding(layer) => layer.apply(backend, &input)?,
            Layer::Conv2d(layer) => layer.apply(backend, &input)?,
            Layer::DepthwiseConv2d(layer) => layer.apply(backend, &input)?,
            Layer::Relu => activation::relu(backend, input)?,
            Layer::GlobalAveragePooling => pooling::global_average(backend, &input)?,
            Layer::Dense(layer) => layer.apply(backend, &input)?,
        };
        output.check_invariant()?;
        Ok(output)
    }
}

/// Scalar kernel argument from a host-side size.
pub(crate) fn u32_arg(layer: LayerKind, value: usize) -> Result<KernelArg<'static>> {
    u32::try_from(value).map(KernelArg::U32).map_err(|_| {
        Error::unsupported(
            layer.name(),
            format!("{value} does not fit a 32-bit kernel argument"),
        )
    })
}

/// Reject a parameter slice whose length disagrees with the layer geometry.
pub(crate) fn expect_len(layer: LayerKind, what: &str, found: usize, expected: usize) -> Result<()> {
    if found != expected {
        return Err(Error::InvalidParameters(format!(
            "{layer} {what} hold {found} values, expected {expected}"
        )));
    }
    Ok(())
}

/// Spatial size after a 3x3 VALID window: `floor((size - 1) / stride)`.
pub(crate) fn valid_extent(layer: LayerKind, size: usize, stride: usize) -> Result<usize> {
    let extent = (size - 1) / stride;
    if extent == 0 {
        return Err(Error::unsupported(
            layer.name(),
            format!("input extent {size} is too small for a 3x3 VALID window at stride {stride}"),
        ));
    }
    Ok(extent)
}
