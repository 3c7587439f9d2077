use super::{LayerKind, Padding, expect_len, u32_arg, valid_extent};
use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorShape};

const LAYER: LayerKind = LayerKind::DepthwiseConv2d;

/// Per-channel 3x3 convolution, weights laid out `(3, 3, channels)`.
///
/// SAME centres the window on `(x * stride, y * stride)` and keeps the
/// spatial size, including at stride 2.
#[derive(Debug, Clone, Copy)]
pub struct DepthwiseConv2d<'p> {
    pub kernel_size: (usize, usize),
    pub stride: usize,
    pub padding: Padding,
    pub weights: &'p [f32],
    pub bias: &'p [f32],
}

impl<'p> DepthwiseConv2d<'p> {
    pub fn new(
        kernel_size: (usize, usize),
        stride: usize,
        padding: Padding,
        weights: &'p [f32],
        bias: &'p [f32],
    ) -> Self {
        Self {
            kernel_size,
            stride,
            padding,
            weights,
            bias,
        }
    }

    fn kernel(&self) -> Result<Kernel> {
        if self.kernel_size != (3, 3) {
            let (k0, k1) = self.kernel_size;
            return Err(Error::unsupported(
                LAYER.name(),
                format!("{k0}x{k1} kernel, only 3x3 is implemented"),
            ));
        }
        if self.stride == 0 {
            return Err(Error::unsupported(LAYER.name(), "stride 0"));
        }
        Ok(match self.padding {
            Padding::Valid => Kernel::DepthwiseConv2d9Valid,
            Padding::Same => Kernel::DepthwiseConv2d9Same,
        })
    }

    pub fn output_shape(&self, input: TensorShape) -> Result<TensorShape> {
        match self.kernel()? {
            Kernel::DepthwiseConv2d9Valid => TensorShape::new(
                valid_extent(LAYER, input.width(), self.stride)?,
                valid_extent(LAYER, input.height(), self.stride)?,
                input.channels(),
            ),
            _ => Ok(input),
        }
    }

    /// Expected `(weights, bias)` lengths for `channels` inputs.
    pub fn parameter_sizes(&self, channels: usize) -> (usize, usize) {
        let (k0, k1) = self.kernel_size;
        (k0 * k1 * channels, channels)
    }

    pub(super) fn apply(&self, backend: &dyn ComputeBackend, input: &Tensor) -> Result<Tensor> {
        let kernel = self.kernel()?;
        let shape = input.shape();
        let out_shape = self.output_shape(shape)?;
        let (weight_len, bias_len) = self.parameter_sizes(shape.channels());
        expect_len(LAYER, "weights", self.weights.len(), weight_len)?;
        expect_len(LAYER, "biases", self.bias.len(), bias_len)?;

        let mut output = vec![0.0; out_shape.elements()];
        backend.dispatch(
            kernel,
            &mut [
                KernelArg::Input(input.data()),
                KernelArg::Output(&mut output),
                KernelArg::Input(self.weights),
                KernelArg::Input(self.bias),
                u32_arg(LAYER, self.stride)?,
                u32_arg(LAYER, shape.channels())?,
                u32_arg(LAYER, shape.width())?,
                u32_arg(LAYER, shape.height())?,
                u32_arg(LAYER, out_shape.width())?,
                u32_arg(LAYER, out_shape.height())?,
            ],
            IndexSpace::volume(out_shape.width(), out_shape.height(), out_shape.channels()),
        )?;
        Tensor::new(out_shape, output)
    }
}
