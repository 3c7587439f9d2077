use super::{LayerKind, Padding, expect_len, u32_arg, valid_extent};
use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorShape};

const LAYER: LayerKind = LayerKind::Conv2d;

/// Standard convolution with weights laid out `(k0, k1, in_channels, filters)`.
///
/// Only two configurations have kernels: 3x3 VALID at any stride, and 1x1
/// SAME at stride 1. Anything else is rejected when the layer is first asked
/// for its output shape.
#[derive(Debug, Clone, Copy)]
pub struct Conv2d<'p> {
    pub filters: usize,
    pub kernel_size: (usize, usize),
    pub stride: usize,
    pub padding: Padding,
    pub weights: &'p [f32],
    pub bias: &'p [f32],
}

impl<'p> Conv2d<'p> {
    pub fn new(
        filters: usize,
        kernel_size: (usize, usize),
        stride: usize,
        padding: Padding,
        weights: &'p [f32],
        bias: &'p [f32],
    ) -> Self {
        Self {
            filters,
            kernel_size,
            stride,
            padding,
            weights,
            bias,
        }
    }

    fn kernel(&self) -> Result<Kernel> {
        if self.stride == 0 || self.filters == 0 {
            return Err(Error::unsupported(
                LAYER.name(),
                format!("stride {} with {} filters", self.stride, self.filters),
            ));
        }
        match (self.kernel_size, self.padding) {
            ((3, 3), Padding::Valid) => Ok(Kernel::Conv2d9Valid),
            ((1, 1), Padding::Same) if self.stride == 1 => Ok(Kernel::Conv2d1Same),
            ((k0, k1), padding) => Err(Error::unsupported(
                LAYER.name(),
                format!("{k0}x{k1} kernel with {padding} padding at stride {}", self.stride),
            )),
        }
    }

    pub fn output_shape(&self, input: TensorShape) -> Result<TensorShape> {
        match self.kernel()? {
            Kernel::Conv2d9Valid => TensorShape::new(
                valid_extent(LAYER, input.width(), self.stride)?,
                valid_extent(LAYER, input.height(), self.stride)?,
                self.filters,
            ),
            _ => input.with_channels(self.filters),
        }
    }

    /// Expected `(weights, bias)` lengths for `in_channels` inputs.
    pub fn parameter_sizes(&self, in_channels: usize) -> (usize, usize) {
        let (k0, k1) = self.kernel_size;
        (k0 * k1 * in_channels * self.filters, self.filters)
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
                u32_arg(LAYER, out_shape.channels())?,
            ],
            IndexSpace::volume(out_shape.width(), out_shape.height(), out_shape.channels()),
        )?;
        Tensor::new(out_shape, output)
    }
}
