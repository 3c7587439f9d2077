use super::{LayerKind, expect_len, u32_arg};
use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorShape};

use log::trace;

const LAYER: LayerKind = LayerKind::Dense;

/// Fully connected layer followed by softmax; weights laid out `(units, inputs)`.
///
/// Runs as four dispatches: the product, the maximum, the shifted
/// exponentials with their total, and the normalisation. The maximum and the
/// total come back to the host between stages.
#[derive(Debug, Clone, Copy)]
pub struct Dense<'p> {
    pub units: usize,
    pub weights: &'p [f32],
    pub bias: Option<&'p [f32]>,
}

impl<'p> Dense<'p> {
    pub fn new(units: usize, weights: &'p [f32], bias: Option<&'p [f32]>) -> Self {
        Self {
            units,
            weights,
            bias,
        }
    }

    pub fn output_shape(&self, _input: TensorShape) -> Result<TensorShape> {
        if self.units == 0 {
            return Err(Error::unsupported(LAYER.name(), "zero units"));
        }
        TensorShape::new(1, 1, self.units)
    }

    /// Expected `(weights, bias)` lengths for `inputs` flattened values.
    pub fn parameter_sizes(&self, inputs: usize) -> (usize, Option<usize>) {
        (self.units * inputs, self.bias.map(|_| self.units))
    }

    pub(super) fn apply(&self, backend: &dyn ComputeBackend, input: &Tensor) -> Result<Tensor> {
        let out_shape = self.output_shape(input.shape())?;
        let inputs = input.shape().elements();
        let (weight_len, bias_len) = self.parameter_sizes(inputs);
        expect_len(LAYER, "weights", self.weights.len(), weight_len)?;
        if let (Some(bias), Some(expected)) = (self.bias, bias_len) {
            expect_len(LAYER, "biases", bias.len(), expected)?;
        }

        let units = self.units;
        let space = IndexSpace::linear(units);
        let mut values = vec![0.0; units];
        match self.bias {
            Some(bias) => backend.dispatch(
                Kernel::MatrixMultiplicationBias,
                &mut [
                    KernelArg::Input(input.data()),
                    KernelArg::Input(self.weights),
                    KernelArg::Input(bias),
                    KernelArg::Output(&mut values),
                    u32_arg(LAYER, inputs)?,
                ],
                space,
            )?,
            None => backend.dispatch(
                Kernel::MatrixMultiplication,
                &mut [
                    KernelArg::Input(input.data()),
                    KernelArg::Input(self.weights),
                    KernelArg::Output(&mut values),
                    u32_arg(LAYER, inputs)?,
                ],
                space,
            )?,
        }

        let mut max = [0.0f32];
        backend.dispatch(
            Kernel::MaxValue,
            &mut [KernelArg::Input(&values), KernelArg::Output(&mut max)],
            space,
        )?;

        let mut total = [0.0f32];
        backend.dispatch(
            Kernel::Softmax,
            &mut [
                KernelArg::InOut(&mut values),
                KernelArg::F32(max[0]),
                KernelArg::Output(&mut total),
            ],
            space,
        )?;
        trace!(target: "mobilenet::network", "softmax max {} total {}", max[0], total[0]);

        backend.dispatch(
            Kernel::ApplyReduction,
            &mut [KernelArg::InOut(&mut values), KernelArg::F32(total[0])],
            space,
        )?;
        Tensor::new(out_shape, values)
    }
}
