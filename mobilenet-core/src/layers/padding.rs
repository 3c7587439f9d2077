use super::{LayerKind, u32_arg};
use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::Result;
use crate::tensor::{Tensor, TensorShape};

/// Zero border around the spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroPadding2d {
    pub pad_start_0: usize,
    pub pad_end_0: usize,
    pub pad_start_1: usize,
    pub pad_end_1: usize,
}

impl ZeroPadding2d {
    pub fn new(pad_start_0: usize, pad_end_0: usize, pad_start_1: usize, pad_end_1: usize) -> Self {
        Self {
            pad_start_0,
            pad_end_0,
            pad_start_1,
            pad_end_1,
        }
    }

    pub fn output_shape(&self, input: TensorShape) -> Result<TensorShape> {
        TensorShape::new(
            input.width() + self.pad_start_0 + self.pad_end_0,
            input.height() + self.pad_start_1 + self.pad_end_1,
            input.channels(),
        )
    }

    pub(super) fn apply(&self, backend: &dyn ComputeBackend, input: &Tensor) -> Result<Tensor> {
        let shape = input.shape();
        let out_shape = self.output_shape(shape)?;
        let mut output = vec![0.0; out_shape.elements()];
        let kind = LayerKind::ZeroPadding;

        backend.dispatch(
            Kernel::ZeroPadding2d,
            &mut [
                KernelArg::Input(input.data()),
                KernelArg::Output(&mut output),
                u32_arg(kind, shape.width())?,
                u32_arg(kind, shape.height())?,
                u32_arg(kind, shape.channels())?,
                u32_arg(kind, self.pad_start_0)?,
                u32_arg(kind, self.pad_end_0)?,
                u32_arg(kind, self.pad_start_1)?,
                u32_arg(kind, self.pad_end_1)?,
            ],
            IndexSpace::volume(shape.width(), shape.height(), shape.channels()),
        )?;
        Tensor::new(out_shape, output)
    }
}
