use super::LayerKind;
use super::u32_arg;
use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::Result;
use crate::tensor::{Tensor, TensorShape};

/// Per-channel mean over the spatial plane, as a sum followed by a division.
pub(super) fn global_average(backend: &dyn ComputeBackend, input: &Tensor) -> Result<Tensor> {
    let shape = input.shape();
    let channels = shape.channels();
    let mut sums = vec![0.0; channels];

    backend.dispatch(
        Kernel::SumByChannels,
        &mut [
            KernelArg::Input(input.data()),
            KernelArg::Output(&mut sums),
            u32_arg(LayerKind::GlobalAveragePooling, channels)?,
        ],
        IndexSpace::linear(channels),
    )?;

    let plane = (shape.width() * shape.height()) as f32;
    backend.dispatch(
        Kernel::ApplyReduction,
        &mut [KernelArg::InOut(&mut sums), KernelArg::F32(plane)],
        IndexSpace::linear(channels),
    )?;

    Tensor::new(TensorShape::new(1, 1, channels)?, sums)
}
