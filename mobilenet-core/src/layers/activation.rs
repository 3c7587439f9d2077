use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::Result;
use crate::tensor::Tensor;

/// `max(0, x)` in place on the moved input buffer.
pub(super) fn relu(backend: &dyn ComputeBackend, input: Tensor) -> Result<Tensor> {
    let (shape, mut data) = input.into_parts();
    let len = data.len();
    backend.dispatch(
        Kernel::Relu,
        &mut [KernelArg::InOut(&mut data)],
        IndexSpace::linear(len),
    )?;
    Tensor::new(shape, data)
}
