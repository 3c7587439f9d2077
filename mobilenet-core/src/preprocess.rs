//! Pixel normalisation applied once per image before the first layer.

use crate::backend::{ComputeBackend, IndexSpace, Kernel, KernelArg};
use crate::error::Result;
use crate::network::MobileNet;
use crate::tensor::Tensor;

use mobilenet_utils::telemetry::timing_guard;

/// Map raw `[0, 255]` pixel values to `[-1, 1]` via `v / 127.5 - 1`.
pub fn preprocess(backend: &dyn ComputeBackend, image: Tensor) -> Result<Tensor> {
    let (shape, mut data) = image.into_parts();
    let len = data.len();
    backend.dispatch(
        Kernel::PreprocessImage,
        &mut [KernelArg::InOut(&mut data)],
        IndexSpace::linear(len),
    )?;
    Tensor::new(shape, data)
}

/// Preprocess `image` and run it through `network`, returning the class probabilities.
pub fn classify(
    backend: &dyn ComputeBackend,
    network: &MobileNet<'_>,
    image: Tensor,
) -> Result<Vec<f32>> {
    let _guard = timing_guard("classify image", log::Level::Debug);
    let input = preprocess(backend, image)?;
    Ok(network.forward(backend, input)?.into_data())
}
