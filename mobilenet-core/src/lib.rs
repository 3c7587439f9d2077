//! MobileNet forward pass over pluggable compute backends.
//!
//! A [`MobileNet`] is a fixed table of layers whose parameters borrow from a
//! [`ParameterStore`]. Every layer turns into one or more named kernel
//! dispatches on a [`ComputeBackend`]: [`WgpuBackend`] runs them as WGSL
//! compute shaders, [`HostBackend`] runs the same kernels on the CPU.

/// Kernel registry, argument contracts, and the backends that run them.
pub mod backend;
/// Error types.
pub mod error;
/// Layer variants and their dispatch sequences.
pub mod layers;
/// Architecture table and forward-pass driver.
pub mod network;
/// Weight loading.
pub mod params;
/// Pixel normalisation.
pub mod preprocess;
/// Host tensors threaded between layers.
pub mod tensor;

pub use backend::{ComputeBackend, HostBackend, IndexSpace, Kernel, KernelArg, WgpuBackend};
pub use error::{BackendError, Error, Result};
pub use layers::{Layer, LayerKind, Padding};
pub use network::{ForwardObserver, INPUT_CHANNELS, LayerSpec, MOBILENET_ARCHITECTURE, MobileNet};
pub use params::{LayerParameters, ParameterStore};
pub use preprocess::{classify, preprocess};
pub use tensor::{Tensor, TensorShape};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
