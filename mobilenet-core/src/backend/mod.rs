//! Compute backends that execute the named layer kernels.
//!
//! Layers never touch a device directly: they describe a dispatch as a
//! [`Kernel`], an ordered argument list, and an [`IndexSpace`], and hand it to a
//! [`ComputeBackend`]. Every dispatch blocks until its results are visible in
//! the host slices that were bound, so consecutive dispatches are strictly
//! ordered.

mod gpu;
mod host;
pub mod kernel;
mod utils;

pub use gpu::WgpuBackend;
pub use host::HostBackend;
pub use kernel::{ArgKind, IndexSpace, Kernel, KernelArg};

use crate::error::BackendError;

/// Executes named kernels over an index space.
pub trait ComputeBackend {
    /// Short human-readable name for logs.
    fn name(&self) -> &str;

    /// Run `kernel` once over `space`, blocking until every writable buffer in
    /// `args` holds the kernel's results.
    fn dispatch(
        &self,
        kernel: Kernel,
        args: &mut [KernelArg<'_>],
        space: IndexSpace,
    ) -> Result<(), BackendError>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &mut [KernelArg<'_>],
        space: IndexSpace,
    ) -> Result<(), BackendError> {
        (**self).dispatch(kernel, args, space)
    }
}
