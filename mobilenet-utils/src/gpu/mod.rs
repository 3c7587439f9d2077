//! GPU context management helpers built on top of `wgpu`.
//!
//! Adapter selection and device creation live here so the inference engine only
//! ever sees an already-initialised [`GpuContext`]. Callers that can run without
//! a GPU use [`GpuContext::init_with_fallback`] and switch to host kernels when
//! the result is not [`GpuAvailability::Available`].

use std::sync::Arc;

use log::{debug, info, warn};
use pollster::block_on;
use thiserror::Error;
use wgpu::{
    Adapter, AdapterInfo, Backends, Device, DeviceDescriptor, DeviceType, ExperimentalFeatures,
    Features, Instance, InstanceDescriptor, InstanceFlags, Limits, MemoryHints, PowerPreference,
    Queue, RequestAdapterError, RequestAdapterOptions, RequestDeviceError, Trace,
};

/// High-level configuration for creating a [`GpuContext`].
#[derive(Clone, Debug)]
pub struct GpuContextOptions {
    /// Whether GPU support is enabled.
    pub enabled: bool,
    /// Allow environment variables (e.g. `WGPU_BACKEND`) to override defaults.
    pub respect_env: bool,
    /// Which backends should be considered.
    pub backends: Backends,
    /// Instance flags (debug/validation toggles).
    pub flags: InstanceFlags,
    /// Adapter preference (high-performance vs low-power).
    pub power_preference: PowerPreference,
    /// Force wgpu to pick its fallback (software) adapter.
    pub force_fallback_adapter: bool,
    /// Optional debug label for the logical device.
    pub label: Option<String>,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_env: true,
            backends: Backends::PRIMARY,
            flags: InstanceFlags::from_build_config(),
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: Some("MobileNet GPU context".to_string()),
        }
    }
}

impl GpuContextOptions {
    /// Convenience helper for explicitly disabling GPU usage.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn instance(&self) -> (Instance, Backends) {
        let mut instance_desc = if self.respect_env {
            InstanceDescriptor::from_env_or_default()
        } else {
            InstanceDescriptor::default()
        };
        let backends = if self.respect_env {
            self.backends.with_env()
        } else {
            self.backends
        };
        instance_desc.backends = backends;
        instance_desc.flags = if self.respect_env {
            self.flags.with_env()
        } else {
            self.flags
        };
        (Instance::new(&instance_desc), backends)
    }
}

/// Result of attempting to initialize a GPU context while supporting host fallback.
#[derive(Debug)]
pub enum GpuAvailability {
    /// GPU resources are ready to use.
    Available(Arc<GpuContext>),
    /// GPU code path has been disabled by configuration.
    Disabled { reason: String },
    /// GPU initialization failed; callers should fall back to host kernels.
    Unavailable { error: GpuInitError },
}

impl GpuAvailability {
    /// Returns `true` when a GPU context was created successfully.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Returns a reference to the underlying GPU context when it exists.
    pub fn context(&self) -> Option<&Arc<GpuContext>> {
        match self {
            Self::Available(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Shared device/queue pair plus the adapter metadata it was created from.
#[derive(Debug)]
pub struct GpuContext {
    device: Device,
    queue: Queue,
    info: AdapterInfo,
    limits: Limits,
}

impl GpuContext {
    /// Initialize a new GPU context with the provided options.
    pub fn initialize(options: &GpuContextOptions) -> Result<Self, GpuInitError> {
        if !options.enabled {
            return Err(GpuInitError::Disabled);
        }

        let (instance, backends) = options.instance();
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: options.power_preference,
            force_fallback_adapter: options.force_fallback_adapter,
            compatible_surface: None,
        }))
        .map_err(|source| GpuInitError::Adapter { backends, source })?;

        Self::from_adapter(&adapter, options.label.as_deref())
    }

    fn from_adapter(adapter: &Adapter, label: Option<&str>) -> Result<Self, GpuInitError> {
        let info = adapter.get_info();
        // Early activations can exceed the default 128 MiB storage binding size.
        let limits = adapter.limits();
        let device_desc = DeviceDescriptor {
            label,
            required_features: Features::empty(),
            required_limits: limits.clone(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::Performance,
            trace: Trace::default(),
        };

        let (device, queue) =
            block_on(adapter.request_device(&device_desc)).map_err(GpuInitError::from)?;

        info!(
            target: "mobilenet::gpu",
            "Using GPU adapter '{}' ({:?}/{:?})",
            info.name, info.backend, info.device_type
        );
        debug!(
            target: "mobilenet::gpu",
            "max storage binding {} bytes, max workgroups per dimension {}",
            limits.max_storage_buffer_binding_size,
            limits.max_compute_workgroups_per_dimension
        );

        Ok(Self {
            device,
            queue,
            info,
            limits,
        })
    }

    /// Attempt to create a GPU context and report why it is missing otherwise.
    pub fn init_with_fallback(options: &GpuContextOptions) -> GpuAvailability {
        if !options.enabled {
            return GpuAvailability::Disabled {
                reason: "GPU acceleration disabled via configuration".to_string(),
            };
        }

        match Self::initialize(options) {
            Ok(ctx) => GpuAvailability::Available(Arc::new(ctx)),
            Err(GpuInitError::Disabled) => GpuAvailability::Disabled {
                reason: "GPU acceleration disabled via configuration".to_string(),
            },
            Err(err) => {
                warn!(
                    target: "mobilenet::gpu",
                    "GPU initialization failed ({err}); falling back to host kernels."
                );
                GpuAvailability::Unavailable { error: err }
            }
        }
    }

    /// Returns the shared `wgpu::Device`.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the shared `wgpu::Queue`.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Adapter metadata handy for logging.
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    /// `wgpu::Limits` negotiated for this context.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

/// Description of one adapter visible to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: DeviceType,
    pub backend: String,
    pub driver: String,
    pub driver_info: String,
}

impl From<AdapterInfo> for AdapterSummary {
    fn from(info: AdapterInfo) -> Self {
        Self {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: format!("{:?}", info.backend),
            driver: info.driver,
            driver_info: info.driver_info,
        }
    }
}

/// Enumerate every adapter the configured backends expose, without creating devices.
pub fn list_adapters(options: &GpuContextOptions) -> Vec<AdapterSummary> {
    let (instance, backends) = options.instance();
    instance
        .enumerate_adapters(backends)
        .into_iter()
        .map(|adapter| AdapterSummary::from(adapter.get_info()))
        .collect()
}

/// Tracks GPU initialization failures and reasons for host fallback.
#[derive(Debug, Error)]
pub enum GpuInitError {
    #[error("GPU adapter request failed for {backends:?}: {source}")]
    Adapter {
        backends: Backends,
        #[source]
        source: RequestAdapterError,
    },
    #[error("GPU device creation failed: {0}")]
    Device(#[from] RequestDeviceError),
    #[error("GPU acceleration disabled")]
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_options_skip_gpu_setup() {
        let options = GpuContextOptions::disabled();
        match GpuContext::init_with_fallback(&options) {
            GpuAvailability::Disabled { .. } => {}
            other => panic!("expected GPU to be disabled, got {other:?}"),
        }
    }

    #[test]
    fn initialize_rejects_disabled_options() {
        let err = GpuContext::initialize(&GpuContextOptions::disabled()).unwrap_err();
        assert!(matches!(err, GpuInitError::Disabled));
    }
}
