//! Kernel backend selection for mobilenet-cli.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use mobilenet_core::{ComputeBackend, HostBackend, WgpuBackend};
use mobilenet_utils::{
    BackendPreference, GpuAvailability, GpuContext, GpuContextOptions, config::AppSettings,
    list_adapters,
};

/// Pick the backend the settings ask for.
///
/// `auto` falls back to host kernels when no adapter can be initialised;
/// `gpu` treats that as fatal. Shader compilation happens here, so any
/// kernel that fails to build is reported before weights are read.
pub fn select_backend(settings: &AppSettings) -> Result<Box<dyn ComputeBackend>> {
    let preference = settings.gpu.backend;
    if preference == BackendPreference::Cpu {
        info!("Using host kernels (backend = cpu).");
        return Ok(Box::new(HostBackend::new()));
    }

    let options: GpuContextOptions = (&settings.gpu).into();
    match GpuContext::init_with_fallback(&options) {
        GpuAvailability::Available(context) => {
            let info = context.adapter_info();
            info!(
                "GPU ready: {} via {:?} (driver: {}).",
                info.name, info.backend, info.driver
            );
            let backend =
                WgpuBackend::new(context).context("failed to compile compute kernels")?;
            Ok(Box::new(backend))
        }
        GpuAvailability::Disabled { reason } => {
            if preference == BackendPreference::Gpu {
                bail!("GPU backend requested but {reason}");
            }
            info!("GPU disabled: {reason}");
            Ok(Box::new(HostBackend::new()))
        }
        GpuAvailability::Unavailable { error } => {
            if preference == BackendPreference::Gpu {
                bail!("GPU backend requested but no device could be initialised: {error}");
            }
            warn!("GPU fallback to host kernels: {error}");
            Ok(Box::new(HostBackend::new()))
        }
    }
}

/// Print every adapter the configured wgpu backends expose.
pub fn print_devices(settings: &AppSettings) {
    let mut options: GpuContextOptions = (&settings.gpu).into();
    options.enabled = true;
    let adapters = list_adapters(&options);
    if adapters.is_empty() {
        println!("No GPU adapters found.");
        return;
    }
    for (index, adapter) in adapters.iter().enumerate() {
        println!(
            "[{index}] {} ({:?}, {}) vendor={:#06x} device={:#06x} driver={} {}",
            adapter.name,
            adapter.device_type,
            adapter.backend,
            adapter.vendor,
            adapter.device,
            adapter.driver,
            adapter.driver_info
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_preference_selects_host_kernels() {
        let mut settings = AppSettings::default();
        settings.gpu.backend = BackendPreference::Cpu;
        let backend = select_backend(&settings).unwrap();
        assert_eq!(backend.name(), "host");
    }

    #[test]
    fn disabled_gpu_falls_back_under_auto() {
        let mut settings = AppSettings::default();
        settings.gpu.enabled = false;
        let backend = select_backend(&settings).unwrap();
        assert_eq!(backend.name(), "host");
    }

    #[test]
    fn disabled_gpu_is_fatal_when_required() {
        let mut settings = AppSettings::default();
        settings.gpu.enabled = false;
        settings.gpu.backend = BackendPreference::Gpu;
        assert!(select_backend(&settings).is_err());
    }
}
