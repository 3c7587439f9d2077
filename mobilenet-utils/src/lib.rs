//! Common helpers shared across the MobileNet crates.

/// Application configuration and settings management.
pub mod config;
/// Shared GPU context initialization helpers.
pub mod gpu;
/// Phase timing for optional performance reporting.
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::LevelFilter;

pub use config::{AppSettings, BackendPreference};
pub use gpu::{
    AdapterSummary, GpuAvailability, GpuContext, GpuContextOptions, GpuInitError, list_adapters,
};

/// Initialize `env_logger` with `default_filter` unless `RUST_LOG` says otherwise.
///
/// The `mobilenet::telemetry` target is always let through; whether timings are
/// actually emitted is decided by [`telemetry::configure`].
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module("mobilenet::telemetry", LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
