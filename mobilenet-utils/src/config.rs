//! Settings shared by the classifier front-end.
//!
//! The file format is JSON with every section optional; missing fields fall
//! back to the defaults below so a settings file only needs to name overrides.

use crate::gpu::GpuContextOptions;

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

const SETTINGS_ENV: &str = "MOBILENET_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "config/settings.json";
const DEFAULT_WEIGHTS_PATH: &str = "models/mobilenet_weights.json";

/// Which kernel backend executes the layers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Use the GPU when an adapter is available, host kernels otherwise.
    #[default]
    Auto,
    /// Require a GPU; failing to initialise one is fatal.
    Gpu,
    /// Always run the host kernels.
    Cpu,
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendPreference::Auto => "auto",
            BackendPreference::Gpu => "gpu",
            BackendPreference::Cpu => "cpu",
        })
    }
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "gpu" => Ok(BackendPreference::Gpu),
            "cpu" | "host" => Ok(BackendPreference::Cpu),
            other => Err(format!(
                "invalid backend '{other}'; expected 'auto', 'gpu' or 'cpu'"
            )),
        }
    }
}

/// GPU selection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GpuSettings {
    /// Master switch for GPU usage.
    pub enabled: bool,
    /// Let `WGPU_*` environment variables influence adapter selection.
    pub respect_env: bool,
    pub backend: BackendPreference,
    /// Ask wgpu for its software fallback adapter.
    pub force_fallback_adapter: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_env: true,
            backend: BackendPreference::Auto,
            force_fallback_adapter: false,
        }
    }
}

impl From<&GpuSettings> for GpuContextOptions {
    fn from(settings: &GpuSettings) -> Self {
        Self {
            enabled: settings.enabled && settings.backend != BackendPreference::Cpu,
            respect_env: settings.respect_env,
            force_fallback_adapter: settings.force_fallback_adapter,
            ..GpuContextOptions::default()
        }
    }
}

/// Phase timing output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Parsed level filter; unknown names fall back to `info`.
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(self.level.trim()).unwrap_or(LevelFilter::Info)
    }
}

/// Location of the trained parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelSettings {
    pub weights: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            weights: PathBuf::from(DEFAULT_WEIGHTS_PATH),
        }
    }
}

/// Diagnostics for inspecting intermediate tensors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebugSettings {
    /// Directory receiving one `debug_<n>` file per layer output.
    pub dump_layers: Option<PathBuf>,
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub gpu: GpuSettings,
    pub telemetry: TelemetrySettings,
    pub model: ModelSettings,
    pub debug: DebugSettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse settings JSON in {}", path.display()))
    }

    /// Write settings as pretty-printed JSON, creating parent directories.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Settings file consulted when no `--config` is given (`MOBILENET_SETTINGS` wins).
pub fn default_settings_path() -> PathBuf {
    env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}
