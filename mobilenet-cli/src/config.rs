//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use mobilenet_utils::{
    BackendPreference,
    config::{AppSettings, default_settings_path},
    normalize_path,
};

use crate::args::ClassifyArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &ClassifyArgs) {
    if let Some(backend) = args.backend {
        settings.gpu.backend = backend;
        if backend == BackendPreference::Gpu {
            settings.gpu.enabled = true;
        }
    }
    if args.no_gpu {
        settings.gpu.enabled = false;
        settings.gpu.backend = BackendPreference::Cpu;
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(weights) = args.weights.as_ref() {
        settings.model.weights = weights.clone();
    }
    if let Some(dir) = args.dump_layers.as_ref() {
        settings.debug.dump_layers = Some(dir.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> ClassifyArgs {
        let mut argv = vec!["mobilenet", "in.txt", "out.txt"];
        argv.extend_from_slice(extra);
        ClassifyArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn no_gpu_forces_host_backend() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&["--no-gpu"]));
        assert!(!settings.gpu.enabled);
        assert_eq!(settings.gpu.backend, BackendPreference::Cpu);
    }

    #[test]
    fn telemetry_off_disables_reporting() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&["--telemetry-level", " OFF "]));
        assert!(!settings.telemetry.enabled);
        assert_eq!(settings.telemetry.level, "off");
    }

    #[test]
    fn paths_override_the_settings_file() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(
            &mut settings,
            &parse(&["--weights", "w.json", "--dump-layers", "dumps"]),
        );
        assert_eq!(settings.model.weights, PathBuf::from("w.json"));
        assert_eq!(settings.debug.dump_layers, Some(PathBuf::from("dumps")));
    }

    #[test]
    fn unset_flags_leave_settings_alone() {
        let mut settings = AppSettings::default();
        settings.gpu.backend = BackendPreference::Gpu;
        apply_cli_overrides(&mut settings, &parse(&[]));
        assert_eq!(settings, {
            let mut expected = AppSettings::default();
            expected.gpu.backend = BackendPreference::Gpu;
            expected
        });
    }
}
