//! Command-line argument definitions for the classifier.

use clap::{ArgAction, Parser};
use mobilenet_utils::BackendPreference;
use std::path::PathBuf;

/// Classify every image in a text corpus with the MobileNet forward pass.
#[derive(Debug, Parser)]
#[command(author, version = mobilenet_core::version(), about)]
pub struct ClassifyArgs {
    /// Image corpus: a count, then per image height, width, channels and samples.
    #[arg(required_unless_present = "list_devices")]
    pub source_file: Option<PathBuf>,

    /// File receiving one line of class probabilities per image.
    #[arg(required_unless_present = "list_devices")]
    pub output_file: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/settings.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Trained parameter store (overrides the settings file).
    #[arg(long, value_name = "PATH")]
    pub weights: Option<PathBuf>,

    /// Kernel backend: auto, gpu or cpu.
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<BackendPreference>,

    /// Disable GPU acceleration entirely, even if supported.
    #[arg(long = "no-gpu", action = ArgAction::SetTrue, conflicts_with = "backend")]
    pub no_gpu: bool,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (off, error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Write every intermediate layer output as `debug_<n>` into this directory.
    #[arg(long, value_name = "DIR")]
    pub dump_layers: Option<PathBuf>,

    /// Print the available GPU adapters and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub list_devices: bool,
}
