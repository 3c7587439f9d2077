mod args;
mod config;
mod gpu;
mod input;
mod output;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{Level, info};
use mobilenet_core::{ForwardObserver, MobileNet, ParameterStore, preprocess};
use mobilenet_utils::{AppSettings, init_logging, telemetry};

use crate::{
    args::ClassifyArgs,
    config::{apply_cli_overrides, load_settings},
    gpu::{print_devices, select_backend},
    input::read_images,
    output::{LayerDumper, write_results},
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = match ClassifyArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage problems exit with 1; help and version are not failures.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    telemetry::configure(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    if args.list_devices {
        print_devices(&settings);
        return Ok(());
    }

    let (Some(source), Some(destination)) = (args.source_file, args.output_file) else {
        anyhow::bail!("source_file and output_file are required");
    };
    run(&settings, &source, &destination)
}

fn run(
    settings: &AppSettings,
    source: &Path,
    destination: &Path,
) -> Result<()> {
    let images = {
        let _guard = telemetry::timing_guard("Reading images", Level::Info);
        read_images(source)
            .with_context(|| format!("failed to read images from {}", source.display()))?
    };
    info!("Getting {} images", images.len());

    let backend = {
        let _guard = telemetry::timing_guard("Starting backend", Level::Info);
        select_backend(settings)?
    };
    info!("Running kernels on the {} backend", backend.name());

    let store = {
        let _guard = telemetry::timing_guard(
            "Initialization of model and read weights",
            Level::Info,
        );
        let weights = &settings.model.weights;
        ParameterStore::from_path(weights)
            .with_context(|| format!("failed to load weights from {}", weights.display()))?
    };
    let network = MobileNet::new(&store).context("failed to assemble network")?;

    let mut dumper = settings
        .debug
        .dump_layers
        .as_ref()
        .map(|dir| LayerDumper::create(dir.clone()))
        .transpose()?;

    let count = images.len();
    let results = {
        let _guard = telemetry::timing_guard(format!("Handling {count} images"), Level::Info);
        let mut results = Vec::with_capacity(count);
        for (index, image) in images.into_iter().enumerate() {
            let input = preprocess(&*backend, image)?;
            let observer: &mut dyn ForwardObserver = match dumper.as_mut() {
                Some(dumper) => dumper,
                None => &mut (),
            };
            let output = network
                .forward_with(&*backend, input, observer)
                .with_context(|| format!("forward pass failed on image {}", index + 1))?;
            results.push(output.into_data());
        }
        results
    };

    write_results(destination, &results)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    info!("Wrote {} results to {}", results.len(), destination.display());
    Ok(())
}
