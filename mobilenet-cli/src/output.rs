//! Result and debug-dump writers.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use mobilenet_core::{Error, ForwardObserver, Layer, Result, Tensor};

/// Write one line per image holding its class probabilities separated by spaces.
pub fn write_results(path: &Path, results: &[Vec<f32>]) -> Result<()> {
    let mut text = String::new();
    for probabilities in results {
        text.push_str(&format_row(probabilities));
        text.push('\n');
    }
    fs::write(path, text).map_err(|source| io_error(path, source))
}

fn format_row(values: &[f32]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Writes every layer output to `<dir>/debug_<n>` (1-based) during a forward pass.
///
/// Each file holds one line per x column with `height * channels` values in
/// fixed 6-decimal notation. Files are overwritten by the next image.
#[derive(Debug, Clone)]
pub struct LayerDumper {
    dir: PathBuf,
}

impl LayerDumper {
    /// Create the dump directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ForwardObserver for LayerDumper {
    fn layer_completed(&mut self, index: usize, layer: &Layer<'_>, output: &Tensor) -> Result<()> {
        let path = self.dir.join(format!("debug_{}", index + 1));
        let shape = output.shape();
        let column = shape.height() * shape.channels();
        let mut text = String::with_capacity(output.data().len() * 10);
        for values in output.data().chunks(column) {
            for value in values {
                // Writing into a String cannot fail.
                let _ = write!(text, "{value:.6} ");
            }
            text.push('\n');
        }
        fs::write(&path, text).map_err(|source| io_error(&path, source))?;
        debug!("dumped {} output ({shape}) to {}", layer.kind(), path.display());
        Ok(())
    }
}
