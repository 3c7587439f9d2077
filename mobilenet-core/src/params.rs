//! Trained weights keyed by 1-based layer number.
//!
//! On disk the store is a JSON object:
//!
//! ```json
//! { "layer_2": { "weights": [0.1, ...], "bias": [0.0, ...] }, ... }
//! ```
//!
//! Layers borrow slices out of the store, so it must outlive the network.

use crate::error::{Error, Result};
use crate::network::{INPUT_CHANNELS, LayerSpec};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const KEY_PREFIX: &str = "layer_";

/// Weights and optional biases of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParameters {
    pub weights: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<f32>>,
}

impl LayerParameters {
    pub fn new(weights: Vec<f32>, bias: Option<Vec<f32>>) -> Self {
        Self { weights, bias }
    }

    /// Bias slice, treating an empty array as absent.
    pub fn bias(&self) -> Option<&[f32]> {
        self.bias.as_deref().filter(|bias| !bias.is_empty())
    }
}

/// Parameter arrays for every layer that has them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterStore {
    layers: BTreeMap<String, LayerParameters>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::from_json_str(&text)?;
        debug!(
            target: "mobilenet::network",
            "loaded parameters for {} layers from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let store: Self = serde_json::from_str(text)
            .map_err(|err| Error::InvalidParameters(format!("malformed parameter file: {err}")))?;
        for key in store.layers.keys() {
            if parse_key(key).is_none() {
                return Err(Error::InvalidParameters(format!(
                    "unexpected entry '{key}', keys look like '{KEY_PREFIX}<n>' with n >= 1"
                )));
            }
        }
        Ok(store)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| Error::InvalidParameters(format!("cannot serialise parameters: {err}")))
    }

    /// Write the store as JSON, creating parent directories as needed.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let io_error = |source| Error::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, self.to_json_string()?).map_err(io_error)
    }

    /// Build a store for `architecture` with every value produced by
    /// `f(layer_number, index)`; biases follow weights in the index sequence.
    pub fn from_fn(architecture: &[LayerSpec], mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut store = Self::new();
        let mut channels = INPUT_CHANNELS;
        for (position, spec) in architecture.iter().enumerate() {
            let layer = position + 1;
            if let Some((weight_len, bias_len)) = spec.parameter_sizes(channels) {
                let weights: Vec<f32> = (0..weight_len).map(|i| f(layer, i)).collect();
                let bias = bias_len.map(|len| (0..len).map(|i| f(layer, weight_len + i)).collect());
                store.insert(layer, LayerParameters::new(weights, bias));
            }
            channels = spec.output_channels(channels);
        }
        store
    }

    /// Store for `architecture` with every weight and bias set to `value`.
    pub fn filled(architecture: &[LayerSpec], value: f32) -> Self {
        Self::from_fn(architecture, |_, _| value)
    }

    pub fn insert(&mut self, layer: usize, params: LayerParameters) -> Option<LayerParameters> {
        self.layers.insert(key(layer), params)
    }

    pub fn get(&self, layer: usize) -> Option<&LayerParameters> {
        self.layers.get(&key(layer))
    }

    /// Parameters for `layer`, or [`Error::InvalidParameters`] naming the missing key.
    pub fn require(&self, layer: usize) -> Result<&LayerParameters> {
        self.get(layer).ok_or_else(|| {
            Error::InvalidParameters(format!("missing parameters for '{}'", key(layer)))
        })
    }

    /// Layer numbers present in the store, ascending.
    pub fn layer_numbers(&self) -> Vec<usize> {
        let mut numbers: Vec<usize> = self.layers.keys().filter_map(|k| parse_key(k)).collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn key(layer: usize) -> String {
    format!("{KEY_PREFIX}{layer}")
}

fn parse_key(key: &str) -> Option<usize> {
    key.strip_prefix(KEY_PREFIX)?
        .parse()
        .ok()
        .filter(|&n: &usize| n >= 1)
}
