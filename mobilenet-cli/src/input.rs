//! Image corpus parsing.
//!
//! The corpus is whitespace-separated text: an image count, then for each
//! image its height, width and channel count followed by every sample in
//! tensor order (`(x * height + y) * channels + c`).

use std::{fs, path::Path};

use mobilenet_core::{Error, INPUT_CHANNELS, Result, Tensor, TensorShape};

const MAX_PREALLOCATION: usize = 1 << 20;

/// Read and parse the corpus at `path`.
pub fn read_images(path: &Path) -> Result<Vec<Tensor>> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_images(&text)
}

/// Parse a corpus held in memory.
pub fn parse_images(text: &str) -> Result<Vec<Tensor>> {
    let mut tokens = Tokens::new(text);
    let count = tokens.next_dimension("image count")?;
    let mut images = Vec::with_capacity(count.min(MAX_PREALLOCATION));
    for image in 0..count {
        let height = tokens.next_dimension("height")?;
        let width = tokens.next_dimension("width")?;
        let channels = tokens.next_dimension("channels")?;
        if channels != INPUT_CHANNELS {
            return Err(Error::InputFormat(format!(
                "image {}: expected {INPUT_CHANNELS} channels, got {channels}",
                image + 1
            )));
        }
        let shape = TensorShape::new(width, height, channels)
            .map_err(|err| Error::InputFormat(format!("image {}: {err}", image + 1)))?;
        // Header sizes are untrusted; grow past this only as samples arrive.
        let mut data = Vec::with_capacity(shape.elements().min(MAX_PREALLOCATION));
        for _ in 0..shape.elements() {
            data.push(tokens.next_sample(image + 1)?);
        }
        images.push(Tensor::new(shape, data)?);
    }
    if let Some(extra) = tokens.peek() {
        log::warn!("ignoring trailing data after {count} images (starting with '{extra}')");
    }
    Ok(images)
}

struct Tokens<'a> {
    inner: std::iter::Peekable<std::str::SplitWhitespace<'a>>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_whitespace().peekable(),
        }
    }

    fn peek(&mut self) -> Option<&&'a str> {
        self.inner.peek()
    }

    fn next_token(&mut self, what: &str) -> Result<&'a str> {
        self.inner
            .next()
            .ok_or_else(|| Error::InputFormat(format!("unexpected end of input reading {what}")))
    }

    fn next_dimension(&mut self, what: &str) -> Result<usize> {
        let token = self.next_token(what)?;
        token
            .parse::<usize>()
            .map_err(|_| Error::InputFormat(format!("invalid {what} '{token}'")))
    }

    fn next_sample(&mut self, image: usize) -> Result<f32> {
        let token = self.next_token("pixel data")?;
        match token.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(Error::InputFormat(format!(
                "image {image}: invalid sample '{token}'"
            ))),
        }
    }
}
