use crate::error::{Error, Result};

use std::fmt;

/// Width, height and channel count of a [`Tensor`]. All three are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorShape {
    width: usize,
    height: usize,
    channels: usize,
}

impl TensorShape {
    /// Create a validated shape.
    pub fn new(width: usize, height: usize, channels: usize) -> Result<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(Error::InvariantViolation(format!(
                "tensor dimensions must be positive (got {width}x{height}x{channels})"
            )));
        }
        width
            .checked_mul(height)
            .and_then(|plane| plane.checked_mul(channels))
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "tensor shape {width}x{height}x{channels} overflows usize"
                ))
            })?;
        Ok(Self {
            width,
            height,
            channels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total number of elements described by this shape.
    pub fn elements(&self) -> usize {
        self.width * self.height * self.channels
    }

    /// Flat offset of `(x, y, c)`: `(x * height + y) * channels + c`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, c: usize) -> usize {
        debug_assert!(x < self.width && y < self.height && c < self.channels);
        (x * self.height + y) * self.channels + c
    }

    /// Same spatial extent with a different channel count.
    pub fn with_channels(&self, channels: usize) -> Result<Self> {
        Self::new(self.width, self.height, channels)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Host-resident `f32` tensor threaded between layers.
///
/// The data length always equals `shape.elements()`; every constructor checks it.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: Vec<f32>,
}

impl Tensor {
    /// Wrap `data` with `shape`, rejecting a length mismatch.
    pub fn new(shape: TensorShape, data: Vec<f32>) -> Result<Self> {
        let tensor = Self { shape, data };
        tensor.check_invariant()?;
        Ok(tensor)
    }

    /// Zero-filled tensor of the given shape.
    pub fn zeros(shape: TensorShape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.elements()],
        }
    }

    /// Build a tensor by evaluating `f(x, y, c)` at every position.
    pub fn from_fn(shape: TensorShape, mut f: impl FnMut(usize, usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(shape.elements());
        for x in 0..shape.width() {
            for y in 0..shape.height() {
                for c in 0..shape.channels() {
                    data.push(f(x, y, c));
                }
            }
        }
        Self { shape, data }
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at `(x, y, c)`.
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[self.shape.index(x, y, c)]
    }

    /// Re-check the length invariant.
    pub fn check_invariant(&self) -> Result<()> {
        if self.data.len() != self.shape.elements() {
            return Err(Error::InvariantViolation(format!(
                "tensor {} holds {} values, expected {}",
                self.shape,
                self.data.len(),
                self.shape.elements()
            )));
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (TensorShape, Vec<f32>) {
        (self.shape, self.data)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("elements", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_follows_width_major_layout() {
        let shape = TensorShape::new(2, 3, 4).unwrap();
        assert_eq!(shape.index(0, 0, 0), 0);
        assert_eq!(shape.index(0, 0, 3), 3);
        assert_eq!(shape.index(0, 1, 0), 4);
        assert_eq!(shape.index(1, 0, 0), 12);
        assert_eq!(shape.index(1, 2, 3), shape.elements() - 1);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            TensorShape::new(0, 3, 3),
            Err(Error::InvariantViolation(_))
        ));
        assert!(TensorShape::new(3, 3, 0).is_err());
    }

    #[test]
    fn length_mismatch_is_an_invariant_violation() {
        let shape = TensorShape::new(2, 2, 1).unwrap();
        let err = Tensor::new(shape, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)), "{err}");
        assert!(Tensor::new(shape, vec![1.0; 4]).is_ok());
    }

    #[test]
    fn from_fn_matches_get() {
        let shape = TensorShape::new(3, 2, 2).unwrap();
        let tensor = Tensor::from_fn(shape, |x, y, c| (x * 100 + y * 10 + c) as f32);
        assert_eq!(tensor.get(2, 1, 1), 211.0);
        assert_eq!(tensor.get(1, 0, 0), 100.0);
        assert_eq!(tensor.data().len(), shape.elements());
    }
}
