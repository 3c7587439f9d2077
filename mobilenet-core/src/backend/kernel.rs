//! Named kernels and their positional argument contracts.
//!
//! Every backend executes the same closed set of kernels. A kernel is invoked
//! with an ordered argument list whose kinds must match [`Kernel::signature`]
//! exactly; buffers are bound in order, scalars in order after them.

use crate::error::BackendError;

use std::{fmt, slice::IterMut};

/// Kind of a positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Read-only buffer.
    Input,
    /// Write-only buffer; its device copy starts zeroed.
    Output,
    /// Buffer read and written in place.
    InOut,
    U32,
    F32,
}

impl ArgKind {
    pub fn is_buffer(self) -> bool {
        matches!(self, ArgKind::Input | ArgKind::Output | ArgKind::InOut)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, ArgKind::Output | ArgKind::InOut)
    }

    fn label(self) -> &'static str {
        match self {
            ArgKind::Input => "input buffer",
            ArgKind::Output => "output buffer",
            ArgKind::InOut => "in/out buffer",
            ArgKind::U32 => "u32 scalar",
            ArgKind::F32 => "f32 scalar",
        }
    }
}

/// One bound argument. Buffers borrow host memory for the duration of the dispatch.
#[derive(Debug)]
pub enum KernelArg<'a> {
    Input(&'a [f32]),
    Output(&'a mut [f32]),
    InOut(&'a mut [f32]),
    U32(u32),
    F32(f32),
}

impl KernelArg<'_> {
    pub fn kind(&self) -> ArgKind {
        match self {
            KernelArg::Input(_) => ArgKind::Input,
            KernelArg::Output(_) => ArgKind::Output,
            KernelArg::InOut(_) => ArgKind::InOut,
            KernelArg::U32(_) => ArgKind::U32,
            KernelArg::F32(_) => ArgKind::F32,
        }
    }

    /// Host slice backing a buffer argument.
    pub fn as_slice(&self) -> Option<&[f32]> {
        match self {
            KernelArg::Input(data) => Some(data),
            KernelArg::Output(data) | KernelArg::InOut(data) => Some(data),
            KernelArg::U32(_) | KernelArg::F32(_) => None,
        }
    }

    /// Mutable host slice for writable buffers.
    pub fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        match self {
            KernelArg::Output(data) | KernelArg::InOut(data) => Some(data),
            _ => None,
        }
    }

    /// Raw 32-bit word of a scalar argument.
    pub fn scalar_bits(&self) -> Option<u32> {
        match self {
            KernelArg::U32(value) => Some(*value),
            KernelArg::F32(value) => Some(value.to_bits()),
            _ => None,
        }
    }
}

/// Up to three-dimensional global index space of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpace {
    dims: [usize; 3],
}

impl IndexSpace {
    pub const fn linear(len: usize) -> Self {
        Self { dims: [len, 1, 1] }
    }

    pub const fn volume(x: usize, y: usize, z: usize) -> Self {
        Self { dims: [x, y, z] }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Total number of work items.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }
}

use ArgKind::{F32, InOut, Input, Output, U32};

/// The closed set of kernels the layers dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `(in, out, width, height, channels, pad_start_0, pad_end_0, pad_start_1, pad_end_1)`
    /// over the input `(width, height, channels)`.
    ZeroPadding2d,
    /// `(in, out, weights, bias, stride, in_channels, in_width, in_height,
    /// out_width, out_height, out_depth)` over `(out_width, out_height, out_depth)`.
    Conv2d9Valid,
    /// Same arguments as [`Kernel::Conv2d9Valid`].
    Conv2d1Same,
    /// `(in, out, weights, bias, stride, channels, in_width, in_height, out_width,
    /// out_height)` over `(out_width, out_height, channels)`.
    DepthwiseConv2d9Valid,
    /// Same arguments as [`Kernel::DepthwiseConv2d9Valid`].
    DepthwiseConv2d9Same,
    /// `(data)` in place over `len`.
    Relu,
    /// `(in, out, channels)` over `channels`.
    SumByChannels,
    /// `(data, divisor)` in place over `len`.
    ApplyReduction,
    /// `(in, weights, out, in_channels)` over `out_size`.
    MatrixMultiplication,
    /// `(in, weights, bias, out, in_channels)` over `out_size`.
    MatrixMultiplicationBias,
    /// `(values, max_out[1])` over `len`.
    MaxValue,
    /// `(values, max, total_out[1])` over `len`; exponentiates in place.
    Softmax,
    /// `(pixels)` in place over `len`.
    PreprocessImage,
}

const CONV_SIGNATURE: &[ArgKind] = &[Input, Output, Input, Input, U32, U32, U32, U32, U32, U32, U32];
const DEPTHWISE_SIGNATURE: &[ArgKind] = &[Input, Output, Input, Input, U32, U32, U32, U32, U32, U32];

impl Kernel {
    pub const ALL: [Kernel; 13] = [
        Kernel::ZeroPadding2d,
        Kernel::Conv2d9Valid,
        Kernel::Conv2d1Same,
        Kernel::DepthwiseConv2d9Valid,
        Kernel::DepthwiseConv2d9Same,
        Kernel::Relu,
        Kernel::SumByChannels,
        Kernel::ApplyReduction,
        Kernel::MatrixMultiplication,
        Kernel::MatrixMultiplicationBias,
        Kernel::MaxValue,
        Kernel::Softmax,
        Kernel::PreprocessImage,
    ];

    /// Registry name of the kernel.
    pub const fn name(self) -> &'static str {
        match self {
            Kernel::ZeroPadding2d => "zeropadding2d",
            Kernel::Conv2d9Valid => "conv2d_kernel_9_valid",
            Kernel::Conv2d1Same => "conv2d_kernel_1_same",
            Kernel::DepthwiseConv2d9Valid => "depthwise_conv2d_kernel_9_valid",
            Kernel::DepthwiseConv2d9Same => "depthwise_conv2d_kernel_9_same",
            Kernel::Relu => "relu",
            Kernel::SumByChannels => "sum_by_channels",
            Kernel::ApplyReduction => "apply_reduction",
            Kernel::MatrixMultiplication => "matrix_multiplication",
            Kernel::MatrixMultiplicationBias => "matrix_multiplication_bias",
            Kernel::MaxValue => "max_value",
            Kernel::Softmax => "softmax",
            Kernel::PreprocessImage => "preprocess_image",
        }
    }

    /// Look a kernel up by its registry name.
    pub fn from_name(name: &str) -> Result<Self, BackendError> {
        Self::ALL
            .into_iter()
            .find(|kernel| kernel.name() == name)
            .ok_or_else(|| BackendError::UnknownKernel(name.to_string()))
    }

    /// Ordered argument kinds the kernel expects.
    pub fn signature(self) -> &'static [ArgKind] {
        match self {
            Kernel::ZeroPadding2d => &[Input, Output, U32, U32, U32, U32, U32, U32, U32],
            Kernel::Conv2d9Valid | Kernel::Conv2d1Same => CONV_SIGNATURE,
            Kernel::DepthwiseConv2d9Valid | Kernel::DepthwiseConv2d9Same => DEPTHWISE_SIGNATURE,
            Kernel::Relu | Kernel::PreprocessImage => &[InOut],
            Kernel::SumByChannels => &[Input, Output, U32],
            Kernel::ApplyReduction => &[InOut, F32],
            Kernel::MatrixMultiplication => &[Input, Input, Output, U32],
            Kernel::MatrixMultiplicationBias => &[Input, Input, Input, Output, U32],
            Kernel::MaxValue => &[Input, Output],
            Kernel::Softmax => &[InOut, F32, Output],
        }
    }

    /// Reductions run as a single cooperating group rather than one item per element.
    pub fn is_reduction(self) -> bool {
        matches!(self, Kernel::MaxValue | Kernel::Softmax)
    }

    /// Check `args` against the signature.
    pub fn check_args(self, args: &[KernelArg<'_>]) -> Result<(), BackendError> {
        let signature = self.signature();
        if args.len() != signature.len() {
            return Err(BackendError::ArgumentCount {
                kernel: self.name(),
                expected: signature.len(),
                found: args.len(),
            });
        }
        for (position, (arg, expected)) in args.iter().zip(signature).enumerate() {
            let found = arg.kind();
            if found != *expected {
                return Err(BackendError::ArgumentMismatch {
                    kernel: self.name(),
                    position,
                    expected: expected.label(),
                    found: found.label(),
                });
            }
            if found.is_buffer() && arg.as_slice().is_some_and(<[f32]>::is_empty) {
                return Err(BackendError::ArgumentMismatch {
                    kernel: self.name(),
                    position,
                    expected: "non-empty buffer",
                    found: "empty buffer",
                });
            }
        }
        Ok(())
    }

    /// Full pre-dispatch check: signature, then buffer lengths against the
    /// scalar geometry and the index space. Backends run this before touching
    /// any memory so a bad dispatch can never read or write out of bounds.
    pub fn validate(self, args: &[KernelArg<'_>], space: IndexSpace) -> Result<(), BackendError> {
        self.check_args(args)?;
        if space.is_empty() {
            return Err(self.space_error(space, "index space is empty".to_string()));
        }
        let len = |i: usize| args[i].as_slice().map_or(0, <[f32]>::len);
        let scalar = |i: usize| args[i].scalar_bits().unwrap_or(0) as usize;
        let expect = |what: &str, found: usize, expected: usize| {
            if found == expected {
                Ok(())
            } else {
                Err(self.space_error(
                    space,
                    format!("{what} holds {found} values, expected {expected}"),
                ))
            }
        };

        match self {
            Kernel::ZeroPadding2d => {
                let (width, height, channels) = (scalar(2), scalar(3), scalar(4));
                let out_width = self.sum(space, &[width, scalar(5), scalar(6)])?;
                let out_height = self.sum(space, &[height, scalar(7), scalar(8)])?;
                expect("input", len(0), self.product(space, &[width, height, channels])?)?;
                expect(
                    "output",
                    len(1),
                    self.product(space, &[out_width, out_height, channels])?,
                )?;
                self.expect_space(space, [width, height, channels])
            }
            Kernel::Conv2d9Valid | Kernel::Conv2d1Same => {
                let taps = if self == Kernel::Conv2d9Valid { 9 } else { 1 };
                let in_channels = scalar(5);
                let (in_width, in_height) = (scalar(6), scalar(7));
                let (out_width, out_height, depth) = (scalar(8), scalar(9), scalar(10));
                if scalar(4) == 0 {
                    return Err(self.space_error(space, "stride must be positive".to_string()));
                }
                expect(
                    "input",
                    len(0),
                    self.product(space, &[in_width, in_height, in_channels])?,
                )?;
                expect(
                    "output",
                    len(1),
                    self.product(space, &[out_width, out_height, depth])?,
                )?;
                expect("weights", len(2), self.product(space, &[taps, in_channels, depth])?)?;
                expect("bias", len(3), depth)?;
                self.expect_space(space, [out_width, out_height, depth])
            }
            Kernel::DepthwiseConv2d9Valid | Kernel::DepthwiseConv2d9Same => {
                let channels = scalar(5);
                let (in_width, in_height) = (scalar(6), scalar(7));
                let (out_width, out_height) = (scalar(8), scalar(9));
                if scalar(4) == 0 {
                    return Err(self.space_error(space, "stride must be positive".to_string()));
                }
                expect(
                    "input",
                    len(0),
                    self.product(space, &[in_width, in_height, channels])?,
                )?;
                expect(
                    "output",
                    len(1),
                    self.product(space, &[out_width, out_height, channels])?,
                )?;
                expect("weights", len(2), self.product(space, &[9, channels])?)?;
                expect("bias", len(3), channels)?;
                self.expect_space(space, [out_width, out_height, channels])
            }
            Kernel::Relu | Kernel::PreprocessImage | Kernel::ApplyReduction => {
                self.expect_space(space, [len(0), 1, 1])
            }
            Kernel::SumByChannels => {
                let channels = scalar(2);
                if channels == 0 || len(0) % channels != 0 {
                    return Err(self.space_error(
                        space,
                        format!("{} inputs do not split into {channels} channels", len(0)),
                    ));
                }
                expect("output", len(1), channels)?;
                self.expect_space(space, [channels, 1, 1])
            }
            Kernel::MatrixMultiplication | Kernel::MatrixMultiplicationBias => {
                let with_bias = self == Kernel::MatrixMultiplicationBias;
                let out_index = if with_bias { 3 } else { 2 };
                let in_channels = scalar(out_index + 1);
                let outputs = len(out_index);
                expect("input", len(0), in_channels)?;
                expect("weights", len(1), self.product(space, &[outputs, in_channels])?)?;
                if with_bias {
                    expect("bias", len(2), outputs)?;
                }
                self.expect_space(space, [outputs, 1, 1])
            }
            Kernel::MaxValue => {
                expect("result", len(1), 1)?;
                self.expect_space(space, [len(0), 1, 1])
            }
            Kernel::Softmax => {
                expect("total", len(2), 1)?;
                self.expect_space(space, [len(0), 1, 1])
            }
        }
    }

    fn product(self, space: IndexSpace, factors: &[usize]) -> Result<usize, BackendError> {
        factors
            .iter()
            .try_fold(1usize, |acc, &factor| acc.checked_mul(factor))
            .ok_or_else(|| self.space_error(space, format!("extent {factors:?} overflows")))
    }

    fn sum(self, space: IndexSpace, terms: &[usize]) -> Result<usize, BackendError> {
        terms
            .iter()
            .try_fold(0usize, |acc, &term| acc.checked_add(term))
            .ok_or_else(|| self.space_error(space, format!("extent {terms:?} overflows")))
    }

    fn expect_space(self, space: IndexSpace, expected: [usize; 3]) -> Result<(), BackendError> {
        if space.dims() == expected {
            Ok(())
        } else {
            Err(self.space_error(space, format!("expected {expected:?}")))
        }
    }

    fn space_error(self, space: IndexSpace, detail: String) -> BackendError {
        BackendError::IndexSpace {
            kernel: self.name(),
            space: space.dims(),
            detail,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Walks an argument list in order, handing out typed views.
///
/// Assumes [`Kernel::check_args`] already passed; a mismatch is still reported
/// instead of panicking.
pub(crate) struct ArgCursor<'b, 'a> {
    kernel: Kernel,
    position: usize,
    args: IterMut<'b, KernelArg<'a>>,
}

impl<'b, 'a> ArgCursor<'b, 'a> {
    pub(crate) fn new(kernel: Kernel, args: &'b mut [KernelArg<'a>]) -> Self {
        Self {
            kernel,
            position: 0,
            args: args.iter_mut(),
        }
    }

    fn next(&mut self, expected: ArgKind) -> Result<&'b mut KernelArg<'a>, BackendError> {
        let position = self.position;
        self.position += 1;
        let arg = self.args.next().ok_or(BackendError::ArgumentCount {
            kernel: self.kernel.name(),
            expected: position + 1,
            found: position,
        })?;
        if arg.kind() != expected {
            return Err(BackendError::ArgumentMismatch {
                kernel: self.kernel.name(),
                position,
                expected: expected.label(),
                found: arg.kind().label(),
            });
        }
        Ok(arg)
    }

    pub(crate) fn input(&mut self) -> Result<&'b [f32], BackendError> {
        match self.next(ArgKind::Input)? {
            KernelArg::Input(data) => Ok(*data),
            _ => unreachable!("kind checked by next"),
        }
    }

    pub(crate) fn output(&mut self) -> Result<&'b mut [f32], BackendError> {
        match self.next(ArgKind::Output)? {
            KernelArg::Output(data) => Ok(&mut **data),
            _ => unreachable!("kind checked by next"),
        }
    }

    pub(crate) fn in_out(&mut self) -> Result<&'b mut [f32], BackendError> {
        match self.next(ArgKind::InOut)? {
            KernelArg::InOut(data) => Ok(&mut **data),
            _ => unreachable!("kind checked by next"),
        }
    }

    pub(crate) fn u32(&mut self) -> Result<usize, BackendError> {
        match self.next(ArgKind::U32)? {
            KernelArg::U32(value) => Ok(*value as usize),
            _ => unreachable!("kind checked by next"),
        }
    }

    pub(crate) fn f32(&mut self) -> Result<f32, BackendError> {
        match self.next(ArgKind::F32)? {
            KernelArg::F32(value) => Ok(*value),
            _ => unreachable!("kind checked by next"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_registry() {
        for kernel in Kernel::ALL {
            assert_eq!(Kernel::from_name(kernel.name()).unwrap(), kernel);
        }
        assert!(matches!(
            Kernel::from_name("conv2d_kernel_25_same"),
            Err(BackendError::UnknownKernel(_))
        ));
    }

    #[test]
    fn argument_order_is_enforced() {
        let input = [1.0f32; 4];
        let mut output = [0.0f32; 1];
        let args = [KernelArg::Output(&mut output), KernelArg::Input(&input)];
        let err = Kernel::MaxValue.check_args(&args).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ArgumentMismatch { position: 0, .. }
        ));
    }

    #[test]
    fn argument_count_is_enforced() {
        let mut data = [1.0f32; 4];
        let args = [KernelArg::InOut(&mut data)];
        let err = Kernel::ApplyReduction.check_args(&args).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ArgumentCount {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn empty_buffers_are_rejected() {
        let mut data: [f32; 0] = [];
        let args = [KernelArg::InOut(&mut data)];
        assert!(Kernel::Relu.check_args(&args).is_err());
    }

    #[test]
    fn oversized_geometry_is_an_index_space_error() {
        let input = [1.0f32];
        let mut output = [0.0f32];
        let args = [
            KernelArg::Input(&input),
            KernelArg::Output(&mut output),
            KernelArg::U32(u32::MAX),
            KernelArg::U32(u32::MAX),
            KernelArg::U32(u32::MAX),
            KernelArg::U32(0),
            KernelArg::U32(0),
            KernelArg::U32(0),
            KernelArg::U32(0),
        ];
        let err = Kernel::ZeroPadding2d
            .validate(&args, IndexSpace::volume(1, 1, 1))
            .unwrap_err();
        assert!(
            matches!(err, BackendError::IndexSpace { ref detail, .. } if detail.contains("overflows")),
            "{err}"
        );
    }

    #[test]
    fn cursor_hands_out_typed_views() {
        let input = [2.0f32, 3.0];
        let mut output = [0.0f32; 2];
        let mut args = [
            KernelArg::Input(&input),
            KernelArg::Output(&mut output),
            KernelArg::U32(7),
        ];
        let mut cursor = ArgCursor::new(Kernel::SumByChannels, &mut args);
        let src = cursor.input().unwrap();
        let dst = cursor.output().unwrap();
        dst.copy_from_slice(src);
        assert_eq!(cursor.u32().unwrap(), 7);
        assert_eq!(output, [2.0, 3.0]);
    }
}
