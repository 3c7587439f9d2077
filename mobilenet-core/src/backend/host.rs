use super::ComputeBackend;
use super::kernel::{ArgCursor, IndexSpace, Kernel, KernelArg};
use crate::error::BackendError;

use log::trace;
use rayon::prelude::*;

/// Runs every kernel on the host with rayon.
///
/// Semantics match the WGSL kernels exactly; it is the fallback when no
/// adapter is available and the reference the GPU path is tested against.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &mut [KernelArg<'_>],
        space: IndexSpace,
    ) -> Result<(), BackendError> {
        kernel.validate(args, space)?;
        trace!(target: "mobilenet::backend", "host dispatch {kernel} over {:?}", space.dims());

        let mut cursor = ArgCursor::new(kernel, args);
        match kernel {
            Kernel::ZeroPadding2d => zero_padding(&mut cursor),
            Kernel::Conv2d9Valid => conv2d(&mut cursor, 3),
            Kernel::Conv2d1Same => conv2d(&mut cursor, 1),
            Kernel::DepthwiseConv2d9Valid | Kernel::DepthwiseConv2d9Same => {
                depthwise(&mut cursor)
            }
            Kernel::Relu => {
                cursor
                    .in_out()?
                    .par_iter_mut()
                    .for_each(|value| *value = value.max(0.0));
                Ok(())
            }
            Kernel::PreprocessImage => {
                cursor
                    .in_out()?
                    .par_iter_mut()
                    .for_each(|value| *value = *value / 127.5 - 1.0);
                Ok(())
            }
            Kernel::SumByChannels => sum_by_channels(&mut cursor),
            Kernel::ApplyReduction => {
                let values = cursor.in_out()?;
                let divisor = cursor.f32()?;
                values.par_iter_mut().for_each(|value| *value /= divisor);
                Ok(())
            }
            Kernel::MatrixMultiplication => matrix_multiplication(&mut cursor, false),
            Kernel::MatrixMultiplicationBias => matrix_multiplication(&mut cursor, true),
            Kernel::MaxValue => {
                let values = cursor.input()?;
                let result = cursor.output()?;
                result[0] = values
                    .par_iter()
                    .copied()
                    .reduce(|| f32::NEG_INFINITY, f32::max);
                Ok(())
            }
            Kernel::Softmax => {
                let values = cursor.in_out()?;
                let max = cursor.f32()?;
                let total = cursor.output()?;
                values
                    .par_iter_mut()
                    .for_each(|value| *value = (*value - max).exp());
                total[0] = values.iter().sum();
                Ok(())
            }
        }
    }
}

fn zero_padding(cursor: &mut ArgCursor<'_, '_>) -> Result<(), BackendError> {
    let input = cursor.input()?;
    let output = cursor.output()?;
    let (width, height, channels) = (cursor.u32()?, cursor.u32()?, cursor.u32()?);
    let (pad_start_0, _pad_end_0) = (cursor.u32()?, cursor.u32()?);
    let (pad_start_1, pad_end_1) = (cursor.u32()?, cursor.u32()?);
    let out_height = height + pad_start_1 + pad_end_1;

    output
        .par_chunks_mut(channels)
        .enumerate()
        .for_each(|(pixel, cell)| {
            let (x, y) = (pixel / out_height, pixel % out_height);
            let inside = (pad_start_0..pad_start_0 + width).contains(&x)
                && (pad_start_1..pad_start_1 + height).contains(&y);
            if inside {
                let start = ((x - pad_start_0) * height + (y - pad_start_1)) * channels;
                cell.copy_from_slice(&input[start..start + channels]);
            } else {
                cell.fill(0.0);
            }
        });
    Ok(())
}

fn conv2d(cursor: &mut ArgCursor<'_, '_>, kernel_size: usize) -> Result<(), BackendError> {
    let input = cursor.input()?;
    let output = cursor.output()?;
    let weights = cursor.input()?;
    let bias = cursor.input()?;
    let stride = cursor.u32()?;
    let in_channels = cursor.u32()?;
    let (in_width, in_height) = (cursor.u32()?, cursor.u32()?);
    let (_out_width, out_height, depth) = (cursor.u32()?, cursor.u32()?, cursor.u32()?);

    output
        .par_chunks_mut(depth)
        .enumerate()
        .for_each(|(pixel, cell)| {
            let (x, y) = (pixel / out_height, pixel % out_height);
            cell.copy_from_slice(bias);
            for i in 0..kernel_size {
                let sx = x * stride + i;
                if sx >= in_width {
                    continue;
                }
                for j in 0..kernel_size {
                    let sy = y * stride + j;
                    if sy >= in_height {
                        continue;
                    }
                    let base = (sx * in_height + sy) * in_channels;
                    for c in 0..in_channels {
                        let value = input[base + c];
                        let row = ((i * kernel_size + j) * in_channels + c) * depth;
                        for (acc, weight) in cell.iter_mut().zip(&weights[row..row + depth]) {
                            *acc += value * weight;
                        }
                    }
                }
            }
        });
    Ok(())
}

/// Both padding modes read `in(x*s + i, y*s + j)`; they differ only in output extent.
fn depthwise(cursor: &mut ArgCursor<'_, '_>) -> Result<(), BackendError> {
    let input = cursor.input()?;
    let output = cursor.output()?;
    let weights = cursor.input()?;
    let bias = cursor.input()?;
    let stride = cursor.u32()?;
    let channels = cursor.u32()?;
    let (in_width, in_height) = (cursor.u32()?, cursor.u32()?);
    let (_out_width, out_height) = (cursor.u32()?, cursor.u32()?);

    output
        .par_chunks_mut(channels)
        .enumerate()
        .for_each(|(pixel, cell)| {
            let (x, y) = (pixel / out_height, pixel % out_height);
            cell.copy_from_slice(bias);
            for i in 0..3 {
                let sx = x * stride + i;
                if sx >= in_width {
                    continue;
                }
                for j in 0..3 {
                    let sy = y * stride + j;
                    if sy >= in_height {
                        continue;
                    }
                    let base = (sx * in_height + sy) * channels;
                    let taps = &weights[(i * 3 + j) * channels..(i * 3 + j + 1) * channels];
                    for ((acc, value), weight) in
                        cell.iter_mut().zip(&input[base..base + channels]).zip(taps)
                    {
                        *acc += value * weight;
                    }
                }
            }
        });
    Ok(())
}

fn sum_by_channels(cursor: &mut ArgCursor<'_, '_>) -> Result<(), BackendError> {
    let input = cursor.input()?;
    let output = cursor.output()?;
    let channels = cursor.u32()?;

    output.par_iter_mut().enumerate().for_each(|(c, total)| {
        *total = input.iter().skip(c).step_by(channels).sum();
    });
    Ok(())
}

fn matrix_multiplication(cursor: &mut ArgCursor<'_, '_>, with_bias: bool) -> Result<(), BackendError> {
    let input = cursor.input()?;
    let weights = cursor.input()?;
    let bias = if with_bias {
        Some(cursor.input()?)
    } else {
        None
    };
    let output = cursor.output()?;
    let in_channels = cursor.u32()?;

    output.par_iter_mut().enumerate().for_each(|(n, value)| {
        let row = &weights[n * in_channels..(n + 1) * in_channels];
        let dot: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
        *value = dot + bias.map_or(0.0, |b| b[n]);
    });
    Ok(())
}
