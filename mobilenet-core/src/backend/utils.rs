use bytemuck::cast_slice;

/// Uniform blocks are bound in 16-byte units.
const UNIFORM_ALIGNMENT_WORDS: usize = 4;

/// Upload scalar arguments as a zero-padded uniform block of `u32` words.
pub(super) fn create_uniform_buffer(
    device: &wgpu::Device,
    label: &str,
    words: &[u32],
) -> wgpu::Buffer {
    use wgpu::util::DeviceExt;

    let mut padded = words.to_vec();
    let target = padded
        .len()
        .max(1)
        .next_multiple_of(UNIFORM_ALIGNMENT_WORDS);
    padded.resize(target, 0);

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: cast_slice(&padded),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub(super) fn buffer_entry(
    binding: u32,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(super) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(binding, wgpu::BufferBindingType::Uniform)
}

pub(super) fn div_ceil_uniform(value: u32, divisor: u32) -> u32 {
    if value == 0 {
        0
    } else {
        value.div_ceil(divisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_ceil_rounds_partial_groups_up() {
        assert_eq!(div_ceil_uniform(0, 64), 0);
        assert_eq!(div_ceil_uniform(1, 64), 1);
        assert_eq!(div_ceil_uniform(64, 64), 1);
        assert_eq!(div_ceil_uniform(65, 64), 2);
        assert_eq!(div_ceil_uniform(7, 4), 2);
    }
}
