use wgpu::util::DeviceExt;

pub struct SizedBuffer {
    pub buffer: wgpu::Buffer,
    pub size: wgpu::BufferAddress,
}

/// Storage buffer that compute passes write and copies read from.
pub fn make_storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::BufferAddress,
    extra_usage: wgpu::BufferUsages,
) -> SizedBuffer {
    SizedBuffer {
        buffer: device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
                | extra_usage,
            mapped_at_creation: false,
        }),
        size,
    }
}

pub fn make_default_uniform_buffer<T: std::default::Default + bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
) -> SizedBuffer {
    let uniforms = T::default();
    make_uniform_buffer::<T>(device, label, &uniforms)
}

pub fn make_uniform_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    data: &T,
) -> SizedBuffer {
    let bytes = bytemuck::bytes_of(data);
    SizedBuffer {
        buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        }),
        size: bytes.len() as _,
    }
}

/// Host-visible buffer that receives copies for readback.
pub fn make_readback_buffer(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::BufferAddress,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Maps the first `size` bytes of a readback buffer, blocking until every
/// submitted write to it has landed.
pub fn map_read(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    size: wgpu::BufferAddress,
) -> Result<Vec<u8>, wgpu::BufferAsyncError> {
    let slice = buffer.slice(..size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;
    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

/// Copies a range of `source` into a fresh readback buffer and maps it. Meant
/// for inspection and tests, the frame loop uses a persistent readback buffer.
pub fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    offset: wgpu::BufferAddress,
    size: wgpu::BufferAddress,
) -> Result<Vec<u8>, wgpu::BufferAsyncError> {
    if size == 0 {
        return Ok(Vec::new());
    }
    let staging = make_readback_buffer(device, "Readback buffer", size);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback encoder"),
    });
    encoder.copy_buffer_to_buffer(source, offset, &staging, 0, size);
    queue.submit(Some(encoder.finish()));
    let data = map_read(device, &staging, size);
    staging.destroy();
    data
}

pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: wgpu::BufferAddress,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

/// Binds `size` bytes of `buffer` starting at `offset`.
pub fn buffer_range(
    buffer: &wgpu::Buffer,
    offset: wgpu::BufferAddress,
    size: wgpu::BufferAddress,
) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer,
        offset,
        size: wgpu::BufferSize::new(size),
    })
}
