use thiserror::Error;

/// Failures while creating GPU resources. None of these are recoverable; the
/// binary logs them and exits.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to open device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("device limit {limit} is {available}, need {required}")]
    UnsupportedLimit {
        limit: &'static str,
        available: u64,
        required: u64,
    },
    #[error("{label} needs {size} bytes, device allows {max}")]
    BufferTooLarge {
        label: &'static str,
        size: u64,
        max: u64,
    },
    #[error("allocation of {label} failed: {message}")]
    Allocation { label: &'static str, message: String },
    #[error("{label} is not usable: {message}")]
    Pipeline { label: &'static str, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Runs `create` inside an error scope and turns a captured device error into a
/// `SetupError` built by `wrap`.
fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    create: impl FnOnce() -> T,
    wrap: impl FnOnce(String) -> SetupError,
) -> Result<T, SetupError> {
    device.push_error_scope(filter);
    let value = create();
    match futures::executor::block_on(device.pop_error_scope()) {
        Some(err) => Err(wrap(err.to_string())),
        None => Ok(value),
    }
}

/// Allocates buffers (or textures) and reports out-of-memory failures.
pub fn checked_allocation<T>(
    device: &wgpu::Device,
    label: &'static str,
    create: impl FnOnce() -> T,
) -> Result<T, SetupError> {
    scoped(device, wgpu::ErrorFilter::OutOfMemory, create, |message| {
        SetupError::Allocation { label, message }
    })
}

/// Creates shader modules and pipelines and reports compile or link failures.
pub fn checked_pipeline<T>(
    device: &wgpu::Device,
    label: &'static str,
    create: impl FnOnce() -> T,
) -> Result<T, SetupError> {
    scoped(device, wgpu::ErrorFilter::Validation, create, |message| {
        SetupError::Pipeline { label, message }
    })
}

pub fn check_buffer_size(
    device: &wgpu::Device,
    label: &'static str,
    size: u64,
    storage_binding: bool,
) -> Result<(), SetupError> {
    let limits = device.limits();
    let max = if storage_binding {
        (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size)
    } else {
        limits.max_buffer_size
    };
    if size > max {
        return Err(SetupError::BufferTooLarge { label, size, max });
    }
    Ok(())
}

/// Global hook for device errors nobody captured in a scope. Debug builds stop
/// right here, release builds keep running with the error logged.
pub fn install_device_error_hook(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|err| {
        log::error!("GPU device error: {}", err);
        if cfg!(debug_assertions) {
            std::process::abort();
        }
    }));
}
