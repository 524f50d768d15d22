use candle_core::Device;
use candle_core::utils::{cuda_is_available, metal_is_available};

/// Pick the accelerator this build supports, or the CPU when `cpu` is set
/// or no accelerator comes up.
pub fn select_device(cpu: bool) -> Device {
    if cpu {
        return Device::Cpu;
    }
    if cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => tracing::warn!("CUDA not available ({}), falling back to CPU", e),
        }
    } else if metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => tracing::warn!("Metal not available ({}), falling back to CPU", e),
        }
    }
    Device::Cpu
}

pub fn describe(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}
