//! # Device Detection
//!
//! Selects the compute device (CPU/GPU) the Whisper model is loaded onto.
//! The service loads exactly one model for its lifetime, so detection runs
//! once and the result is cached for the process.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device preference as written in `config.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Pick the best available device (CUDA, then Metal, then CPU)
    #[default]
    Auto,
    Cpu,
    /// CUDA if present, CPU otherwise
    Cuda,
    /// Metal if present, CPU otherwise
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve a device from a config string, falling back to auto-detection on
/// unrecognized input rather than refusing to start.
pub fn device_from_config(device_str: &str) -> Device {
    match device_str.parse::<DevicePreference>() {
        Ok(preference) => select_device(preference),
        Err(_) => {
            warn!("Invalid device preference '{}', using auto", device_str);
            best_device()
        }
    }
}

pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Auto => best_device(),
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or(Device::Cpu),
        DevicePreference::Metal => metal_device().unwrap_or(Device::Cpu),
    }
}

pub fn best_device() -> Device {
    BEST_DEVICE.get_or_init(detect_best_device).clone()
}

fn detect_best_device() -> Device {
    info!("Detecting best available compute device...");

    if let Some(device) = cuda_device() {
        info!("Selected CUDA GPU for inference");
        return device;
    }

    if let Some(device) = metal_device() {
        info!("Selected Metal GPU for inference");
        return device;
    }

    info!("Using CPU for inference (no GPU acceleration available)");
    Device::Cpu
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => {
            debug!("CUDA device 0 available");
            Some(device)
        }
        Err(e) => {
            debug!("CUDA not available: {}", e);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => {
            debug!("Metal device 0 available");
            Some(device)
        }
        Err(e) => {
            debug!("Metal not available: {}", e);
            None
        }
    }
}

/// Human-readable device name for logs and the health report.
pub fn describe(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA GPU",
        Device::Metal(_) => "Metal GPU",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("CUDA".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_preference_always_resolves() {
        let device = select_device(DevicePreference::Cpu);
        assert!(matches!(device, Device::Cpu));
        assert_eq!(describe(&device), "CPU");
    }

    #[test]
    fn test_invalid_config_string_falls_back() {
        // Must resolve to something usable rather than failing startup
        let _device = device_from_config("not-a-device");
    }
}
