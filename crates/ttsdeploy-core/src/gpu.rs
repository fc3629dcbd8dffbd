//! GPU capability and device inventory

use serde::{Deserialize, Serialize};

/// Result of probing the host for GPU passthrough
///
/// Computed once per run and passed by value to every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capability {
    /// Whether containers can be given GPU devices
    pub gpu_available: bool,
}

impl Capability {
    pub fn gpu() -> Self {
        Self {
            gpu_available: true,
        }
    }

    pub fn cpu_only() -> Self {
        Self {
            gpu_available: false,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.gpu_available {
            write!(f, "gpu")
        } else {
            write!(f, "cpu-only")
        }
    }
}

/// Represents a GPU device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    /// Device index
    pub index: u32,
    /// Device name
    pub name: String,
    /// Total memory in bytes
    pub memory_total: u64,
    /// Free memory in bytes
    pub memory_free: u64,
    /// Current utilization percentage (0-100)
    pub utilization: Option<u32>,
}

/// GPU information for the host
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuInfo {
    /// List of detected GPU devices
    pub devices: Vec<GpuDevice>,
    /// Total number of GPUs
    pub total_count: u32,
}

impl GpuInfo {
    /// Create empty GPU info (no GPUs detected)
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            total_count: 0,
        }
    }

    fn from_devices(devices: Vec<GpuDevice>) -> Self {
        Self {
            total_count: devices.len() as u32,
            devices,
        }
    }
}

/// Query arguments for `nvidia-smi`
pub const NVIDIA_SMI_QUERY: [&str; 2] = [
    "--query-gpu=index,name,memory.total,memory.free,utilization.gpu",
    "--format=csv,noheader,nounits",
];

/// Parse `nvidia-smi` CSV output produced with [`NVIDIA_SMI_QUERY`]
///
/// Memory columns are in MiB. Malformed lines are skipped.
pub fn parse_nvidia_smi(output: &str) -> GpuInfo {
    let devices = output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return None;
            }
            let mib = 1024 * 1024;
            Some(GpuDevice {
                index: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                memory_total: fields[2].parse::<u64>().ok()? * mib,
                memory_free: fields[3].parse::<u64>().ok()? * mib,
                utilization: fields.get(4).and_then(|u| u.parse().ok()),
            })
        })
        .collect();

    GpuInfo::from_devices(devices)
}

/// Detect NVIDIA GPUs on the host
///
/// Returns empty info when `nvidia-smi` is missing or fails.
pub fn detect_gpus() -> GpuInfo {
    match std::process::Command::new("nvidia-smi")
        .args(NVIDIA_SMI_QUERY)
        .output()
    {
        Ok(out) if out.status.success() => parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout)),
        _ => GpuInfo::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_info_empty() {
        let info = GpuInfo::empty();
        assert_eq!(info.total_count, 0);
        assert!(info.devices.is_empty());
    }

    #[test]
    fn test_parse_nvidia_smi() {
        let output = "0, NVIDIA GeForce RTX 4090, 24564, 23012, 3\n\
                      1, Tesla P4, 7680, 7600, [N/A]\n";
        let info = parse_nvidia_smi(output);

        assert_eq!(info.total_count, 2);
        assert_eq!(info.devices[0].name, "NVIDIA GeForce RTX 4090");
        assert_eq!(info.devices[0].memory_total, 24564 * 1024 * 1024);
        assert_eq!(info.devices[0].utilization, Some(3));
        assert_eq!(info.devices[1].index, 1);
        assert_eq!(info.devices[1].utilization, None);
    }

    #[test]
    fn test_parse_nvidia_smi_skips_garbage() {
        let output = "NVIDIA-SMI has failed because it couldn't communicate with the driver\n";
        assert_eq!(parse_nvidia_smi(output).total_count, 0);
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::gpu().to_string(), "gpu");
        assert_eq!(Capability::cpu_only().to_string(), "cpu-only");
    }
}
