//! Compute device enumeration.

use tracing::info;

/// Menu label of ordinal 0.
pub const CPU_DEVICE_NAME: &str = "Default (CPU)";

/// One enumerated accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Graphics API backing the adapter.
    pub backend: String,
    /// Discrete, integrated, virtual, software...
    pub kind: String,
}

/// Where ordinal `n` sends the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Parallel CPU path.
    Cpu,
    /// Device at this index into [`DeviceList::devices`].
    Device(usize),
}

/// Accelerators found at startup; ordinal 0 is always the CPU.
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    devices: Vec<DeviceInfo>,
}

impl DeviceList {
    /// Query every adapter once and log what was found.
    pub fn enumerate() -> Self {
        #[cfg(feature = "gpu")]
        let devices = super::gpu::enumerate_adapters();
        #[cfg(not(feature = "gpu"))]
        let devices = Vec::new();

        let list = Self::from_devices(devices);
        info!(count = list.devices.len(), "compute devices enumerated");
        for (ordinal, device) in list.devices.iter().enumerate() {
            info!(
                ordinal = ordinal + 1,
                name = %device.name,
                backend = %device.backend,
                kind = %device.kind,
                "compute device"
            );
        }
        list
    }

    /// CPU only.
    pub const fn cpu_only() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Wrap an existing device list.
    pub const fn from_devices(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }

    /// Devices after the CPU entry.
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Number of selectable ordinals, CPU included.
    pub fn len(&self) -> usize {
        self.devices.len() + 1
    }

    /// Never true; the CPU entry always exists.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Menu labels, CPU first.
    pub fn names(&self) -> Vec<String> {
        std::iter::once(CPU_DEVICE_NAME.to_string())
            .chain(self.devices.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Map a menu ordinal to a path; out-of-range ordinals run on the CPU.
    pub fn resolve(&self, ordinal: usize) -> Selection {
        match ordinal.checked_sub(1) {
            Some(index) if index < self.devices.len() => Selection::Device(index),
            _ => Selection::Cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(name: &str) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            backend: "Vulkan".to_string(),
            kind: "DiscreteGpu".to_string(),
        }
    }

    #[test]
    fn test_cpu_is_ordinal_zero() {
        let list = DeviceList::from_devices(vec![gpu("Card A"), gpu("Card B")]);
        assert_eq!(list.names(), vec!["Default (CPU)", "Card A", "Card B"]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.resolve(0), Selection::Cpu);
        assert_eq!(list.resolve(1), Selection::Device(0));
        assert_eq!(list.resolve(2), Selection::Device(1));
    }

    #[test]
    fn test_out_of_range_falls_to_cpu() {
        let list = DeviceList::from_devices(vec![gpu("Card A")]);
        assert_eq!(list.resolve(5), Selection::Cpu);
        assert_eq!(DeviceList::cpu_only().resolve(1), Selection::Cpu);
    }
}
