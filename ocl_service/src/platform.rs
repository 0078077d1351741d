use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::VendorPreference;
use crate::driver::Driver;

/// A (platform-index, device-index) pair into the enumerated devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub platform: usize,
    pub device: usize,
}

impl DeviceSelection {
    pub const fn new(platform: usize, device: usize) -> Self {
        Self { platform, device }
    }
}

impl std::fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "platform {} / device {}", self.platform, self.device)
    }
}

struct PlatformEntry<D: Driver> {
    id: D::Platform,
    devices: Vec<D::Device>,
}

/// Platforms and their GPU devices, discovered once.
pub struct PlatformRegistry<D: Driver> {
    platforms: Vec<PlatformEntry<D>>,
    preferred: DeviceSelection,
}

impl<D: Driver> PlatformRegistry<D> {
    pub fn empty() -> Self {
        Self {
            platforms: Vec::new(),
            preferred: DeviceSelection::default(),
        }
    }

    /// Queries every platform and its GPU devices. Query failures are logged
    /// and leave the affected platform (or the whole registry) empty.
    ///
    /// The preferred pair is the first device whose vendor matches `vendor`,
    /// or (0, 0) when none does.
    pub fn enumerate(driver: &D, vendor: VendorPreference) -> Self {
        let platform_ids = match driver.platforms() {
            Ok(ids) => ids,
            Err(err) => {
                error!("Failed to query OpenCL platforms: {}", err);
                Vec::new()
            }
        };

        if platform_ids.is_empty() {
            error!("No OpenCL compatible platforms were found on the system");
            return Self::empty();
        }

        let mut preferred: Option<DeviceSelection> = None;
        let mut platforms = Vec::with_capacity(platform_ids.len());

        for (platform_idx, id) in platform_ids.into_iter().enumerate() {
            let devices = driver.gpu_devices(id).unwrap_or_else(|err| {
                warn!(
                    "Failed to query GPU devices of platform {}: {}",
                    platform_idx, err
                );
                Vec::new()
            });

            if preferred.is_none() {
                preferred = devices.iter().enumerate().find_map(|(device_idx, &device)| {
                    match driver.device_properties(device) {
                        Ok(props) if vendor.matches(&props.vendor) => {
                            Some(DeviceSelection::new(platform_idx, device_idx))
                        }
                        Ok(_) => None,
                        Err(err) => {
                            warn!(
                                "Failed to query vendor of platform {} device {}: {}",
                                platform_idx, device_idx, err
                            );
                            None
                        }
                    }
                });
            }

            platforms.push(PlatformEntry { id, devices });
        }

        let registry = Self {
            platforms,
            preferred: preferred.unwrap_or_default(),
        };
        info!(
            "Found {} OpenCL platform(s) with {} GPU device(s), preferred {}",
            registry.num_platforms(),
            registry.total_devices(),
            registry.preferred
        );
        registry
    }

    pub fn num_platforms(&self) -> usize {
        self.platforms.len()
    }

    /// Zero for an out-of-range platform.
    pub fn num_devices_on_platform(&self, platform: usize) -> usize {
        self.platforms
            .get(platform)
            .map_or(0, |entry| entry.devices.len())
    }

    pub fn total_devices(&self) -> usize {
        self.platforms.iter().map(|entry| entry.devices.len()).sum()
    }

    pub fn platform(&self, platform: usize) -> Option<D::Platform> {
        self.platforms.get(platform).map(|entry| entry.id)
    }

    pub fn device(&self, selection: DeviceSelection) -> Option<D::Device> {
        self.platforms
            .get(selection.platform)
            .and_then(|entry| entry.devices.get(selection.device))
            .copied()
    }

    pub fn contains(&self, selection: DeviceSelection) -> bool {
        self.device(selection).is_some()
    }

    pub fn preferred(&self) -> DeviceSelection {
        self.preferred
    }

    /// Every valid pair, platform-major.
    pub fn selections(&self) -> impl Iterator<Item = DeviceSelection> + '_ {
        self.platforms
            .iter()
            .enumerate()
            .flat_map(|(platform, entry)| {
                (0..entry.devices.len()).map(move |device| DeviceSelection::new(platform, device))
            })
    }
}
