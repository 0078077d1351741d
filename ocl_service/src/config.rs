use std::path::Path;

use anyhow::Context as _;
use common::FileFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::platform::DeviceSelection;

/// Vendor whose GPU is selected by default when several are present.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum VendorPreference {
    Any,
    #[default]
    Nvidia,
    Amd,
    Intel,
}

impl VendorPreference {
    /// Upper-case substrings searched for in the device vendor string.
    pub fn needles(self) -> &'static [&'static str] {
        match self {
            VendorPreference::Any => &[],
            VendorPreference::Nvidia => &["NVIDIA"],
            VendorPreference::Amd => &["AMD", "ADVANCED MICRO DEVICES"],
            VendorPreference::Intel => &["INTEL"],
        }
    }

    pub fn matches(self, vendor: &str) -> bool {
        let vendor = vendor.to_ascii_uppercase();
        self.needles()
            .iter()
            .any(|needle| vendor.contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub preferred_vendor: VendorPreference,
    /// Explicit selection applied at initialization, overriding the vendor
    /// preference when it is in range.
    pub device: Option<DeviceSelection>,
    /// Request GL sharing at initialization.
    pub share_gl: bool,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            preferred_vendor: VendorPreference::default(),
            device: None,
            share_gl: false,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let serialized = std::fs::read(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        common::serde::deserialize(&serialized, format)
            .with_context(|| format!("Failed to parse config '{}'", path.display()))
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|err| {
            info!("Using default configuration: {:#}", err);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let serialized = common::serde::serialize(self, FileFormat::from_path(path)?)?;
        std::fs::write(path, serialized)
            .with_context(|| format!("Failed to write config '{}'", path.display()))
    }
}
