//! Process-wide provider of OpenCL resources for GPU image filters.
//!
//! [`ResourceService`] enumerates GPU devices, keeps one context and command
//! queue per (platform, device) pair, optionally shares those contexts with
//! OpenGL, and stores compiled programs by name with reference counting.

pub mod config;
pub mod context_collection;
pub mod driver;
pub mod error;
pub mod image_format;
pub mod interop;
pub mod platform;
pub mod program_store;
pub mod service;
pub mod work_size;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use config::{ServiceConfig, VendorPreference};
pub use context_collection::ContextCollection;
pub use driver::{BuildStatus, DeviceProperties, Driver, DriverError, DriverResult};
pub use error::{Error, Result};
pub use image_format::{
    ChannelOrder, ChannelType, FormatSupport, ImageFormat, ImageFormatCapability, MemObjectType,
};
pub use interop::{GlContextSource, GlShareGroup};
pub use platform::{DeviceSelection, PlatformRegistry};
pub use program_store::{InsertOutcome, ProgramStore, RemoveOutcome};
pub use service::ResourceService;

#[cfg(feature = "ocl")]
pub use driver::ocl::OclDriver;
