//! The seam between the resource service and an OpenCL implementation.
//!
//! Platform and device identifiers are non-owning `Copy` values: the service
//! never destroys them. Contexts, command queues and programs are owning
//! handles whose `Drop` performs the driver release, so every handle is
//! released exactly once no matter how many caches it passed through.

mod status;

#[cfg(feature = "ocl")]
pub mod ocl;

use std::fmt;

pub use self::status::{status_name, UNKNOWN_STATUS};

use crate::image_format::{ImageFormat, MemObjectType};
use crate::interop::GlShareGroup;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A failed driver call, carrying the raw OpenCL status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({}, {status})", status::name_of(.status))]
pub struct DriverError {
    pub status: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status_name(&self) -> &'static str {
        status_name(self.status)
    }

    /// The GL context handed to the driver is not a valid share group.
    pub fn is_invalid_gl_sharegroup(&self) -> bool {
        self.status == status::INVALID_GL_SHAREGROUP_REFERENCE_KHR
    }
}

/// Outcome of the last build of a program for a given device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum BuildStatus {
    Success,
    None,
    Error,
    InProgress,
}

/// Descriptive properties of a device, used for vendor matching, logging and
/// image size limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub extensions: String,
    pub compute_units: u32,
    pub global_mem_bytes: u64,
    pub image2d_max_width: usize,
    pub image2d_max_height: usize,
    pub image3d_max_width: usize,
    pub image3d_max_height: usize,
    pub image3d_max_depth: usize,
}

/// Access to an OpenCL platform layer.
///
/// Calls may block and may be issued from any thread.
pub trait Driver: Send + Sync + 'static {
    type Platform: Copy + PartialEq + fmt::Debug + Send + Sync;
    type Device: Copy + PartialEq + fmt::Debug + Send + Sync;
    type Context: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Queue: Clone + fmt::Debug + Send + Sync;
    type Program: Clone + PartialEq + fmt::Debug + Send + Sync;

    fn platforms(&self) -> DriverResult<Vec<Self::Platform>>;

    /// GPU-class devices of `platform`, in driver order.
    fn gpu_devices(&self, platform: Self::Platform) -> DriverResult<Vec<Self::Device>>;

    fn device_properties(&self, device: Self::Device) -> DriverResult<DeviceProperties>;

    /// Creates a single-device context. With `share_group` set the context
    /// shares objects with that OpenGL context.
    fn create_context(
        &self,
        platform: Self::Platform,
        device: Self::Device,
        share_group: Option<&GlShareGroup>,
    ) -> DriverResult<Self::Context>;

    /// Devices the driver associates with the OpenGL context described by
    /// `share_group`. Implementations that cannot enumerate them for the
    /// share group kind return `[device]` when the platform accepts the
    /// share group as is.
    fn gl_interop_devices(
        &self,
        platform: Self::Platform,
        device: Self::Device,
        share_group: &GlShareGroup,
    ) -> DriverResult<Vec<Self::Device>>;

    fn context_devices(&self, context: &Self::Context) -> DriverResult<Vec<Self::Device>>;

    fn create_command_queue(
        &self,
        context: &Self::Context,
        device: Self::Device,
    ) -> DriverResult<Self::Queue>;

    /// The context that owns `queue`.
    fn queue_context(&self, queue: &Self::Queue) -> DriverResult<Self::Context>;

    fn supported_image_formats(
        &self,
        context: &Self::Context,
        object_type: MemObjectType,
    ) -> DriverResult<Vec<ImageFormat>>;

    fn program_build_status(
        &self,
        program: &Self::Program,
        device: Self::Device,
    ) -> DriverResult<BuildStatus>;
}
