//! OpenCL driver backed by the `ocl` crate's core layer.

use std::ffi::c_void;
use std::fmt;

use ocl::core::{
    self, CommandQueueInfo, CommandQueueInfoResult, ContextInfo, ContextInfoResult,
    ContextProperties, DeviceId, DeviceInfo, DeviceInfoResult, GlContextInfo,
    GlContextInfoResult, ImageChannelDataType, ImageChannelOrder, PlatformId, ProgramBuildInfo,
    ProgramBuildInfoResult, ProgramBuildStatus,
};
use tracing::debug;

use super::{BuildStatus, DeviceProperties, Driver, DriverError, DriverResult, UNKNOWN_STATUS};
use crate::image_format::{ChannelOrder, ChannelType, ImageFormat, MemObjectType};
use crate::interop::GlShareGroup;

fn driver_error(call: &str, err: impl Into<ocl::Error>) -> DriverError {
    let err = err.into();
    let status = err.api_status().map_or(UNKNOWN_STATUS, |status| status as i32);
    DriverError::new(status, format!("{call} failed: {err}"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OclPlatform(PlatformId);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OclDevice(DeviceId);

#[derive(Clone)]
pub struct OclContext(core::Context);

#[derive(Clone)]
pub struct OclQueue(core::CommandQueue);

#[derive(Clone)]
pub struct OclProgram(core::Program);

impl OclContext {
    pub fn as_core(&self) -> &core::Context {
        &self.0
    }
}

impl OclQueue {
    pub fn as_core(&self) -> &core::CommandQueue {
        &self.0
    }
}

impl OclProgram {
    pub fn as_core(&self) -> &core::Program {
        &self.0
    }
}

impl PartialEq for OclContext {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ptr() == other.0.as_ptr()
    }
}

impl PartialEq for OclProgram {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ptr() == other.0.as_ptr()
    }
}

impl fmt::Debug for OclContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OclContext").field(&self.0.as_ptr()).finish()
    }
}

impl fmt::Debug for OclQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OclQueue").field(&self.0.as_ptr()).finish()
    }
}

impl fmt::Debug for OclProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OclProgram").field(&self.0.as_ptr()).finish()
    }
}

impl From<core::Program> for OclProgram {
    fn from(program: core::Program) -> Self {
        Self(program)
    }
}

impl From<ocl::Program> for OclProgram {
    fn from(program: ocl::Program) -> Self {
        Self(program.as_core().clone())
    }
}

impl From<ChannelOrder> for ImageChannelOrder {
    fn from(order: ChannelOrder) -> Self {
        match order {
            ChannelOrder::R => ImageChannelOrder::R,
            ChannelOrder::A => ImageChannelOrder::A,
            ChannelOrder::Rg => ImageChannelOrder::Rg,
            ChannelOrder::Ra => ImageChannelOrder::Ra,
            ChannelOrder::Rgb => ImageChannelOrder::Rgb,
            ChannelOrder::Rgba => ImageChannelOrder::Rgba,
            ChannelOrder::Bgra => ImageChannelOrder::Bgra,
            ChannelOrder::Argb => ImageChannelOrder::Argb,
            ChannelOrder::Intensity => ImageChannelOrder::Intensity,
            ChannelOrder::Luminance => ImageChannelOrder::Luminance,
        }
    }
}

fn channel_order(order: ImageChannelOrder) -> Option<ChannelOrder> {
    Some(match order {
        ImageChannelOrder::R => ChannelOrder::R,
        ImageChannelOrder::A => ChannelOrder::A,
        ImageChannelOrder::Rg => ChannelOrder::Rg,
        ImageChannelOrder::Ra => ChannelOrder::Ra,
        ImageChannelOrder::Rgb => ChannelOrder::Rgb,
        ImageChannelOrder::Rgba => ChannelOrder::Rgba,
        ImageChannelOrder::Bgra => ChannelOrder::Bgra,
        ImageChannelOrder::Argb => ChannelOrder::Argb,
        ImageChannelOrder::Intensity => ChannelOrder::Intensity,
        ImageChannelOrder::Luminance => ChannelOrder::Luminance,
        _ => return None,
    })
}

impl From<ChannelType> for ImageChannelDataType {
    fn from(channel_type: ChannelType) -> Self {
        match channel_type {
            ChannelType::SnormInt8 => ImageChannelDataType::SnormInt8,
            ChannelType::SnormInt16 => ImageChannelDataType::SnormInt16,
            ChannelType::UnormInt8 => ImageChannelDataType::UnormInt8,
            ChannelType::UnormInt16 => ImageChannelDataType::UnormInt16,
            ChannelType::UnormShort565 => ImageChannelDataType::UnormShort565,
            ChannelType::UnormShort555 => ImageChannelDataType::UnormShort555,
            ChannelType::UnormInt101010 => ImageChannelDataType::UnormInt101010,
            ChannelType::SignedInt8 => ImageChannelDataType::SignedInt8,
            ChannelType::SignedInt16 => ImageChannelDataType::SignedInt16,
            ChannelType::SignedInt32 => ImageChannelDataType::SignedInt32,
            ChannelType::UnsignedInt8 => ImageChannelDataType::UnsignedInt8,
            ChannelType::UnsignedInt16 => ImageChannelDataType::UnsignedInt16,
            ChannelType::UnsignedInt32 => ImageChannelDataType::UnsignedInt32,
            ChannelType::HalfFloat => ImageChannelDataType::HalfFloat,
            ChannelType::Float => ImageChannelDataType::Float,
        }
    }
}

fn channel_type(data_type: ImageChannelDataType) -> Option<ChannelType> {
    Some(match data_type {
        ImageChannelDataType::SnormInt8 => ChannelType::SnormInt8,
        ImageChannelDataType::SnormInt16 => ChannelType::SnormInt16,
        ImageChannelDataType::UnormInt8 => ChannelType::UnormInt8,
        ImageChannelDataType::UnormInt16 => ChannelType::UnormInt16,
        ImageChannelDataType::UnormShort565 => ChannelType::UnormShort565,
        ImageChannelDataType::UnormShort555 => ChannelType::UnormShort555,
        ImageChannelDataType::UnormInt101010 => ChannelType::UnormInt101010,
        ImageChannelDataType::SignedInt8 => ChannelType::SignedInt8,
        ImageChannelDataType::SignedInt16 => ChannelType::SignedInt16,
        ImageChannelDataType::SignedInt32 => ChannelType::SignedInt32,
        ImageChannelDataType::UnsignedInt8 => ChannelType::UnsignedInt8,
        ImageChannelDataType::UnsignedInt16 => ChannelType::UnsignedInt16,
        ImageChannelDataType::UnsignedInt32 => ChannelType::UnsignedInt32,
        ImageChannelDataType::HalfFloat => ChannelType::HalfFloat,
        ImageChannelDataType::Float => ChannelType::Float,
        _ => return None,
    })
}

impl From<MemObjectType> for core::MemObjectType {
    fn from(object_type: MemObjectType) -> Self {
        match object_type {
            MemObjectType::Image2d => core::MemObjectType::Image2d,
            MemObjectType::Image3d => core::MemObjectType::Image3d,
        }
    }
}

fn gl_properties(platform: OclPlatform, share_group: &GlShareGroup) -> ContextProperties {
    let properties = ContextProperties::new().platform(platform.0);
    match *share_group {
        GlShareGroup::Glx { context, display } => properties
            .gl_context(context as *mut c_void)
            .glx_display(display as *mut c_void),
        GlShareGroup::Wgl { context, hdc } => properties
            .gl_context(context as *mut c_void)
            .wgl_hdc(hdc as *mut c_void),
        GlShareGroup::Cgl { share_group } => {
            properties.cgl_sharegroup(share_group as *mut c_void)
        }
    }
}

/// The system's OpenCL implementation, reached through the ICD loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct OclDriver;

impl OclDriver {
    pub fn new() -> Self {
        Self
    }

    fn device_info(&self, device: OclDevice, kind: DeviceInfo) -> DriverResult<DeviceInfoResult> {
        core::get_device_info(device.0, kind).map_err(|err| driver_error("clGetDeviceInfo", err))
    }

    fn size_info(&self, device: OclDevice, kind: DeviceInfo) -> DriverResult<usize> {
        Ok(match self.device_info(device, kind)? {
            DeviceInfoResult::Image2dMaxWidth(size)
            | DeviceInfoResult::Image2dMaxHeight(size)
            | DeviceInfoResult::Image3dMaxWidth(size)
            | DeviceInfoResult::Image3dMaxHeight(size)
            | DeviceInfoResult::Image3dMaxDepth(size) => size,
            _ => 0,
        })
    }
}

impl Driver for OclDriver {
    type Platform = OclPlatform;
    type Device = OclDevice;
    type Context = OclContext;
    type Queue = OclQueue;
    type Program = OclProgram;

    fn platforms(&self) -> DriverResult<Vec<OclPlatform>> {
        let platforms =
            core::get_platform_ids().map_err(|err| driver_error("clGetPlatformIDs", err))?;
        Ok(platforms.into_iter().map(OclPlatform).collect())
    }

    fn gpu_devices(&self, platform: OclPlatform) -> DriverResult<Vec<OclDevice>> {
        let devices = core::get_device_ids(platform.0, Some(core::DeviceType::GPU), None)
            .map_err(|err| driver_error("clGetDeviceIDs", err))?;
        Ok(devices.into_iter().map(OclDevice).collect())
    }

    fn device_properties(&self, device: OclDevice) -> DriverResult<DeviceProperties> {
        let compute_units = match self.device_info(device, DeviceInfo::MaxComputeUnits)? {
            DeviceInfoResult::MaxComputeUnits(units) => units,
            _ => 0,
        };
        let global_mem_bytes = match self.device_info(device, DeviceInfo::GlobalMemSize)? {
            DeviceInfoResult::GlobalMemSize(bytes) => bytes,
            _ => 0,
        };

        Ok(DeviceProperties {
            name: self.device_info(device, DeviceInfo::Name)?.to_string(),
            vendor: self.device_info(device, DeviceInfo::Vendor)?.to_string(),
            version: self.device_info(device, DeviceInfo::Version)?.to_string(),
            extensions: self.device_info(device, DeviceInfo::Extensions)?.to_string(),
            compute_units,
            global_mem_bytes,
            image2d_max_width: self.size_info(device, DeviceInfo::Image2dMaxWidth)?,
            image2d_max_height: self.size_info(device, DeviceInfo::Image2dMaxHeight)?,
            image3d_max_width: self.size_info(device, DeviceInfo::Image3dMaxWidth)?,
            image3d_max_height: self.size_info(device, DeviceInfo::Image3dMaxHeight)?,
            image3d_max_depth: self.size_info(device, DeviceInfo::Image3dMaxDepth)?,
        })
    }

    fn create_context(
        &self,
        platform: OclPlatform,
        device: OclDevice,
        share_group: Option<&GlShareGroup>,
    ) -> DriverResult<OclContext> {
        let properties = match share_group {
            Some(share_group) => gl_properties(platform, share_group),
            None => ContextProperties::new().platform(platform.0),
        };
        core::create_context(Some(&properties), &[device.0], None, None)
            .map(OclContext)
            .map_err(|err| driver_error("clCreateContext", err))
    }

    fn gl_interop_devices(
        &self,
        platform: OclPlatform,
        device: OclDevice,
        share_group: &GlShareGroup,
    ) -> DriverResult<Vec<OclDevice>> {
        // CGL share groups only name the devices of a context created from them.
        if let GlShareGroup::Cgl { .. } = share_group {
            return Ok(vec![device]);
        }

        let properties = gl_properties(platform, share_group);
        match core::get_gl_context_info_khr(&properties, GlContextInfo::Devices)
            .map_err(|err| driver_error("clGetGLContextInfoKHR", err))?
        {
            GlContextInfoResult::Devices(devices) => {
                debug!("{} device(s) share the current OpenGL context", devices.len());
                Ok(devices.into_iter().map(OclDevice).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn context_devices(&self, context: &OclContext) -> DriverResult<Vec<OclDevice>> {
        match core::get_context_info(&context.0, ContextInfo::Devices)
            .map_err(|err| driver_error("clGetContextInfo", err))?
        {
            ContextInfoResult::Devices(devices) => {
                Ok(devices.into_iter().map(OclDevice).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn create_command_queue(&self, context: &OclContext, device: OclDevice) -> DriverResult<OclQueue> {
        core::create_command_queue(&context.0, device.0, None)
            .map(OclQueue)
            .map_err(|err| driver_error("clCreateCommandQueue", err))
    }

    fn queue_context(&self, queue: &OclQueue) -> DriverResult<OclContext> {
        match core::get_command_queue_info(&queue.0, CommandQueueInfo::Context)
            .map_err(|err| driver_error("clGetCommandQueueInfo", err))?
        {
            CommandQueueInfoResult::Context(context) => Ok(OclContext(context)),
            other => Err(DriverError::new(
                UNKNOWN_STATUS,
                format!("clGetCommandQueueInfo returned {other}"),
            )),
        }
    }

    fn supported_image_formats(
        &self,
        context: &OclContext,
        object_type: MemObjectType,
    ) -> DriverResult<Vec<ImageFormat>> {
        let formats = core::get_supported_image_formats(
            &context.0,
            core::MemFlags::READ_WRITE,
            object_type.into(),
        )
        .map_err(|err| driver_error("clGetSupportedImageFormats", err))?;

        Ok(formats
            .into_iter()
            .filter_map(|format| format.ok())
            .filter_map(|format| {
                Some(ImageFormat::new(
                    channel_order(format.channel_order)?,
                    channel_type(format.channel_data_type)?,
                ))
            })
            .collect())
    }

    fn program_build_status(&self, program: &OclProgram, device: OclDevice) -> DriverResult<BuildStatus> {
        match core::get_program_build_info(&program.0, device.0, ProgramBuildInfo::BuildStatus)
            .map_err(|err| driver_error("clGetProgramBuildInfo", err))?
        {
            ProgramBuildInfoResult::BuildStatus(status) => Ok(match status {
                ProgramBuildStatus::Success => BuildStatus::Success,
                ProgramBuildStatus::None => BuildStatus::None,
                ProgramBuildStatus::Error => BuildStatus::Error,
                ProgramBuildStatus::InProgress => BuildStatus::InProgress,
            }),
            other => Err(DriverError::new(
                UNKNOWN_STATUS,
                format!("clGetProgramBuildInfo returned {other}"),
            )),
        }
    }
}
