//! In-memory driver used by unit tests. Handles are reference counted and
//! count their releases, faults are switched on per test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::driver::{BuildStatus, DeviceProperties, Driver, DriverError, DriverResult};
use crate::image_format::{ChannelOrder, ChannelType, ImageFormat, MemObjectType};
use crate::interop::{GlShareGroup, GL_SHARING_EXTENSION};

const CL_DEVICE_NOT_FOUND: i32 = -1;
const CL_OUT_OF_RESOURCES: i32 = -5;
const CL_INVALID_VALUE: i32 = -30;
const CL_INVALID_PROGRAM: i32 = -44;
const CL_INVALID_COMMAND_QUEUE: i32 = -36;
const CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR: i32 = -1000;

/// Share group of the kind the build target accepts.
pub(crate) fn native_share_group() -> GlShareGroup {
    if cfg!(windows) {
        GlShareGroup::Wgl {
            context: 0x10,
            hdc: 0x20,
        }
    } else if cfg!(target_os = "macos") {
        GlShareGroup::Cgl { share_group: 0x10 }
    } else {
        GlShareGroup::Glx {
            context: 0x10,
            display: 0x20,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    name: String,
    vendor: String,
    extensions: String,
    gl_capable: bool,
}

impl FakeDevice {
    pub(crate) fn new(vendor: &str) -> Self {
        Self {
            name: format!("{vendor} GPU"),
            vendor: vendor.to_string(),
            extensions: "cl_khr_fp64 cl_khr_3d_image_writes".to_string(),
            gl_capable: false,
        }
    }

    /// Reports the GL sharing extension and is returned by GL interop queries.
    pub(crate) fn gl_capable(mut self) -> Self {
        self.gl_capable = true;
        self.extensions.push(' ');
        self.extensions.push_str(GL_SHARING_EXTENSION);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakePlatform {
    devices: Vec<FakeDevice>,
}

impl FakePlatform {
    pub(crate) fn new(devices: Vec<FakeDevice>) -> Self {
        Self { devices }
    }
}

/// Switches that make the next driver calls fail.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub fail_platform_query: bool,
    pub fail_device_query_on: Option<usize>,
    pub fail_context_creation: bool,
    pub fail_queue_creation: bool,
    pub fail_gl_query: bool,
    pub fail_shared_context: bool,
    /// Queues report a context other than the one they were created on.
    pub stale_queues: bool,
    pub fail_queue_info: bool,
    pub fail_build_query: bool,
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicUsize,
    contexts_created: AtomicUsize,
    shared_contexts_created: AtomicUsize,
    contexts_released: AtomicUsize,
    queues_released: AtomicUsize,
    programs_released: AtomicUsize,
}

impl Counters {
    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakePlatformId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakeDeviceId {
    platform: usize,
    index: usize,
}

#[derive(Debug)]
struct ContextInner {
    id: usize,
    device: FakeDeviceId,
    counters: Arc<Counters>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.counters.contexts_released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeContext(Arc<ContextInner>);

impl PartialEq for FakeContext {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

#[derive(Debug)]
struct QueueInner {
    context: FakeContext,
    counters: Arc<Counters>,
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        self.counters.queues_released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeQueue(Arc<QueueInner>);

#[derive(Debug)]
struct ProgramInner {
    id: usize,
    status: BuildStatus,
    counters: Arc<Counters>,
}

impl Drop for ProgramInner {
    fn drop(&mut self) {
        self.counters.programs_released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeProgram(Arc<ProgramInner>);

impl PartialEq for FakeProgram {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

#[derive(Debug)]
pub(crate) struct FakeDriver {
    platforms: Vec<FakePlatform>,
    formats_2d: Vec<ImageFormat>,
    formats_3d: Vec<ImageFormat>,
    faults: Mutex<Faults>,
    counters: Arc<Counters>,
}

impl FakeDriver {
    pub(crate) fn new(platforms: Vec<FakePlatform>) -> Self {
        use ChannelOrder::*;
        use ChannelType::*;

        Self {
            platforms,
            formats_2d: vec![
                ImageFormat::new(Rgba, Float),
                ImageFormat::new(Rgba, UnormInt8),
                ImageFormat::new(Bgra, UnormInt8),
                ImageFormat::new(R, Float),
                ImageFormat::new(Rg, UnsignedInt16),
            ],
            formats_3d: vec![ImageFormat::new(Rgba, Float), ImageFormat::new(R, Float)],
            faults: Mutex::new(Faults::default()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub(crate) fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock()
    }

    pub(crate) fn device_id(&self, platform: usize, index: usize) -> FakeDeviceId {
        FakeDeviceId { platform, index }
    }

    /// A program whose last build ended with `status`.
    pub(crate) fn program(&self, status: BuildStatus) -> FakeProgram {
        FakeProgram(Arc::new(ProgramInner {
            id: self.counters.next_id(),
            status,
            counters: Arc::clone(&self.counters),
        }))
    }

    pub(crate) fn contexts_created(&self) -> usize {
        self.counters.contexts_created.load(Ordering::SeqCst)
    }

    pub(crate) fn shared_contexts_created(&self) -> usize {
        self.counters.shared_contexts_created.load(Ordering::SeqCst)
    }

    pub(crate) fn contexts_released(&self) -> usize {
        self.counters.contexts_released.load(Ordering::SeqCst)
    }

    pub(crate) fn queues_released(&self) -> usize {
        self.counters.queues_released.load(Ordering::SeqCst)
    }

    pub(crate) fn programs_released(&self) -> usize {
        self.counters.programs_released.load(Ordering::SeqCst)
    }

    fn fake_device(&self, device: FakeDeviceId) -> DriverResult<&FakeDevice> {
        self.platforms
            .get(device.platform)
            .and_then(|platform| platform.devices.get(device.index))
            .ok_or_else(|| DriverError::new(CL_INVALID_VALUE, "unknown device"))
    }

    fn new_context(&self, device: FakeDeviceId, counters: Arc<Counters>) -> FakeContext {
        FakeContext(Arc::new(ContextInner {
            id: self.counters.next_id(),
            device,
            counters,
        }))
    }
}

impl Driver for FakeDriver {
    type Platform = FakePlatformId;
    type Device = FakeDeviceId;
    type Context = FakeContext;
    type Queue = FakeQueue;
    type Program = FakeProgram;

    fn platforms(&self) -> DriverResult<Vec<FakePlatformId>> {
        if self.faults().fail_platform_query {
            return Err(DriverError::new(CL_OUT_OF_RESOURCES, "clGetPlatformIDs failed"));
        }
        Ok((0..self.platforms.len()).map(FakePlatformId).collect())
    }

    fn gpu_devices(&self, platform: FakePlatformId) -> DriverResult<Vec<FakeDeviceId>> {
        if self.faults().fail_device_query_on == Some(platform.0) {
            return Err(DriverError::new(CL_DEVICE_NOT_FOUND, "clGetDeviceIDs failed"));
        }
        let platform_entry = self
            .platforms
            .get(platform.0)
            .ok_or_else(|| DriverError::new(CL_INVALID_VALUE, "unknown platform"))?;
        Ok((0..platform_entry.devices.len())
            .map(|index| self.device_id(platform.0, index))
            .collect())
    }

    fn device_properties(&self, device: FakeDeviceId) -> DriverResult<DeviceProperties> {
        let fake = self.fake_device(device)?;
        Ok(DeviceProperties {
            name: fake.name.clone(),
            vendor: fake.vendor.clone(),
            version: "OpenCL 1.2".to_string(),
            extensions: fake.extensions.clone(),
            compute_units: 16,
            global_mem_bytes: 2 << 30,
            image2d_max_width: 16384,
            image2d_max_height: 8192,
            image3d_max_width: 2048,
            image3d_max_height: 1024,
            image3d_max_depth: 512,
        })
    }

    fn create_context(
        &self,
        _platform: FakePlatformId,
        device: FakeDeviceId,
        share_group: Option<&GlShareGroup>,
    ) -> DriverResult<FakeContext> {
        {
            let faults = self.faults();
            if faults.fail_context_creation {
                return Err(DriverError::new(CL_OUT_OF_RESOURCES, "clCreateContext failed"));
            }
            if share_group.is_some() && faults.fail_shared_context {
                return Err(DriverError::new(
                    CL_INVALID_GL_SHAREGROUP_REFERENCE_KHR,
                    "clCreateContext failed",
                ));
            }
        }
        self.fake_device(device)?;

        self.counters.contexts_created.fetch_add(1, Ordering::SeqCst);
        if share_group.is_some() {
            self.counters
                .shared_contexts_created
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.new_context(device, Arc::clone(&self.counters)))
    }

    fn gl_interop_devices(
        &self,
        platform: FakePlatformId,
        _device: FakeDeviceId,
        _share_group: &GlShareGroup,
    ) -> DriverResult<Vec<FakeDeviceId>> {
        if self.faults().fail_gl_query {
            return Err(DriverError::new(CL_INVALID_VALUE, "clGetGLContextInfoKHR failed"));
        }
        let platform_entry = self
            .platforms
            .get(platform.0)
            .ok_or_else(|| DriverError::new(CL_INVALID_VALUE, "unknown platform"))?;
        Ok(platform_entry
            .devices
            .iter()
            .enumerate()
            .filter(|(_, device)| device.gl_capable)
            .map(|(index, _)| self.device_id(platform.0, index))
            .collect())
    }

    fn context_devices(&self, context: &FakeContext) -> DriverResult<Vec<FakeDeviceId>> {
        Ok(vec![context.0.device])
    }

    fn create_command_queue(
        &self,
        context: &FakeContext,
        _device: FakeDeviceId,
    ) -> DriverResult<FakeQueue> {
        if self.faults().fail_queue_creation {
            return Err(DriverError::new(
                CL_OUT_OF_RESOURCES,
                "clCreateCommandQueue failed",
            ));
        }
        Ok(FakeQueue(Arc::new(QueueInner {
            context: context.clone(),
            counters: Arc::clone(&self.counters),
        })))
    }

    fn queue_context(&self, queue: &FakeQueue) -> DriverResult<FakeContext> {
        let faults = self.faults();
        if faults.fail_queue_info {
            return Err(DriverError::new(
                CL_INVALID_COMMAND_QUEUE,
                "clGetCommandQueueInfo failed",
            ));
        }
        if faults.stale_queues {
            // Detached counters keep the release bookkeeping of real handles exact.
            return Ok(self.new_context(queue.0.context.0.device, Arc::default()));
        }
        Ok(queue.0.context.clone())
    }

    fn supported_image_formats(
        &self,
        _context: &FakeContext,
        object_type: MemObjectType,
    ) -> DriverResult<Vec<ImageFormat>> {
        Ok(match object_type {
            MemObjectType::Image2d => self.formats_2d.clone(),
            MemObjectType::Image3d => self.formats_3d.clone(),
        })
    }

    fn program_build_status(
        &self,
        program: &FakeProgram,
        _device: FakeDeviceId,
    ) -> DriverResult<BuildStatus> {
        if self.faults().fail_build_query {
            return Err(DriverError::new(
                CL_INVALID_PROGRAM,
                "clGetProgramBuildInfo failed",
            ));
        }
        Ok(program.0.status)
    }
}
