use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::VendorPreference;
use crate::driver::{Driver, DriverResult};
use crate::image_format::{ImageFormatCapability, MemObjectType};
use crate::interop::{GlContextSource, GlShareGroup};
use crate::platform::{DeviceSelection, PlatformRegistry};

/// Everything created for one (platform, device) pair.
///
/// Fields drop in declaration order, so the queue is released before the
/// context it belongs to.
pub(crate) struct ContextEntry<D: Driver> {
    queue: D::Queue,
    context: D::Context,
    image_formats: Arc<ImageFormatCapability>,
    gl_shared: bool,
}

impl<D: Driver> ContextEntry<D> {
    pub(crate) fn context(&self) -> &D::Context {
        &self.context
    }

    pub(crate) fn queue(&self) -> &D::Queue {
        &self.queue
    }

    pub(crate) fn image_formats(&self) -> &Arc<ImageFormatCapability> {
        &self.image_formats
    }

    pub(crate) fn is_gl_shared(&self) -> bool {
        self.gl_shared
    }
}

/// Lazily created contexts and command queues, at most one of each per
/// (platform, device) pair.
pub struct ContextCollection<D: Driver> {
    driver: Arc<D>,
    registry: PlatformRegistry<D>,
    gl_source: Option<Arc<dyn GlContextSource>>,
    gl_sharing_enabled: AtomicBool,
    entries: RwLock<HashMap<DeviceSelection, Arc<ContextEntry<D>>>>,
    // Held across check-and-create so a pair is never created twice.
    creation: Mutex<()>,
    last_creation_failed: AtomicBool,
}

impl<D: Driver> ContextCollection<D> {
    /// Enumerates platforms and devices. No context is created yet.
    pub fn new(
        driver: Arc<D>,
        vendor: VendorPreference,
        gl_source: Option<Arc<dyn GlContextSource>>,
    ) -> Self {
        let registry = PlatformRegistry::enumerate(driver.as_ref(), vendor);
        Self {
            driver,
            registry,
            gl_source,
            gl_sharing_enabled: AtomicBool::new(false),
            entries: RwLock::new(HashMap::new()),
            creation: Mutex::new(()),
            last_creation_failed: AtomicBool::new(false),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn registry(&self) -> &PlatformRegistry<D> {
        &self.registry
    }

    pub fn num_platforms(&self) -> usize {
        self.registry.num_platforms()
    }

    pub fn num_devices_on_platform(&self, platform: usize) -> usize {
        self.registry.num_devices_on_platform(platform)
    }

    pub fn preferred_selection(&self) -> DeviceSelection {
        self.registry.preferred()
    }

    pub fn platform_id(&self, platform: usize) -> Option<D::Platform> {
        self.registry.platform(platform)
    }

    pub fn device_id(&self, selection: DeviceSelection) -> Option<D::Device> {
        self.registry.device(selection)
    }

    /// Applies to contexts created from now on.
    pub fn enable_gl_sharing(&self, enabled: bool) {
        self.gl_sharing_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_gl_sharing_enabled(&self) -> bool {
        self.gl_sharing_enabled.load(Ordering::Acquire)
    }

    /// True when the last creation attempt succeeded and at least one
    /// context exists.
    pub fn can_provide_context(&self) -> bool {
        !self.last_creation_failed.load(Ordering::Acquire) && !self.entries.read().is_empty()
    }

    /// Whether the context of `selection` exists. Never creates it.
    pub fn is_created(&self, selection: DeviceSelection) -> bool {
        self.entries.read().contains_key(&selection)
    }

    pub fn context_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Creates the context and command queue for `selection` unless they
    /// already exist. Returns whether they exist afterwards.
    pub fn create_context(&self, selection: DeviceSelection) -> bool {
        let _creation = self.creation.lock();
        if self.entries.read().contains_key(&selection) {
            return true;
        }
        self.create_locked(selection)
    }

    pub fn context(&self, selection: DeviceSelection) -> Option<D::Context> {
        self.entry(selection).map(|entry| entry.context().clone())
    }

    pub fn command_queue(&self, selection: DeviceSelection) -> Option<D::Queue> {
        self.entry(selection).map(|entry| entry.queue().clone())
    }

    pub fn image_formats(&self, selection: DeviceSelection) -> Option<Arc<ImageFormatCapability>> {
        self.entry(selection)
            .map(|entry| Arc::clone(entry.image_formats()))
    }

    /// Whether the context of `selection` shares objects with OpenGL. Does not
    /// create the context.
    pub fn is_gl_shared(&self, selection: DeviceSelection) -> bool {
        self.entries
            .read()
            .get(&selection)
            .is_some_and(|entry| entry.is_gl_shared())
    }

    pub(crate) fn entry(&self, selection: DeviceSelection) -> Option<Arc<ContextEntry<D>>> {
        if let Some(entry) = self.entries.read().get(&selection) {
            return Some(Arc::clone(entry));
        }

        let _creation = self.creation.lock();
        if let Some(entry) = self.entries.read().get(&selection) {
            return Some(Arc::clone(entry));
        }

        if self.create_locked(selection) {
            self.entries.read().get(&selection).cloned()
        } else {
            None
        }
    }

    /// Whether `device` is among the devices the driver associates with the
    /// OpenGL context of `share_group`. A failing query means no interop.
    pub fn is_gl_interop_device(
        &self,
        platform: D::Platform,
        device: D::Device,
        share_group: &GlShareGroup,
    ) -> bool {
        match self
            .driver
            .gl_interop_devices(platform, device, share_group)
        {
            Ok(devices) if devices.is_empty() => {
                info!("No CL-GL interoperable devices found for the current platform");
                false
            }
            Ok(devices) => devices.contains(&device),
            Err(err) => {
                info!(
                    "CL-GL interop device query failed, the OpenGL context is probably invalid: {}",
                    err
                );
                false
            }
        }
    }

    /// Logs the properties of the device behind `selection`.
    pub fn log_context_info(&self, selection: DeviceSelection) {
        let Some(device) = self.registry.device(selection) else {
            return;
        };

        match self.driver.device_properties(device) {
            Ok(props) => {
                info!("Device: {} ({})", props.name, selection);
                info!("  vendor: {}", props.vendor);
                info!("  version: {}", props.version);
                info!("  compute units: {}", props.compute_units);
                info!("  global memory: {} MiB", props.global_mem_bytes >> 20);
                info!(
                    "  max 2D image: {} x {}",
                    props.image2d_max_width, props.image2d_max_height
                );
                info!(
                    "  max 3D image: {} x {} x {}",
                    props.image3d_max_width, props.image3d_max_height, props.image3d_max_depth
                );
            }
            Err(err) => warn!("Failed to query properties of {}: {}", selection, err),
        }

        if let Some(entry) = self.entries.read().get(&selection) {
            let formats = entry.image_formats();
            info!(
                "  image formats: {} 2D, {} 3D, GL shared: {}",
                formats.len(MemObjectType::Image2d),
                formats.len(MemObjectType::Image3d),
                entry.is_gl_shared()
            );
        }
    }

    fn create_locked(&self, selection: DeviceSelection) -> bool {
        let (Some(platform), Some(device)) = (
            self.registry.platform(selection.platform),
            self.registry.device(selection),
        ) else {
            warn!("Cannot create an OpenCL context for {}: out of range", selection);
            return false;
        };

        let share_group = self.interop_share_group(platform, device);

        match self.build_entry(platform, device, share_group.as_ref()) {
            Ok(entry) => {
                self.last_creation_failed.store(false, Ordering::Release);
                self.entries.write().insert(selection, Arc::new(entry));
                self.log_context_info(selection);
                true
            }
            Err(err) => {
                error!("Failed to create OpenCL context for {}: {}", selection, err);
                self.last_creation_failed.store(true, Ordering::Release);
                false
            }
        }
    }

    fn interop_share_group(
        &self,
        platform: D::Platform,
        device: D::Device,
    ) -> Option<GlShareGroup> {
        if !self.is_gl_sharing_enabled() {
            return None;
        }

        let Some(source) = &self.gl_source else {
            info!("GL sharing requested but no OpenGL context source is attached");
            return None;
        };
        let Some(share_group) = source.current_share_group() else {
            info!("GL sharing requested but no OpenGL context is current");
            return None;
        };
        if !share_group.is_native() {
            info!(
                "OpenGL share group {:?} does not match this platform",
                share_group
            );
            return None;
        }

        self.is_gl_interop_device(platform, device, &share_group)
            .then_some(share_group)
    }

    fn build_entry(
        &self,
        platform: D::Platform,
        device: D::Device,
        share_group: Option<&GlShareGroup>,
    ) -> DriverResult<ContextEntry<D>> {
        let (context, gl_shared) = match share_group {
            Some(share_group) => {
                match self
                    .driver
                    .create_context(platform, device, Some(share_group))
                {
                    Ok(context) => {
                        info!("Created a shared CL-GL context");
                        (context, true)
                    }
                    Err(err) => {
                        if err.is_invalid_gl_sharegroup() {
                            info!("Invalid OpenGL context, cannot create a shared CL-GL context");
                        } else {
                            info!("Shared CL-GL context creation failed: {}", err);
                        }
                        info!("Falling back to a non-shared context");
                        (self.driver.create_context(platform, device, None)?, false)
                    }
                }
            }
            None => (self.driver.create_context(platform, device, None)?, false),
        };

        let queue_device = match self.driver.context_devices(&context) {
            Ok(devices) => devices.first().copied().unwrap_or(device),
            Err(err) => {
                warn!("Failed to query devices of the new context: {}", err);
                device
            }
        };
        let queue = self.driver.create_command_queue(&context, queue_device)?;
        let image_formats = Arc::new(ImageFormatCapability::query(self.driver.as_ref(), &context));

        debug!("Created OpenCL context and command queue");
        Ok(ContextEntry {
            queue,
            context,
            image_formats,
            gl_shared,
        })
    }
}

impl<D: Driver> Drop for ContextCollection<D> {
    fn drop(&mut self) {
        let entries = std::mem::take(self.entries.get_mut());
        if entries.is_empty() {
            return;
        }

        debug!("Releasing {} OpenCL context(s)", entries.len());
        for (selection, entry) in entries {
            if Arc::strong_count(&entry) > 1 {
                warn!("Context for {} is still in use during teardown", selection);
            }
        }
    }
}
