use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::context_collection::ContextCollection;
use crate::driver::{BuildStatus, Driver};
use crate::error::{Error, Result};
use crate::image_format::{FormatSupport, ImageFormat, MemObjectType};
use crate::interop::{extension_supported, GlContextSource, GL_SHARING_EXTENSION};
use crate::platform::DeviceSelection;
use crate::program_store::{InsertOutcome, ProgramStore, RemoveOutcome};

/// Entry point for everything that needs OpenCL resources.
///
/// One instance is created by whoever wires up rendering and filtering and
/// shared as `Arc<ResourceService<D>>`. Platforms are enumerated on the
/// first call that needs them; contexts are created per (platform, device)
/// pair on first use and live as long as the service.
pub struct ResourceService<D: Driver> {
    driver: Arc<D>,
    config: ServiceConfig,
    gl_source: Option<Arc<dyn GlContextSource>>,
    // Declared before the collection: programs are released before the
    // contexts they were built for.
    programs: ProgramStore<D::Program>,
    collection: OnceLock<ContextCollection<D>>,
    selection: RwLock<DeviceSelection>,
}

impl<D: Driver> ResourceService<D> {
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, ServiceConfig::default())
    }

    pub fn with_config(driver: D, config: ServiceConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            gl_source: None,
            programs: ProgramStore::new(),
            collection: OnceLock::new(),
            selection: RwLock::new(DeviceSelection::default()),
        }
    }

    /// Attaches the source of the current OpenGL context, used when GL
    /// sharing is enabled. Must be called before first use.
    pub fn with_gl_source(mut self, source: Arc<dyn GlContextSource>) -> Self {
        if self.collection.get().is_some() {
            warn!("GL context source attached after initialization is ignored");
        }
        self.gl_source = Some(source);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_initialized(&self) -> bool {
        self.collection.get().is_some()
    }

    fn collection(&self) -> &ContextCollection<D> {
        self.collection.get_or_init(|| {
            let collection = ContextCollection::new(
                Arc::clone(&self.driver),
                self.config.preferred_vendor,
                self.gl_source.clone(),
            );

            let mut selection = collection.preferred_selection();
            if let Some(requested) = self.config.device {
                if collection.registry().contains(requested) {
                    selection = requested;
                } else {
                    warn!(
                        "Configured {} is out of range, using {}",
                        requested, selection
                    );
                }
            }
            *self.selection.write() = selection;

            if self.config.share_gl {
                collection.enable_gl_sharing(gl_sharing_supported(&collection, selection));
            }

            info!("OpenCL resource service initialized, active {}", selection);
            collection
        })
    }

    fn active(&self) -> (&ContextCollection<D>, DeviceSelection) {
        let collection = self.collection();
        (collection, *self.selection.read())
    }

    /// The active pair, when its context already exists and the last
    /// creation attempt succeeded. Never creates a context.
    fn provided(&self) -> Option<(&ContextCollection<D>, DeviceSelection)> {
        let (collection, selection) = self.active();
        (collection.can_provide_context() && collection.is_created(selection))
            .then_some((collection, selection))
    }

    /// Makes (platform, device) the active pair. Contexts of the previously
    /// active pair stay cached. An out-of-range pair leaves the selection
    /// unchanged.
    pub fn specify_platform_and_device(
        &self,
        platform: usize,
        device: usize,
        enable_shared_gl: bool,
    ) -> Result<()> {
        let collection = self.collection();
        let selection = DeviceSelection::new(platform, device);

        if !collection.registry().contains(selection) {
            warn!("Cannot select {}: out of range", selection);
            return Err(Error::DeviceOutOfRange { platform, device });
        }

        *self.selection.write() = selection;

        let sharing = enable_shared_gl && gl_sharing_supported(collection, selection);
        if enable_shared_gl && !sharing {
            info!(
                "{} does not support {}, GL sharing stays disabled",
                selection, GL_SHARING_EXTENSION
            );
        }
        collection.enable_gl_sharing(sharing);

        debug!("Selected {}", selection);
        Ok(())
    }

    pub fn active_selection(&self) -> DeviceSelection {
        self.active().1
    }

    pub fn num_platforms(&self) -> usize {
        self.collection().num_platforms()
    }

    pub fn num_devices_on_platform(&self, platform: usize) -> usize {
        self.collection().num_devices_on_platform(platform)
    }

    /// True when the last creation attempt succeeded and at least one
    /// context exists. Does not create one.
    pub fn can_provide_context(&self) -> bool {
        self.collection().can_provide_context()
    }

    pub fn is_gl_sharing_enabled(&self) -> bool {
        self.collection().is_gl_sharing_enabled()
    }

    /// Context of the active pair, created on first request.
    pub fn context(&self) -> Option<D::Context> {
        let (collection, selection) = self.active();
        collection.context(selection)
    }

    /// Command queue of the active pair. A queue that no longer reports the
    /// active context as its owner is not handed out.
    pub fn command_queue(&self) -> Option<D::Queue> {
        let (collection, selection) = self.active();
        let queue = collection.command_queue(selection)?;
        let expected = collection.context(selection)?;

        match self.driver.queue_context(&queue) {
            Ok(owner) if owner == expected => Some(queue),
            Ok(_) => {
                warn!("Have no valid command queue: it belongs to a different context");
                None
            }
            Err(err) => {
                warn!("Have no valid command queue. Query returned: {}", err);
                None
            }
        }
    }

    pub fn current_device(&self) -> Option<D::Device> {
        let (collection, selection) = self.active();
        collection.device_id(selection)
    }

    pub fn current_platform(&self) -> Option<D::Platform> {
        let (collection, selection) = self.active();
        collection.platform_id(selection.platform)
    }

    /// Support of `format` for `object_type` images on the active device.
    pub fn format_support(&self, format: ImageFormat, object_type: MemObjectType) -> FormatSupport {
        let (collection, selection) = self.active();
        collection
            .image_formats(selection)
            .map_or(FormatSupport::Unsupported, |formats| {
                formats.support(format, object_type)
            })
    }

    /// Whether the active device supports `format` for 2D images. When it
    /// does not, the nearest supported format is logged; use
    /// [`ResourceService::format_support`] to obtain it.
    pub fn is_format_supported(&self, format: ImageFormat) -> bool {
        match self.format_support(format, MemObjectType::Image2d) {
            FormatSupport::Supported => true,
            FormatSupport::Fallback(nearest) => {
                info!(
                    "Image format {} is not supported, nearest supported is {}",
                    format, nearest
                );
                false
            }
            FormatSupport::Unsupported => false,
        }
    }

    /// Largest image extent along `dimension` (0 = width, 1 = height,
    /// 2 = depth). Zero when no context is available or the combination does
    /// not exist.
    pub fn maximum_image_size(&self, dimension: usize, object_type: MemObjectType) -> usize {
        let Some((collection, selection)) = self.provided() else {
            return 0;
        };
        let Some(device) = collection.device_id(selection) else {
            return 0;
        };

        let props = match self.driver.device_properties(device) {
            Ok(props) => props,
            Err(err) => {
                warn!("Failed to query image limits of {}: {}", selection, err);
                return 0;
            }
        };

        match (dimension, object_type) {
            (0, MemObjectType::Image2d) => props.image2d_max_width,
            (0, MemObjectType::Image3d) => props.image3d_max_width,
            (1, MemObjectType::Image2d) => props.image2d_max_height,
            (1, MemObjectType::Image3d) => props.image3d_max_height,
            (2, MemObjectType::Image3d) => props.image3d_max_depth,
            (2, MemObjectType::Image2d) => 0,
            _ => {
                warn!(
                    "Could not receive info. Dimension {} does not exist for {}",
                    dimension, object_type
                );
                0
            }
        }
    }

    pub fn log_context_info(&self) {
        if let Some((collection, selection)) = self.provided() {
            collection.log_context_info(selection);
        }
    }

    /// Logs every enumerated platform and device.
    pub fn log_platform_info(&self) {
        let collection = self.collection();
        info!("{} OpenCL platform(s)", collection.num_platforms());
        for platform in 0..collection.num_platforms() {
            info!(
                "Platform {}: {} GPU device(s)",
                platform,
                collection.num_devices_on_platform(platform)
            );
        }
        for selection in collection.registry().selections() {
            collection.log_context_info(selection);
        }
    }

    pub fn programs(&self) -> &ProgramStore<D::Program> {
        &self.programs
    }

    pub fn insert_program(
        &self,
        program: D::Program,
        name: &str,
        force_override: bool,
    ) -> InsertOutcome {
        self.programs.insert(program, name, force_override)
    }

    /// The named program, with one more reference taken on it.
    pub fn program(&self, name: &str) -> Result<D::Program> {
        self.programs.get(name)
    }

    pub fn remove_program(&self, name: &str) -> RemoveOutcome {
        self.programs.remove(name)
    }

    /// Erases every program whose last build for the active device did not
    /// succeed. Returns the number erased; a no-op until the active pair has
    /// a context.
    pub fn invalidate_storage(&self) -> usize {
        let Some((collection, selection)) = self.provided() else {
            return 0;
        };
        let Some(device) = collection.device_id(selection) else {
            return 0;
        };

        let removed = self.programs.retain(|name, program| {
            debug!("Querying build status for '{}'", name);
            match self.driver.program_build_status(program, device) {
                Ok(BuildStatus::Success) => true,
                Ok(status) => {
                    debug!(" +-- build status {}, removing '{}'", status, name);
                    false
                }
                Err(err) => {
                    error!("Failed to query build status of '{}': {}", name, err);
                    false
                }
            }
        });

        if removed > 0 {
            info!("Removed {} program(s) without a successful build", removed);
        }
        removed
    }
}

impl<D: Driver> std::fmt::Debug for ResourceService<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("initialized", &self.is_initialized())
            .field("selection", &*self.selection.read())
            .field("programs", &self.programs.len())
            .finish()
    }
}

fn gl_sharing_supported<D: Driver>(
    collection: &ContextCollection<D>,
    selection: DeviceSelection,
) -> bool {
    let Some(device) = collection.device_id(selection) else {
        return false;
    };

    match collection.driver().device_properties(device) {
        Ok(props) => extension_supported(&props.extensions, GL_SHARING_EXTENSION),
        Err(err) => {
            warn!("Failed to query extensions of {}: {}", selection, err);
            false
        }
    }
}
