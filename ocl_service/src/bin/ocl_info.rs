use std::path::PathBuf;

use anyhow::Result;
use common::log_setup::setup_logging;
use ocl_service::{
    ChannelOrder, ChannelType, ImageFormat, MemObjectType, OclDriver, ResourceService,
    ServiceConfig,
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "ocl_service.yaml";

fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let loaded = ServiceConfig::load(&config_path);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    setup_logging(&config.log_level)?;
    if let Err(err) = &loaded {
        info!("Using default configuration: {:#}", err);
    }
    info!("Configuration: {:?}", config);

    let service = ResourceService::with_config(OclDriver::new(), config);
    service.log_platform_info();

    if service.context().is_none() {
        warn!("No OpenCL context available for {}", service.active_selection());
        return Ok(());
    }

    service.log_context_info();

    for (label, object_type) in [("2D", MemObjectType::Image2d), ("3D", MemObjectType::Image3d)] {
        info!(
            "Maximum {} image: {} x {} x {}",
            label,
            service.maximum_image_size(0, object_type),
            service.maximum_image_size(1, object_type),
            service.maximum_image_size(2, object_type)
        );
    }

    for format in [
        ImageFormat::new(ChannelOrder::R, ChannelType::UnormInt8),
        ImageFormat::new(ChannelOrder::R, ChannelType::Float),
        ImageFormat::new(ChannelOrder::Rgba, ChannelType::UnormInt8),
        ImageFormat::new(ChannelOrder::Rgba, ChannelType::Float),
    ] {
        info!(
            "{}: 2D {:?}, 3D {:?}",
            format,
            service.format_support(format, MemObjectType::Image2d),
            service.format_support(format, MemObjectType::Image3d)
        );
    }

    Ok(())
}
