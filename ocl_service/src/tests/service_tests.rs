use std::sync::Arc;

use crate::config::{ServiceConfig, VendorPreference};
use crate::driver::Driver;
use crate::error::Error;
use crate::image_format::{ChannelOrder, ChannelType, FormatSupport, ImageFormat, MemObjectType};
use crate::interop::GlContextSource;
use crate::platform::DeviceSelection;
use crate::service::ResourceService;
use crate::test_utils::{native_share_group, FakeDevice, FakeDriver, FakePlatform};

fn amd_platform() -> FakeDriver {
    FakeDriver::new(vec![FakePlatform::new(vec![
        FakeDevice::new("Advanced Micro Devices, Inc."),
        FakeDevice::new("Advanced Micro Devices, Inc."),
    ])])
}

fn gl_platform() -> FakeDriver {
    FakeDriver::new(vec![FakePlatform::new(vec![
        FakeDevice::new("NVIDIA Corporation").gl_capable(),
        FakeDevice::new("NVIDIA Corporation"),
    ])])
}

fn with_gl(service: ResourceService<FakeDriver>) -> ResourceService<FakeDriver> {
    let source: Arc<dyn GlContextSource> = Arc::new(|| Some(native_share_group()));
    service.with_gl_source(source)
}

#[test]
fn unmatched_vendor_selects_first_pair() {
    let service = ResourceService::new(amd_platform());

    assert_eq!(service.num_platforms(), 1);
    assert_eq!(service.num_devices_on_platform(0), 2);
    assert_eq!(service.active_selection(), DeviceSelection::new(0, 0));
    assert!(service.context().is_some());
    assert!(service.can_provide_context());
}

#[test]
fn enumeration_is_lazy() {
    let service = ResourceService::new(amd_platform());
    assert!(!service.is_initialized());

    service.num_platforms();
    assert!(service.is_initialized());
    assert_eq!(service.driver().contexts_created(), 0);
}

#[test]
fn device_counts_sum_to_total() {
    let service = ResourceService::new(FakeDriver::new(vec![
        FakePlatform::new(vec![FakeDevice::new("Intel(R) Corporation")]),
        FakePlatform::new(vec![]),
        FakePlatform::new(vec![
            FakeDevice::new("NVIDIA Corporation"),
            FakeDevice::new("NVIDIA Corporation"),
        ]),
    ]));

    let summed: usize = (0..service.num_platforms())
        .map(|platform| service.num_devices_on_platform(platform))
        .sum();
    assert_eq!(summed, 3);
    assert_eq!(service.num_devices_on_platform(7), 0);
    assert_eq!(service.active_selection(), DeviceSelection::new(2, 0));
}

#[test]
fn out_of_range_selection_is_rejected() {
    let service = ResourceService::new(amd_platform());
    service.specify_platform_and_device(0, 1, false).unwrap();

    assert_eq!(
        service.specify_platform_and_device(1, 0, false),
        Err(Error::DeviceOutOfRange {
            platform: 1,
            device: 0
        })
    );
    assert!(service.specify_platform_and_device(0, 2, false).is_err());
    assert_eq!(service.active_selection(), DeviceSelection::new(0, 1));
}

#[test]
fn zero_platforms_provide_nothing() {
    let service = ResourceService::new(FakeDriver::new(vec![]));

    assert_eq!(service.num_platforms(), 0);
    assert!(service.context().is_none());
    assert!(service.command_queue().is_none());
    assert!(service.current_device().is_none());
    assert!(service.current_platform().is_none());
    assert!(!service.can_provide_context());
    assert!(!service.is_format_supported(ImageFormat::new(
        ChannelOrder::Rgba,
        ChannelType::Float
    )));
    assert_eq!(service.maximum_image_size(0, MemObjectType::Image2d), 0);
    assert!(service.specify_platform_and_device(0, 0, false).is_err());
}

#[test]
fn context_is_created_once_per_pair() {
    let service = ResourceService::new(amd_platform());

    let first = service.context().unwrap();
    let second = service.context().unwrap();
    assert_eq!(first, second);
    assert_eq!(service.driver().contexts_created(), 1);

    service.specify_platform_and_device(0, 1, false).unwrap();
    let other = service.context().unwrap();
    assert_ne!(first, other);

    service.specify_platform_and_device(0, 0, false).unwrap();
    assert_eq!(service.context().unwrap(), first);
    assert_eq!(service.driver().contexts_created(), 2);
}

#[test]
fn queue_belongs_to_the_served_context() {
    let service = ResourceService::new(amd_platform());

    for device in 0..2 {
        service.specify_platform_and_device(0, device, false).unwrap();
        let queue = service.command_queue().unwrap();
        let context = service.context().unwrap();
        assert_eq!(service.driver().queue_context(&queue).unwrap(), context);
    }
}

#[test]
fn stale_queue_is_not_handed_out() {
    let service = ResourceService::new(amd_platform());
    assert!(service.command_queue().is_some());

    service.driver().faults().stale_queues = true;
    assert!(service.command_queue().is_none());

    service.driver().faults().stale_queues = false;
    service.driver().faults().fail_queue_info = true;
    assert!(service.command_queue().is_none());

    service.driver().faults().fail_queue_info = false;
    assert!(service.command_queue().is_some());
    assert_eq!(service.driver().contexts_created(), 1);
}

#[test]
fn concurrent_first_use_creates_one_context() {
    let service = ResourceService::new(amd_platform());

    let contexts: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| service.context()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });

    assert_eq!(service.driver().contexts_created(), 1);
    assert!(contexts.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn configured_device_overrides_vendor_preference() {
    let config = ServiceConfig {
        preferred_vendor: VendorPreference::Amd,
        device: Some(DeviceSelection::new(0, 1)),
        ..ServiceConfig::default()
    };
    let service = ResourceService::with_config(amd_platform(), config);
    assert_eq!(service.active_selection(), DeviceSelection::new(0, 1));
    assert_eq!(service.current_device(), Some(service.driver().device_id(0, 1)));
}

#[test]
fn configured_device_out_of_range_is_ignored() {
    let config = ServiceConfig {
        device: Some(DeviceSelection::new(3, 0)),
        ..ServiceConfig::default()
    };
    let service = ResourceService::with_config(amd_platform(), config);
    assert_eq!(service.active_selection(), DeviceSelection::new(0, 0));
}

#[test]
fn gl_sharing_requires_the_extension() {
    let service = with_gl(ResourceService::new(gl_platform()));

    service.specify_platform_and_device(0, 1, true).unwrap();
    assert!(!service.is_gl_sharing_enabled());
    assert!(service.context().is_some());
    assert_eq!(service.driver().shared_contexts_created(), 0);

    service.specify_platform_and_device(0, 0, true).unwrap();
    assert!(service.is_gl_sharing_enabled());
    assert!(service.context().is_some());
    assert_eq!(service.driver().shared_contexts_created(), 1);
}

#[test]
fn gl_sharing_from_config() {
    let config = ServiceConfig {
        share_gl: true,
        ..ServiceConfig::default()
    };
    let service = with_gl(ResourceService::with_config(gl_platform(), config));

    assert!(service.is_gl_sharing_enabled());
    assert!(service.context().is_some());
    assert_eq!(service.driver().shared_contexts_created(), 1);
}

#[test]
fn format_queries_use_the_active_device() {
    let service = ResourceService::new(amd_platform());

    let rgba_float = ImageFormat::new(ChannelOrder::Rgba, ChannelType::Float);
    let r_unorm = ImageFormat::new(ChannelOrder::R, ChannelType::UnormInt8);
    let rgba_unorm = ImageFormat::new(ChannelOrder::Rgba, ChannelType::UnormInt8);
    let rg_half = ImageFormat::new(ChannelOrder::Rg, ChannelType::HalfFloat);

    assert!(service.is_format_supported(rgba_float));
    assert!(!service.is_format_supported(r_unorm));
    assert_eq!(
        service.format_support(r_unorm, MemObjectType::Image2d),
        FormatSupport::Fallback(rgba_unorm)
    );
    assert_eq!(
        service.format_support(rg_half, MemObjectType::Image2d),
        FormatSupport::Unsupported
    );
    assert_eq!(
        service.format_support(rgba_unorm, MemObjectType::Image3d),
        FormatSupport::Unsupported
    );
}

#[test]
fn maximum_image_size_per_dimension() {
    let service = ResourceService::new(amd_platform());
    assert!(service.context().is_some());

    assert_eq!(service.maximum_image_size(0, MemObjectType::Image2d), 16384);
    assert_eq!(service.maximum_image_size(1, MemObjectType::Image2d), 8192);
    assert_eq!(service.maximum_image_size(2, MemObjectType::Image2d), 0);
    assert_eq!(service.maximum_image_size(0, MemObjectType::Image3d), 2048);
    assert_eq!(service.maximum_image_size(1, MemObjectType::Image3d), 1024);
    assert_eq!(service.maximum_image_size(2, MemObjectType::Image3d), 512);
    assert_eq!(service.maximum_image_size(3, MemObjectType::Image3d), 0);
}

#[test]
fn failed_creation_is_reported_and_retried() {
    let service = ResourceService::new(amd_platform());
    service.driver().faults().fail_context_creation = true;

    assert!(service.context().is_none());
    assert!(!service.can_provide_context());

    service.driver().faults().fail_context_creation = false;
    assert!(service.context().is_some());
    assert!(service.can_provide_context());
}

#[test]
fn availability_queries_do_not_create_contexts() {
    let service = ResourceService::new(amd_platform());

    assert!(!service.can_provide_context());
    assert_eq!(service.maximum_image_size(0, MemObjectType::Image2d), 0);
    assert_eq!(service.maximum_image_size(2, MemObjectType::Image3d), 0);
    service.log_context_info();
    assert_eq!(service.driver().contexts_created(), 0);

    assert!(service.context().is_some());
    assert!(service.can_provide_context());
    assert_eq!(service.maximum_image_size(0, MemObjectType::Image2d), 16384);
    assert_eq!(service.driver().contexts_created(), 1);
}

#[test]
fn image_size_follows_the_active_pair() {
    let service = ResourceService::new(amd_platform());
    assert!(service.context().is_some());

    service.specify_platform_and_device(0, 1, false).unwrap();
    assert_eq!(service.maximum_image_size(0, MemObjectType::Image2d), 0);
    assert_eq!(service.driver().contexts_created(), 1);
}
