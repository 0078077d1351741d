use hashbrown::HashSet;
use tracing::{debug, error};

use crate::driver::Driver;

/// Component layout of an image element.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter,
)]
pub enum ChannelOrder {
    R,
    A,
    Rg,
    Ra,
    Rgb,
    Rgba,
    Bgra,
    Argb,
    Intensity,
    Luminance,
}

impl ChannelOrder {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelOrder::R
            | ChannelOrder::A
            | ChannelOrder::Intensity
            | ChannelOrder::Luminance => 1,
            ChannelOrder::Rg | ChannelOrder::Ra => 2,
            ChannelOrder::Rgb => 3,
            ChannelOrder::Rgba | ChannelOrder::Bgra | ChannelOrder::Argb => 4,
        }
    }

    /// Wider orders able to carry this one, nearest first.
    fn widenings(self) -> &'static [ChannelOrder] {
        match self.channel_count() {
            1 => &[ChannelOrder::Rg, ChannelOrder::Rgba],
            _ if self == ChannelOrder::Rgba => &[],
            _ => &[ChannelOrder::Rgba],
        }
    }
}

/// Storage type of a single channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter,
)]
pub enum ChannelType {
    SnormInt8,
    SnormInt16,
    UnormInt8,
    UnormInt16,
    UnormShort565,
    UnormShort555,
    UnormInt101010,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    HalfFloat,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub channel_type: ChannelType,
}

impl ImageFormat {
    pub const fn new(order: ChannelOrder, channel_type: ChannelType) -> Self {
        Self {
            order,
            channel_type,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.order, self.channel_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum MemObjectType {
    Image2d,
    Image3d,
}

/// Answer to a format query against a device's capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSupport {
    Supported,
    /// The exact format is unsupported, this one is the nearest that is.
    Fallback(ImageFormat),
    Unsupported,
}

impl FormatSupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, FormatSupport::Supported)
    }
}

/// Image formats a context's device can create, per image dimensionality.
#[derive(Debug, Clone, Default)]
pub struct ImageFormatCapability {
    image2d: HashSet<ImageFormat>,
    image3d: HashSet<ImageFormat>,
}

impl ImageFormatCapability {
    pub fn new(
        image2d: impl IntoIterator<Item = ImageFormat>,
        image3d: impl IntoIterator<Item = ImageFormat>,
    ) -> Self {
        Self {
            image2d: image2d.into_iter().collect(),
            image3d: image3d.into_iter().collect(),
        }
    }

    /// Queries both format tables of `context`. A failed query leaves the
    /// corresponding table empty.
    pub fn query<D: Driver>(driver: &D, context: &D::Context) -> Self {
        let query = |object_type: MemObjectType| -> HashSet<ImageFormat> {
            match driver.supported_image_formats(context, object_type) {
                Ok(formats) => formats.into_iter().collect(),
                Err(err) => {
                    error!("Failed to query supported {} formats: {}", object_type, err);
                    HashSet::new()
                }
            }
        };

        let capability = Self {
            image2d: query(MemObjectType::Image2d),
            image3d: query(MemObjectType::Image3d),
        };
        debug!(
            "Context supports {} 2D and {} 3D image formats",
            capability.image2d.len(),
            capability.image3d.len()
        );
        capability
    }

    fn table(&self, object_type: MemObjectType) -> &HashSet<ImageFormat> {
        match object_type {
            MemObjectType::Image2d => &self.image2d,
            MemObjectType::Image3d => &self.image3d,
        }
    }

    pub fn is_supported(&self, format: ImageFormat, object_type: MemObjectType) -> bool {
        self.table(object_type).contains(&format)
    }

    /// Exact match, else the nearest wider channel order with the same
    /// channel type.
    pub fn support(&self, format: ImageFormat, object_type: MemObjectType) -> FormatSupport {
        let table = self.table(object_type);
        if table.contains(&format) {
            return FormatSupport::Supported;
        }

        format
            .order
            .widenings()
            .iter()
            .map(|&order| ImageFormat::new(order, format.channel_type))
            .find(|candidate| table.contains(candidate))
            .map_or(FormatSupport::Unsupported, FormatSupport::Fallback)
    }

    pub fn formats(&self, object_type: MemObjectType) -> impl Iterator<Item = &ImageFormat> {
        self.table(object_type).iter()
    }

    pub fn len(&self, object_type: MemObjectType) -> usize {
        self.table(object_type).len()
    }

    pub fn is_empty(&self) -> bool {
        self.image2d.is_empty() && self.image3d.is_empty()
    }
}
