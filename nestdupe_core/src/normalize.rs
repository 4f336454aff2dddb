use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use nestdupe_common::{ChannelSwap, ImageHashConfig, ScaleDimension};

/// Image normalization applied before fingerprinting.
pub trait ImageScaler: Send + Sync {
    fn scale(&self, image: DynamicImage) -> DynamicImage;
}

/// Resize, channel swap and optional grayscale conversion.
#[derive(Debug, Clone)]
pub struct ScaleImage {
    dimension: Option<ScaleDimension>,
    gray: bool,
    swap: ChannelSwap,
    filter: FilterType,
}

impl ScaleImage {
    pub fn new(dimension: Option<ScaleDimension>, gray: bool) -> Self {
        Self {
            dimension,
            gray,
            swap: ChannelSwap::Rgb,
            filter: FilterType::Triangle,
        }
    }

    /// Square bound of `size` pixels; 0 keeps the original size.
    pub fn from_config(config: &ImageHashConfig) -> Self {
        let dimension = (config.size > 0).then(|| ScaleDimension::bounded(config.size, config.size));
        Self::new(dimension, config.gray).with_swap(config.channel_swap)
    }

    pub fn with_swap(mut self, swap: ChannelSwap) -> Self {
        self.swap = swap;
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn is_gray(&self) -> bool {
        self.gray
    }
}

impl ImageScaler for ScaleImage {
    fn scale(&self, image: DynamicImage) -> DynamicImage {
        let mut image = image;

        if let Some(dimension) = &self.dimension {
            let current = image.dimensions();
            let (width, height) = dimension.transform(current);
            if (width, height) != current {
                image = image.resize_exact(width, height, self.filter);
            }
        }

        if !self.swap.is_identity() {
            let mut rgba = image.to_rgba8();
            for pixel in rgba.pixels_mut() {
                pixel.0 = self.swap.apply(pixel.0);
            }
            image = DynamicImage::ImageRgba8(rgba);
        }

        if self.gray {
            image = image.grayscale();
        }
        image
    }
}
