//! Resource description types.

use bitflags::bitflags;

use super::NativeFormat;

bitflags! {
    /// Usage flags for a texture resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        /// Resource can be bound as a render target.
        const ALLOW_RENDER_TARGET = 1 << 0;
        /// Resource can be bound as a depth-stencil target.
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        /// Resource can be bound for unordered access.
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
        /// Resource is never sampled.
        const DENY_SHADER_RESOURCE = 1 << 3;
    }
}

impl Default for ResourceFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shape and format of a 2D texture resource, as read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of array layers.
    pub layers: u32,
    /// Number of mip levels.
    pub levels: u32,
    /// Samples per pixel.
    pub samples: u32,
    /// Native format the resource was created with.
    pub format: NativeFormat,
    /// Usage flags.
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    /// Create a single-layer, single-level, single-sample description.
    pub fn new_2d(width: u32, height: u32, format: NativeFormat) -> Self {
        Self {
            width,
            height,
            layers: 1,
            levels: 1,
            samples: 1,
            format,
            flags: ResourceFlags::empty(),
        }
    }

    /// Set the array layer count.
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Set the mip level count.
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    /// Set the sample count.
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Set usage flags.
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns true if the resource is multisampled.
    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }
}

/// A pixel rectangle within a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true if this rectangle lies entirely within `width` x `height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_builder() {
        let desc = ResourceDesc::new_2d(64, 32, NativeFormat::Rgba8Unorm)
            .with_layers(2)
            .with_levels(3)
            .with_samples(4)
            .with_flags(ResourceFlags::ALLOW_RENDER_TARGET);

        assert_eq!(desc.width, 64);
        assert_eq!(desc.height, 32);
        assert_eq!(desc.layers, 2);
        assert_eq!(desc.levels, 3);
        assert!(desc.is_multisampled());
        assert!(desc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET));
    }

    #[test]
    fn test_rect_fits_within() {
        assert!(Rect::new(0, 0, 16, 16).fits_within(16, 16));
        assert!(Rect::new(8, 8, 8, 8).fits_within(16, 16));
        assert!(!Rect::new(8, 0, 9, 1).fits_within(16, 16));
        assert!(!Rect::new(u32::MAX, 0, 2, 1).fits_within(16, 16));
    }
}
