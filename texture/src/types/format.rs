//! Logical pixel formats and their native encodings.

/// Logical pixel format of a texture.
///
/// Independent of how a particular graphics API encodes it; see
/// [`NativeFormat`] for the encoding handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// No format, or a native format with no logical counterpart.
    #[default]
    Unknown,
    /// 8-bit RGBA channels.
    Rgba8,
    /// 8-bit BGRA channels.
    Bgra8,
    /// Packed 5-6-5 RGB.
    Rgb565,
    /// Packed 5-5-5-1 RGBA.
    Rgba5551,
    /// 8-bit red channel.
    R8,
    /// 16-bit depth.
    D16,
}

/// Native format encoding used when talking to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum NativeFormat {
    /// No format.
    #[default]
    Unknown,
    /// 8-bit RGBA channels, typeless.
    Rgba8Typeless,
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// Packed 5-6-5, unsigned normalized.
    B5G6R5Unorm,
    /// Packed 5-5-5-1, unsigned normalized.
    B5G5R5A1Unorm,
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 16-bit single channel, typeless.
    R16Typeless,
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 16-bit depth.
    D16Unorm,
    /// 32-bit single channel, typeless.
    R32Typeless,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit depth, float.
    D32Float,
}

impl TextureFormat {
    /// Every logical format except [`TextureFormat::Unknown`].
    pub const ALL: [TextureFormat; 6] = [
        Self::Rgba8,
        Self::Bgra8,
        Self::Rgb565,
        Self::Rgba5551,
        Self::R8,
        Self::D16,
    ];

    /// Native encoding for this format.
    pub fn native(self) -> NativeFormat {
        match self {
            Self::Unknown => NativeFormat::Unknown,
            Self::Rgba8 => NativeFormat::Rgba8Unorm,
            Self::Bgra8 => NativeFormat::Bgra8Unorm,
            Self::Rgb565 => NativeFormat::B5G6R5Unorm,
            Self::Rgba5551 => NativeFormat::B5G5R5A1Unorm,
            Self::R8 => NativeFormat::R8Unorm,
            Self::D16 => NativeFormat::D16Unorm,
        }
    }

    /// Logical format for a native encoding, or `Unknown` when there is none.
    pub fn from_native(native: NativeFormat) -> Self {
        Self::ALL
            .into_iter()
            .find(|format| format.native() == native)
            .unwrap_or(Self::Unknown)
    }

    /// Size of one pixel in bytes.
    pub fn pixel_size(self) -> u32 {
        self.native().bytes_per_pixel()
    }

    /// Returns true if this is a depth format.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D16)
    }
}

impl NativeFormat {
    /// Size of one pixel in bytes. Zero for `Unknown`.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm => 1,
            Self::B5G6R5Unorm
            | Self::B5G5R5A1Unorm
            | Self::R16Typeless
            | Self::R16Unorm
            | Self::D16Unorm => 2,
            Self::Rgba8Typeless
            | Self::Rgba8Unorm
            | Self::Bgra8Unorm
            | Self::R32Typeless
            | Self::R32Float
            | Self::D32Float => 4,
        }
    }

    /// Returns true if this encoding is a depth format.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D16Unorm | Self::D32Float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_lookup_is_inverse() {
        for format in TextureFormat::ALL {
            assert_eq!(TextureFormat::from_native(format.native()), format);
        }
        assert_eq!(
            TextureFormat::from_native(NativeFormat::Unknown),
            TextureFormat::Unknown
        );
    }

    #[test]
    fn test_typeless_has_no_logical_format() {
        assert_eq!(
            TextureFormat::from_native(NativeFormat::R16Typeless),
            TextureFormat::Unknown
        );
        assert_eq!(
            TextureFormat::from_native(NativeFormat::R32Float),
            TextureFormat::Unknown
        );
    }

    #[test]
    fn test_pixel_size() {
        assert_eq!(TextureFormat::Rgba8.pixel_size(), 4);
        assert_eq!(TextureFormat::Rgb565.pixel_size(), 2);
        assert_eq!(TextureFormat::R8.pixel_size(), 1);
        assert_eq!(TextureFormat::D16.pixel_size(), 2);
        assert_eq!(TextureFormat::Unknown.pixel_size(), 0);
    }

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::D16.is_depth());
        assert!(!TextureFormat::Rgba8.is_depth());
        assert!(NativeFormat::D32Float.is_depth());
        assert!(!NativeFormat::R16Typeless.is_depth());
    }
}
