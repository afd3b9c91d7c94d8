//! Texture system configuration.

use crate::error::TextureError;

/// Parameters for a [`GpuContext`](crate::GpuContext).
///
/// # Example
///
/// ```
/// use redlilium_texture::TextureConfig;
///
/// let config = TextureConfig::new()
///     .with_stream_buffer_size(4 * 1024 * 1024)
///     .with_descriptor_heap_sizes(256, 16, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureConfig {
    /// Size of the shared upload ring buffer in bytes.
    pub stream_buffer_size: u32,
    /// Alignment of each uploaded row in bytes.
    pub pitch_alignment: u32,
    /// Alignment of each upload region within the ring buffer.
    pub placement_alignment: u32,
    /// Capacity of the sampled-view descriptor heap.
    pub shader_resource_descriptors: u32,
    /// Capacity of the render-target-view descriptor heap.
    pub render_target_descriptors: u32,
    /// Capacity of the depth-stencil-view descriptor heap.
    pub depth_stencil_descriptors: u32,
}

impl TextureConfig {
    /// Default stream buffer size (16 MiB).
    pub const DEFAULT_STREAM_BUFFER_SIZE: u32 = 16 * 1024 * 1024;
    /// Row pitch alignment required for buffer-to-texture copies.
    pub const DEFAULT_PITCH_ALIGNMENT: u32 = 256;
    /// Placement alignment for upload regions.
    pub const DEFAULT_PLACEMENT_ALIGNMENT: u32 = 512;

    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stream buffer size.
    pub fn with_stream_buffer_size(mut self, size: u32) -> Self {
        self.stream_buffer_size = size;
        self
    }

    /// Set the row pitch alignment.
    pub fn with_pitch_alignment(mut self, alignment: u32) -> Self {
        self.pitch_alignment = alignment;
        self
    }

    /// Set the upload placement alignment.
    pub fn with_placement_alignment(mut self, alignment: u32) -> Self {
        self.placement_alignment = alignment;
        self
    }

    /// Set the capacity of each descriptor heap.
    pub fn with_descriptor_heap_sizes(
        mut self,
        shader_resource: u32,
        render_target: u32,
        depth_stencil: u32,
    ) -> Self {
        self.shader_resource_descriptors = shader_resource;
        self.render_target_descriptors = render_target;
        self.depth_stencil_descriptors = depth_stencil;
        self
    }

    /// Check the configuration for values the context cannot work with.
    ///
    /// Descriptor heaps may be empty; every other size must be non-zero.
    pub fn validate(&self) -> Result<(), TextureError> {
        if self.stream_buffer_size == 0 {
            return Err(TextureError::InvalidParameter(
                "stream buffer size cannot be zero".to_string(),
            ));
        }
        for (name, alignment) in [
            ("pitch alignment", self.pitch_alignment),
            ("placement alignment", self.placement_alignment),
        ] {
            if !alignment.is_power_of_two() {
                return Err(TextureError::InvalidParameter(format!(
                    "{name} must be a power of 2, got {alignment}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            stream_buffer_size: Self::DEFAULT_STREAM_BUFFER_SIZE,
            pitch_alignment: Self::DEFAULT_PITCH_ALIGNMENT,
            placement_alignment: Self::DEFAULT_PLACEMENT_ALIGNMENT,
            shader_resource_descriptors: 1024,
            render_target_descriptors: 128,
            depth_stencil_descriptors: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TextureConfig::default();
        assert_eq!(config.stream_buffer_size, 16 * 1024 * 1024);
        assert_eq!(config.pitch_alignment, 256);
        assert_eq!(config.placement_alignment, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = TextureConfig::new()
            .with_stream_buffer_size(1024)
            .with_pitch_alignment(128)
            .with_placement_alignment(256)
            .with_descriptor_heap_sizes(4, 2, 1);

        assert_eq!(config.stream_buffer_size, 1024);
        assert_eq!(config.pitch_alignment, 128);
        assert_eq!(config.placement_alignment, 256);
        assert_eq!(config.shader_resource_descriptors, 4);
        assert_eq!(config.render_target_descriptors, 2);
        assert_eq!(config.depth_stencil_descriptors, 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(
            TextureConfig::new()
                .with_stream_buffer_size(0)
                .validate()
                .is_err()
        );
        assert!(
            TextureConfig::new()
                .with_pitch_alignment(100)
                .validate()
                .is_err()
        );
        assert!(
            TextureConfig::new()
                .with_placement_alignment(0)
                .validate()
                .is_err()
        );
        assert!(
            TextureConfig::new()
                .with_descriptor_heap_sizes(0, 0, 0)
                .validate()
                .is_ok()
        );
    }
}
