//! Conversions from texture types to Vulkan types.

use ash::vk;

use crate::types::{NativeFormat, ResourceFlags, ResourceState};

/// Convert a native format to a Vulkan format.
///
/// Typeless single-channel formats back depth textures that are also
/// sampled, so they map to the depth format of the same size.
pub fn convert_native_format(format: NativeFormat) -> vk::Format {
    match format {
        NativeFormat::Unknown => vk::Format::UNDEFINED,
        NativeFormat::Rgba8Typeless | NativeFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        NativeFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        NativeFormat::B5G6R5Unorm => vk::Format::B5G6R5_UNORM_PACK16,
        NativeFormat::B5G5R5A1Unorm => vk::Format::B5G5R5A1_UNORM_PACK16,
        NativeFormat::R8Unorm => vk::Format::R8_UNORM,
        NativeFormat::R16Unorm => vk::Format::R16_UNORM,
        NativeFormat::R16Typeless | NativeFormat::D16Unorm => vk::Format::D16_UNORM,
        NativeFormat::R32Float => vk::Format::R32_SFLOAT,
        NativeFormat::R32Typeless | NativeFormat::D32Float => vk::Format::D32_SFLOAT,
    }
}

/// Returns true if images of `format` are created with a depth format.
pub fn is_depth_image_format(format: NativeFormat) -> bool {
    matches!(
        format,
        NativeFormat::R16Typeless
            | NativeFormat::D16Unorm
            | NativeFormat::R32Typeless
            | NativeFormat::D32Float
    )
}

/// Aspect covered by barriers and copies on an image of `format`.
pub fn image_aspect(format: NativeFormat) -> vk::ImageAspectFlags {
    if is_depth_image_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Convert resource flags to Vulkan image usage.
pub fn convert_image_usage(flags: ResourceFlags) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC;

    if !flags.contains(ResourceFlags::DENY_SHADER_RESOURCE) {
        usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if flags.contains(ResourceFlags::ALLOW_RENDER_TARGET) {
        usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) {
        usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) {
        usage |= vk::ImageUsageFlags::STORAGE;
    }

    usage
}

/// Convert a sample count to Vulkan sample count flags.
pub fn convert_sample_count(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Image layout for a resource state.
pub fn state_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Common => vk::ImageLayout::GENERAL,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::PixelShaderResource | ResourceState::NonPixelShaderResource => {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Accesses performed in a resource state.
pub fn state_access_mask(state: ResourceState) -> vk::AccessFlags {
    match state {
        ResourceState::Common => vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ResourceState::RenderTarget => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ResourceState::DepthWrite => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ResourceState::DepthRead => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ResourceState::PixelShaderResource | ResourceState::NonPixelShaderResource => {
            vk::AccessFlags::SHADER_READ
        }
        ResourceState::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
        ResourceState::CopySource => vk::AccessFlags::TRANSFER_READ,
        ResourceState::Present => vk::AccessFlags::empty(),
    }
}

/// Pipeline stages that access a resource in a state.
pub fn state_stage(state: ResourceState) -> vk::PipelineStageFlags {
    match state {
        ResourceState::Common => vk::PipelineStageFlags::ALL_COMMANDS,
        ResourceState::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ResourceState::DepthWrite | ResourceState::DepthRead => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        ResourceState::PixelShaderResource => vk::PipelineStageFlags::FRAGMENT_SHADER,
        ResourceState::NonPixelShaderResource => {
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER
        }
        ResourceState::CopyDest | ResourceState::CopySource => vk::PipelineStageFlags::TRANSFER,
        ResourceState::Present => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_conversion() {
        assert_eq!(
            convert_native_format(NativeFormat::Rgba8Unorm),
            vk::Format::R8G8B8A8_UNORM
        );
        assert_eq!(
            convert_native_format(NativeFormat::B5G6R5Unorm),
            vk::Format::B5G6R5_UNORM_PACK16
        );
        assert_eq!(
            convert_native_format(NativeFormat::R16Typeless),
            vk::Format::D16_UNORM
        );
        assert_eq!(image_aspect(NativeFormat::D16Unorm), vk::ImageAspectFlags::DEPTH);
        assert_eq!(image_aspect(NativeFormat::R8Unorm), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_usage_conversion() {
        let usage = convert_image_usage(ResourceFlags::ALLOW_RENDER_TARGET);
        assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_DST));

        let usage = convert_image_usage(ResourceFlags::DENY_SHADER_RESOURCE);
        assert!(!usage.contains(vk::ImageUsageFlags::SAMPLED));
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(
            state_layout(ResourceState::CopyDest),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            state_layout(ResourceState::PixelShaderResource),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            state_access_mask(ResourceState::CopyDest),
            vk::AccessFlags::TRANSFER_WRITE
        );
        assert_eq!(
            state_stage(ResourceState::CopySource),
            vk::PipelineStageFlags::TRANSFER
        );
    }

    #[test]
    fn test_sample_count_conversion() {
        assert_eq!(convert_sample_count(1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(convert_sample_count(4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(convert_sample_count(3), vk::SampleCountFlags::TYPE_1);
    }
}
