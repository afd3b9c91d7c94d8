//! Native objects behind Vulkan resource handles.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::types::ResourceDesc;

/// A native Vulkan resource owned by a [`VulkanDevice`](super::VulkanDevice).
pub enum VulkanResource {
    /// A 2D image.
    Image {
        image: vk::Image,
        /// `None` for imported images whose memory belongs to someone else.
        allocation: Option<Allocation>,
        desc: ResourceDesc,
    },
    /// A host-visible buffer.
    Buffer {
        buffer: vk::Buffer,
        allocation: Option<Allocation>,
        size: u64,
    },
}

impl VulkanResource {
    /// Description of an image resource.
    pub fn image_desc(&self) -> Option<ResourceDesc> {
        match self {
            Self::Image { desc, .. } => Some(*desc),
            Self::Buffer { .. } => None,
        }
    }

    /// Destroy the native objects and free their memory.
    ///
    /// Imported images are forgotten, not destroyed.
    ///
    /// # Safety
    ///
    /// The GPU must no longer use this resource.
    pub unsafe fn destroy(self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        match self {
            Self::Image {
                image,
                allocation: Some(allocation),
                ..
            } => {
                if let Err(e) = allocator.lock().free(allocation) {
                    log::error!("Failed to free image allocation: {}", e);
                }
                unsafe { device.destroy_image(image, None) };
            }
            Self::Image {
                allocation: None, ..
            } => {}
            Self::Buffer {
                buffer, allocation, ..
            } => {
                if let Some(allocation) = allocation
                    && let Err(e) = allocator.lock().free(allocation)
                {
                    log::error!("Failed to free buffer allocation: {}", e);
                }
                unsafe { device.destroy_buffer(buffer, None) };
            }
        }
    }
}

impl std::fmt::Debug for VulkanResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image {
                image,
                allocation,
                desc,
            } => f
                .debug_struct("Image")
                .field("image", image)
                .field("imported", &allocation.is_none())
                .field("desc", desc)
                .finish(),
            Self::Buffer { buffer, size, .. } => f
                .debug_struct("Buffer")
                .field("buffer", buffer)
                .field("size", size)
                .finish(),
        }
    }
}
