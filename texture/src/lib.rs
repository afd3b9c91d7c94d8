//! # RedLilium Texture
//!
//! Lifetime, usage-state tracking and data upload for GPU 2D textures.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GpuTexture`] - Owns a native texture resource, its views and its usage state
//! - [`GpuContext`] - Device, descriptor heaps, upload ring buffer and retirement queue,
//!   passed explicitly to every texture operation
//! - [`GpuDevice`] - Trait the context drives the graphics API through
//! - Multiple backend support: Vulkan and Dummy (for testing)
//!
//! ## Uploads
//!
//! Pixel uploads smaller than the stream buffer are written into the shared
//! [`UploadRingBuffer`] and copied from there. Larger uploads go through a
//! temporary [`StagingTexture`]. Either way the texture is moved to
//! [`ResourceState::CopyDest`] for the copy and back afterwards.
//!
//! ## Destruction
//!
//! Textures are released explicitly. Deferred destruction hands the resource
//! and views to the context's [`RetirementQueue`], which frees them once the
//! device reports the fence current at destruction time as complete.
//!
//! ## Example
//!
//! ```
//! use redlilium_texture::{
//!     DummyDevice, GpuContext, GpuTexture, NativeFormat, ResourceDesc, TextureConfig,
//!     ViewFormats,
//! };
//!
//! let mut ctx = GpuContext::new(DummyDevice::new(), TextureConfig::default()).unwrap();
//! let mut texture = GpuTexture::new();
//! texture
//!     .create(
//!         &mut ctx,
//!         &ResourceDesc::new_2d(4, 4, NativeFormat::R8Unorm),
//!         &ViewFormats::sampled(NativeFormat::R8Unorm),
//!     )
//!     .unwrap();
//! texture.load_data(&mut ctx, 0, 0, 4, 4, &[0xFF; 16], 4).unwrap();
//! texture.destroy(&mut ctx, true);
//! ctx.submit(false);
//! ctx.shutdown();
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod retirement;
pub mod staging;
pub mod stream_buffer;
pub mod texture;
pub mod types;
pub mod upload;

// Re-export main types for convenience
#[cfg(feature = "dummy")]
pub use backend::{DummyCommand, DummyDevice};
#[cfg(feature = "vulkan-backend")]
pub use backend::VulkanDevice;
pub use config::TextureConfig;
pub use context::{GpuContext, UploadStats};
pub use descriptor::{
    DescriptorHandle, DescriptorHeap, DescriptorHeaps, DescriptorKind, DescriptorSet, ViewDesc,
    ViewDimension, ViewFormats,
};
pub use device::{BufferTextureCopy, GpuDevice, GpuResource, HostBuffer, HostMemory, ResourceId};
pub use error::TextureError;
pub use retirement::{Retired, RetirementQueue};
pub use staging::StagingTexture;
pub use stream_buffer::UploadRingBuffer;
pub use texture::{AdoptError, GpuTexture};
pub use types::{NativeFormat, Rect, ResourceDesc, ResourceFlags, ResourceState, TextureFormat};
pub use upload::UploadLayout;

/// Texture library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the texture subsystem.
///
/// Only logs the version; contexts carry all other state.
pub fn init() {
    log::info!("RedLilium Texture v{} initialized", VERSION);
}
