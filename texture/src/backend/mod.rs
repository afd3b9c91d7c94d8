//! Device backends.
//!
//! # Available Backends
//!
//! - `dummy` (default): records commands in memory and simulates fences, for
//!   tests and tooling that run without a GPU
//! - `vulkan-backend` (default): native Vulkan through ash and gpu-allocator
//!
//! Each backend implements [`GpuDevice`](crate::GpuDevice).

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

#[cfg(feature = "dummy")]
pub use dummy::{DummyCommand, DummyDevice};

#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanDevice;
