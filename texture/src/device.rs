//! Device contract used by the texture core.
//!
//! The texture core never talks to a graphics API directly. Everything it
//! needs from the device (allocation, view materialization, barrier and copy
//! recording, submission and fence tracking) goes through [`GpuDevice`].
//!
//! Resources cross this boundary as [`GpuResource`] handles. A handle is the
//! sole owner of its native resource: it is not `Clone`, moving it transfers
//! ownership, and the native object is only freed by handing the handle back
//! to [`GpuDevice::destroy_resource`] (usually through the retirement queue of
//! a [`GpuContext`](crate::GpuContext)).

use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::descriptor::{DescriptorHandle, ViewDesc};
use crate::error::TextureError;
use crate::types::{NativeFormat, Rect, ResourceDesc, ResourceState};

/// Identifier of a native resource within one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wrap a raw backend identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw backend identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Exclusive-ownership handle to a native GPU resource.
///
/// Dropping a handle does not free the native resource; it logs a warning
/// and leaks it. Release it through [`GpuDevice::destroy_resource`] or a
/// context's deferred destruction path instead.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuResource {
    id: ResourceId,
}

impl GpuResource {
    /// Create a handle owning the resource identified by `id`.
    ///
    /// Backends call this once per native resource they create.
    pub fn new(id: ResourceId) -> Self {
        Self { id }
    }

    /// Identifier of the owned resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Give up ownership and return the identifier without the leak warning.
    ///
    /// Backends call this when they free the native resource.
    pub fn into_id(self) -> ResourceId {
        let this = ManuallyDrop::new(self);
        this.id
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        log::warn!(
            "GpuResource {:?} dropped without being released, native resource leaked",
            self.id
        );
    }
}

/// Host-visible memory backing an upload buffer.
pub enum HostMemory {
    /// Memory owned on the heap (used by devices without real GPU memory).
    Owned(Box<[u8]>),
    /// Persistently mapped device memory.
    Mapped {
        /// Start of the mapping.
        ptr: NonNull<u8>,
        /// Length of the mapping in bytes.
        len: usize,
    },
}

// SAFETY: a mapped range is only ever accessed through `&`/`&mut HostMemory`,
// so moving it to another thread moves the exclusive access along with it.
unsafe impl Send for HostMemory {}

impl HostMemory {
    /// Allocate zeroed heap memory.
    pub fn zeroed(len: usize) -> Self {
        Self::Owned(vec![0u8; len].into_boxed_slice())
    }

    /// Wrap a persistently mapped range.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes of host-visible memory that stay mapped
    /// and are not accessed through any other path for the lifetime of the
    /// returned value.
    pub unsafe fn mapped(ptr: NonNull<u8>, len: usize) -> Self {
        Self::Mapped { ptr, len }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(bytes) => bytes.len(),
            Self::Mapped { len, .. } => *len,
        }
    }

    /// Returns true if the memory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the memory as bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => &bytes[..],
            // SAFETY: guaranteed valid and unaliased by the contract of `mapped`.
            Self::Mapped { ptr, len } => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), *len) },
        }
    }

    /// View the memory as mutable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(bytes) => &mut bytes[..],
            // SAFETY: guaranteed valid and unaliased by the contract of `mapped`.
            Self::Mapped { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

impl fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(bytes) => f.debug_tuple("Owned").field(&bytes.len()).finish(),
            Self::Mapped { ptr, len } => f
                .debug_struct("Mapped")
                .field("ptr", ptr)
                .field("len", len)
                .finish(),
        }
    }
}

/// A host-visible buffer: the native buffer plus its CPU mapping.
#[derive(Debug)]
pub struct HostBuffer {
    /// The native buffer resource.
    pub resource: GpuResource,
    /// Host mapping of the whole buffer.
    pub memory: HostMemory,
}

/// A buffer-to-texture copy to be recorded into the active command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopy {
    /// Source buffer.
    pub source: ResourceId,
    /// Byte offset of the first row in the source buffer.
    pub source_offset: u64,
    /// Distance in bytes between rows in the source buffer.
    pub row_pitch: u32,
    /// Pixel encoding of the source rows.
    pub format: NativeFormat,
    /// Destination texture.
    pub destination: ResourceId,
    /// Destination region; its size is also the size of the source footprint.
    pub region: Rect,
}

/// Device and command-stream services used by textures.
///
/// All recording methods append to the device's single active command
/// stream. Commands execute on the GPU in recording order once submitted.
pub trait GpuDevice {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Allocate a new device-local 2D texture in `initial_state`.
    fn create_texture(
        &mut self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<GpuResource, TextureError>;

    /// Read back the description of a live texture.
    ///
    /// Returns `None` if the handle does not name a texture on this device.
    fn resource_desc(&self, resource: &GpuResource) -> Option<ResourceDesc>;

    /// Allocate a persistently mapped, host-writable buffer of `size` bytes.
    fn create_host_buffer(&mut self, size: u64) -> Result<HostBuffer, TextureError>;

    /// Materialize a view of `resource` at descriptor `slot`.
    fn create_view(
        &mut self,
        resource: &GpuResource,
        view: &ViewDesc,
        slot: &DescriptorHandle,
    ) -> Result<(), TextureError>;

    /// Release whatever native object backs the view at `slot`.
    ///
    /// Called just before the slot returns to its heap.
    fn release_view(&mut self, _slot: &DescriptorHandle) {}

    /// Record a state transition barrier.
    fn record_barrier(
        &mut self,
        resource: &GpuResource,
        before: ResourceState,
        after: ResourceState,
    );

    /// Record a buffer-to-texture copy.
    fn record_copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy);

    /// Submit the active command stream and open a new one.
    ///
    /// Returns the fence value the submitted work signals on completion. When
    /// `wait_for_completion` is set the call returns only after that value
    /// has been reached.
    fn submit(&mut self, wait_for_completion: bool) -> u64;

    /// Fence value that the command stream currently being recorded will signal.
    fn current_fence_value(&self) -> u64;

    /// Highest fence value the GPU has confirmed complete.
    fn completed_fence_value(&mut self) -> u64;

    /// Block until all submitted work has completed.
    fn wait_idle(&mut self);

    /// Free a native resource immediately.
    ///
    /// Commands already recorded into the active stream that reference the
    /// resource must still execute correctly; backends whose native API
    /// cannot guarantee this keep the object alive until that stream retires.
    fn destroy_resource(&mut self, resource: GpuResource);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_id_releases_handle() {
        let resource = GpuResource::new(ResourceId::new(7));
        assert_eq!(resource.id().raw(), 7);
        assert_eq!(resource.into_id(), ResourceId::new(7));
    }

    #[test]
    fn test_owned_host_memory() {
        let mut memory = HostMemory::zeroed(16);
        assert_eq!(memory.len(), 16);
        assert!(!memory.is_empty());
        memory.as_mut_slice()[3] = 0x5A;
        assert_eq!(memory.as_slice()[3], 0x5A);
        assert!(format!("{memory:?}").contains("Owned"));
    }

    #[test]
    fn test_mapped_host_memory() {
        let mut backing = vec![0u8; 8];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        // SAFETY: `backing` outlives `memory` and is not touched while it is alive.
        let mut memory = unsafe { HostMemory::mapped(ptr, backing.len()) };
        memory.as_mut_slice().fill(0x11);
        assert_eq!(memory.as_slice(), &[0x11; 8]);
        drop(memory);
        assert_eq!(backing, vec![0x11; 8]);
    }
}
