//! Dummy device for testing and development.
//!
//! This device doesn't talk to a GPU. Resources are bookkeeping entries,
//! host buffers are heap memory, recorded commands are kept in a list, and
//! submissions complete immediately unless completion is held back with
//! [`DummyDevice::set_auto_complete`].

use std::collections::HashMap;

use crate::descriptor::{DescriptorHandle, DescriptorKind, ViewDesc};
use crate::device::{
    BufferTextureCopy, GpuDevice, GpuResource, HostBuffer, HostMemory, ResourceId,
};
use crate::error::TextureError;
use crate::types::{ResourceDesc, ResourceState};

/// A command recorded into the dummy command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCommand {
    /// A state transition barrier.
    Barrier {
        /// Transitioned resource.
        resource: ResourceId,
        /// State before the barrier.
        before: ResourceState,
        /// State after the barrier.
        after: ResourceState,
    },
    /// A buffer-to-texture copy.
    CopyBufferToTexture(BufferTextureCopy),
}

#[derive(Debug)]
enum DummyResource {
    Texture {
        desc: ResourceDesc,
        initial_state: ResourceState,
    },
    Buffer {
        size: u64,
    },
}

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    next_id: u64,
    resources: HashMap<ResourceId, DummyResource>,
    views: HashMap<(DescriptorKind, u32), (ResourceId, ViewDesc)>,
    commands: Vec<DummyCommand>,
    submissions: Vec<(u64, usize)>,
    current_fence: u64,
    completed_fence: u64,
    auto_complete: bool,
    failing_allocations: u32,
    failing_views: u32,
    destroyed_count: u64,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            resources: HashMap::new(),
            views: HashMap::new(),
            commands: Vec::new(),
            submissions: Vec::new(),
            current_fence: 1,
            completed_fence: 0,
            auto_complete: true,
            failing_allocations: 0,
            failing_views: 0,
            destroyed_count: 0,
        }
    }

    /// Choose whether submissions complete immediately.
    ///
    /// When disabled, work completes only through [`complete_all`](Self::complete_all),
    /// a waiting submission, or `wait_idle`.
    pub fn set_auto_complete(&mut self, auto_complete: bool) {
        self.auto_complete = auto_complete;
    }

    /// Mark all submitted work complete.
    pub fn complete_all(&mut self) {
        self.completed_fence = self.current_fence - 1;
    }

    /// Make the next `count` resource or buffer allocations fail.
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.failing_allocations = count;
    }

    /// Make the next `count` view creations fail.
    pub fn fail_next_views(&mut self, count: u32) {
        self.failing_views = count;
    }

    /// Every command recorded so far, across submissions.
    pub fn commands(&self) -> &[DummyCommand] {
        &self.commands
    }

    /// Number of barriers recorded so far.
    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DummyCommand::Barrier { .. }))
            .count()
    }

    /// Buffer-to-texture copies recorded so far.
    pub fn copies(&self) -> Vec<&BufferTextureCopy> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DummyCommand::CopyBufferToTexture(copy) => Some(copy),
                DummyCommand::Barrier { .. } => None,
            })
            .collect()
    }

    /// Number of submissions so far.
    pub fn submit_count(&self) -> usize {
        self.submissions.len()
    }

    /// Number of live textures.
    pub fn live_texture_count(&self) -> usize {
        self.resources
            .values()
            .filter(|resource| matches!(resource, DummyResource::Texture { .. }))
            .count()
    }

    /// Number of live host buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.resources
            .values()
            .filter(|resource| matches!(resource, DummyResource::Buffer { .. }))
            .count()
    }

    /// Number of resources destroyed so far.
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed_count
    }

    /// Returns true if `id` names a live resource.
    pub fn is_live(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// State a texture was created in.
    pub fn initial_state(&self, id: ResourceId) -> Option<ResourceState> {
        match self.resources.get(&id) {
            Some(DummyResource::Texture { initial_state, .. }) => Some(*initial_state),
            _ => None,
        }
    }

    /// Size of a live host buffer.
    pub fn buffer_size(&self, id: ResourceId) -> Option<u64> {
        match self.resources.get(&id) {
            Some(DummyResource::Buffer { size }) => Some(*size),
            _ => None,
        }
    }

    /// The view materialized at a descriptor slot.
    pub fn view(&self, slot: &DescriptorHandle) -> Option<&(ResourceId, ViewDesc)> {
        self.views.get(&(slot.kind(), slot.index()))
    }

    /// Number of materialized views.
    pub fn live_view_count(&self) -> usize {
        self.views.len()
    }

    fn allocate_id(&mut self) -> Result<ResourceId, TextureError> {
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            return Err(TextureError::AllocationFailure(
                "simulated allocation failure".to_string(),
            ));
        }
        let id = ResourceId::new(self.next_id);
        self.next_id += 1;
        Ok(id)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_texture(
        &mut self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<GpuResource, TextureError> {
        let id = self.allocate_id()?;
        log::trace!(
            "DummyDevice: creating texture {id:?} ({}x{}x{} {:?}, {initial_state:?})",
            desc.width,
            desc.height,
            desc.layers,
            desc.format
        );
        self.resources.insert(
            id,
            DummyResource::Texture {
                desc: *desc,
                initial_state,
            },
        );
        Ok(GpuResource::new(id))
    }

    fn resource_desc(&self, resource: &GpuResource) -> Option<ResourceDesc> {
        match self.resources.get(&resource.id()) {
            Some(DummyResource::Texture { desc, .. }) => Some(*desc),
            _ => None,
        }
    }

    fn create_host_buffer(&mut self, size: u64) -> Result<HostBuffer, TextureError> {
        let len = usize::try_from(size).map_err(|_| {
            TextureError::AllocationFailure(format!("host buffer of {size} bytes"))
        })?;
        let id = self.allocate_id()?;
        log::trace!("DummyDevice: creating host buffer {id:?} ({size} bytes)");
        self.resources.insert(id, DummyResource::Buffer { size });
        Ok(HostBuffer {
            resource: GpuResource::new(id),
            memory: HostMemory::zeroed(len),
        })
    }

    fn create_view(
        &mut self,
        resource: &GpuResource,
        view: &ViewDesc,
        slot: &DescriptorHandle,
    ) -> Result<(), TextureError> {
        if self.failing_views > 0 {
            self.failing_views -= 1;
            return Err(TextureError::AllocationFailure(
                "simulated view failure".to_string(),
            ));
        }
        log::trace!("DummyDevice: creating {view:?} of {:?} at {slot:?}", resource.id());
        self.views
            .insert((slot.kind(), slot.index()), (resource.id(), *view));
        Ok(())
    }

    fn release_view(&mut self, slot: &DescriptorHandle) {
        self.views.remove(&(slot.kind(), slot.index()));
    }

    fn record_barrier(
        &mut self,
        resource: &GpuResource,
        before: ResourceState,
        after: ResourceState,
    ) {
        log::trace!("DummyDevice: barrier {:?} {before:?} -> {after:?}", resource.id());
        self.commands.push(DummyCommand::Barrier {
            resource: resource.id(),
            before,
            after,
        });
    }

    fn record_copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy) {
        log::trace!(
            "DummyDevice: copy {:?}+{} -> {:?} {:?}",
            copy.source,
            copy.source_offset,
            copy.destination,
            copy.region
        );
        self.commands.push(DummyCommand::CopyBufferToTexture(*copy));
    }

    fn submit(&mut self, wait_for_completion: bool) -> u64 {
        let fence = self.current_fence;
        self.current_fence += 1;
        self.submissions.push((fence, self.commands.len()));
        if self.auto_complete || wait_for_completion {
            self.completed_fence = fence;
        }
        log::trace!("DummyDevice: submitted fence {fence} (wait: {wait_for_completion})");
        fence
    }

    fn current_fence_value(&self) -> u64 {
        self.current_fence
    }

    fn completed_fence_value(&mut self) -> u64 {
        self.completed_fence
    }

    fn wait_idle(&mut self) {
        self.complete_all();
    }

    fn destroy_resource(&mut self, resource: GpuResource) {
        let id = resource.into_id();
        if self.resources.remove(&id).is_none() {
            log::error!("DummyDevice: destroying unknown resource {id:?}");
            return;
        }
        log::trace!("DummyDevice: destroyed {id:?}");
        self.destroyed_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeFormat;

    #[test]
    fn test_dummy_device_name() {
        let device = DummyDevice::new();
        assert_eq!(device.name(), "Dummy");
    }

    #[test]
    fn test_resource_lifecycle() {
        let mut device = DummyDevice::new();
        let desc = ResourceDesc::new_2d(8, 8, NativeFormat::Rgba8Unorm);
        let texture = device
            .create_texture(&desc, ResourceState::CopyDest)
            .unwrap();

        assert_eq!(device.resource_desc(&texture), Some(desc));
        assert_eq!(
            device.initial_state(texture.id()),
            Some(ResourceState::CopyDest)
        );
        assert_eq!(device.live_texture_count(), 1);

        device.destroy_resource(texture);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.destroyed_count(), 1);
    }

    #[test]
    fn test_injected_allocation_failure() {
        let mut device = DummyDevice::new();
        device.fail_next_allocations(1);
        assert!(device.create_host_buffer(16).is_err());

        let buffer = device.create_host_buffer(16).unwrap();
        assert_eq!(buffer.memory.len(), 16);
        assert_eq!(device.buffer_size(buffer.resource.id()), Some(16));
        device.destroy_resource(buffer.resource);
    }

    #[test]
    fn test_fences() {
        let mut device = DummyDevice::new();
        assert_eq!(device.current_fence_value(), 1);
        assert_eq!(device.submit(false), 1);
        assert_eq!(device.completed_fence_value(), 1);

        device.set_auto_complete(false);
        assert_eq!(device.submit(false), 2);
        assert_eq!(device.completed_fence_value(), 1);
        assert_eq!(device.submit(true), 3);
        assert_eq!(device.completed_fence_value(), 3);

        device.submit(false);
        device.wait_idle();
        assert_eq!(device.completed_fence_value(), 4);
        assert_eq!(device.submit_count(), 4);
    }
}
