//! Vulkan device using ash and gpu-allocator.
//!
//! [`VulkanDevice`] wraps a logical device and queue created by the caller.
//! It owns a command pool, records every command into one primary command
//! buffer at a time, and tracks each submission with its own fence. Fence
//! values handed to the texture core are submission counters; a value is
//! complete once the fence of that submission has signalled.
//!
//! Vulkan forbids destroying a buffer or image that a pending command buffer
//! still references. Resources destroyed while the command buffer being
//! recorded references them are parked and freed when that submission
//! completes.

pub mod conversion;
mod resource;

use std::collections::{HashMap, HashSet, VecDeque};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::descriptor::{DescriptorHandle, DescriptorKind, ViewDesc, ViewDimension};
use crate::device::{
    BufferTextureCopy, GpuDevice, GpuResource, HostBuffer, HostMemory, ResourceId,
};
use crate::error::TextureError;
use crate::types::{ResourceDesc, ResourceState};

use self::conversion::{
    convert_image_usage, convert_native_format, convert_sample_count, image_aspect,
    is_depth_image_format, state_access_mask, state_layout, state_stage,
};
use self::resource::VulkanResource;

/// Timeout for fence waits (10 seconds).
const FENCE_TIMEOUT_NS: u64 = 10_000_000_000;

struct Submission {
    fence_value: u64,
    fence: vk::Fence,
    command_buffer: Option<vk::CommandBuffer>,
    parked: Vec<VulkanResource>,
}

/// Vulkan implementation of [`GpuDevice`].
pub struct VulkanDevice {
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    allocator: Mutex<Allocator>,
    resources: HashMap<ResourceId, VulkanResource>,
    views: HashMap<(DescriptorKind, u32), vk::ImageView>,
    recording: Option<vk::CommandBuffer>,
    referenced: HashSet<ResourceId>,
    parked: Vec<VulkanResource>,
    in_flight: VecDeque<Submission>,
    next_id: u64,
    current_fence: u64,
    completed_fence: u64,
}

impl VulkanDevice {
    /// Create a texture device on an existing logical device.
    ///
    /// `device` must have been created from `physical_device` with a queue
    /// in `queue_family_index` supporting transfer and graphics work, and
    /// must outlive the returned value.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory allocator or command pool cannot be created.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
    ) -> Result<Self, TextureError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            TextureError::AllocationFailure(format!("Failed to create memory allocator: {e}"))
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            TextureError::AllocationFailure(format!("Failed to create command pool: {e:?}"))
        })?;

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        log::info!("Created Vulkan texture device (queue family {queue_family_index})");

        Ok(Self {
            device,
            queue,
            command_pool,
            allocator: Mutex::new(allocator),
            resources: HashMap::new(),
            views: HashMap::new(),
            recording: None,
            referenced: HashSet::new(),
            parked: Vec::new(),
            in_flight: VecDeque::new(),
            next_id: 1,
            current_fence: 1,
            completed_fence: 0,
        })
    }

    /// Wrap an image owned elsewhere, such as a swap-chain image.
    ///
    /// Destroying the returned resource forgets the image without destroying it.
    pub fn import_image(&mut self, image: vk::Image, desc: ResourceDesc) -> GpuResource {
        self.insert(VulkanResource::Image {
            image,
            allocation: None,
            desc,
        })
    }

    /// The native image behind a texture resource.
    pub fn image(&self, resource: &GpuResource) -> Option<vk::Image> {
        match self.resources.get(&resource.id()) {
            Some(VulkanResource::Image { image, .. }) => Some(*image),
            _ => None,
        }
    }

    /// The image view materialized at a descriptor slot.
    pub fn image_view(&self, slot: &DescriptorHandle) -> Option<vk::ImageView> {
        self.views.get(&(slot.kind(), slot.index())).copied()
    }

    fn insert(&mut self, resource: VulkanResource) -> GpuResource {
        let id = ResourceId::new(self.next_id);
        self.next_id += 1;
        self.resources.insert(id, resource);
        GpuResource::new(id)
    }

    fn image_of(&self, id: ResourceId) -> Option<(vk::Image, ResourceDesc)> {
        match self.resources.get(&id) {
            Some(VulkanResource::Image { image, desc, .. }) => Some((*image, *desc)),
            _ => None,
        }
    }

    /// The command buffer being recorded, begun on first use.
    fn command_buffer(&mut self) -> Option<vk::CommandBuffer> {
        if let Some(command_buffer) = self.recording {
            return Some(command_buffer);
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { self.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers.first().copied()?,
            Err(e) => {
                log::error!("Failed to allocate command buffer: {:?}", e);
                return None;
            }
        };

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(e) = unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) } {
            log::error!("Failed to begin command buffer: {:?}", e);
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &[command_buffer]);
            }
            return None;
        }

        self.recording = Some(command_buffer);
        Some(command_buffer)
    }

    fn transition_image(
        &mut self,
        id: ResourceId,
        old_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        after: ResourceState,
    ) {
        let Some((image, desc)) = self.image_of(id) else {
            log::error!("Barrier on unknown image {id:?} dropped");
            return;
        };
        let Some(command_buffer) = self.command_buffer() else {
            return;
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(state_layout(after))
            .src_access_mask(src_access)
            .dst_access_mask(state_access_mask(after))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: image_aspect(desc.format),
                base_mip_level: 0,
                level_count: desc.levels,
                base_array_layer: 0,
                layer_count: desc.layers,
            });

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                state_stage(after),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        self.referenced.insert(id);
    }

    /// Block until the device is idle, logging a failure instead of dropping it.
    fn wait_device_idle(&self) -> bool {
        match unsafe { self.device.device_wait_idle() } {
            Ok(()) => true,
            Err(e) => {
                log::error!("Device wait idle failed: {:?}", e);
                false
            }
        }
    }

    fn poll_completed(&mut self) {
        while let Some(submission) = self.in_flight.front() {
            let signaled = matches!(
                unsafe { self.device.get_fence_status(submission.fence) },
                Ok(true)
            );
            if !signaled {
                break;
            }
            if let Some(submission) = self.in_flight.pop_front() {
                self.retire(submission);
            }
        }
    }

    fn retire(&mut self, submission: Submission) {
        unsafe {
            if submission.fence != vk::Fence::null() {
                self.device.destroy_fence(submission.fence, None);
            }
            if let Some(command_buffer) = submission.command_buffer {
                self.device
                    .free_command_buffers(self.command_pool, &[command_buffer]);
            }
            for resource in submission.parked {
                resource.destroy(&self.device, &self.allocator);
            }
        }
        self.completed_fence = self.completed_fence.max(submission.fence_value);
    }

    fn destroy_native(&mut self, native: VulkanResource) {
        // SAFETY: callers pass resources no pending command buffer references.
        unsafe { native.destroy(&self.device, &self.allocator) };
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn create_texture(
        &mut self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<GpuResource, TextureError> {
        let format = convert_native_format(desc.format);
        if format == vk::Format::UNDEFINED {
            return Err(TextureError::AllocationFailure(format!(
                "unsupported texture format {:?}",
                desc.format
            )));
        }
        if !desc.samples.is_power_of_two() || desc.samples > 64 {
            return Err(TextureError::AllocationFailure(format!(
                "unsupported sample count {}",
                desc.samples
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.levels)
            .array_layers(desc.layers)
            .samples(convert_sample_count(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(desc.flags))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            TextureError::AllocationFailure(format!("Failed to create image: {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(TextureError::AllocationFailure(format!(
                    "Failed to allocate texture memory: {e}"
                )));
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            if let Err(free_error) = self.allocator.lock().free(allocation) {
                log::error!("Failed to free texture allocation: {}", free_error);
            }
            unsafe { self.device.destroy_image(image, None) };
            return Err(TextureError::AllocationFailure(format!(
                "Failed to bind image memory: {:?}",
                e
            )));
        }

        let resource = self.insert(VulkanResource::Image {
            image,
            allocation: Some(allocation),
            desc: *desc,
        });

        // New images have undefined contents; move them into the requested state.
        self.transition_image(
            resource.id(),
            vk::ImageLayout::UNDEFINED,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
            initial_state,
        );

        Ok(resource)
    }

    fn resource_desc(&self, resource: &GpuResource) -> Option<ResourceDesc> {
        self.resources
            .get(&resource.id())
            .and_then(VulkanResource::image_desc)
    }

    fn create_host_buffer(&mut self, size: u64) -> Result<HostBuffer, TextureError> {
        let len = usize::try_from(size).map_err(|_| {
            TextureError::AllocationFailure(format!("host buffer of {size} bytes"))
        })?;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            TextureError::AllocationFailure(format!("Failed to create buffer: {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name: "texture_upload",
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(TextureError::AllocationFailure(format!(
                    "Failed to allocate upload memory: {e}"
                )));
            }
        };

        let bind_result = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let mapped = allocation.mapped_ptr().map(|ptr| ptr.cast::<u8>());
        let ptr = match (bind_result, mapped) {
            (Ok(()), Some(ptr)) => ptr,
            (bind_result, _) => {
                self.destroy_native(VulkanResource::Buffer {
                    buffer,
                    allocation: Some(allocation),
                    size,
                });
                return Err(TextureError::AllocationFailure(match bind_result {
                    Err(e) => format!("Failed to bind buffer memory: {:?}", e),
                    Ok(()) => "upload buffer is not host mapped".to_string(),
                }));
            }
        };

        // SAFETY: the mapping stays valid until the buffer is destroyed, which
        // consumes the resource handle paired with this memory.
        let memory = unsafe { HostMemory::mapped(ptr, len) };
        let resource = self.insert(VulkanResource::Buffer {
            buffer,
            allocation: Some(allocation),
            size,
        });
        Ok(HostBuffer { resource, memory })
    }

    fn create_view(
        &mut self,
        resource: &GpuResource,
        view: &ViewDesc,
        slot: &DescriptorHandle,
    ) -> Result<(), TextureError> {
        let Some((image, desc)) = self.image_of(resource.id()) else {
            return Err(TextureError::InvalidParameter(format!(
                "{:?} is not an image",
                resource.id()
            )));
        };

        // Depth images are viewed through their own format with the depth aspect.
        let (format, aspect_mask) = if is_depth_image_format(desc.format) {
            (
                convert_native_format(desc.format),
                vk::ImageAspectFlags::DEPTH,
            )
        } else {
            (
                convert_native_format(view.format),
                vk::ImageAspectFlags::COLOR,
            )
        };
        let (view_type, layer_count) = match view.dimension {
            ViewDimension::Texture2D | ViewDimension::Texture2DMultisampled => {
                (vk::ImageViewType::TYPE_2D, 1)
            }
            ViewDimension::Texture2DArray { layers }
            | ViewDimension::Texture2DMultisampledArray { layers } => {
                (vk::ImageViewType::TYPE_2D_ARRAY, layers)
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: view.mip_levels.max(1),
                base_array_layer: 0,
                layer_count,
            });

        let image_view =
            unsafe { self.device.create_image_view(&view_info, None) }.map_err(|e| {
                TextureError::AllocationFailure(format!("Failed to create image view: {:?}", e))
            })?;

        if let Some(previous) = self.views.insert((slot.kind(), slot.index()), image_view) {
            unsafe { self.device.destroy_image_view(previous, None) };
        }
        Ok(())
    }

    fn release_view(&mut self, slot: &DescriptorHandle) {
        if let Some(image_view) = self.views.remove(&(slot.kind(), slot.index())) {
            unsafe { self.device.destroy_image_view(image_view, None) };
        }
    }

    fn record_barrier(
        &mut self,
        resource: &GpuResource,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.transition_image(
            resource.id(),
            state_layout(before),
            state_access_mask(before),
            state_stage(before),
            after,
        );
    }

    fn record_copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy) {
        let buffer = match self.resources.get(&copy.source) {
            Some(VulkanResource::Buffer { buffer, .. }) => *buffer,
            _ => {
                log::error!("Copy from unknown buffer {:?} dropped", copy.source);
                return;
            }
        };
        let Some((image, desc)) = self.image_of(copy.destination) else {
            log::error!("Copy to unknown image {:?} dropped", copy.destination);
            return;
        };
        let Some(command_buffer) = self.command_buffer() else {
            return;
        };

        let bytes_per_pixel = copy.format.bytes_per_pixel().max(1);
        let region = vk::BufferImageCopy::default()
            .buffer_offset(copy.source_offset)
            .buffer_row_length(copy.row_pitch / bytes_per_pixel)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: image_aspect(desc.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D {
                x: copy.region.x as i32,
                y: copy.region.y as i32,
                z: 0,
            })
            .image_extent(vk::Extent3D {
                width: copy.region.width,
                height: copy.region.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        self.referenced.insert(copy.source);
        self.referenced.insert(copy.destination);
    }

    fn submit(&mut self, wait_for_completion: bool) -> u64 {
        let fence_value = self.current_fence;
        self.current_fence += 1;

        let command_buffer = self.recording.take();
        if let Some(command_buffer) = command_buffer
            && let Err(e) = unsafe { self.device.end_command_buffer(command_buffer) }
        {
            log::error!("Failed to end command buffer: {:?}", e);
        }
        self.referenced.clear();
        let parked = std::mem::take(&mut self.parked);

        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        };
        let command_buffers: Vec<vk::CommandBuffer> = command_buffer.into_iter().collect();
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submits: &[vk::SubmitInfo] = if command_buffers.is_empty() {
            &[]
        } else {
            std::slice::from_ref(&submit_info)
        };

        let submitted = fence.and_then(|fence| {
            unsafe { self.device.queue_submit(self.queue, submits, fence) }.map(|()| fence)
        });

        match submitted {
            Ok(fence) => {
                self.in_flight.push_back(Submission {
                    fence_value,
                    fence,
                    command_buffer,
                    parked,
                });
                if wait_for_completion {
                    match unsafe { self.device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) } {
                        Ok(()) => {}
                        Err(vk::Result::TIMEOUT) => {
                            log::warn!(
                                "Fence wait timed out after 10 seconds. \
                                 GPU may be hung or fence was never signaled."
                            );
                        }
                        Err(e) => log::error!("Fence wait failed: {:?}", e),
                    }
                }
            }
            Err(e) => {
                log::error!("Queue submission failed: {:?}", e);
                if let Ok(fence) = fence {
                    unsafe { self.device.destroy_fence(fence, None) };
                }
                if !self.wait_device_idle() {
                    log::warn!("Retiring submission {fence_value} without confirmed completion");
                }
                self.retire(Submission {
                    fence_value,
                    fence: vk::Fence::null(),
                    command_buffer,
                    parked,
                });
            }
        }

        self.poll_completed();
        fence_value
    }

    fn current_fence_value(&self) -> u64 {
        self.current_fence
    }

    fn completed_fence_value(&mut self) -> u64 {
        self.poll_completed();
        self.completed_fence
    }

    fn wait_idle(&mut self) {
        self.wait_device_idle();
        self.poll_completed();
    }

    fn destroy_resource(&mut self, resource: GpuResource) {
        let id = resource.into_id();
        let Some(native) = self.resources.remove(&id) else {
            log::error!("Destroying unknown resource {id:?}");
            return;
        };
        if self.referenced.contains(&id) {
            log::trace!("Parking {id:?} until the command buffer using it completes");
            self.parked.push(native);
        } else {
            self.destroy_native(native);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        self.wait_device_idle();
        if let Some(command_buffer) = self.recording.take() {
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &[command_buffer]);
            }
        }
        while let Some(submission) = self.in_flight.pop_front() {
            self.retire(submission);
        }
        for native in std::mem::take(&mut self.parked) {
            self.destroy_native(native);
        }
        for (_, image_view) in self.views.drain() {
            unsafe { self.device.destroy_image_view(image_view, None) };
        }
        if !self.resources.is_empty() {
            log::warn!(
                "VulkanDevice dropped with {} live resources",
                self.resources.len()
            );
        }
        let resources: Vec<VulkanResource> = self.resources.drain().map(|(_, r)| r).collect();
        for native in resources {
            self.destroy_native(native);
        }
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("resources", &self.resources.len())
            .field("views", &self.views.len())
            .field("recording", &self.recording.is_some())
            .field("in_flight", &self.in_flight.len())
            .field("current_fence", &self.current_fence)
            .field("completed_fence", &self.completed_fence)
            .finish()
    }
}
