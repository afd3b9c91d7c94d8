//! The context every texture operation runs against.
//!
//! [`GpuContext`] bundles the device, the three descriptor heaps, the shared
//! upload ring buffer and the retirement queue. It is passed explicitly to
//! every texture operation; nothing in this crate reaches for global state.

use crate::config::TextureConfig;
use crate::descriptor::{DescriptorHandle, DescriptorHeaps, DescriptorSet};
use crate::device::{GpuDevice, GpuResource};
use crate::error::TextureError;
use crate::retirement::{Retired, RetirementQueue};
use crate::stream_buffer::UploadRingBuffer;

/// Counters describing which upload paths have been taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadStats {
    /// Uploads that went through the stream buffer.
    pub streaming_uploads: u64,
    /// Uploads that went through a staging resource.
    pub staging_uploads: u64,
    /// Staging resources created.
    pub staging_created: u64,
    /// Staging resources destroyed.
    pub staging_destroyed: u64,
    /// Submissions forced by a full stream buffer.
    pub forced_submissions: u64,
}

/// Device, descriptor heaps, stream buffer and retirement queue.
pub struct GpuContext<D: GpuDevice> {
    device: D,
    heaps: DescriptorHeaps,
    stream_buffer: UploadRingBuffer,
    retirement: RetirementQueue,
    config: TextureConfig,
    stats: UploadStats,
}

impl<D: GpuDevice> GpuContext<D> {
    /// Create a context on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the stream buffer
    /// cannot be allocated.
    pub fn new(mut device: D, config: TextureConfig) -> Result<Self, TextureError> {
        config.validate()?;

        let buffer = device.create_host_buffer(u64::from(config.stream_buffer_size))?;
        let stream_buffer = match UploadRingBuffer::new(buffer) {
            Ok(stream_buffer) => stream_buffer,
            Err((e, buffer)) => {
                device.destroy_resource(buffer.resource);
                return Err(e);
            }
        };

        log::info!(
            "Created texture context on {} (stream buffer: {} bytes)",
            device.name(),
            config.stream_buffer_size
        );

        Ok(Self {
            device,
            heaps: DescriptorHeaps::new(
                config.shader_resource_descriptors,
                config.render_target_descriptors,
                config.depth_stencil_descriptors,
            ),
            stream_buffer,
            retirement: RetirementQueue::new(),
            config,
            stats: UploadStats::default(),
        })
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The descriptor heaps.
    pub fn heaps(&self) -> &DescriptorHeaps {
        &self.heaps
    }

    /// The shared upload ring buffer.
    pub fn stream_buffer(&self) -> &UploadRingBuffer {
        &self.stream_buffer
    }

    /// The retirement queue.
    pub fn retirement(&self) -> &RetirementQueue {
        &self.retirement
    }

    /// The configuration this context was created with.
    pub fn config(&self) -> &TextureConfig {
        &self.config
    }

    /// Upload path counters.
    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut UploadStats {
        &mut self.stats
    }

    pub(crate) fn stream_buffer_mut(&mut self) -> &mut UploadRingBuffer {
        &mut self.stream_buffer
    }

    pub(crate) fn device_and_heaps(&mut self) -> (&mut D, &mut DescriptorHeaps) {
        (&mut self.device, &mut self.heaps)
    }

    /// Submit the active command stream and keep recording into a new one.
    ///
    /// Completed work is reaped afterwards. Returns the fence value of the
    /// submitted work.
    pub fn submit(&mut self, wait_for_completion: bool) -> u64 {
        let fence = self.device.submit(wait_for_completion);
        self.stream_buffer.track_fence(fence);
        self.reap_completed();
        fence
    }

    /// Free every retired item whose fence the device reports complete.
    ///
    /// Returns the number of items freed.
    pub fn reap_completed(&mut self) -> usize {
        let completed = self.device.completed_fence_value();
        self.stream_buffer.reclaim(completed);

        let ready = self.retirement.reap(completed);
        let count = ready.len();
        for item in ready {
            self.release(item);
        }
        if count > 0 {
            log::trace!("Reaped {count} retired items (fence {completed})");
        }
        count
    }

    /// Free `resource`, now or once the GPU is done with current work.
    pub fn destroy_resource(&mut self, resource: GpuResource, deferred: bool) {
        self.dispose(Retired::Resource(resource), deferred);
    }

    /// Return `handle` to its heap, now or once the GPU is done with current work.
    pub fn destroy_descriptor(&mut self, handle: DescriptorHandle, deferred: bool) {
        self.dispose(Retired::Descriptor(handle), deferred);
    }

    /// Release every view in `set`.
    pub fn destroy_descriptors(&mut self, set: DescriptorSet, deferred: bool) {
        for handle in set.into_handles() {
            self.destroy_descriptor(handle, deferred);
        }
    }

    fn dispose(&mut self, item: Retired, deferred: bool) {
        if deferred {
            let fence = self.device.current_fence_value();
            self.retirement.retire(item, fence);
        } else {
            self.release(item);
        }
    }

    fn release(&mut self, item: Retired) {
        match item {
            Retired::Resource(resource) => self.device.destroy_resource(resource),
            Retired::Descriptor(handle) => self.heaps.release(&mut self.device, handle),
        }
    }

    /// Wait for the GPU, free everything this context holds and return the device.
    ///
    /// Textures must be destroyed before shutdown; views still allocated at
    /// this point are reported as leaks.
    pub fn shutdown(mut self) -> D {
        self.device.submit(true);
        self.device.wait_idle();

        for item in self.retirement.drain_all() {
            self.release(item);
        }

        let leaked = self.heaps.allocated_count();
        if leaked > 0 {
            log::warn!("Texture context shut down with {leaked} descriptors still allocated");
        }

        let Self {
            mut device,
            stream_buffer,
            ..
        } = self;
        device.destroy_resource(stream_buffer.into_buffer().resource);
        log::info!("Texture context on {} shut down", device.name());
        device
    }
}

impl<D: GpuDevice + std::fmt::Debug> std::fmt::Debug for GpuContext<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("device", &self.device)
            .field("heaps", &self.heaps)
            .field("stream_buffer", &self.stream_buffer)
            .field("retirement", &self.retirement)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;

    fn context() -> GpuContext<DummyDevice> {
        GpuContext::new(
            DummyDevice::new(),
            TextureConfig::default().with_stream_buffer_size(4096),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = GpuContext::new(
            DummyDevice::new(),
            TextureConfig::default().with_pitch_alignment(3),
        );
        assert!(matches!(result, Err(TextureError::InvalidParameter(_))));
    }

    #[test]
    fn test_stream_buffer_allocation_failure() {
        let mut device = DummyDevice::new();
        device.fail_next_allocations(1);
        let result = GpuContext::new(device, TextureConfig::default());
        assert!(matches!(result, Err(TextureError::AllocationFailure(_))));
    }

    #[test]
    fn test_deferred_resource_freed_after_its_fence() {
        let mut ctx = context();
        ctx.device_mut().set_auto_complete(false);

        let buffer = ctx.device_mut().create_host_buffer(64).unwrap();
        let id = buffer.resource.id();
        ctx.destroy_resource(buffer.resource, true);
        assert_eq!(ctx.retirement().pending_count(), 1);

        let fence = ctx.submit(false);
        assert!(ctx.device().is_live(id));

        ctx.submit(true);
        assert!(fence < ctx.device().current_fence_value());
        assert!(!ctx.device().is_live(id));
        assert!(ctx.retirement().is_empty());
    }

    #[test]
    fn test_immediate_descriptor_release() {
        let mut ctx = context();
        let (_, heaps) = ctx.device_and_heaps();
        let handle = heaps.shader_resource.allocate().unwrap();
        assert_eq!(ctx.heaps().allocated_count(), 1);

        ctx.destroy_descriptor(handle, false);
        assert_eq!(ctx.heaps().allocated_count(), 0);
        assert!(ctx.retirement().is_empty());
    }

    #[test]
    fn test_shutdown_returns_device() {
        let ctx = context();
        let device = ctx.shutdown();
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.destroyed_count(), 1);
    }
}
