//! GPU texture object.
//!
//! A [`GpuTexture`] exclusively owns one native 2D texture resource, the
//! views created for it and its current usage state. It is created with
//! [`GpuTexture::create`] or wraps an existing resource with
//! [`GpuTexture::adopt`], and must be released with [`GpuTexture::destroy`].
//!
//! # Usage state
//!
//! The texture remembers the state its resource is in. Requesting a
//! different state records exactly one barrier; requesting the current state
//! records nothing. The state lives in a [`Cell`], so
//! [`GpuTexture::transition_to_state`] works through `&self`: even operations
//! that only read the texture may change its tracked state and record
//! barriers.
//!
//! # Uploads
//!
//! [`GpuTexture::load_data`] routes each upload by size. Uploads smaller than
//! the stream buffer are written into it and copied from there; larger ones
//! go through a temporary [`StagingTexture`].
//!
//! # Example
//!
//! ```ignore
//! let mut texture = GpuTexture::new();
//! texture.create(
//!     &mut ctx,
//!     &ResourceDesc::new_2d(256, 256, NativeFormat::Rgba8Unorm),
//!     &ViewFormats::sampled(NativeFormat::Rgba8Unorm),
//! )?;
//! texture.load_data(&mut ctx, 0, 0, 256, 256, &pixels, 256 * 4)?;
//! // ...
//! texture.destroy(&mut ctx, true);
//! ```

use std::cell::Cell;
use std::fmt;

use crate::context::GpuContext;
use crate::descriptor::{DescriptorHandle, DescriptorSet, ViewFormats};
use crate::device::{BufferTextureCopy, GpuDevice, GpuResource, ResourceId};
use crate::error::TextureError;
use crate::staging::StagingTexture;
use crate::types::{NativeFormat, Rect, ResourceDesc, ResourceFlags, ResourceState, TextureFormat};
use crate::upload::UploadLayout;

/// Largest accepted texture width.
pub const MAX_WIDTH: u32 = u16::MAX as u32;
/// Largest accepted texture height.
pub const MAX_HEIGHT: u32 = u16::MAX as u32;
/// Largest accepted array layer count.
pub const MAX_LAYERS: u32 = u8::MAX as u32;
/// Largest accepted mip level count.
pub const MAX_LEVELS: u32 = u8::MAX as u32;
/// Largest accepted sample count.
pub const MAX_SAMPLES: u32 = u8::MAX as u32;

/// Failure to adopt a resource. The resource is handed back to the caller.
#[derive(Debug)]
pub struct AdoptError {
    /// What went wrong.
    pub error: TextureError,
    /// The resource that was not adopted.
    pub resource: GpuResource,
}

impl fmt::Display for AdoptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to adopt {:?}: {}", self.resource.id(), self.error)
    }
}

impl std::error::Error for AdoptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A 2D texture resource with its views and tracked usage state.
///
/// Not `Clone`. Moving a texture moves ownership of its resource and views;
/// [`GpuTexture::take`] moves them out and leaves an empty texture behind.
#[derive(Default)]
pub struct GpuTexture {
    resource: Option<GpuResource>,
    descriptors: DescriptorSet,
    width: u32,
    height: u32,
    layers: u32,
    levels: u32,
    samples: u32,
    format: TextureFormat,
    native_format: NativeFormat,
    state: Cell<ResourceState>,
}

impl GpuTexture {
    /// Create an empty texture that owns nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the texture owns a resource.
    pub fn is_valid(&self) -> bool {
        self.resource.is_some()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Array layer count.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Mip level count.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Samples per pixel.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Logical pixel format.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Native format of the resource.
    pub fn native_format(&self) -> NativeFormat {
        self.native_format
    }

    /// Current usage state.
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    /// Returns true if the target view is a depth-stencil view.
    pub fn is_depth_view(&self) -> bool {
        self.descriptors.is_depth_view()
    }

    /// The owned resource.
    pub fn resource(&self) -> Option<&GpuResource> {
        self.resource.as_ref()
    }

    /// The owned views.
    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    /// Sampled view, if one was created.
    pub fn shader_resource_view(&self) -> Option<&DescriptorHandle> {
        self.descriptors.shader_resource()
    }

    /// Render-target view, if one was created.
    pub fn render_target_view(&self) -> Option<&DescriptorHandle> {
        self.descriptors.render_target()
    }

    /// Depth-stencil view, if one was created.
    pub fn depth_stencil_view(&self) -> Option<&DescriptorHandle> {
        self.descriptors.depth_stencil()
    }

    /// Move the resource and views out, leaving this texture empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Allocate a new resource shaped like `desc` with the views in `views`.
    ///
    /// The initial state follows the requested views: render target if a
    /// render-target view is requested, depth write if a depth-stencil view
    /// is, shader resource otherwise. On success any previously owned
    /// resource and views are destroyed through the deferred path.
    ///
    /// # Errors
    ///
    /// - [`TextureError::CapacityExceeded`] if a dimension is above its maximum
    /// - [`TextureError::InvalidParameter`] if a dimension is zero
    /// - [`TextureError::AllocationFailure`] if the resource or a view cannot be allocated
    ///
    /// The texture is left unchanged on failure.
    pub fn create<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        desc: &ResourceDesc,
        views: &ViewFormats,
    ) -> Result<(), TextureError> {
        check_limits(desc)?;

        let state = if views.render_target != NativeFormat::Unknown {
            ResourceState::RenderTarget
        } else if views.depth_stencil != NativeFormat::Unknown {
            ResourceState::DepthWrite
        } else {
            ResourceState::PixelShaderResource
        };

        let mut desc = *desc;
        if views.render_target != NativeFormat::Unknown {
            desc.flags |= ResourceFlags::ALLOW_RENDER_TARGET;
        }
        if views.depth_stencil != NativeFormat::Unknown {
            desc.flags |= ResourceFlags::ALLOW_DEPTH_STENCIL;
        }

        let resource = ctx
            .device_mut()
            .create_texture(&desc, state)
            .inspect_err(|e| {
                log::error!(
                    "Failed to create {}x{}x{} texture ({} levels, {} samples, {:?}): {e}",
                    desc.width,
                    desc.height,
                    desc.layers,
                    desc.levels,
                    desc.samples,
                    desc.format
                );
            })?;

        let (device, heaps) = ctx.device_and_heaps();
        let descriptors = match DescriptorSet::allocate(device, heaps, &resource, &desc, views) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                log::error!("Failed to create views for texture {:?}: {e}", resource.id());
                ctx.destroy_resource(resource, false);
                return Err(e);
            }
        };

        log::debug!(
            "Created texture {:?} ({}x{} {:?}, {} views, state {state:?})",
            resource.id(),
            desc.width,
            desc.height,
            desc.format,
            descriptors.len()
        );

        self.destroy(ctx, true);
        self.assign(resource, descriptors, &desc, state);
        Ok(())
    }

    /// Take ownership of a resource created elsewhere, such as a swap-chain image.
    ///
    /// Dimensions and format are read back from the device. `state` is the
    /// state the resource is currently in. On success any previously owned
    /// resource and views are destroyed through the deferred path.
    ///
    /// # Errors
    ///
    /// Returns the resource along with the error if it is not a texture on
    /// this device, exceeds the size limits, or a view cannot be allocated.
    pub fn adopt<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        resource: GpuResource,
        views: &ViewFormats,
        state: ResourceState,
    ) -> Result<(), AdoptError> {
        let Some(desc) = ctx.device().resource_desc(&resource) else {
            log::error!("Cannot adopt {:?}: not a texture", resource.id());
            return Err(AdoptError {
                error: TextureError::InvalidParameter(format!(
                    "{:?} is not a texture",
                    resource.id()
                )),
                resource,
            });
        };

        if let Err(error) = check_limits(&desc) {
            return Err(AdoptError { error, resource });
        }

        let (device, heaps) = ctx.device_and_heaps();
        let descriptors = match DescriptorSet::allocate(device, heaps, &resource, &desc, views) {
            Ok(descriptors) => descriptors,
            Err(error) => {
                log::error!("Failed to create views for adopted {:?}: {error}", resource.id());
                return Err(AdoptError { error, resource });
            }
        };

        log::debug!(
            "Adopted texture {:?} ({}x{} {:?}, state {state:?})",
            resource.id(),
            desc.width,
            desc.height,
            desc.format
        );

        self.destroy(ctx, true);
        self.assign(resource, descriptors, &desc, state);
        Ok(())
    }

    fn assign(
        &mut self,
        resource: GpuResource,
        descriptors: DescriptorSet,
        desc: &ResourceDesc,
        state: ResourceState,
    ) {
        *self = Self {
            resource: Some(resource),
            descriptors,
            width: desc.width,
            height: desc.height,
            layers: desc.layers,
            levels: desc.levels,
            samples: desc.samples,
            format: TextureFormat::from_native(desc.format),
            native_format: desc.format,
            state: Cell::new(state),
        };
    }

    /// Release the resource and views and reset to the empty state.
    ///
    /// With `deferred`, the resource and views are retired until the GPU has
    /// finished the work being recorded now. Without it they are freed
    /// immediately; the caller guarantees no GPU work still uses them.
    pub fn destroy<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>, deferred: bool) {
        let descriptors = std::mem::take(&mut self.descriptors);
        if let Some(resource) = self.resource.take() {
            log::debug!("Destroying texture {:?} (deferred: {deferred})", resource.id());
            ctx.destroy_resource(resource, deferred);
        }
        ctx.destroy_descriptors(descriptors, deferred);
        *self = Self::default();
    }

    /// Record a barrier moving the resource to `state`, unless it is already there.
    pub fn transition_to_state<D: GpuDevice>(&self, ctx: &mut GpuContext<D>, state: ResourceState) {
        let current = self.state.get();
        if current == state {
            return;
        }
        let Some(resource) = &self.resource else {
            return;
        };
        ctx.device_mut().record_barrier(resource, current, state);
        self.state.set(state);
    }

    /// Upload `width` x `height` pixels at (`x`, `y`) from `data`, whose rows are `pitch` bytes apart.
    ///
    /// # Errors
    ///
    /// - [`TextureError::InvalidTexture`] if the texture owns no resource
    /// - [`TextureError::InvalidParameter`] if the region or source data is invalid
    /// - [`TextureError::StreamingBufferExhausted`] if the stream buffer stays full
    /// - [`TextureError::StagingFailure`] if the staging resource cannot be used
    pub fn load_data<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
        pitch: u32,
    ) -> Result<(), TextureError> {
        let layout = self.upload_layout(ctx, Rect::new(x, y, width, height), pitch)?;
        layout.validate_source(data)?;

        if layout.upload_size < u64::from(ctx.stream_buffer().capacity()) {
            self.upload_streaming(ctx, &layout, data)
        } else {
            self.upload_staging(ctx, &layout, data)
        }
    }

    /// [`load_data`](Self::load_data) for typed pixels. `pitch` is in bytes.
    pub fn load_pixels<D: GpuDevice, T: bytemuck::Pod>(
        &mut self,
        ctx: &mut GpuContext<D>,
        region: Rect,
        pixels: &[T],
        pitch: u32,
    ) -> Result<(), TextureError> {
        self.load_data(
            ctx,
            region.x,
            region.y,
            region.width,
            region.height,
            bytemuck::cast_slice(pixels),
            pitch,
        )
    }

    fn upload_layout<D: GpuDevice>(
        &self,
        ctx: &GpuContext<D>,
        region: Rect,
        source_pitch: u32,
    ) -> Result<UploadLayout, TextureError> {
        if !self.is_valid() {
            return Err(TextureError::InvalidTexture);
        }
        if region.width == 0 || region.height == 0 || !region.fits_within(self.width, self.height) {
            return Err(TextureError::InvalidParameter(format!(
                "upload region {region:?} outside {}x{} texture",
                self.width, self.height
            )));
        }
        let bytes_per_pixel = self.native_format.bytes_per_pixel();
        if bytes_per_pixel == 0 {
            return Err(TextureError::InvalidParameter(format!(
                "cannot upload to {:?} texture",
                self.native_format
            )));
        }
        Ok(UploadLayout::new(
            region,
            bytes_per_pixel,
            source_pitch,
            ctx.config().pitch_alignment,
        ))
    }

    fn upload_streaming<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        layout: &UploadLayout,
        data: &[u8],
    ) -> Result<(), TextureError> {
        // Callers route here only when the size is below the u32 capacity.
        let size = layout.upload_size as u32;
        reserve_stream_space(ctx, size)?;

        let offset = ctx.stream_buffer().current_offset();
        layout.write(ctx.stream_buffer_mut().current_host_slice_mut(), data);
        ctx.stream_buffer_mut().commit_memory(size);

        let buffer = ctx.stream_buffer().buffer().id();
        self.copy_from_buffer(ctx, layout.region, layout.upload_pitch, buffer, u64::from(offset))?;
        ctx.stats_mut().streaming_uploads += 1;
        Ok(())
    }

    fn upload_staging<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        layout: &UploadLayout,
        data: &[u8],
    ) -> Result<(), TextureError> {
        let Some(resource) = &self.resource else {
            return Err(TextureError::InvalidTexture);
        };
        let region = layout.region;
        log::debug!(
            "Upload of {} bytes to {:?} exceeds stream buffer, using staging texture",
            layout.upload_size,
            resource.id()
        );

        let mut staging =
            StagingTexture::create(ctx, region.width, region.height, self.native_format, true)?;
        if let Err(e) = staging.write_pixels(
            0,
            0,
            region.width,
            region.height,
            data,
            layout.source_pitch,
        ) {
            log::error!("Failed to write staging texture for {:?}: {e}", resource.id());
            staging.destroy(ctx, false);
            return Err(e);
        }

        let old_state = self.state.get();
        self.transition_to_state(ctx, ResourceState::CopyDest);
        staging.copy_to_texture(
            ctx,
            Rect::new(0, 0, region.width, region.height),
            resource,
            region.x,
            region.y,
        );
        self.transition_to_state(ctx, old_state);

        // The copy sits in the active stream ahead of anything that could
        // reuse the staging memory, so it is freed without waiting on a fence.
        staging.destroy(ctx, false);
        ctx.stats_mut().staging_uploads += 1;
        Ok(())
    }

    /// Reserve stream buffer space for a `width` x `height` update at (`x`, `y`).
    ///
    /// Returns the host memory to fill, `row pitch * height` bytes long, and
    /// the row pitch. Finish with [`end_stream_update`](Self::end_stream_update)
    /// using the same region before any other stream buffer use.
    ///
    /// # Errors
    ///
    /// Returns [`TextureError::StreamingBufferExhausted`] if the region does
    /// not fit in the stream buffer.
    pub fn begin_stream_update<'c, D: GpuDevice>(
        &self,
        ctx: &'c mut GpuContext<D>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<(&'c mut [u8], u32), TextureError> {
        let layout = self.upload_layout(ctx, Rect::new(x, y, width, height), 0)?;
        let size = stream_update_size(ctx, &layout)?;
        reserve_stream_space(ctx, size)?;
        let memory = &mut ctx.stream_buffer_mut().current_host_slice_mut()[..size as usize];
        Ok((memory, layout.upload_pitch))
    }

    /// Commit the region reserved by [`begin_stream_update`](Self::begin_stream_update)
    /// and record the copy into the texture.
    ///
    /// # Errors
    ///
    /// Returns [`TextureError::InvalidParameter`] if no reservation of at
    /// least the region's size is outstanding. Nothing is committed or
    /// recorded in that case.
    pub fn end_stream_update<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), TextureError> {
        let layout = self.upload_layout(ctx, Rect::new(x, y, width, height), 0)?;
        let size = stream_update_size(ctx, &layout)?;
        let reserved = ctx.stream_buffer().reserved_size();
        if !reserved.is_some_and(|reserved| size <= reserved) {
            log::error!(
                "Stream update of {size} bytes ended without a matching reservation ({reserved:?})"
            );
            return Err(TextureError::InvalidParameter(format!(
                "no stream buffer reservation covers {size} bytes"
            )));
        }

        let offset = ctx.stream_buffer().current_offset();
        ctx.stream_buffer_mut().commit_memory(size);

        let buffer = ctx.stream_buffer().buffer().id();
        self.copy_from_buffer(ctx, layout.region, layout.upload_pitch, buffer, u64::from(offset))?;
        ctx.stats_mut().streaming_uploads += 1;
        Ok(())
    }

    /// Record a copy of `region` from `buffer` at `offset`, rows `row_pitch` bytes apart.
    ///
    /// The texture is moved to [`ResourceState::CopyDest`] for the copy and
    /// back to its previous state afterwards.
    pub fn copy_from_buffer<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        region: Rect,
        row_pitch: u32,
        buffer: ResourceId,
        offset: u64,
    ) -> Result<(), TextureError> {
        let Some(resource) = &self.resource else {
            return Err(TextureError::InvalidTexture);
        };

        let old_state = self.state.get();
        self.transition_to_state(ctx, ResourceState::CopyDest);
        ctx.device_mut()
            .record_copy_buffer_to_texture(&BufferTextureCopy {
                source: buffer,
                source_offset: offset,
                row_pitch,
                format: self.native_format,
                destination: resource.id(),
                region,
            });
        self.transition_to_state(ctx, old_state);
        Ok(())
    }
}

fn check_limits(desc: &ResourceDesc) -> Result<(), TextureError> {
    for (dimension, requested, max) in [
        ("width", desc.width, MAX_WIDTH),
        ("height", desc.height, MAX_HEIGHT),
        ("layers", desc.layers, MAX_LAYERS),
        ("levels", desc.levels, MAX_LEVELS),
        ("samples", desc.samples, MAX_SAMPLES),
    ] {
        if requested > max {
            log::error!("Texture {dimension} of {requested} exceeds maximum of {max}");
            return Err(TextureError::CapacityExceeded {
                dimension,
                requested,
                max,
            });
        }
        if requested == 0 {
            log::error!("Texture {dimension} cannot be zero");
            return Err(TextureError::InvalidParameter(format!(
                "{dimension} cannot be zero"
            )));
        }
    }
    Ok(())
}

/// Reserve stream buffer space, submitting once to reclaim space if it is full.
/// Size of a stream update, rejecting regions the stream buffer can never hold.
fn stream_update_size<D: GpuDevice>(
    ctx: &GpuContext<D>,
    layout: &UploadLayout,
) -> Result<u32, TextureError> {
    let capacity = ctx.stream_buffer().capacity();
    match u32::try_from(layout.upload_size) {
        Ok(size) if size < capacity => Ok(size),
        _ => {
            log::error!(
                "Stream update of {} bytes cannot fit in a {capacity} byte stream buffer",
                layout.upload_size
            );
            Err(TextureError::StreamingBufferExhausted {
                size: u32::try_from(layout.upload_size).unwrap_or(u32::MAX),
            })
        }
    }
}

fn reserve_stream_space<D: GpuDevice>(ctx: &mut GpuContext<D>, size: u32) -> Result<(), TextureError> {
    let alignment = ctx.config().placement_alignment;
    if ctx.stream_buffer_mut().reserve_memory(size, alignment) {
        return Ok(());
    }

    log::warn!("Stream buffer full, submitting command stream to reclaim {size} bytes");
    ctx.stats_mut().forced_submissions += 1;
    ctx.submit(false);

    if ctx.stream_buffer_mut().reserve_memory(size, alignment) {
        return Ok(());
    }

    log::error!(
        "Stream buffer exhausted: {size} bytes unavailable after submission ({:?})",
        ctx.stream_buffer()
    );
    Err(TextureError::StreamingBufferExhausted { size })
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        if let Some(resource) = &self.resource {
            log::warn!(
                "GpuTexture {:?} dropped without destroy, resource and {} views leaked",
                resource.id(),
                self.descriptors.len()
            );
        }
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("resource", &self.resource.as_ref().map(GpuResource::id))
            .field("size", &(self.width, self.height))
            .field("layers", &self.layers)
            .field("levels", &self.levels)
            .field("samples", &self.samples)
            .field("format", &self.format)
            .field("native_format", &self.native_format)
            .field("state", &self.state.get())
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuTexture: Send);
static_assertions::assert_not_impl_any!(GpuTexture: Sync, Clone);
static_assertions::assert_not_impl_any!(GpuResource: Clone, Copy);
static_assertions::assert_not_impl_any!(DescriptorHandle: Clone, Copy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_texture() {
        let texture = GpuTexture::new();
        assert!(!texture.is_valid());
        assert_eq!(texture.width(), 0);
        assert_eq!(texture.height(), 0);
        assert_eq!(texture.format(), TextureFormat::Unknown);
        assert_eq!(texture.state(), ResourceState::Common);
        assert!(texture.descriptors().is_empty());
        assert!(!texture.is_depth_view());
    }

    #[test]
    fn test_check_limits() {
        let desc = ResourceDesc::new_2d(MAX_WIDTH, MAX_HEIGHT, NativeFormat::R8Unorm)
            .with_layers(MAX_LAYERS)
            .with_levels(MAX_LEVELS)
            .with_samples(MAX_SAMPLES);
        assert!(check_limits(&desc).is_ok());

        let desc = ResourceDesc::new_2d(MAX_WIDTH + 1, 1, NativeFormat::R8Unorm);
        assert_eq!(
            check_limits(&desc),
            Err(TextureError::CapacityExceeded {
                dimension: "width",
                requested: 65536,
                max: 65535,
            })
        );

        let desc = ResourceDesc::new_2d(1, 1, NativeFormat::R8Unorm).with_samples(256);
        assert!(matches!(
            check_limits(&desc),
            Err(TextureError::CapacityExceeded {
                dimension: "samples",
                ..
            })
        ));

        let desc = ResourceDesc::new_2d(1, 0, NativeFormat::R8Unorm);
        assert!(matches!(
            check_limits(&desc),
            Err(TextureError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_take_from_empty() {
        let mut texture = GpuTexture::new();
        let taken = texture.take();
        assert!(!taken.is_valid());
        assert!(!texture.is_valid());
    }
}
