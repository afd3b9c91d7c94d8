//! View descriptors and the pooled heaps they are allocated from.
//!
//! A texture owns up to two views: a sampled (shader resource) view, and
//! either a render-target view or a depth-stencil view. Each view occupies
//! one slot in a [`DescriptorHeap`] of the matching [`DescriptorKind`].
//!
//! Allocating a [`DescriptorSet`] is all-or-nothing: if any requested view
//! fails, the views already created for that set are released before the
//! error is returned.

use std::fmt;

use crate::device::{GpuDevice, GpuResource};
use crate::error::TextureError;
use crate::types::{NativeFormat, ResourceDesc};

/// Kind of view a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Sampled (shader resource) view.
    ShaderResource,
    /// Render-target view.
    RenderTarget,
    /// Depth-stencil view.
    DepthStencil,
}

/// Exclusive handle to one slot of a [`DescriptorHeap`].
///
/// Not `Clone`: the slot returns to its heap only by moving the handle into
/// [`DescriptorHeap::free`].
#[derive(PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    kind: DescriptorKind,
    index: u32,
}

impl DescriptorHandle {
    /// Heap kind this slot belongs to.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Slot index within the heap.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Debug for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DescriptorHandle({:?}#{})", self.kind, self.index)
    }
}

/// Fixed-capacity pool of descriptor slots.
pub struct DescriptorHeap {
    kind: DescriptorKind,
    free_slots: Vec<u32>,
    allocated: Vec<bool>,
}

impl DescriptorHeap {
    /// Create a heap with `capacity` slots.
    pub fn new(kind: DescriptorKind, capacity: u32) -> Self {
        Self {
            kind,
            free_slots: (0..capacity).rev().collect(),
            allocated: vec![false; capacity as usize],
        }
    }

    /// Kind of descriptors held by this heap.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Total number of slots.
    pub fn capacity(&self) -> u32 {
        self.allocated.len() as u32
    }

    /// Number of slots currently handed out.
    pub fn allocated_count(&self) -> u32 {
        self.capacity() - self.free_count()
    }

    /// Number of slots available for allocation.
    pub fn free_count(&self) -> u32 {
        self.free_slots.len() as u32
    }

    /// Take a free slot, or `None` if the heap is exhausted.
    pub fn allocate(&mut self) -> Option<DescriptorHandle> {
        let index = self.free_slots.pop()?;
        self.allocated[index as usize] = true;
        Some(DescriptorHandle {
            kind: self.kind,
            index,
        })
    }

    /// Return a slot to the heap.
    ///
    /// A handle this heap did not hand out is given back untouched so the
    /// caller can return it to its owner.
    pub fn free(&mut self, handle: DescriptorHandle) -> Result<(), DescriptorHandle> {
        let owned = handle.kind == self.kind
            && self
                .allocated
                .get(handle.index as usize)
                .copied()
                .unwrap_or(false);
        if !owned {
            log::warn!("{handle:?} freed into {:?} heap that does not own it", self.kind);
            return Err(handle);
        }
        self.allocated[handle.index as usize] = false;
        self.free_slots.push(handle.index);
        Ok(())
    }
}

impl fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

/// The three heaps a context allocates texture views from.
#[derive(Debug)]
pub struct DescriptorHeaps {
    /// Sampled views.
    pub shader_resource: DescriptorHeap,
    /// Render-target views.
    pub render_target: DescriptorHeap,
    /// Depth-stencil views.
    pub depth_stencil: DescriptorHeap,
}

impl DescriptorHeaps {
    /// Create the heaps with the given capacities.
    pub fn new(shader_resource: u32, render_target: u32, depth_stencil: u32) -> Self {
        Self {
            shader_resource: DescriptorHeap::new(DescriptorKind::ShaderResource, shader_resource),
            render_target: DescriptorHeap::new(DescriptorKind::RenderTarget, render_target),
            depth_stencil: DescriptorHeap::new(DescriptorKind::DepthStencil, depth_stencil),
        }
    }

    /// Heap holding descriptors of `kind`.
    pub fn heap(&self, kind: DescriptorKind) -> &DescriptorHeap {
        match kind {
            DescriptorKind::ShaderResource => &self.shader_resource,
            DescriptorKind::RenderTarget => &self.render_target,
            DescriptorKind::DepthStencil => &self.depth_stencil,
        }
    }

    /// Mutable heap holding descriptors of `kind`.
    pub fn heap_mut(&mut self, kind: DescriptorKind) -> &mut DescriptorHeap {
        match kind {
            DescriptorKind::ShaderResource => &mut self.shader_resource,
            DescriptorKind::RenderTarget => &mut self.render_target,
            DescriptorKind::DepthStencil => &mut self.depth_stencil,
        }
    }

    /// Release the view at `handle` and return the slot to its heap now.
    pub fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D, handle: DescriptorHandle) {
        device.release_view(&handle);
        if let Err(handle) = self.heap_mut(handle.kind()).free(handle) {
            log::error!("{handle:?} does not belong to this context, slot leaked");
        }
    }

    /// Total number of slots handed out across all heaps.
    pub fn allocated_count(&self) -> u32 {
        self.shader_resource.allocated_count()
            + self.render_target.allocated_count()
            + self.depth_stencil.allocated_count()
    }
}

/// Layout a view interprets the resource with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    /// Single 2D image.
    Texture2D,
    /// Single multisampled 2D image.
    Texture2DMultisampled,
    /// Array of 2D images.
    Texture2DArray {
        /// Number of layers covered.
        layers: u32,
    },
    /// Array of multisampled 2D images.
    Texture2DMultisampledArray {
        /// Number of layers covered.
        layers: u32,
    },
}

impl ViewDimension {
    fn for_resource(desc: &ResourceDesc) -> Self {
        match (desc.is_multisampled(), desc.layers > 1) {
            (false, false) => Self::Texture2D,
            (true, false) => Self::Texture2DMultisampled,
            (false, true) => Self::Texture2DArray {
                layers: desc.layers,
            },
            (true, true) => Self::Texture2DMultisampledArray {
                layers: desc.layers,
            },
        }
    }

    /// Returns true for multisampled layouts.
    pub fn is_multisampled(self) -> bool {
        matches!(
            self,
            Self::Texture2DMultisampled | Self::Texture2DMultisampledArray { .. }
        )
    }
}

/// Description of a view to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDesc {
    /// Kind of view.
    pub kind: DescriptorKind,
    /// Format the resource is interpreted as.
    pub format: NativeFormat,
    /// Layout of the view.
    pub dimension: ViewDimension,
    /// Mip levels visible through the view. Zero for multisampled views.
    pub mip_levels: u32,
}

impl ViewDesc {
    /// Describe a view of `kind` over a resource shaped like `desc`.
    ///
    /// Non-multisampled views cover exactly one mip level.
    pub fn new(kind: DescriptorKind, format: NativeFormat, desc: &ResourceDesc) -> Self {
        let dimension = ViewDimension::for_resource(desc);
        Self {
            kind,
            format,
            dimension,
            mip_levels: if dimension.is_multisampled() { 0 } else { 1 },
        }
    }
}

fn create_view<D: GpuDevice + ?Sized>(
    device: &mut D,
    heap: &mut DescriptorHeap,
    resource: &GpuResource,
    desc: &ResourceDesc,
    format: NativeFormat,
) -> Result<DescriptorHandle, TextureError> {
    let kind = heap.kind();
    let Some(slot) = heap.allocate() else {
        log::error!(
            "Failed to allocate {kind:?} descriptor for {:?} ({} of {} in use)",
            resource.id(),
            heap.allocated_count(),
            heap.capacity()
        );
        return Err(TextureError::AllocationFailure(format!(
            "{kind:?} descriptor heap exhausted"
        )));
    };

    let view = ViewDesc::new(kind, format, desc);
    if let Err(e) = device.create_view(resource, &view, &slot) {
        log::error!("Failed to create {kind:?} view for {:?}: {e}", resource.id());
        if let Err(slot) = heap.free(slot) {
            log::error!("Failed to return {slot:?} after view creation failed");
        }
        return Err(e);
    }
    Ok(slot)
}

/// Create a sampled view of `resource`.
pub fn create_shader_resource_view<D: GpuDevice + ?Sized>(
    device: &mut D,
    heap: &mut DescriptorHeap,
    resource: &GpuResource,
    desc: &ResourceDesc,
    format: NativeFormat,
) -> Result<DescriptorHandle, TextureError> {
    debug_assert_eq!(heap.kind(), DescriptorKind::ShaderResource);
    create_view(device, heap, resource, desc, format)
}

/// Create a render-target view of `resource`.
pub fn create_render_target_view<D: GpuDevice + ?Sized>(
    device: &mut D,
    heap: &mut DescriptorHeap,
    resource: &GpuResource,
    desc: &ResourceDesc,
    format: NativeFormat,
) -> Result<DescriptorHandle, TextureError> {
    debug_assert_eq!(heap.kind(), DescriptorKind::RenderTarget);
    create_view(device, heap, resource, desc, format)
}

/// Create a depth-stencil view of `resource`.
pub fn create_depth_stencil_view<D: GpuDevice + ?Sized>(
    device: &mut D,
    heap: &mut DescriptorHeap,
    resource: &GpuResource,
    desc: &ResourceDesc,
    format: NativeFormat,
) -> Result<DescriptorHandle, TextureError> {
    debug_assert_eq!(heap.kind(), DescriptorKind::DepthStencil);
    create_view(device, heap, resource, desc, format)
}

/// Formats of the views to create for a texture.
///
/// `NativeFormat::Unknown` means "no view". At most one of `render_target`
/// and `depth_stencil` may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewFormats {
    /// Format of the sampled view.
    pub shader_resource: NativeFormat,
    /// Format of the render-target view.
    pub render_target: NativeFormat,
    /// Format of the depth-stencil view.
    pub depth_stencil: NativeFormat,
}

impl ViewFormats {
    /// Only a sampled view.
    pub fn sampled(format: NativeFormat) -> Self {
        Self {
            shader_resource: format,
            ..Self::default()
        }
    }

    /// Set the render-target view format.
    pub fn with_render_target(mut self, format: NativeFormat) -> Self {
        self.render_target = format;
        self
    }

    /// Set the depth-stencil view format.
    pub fn with_depth_stencil(mut self, format: NativeFormat) -> Self {
        self.depth_stencil = format;
        self
    }
}

/// The render-target or depth-stencil view of a texture.
#[derive(Debug, PartialEq, Eq)]
pub enum TargetView {
    /// Color render-target view.
    RenderTarget(DescriptorHandle),
    /// Depth-stencil view.
    DepthStencil(DescriptorHandle),
}

/// Views owned by one texture.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    shader_resource: Option<DescriptorHandle>,
    target: Option<TargetView>,
}

impl DescriptorSet {
    /// Create every view requested by `formats`, or none of them.
    pub fn allocate<D: GpuDevice + ?Sized>(
        device: &mut D,
        heaps: &mut DescriptorHeaps,
        resource: &GpuResource,
        desc: &ResourceDesc,
        formats: &ViewFormats,
    ) -> Result<Self, TextureError> {
        debug_assert!(
            formats.render_target == NativeFormat::Unknown
                || formats.depth_stencil == NativeFormat::Unknown,
            "a texture has either a render-target or a depth-stencil view"
        );

        let mut set = Self::default();
        if formats.shader_resource != NativeFormat::Unknown {
            set.shader_resource = Some(create_shader_resource_view(
                device,
                &mut heaps.shader_resource,
                resource,
                desc,
                formats.shader_resource,
            )?);
        }

        let target = if formats.render_target != NativeFormat::Unknown {
            create_render_target_view(
                device,
                &mut heaps.render_target,
                resource,
                desc,
                formats.render_target,
            )
            .map(|handle| Some(TargetView::RenderTarget(handle)))
        } else if formats.depth_stencil != NativeFormat::Unknown {
            create_depth_stencil_view(
                device,
                &mut heaps.depth_stencil,
                resource,
                desc,
                formats.depth_stencil,
            )
            .map(|handle| Some(TargetView::DepthStencil(handle)))
        } else {
            Ok(None)
        };

        match target {
            Ok(target) => {
                set.target = target;
                Ok(set)
            }
            Err(e) => {
                set.release(device, heaps);
                Err(e)
            }
        }
    }

    /// Returns true if no view is held.
    pub fn is_empty(&self) -> bool {
        self.shader_resource.is_none() && self.target.is_none()
    }

    /// Number of views held.
    pub fn len(&self) -> usize {
        usize::from(self.shader_resource.is_some()) + usize::from(self.target.is_some())
    }

    /// Sampled view, if any.
    pub fn shader_resource(&self) -> Option<&DescriptorHandle> {
        self.shader_resource.as_ref()
    }

    /// Render-target view, if any.
    pub fn render_target(&self) -> Option<&DescriptorHandle> {
        match &self.target {
            Some(TargetView::RenderTarget(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Depth-stencil view, if any.
    pub fn depth_stencil(&self) -> Option<&DescriptorHandle> {
        match &self.target {
            Some(TargetView::DepthStencil(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Returns true if the target view is a depth-stencil view.
    pub fn is_depth_view(&self) -> bool {
        matches!(self.target, Some(TargetView::DepthStencil(_)))
    }

    /// Give up every handle.
    pub fn into_handles(self) -> impl Iterator<Item = DescriptorHandle> {
        let target = self.target.map(|target| match target {
            TargetView::RenderTarget(handle) | TargetView::DepthStencil(handle) => handle,
        });
        self.shader_resource.into_iter().chain(target)
    }

    /// Release every view immediately.
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D, heaps: &mut DescriptorHeaps) {
        for handle in self.into_handles() {
            heaps.release(device, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocate_and_free() {
        let mut heap = DescriptorHeap::new(DescriptorKind::ShaderResource, 2);
        assert_eq!(heap.free_count(), 2);

        let a = heap.allocate().unwrap();
        let b = heap.allocate().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(heap.allocate().is_none());
        assert_eq!(heap.allocated_count(), 2);

        heap.free(a).unwrap();
        assert_eq!(heap.free_count(), 1);
        let c = heap.allocate().unwrap();
        assert_eq!(c.index(), 0);
        assert_eq!(c.kind(), DescriptorKind::ShaderResource);
    }

    #[test]
    fn test_heap_rejects_foreign_handle() {
        let mut srv = DescriptorHeap::new(DescriptorKind::ShaderResource, 1);
        let mut rtv = DescriptorHeap::new(DescriptorKind::RenderTarget, 1);

        let handle = rtv.allocate().unwrap();
        let handle = srv.free(handle).unwrap_err();
        assert_eq!(srv.free_count(), 1);
        assert_eq!(rtv.allocated_count(), 1);

        rtv.free(handle).unwrap();
        assert_eq!(rtv.allocated_count(), 0);
        assert_eq!(rtv.free_count(), 1);
    }

    #[test]
    fn test_heap_rejects_double_free() {
        let mut heap = DescriptorHeap::new(DescriptorKind::DepthStencil, 2);
        let handle = heap.allocate().unwrap();
        let copy = DescriptorHandle {
            kind: handle.kind,
            index: handle.index,
        };
        heap.free(handle).unwrap();
        assert!(heap.free(copy).is_err());
        assert_eq!(heap.free_count(), 2);
    }

    #[test]
    fn test_view_desc_single_mip_for_sampled_view() {
        let desc = ResourceDesc::new_2d(64, 64, NativeFormat::Rgba8Unorm).with_levels(5);
        let view = ViewDesc::new(
            DescriptorKind::ShaderResource,
            NativeFormat::Rgba8Unorm,
            &desc,
        );
        assert_eq!(view.dimension, ViewDimension::Texture2D);
        assert_eq!(view.mip_levels, 1);
    }

    #[test]
    fn test_view_desc_multisampled() {
        let desc = ResourceDesc::new_2d(64, 64, NativeFormat::Rgba8Unorm).with_samples(4);
        let view = ViewDesc::new(DescriptorKind::RenderTarget, NativeFormat::Rgba8Unorm, &desc);
        assert_eq!(view.dimension, ViewDimension::Texture2DMultisampled);
        assert_eq!(view.mip_levels, 0);

        let desc = desc.with_layers(3);
        let view = ViewDesc::new(DescriptorKind::RenderTarget, NativeFormat::Rgba8Unorm, &desc);
        assert_eq!(
            view.dimension,
            ViewDimension::Texture2DMultisampledArray { layers: 3 }
        );
    }

    #[test]
    fn test_empty_set() {
        let set = DescriptorSet::default();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(!set.is_depth_view());
        assert_eq!(set.into_handles().count(), 0);
    }

    #[test]
    fn test_view_formats_builder() {
        let formats = ViewFormats::sampled(NativeFormat::R16Unorm)
            .with_depth_stencil(NativeFormat::D16Unorm);
        assert_eq!(formats.shader_resource, NativeFormat::R16Unorm);
        assert_eq!(formats.render_target, NativeFormat::Unknown);
        assert_eq!(formats.depth_stencil, NativeFormat::D16Unorm);
    }
}
