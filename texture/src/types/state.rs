//! Resource usage states.

/// How the GPU is currently permitted to access a resource.
///
/// A texture tracks its own state and records a barrier whenever a
/// different state is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial state, usable for simultaneous-access scenarios only.
    #[default]
    Common,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a writable depth buffer.
    DepthWrite,
    /// Bound as a read-only depth buffer.
    DepthRead,
    /// Sampled by pixel shaders.
    PixelShaderResource,
    /// Sampled by non-pixel shader stages.
    NonPixelShaderResource,
    /// Destination of a copy.
    CopyDest,
    /// Source of a copy.
    CopySource,
    /// Handed to the presentation engine.
    Present,
}

impl ResourceState {
    /// Returns true if the state permits GPU writes.
    pub fn is_write(self) -> bool {
        matches!(self, Self::RenderTarget | Self::DepthWrite | Self::CopyDest)
    }
}
