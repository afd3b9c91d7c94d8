//! Common utilities for texture integration tests.
//!
//! Tests run against the dummy device, which records barriers and copies
//! and lets a test hold back fence completion.

use redlilium_texture::{
    DummyDevice, GpuContext, GpuTexture, NativeFormat, ResourceDesc, TextureConfig, ViewFormats,
};

/// Compute the aligned bytes per row of an upload (256-byte pitch alignment).
pub fn aligned_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    (unpadded + 255) & !255
}

/// Generate a deterministic byte pattern.
#[allow(dead_code)]
pub fn generate_test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Route log output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a context on a fresh dummy device.
pub fn dummy_context(config: TextureConfig) -> GpuContext<DummyDevice> {
    init_logging();
    GpuContext::new(DummyDevice::new(), config).expect("Failed to create texture context")
}

/// Create a sampled 2D texture.
#[allow(dead_code)]
pub fn create_sampled_texture(
    ctx: &mut GpuContext<DummyDevice>,
    width: u32,
    height: u32,
    format: NativeFormat,
) -> GpuTexture {
    create_texture(ctx, width, height, format, ViewFormats::sampled(format))
}

/// Create a 2D texture with the given views.
#[allow(dead_code)]
pub fn create_texture(
    ctx: &mut GpuContext<DummyDevice>,
    width: u32,
    height: u32,
    format: NativeFormat,
    views: ViewFormats,
) -> GpuTexture {
    let mut texture = GpuTexture::new();
    texture
        .create(ctx, &ResourceDesc::new_2d(width, height, format), &views)
        .expect("Failed to create texture");
    texture
}
