use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_texture::upload::copy_rows;
use redlilium_texture::{
    DummyDevice, GpuContext, GpuResource, GpuTexture, HostBuffer, HostMemory, NativeFormat, Rect,
    ResourceDesc, ResourceId, TextureConfig, UploadLayout, UploadRingBuffer, ViewFormats,
};

// ---------------------------------------------------------------------------
// Row copies
// ---------------------------------------------------------------------------

fn bench_copy_rows_equal_pitch(c: &mut Criterion) {
    let src = vec![0xABu8; 256 * 256];
    let mut dst = vec![0u8; 256 * 256];
    c.bench_function("copy_rows_256x256_equal_pitch", |b| {
        b.iter(|| {
            copy_rows(&mut dst, 256, black_box(&src), 256, 256);
            black_box(&dst);
        });
    });
}

fn bench_copy_rows_padded(c: &mut Criterion) {
    let src = vec![0xABu8; 1000 * 256];
    let mut dst = vec![0u8; 1024 * 256];
    c.bench_function("copy_rows_1000x256_padded", |b| {
        b.iter(|| {
            copy_rows(&mut dst, 1024, black_box(&src), 1000, 256);
            black_box(&dst);
        });
    });
}

fn bench_upload_layout_write(c: &mut Criterion) {
    let layout = UploadLayout::new(Rect::new(0, 0, 250, 512), 4, 1000, 256);
    let src = vec![0x5Au8; layout.required_source_len()];
    let mut dst = vec![0u8; layout.upload_size as usize];
    c.bench_function("upload_layout_write_250x512_rgba8", |b| {
        b.iter(|| {
            layout.write(&mut dst, black_box(&src));
            black_box(&dst);
        });
    });
}

// ---------------------------------------------------------------------------
// Stream buffer
// ---------------------------------------------------------------------------

fn bench_ring_reserve_commit(c: &mut Criterion) {
    let buffer = HostBuffer {
        resource: GpuResource::new(ResourceId::new(1)),
        memory: HostMemory::zeroed(1 << 20),
    };
    let Ok(mut ring) = UploadRingBuffer::new(buffer) else {
        return;
    };
    let mut fence = 0;

    c.bench_function("ring_reserve_commit_4k", |b| {
        b.iter(|| {
            if !ring.reserve_memory(black_box(4096), 512) {
                fence += 1;
                ring.track_fence(fence);
                ring.reclaim(fence);
                ring.reserve_memory(4096, 512);
            }
            ring.commit_memory(4096);
        });
    });

    ring.into_buffer().resource.into_id();
}

// ---------------------------------------------------------------------------
// Texture uploads
// ---------------------------------------------------------------------------

fn bench_streaming_upload(c: &mut Criterion) {
    let _ = env_logger::builder().try_init();
    let Ok(mut ctx) = GpuContext::new(DummyDevice::new(), TextureConfig::default()) else {
        return;
    };
    let mut texture = GpuTexture::new();
    if texture
        .create(
            &mut ctx,
            &ResourceDesc::new_2d(128, 128, NativeFormat::Rgba8Unorm),
            &ViewFormats::sampled(NativeFormat::Rgba8Unorm),
        )
        .is_err()
    {
        return;
    }
    let data = vec![0x11u8; 128 * 128 * 4];

    c.bench_function("texture_streaming_upload_128x128_rgba8", |b| {
        b.iter(|| {
            let _ = texture.load_data(&mut ctx, 0, 0, 128, 128, black_box(&data), 512);
            ctx.submit(false);
        });
    });

    texture.destroy(&mut ctx, false);
    ctx.shutdown();
}

criterion_group!(
    benches,
    bench_copy_rows_equal_pitch,
    bench_copy_rows_padded,
    bench_upload_layout_write,
    bench_ring_reserve_commit,
    bench_streaming_upload,
);
criterion_main!(benches);
