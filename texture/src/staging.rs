//! Temporary host-writable resources for uploads too large for the stream buffer.

use crate::context::GpuContext;
use crate::device::{BufferTextureCopy, GpuDevice, GpuResource, HostBuffer};
use crate::error::TextureError;
use crate::types::{NativeFormat, Rect};
use crate::upload::{UploadLayout, checked_align_up};

/// A CPU-writable staging resource holding `width` x `height` pixels.
///
/// Rows are stored with the context's pitch alignment so the contents can be
/// copied straight into a texture.
#[derive(Debug)]
pub struct StagingTexture {
    buffer: HostBuffer,
    width: u32,
    height: u32,
    format: NativeFormat,
    pitch: u32,
    cpu_writable: bool,
}

impl StagingTexture {
    /// Create a staging resource.
    ///
    /// # Errors
    ///
    /// Returns [`TextureError::StagingFailure`] if the format has no pixel
    /// size, a row does not fit in a 32-bit pitch, or the device cannot
    /// allocate the memory.
    pub fn create<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        width: u32,
        height: u32,
        format: NativeFormat,
        cpu_writable: bool,
    ) -> Result<Self, TextureError> {
        let bytes_per_pixel = format.bytes_per_pixel();
        if bytes_per_pixel == 0 || width == 0 || height == 0 {
            log::error!("Invalid staging texture {width}x{height} {format:?}");
            return Err(TextureError::StagingFailure(format!(
                "cannot stage {width}x{height} pixels of {format:?}"
            )));
        }

        let alignment = ctx.config().pitch_alignment;
        let Some(pitch) = width
            .checked_mul(bytes_per_pixel)
            .and_then(|row_bytes| checked_align_up(row_bytes, alignment))
        else {
            log::error!("Staging texture row of {width} {format:?} pixels overflows its pitch");
            return Err(TextureError::StagingFailure(format!(
                "row of {width} pixels of {format:?} is too wide to stage"
            )));
        };
        let size = u64::from(pitch) * u64::from(height);
        let buffer = ctx.device_mut().create_host_buffer(size).map_err(|e| {
            log::error!("Failed to create {width}x{height} {format:?} staging texture: {e}");
            TextureError::StagingFailure(e.to_string())
        })?;

        ctx.stats_mut().staging_created += 1;
        log::debug!(
            "Created staging texture {:?} ({width}x{height} {format:?}, pitch {pitch})",
            buffer.resource.id()
        );

        Ok(Self {
            buffer,
            width,
            height,
            format,
            pitch,
            cpu_writable,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    pub fn format(&self) -> NativeFormat {
        self.format
    }

    /// Bytes between rows.
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// The underlying resource.
    pub fn resource(&self) -> &GpuResource {
        &self.buffer.resource
    }

    /// Host view of the staged pixels.
    pub fn contents(&self) -> &[u8] {
        self.buffer.memory.as_slice()
    }

    /// Write `width` x `height` pixels from `data` (rows `stride` bytes apart) at (`x`, `y`).
    ///
    /// # Errors
    ///
    /// Returns [`TextureError::StagingFailure`] if the resource is not CPU
    /// writable, the rectangle falls outside it, or `data` is too short.
    pub fn write_pixels(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
        stride: u32,
    ) -> Result<(), TextureError> {
        if !self.cpu_writable {
            return Err(TextureError::StagingFailure(
                "staging texture is not CPU writable".to_string(),
            ));
        }

        let region = Rect::new(x, y, width, height);
        if !region.fits_within(self.width, self.height) {
            return Err(TextureError::StagingFailure(format!(
                "{region:?} outside {}x{} staging texture",
                self.width, self.height
            )));
        }

        let bytes_per_pixel = self.format.bytes_per_pixel();
        let layout = UploadLayout {
            upload_pitch: self.pitch,
            ..UploadLayout::new(region, bytes_per_pixel, stride, 1)
        };
        layout
            .validate_source(data)
            .map_err(|e| TextureError::StagingFailure(e.to_string()))?;

        let pitch = self.pitch as usize;
        let start = y as usize * pitch + (x * bytes_per_pixel) as usize;
        let memory = &mut self.buffer.memory.as_mut_slice()[start..];
        if x == 0 && width == self.width {
            layout.write(memory, data);
        } else {
            // Partial rows: copy pixel bytes only so neighbouring pixels survive.
            let row_bytes = layout.row_bytes as usize;
            for (row, src_row) in data.chunks(stride as usize).take(height as usize).enumerate() {
                let offset = row * pitch;
                memory[offset..offset + row_bytes].copy_from_slice(&src_row[..row_bytes]);
            }
        }
        Ok(())
    }

    /// Record a copy of `src` from this resource into `destination` at (`dst_x`, `dst_y`).
    pub fn copy_to_texture<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        src: Rect,
        destination: &GpuResource,
        dst_x: u32,
        dst_y: u32,
    ) {
        debug_assert!(src.fits_within(self.width, self.height));
        let bytes_per_pixel = self.format.bytes_per_pixel();
        let copy = BufferTextureCopy {
            source: self.buffer.resource.id(),
            source_offset: u64::from(src.y) * u64::from(self.pitch)
                + u64::from(src.x * bytes_per_pixel),
            row_pitch: self.pitch,
            format: self.format,
            destination: destination.id(),
            region: Rect::new(dst_x, dst_y, src.width, src.height),
        };
        ctx.device_mut().record_copy_buffer_to_texture(&copy);
    }

    /// Release the staging resource.
    ///
    /// Immediate destruction is valid right after recording a copy from this
    /// resource: the device keeps it alive for commands already recorded.
    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>, deferred: bool) {
        log::debug!(
            "Destroying staging texture {:?} (deferred: {deferred})",
            self.buffer.resource.id()
        );
        ctx.stats_mut().staging_destroyed += 1;
        ctx.destroy_resource(self.buffer.resource, deferred);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::config::TextureConfig;

    fn context() -> GpuContext<DummyDevice> {
        GpuContext::new(DummyDevice::new(), TextureConfig::default()).unwrap()
    }

    #[test]
    fn test_pitch_follows_alignment() {
        let mut ctx = context();
        let small = StagingTexture::create(&mut ctx, 4, 4, NativeFormat::R8Unorm, true).unwrap();
        let wide = StagingTexture::create(&mut ctx, 100, 2, NativeFormat::Rgba8Unorm, true).unwrap();
        assert_eq!(small.pitch(), 256);
        assert_eq!(wide.pitch(), 512);
        assert_eq!(wide.contents().len(), 1024);
        assert_eq!(ctx.stats().staging_created, 2);

        small.destroy(&mut ctx, false);
        wide.destroy(&mut ctx, false);
    }

    #[test]
    fn test_create_rejects_overflowing_row() {
        let mut ctx = context();
        let buffers = ctx.device().live_buffer_count();
        assert!(matches!(
            StagingTexture::create(&mut ctx, 0x4000_0001, 1, NativeFormat::Rgba8Unorm, true),
            Err(TextureError::StagingFailure(_))
        ));
        // Fits before alignment, overflows after.
        assert!(matches!(
            StagingTexture::create(&mut ctx, u32::MAX - 1, 1, NativeFormat::R8Unorm, true),
            Err(TextureError::StagingFailure(_))
        ));
        assert_eq!(ctx.device().live_buffer_count(), buffers);
        assert_eq!(ctx.stats().staging_created, 0);
    }

    #[test]
    fn test_create_rejects_empty_or_unknown() {
        let mut ctx = context();
        for (width, height, format) in [
            (0, 4, NativeFormat::R8Unorm),
            (4, 0, NativeFormat::R8Unorm),
            (4, 4, NativeFormat::Unknown),
        ] {
            assert!(matches!(
                StagingTexture::create(&mut ctx, width, height, format, true),
                Err(TextureError::StagingFailure(_))
            ));
        }
    }

    #[test]
    fn test_full_width_write_repacks_rows() {
        let mut ctx = context();
        let mut staging =
            StagingTexture::create(&mut ctx, 2, 3, NativeFormat::Rgba8Unorm, true).unwrap();
        // Source rows are 12 bytes apart, 8 of them pixel data.
        let data: Vec<u8> = (0..36).collect();
        staging.write_pixels(0, 0, 2, 3, &data, 12).unwrap();

        let contents = staging.contents();
        for row in 0..3 {
            let src = &data[row * 12..row * 12 + 8];
            assert_eq!(&contents[row * 256..row * 256 + 8], src);
        }

        staging.destroy(&mut ctx, false);
    }

    #[test]
    fn test_write_rejects_short_source() {
        let mut ctx = context();
        let mut staging = StagingTexture::create(&mut ctx, 4, 4, NativeFormat::R8Unorm, true).unwrap();
        assert!(matches!(
            staging.write_pixels(0, 0, 4, 4, &[0; 15], 4),
            Err(TextureError::StagingFailure(_))
        ));
        staging.destroy(&mut ctx, false);
    }

    #[test]
    fn test_copy_offsets_into_source_rows() {
        let mut ctx = context();
        let staging = StagingTexture::create(&mut ctx, 8, 8, NativeFormat::Rgba8Unorm, true).unwrap();
        let destination = GpuResource::new(crate::device::ResourceId::new(999));

        staging.copy_to_texture(&mut ctx, Rect::new(2, 3, 4, 4), &destination, 1, 1);
        let copies = ctx.device().copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].source_offset, 3 * 256 + 2 * 4);
        assert_eq!(copies[0].row_pitch, 256);
        assert_eq!(copies[0].region, Rect::new(1, 1, 4, 4));

        destination.into_id();
        staging.destroy(&mut ctx, false);
    }
}
