//! Upload layout math and the row copy shared by both upload paths.

use crate::error::TextureError;
use crate::types::Rect;

/// Align a value up to the given power-of-two alignment.
#[inline]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Like [`align_up`], but `None` when the result does not fit in a `u32`.
#[inline]
pub fn checked_align_up(value: u32, alignment: u32) -> Option<u32> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|padded| padded & !(alignment - 1))
}

/// Layout of one upload: where it goes and how its rows are laid out in
/// the caller's memory and in upload memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLayout {
    /// Destination rectangle in the texture.
    pub region: Rect,
    /// Bytes between rows in the caller's data.
    pub source_pitch: u32,
    /// Bytes of pixel data in one row.
    pub row_bytes: u32,
    /// Bytes between rows in upload memory, aligned to the pitch alignment.
    pub upload_pitch: u32,
    /// Total bytes of upload memory, `upload_pitch * height`.
    pub upload_size: u64,
}

impl UploadLayout {
    /// Compute the layout for uploading `region` of `bytes_per_pixel` pixels.
    pub fn new(region: Rect, bytes_per_pixel: u32, source_pitch: u32, pitch_alignment: u32) -> Self {
        let row_bytes = region.width * bytes_per_pixel;
        let upload_pitch = align_up(row_bytes, pitch_alignment);
        Self {
            region,
            source_pitch,
            row_bytes,
            upload_pitch,
            upload_size: u64::from(upload_pitch) * u64::from(region.height),
        }
    }

    /// Smallest source slice that holds every row of the region.
    pub fn required_source_len(&self) -> usize {
        match self.region.height {
            0 => 0,
            rows => (rows as usize - 1) * self.source_pitch as usize + self.row_bytes as usize,
        }
    }

    /// Check that `data` can be read with this layout.
    pub fn validate_source(&self, data: &[u8]) -> Result<(), TextureError> {
        if self.source_pitch < self.row_bytes {
            return Err(TextureError::InvalidParameter(format!(
                "source pitch {} is smaller than a row of {} bytes",
                self.source_pitch, self.row_bytes
            )));
        }
        let required = self.required_source_len();
        if data.len() < required {
            return Err(TextureError::InvalidParameter(format!(
                "source holds {} bytes, {required} needed",
                data.len()
            )));
        }
        Ok(())
    }

    /// Copy the caller's rows into upload memory laid out with `upload_pitch`.
    pub fn write(&self, dst: &mut [u8], src: &[u8]) {
        copy_rows(
            dst,
            self.upload_pitch as usize,
            src,
            self.source_pitch as usize,
            self.region.height as usize,
        );
    }
}

/// Copy `rows` rows from `src` to `dst`.
///
/// Equal pitches are copied in one block. Otherwise each row copies
/// `min(src_pitch, dst_pitch)` bytes, leaving the tail of wider destination
/// rows untouched. Copies are clipped to the bytes actually present, so a
/// final source row may be shorter than its pitch.
pub fn copy_rows(dst: &mut [u8], dst_pitch: usize, src: &[u8], src_pitch: usize, rows: usize) {
    if rows == 0 || dst_pitch == 0 || src_pitch == 0 {
        return;
    }

    if src_pitch == dst_pitch {
        let len = (src_pitch * rows).min(src.len()).min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }

    let row_len = src_pitch.min(dst_pitch);
    for (dst_row, src_row) in dst
        .chunks_mut(dst_pitch)
        .zip(src.chunks(src_pitch))
        .take(rows)
    {
        let len = row_len.min(src_row.len()).min(dst_row.len());
        dst_row[..len].copy_from_slice(&src_row[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 256, 0)]
    #[case(1, 256, 256)]
    #[case(256, 256, 256)]
    #[case(257, 256, 512)]
    #[case(100, 64, 128)]
    fn test_align_up(#[case] value: u32, #[case] alignment: u32, #[case] expected: u32) {
        assert_eq!(align_up(value, alignment), expected);
    }

    #[test]
    fn test_checked_align_up_overflow() {
        assert_eq!(checked_align_up(257, 256), Some(512));
        assert_eq!(checked_align_up(u32::MAX - 255, 256), Some(u32::MAX - 255));
        assert_eq!(checked_align_up(u32::MAX - 254, 256), None);
    }

    #[test]
    fn test_layout_pads_rows() {
        let layout = UploadLayout::new(Rect::new(0, 0, 100, 3), 4, 400, 256);
        assert_eq!(layout.row_bytes, 400);
        assert_eq!(layout.upload_pitch, 512);
        assert_eq!(layout.upload_size, 1536);
        assert_eq!(layout.required_source_len(), 1200);
    }

    #[test]
    fn test_layout_large_region_does_not_overflow() {
        let layout = UploadLayout::new(Rect::new(0, 0, 65535, 65535), 4, 65535 * 4, 256);
        assert_eq!(layout.upload_pitch, 262144);
        assert_eq!(layout.upload_size, 262144 * 65535);
    }

    #[test]
    fn test_validate_source() {
        let layout = UploadLayout::new(Rect::new(0, 0, 4, 2), 1, 8, 256);
        assert!(layout.validate_source(&[0; 12]).is_ok());
        assert!(layout.validate_source(&[0; 11]).is_err());

        let layout = UploadLayout::new(Rect::new(0, 0, 4, 2), 1, 3, 256);
        assert!(layout.validate_source(&[0; 64]).is_err());
    }

    #[test]
    fn test_copy_rows_equal_pitch_is_identical() {
        let src: Vec<u8> = (0..64).collect();
        let mut dst = vec![0u8; 64];
        copy_rows(&mut dst, 16, &src, 16, 4);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_copy_rows_narrow_source() {
        let src: Vec<u8> = (1..=12).collect();
        let mut dst = vec![0xEE; 24];
        copy_rows(&mut dst, 8, &src, 4, 3);

        for row in 0..3 {
            assert_eq!(&dst[row * 8..row * 8 + 4], &src[row * 4..row * 4 + 4]);
            assert_eq!(&dst[row * 8 + 4..row * 8 + 8], &[0xEE; 4]);
        }
    }

    #[test]
    fn test_copy_rows_wide_source() {
        let src: Vec<u8> = (0..30).collect();
        let mut dst = vec![0u8; 12];
        copy_rows(&mut dst, 4, &src, 10, 3);
        assert_eq!(dst, vec![0, 1, 2, 3, 10, 11, 12, 13, 20, 21, 22, 23]);
    }

    #[test]
    fn test_copy_rows_short_last_row() {
        // Last source row only carries its pixel bytes, not the full pitch.
        let src = vec![7u8; 8 + 3];
        let mut dst = vec![0u8; 512];
        copy_rows(&mut dst, 256, &src, 8, 2);
        assert_eq!(&dst[..8], &[7; 8]);
        assert_eq!(&dst[256..259], &[7; 3]);
        assert_eq!(dst[259], 0);
    }
}
