//! Upload ring buffer for streaming pixel data to the GPU.
//!
//! A single host-visible buffer is shared by every upload recorded on the
//! submitting thread. Regions are bump-allocated from a write cursor; when
//! the cursor reaches the end it wraps to the start, but only into space the
//! GPU has finished reading.
//!
//! The GPU read position advances through fence tracking: each submission
//! remembers where the write cursor was, and once that submission's fence
//! completes everything before that point is free again.
//!
//! # Usage
//!
//! ```ignore
//! if ring.reserve_memory(size, placement_alignment) {
//!     let offset = ring.current_offset();
//!     ring.current_host_slice_mut()[..size as usize].copy_from_slice(data);
//!     ring.commit_memory(size);
//!     // record a copy from ring.buffer() at `offset`
//! }
//! ```
//!
//! # Thread Safety
//!
//! Reservation and commit are not reentrant; the single submitting thread
//! sequences them. A commit must follow a reservation at least as large.

use std::collections::VecDeque;
use std::fmt;

use crate::device::{GpuResource, HostBuffer};
use crate::error::TextureError;
use crate::upload::align_up;

/// Host-visible ring buffer shared by streaming uploads.
pub struct UploadRingBuffer {
    buffer: HostBuffer,
    capacity: u32,
    current_offset: u32,
    gpu_position: u32,
    tracked: VecDeque<(u64, u32)>,
    wrap_count: u64,
    reserved: Option<u32>,
}

impl UploadRingBuffer {
    /// Wrap a host buffer. Its whole mapping becomes ring space.
    ///
    /// On failure the buffer is handed back so the caller can release it.
    pub fn new(buffer: HostBuffer) -> Result<Self, (TextureError, HostBuffer)> {
        let capacity = match u32::try_from(buffer.memory.len()) {
            Ok(0) => {
                return Err((
                    TextureError::InvalidParameter(
                        "stream buffer capacity cannot be zero".to_string(),
                    ),
                    buffer,
                ));
            }
            Ok(capacity) => capacity,
            Err(_) => {
                return Err((
                    TextureError::InvalidParameter(format!(
                        "stream buffer of {} bytes exceeds 4 GiB",
                        buffer.memory.len()
                    )),
                    buffer,
                ));
            }
        };

        Ok(Self {
            buffer,
            capacity,
            current_offset: 0,
            gpu_position: 0,
            tracked: VecDeque::new(),
            wrap_count: 0,
            reserved: None,
        })
    }

    /// The underlying GPU buffer.
    pub fn buffer(&self) -> &GpuResource {
        &self.buffer.resource
    }

    /// Total size in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Offset of the next write.
    pub fn current_offset(&self) -> u32 {
        self.current_offset
    }

    /// Offset up to which the GPU has consumed the buffer.
    pub fn gpu_position(&self) -> u32 {
        self.gpu_position
    }

    /// Size of the outstanding reservation, if one has not been committed yet.
    pub fn reserved_size(&self) -> Option<u32> {
        self.reserved
    }

    /// Number of times the write cursor wrapped to the start.
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count
    }

    /// The whole host mapping.
    pub fn host_slice(&self) -> &[u8] {
        self.buffer.memory.as_slice()
    }

    /// Writable host memory starting at the current offset.
    pub fn current_host_slice_mut(&mut self) -> &mut [u8] {
        let offset = self.current_offset as usize;
        &mut self.buffer.memory.as_mut_slice()[offset..]
    }

    /// Move the write cursor to an aligned position with `size` free bytes after it.
    ///
    /// Returns false if no such position exists until more submitted work
    /// completes. The cursor is left untouched in that case.
    pub fn reserve_memory(&mut self, size: u32, alignment: u32) -> bool {
        debug_assert!(alignment.is_power_of_two(), "alignment must be power of 2");

        if size > self.capacity {
            log::error!(
                "Stream buffer reservation of {size} bytes exceeds capacity of {}",
                self.capacity
            );
            return false;
        }

        if self.current_offset == self.gpu_position && self.tracked.is_empty() {
            self.current_offset = 0;
            self.gpu_position = 0;
        }

        let aligned = u64::from(align_up(self.current_offset, alignment));
        let end = aligned + u64::from(size);

        if self.current_offset >= self.gpu_position {
            if end <= u64::from(self.capacity) {
                self.current_offset = aligned as u32;
                self.reserved = Some(size);
                return true;
            }
            // Wrap, leaving at least one byte between the cursor and the GPU.
            if size < self.gpu_position {
                self.current_offset = 0;
                self.wrap_count += 1;
                self.reserved = Some(size);
                return true;
            }
        } else if end < u64::from(self.gpu_position) {
            self.current_offset = aligned as u32;
            self.reserved = Some(size);
            return true;
        }

        false
    }

    /// Advance the write cursor past `size` bytes written at the current offset.
    ///
    /// Consumes the outstanding reservation. Returns false, leaving the
    /// cursor alone, if there is none or it is smaller than `size`.
    pub fn commit_memory(&mut self, size: u32) -> bool {
        match self.reserved.take() {
            Some(reserved) if size <= reserved => {
                self.current_offset += size;
                true
            }
            reserved => {
                log::error!(
                    "Stream buffer commit of {size} bytes without a matching reservation ({reserved:?})"
                );
                self.reserved = reserved;
                false
            }
        }
    }

    /// Remember that work signalling `fence` reads everything written so far.
    pub fn track_fence(&mut self, fence: u64) {
        if self
            .tracked
            .back()
            .is_some_and(|(_, offset)| *offset == self.current_offset)
        {
            return;
        }
        if self.tracked.is_empty() && self.current_offset == self.gpu_position {
            return;
        }
        self.tracked.push_back((fence, self.current_offset));
    }

    /// Release space read by work whose fence value is at most `completed`.
    pub fn reclaim(&mut self, completed: u64) {
        while let Some(&(fence, offset)) = self.tracked.front() {
            if fence > completed {
                break;
            }
            self.gpu_position = offset;
            self.tracked.pop_front();
        }
    }

    /// Give back the underlying host buffer.
    pub fn into_buffer(self) -> HostBuffer {
        self.buffer
    }
}

impl fmt::Debug for UploadRingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRingBuffer")
            .field("capacity", &self.capacity)
            .field("current_offset", &self.current_offset)
            .field("gpu_position", &self.gpu_position)
            .field("in_flight", &self.tracked.len())
            .field("wrap_count", &self.wrap_count)
            .field("reserved", &self.reserved)
            .field("buffer", &self.buffer.resource.id())
            .finish()
    }
}
