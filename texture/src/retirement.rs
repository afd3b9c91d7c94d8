//! Deferred destruction of resources and descriptors.
//!
//! GPU commands execute asynchronously: when a texture is destroyed, work
//! already recorded or submitted may still read its resource and views. The
//! retirement queue holds them until the device confirms that the fence value
//! current at retirement time has been reached.
//!
//! ```text
//! retire(item, fence N)        reap(completed)
//!        │                            │
//!        ▼                            ▼
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ fence N-1│ fence N  │ fence N  │ fence N+1│  ──► entries with fence <= completed
//! └──────────┴──────────┴──────────┴──────────┘      are handed back for freeing
//! ```

use std::collections::VecDeque;
use std::fmt;

use crate::descriptor::DescriptorHandle;
use crate::device::GpuResource;

/// Something waiting for the GPU to finish with it.
#[derive(Debug)]
pub enum Retired {
    /// A native resource.
    Resource(GpuResource),
    /// A descriptor slot and the view it holds.
    Descriptor(DescriptorHandle),
}

/// Queue of retired items keyed to monotonically increasing fence values.
#[derive(Default)]
pub struct RetirementQueue {
    entries: VecDeque<(u64, Retired)>,
}

impl RetirementQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `item` until fence value `fence` completes.
    pub fn retire(&mut self, item: Retired, fence: u64) {
        debug_assert!(
            self.entries.back().is_none_or(|(last, _)| *last <= fence),
            "fence values must not go backwards"
        );
        self.entries.push_back((fence, item));
    }

    /// Remove and return every item whose fence value is at most `completed`.
    pub fn reap(&mut self, completed: u64) -> Vec<Retired> {
        let ready = self
            .entries
            .iter()
            .take_while(|(fence, _)| *fence <= completed)
            .count();
        self.entries.drain(..ready).map(|(_, item)| item).collect()
    }

    /// Remove and return everything regardless of fence values.
    ///
    /// Only valid once the device is idle.
    pub fn drain_all(&mut self) -> Vec<Retired> {
        self.entries.drain(..).map(|(_, item)| item).collect()
    }

    /// Number of items waiting.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RetirementQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetirementQueue")
            .field("pending", &self.entries.len())
            .field("oldest_fence", &self.entries.front().map(|(fence, _)| *fence))
            .finish()
    }
}
