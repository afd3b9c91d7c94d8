//! Core texture types.

mod desc;
mod format;
mod state;

pub use desc::{Rect, ResourceDesc, ResourceFlags};
pub use format::{NativeFormat, TextureFormat};
pub use state::ResourceState;
