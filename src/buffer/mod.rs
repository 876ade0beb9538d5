//! The buffer pool manager: a fixed-size array of frames, clock (second
//! chance) replacement, and a pin/unpin discipline enforced through the
//! `PageGuard` RAII handle.

pub mod frame;
pub mod guard;
pub mod pool;

pub use frame::FrameDescriptor;
pub use guard::PageGuard;
pub use pool::{BufferPool, BufferPoolHandle, BufferPoolStats, FileId};
