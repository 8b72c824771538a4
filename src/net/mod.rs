// net/mod.rs
//! Networking layer: outbound dialers, reusable frame buffers and the
//! bidirectional copy engine. Nothing in here knows about sessions.

pub mod bicopy;
pub mod buffer_pool;
pub mod dialer;

pub use bicopy::{BiCopyStats, bi_copy};
pub use buffer_pool::{BufferPool, PooledBuf};
pub use dialer::{Dialer, MultiPathDialer, PathSpec, TargetedDialer};
