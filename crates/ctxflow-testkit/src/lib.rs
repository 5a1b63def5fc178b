//! Test support executor for the ctxflow workspace
//!
//! The propagating decorator needs a real delegate with real worker threads
//! to be exercised meaningfully. [`FixedThreadPool`] is that delegate: a
//! deliberately small fixed-size pool implementing the full `TaskExecutor`
//! surface, including cancellation, racing, and lifecycle control. It is not
//! intended for production scheduling workloads.

pub mod pool;

pub use pool::{FixedThreadPool, PoolConfig};
