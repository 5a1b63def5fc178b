//! Thread-context propagation for task-execution services
//!
//! This crate decorates a task executor so that a configured set of
//! thread-scoped context variables flows from the threads that submit tasks
//! to the worker threads that execute them. Workers' own values are restored
//! when each task completes, success or failure alike, so the net effect is
//! that submitted tasks run with the context of their submitting thread.

pub mod executor;
pub mod propagation;
pub mod registry;
pub mod service;
pub mod variable;

// Re-export key types
pub use executor::{Job, ResultSender, Task, TaskExecutor, TaskHandle};
pub use propagation::{propagated, PropagationRecord};
pub use registry::VarRegistry;
pub use service::PropagatingExecutor;
pub use variable::{ContextVar, PropagatedVar};

pub use ctxflow_error::{ExecutorError, ExecutorResult};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
