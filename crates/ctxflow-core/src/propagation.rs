// Save/apply/restore protocol around task execution
//
// Wrapping captures the submitting thread's values immediately; the wrapped
// task applies them on whichever worker thread runs it and restores that
// thread's own values on every exit path, panics included.

use crate::executor::Task;
use crate::registry::VarRegistry;
use crate::variable::ContextVar;

/// Per-task, per-variable bookkeeping: the value to apply on the worker
/// thread and the worker's own value to put back afterwards.
///
/// Each record is applied and restored exactly once, around exactly one
/// execution of the wrapped task, always on the same thread.
pub trait PropagationRecord: Send {
    /// Save the current thread's value, then overwrite it with the value
    /// captured from the submitting thread.
    fn apply(&mut self);

    /// Put the value saved by [`apply`](Self::apply) back. A record that was
    /// never applied restores nothing.
    fn restore(&mut self);
}

/// Typed record for one `ContextVar<T>`.
pub(crate) struct VarRecord<T: Clone + Send + 'static> {
    variable: ContextVar<T>,
    replacement: T,
    saved: Option<T>,
}

impl<T: Clone + Send + 'static> VarRecord<T> {
    pub(crate) fn new(variable: ContextVar<T>, replacement: T) -> Self {
        VarRecord {
            variable,
            replacement,
            saved: None,
        }
    }
}

impl<T: Clone + Send + 'static> PropagationRecord for VarRecord<T> {
    fn apply(&mut self) {
        self.saved = Some(self.variable.get());
        self.variable.set(self.replacement.clone());
    }

    fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.variable.set(saved);
        }
    }
}

/// Restores all applied records when dropped, so the worker thread's values
/// survive both normal completion and unwinding out of the task.
struct RestoreGuard {
    records: Vec<Box<dyn PropagationRecord>>,
}

impl RestoreGuard {
    fn new(records: Vec<Box<dyn PropagationRecord>>) -> Self {
        RestoreGuard { records }
    }

    fn apply_all(&mut self) {
        for record in self.records.iter_mut() {
            record.apply();
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        // Same order as apply; un-applied records are no-ops.
        for record in self.records.iter_mut() {
            record.restore();
        }
    }
}

/// Wrap a task so it runs with the submitting thread's context values.
///
/// The registry's variables are read here, on the calling thread, exactly
/// once. The returned task may run on any thread at any later time; the
/// submitting thread is free to mutate its variables, or exit, in between.
pub fn propagated<T: 'static>(task: Task<T>, registry: &VarRegistry) -> Task<T> {
    let records = registry.capture_all();
    Box::new(move || {
        let mut guard = RestoreGuard::new(records);
        guard.apply_all();
        task()
    })
}
