// Propagating executor decorator
//
// Delegates to another `TaskExecutor` while copying the registered context
// variables from the threads that submit tasks to the threads that execute
// them. Previous values are restored when each task completes, so submitted
// tasks run with the context of the thread that submitted them without
// leaving residue on the workers.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use ctxflow_error::ExecutorResult;

use crate::executor::{Job, Task, TaskExecutor, TaskHandle};
use crate::propagation::propagated;
use crate::registry::VarRegistry;
use crate::variable::PropagatedVar;

/// Decorator that propagates thread-scoped context variables around an
/// underlying executor.
///
/// Every submission wraps the task on the calling thread (capturing that
/// thread's values) before handing it to the delegate; every lifecycle
/// operation forwards unchanged.
pub struct PropagatingExecutor<E> {
    delegate: E,
    registry: VarRegistry,
}

impl<E: TaskExecutor> PropagatingExecutor<E> {
    /// Decorate `delegate`, propagating the registry's variables.
    pub fn new(delegate: E, registry: VarRegistry) -> Self {
        PropagatingExecutor { delegate, registry }
    }

    /// Decorate `delegate`, propagating the given variables. Equivalent to
    /// [`new`](Self::new) with a registry built from the collection.
    pub fn with_vars(
        delegate: E,
        vars: impl IntoIterator<Item = Arc<dyn PropagatedVar>>,
    ) -> Self {
        PropagatingExecutor {
            delegate,
            registry: VarRegistry::new(vars),
        }
    }

    /// The wrapped executor.
    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    /// The variables this executor propagates.
    pub fn registry(&self) -> &VarRegistry {
        &self.registry
    }

    fn wrap<T: 'static>(&self, task: Task<T>) -> Task<T> {
        propagated(task, &self.registry)
    }
}

impl<E: TaskExecutor> TaskExecutor for PropagatingExecutor<E> {
    fn submit<T: Send + 'static>(&self, task: Task<T>) -> TaskHandle<T> {
        trace!(vars = self.registry.len(), "submitting task with captured context");
        self.delegate.submit(self.wrap(task))
    }

    fn submit_with_result<T: Send + 'static>(&self, task: Task<()>, result: T) -> TaskHandle<T> {
        trace!(vars = self.registry.len(), "submitting task with captured context");
        self.delegate.submit_with_result(self.wrap(task), result)
    }

    fn submit_all<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<TaskHandle<T>> {
        trace!(
            vars = self.registry.len(),
            tasks = tasks.len(),
            "submitting batch with captured context"
        );
        // All captures happen here, before any task can run, so the whole
        // batch shares one submitting-thread snapshot.
        let wrapped = tasks.into_iter().map(|task| self.wrap(task)).collect();
        self.delegate.submit_all(wrapped)
    }

    fn submit_all_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> Vec<TaskHandle<T>> {
        let wrapped = tasks.into_iter().map(|task| self.wrap(task)).collect();
        self.delegate.submit_all_within(wrapped, timeout)
    }

    fn submit_any<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> ExecutorResult<T> {
        let wrapped = tasks.into_iter().map(|task| self.wrap(task)).collect();
        self.delegate.submit_any(wrapped)
    }

    fn submit_any_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> ExecutorResult<T> {
        let wrapped = tasks.into_iter().map(|task| self.wrap(task)).collect();
        self.delegate.submit_any_within(wrapped, timeout)
    }

    fn execute(&self, task: Task<()>) {
        self.delegate.execute(self.wrap(task));
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }

    fn shutdown_now(&self) -> Vec<Job> {
        self.delegate.shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        self.delegate.is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        self.delegate.is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        self.delegate.await_termination(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::ContextVar;

    // Behavior against a real delegate lives in tests/propagating_executor.rs;
    // these cover construction only.

    #[derive(Default)]
    struct NoopExecutor;

    impl TaskExecutor for NoopExecutor {
        fn submit<T: Send + 'static>(&self, task: Task<T>) -> TaskHandle<T> {
            let (sender, handle) = TaskHandle::pair();
            sender.send(Ok(task()));
            handle
        }

        fn submit_all_within<T: Send + 'static>(
            &self,
            tasks: Vec<Task<T>>,
            _timeout: Duration,
        ) -> Vec<TaskHandle<T>> {
            self.submit_all(tasks)
        }

        fn submit_any<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> ExecutorResult<T> {
            let mut handles = self.submit_all(tasks);
            handles.remove(0).get()
        }

        fn submit_any_within<T: Send + 'static>(
            &self,
            tasks: Vec<Task<T>>,
            _timeout: Duration,
        ) -> ExecutorResult<T> {
            self.submit_any(tasks)
        }

        fn execute(&self, task: Task<()>) {
            task();
        }

        fn shutdown(&self) {}

        fn shutdown_now(&self) -> Vec<Job> {
            Vec::new()
        }

        fn is_shutdown(&self) -> bool {
            false
        }

        fn is_terminated(&self) -> bool {
            false
        }

        fn await_termination(&self, _timeout: Duration) -> bool {
            false
        }
    }

    #[test]
    fn test_construction_forms_are_equivalent() {
        let var = ContextVar::with_initial(String::new);

        let from_registry = PropagatingExecutor::new(
            NoopExecutor,
            VarRegistry::of(&[var.propagated()]),
        );
        let from_vars = PropagatingExecutor::with_vars(NoopExecutor, [var.propagated()]);

        assert_eq!(from_registry.registry().len(), 1);
        assert_eq!(from_vars.registry().len(), 1);
    }

    #[test]
    fn test_inline_delegate_sees_propagated_value() {
        let var = ContextVar::with_initial(|| "Initial".to_string());
        var.set("Parent".to_string());

        let fixture = PropagatingExecutor::with_vars(NoopExecutor, [var.propagated()]);
        let handle = fixture.submit(Box::new({
            let var = var.clone();
            move || var.get()
        }));

        assert_eq!(handle.get().expect("result"), "Parent");
    }
}
