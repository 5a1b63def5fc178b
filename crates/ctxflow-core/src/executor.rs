// Task-execution surface
//
// `TaskExecutor` is the submission and lifecycle surface an underlying
// executor must provide; the propagating decorator re-implements it
// one-to-one. Result delivery runs over one-shot crossbeam channels so
// handles block, time out, and observe disconnection without any polling in
// the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use ctxflow_error::{ExecutorError, ExecutorResult};

/// A unit of work producing a value.
pub type Task<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// An erased unit of work with no result, as held in an executor's queue.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the eventual result of a submitted task.
///
/// Retrieval consumes the handle, matching the one-shot nature of the
/// underlying channel. Cancellation is cooperative: a task cancelled before
/// it starts never runs; a task already running completes normally.
pub struct TaskHandle<T> {
    rx: Receiver<ExecutorResult<T>>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Create a connected sender/handle pair. Executors call this when
    /// accepting a task; the sender travels with the queued job.
    pub fn pair() -> (ResultSender<T>, TaskHandle<T>) {
        let (tx, rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let sender = ResultSender {
            tx,
            cancelled: Arc::clone(&cancelled),
            finished: Arc::clone(&finished),
        };
        let handle = TaskHandle {
            rx,
            cancelled,
            finished,
        };
        (sender, handle)
    }

    /// Block until the task's result is available.
    pub fn get(self) -> ExecutorResult<T> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(ExecutorError::Disconnected(
                "result channel closed before a value was produced".to_string(),
            ))
        })
    }

    /// Block until the task's result is available or the timeout elapses.
    pub fn get_within(self, timeout: Duration) -> ExecutorResult<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExecutorError::deadline_exceeded(format!(
                "no result within {timeout:?}"
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(ExecutorError::Disconnected(
                "result channel closed before a value was produced".to_string(),
            )),
        }
    }

    /// Request cancellation. Only prevents a start that has not happened yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether a result (value, error, or cancellation notice) is ready.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Producing side of a [`TaskHandle`], carried by the executor's queued job.
pub struct ResultSender<T> {
    tx: Sender<ExecutorResult<T>>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl<T> ResultSender<T> {
    /// Whether the paired handle requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Deliver the task's outcome. Dropping the sender without sending marks
    /// the handle disconnected instead.
    pub fn send(self, result: ExecutorResult<T>) {
        self.finished.store(true, Ordering::SeqCst);
        let _ = self.tx.send(result);
    }
}

/// Submission and lifecycle surface of a task-execution service.
///
/// Implementations schedule tasks on worker threads they own; the
/// propagating decorator wraps tasks and forwards every call here unchanged.
/// Submissions after shutdown are rejected through the returned handle
/// (`ExecutorError::RejectedExecution`) rather than by panicking.
pub trait TaskExecutor: Send + Sync {
    /// Submit a value-returning task.
    fn submit<T: Send + 'static>(&self, task: Task<T>) -> TaskHandle<T>;

    /// Submit a side-effecting task whose handle resolves to a fixed result
    /// once the task completes.
    fn submit_with_result<T: Send + 'static>(&self, task: Task<()>, result: T) -> TaskHandle<T> {
        self.submit(Box::new(move || {
            task();
            result
        }))
    }

    /// Submit a batch of tasks, returning handles in input order.
    fn submit_all<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<TaskHandle<T>> {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    /// Submit a batch of tasks and wait at most `timeout` for all of them to
    /// finish; tasks still unstarted at the deadline are cancelled. Handles
    /// are returned in input order.
    fn submit_all_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> Vec<TaskHandle<T>>;

    /// Submit competing tasks and return the first successful result; the
    /// remaining tasks are cancelled.
    fn submit_any<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> ExecutorResult<T>;

    /// Like [`submit_any`](Self::submit_any), but gives up once `timeout`
    /// elapses without a success.
    fn submit_any_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> ExecutorResult<T>;

    /// Submit a fire-and-forget task. No result tracking.
    fn execute(&self, task: Task<()>);

    /// Begin an orderly shutdown: queued tasks still run, new submissions
    /// are rejected.
    fn shutdown(&self);

    /// Shut down immediately, returning the queued jobs that never started.
    fn shutdown_now(&self) -> Vec<Job>;

    /// Whether shutdown has begun.
    fn is_shutdown(&self) -> bool;

    /// Whether shutdown has begun and all tasks have finished.
    fn is_terminated(&self) -> bool;

    /// Block until termination or the timeout; returns whether the executor
    /// terminated.
    fn await_termination(&self, timeout: Duration) -> bool;
}
