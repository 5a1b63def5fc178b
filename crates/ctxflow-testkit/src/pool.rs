// Fixed-size thread-pool executor
//
// A FIFO queue feeds a fixed set of worker threads. Jobs convert their own
// panics into task results before they reach the worker loop; the loop keeps
// a second guard anyway so a worker never dies mid-pool.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use ctxflow_core::executor::{Job, Task, TaskExecutor, TaskHandle};
use ctxflow_error::{ExecutorError, ExecutorResult};

/// Configuration for a [`FixedThreadPool`]
#[derive(Debug, Clone)]
pub struct PoolConfig {
    workers: usize,
    thread_name_prefix: String,
}

impl PoolConfig {
    /// Create a new configuration with a single worker
    pub fn new() -> Self {
        PoolConfig {
            workers: 1,
            thread_name_prefix: "ctxflow-worker".to_string(),
        }
    }

    /// Set the number of worker threads
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the prefix used for worker thread names
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Start a pool with this configuration
    pub fn build(self) -> FixedThreadPool {
        FixedThreadPool::start(self)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolState {
    queued: usize,
    active: usize,
    workers_alive: usize,
}

struct PoolInner {
    /// Submission side of the job queue; taken (dropped) on shutdown so the
    /// workers drain the queue and exit.
    queue_tx: Mutex<Option<Sender<Job>>>,
    /// Kept to drain never-started jobs on forced shutdown.
    queue_rx: Receiver<Job>,
    state: Mutex<PoolState>,
    idle: Condvar,
    shutdown: AtomicBool,
}

/// Fixed-size thread-pool executor with a FIFO queue
#[derive(Clone)]
pub struct FixedThreadPool {
    inner: Arc<PoolInner>,
}

impl FixedThreadPool {
    /// Start a pool with the given number of workers and default naming
    pub fn new(workers: usize) -> Self {
        PoolConfig::new().workers(workers).build()
    }

    fn start(config: PoolConfig) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let inner = Arc::new(PoolInner {
            queue_tx: Mutex::new(Some(tx)),
            queue_rx: rx.clone(),
            state: Mutex::new(PoolState {
                queued: 0,
                active: 0,
                workers_alive: config.workers,
            }),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        for index in 0..config.workers {
            let inner = Arc::clone(&inner);
            let rx = rx.clone();
            thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || worker_loop(&inner, &rx))
                .expect("spawn pool worker thread");
        }

        FixedThreadPool { inner }
    }

    fn sender(&self) -> Option<Sender<Job>> {
        self.inner.queue_tx.lock().clone()
    }

    fn enqueue(&self, tx: &Sender<Job>, job: Job) {
        {
            let mut state = self.inner.state.lock();
            state.queued += 1;
        }
        // Cannot disconnect: we hold a live sender clone.
        let _ = tx.send(job);
    }

    /// Race the given tasks; first success wins, losers are cancelled.
    fn race<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Option<Duration>,
    ) -> ExecutorResult<T> {
        if tasks.is_empty() {
            return Err(ExecutorError::NoTaskSucceeded(
                "empty task collection".to_string(),
            ));
        }

        let total = tasks.len();
        let (result_tx, result_rx) = unbounded::<ExecutorResult<T>>();
        let mut cancel_flags = Vec::with_capacity(total);

        for task in tasks {
            let cancelled = Arc::new(AtomicBool::new(false));
            cancel_flags.push(Arc::clone(&cancelled));
            let result_tx = result_tx.clone();

            match self.sender() {
                Some(queue_tx) => {
                    let job: Job = Box::new(move || {
                        if cancelled.load(Ordering::SeqCst) {
                            let _ = result_tx.send(Err(ExecutorError::Cancelled));
                            return;
                        }
                        let outcome = match catch_unwind(AssertUnwindSafe(|| task())) {
                            Ok(value) => Ok(value),
                            Err(payload) => {
                                Err(ExecutorError::panicked(panic_message(payload.as_ref())))
                            }
                        };
                        let _ = result_tx.send(outcome);
                    });
                    self.enqueue(&queue_tx, job);
                }
                None => {
                    let _ = result_tx.send(Err(ExecutorError::rejected("executor is shut down")));
                }
            }
        }
        drop(result_tx);

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut last_error = None;
        let mut outcomes = 0;
        while outcomes < total {
            let message = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        break;
                    }
                    match result_rx.recv_timeout(at - now) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match result_rx.recv() {
                    Ok(message) => message,
                    // Jobs discarded by a concurrent forced shutdown.
                    Err(_) => break,
                },
            };

            outcomes += 1;
            match message {
                Ok(value) => {
                    for flag in &cancel_flags {
                        flag.store(true, Ordering::SeqCst);
                    }
                    return Ok(value);
                }
                Err(err) => last_error = Some(err),
            }
        }

        for flag in &cancel_flags {
            flag.store(true, Ordering::SeqCst);
        }

        if outcomes < total {
            if deadline.is_some() {
                Err(ExecutorError::deadline_exceeded(format!(
                    "{} of {total} tasks finished before the deadline",
                    outcomes
                )))
            } else {
                Err(ExecutorError::Disconnected(
                    "executor shut down before every task reported".to_string(),
                ))
            }
        } else {
            Err(ExecutorError::NoTaskSucceeded(
                last_error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "every task failed".to_string()),
            ))
        }
    }
}

impl TaskExecutor for FixedThreadPool {
    fn submit<T: Send + 'static>(&self, task: Task<T>) -> TaskHandle<T> {
        let (sender, handle) = TaskHandle::pair();
        let Some(tx) = self.sender() else {
            sender.send(Err(ExecutorError::rejected("executor is shut down")));
            return handle;
        };

        let job: Job = Box::new(move || {
            if sender.is_cancelled() {
                sender.send(Err(ExecutorError::Cancelled));
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| task())) {
                Ok(value) => sender.send(Ok(value)),
                Err(payload) => {
                    sender.send(Err(ExecutorError::panicked(panic_message(payload.as_ref()))))
                }
            }
        });
        self.enqueue(&tx, job);
        handle
    }

    fn submit_all_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> Vec<TaskHandle<T>> {
        let handles: Vec<TaskHandle<T>> = tasks.into_iter().map(|task| self.submit(task)).collect();

        let deadline = Instant::now() + timeout;
        while !handles.iter().all(TaskHandle::is_finished) {
            if Instant::now() >= deadline {
                for handle in &handles {
                    if !handle.is_finished() {
                        handle.cancel();
                    }
                }
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        handles
    }

    fn submit_any<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> ExecutorResult<T> {
        self.race(tasks, None)
    }

    fn submit_any_within<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        timeout: Duration,
    ) -> ExecutorResult<T> {
        self.race(tasks, Some(timeout))
    }

    fn execute(&self, task: Task<()>) {
        let Some(tx) = self.sender() else {
            warn!("task rejected: executor is shut down");
            return;
        };
        let job: Job = Box::new(move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task())) {
                error!(panic = %panic_message(payload.as_ref()), "fire-and-forget task panicked");
            }
        });
        self.enqueue(&tx, job);
    }

    fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let (queued, active) = {
            let state = self.inner.state.lock();
            (state.queued, state.active)
        };
        debug!(queued, active, "executor shutting down");
        self.inner.queue_tx.lock().take();
    }

    fn shutdown_now(&self) -> Vec<Job> {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.queue_tx.lock().take();

        let mut pending = Vec::new();
        while let Ok(job) = self.inner.queue_rx.try_recv() {
            pending.push(job);
        }
        if !pending.is_empty() {
            let mut state = self.inner.state.lock();
            state.queued -= pending.len();
            self.inner.idle.notify_all();
        }
        debug!(pending = pending.len(), "executor shut down immediately");
        pending
    }

    fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.inner.state.lock().workers_alive == 0
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) && state.workers_alive == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner.idle.wait_for(&mut state, deadline - now);
        }
    }
}

impl std::fmt::Debug for FixedThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FixedThreadPool")
            .field("queued", &state.queued)
            .field("active", &state.active)
            .field("workers_alive", &state.workers_alive)
            .field("shutdown", &self.inner.shutdown.load(Ordering::SeqCst))
            .finish()
    }
}

fn worker_loop(inner: &Arc<PoolInner>, rx: &Receiver<Job>) {
    debug!("worker started");
    while let Ok(job) = rx.recv() {
        {
            let mut state = inner.state.lock();
            state.queued -= 1;
            state.active += 1;
        }
        if catch_unwind(AssertUnwindSafe(move || job())).is_err() {
            error!("job escaped its panic guard");
        }
        {
            let mut state = inner.state.lock();
            state.active -= 1;
        }
        inner.idle.notify_all();
    }
    {
        let mut state = inner.state.lock();
        state.workers_alive -= 1;
    }
    inner.idle.notify_all();
    debug!("worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn test_submit_runs_on_worker_thread() {
        let pool = FixedThreadPool::new(1);
        let caller = thread::current().id();

        let handle = pool.submit(Box::new(move || thread::current().id()));
        let worker = handle.get().expect("worker thread id");

        assert_ne!(worker, caller);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_with_result_resolves_after_completion() {
        let pool = FixedThreadPool::new(1);
        let handle = pool.submit_with_result(Box::new(|| {}), 23u32);

        assert_eq!(handle.get().expect("fixed result"), 23);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_panicking_task_reports_through_handle() {
        let pool = FixedThreadPool::new(1);
        let handle = pool.submit::<u32>(Box::new(|| panic!("boom")));

        match handle.get() {
            Err(ExecutorError::TaskPanicked(message)) => assert!(message.contains("boom")),
            other => panic!("expected TaskPanicked, got {other:?}"),
        }

        // The worker survives and keeps serving tasks.
        let handle = pool.submit(Box::new(|| 7u32));
        assert_eq!(handle.get().expect("follow-up task"), 7);

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_cancel_before_start_skips_the_task() {
        let pool = FixedThreadPool::new(1);
        let (release_tx, release_rx) = bounded::<()>(0);

        // Occupy the single worker so the next job stays queued.
        let blocker = pool.submit(Box::new(move || {
            release_rx.recv().expect("release signal");
        }));

        let victim = pool.submit(Box::new(|| 1u32));
        victim.cancel();
        release_tx.send(()).expect("release blocker");

        assert!(blocker.get().is_ok());
        assert_eq!(victim.get(), Err(ExecutorError::Cancelled));

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submission_after_shutdown_is_rejected() {
        let pool = FixedThreadPool::new(1);
        pool.shutdown();

        let handle = pool.submit(Box::new(|| 1u32));
        assert!(matches!(
            handle.get(),
            Err(ExecutorError::RejectedExecution(_))
        ));
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_shutdown_now_returns_pending_jobs() {
        let pool = FixedThreadPool::new(1);
        let (release_tx, release_rx) = bounded::<()>(0);

        let blocker = pool.submit(Box::new(move || {
            release_rx.recv().expect("release signal");
        }));
        let queued = pool.submit(Box::new(|| 1u32));

        let pending = pool.shutdown_now();
        assert_eq!(pending.len(), 1);
        assert!(pool.is_shutdown());

        release_tx.send(()).expect("release blocker");
        assert!(blocker.get().is_ok());

        // The drained job never ran; its handle reports disconnection.
        assert!(matches!(queued.get(), Err(ExecutorError::Disconnected(_))));
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(pool.is_terminated());
    }

    #[test]
    fn test_submit_all_preserves_input_order() {
        let pool = FixedThreadPool::new(2);
        let tasks: Vec<Task<usize>> = (0..5usize)
            .map(|index| Box::new(move || index) as Task<usize>)
            .collect();

        let results: Vec<usize> = pool
            .submit_all(tasks)
            .into_iter()
            .map(|handle| handle.get().expect("task result"))
            .collect();

        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_any_returns_first_success() {
        let pool = FixedThreadPool::new(2);
        let tasks: Vec<Task<&str>> = vec![
            Box::new(|| panic!("first loses")),
            Box::new(|| "winner"),
        ];

        assert_eq!(pool.submit_any(tasks).expect("race winner"), "winner");
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_any_with_all_failures() {
        let pool = FixedThreadPool::new(1);
        let tasks: Vec<Task<u32>> = vec![
            Box::new(|| panic!("one")),
            Box::new(|| panic!("two")),
        ];

        assert!(matches!(
            pool.submit_any(tasks),
            Err(ExecutorError::NoTaskSucceeded(_))
        ));
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_any_within_times_out() {
        let pool = FixedThreadPool::new(1);
        let (release_tx, release_rx) = bounded::<()>(0);

        let tasks: Vec<Task<u32>> = vec![Box::new(move || {
            release_rx.recv().expect("release signal");
            1
        })];

        let result = pool.submit_any_within(tasks, Duration::from_millis(50));
        assert!(matches!(result, Err(ExecutorError::DeadlineExceeded(_))));

        release_tx.send(()).expect("release straggler");
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_lifecycle_states() {
        let pool = FixedThreadPool::new(2);
        assert!(!pool.is_shutdown());
        assert!(!pool.is_terminated());
        assert!(!pool.await_termination(Duration::from_millis(10)));

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(pool.is_terminated());
    }
}
