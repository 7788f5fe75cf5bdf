//! Parallel task executor with phase barriers.
//!
//! Tasks run on the blocking pool of a dedicated tokio runtime. A caller can
//! open a [`Phase`], submit work, and close the phase to block until exactly
//! the work submitted while it was open has finished. The executor keeps
//! accepting work after a phase closes, and even while [`PhasingExecutor::close`]
//! waits for the last running task.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

/// Default interval between completion checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from the phasing executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The worker runtime could not be started.
    #[error("failed to start executor runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// A phase is already open on this executor.
    #[error("a phase is already open")]
    PhaseAlreadyOpen,

    /// The executor has shut down and accepts no more work.
    #[error("executor is shut down")]
    Closed,

    /// Waiting was interrupted.
    #[error("interrupted while waiting for {0}")]
    Interrupted(&'static str),
}

/// Result alias for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Default)]
struct State {
    active: AtomicUsize,
    completed: AtomicUsize,
    interrupted: AtomicBool,
    shut_down: AtomicBool,
    phase: Mutex<Option<Arc<AtomicUsize>>>,
}

impl State {
    fn open_phase(&self) -> Option<Arc<AtomicUsize>> {
        self.phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Accounts a running task; completion is recorded even if the task panics.
struct TaskGuard {
    state: Arc<State>,
    phase: Option<Arc<AtomicUsize>>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(pending) = &self.phase {
            pending.fetch_sub(1, Ordering::AcqRel);
        }
        self.state.completed.fetch_add(1, Ordering::AcqRel);
        self.state.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A bounded-lifetime parallel executor with phase barriers.
#[derive(Debug)]
pub struct PhasingExecutor {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    state: Arc<State>,
    poll_interval: Duration,
}

impl PhasingExecutor {
    /// Start an executor with up to `threads` concurrent tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Runtime`] if the worker runtime fails to start.
    pub fn new(threads: usize, poll_interval: Duration) -> ExecutorResult<Self> {
        let threads = threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("anvil-phasing")
            .build()?;
        debug!(threads, poll_ms = poll_interval.as_millis(), "Phasing executor started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            state: Arc::new(State::default()),
            poll_interval,
        })
    }

    /// Submit a task.
    ///
    /// Tasks submitted while a phase is open belong to that phase.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Closed`] once the executor has shut down.
    pub fn execute<F>(&self, task: F) -> ExecutorResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state.shut_down.load(Ordering::Acquire) {
            return Err(ExecutorError::Closed);
        }
        self.state.active.fetch_add(1, Ordering::AcqRel);
        let phase = self.state.open_phase();
        if let Some(pending) = &phase {
            pending.fetch_add(1, Ordering::AcqRel);
        }
        let guard = TaskGuard {
            state: Arc::clone(&self.state),
            phase,
        };
        drop(self.handle.spawn_blocking(move || {
            let _guard = guard;
            task();
        }));
        Ok(())
    }

    /// Open a phase.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::PhaseAlreadyOpen`] if another phase is open.
    pub fn phase(&self) -> ExecutorResult<Phase<'_>> {
        let mut slot = self
            .state
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ExecutorError::PhaseAlreadyOpen);
        }
        let pending = Arc::new(AtomicUsize::new(0));
        *slot = Some(Arc::clone(&pending));
        Ok(Phase {
            executor: self,
            pending,
            closed: false,
        })
    }

    /// Tasks currently running or queued.
    #[must_use]
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::Acquire)
    }

    /// Tasks finished since the executor started.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Ask waiting callers to stop waiting.
    pub fn interrupt(&self) {
        self.state.interrupted.store(true, Ordering::Release);
    }

    /// Clear a pending interrupt. Returns whether one was set.
    pub fn clear_interrupt(&self) -> bool {
        self.state.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Whether an interrupt is pending.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Acquire)
    }

    /// Wait for every active task, then shut the runtime down.
    ///
    /// Idempotent. An interrupt stops the wait early; the interrupt stays
    /// pending for the caller to observe.
    pub fn close(&self) {
        if self.state.shut_down.load(Ordering::Acquire) {
            return;
        }
        if self.wait_until("executor close", || self.active() == 0).is_err() {
            warn!("Interrupted while closing phasing executor");
        }
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            self.state.shut_down.store(true, Ordering::Release);
            runtime.shutdown_background();
            debug!(completed = self.completed(), "Phasing executor shut down");
        }
    }

    fn wait_until<F>(&self, what: &'static str, done: F) -> ExecutorResult<()>
    where
        F: Fn() -> bool,
    {
        while !done() {
            if self.is_interrupted() {
                return Err(ExecutorError::Interrupted(what));
            }
            std::thread::sleep(self.poll_interval);
        }
        Ok(())
    }
}

impl Drop for PhasingExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

/// An open phase. Closing it blocks until its tasks have finished.
#[derive(Debug)]
pub struct Phase<'a> {
    executor: &'a PhasingExecutor,
    pending: Arc<AtomicUsize>,
    closed: bool,
}

impl Phase<'_> {
    /// Tasks of this phase that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Close the phase and wait for its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Interrupted`] if the executor was interrupted
    /// while waiting.
    pub fn close(mut self) -> ExecutorResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> ExecutorResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // New submissions stop joining this phase before the wait starts.
        *self
            .executor
            .state
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        let pending = Arc::clone(&self.pending);
        self.executor.wait_until("phase close", || {
            pending.load(Ordering::Acquire) == 0 || self.executor.active() == 0
        })
    }
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(error = %e, "Phase closed without waiting for its tasks");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn executor() -> PhasingExecutor {
        PhasingExecutor::new(4, Duration::from_millis(5)).unwrap()
    }

    #[test]
    fn test_phase_waits_for_its_tasks() {
        let executor = executor();
        let done = Arc::new(AtomicUsize::new(0));

        let phase = executor.phase().unwrap();
        for _ in 0..5 {
            let done = Arc::clone(&done);
            executor
                .execute(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        phase.close().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        executor.close();
    }

    #[test]
    fn test_phase_ignores_earlier_tasks() {
        let executor = executor();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        executor
            .execute(move || {
                let _ = release_rx.recv();
            })
            .unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let phase = executor.phase().unwrap();
        let counter = Arc::clone(&done);
        executor
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        phase.close().unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(executor.active(), 1);
        release_tx.send(()).unwrap();
        executor.close();
        assert_eq!(executor.active(), 0);
    }

    #[test]
    fn test_nested_phase_fails_fast() {
        let executor = executor();
        let phase = executor.phase().unwrap();
        assert!(matches!(
            executor.phase(),
            Err(ExecutorError::PhaseAlreadyOpen)
        ));
        phase.close().unwrap();
        assert!(executor.phase().is_ok());
    }

    #[test]
    fn test_interrupted_phase_close_fails() {
        let executor = executor();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let phase = executor.phase().unwrap();
        executor
            .execute(move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        executor.interrupt();
        assert!(matches!(
            phase.close(),
            Err(ExecutorError::Interrupted("phase close"))
        ));

        assert!(executor.clear_interrupt());
        release_tx.send(()).unwrap();
        executor.close();
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_new_work() {
        let executor = executor();
        executor.execute(|| {}).unwrap();
        executor.close();
        executor.close();
        assert_eq!(executor.completed(), 1);
        assert!(matches!(executor.execute(|| {}), Err(ExecutorError::Closed)));
    }

    #[test]
    fn test_panicking_task_is_accounted() {
        let executor = executor();
        let phase = executor.phase().unwrap();
        executor.execute(|| panic!("task failure")).unwrap();
        phase.close().unwrap();
        assert_eq!(executor.active(), 0);
        executor.close();
    }
}
