//! Worker pool with completions marshaled back to the control thread.
//!
//! Jobs go to the workers over a channel; finished jobs come back over a
//! second channel that only the control thread reads. Continuations that
//! touch scripting-side state therefore never run on a worker.
//!
//! A task id can be taken before its job exists. The job is handed over
//! later through a [`Spawner`], from any thread, which lets the lock table
//! queue a job only once its object locks are granted.
//!
//! A job that panics is caught on the worker and reported as a
//! [`TaskPanic`] through the same completion path as a success.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Identity of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task{}", self.0)
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Id taken; the job has not been handed to the workers yet
    Waiting,
    /// Waiting for a worker
    Queued,
    /// Running on a worker
    Running,
    /// Finished; the completion waits on the control thread
    Completed,
}

/// A job that panicked on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanic {
    pub message: String,
}

impl TaskPanic {
    fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskPanic { message }
    }
}

/// Errors from the scheduler itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("scheduler has shut down")]
    Shutdown,
}

/// A finished task, delivered on the control thread.
#[derive(Debug)]
pub struct Completion<T> {
    /// Which task finished
    pub task: TaskId,
    /// Its result, or the panic that ended it
    pub outcome: Result<T, TaskPanic>,
}

type Job<T> = Box<dyn FnOnce() -> T + Send>;
type StateMap = Arc<Mutex<FxHashMap<TaskId, TaskState>>>;

/// Cloneable handle that queues jobs for the workers.
pub struct Spawner<T> {
    jobs: Sender<(TaskId, Job<T>)>,
    states: StateMap,
}

impl<T> Clone for Spawner<T> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            states: Arc::clone(&self.states),
        }
    }
}

impl<T: Send + 'static> Spawner<T> {
    /// Queue the job for a task id taken with [`Scheduler::reserve_task`].
    pub fn spawn<F>(&self, task: TaskId, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.states.lock().insert(task, TaskState::Queued);
        if self.jobs.send((task, Box::new(job))).is_err() {
            self.states.lock().remove(&task);
            return Err(DispatchError::Shutdown);
        }
        tracing::trace!(target: "hostbridge::task", %task, "queued");
        Ok(())
    }
}

impl<T> fmt::Debug for Spawner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner").field("queued", &self.jobs.len()).finish()
    }
}

/// Fixed-size worker pool producing values of type `T`.
pub struct Scheduler<T> {
    jobs: Option<Sender<(TaskId, Job<T>)>>,
    completions: Receiver<Completion<T>>,
    states: StateMap,
    workers: Vec<JoinHandle<()>>,
    next_task: u64,
}

impl<T: Send + 'static> Scheduler<T> {
    /// Start `workers` worker threads (at least one).
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        let (job_tx, job_rx) = unbounded::<(TaskId, Job<T>)>();
        let (done_tx, done_rx) = unbounded();
        let states: StateMap = Arc::default();

        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let states = Arc::clone(&states);
            let handle = thread::Builder::new()
                .name(format!("hostbridge-worker-{index}"))
                .spawn(move || worker_loop(jobs, done, states))?;
            handles.push(handle);
        }
        tracing::debug!(target: "hostbridge::init", workers = count, "started worker pool");

        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            states,
            workers: handles,
            next_task: 0,
        })
    }

    /// Queue a job. It runs to completion even if nobody collects it.
    pub fn submit<F>(&mut self, job: F) -> Result<TaskId, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let spawner = self.spawner()?;
        let task = self.reserve_task();
        spawner.spawn(task, job)?;
        Ok(task)
    }

    /// Take a task id whose job will be queued later through a [`Spawner`].
    ///
    /// The task counts as in flight from now on.
    pub fn reserve_task(&mut self) -> TaskId {
        self.next_task += 1;
        let task = TaskId(self.next_task);
        self.states.lock().insert(task, TaskState::Waiting);
        task
    }

    /// Handle for queuing jobs from other threads.
    pub fn spawner(&self) -> Result<Spawner<T>, DispatchError> {
        let jobs = self.jobs.as_ref().ok_or(DispatchError::Shutdown)?;
        Ok(Spawner {
            jobs: jobs.clone(),
            states: Arc::clone(&self.states),
        })
    }

    /// Take one finished task without waiting.
    pub fn try_complete(&self) -> Option<Completion<T>> {
        match self.completions.try_recv() {
            Ok(completion) => Some(self.collected(completion)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for a finished task.
    pub fn complete_timeout(&self, timeout: Duration) -> Option<Completion<T>> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Some(self.collected(completion)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn collected(&self, completion: Completion<T>) -> Completion<T> {
        self.states.lock().remove(&completion.task);
        completion
    }

    /// State of a task that has not been collected yet.
    pub fn state(&self, task: TaskId) -> Option<TaskState> {
        self.states.lock().get(&task).copied()
    }

    /// Number of submitted tasks not collected yet.
    pub fn in_flight(&self) -> usize {
        self.states.lock().len()
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop<T>(
    jobs: Receiver<(TaskId, Job<T>)>,
    done: Sender<Completion<T>>,
    states: StateMap,
) {
    while let Ok((task, job)) = jobs.recv() {
        states.lock().insert(task, TaskState::Running);
        tracing::trace!(target: "hostbridge::task", %task, "running");
        let outcome = catch_unwind(AssertUnwindSafe(job))
            .map_err(|payload| TaskPanic::from_payload(payload.as_ref()));
        if let Err(panic) = &outcome {
            tracing::warn!(target: "hostbridge::task", %task, %panic, "task panicked");
        }
        states.lock().insert(task, TaskState::Completed);
        if done.send(Completion { task, outcome }).is_err() {
            // control side is gone; keep draining so every job still runs
            tracing::trace!(target: "hostbridge::task", %task, "completion dropped");
        }
    }
}

impl<T> Drop for Scheduler<T> {
    // Workers exit once every sender is gone, including spawners held by
    // jobs that are still waiting for their locks.
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!(target: "hostbridge::task", "worker thread exited abnormally");
            }
        }
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers.len())
            .field("in_flight", &self.states.lock().len())
            .finish()
    }
}
