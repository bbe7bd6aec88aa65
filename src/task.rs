//! Tasks, the task runner and named background tasks
//!
//! A `Task` is a single-shot unit of work with a name and a progress channel.
//! Tasks are created by the payload and executed by someone else:
//!
//! - `TaskRunner::run` executes a task synchronously on the caller's thread.
//! - `TaskRegistry::spawn` executes a task on a named worker thread and
//!   returns a `TaskHandle`.
//!
//! # Waiting Semantics
//!
//! `TaskHandle::wait` and `TaskRegistry::wait` accept an optional timeout.
//! A timeout only releases the waiter; the worker keeps running until the
//! task finishes. Nothing in this module cancels a task.
//!
//! # Registry
//!
//! At most one task per name is in flight. The name is registered when the
//! worker is spawned and released when the task returns (or panics).

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PayloadError, Result};

// ============================================================================
// Progress
// ============================================================================

/// One progress notification of a running task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub task: String,
    pub step: u32,
    pub message: String,
}

/// Progress channel handed to a running task.
///
/// Without a subscriber the updates are only logged.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    task: String,
    sender: Option<Sender<ProgressUpdate>>,
}

impl ProgressReporter {
    pub fn new(task: impl Into<String>, sender: Option<Sender<ProgressUpdate>>) -> Self {
        Self {
            task: task.into(),
            sender,
        }
    }

    /// Reporter that only logs.
    pub fn silent(task: impl Into<String>) -> Self {
        Self::new(task, None)
    }

    pub fn report(&self, step: u32, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("[{}] step {}: {}", self.task, step, message);

        if let Some(sender) = &self.sender {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(ProgressUpdate {
                task: self.task.clone(),
                step,
                message,
            });
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A single-shot unit of work.
///
/// `run` is called at most once and runs to completion; there is no
/// cancellation and no retry.
pub trait Task: Send {
    type Output: Send + 'static;

    /// Human readable name, also used as the registry key.
    fn name(&self) -> &str;

    fn run(&mut self, progress: &ProgressReporter) -> Result<Self::Output>;
}

/// Task of a lifecycle batch
pub type BoxedTask = Box<dyn Task<Output = ()>>;

/// Executes tasks on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    progress: Option<Sender<ProgressUpdate>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward the progress of every task run by this runner to `sender`.
    pub fn with_progress(sender: Sender<ProgressUpdate>) -> Self {
        Self {
            progress: Some(sender),
        }
    }

    /// Run a task to completion.
    pub fn run<T: Task + ?Sized>(&self, task: &mut T) -> Result<T::Output> {
        let name = task.name().to_string();
        let reporter = ProgressReporter::new(name.clone(), self.progress.clone());
        let started = Instant::now();

        tracing::info!("Running the task '{}'.", name);
        let result = task.run(&reporter);

        match &result {
            Ok(_) => tracing::info!(
                "The task '{}' has finished in {} ms.",
                name,
                started.elapsed().as_millis()
            ),
            Err(e) => tracing::error!("The task '{}' has failed: {}", name, e),
        }

        result
    }

    /// Run a batch of tasks in order.
    ///
    /// The first failing task aborts the batch; the remaining tasks never run.
    pub fn run_all(&self, tasks: Vec<BoxedTask>) -> Result<()> {
        for mut task in tasks {
            self.run(task.as_mut())?;
        }
        Ok(())
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

struct Completion<T> {
    finished: bool,
    result: Option<Result<T>>,
}

struct Shared<T> {
    completion: Mutex<Completion<T>>,
    done: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Completion<T>> {
        self.completion.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Handle of a task running on a worker thread
pub struct TaskHandle<T> {
    name: String,
    shared: Arc<Shared<T>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }

    /// Block until the task finishes or the timeout elapses.
    ///
    /// Returns true if the task has finished. On timeout the task keeps
    /// running in the background.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.shared.lock();

        match timeout {
            None => {
                let guard = self
                    .shared
                    .done
                    .wait_while(guard, |c| !c.finished)
                    .unwrap_or_else(|p| p.into_inner());
                guard.finished
            }
            Some(timeout) => {
                let (guard, _) = self
                    .shared
                    .done
                    .wait_timeout_while(guard, timeout, |c| !c.finished)
                    .unwrap_or_else(|p| p.into_inner());

                if !guard.finished {
                    tracing::debug!(
                        "Stopped waiting for the task '{}' after {:?}, it keeps running.",
                        self.name,
                        timeout
                    );
                }
                guard.finished
            }
        }
    }

    /// Wait for the task and take its result.
    pub fn join(self) -> Result<T> {
        self.wait(None);
        let result = self.shared.lock().result.take();
        result.unwrap_or_else(|| {
            Err(PayloadError::task_failed(
                self.name.clone(),
                "the result was already taken",
            ))
        })
    }
}

/// Registry of named background tasks.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<(Mutex<HashSet<String>>, Condvar)>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a task with this name in flight?
    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    /// Names of all tasks in flight, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Wait until no task with this name is in flight.
    ///
    /// Returns true if the name is free. A timeout does not cancel the task.
    pub fn wait(&self, name: &str, timeout: Option<Duration>) -> bool {
        let (_, released) = &*self.inner;
        let guard = self.lock();

        match timeout {
            None => {
                let guard = released
                    .wait_while(guard, |names| names.contains(name))
                    .unwrap_or_else(|p| p.into_inner());
                !guard.contains(name)
            }
            Some(timeout) => {
                let (guard, _) = released
                    .wait_timeout_while(guard, timeout, |names| names.contains(name))
                    .unwrap_or_else(|p| p.into_inner());
                !guard.contains(name)
            }
        }
    }

    /// Run the task on a new worker thread registered under its name.
    ///
    /// # Errors
    ///
    /// - `TaskAlreadyRunning` if a task with the same name is in flight
    /// - `Io` if the worker thread can't be spawned
    pub fn spawn<T>(&self, mut task: T, runner: TaskRunner) -> Result<TaskHandle<T::Output>>
    where
        T: Task + 'static,
    {
        let name = task.name().to_string();

        if !self.lock().insert(name.clone()) {
            return Err(PayloadError::TaskAlreadyRunning(name));
        }
        tracing::debug!("Registered the background task '{}'.", name);

        let shared = Arc::new(Shared {
            completion: Mutex::new(Completion {
                finished: false,
                result: None,
            }),
            done: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let registry = self.clone();
        let worker_name = name.clone();

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&mut task)))
                .unwrap_or_else(|_| {
                    Err(PayloadError::task_failed(worker_name.clone(), "the task panicked"))
                });

            registry.release(&worker_name);

            let mut completion = worker_shared.lock();
            completion.finished = true;
            completion.result = Some(result);
            worker_shared.done.notify_all();
        });

        if let Err(e) = spawned {
            self.release(&name);
            return Err(PayloadError::Io(e));
        }

        Ok(TaskHandle { name, shared })
    }

    fn release(&self, name: &str) {
        let (_, released) = &*self.inner;
        self.lock().remove(name);
        tracing::debug!("Unregistered the background task '{}'.", name);
        released.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Task returning a value after reporting progress
    struct CountingTask {
        name: String,
        steps: u32,
    }

    impl Task for CountingTask {
        type Output = u32;

        fn name(&self) -> &str {
            &self.name
        }

        fn run(&mut self, progress: &ProgressReporter) -> Result<u32> {
            for step in 1..=self.steps {
                progress.report(step, format!("step {}", step));
            }
            Ok(self.steps)
        }
    }

    /// Task blocking until the test releases it
    struct GatedTask {
        gate: mpsc::Receiver<()>,
    }

    impl Task for GatedTask {
        type Output = &'static str;

        fn name(&self) -> &str {
            "gated"
        }

        fn run(&mut self, _progress: &ProgressReporter) -> Result<&'static str> {
            self.gate
                .recv()
                .map_err(|_| PayloadError::task_failed("gated", "gate dropped"))?;
            Ok("done")
        }
    }

    struct FailingTask;

    impl Task for FailingTask {
        type Output = ();

        fn name(&self) -> &str {
            "failing"
        }

        fn run(&mut self, _progress: &ProgressReporter) -> Result<()> {
            Err(PayloadError::installation("boom"))
        }
    }

    struct PanickingTask;

    impl Task for PanickingTask {
        type Output = ();

        fn name(&self) -> &str {
            "panicking"
        }

        fn run(&mut self, _progress: &ProgressReporter) -> Result<()> {
            panic!("unexpected state");
        }
    }

    #[test]
    fn test_runner_forwards_progress() {
        let (tx, rx) = mpsc::channel();
        let runner = TaskRunner::with_progress(tx);
        let mut task = CountingTask {
            name: "count".to_string(),
            steps: 3,
        };

        assert_eq!(runner.run(&mut task).expect("run"), 3);

        let updates: Vec<ProgressUpdate> = rx.try_iter().collect();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].task, "count");
        assert_eq!(updates[2].message, "step 3");
    }

    #[test]
    fn test_run_all_aborts_on_first_failure() {
        let (tx, rx) = mpsc::channel();
        let runner = TaskRunner::with_progress(tx);

        struct Marker(&'static str);
        impl Task for Marker {
            type Output = ();
            fn name(&self) -> &str {
                self.0
            }
            fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
                progress.report(1, "ran");
                Ok(())
            }
        }

        let tasks: Vec<BoxedTask> = vec![
            Box::new(Marker("first")),
            Box::new(FailingTask),
            Box::new(Marker("never")),
        ];

        assert!(runner.run_all(tasks).is_err());
        let ran: Vec<String> = rx.try_iter().map(|u| u.task).collect();
        assert_eq!(ran, vec!["first"]);
    }

    #[test]
    fn test_spawn_and_join() {
        let registry = TaskRegistry::new();
        let handle = registry
            .spawn(
                CountingTask {
                    name: "background".to_string(),
                    steps: 2,
                },
                TaskRunner::new(),
            )
            .expect("spawn");

        assert_eq!(handle.join().expect("join"), 2);
        assert!(registry.wait("background", Some(Duration::from_secs(5))));
        assert!(!registry.is_running("background"));
    }

    #[test]
    fn test_same_name_is_rejected_while_running() {
        let registry = TaskRegistry::new();
        let (gate, rx) = mpsc::channel();
        let handle = registry
            .spawn(GatedTask { gate: rx }, TaskRunner::new())
            .expect("spawn");

        assert!(registry.is_running("gated"));
        let (_gate2, rx2) = mpsc::channel();
        let err = registry
            .spawn(GatedTask { gate: rx2 }, TaskRunner::new())
            .err()
            .expect("second spawn should fail");
        assert!(matches!(err, PayloadError::TaskAlreadyRunning(_)));

        gate.send(()).expect("release");
        assert_eq!(handle.join().expect("join"), "done");
    }

    #[test]
    fn test_wait_timeout_does_not_cancel() {
        let registry = TaskRegistry::new();
        let (gate, rx) = mpsc::channel();
        let handle = registry
            .spawn(GatedTask { gate: rx }, TaskRunner::new())
            .expect("spawn");

        // The waiter gives up, the task is still in flight.
        assert!(!handle.wait(Some(Duration::from_millis(20))));
        assert!(!registry.wait("gated", Some(Duration::from_millis(20))));
        assert!(registry.is_running("gated"));
        assert!(!handle.is_finished());

        gate.send(()).expect("release");
        assert!(handle.wait(Some(Duration::from_secs(5))));
        assert_eq!(handle.join().expect("join"), "done");
    }

    #[test]
    fn test_panicking_task_is_reported_and_released() {
        let registry = TaskRegistry::new();
        let handle = registry
            .spawn(PanickingTask, TaskRunner::new())
            .expect("spawn");

        let err = handle.join().unwrap_err();
        assert!(matches!(err, PayloadError::TaskFailed { .. }));
        assert!(registry.wait("panicking", Some(Duration::from_secs(5))));
    }
}
