//! Serial work queue.

use crate::error::{UploadError, UploadResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks one at a time, in submission order, on a dedicated
/// worker thread.
///
/// A panicking task is logged and skipped. Dropping the queue lets the
/// worker finish everything already submitted and then joins it.
pub struct WorkQueue {
    name: String,
    sender: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl WorkQueue {
    /// Starts a worker thread with the given name.
    pub fn new(name: impl Into<String>) -> UploadResult<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();

        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        warn!(queue = %worker_name, "task panicked");
                    }
                }
            })
            .map_err(|e| UploadError::Worker(e.to_string()))?;

        debug!(queue = %name, "work queue started");
        Ok(Self {
            name,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submits a task.
    ///
    /// After [`shutdown`](Self::shutdown) the task runs on the calling thread
    /// so that it is never lost.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(task);
        let Some(sender) = &self.sender else {
            task();
            return;
        };
        if let Err(mpsc::SendError(task)) = sender.send(task) {
            warn!(queue = %self.name, "worker gone, running task inline");
            task();
        }
    }

    /// Waits for all submitted tasks and stops the worker.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(queue = %self.name, "worker panicked");
            }
            debug!(queue = %self.name, "work queue stopped");
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn runs_tasks_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = WorkQueue::new("test-order").unwrap();

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            queue.execute(move || seen.lock().push(i));
        }
        queue.shutdown();

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn tasks_run_on_named_worker() {
        let names = Arc::new(Mutex::new(Vec::new()));
        {
            let queue = WorkQueue::new("upload-worker").unwrap();
            let names = Arc::clone(&names);
            queue.execute(move || {
                names
                    .lock()
                    .push(thread::current().name().map(str::to_string));
            });
        }
        assert_eq!(*names.lock(), vec![Some("upload-worker".to_string())]);
    }

    #[test]
    fn accepts_tasks_from_many_threads() {
        let count = Arc::new(Mutex::new(0u32));
        let queue = Arc::new(WorkQueue::new("test-producers").unwrap());

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let count = Arc::clone(&count);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let count = Arc::clone(&count);
                        queue.execute(move || *count.lock() += 1);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut queue = Arc::try_unwrap(queue).ok().unwrap();
        queue.shutdown();
        assert_eq!(*count.lock(), 100);
    }

    #[test]
    fn after_shutdown_tasks_run_inline() {
        let mut queue = WorkQueue::new("test-inline").unwrap();
        queue.shutdown();

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        queue.execute(move || *flag.lock() = true);
        assert!(*ran.lock());
    }

    #[test]
    fn survives_panicking_task() {
        let mut queue = WorkQueue::new("test-panic").unwrap();
        queue.execute(|| panic!("boom"));

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        queue.execute(move || *flag.lock() = true);
        queue.shutdown();
        assert!(*ran.lock());
    }
}
