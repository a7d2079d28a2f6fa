//! Callback execution context
//!
//! Listener callbacks never run on the upload task. They are posted as closures
//! to a [`CallbackContext`] and executed, in posting order, by the
//! [`CallbackLooper`] that owns the other end of the queue. Whichever thread
//! drives the looper is the designated callback thread.
//!
//! # Example
//!
//! ```
//! use s3_batch_uploader::upload::CallbackLooper;
//!
//! let (context, thread) = CallbackLooper::spawn("upload-callbacks").unwrap();
//! context.post(|| {
//!     assert_eq!(std::thread::current().name(), Some("upload-callbacks"));
//! });
//! drop(context);
//! thread.join();
//! ```

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for posting work onto the callback thread
#[derive(Clone)]
pub struct CallbackContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackContext {
    /// Queue `job` for execution on the callback thread.
    ///
    /// Never blocks. Returns `false` when the looper is gone and the job was
    /// dropped.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains a callback queue on the thread that drives it
pub struct CallbackLooper {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CallbackLooper {
    pub fn new() -> (CallbackContext, CallbackLooper) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CallbackContext { tx }, CallbackLooper { rx })
    }

    /// Spawn a dedicated, named callback thread
    pub fn spawn(name: &str) -> io::Result<(CallbackContext, CallbackThread)> {
        let (context, looper) = Self::new();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || looper.run())?;

        Ok((context, CallbackThread { handle }))
    }

    /// Run jobs on the current thread until every context has been dropped.
    ///
    /// Blocks; must not be called from inside an async runtime.
    pub fn run(mut self) {
        while let Some(job) = self.rx.blocking_recv() {
            run_job(job);
        }
        tracing::debug!("Callback looper stopped");
    }

    /// Async variant of [`run`](Self::run) for callers whose designated context
    /// is a task
    pub async fn run_async(mut self) {
        while let Some(job) = self.rx.recv().await {
            run_job(job);
        }
    }

    /// Run every job queued so far without waiting for more.
    /// Returns the number of jobs run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            count += 1;
        }
        count
    }
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!("Listener callback panicked");
    }
}

/// Join handle for a thread started by [`CallbackLooper::spawn`]
pub struct CallbackThread {
    handle: JoinHandle<()>,
}

impl CallbackThread {
    /// Wait for the looper to finish. It finishes once every
    /// [`CallbackContext`] clone has been dropped.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("Callback thread panicked");
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.handle.thread().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_in_order() {
        let (context, mut looper) = CallbackLooper::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            assert!(context.post(move || seen.lock().push(i)));
        }

        assert_eq!(looper.run_until_idle(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_post_after_looper_dropped() {
        let (context, looper) = CallbackLooper::new();
        drop(looper);
        assert!(context.is_closed());
        assert!(!context.post(|| {}));
    }

    #[test]
    fn test_spawned_thread_runs_jobs_on_named_thread() {
        let (context, thread) = CallbackLooper::spawn("test-callbacks").unwrap();
        assert_eq!(thread.name(), Some("test-callbacks"));

        let names = Arc::new(Mutex::new(Vec::new()));
        let recorded = names.clone();
        context.post(move || {
            recorded
                .lock()
                .push(std::thread::current().name().map(String::from));
        });

        drop(context);
        thread.join();
        assert_eq!(*names.lock(), vec![Some("test-callbacks".to_string())]);
    }

    #[test]
    fn test_panicking_job_does_not_stop_looper() {
        let (context, mut looper) = CallbackLooper::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();

        context.post(|| panic!("listener bug"));
        context.post(move || *flag.lock() = true);

        assert_eq!(looper.run_until_idle(), 2);
        assert!(*ran.lock());
    }

    #[tokio::test]
    async fn test_run_async_drains_on_task() {
        let (context, looper) = CallbackLooper::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            context.post(move || seen.lock().push(i));
        }

        let task = tokio::spawn(looper.run_async());
        drop(context);
        task.await.unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
