use std::io;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Explicitly owned execution context for background work.
///
/// One instance lives for the application's lifetime and is handed to
/// whatever needs to run work off the interactive thread. Shut it down
/// on exit; `shutdown_background` releases the worker threads without
/// waiting for a straggling job.
#[derive(Debug)]
pub struct BackgroundExecutor {
    runtime: Runtime,
}

impl BackgroundExecutor {
    pub fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scan-worker")
            .build()?;
        Ok(Self { runtime })
    }

    /// Run a CPU-bound job off the interactive thread.
    pub fn spawn_blocking<F, T>(&self, job: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.runtime.spawn_blocking(job)
    }

    /// Stop the executor without waiting for in-flight jobs.
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}
