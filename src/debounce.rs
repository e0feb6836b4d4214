//! Cancelable delayed task used to collapse rapid filter toggles.
//!
//! [`Debouncer::schedule`] arms a timer on a small private tokio runtime. A
//! second call before the timer fires aborts the first, so only the last
//! request inside the window runs. The task itself runs on the runtime's
//! blocking pool, since restarting capture joins threads.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CaptureError, CaptureResult};

pub struct Debouncer {
    runtime: Option<Runtime>,
    pending: Mutex<Option<JoinHandle<()>>>,
    delay: Duration,
    name: String,
}

impl Debouncer {
    pub fn new(name: &str, delay: Duration) -> CaptureResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(2)
            .thread_name(format!("{}-timer", name))
            .enable_time()
            .build()
            .map_err(|e| CaptureError::io("build debounce runtime", e))?;

        Ok(Self {
            runtime: Some(runtime),
            pending: Mutex::new(None),
            delay,
            name: name.to_string(),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` after the delay unless another call replaces it first.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let delay = self.delay;
        let name = self.name.clone();

        let mut pending = self.lock();
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                debug!(name = %self.name, "Rearming debounce timer");
            }
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                if e.is_panic() {
                    warn!(name = %name, "Debounced task panicked");
                }
            }
        }));
    }

    /// Abort the pending task. Returns true if one was still waiting.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
