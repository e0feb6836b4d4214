//! Thread lifecycle for producer and processing loops.
//!
//! A [`CaptureLoop`] owns one named thread that runs an initialization step
//! once and then a loop body until stopped. [`CaptureLoop::spawn`] returns only
//! after the thread has reported that initialization finished, so a caller
//! holding a running loop knows frames can flow. [`CaptureLoop::stop`] waits a
//! bounded time for the thread to terminate; a thread stuck past that (a
//! driver call that never returns) is detached and left to exit on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};

/// Stop wait used when a loop is dropped without an explicit stop.
const DROP_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Returned by the loop body to control the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a running loop thread.
pub struct CaptureLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    /// Disconnects once the thread has dropped its loop state.
    exited: Receiver<()>,
    name: String,
}

impl CaptureLoop {
    /// Spawn `name`, run `init_fn` on the new thread and wait up to
    /// `start_timeout` for it to finish.
    ///
    /// An error from `init_fn` is returned unchanged after the thread has
    /// exited. Spawn failures and a missing confirmation become
    /// `ProducerStart` errors. A thread whose init never confirms is signalled
    /// and detached.
    ///
    /// The loop state `S` is dropped on the loop thread before it reports
    /// exit, so teardown placed in its `Drop` has run by the time
    /// [`CaptureLoop::stop`] returns `Ok`.
    pub fn spawn<S, I, F>(
        name: &str,
        start_timeout: Duration,
        init_fn: I,
        mut loop_fn: F,
    ) -> CaptureResult<Self>
    where
        I: FnOnce() -> CaptureResult<S> + Send + 'static,
        F: FnMut(&mut S, &AtomicBool) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();
        let (started_tx, started_rx) = bounded::<CaptureResult<()>>(1);
        let (exited_tx, exited_rx) = bounded::<()>(1);

        debug!(name = %name, "Spawning loop thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(s) => {
                        let _ = started_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Loop initialization failed");
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };

                loop {
                    if thread_stop.load(Ordering::SeqCst) {
                        debug!(name = %thread_name, "Stop signal received");
                        break;
                    }
                    if loop_fn(&mut state, &thread_stop) == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }

                drop(state);
                debug!(name = %thread_name, "Loop thread exiting");
                drop(exited_tx);
            })
            .map_err(|e| {
                CaptureError::producer_start(format!("failed to spawn thread '{}': {}", name, e))
            })?;

        let mut controller = Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            exited: exited_rx,
            name: name.to_string(),
        };

        match started_rx.recv_timeout(start_timeout) {
            Ok(Ok(())) => {
                info!(name = %name, "Loop thread started");
                Ok(controller)
            }
            Ok(Err(e)) => {
                controller.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = controller.stop(start_timeout);
                Err(CaptureError::producer_start(format!(
                    "thread '{}' did not confirm start within {}ms",
                    name,
                    start_timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                controller.join();
                Err(CaptureError::producer_start(format!(
                    "thread '{}' exited before confirming start",
                    name
                )))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting.
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and wait up to `timeout` for the thread to finish.
    ///
    /// `Ok(false)` means the thread panicked. A `Timeout` error means the
    /// thread was still busy when the wait ran out; it has been detached and
    /// will exit at its next stop check. The handle is spent either way.
    pub fn stop(&mut self, timeout: Duration) -> CaptureResult<bool> {
        self.request_stop();
        if self.thread_handle.is_none() {
            return Ok(true);
        }
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(self.join()),
            Err(RecvTimeoutError::Timeout) => {
                self.thread_handle.take();
                let timeout_ms = timeout.as_millis() as u64;
                warn!(name = %self.name, timeout_ms, "Loop thread did not stop in time, detaching");
                Err(CaptureError::timeout(format!("stop {}", self.name), timeout_ms))
            }
        }
    }

    fn join(&mut self) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };
        match handle.join() {
            Ok(()) => {
                debug!(name = %self.name, "Loop thread joined");
                true
            }
            Err(e) => {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
                false
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoop dropped, stopping thread");
            if let Err(e) = self.stop(DROP_STOP_TIMEOUT) {
                e.log("drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    const START: Duration = Duration::from_secs(1);

    #[test]
    fn test_loop_runs_until_stopped() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut lp = CaptureLoop::spawn(
            "test-loop",
            START,
            || Ok(()),
            move |_, _| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                LoopAction::Continue
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(40));
        assert!(lp.is_running());
        assert!(lp.stop(START).unwrap());
        assert!(!lp.is_running());

        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_loop_stops_itself() {
        let mut lp = CaptureLoop::spawn(
            "self-stop",
            START,
            || Ok(0u32),
            |n, _| {
                *n += 1;
                if *n >= 10 { LoopAction::Stop } else { LoopAction::Continue }
            },
        )
        .unwrap();
        assert!(lp.stop(START).unwrap());
    }

    #[test]
    fn test_init_error_is_returned_unchanged() {
        let result = CaptureLoop::spawn(
            "bad-init",
            START,
            || Err::<(), _>(CaptureError::source("device vanished")),
            |_, _| LoopAction::Continue,
        );
        let err = result.err().unwrap();
        assert_eq!(err.category(), "source");
    }

    #[test]
    fn test_slow_init_times_out() {
        let result = CaptureLoop::spawn(
            "slow-init",
            Duration::from_millis(20),
            || {
                thread::sleep(Duration::from_millis(100));
                Ok(())
            },
            |_, _| LoopAction::Continue,
        );
        let err = result.err().unwrap();
        assert_eq!(err.category(), "producer_start");
    }

    #[test]
    fn test_panicking_loop_still_joins() {
        let mut lp = CaptureLoop::spawn(
            "panics",
            START,
            || Ok(()),
            |_, _| panic!("boom"),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!lp.stop(START).unwrap());
        assert!(!lp.is_running());
    }

    #[test]
    fn test_stuck_loop_is_detached_after_timeout() {
        let exited = Arc::new(AtomicBool::new(false));
        let exited_flag = Arc::clone(&exited);
        let mut lp = CaptureLoop::spawn(
            "stuck",
            START,
            || Ok(()),
            move |_, _| {
                thread::sleep(Duration::from_millis(400));
                exited_flag.store(true, Ordering::SeqCst);
                LoopAction::Continue
            },
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = std::time::Instant::now();
        let err = lp.stop(Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.category(), "timeout");
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!lp.is_running());
        // A second stop on the spent handle is a no-op.
        assert!(lp.stop(START).unwrap());

        // The detached thread still sees the stop flag and ends.
        thread::sleep(Duration::from_millis(500));
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_dropped_before_stop_returns() {
        struct Teardown(Arc<AtomicBool>);
        impl Drop for Teardown {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = Arc::clone(&closed);
        let mut lp = CaptureLoop::spawn(
            "teardown",
            START,
            move || Ok(Teardown(closed_flag)),
            |_, _| {
                thread::sleep(Duration::from_millis(2));
                LoopAction::Continue
            },
        )
        .unwrap();
        assert!(!closed.load(Ordering::SeqCst));
        assert!(lp.stop(START).unwrap());
        assert!(closed.load(Ordering::SeqCst));
    }
}
