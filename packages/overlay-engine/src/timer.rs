//! Cancellable timers and local tasks.
//!
//! Every piece of deferred work in the engine (debounce, auto-hide,
//! suppression window, lock release, polling, backend calls) is a
//! [`TaskHandle`] owned by the component responsible for it. Dropping or
//! cancelling the handle aborts the underlying tokio task, so teardown is
//! deterministic.
//!
//! All spawns use `tokio::task::spawn_local`: the engine is single-threaded
//! and must be driven from inside a [`tokio::task::LocalSet`].
//!
//! # Example
//!
//! ```ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let handle = timer::spawn_timeout(Duration::from_millis(500), || {
//!         tracing::debug!("fired");
//!     });
//!     handle.cancel(); // never fires
//! }).await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Handle to a spawned timer or task. Aborts the task on cancel or drop.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Abort the task. A callback that has not started yet will never run.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Returns true once the task ran to completion or was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `f` once after `delay`.
///
/// The deadline is computed at call time, not when the task is first polled.
pub fn spawn_timeout<F>(delay: Duration, f: F) -> TaskHandle
where
    F: FnOnce() + 'static,
{
    let deadline = Instant::now() + delay;
    let handle = tokio::task::spawn_local(async move {
        time::sleep_until(deadline).await;
        f();
    });
    TaskHandle { handle }
}

/// Run `f` every `period`, first tick one period from now.
///
/// Missed ticks are delayed rather than bursted.
pub fn spawn_interval<F>(period: Duration, mut f: F) -> TaskHandle
where
    F: FnMut() + 'static,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let handle = tokio::task::spawn_local(async move {
        loop {
            ticker.tick().await;
            f();
        }
    });
    TaskHandle { handle }
}

/// Spawn an arbitrary local future (backend and storage calls).
pub fn spawn_task<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + 'static,
{
    TaskHandle {
        handle: tokio::task::spawn_local(future),
    }
}

/// A set of in-flight tasks that can be aborted together.
///
/// Finished handles are pruned on every insert so the set does not grow
/// without bound across a long session.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<TaskHandle>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    /// Number of tasks that are still running.
    pub fn live(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Abort everything.
    pub fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.cancel();
        }
    }
}
