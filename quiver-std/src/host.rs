//! Host scheduler adapters for [`Loop::integrate`].
//!
//! A host scheduler receives a [`Task`] and must run it "soon", outside the
//! caller's stack. Each adapter here turns a task into a local future.

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use quiver_core::{Loop, LoopError, Task};
use tracing::error;

/// Schedule flushes on a `futures` [`LocalPool`](futures::executor::LocalPool).
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = LocalPool::new();
/// lp.integrate(host::local_pool(pool.spawner()), true)?;
/// // ...
/// pool.run_until_stalled();
/// ```
pub fn local_pool(spawner: LocalSpawner) -> impl Fn(Task) + 'static {
    move |task: Task| {
        if let Err(err) = spawner.spawn_local(async move { task() }) {
            error!(error = %err, "failed to schedule flush on local pool");
        }
    }
}

/// Install [`local_pool`] on `lp`, discarding pending state.
pub fn integrate_local_pool(lp: &Loop, spawner: LocalSpawner) -> Result<(), LoopError> {
    lp.integrate(local_pool(spawner), true)
}

/// Schedule flushes with [`tokio::task::spawn_local`].
///
/// Flushes are spawned onto the current `LocalSet`; requesting one outside
/// a `LocalSet` context panics, as `spawn_local` does.
#[cfg(feature = "tokio")]
pub fn tokio_local() -> impl Fn(Task) + 'static {
    |task: Task| {
        tokio::task::spawn_local(async move { task() });
    }
}
