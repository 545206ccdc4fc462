use std::cell::RefCell;
use std::future::Future;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::promise::TaskError;

/// Cooperative single-threaded task runner.
///
/// Tasks make progress only inside [`Scheduler::tick`] /
/// [`Scheduler::run_until_idle`]; nothing runs between calls, so store
/// mutations never interleave with suspended user code unless the
/// caller pumps the scheduler.
pub struct Scheduler {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// Queues a top-level task.
    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        if let Err(err) = self.spawner.spawn_local(fut) {
            tracing::error!(target: "rhizome", %err, "failed to spawn task");
        }
    }

    /// Queues a top-level fallible task; an `Err` outcome is logged,
    /// never propagated.
    pub fn spawn_guarded(&self, fut: impl Future<Output = Result<(), TaskError>> + 'static) {
        self.spawn(async move {
            if let Err(err) = fut.await {
                tracing::error!(target: "rhizome", %err, "background task failed");
            }
        });
    }

    /// Runs at most one ready task to its next suspension point.
    /// Returns false when nothing was ready.
    pub fn tick(&self) -> bool {
        self.pool.borrow_mut().try_run_one()
    }

    /// Runs every ready task until all are suspended or finished.
    pub fn run_until_idle(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}
