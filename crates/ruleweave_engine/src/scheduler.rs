//! Fork-join scheduling of join tree deltas.
//!
//! Join trees share no node state, so their deltas can be computed in
//! parallel while working memory is read-only. Each [`DeltaTask`] owns the
//! mutable state of one tree; tasks go through a channel drained by scoped
//! worker threads, and the caller gets control back only after every worker
//! joined.

use std::thread;

use crossbeam_channel::unbounded;
use tracing::{instrument, warn};

use ruleweave_foundation::{Error, Result};
use ruleweave_storage::WorkingMemory;

use crate::network::JoinTree;
use crate::node::{DeltaMode, TreeMemory};

/// Delta computation of one join tree.
pub struct DeltaTask<'a> {
    /// The tree's nodes.
    pub tree: &'a JoinTree,
    /// The tree's session state.
    pub state: &'a mut TreeMemory,
}

impl DeltaTask<'_> {
    fn run(self, memory: &WorkingMemory, mode: DeltaMode) -> Result<()> {
        self.state.compute(self.tree, memory, mode)
    }
}

/// Runs delta tasks on a fixed number of worker threads.
#[derive(Copy, Clone, Debug)]
pub struct Scheduler {
    workers: usize,
}

impl Scheduler {
    /// Creates a scheduler. Zero workers is treated as one.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Computes every task and returns the first error.
    ///
    /// A panic in a worker is re-raised on the calling thread.
    #[instrument(skip_all, fields(tasks = tasks.len(), workers = self.workers))]
    pub fn run(&self, tasks: Vec<DeltaTask<'_>>, memory: &WorkingMemory, mode: DeltaMode) -> Result<()> {
        if self.workers == 1 || tasks.len() <= 1 {
            for task in tasks {
                task.run(memory, mode)?;
            }
            return Ok(());
        }

        let workers = self.workers.min(tasks.len());
        let (sender, receiver) = unbounded();
        for task in tasks {
            sender
                .send(task)
                .map_err(|_| Error::internal("delta task queue closed"))?;
        }
        drop(sender);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for n in 0..workers {
                let receiver = receiver.clone();
                let spawned = thread::Builder::new()
                    .name(format!("ruleweave-delta-{n}"))
                    .spawn_scoped(scope, move || -> Result<()> {
                        let mut outcome = Ok(());
                        for task in receiver {
                            if let Err(e) = task.run(memory, mode) {
                                if outcome.is_ok() {
                                    outcome = Err(e);
                                }
                            }
                        }
                        outcome
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => warn!(error = %e, "failed to spawn delta worker"),
                }
            }

            if handles.is_empty() {
                for task in receiver.try_iter() {
                    task.run(memory, mode)?;
                }
                return Ok(());
            }
            let mut outcome = Ok(());
            for handle in handles {
                let result = handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
                if outcome.is_ok() {
                    outcome = result;
                }
            }
            outcome
        })
    }
}
