//! Session configuration.

/// How the fire loop walks an agenda.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AgendaMode {
    /// Stop walking the agenda once a rule action buffers inserts or
    /// updates, then recompute. Unfired rules keep their activations.
    #[default]
    Default,
    /// Fire every rule on the agenda before recomputing.
    Continuous,
}

/// Configuration for a rule session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Agenda walking discipline.
    pub agenda_mode: AgendaMode,

    /// Maximum fire cycles per `fire()` call (kill switch).
    pub max_fire_cycles: u64,

    /// Worker threads used to compute join deltas.
    pub worker_threads: usize,

    /// Reject facts of unknown types instead of skipping them.
    pub strict_types: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agenda_mode: AgendaMode::Default,
            max_fire_cycles: 10_000,
            worker_threads: default_workers(),
            strict_types: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get().min(8))
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that computes deltas on the calling thread.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Creates a configuration that rejects facts of unknown types.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_types: true,
            ..Self::default()
        }
    }

    /// Builder method to set the agenda mode.
    #[must_use]
    pub fn with_agenda_mode(mut self, mode: AgendaMode) -> Self {
        self.agenda_mode = mode;
        self
    }

    /// Builder method to set the fire cycle ceiling.
    #[must_use]
    pub fn with_max_fire_cycles(mut self, max: u64) -> Self {
        self.max_fire_cycles = max;
        self
    }

    /// Builder method to set the worker thread count (at least one).
    #[must_use]
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers.max(1);
        self
    }

    /// Builder method to set strict type handling.
    #[must_use]
    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }
}
