//! The pipeline driver.
//!
//! An [`EventLoop`] binds a [`Registry`] to a root [`TaskList`] and drives
//! the four-phase lifecycle: `pre_process` once, then per tick a context
//! check (re-initializing the pipeline when a reader announced a boundary),
//! a container reset, and one `process` call on the root list; finally
//! `post_process` exactly once, however the loop ended.
//!
//! The loop is strictly single-threaded and pull-based: one task executes
//! at a time and every `process` call runs to completion. Stopping is
//! cooperative: a task returns [`Flow::StopLoop`], a task fails, or the
//! caller bounds the run with [`run_for`](EventLoop::run_for).
//!
//! # Example
//!
//! ```rust,ignore
//! use camshaft::prelude::*;
//! use camshaft::tasks::TickSrc;
//!
//! let mut registry = Registry::new();
//! registry.add(Param::new("EventCount", 0u64))?;
//!
//! let mut list = TaskList::new("main");
//! list.add(TickSrc::new(1000));
//! list.add(CountTicks::default());
//!
//! let mut event_loop = EventLoop::new(registry, list);
//! event_loop.run()?;
//! ```

use crate::error::{Error, Result};
use crate::observability;
use crate::registry::Registry;
use crate::task::{Flow, Setup, Task, TaskList};
use std::time::{Duration, Instant};

/// Lifecycle state of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Not yet pre-processed.
    #[default]
    Idle,
    /// Pre-processed and ready to run.
    Ready,
    /// Finished cleanly; may be pre-processed and run again.
    Finished,
    /// A fatal error was observed; the loop cannot be restarted.
    Fatal,
}

/// Statistics for one `run`.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Completed data ticks. The tick on which a task requested the stop
    /// is not counted.
    pub ticks: u64,
    /// Number of context transitions (re-init sweeps).
    pub re_inits: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// The driver: walks the lifecycle of a root task list over a registry.
pub struct EventLoop {
    registry: Registry,
    root: TaskList,
    state: LoopState,
    stats: RunStats,
    last_epoch: u64,
}

impl EventLoop {
    /// Bind a registry to a root task list.
    pub fn new(registry: Registry, root: TaskList) -> Self {
        Self {
            registry,
            root,
            state: LoopState::Idle,
            stats: RunStats::default(),
            last_epoch: 0,
        }
    }

    /// The registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry, for container setup between
    /// construction and the run.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The root task list.
    pub fn root(&self) -> &TaskList {
        &self.root
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Statistics of the last (or current) run.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Tear the loop apart, returning the registry and the root list.
    pub fn into_parts(self) -> (Registry, TaskList) {
        (self.registry, self.root)
    }

    /// Pre-process the pipeline.
    ///
    /// Called implicitly by [`run`](EventLoop::run) when needed. Failure
    /// aborts startup: no `process` will ever be called, and tasks that
    /// were already pre-processed have been released again.
    pub fn pre_process(&mut self) -> Result<()> {
        match self.state {
            LoopState::Fatal => return Err(Error::NotRestartable),
            LoopState::Ready => return Ok(()),
            LoopState::Idle | LoopState::Finished => {}
        }

        tracing::debug!(root = self.root.name(), "pre-processing pipeline");

        // Baseline the epoch first: a reader announcing its initial
        // context during pre-process triggers a re-init before tick one.
        self.last_epoch = self.registry.stream_state().epoch();

        match self.root.pre_process(&mut self.registry) {
            Ok(Setup::Ready) => {}
            Ok(Setup::Withdraw) => {
                tracing::warn!(root = self.root.name(), "root task list withdrew");
            }
            Err(e) => {
                self.state = LoopState::Fatal;
                return Err(e);
            }
        }

        // Setup-time writes are not first-tick data.
        self.registry.clear_changed();

        self.state = LoopState::Ready;
        Ok(())
    }

    /// Run until a task stops the loop or fails.
    pub fn run(&mut self) -> Result<()> {
        self.run_inner(None)
    }

    /// Run for at most `max_ticks` completed ticks.
    pub fn run_for(&mut self, max_ticks: u64) -> Result<()> {
        self.run_inner(Some(max_ticks))
    }

    fn run_inner(&mut self, max_ticks: Option<u64>) -> Result<()> {
        self.pre_process()?;

        tracing::debug!(root = self.root.name(), ?max_ticks, "event loop starting");
        self.stats = RunStats::default();
        let stream = self.registry.stream_state();
        let run_started = Instant::now();
        let mut outcome: Result<()> = Ok(());

        loop {
            if let Some(max) = max_ticks {
                if self.stats.ticks >= max {
                    tracing::debug!(max, "tick bound reached");
                    break;
                }
            }

            // A context boundary announced since the last tick (or during
            // pre-process, for the initial context) re-initializes the
            // pipeline before any further work.
            let epoch = stream.epoch();
            if epoch != self.last_epoch {
                tracing::debug!(epoch, "context transition");
                self.last_epoch = epoch;
                if let Err(e) = self.root.re_init(&mut self.registry) {
                    outcome = Err(e);
                    break;
                }
                self.stats.re_inits += 1;
                observability::record_context_transition();
            }

            self.registry.reset_all();

            let tick_started = Instant::now();
            match self.root.process() {
                Ok(Flow::Continue) | Ok(Flow::SkipRest) => {
                    self.stats.ticks += 1;
                    observability::record_tick(tick_started.elapsed());
                }
                Ok(Flow::StopLoop) => {
                    tracing::debug!(ticks = self.stats.ticks, "stop requested");
                    break;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.stats.elapsed = run_started.elapsed();

        // post_process runs exactly once: pre_process succeeded if we got
        // this far, whatever ended the loop.
        let post = self.root.post_process();
        self.root.log_statistics(0);

        let outcome = match (outcome, post) {
            (Err(first), Err(e)) => {
                // The run already failed; the cleanup failure is reported
                // but the first error wins.
                tracing::warn!(error = %e, "post-process also failed");
                Err(first)
            }
            (Err(first), Ok(())) => Err(first),
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        };

        match &outcome {
            Ok(()) => {
                self.state = LoopState::Finished;
                tracing::info!(
                    ticks = self.stats.ticks,
                    re_inits = self.stats.re_inits,
                    elapsed = ?self.stats.elapsed,
                    "event loop finished"
                );
            }
            Err(e) => {
                self.state = LoopState::Fatal;
                tracing::error!(error = %e, ticks = self.stats.ticks, "event loop failed");
            }
        }
        outcome
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("root", &self.root.name())
            .field("state", &self.state)
            .field("ticks", &self.stats.ticks)
            .finish()
    }
}
