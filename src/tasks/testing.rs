//! Test and demo tasks.

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::stream::{StreamId, StreamState};
use crate::task::{Flow, Setup, Task};
use std::rc::Rc;

/// A bounded tick source.
///
/// Drives a pipeline for a fixed number of ticks, then requests the stop.
/// Optionally cycles the active stream through a schedule and announces a
/// context boundary every `n` data ticks, making it a stand-in for a real
/// reader task in tests and demos.
///
/// On a context boundary the source bumps the epoch and returns
/// [`Flow::SkipRest`] for that tick, so the event loop re-initializes the
/// pipeline before any task sees data from the new context.
///
/// # Example
///
/// ```rust,ignore
/// use camshaft::tasks::TickSrc;
///
/// // 100 ticks alternating between two subsystem streams, with a context
/// // boundary every 25 ticks.
/// let src = TickSrc::new(100)
///     .with_stream_cycle(["Camera", "Drive"])
///     .with_context_every(25);
/// ```
pub struct TickSrc {
    name: String,
    ticks: u64,
    emitted: u64,
    streams: Vec<StreamId>,
    context_every: Option<u64>,
    last_boundary: u64,
    state: Option<Rc<StreamState>>,
}

impl TickSrc {
    /// Create a source emitting `ticks` data ticks.
    pub fn new(ticks: u64) -> Self {
        Self {
            name: "tick-src".to_string(),
            ticks,
            emitted: 0,
            streams: Vec::new(),
            context_every: None,
            last_boundary: 0,
            state: None,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cycle the active stream through a schedule, one entry per tick.
    pub fn with_stream_cycle<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StreamId>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    /// Announce a context boundary every `n` data ticks.
    pub fn with_context_every(mut self, n: u64) -> Self {
        self.context_every = Some(n);
        self
    }

    /// Number of data ticks emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Task for TickSrc {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        let state = registry.stream_state();
        // Announce the initial context so the loop re-inits before tick one.
        state.begin_context();
        self.state = Some(state);
        self.emitted = 0;
        self.last_boundary = 0;
        Ok(Setup::Ready)
    }

    fn process(&mut self) -> Result<Flow> {
        let state = match &self.state {
            Some(state) => state,
            None => return Err(Error::NotPreProcessed(self.name.clone())),
        };

        if self.emitted >= self.ticks {
            return Ok(Flow::StopLoop);
        }

        if let Some(n) = self.context_every {
            if self.emitted > 0 && self.emitted % n == 0 && self.last_boundary != self.emitted {
                self.last_boundary = self.emitted;
                state.begin_context();
                // Suppress the rest of this tick; the loop re-inits before
                // the next one.
                return Ok(Flow::SkipRest);
            }
        }

        if !self.streams.is_empty() {
            let tag = self.streams[(self.emitted as usize) % self.streams.len()].clone();
            state.set_current(tag);
        }

        self.emitted += 1;
        Ok(Flow::Continue)
    }
}

/// Task that does nothing.
///
/// Scheduling one still counts executions in the enclosing list's
/// statistics, which makes it a handy probe behind a filter condition or a
/// stream affinity.
pub struct NullTask {
    name: String,
}

impl NullTask {
    /// Create a null task.
    pub fn new() -> Self {
        Self {
            name: "null-task".to_string(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for NullTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for NullTask {
    fn name(&self) -> &str {
        &self.name
    }
}
