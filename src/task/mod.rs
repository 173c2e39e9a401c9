//! Task lifecycle contract.
//!
//! A task is a unit of work driven by the event loop through four phases:
//!
//! - [`pre_process`](Task::pre_process): once, before the loop starts.
//!   Resolve and cache the container handles the task needs; a failure here
//!   is fatal and aborts startup.
//! - [`re_init`](Task::re_init): on every context transition (new run, new
//!   input file), before the first tick of the new context. Re-resolve
//!   per-context parameters; failure is fatal.
//! - [`process`](Task::process): once per tick. The returned [`Flow`]
//!   steers the enclosing [`TaskList`]; an `Err` aborts the loop.
//! - [`post_process`](Task::post_process): exactly once per task whose
//!   `pre_process` succeeded, however the loop ended.
//!
//! Tasks run strictly one at a time; `process` takes no registry because
//! all bindings were resolved up front and only the container *contents*
//! change from tick to tick.
//!
//! # Example
//!
//! ```rust,ignore
//! use camshaft::container::{ContainerRef, Param};
//! use camshaft::prelude::*;
//!
//! struct CountTicks {
//!     count: Option<ContainerRef>,
//! }
//!
//! impl Task for CountTicks {
//!     fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
//!         self.count = Some(registry.get("EventCount")?);
//!         Ok(Setup::Ready)
//!     }
//!
//!     fn process(&mut self) -> Result<Flow> {
//!         let cell = self.count.as_ref().unwrap();
//!         cell.borrow_mut_as::<Param<u64>>().unwrap().value += 1;
//!         cell.mark_changed();
//!         Ok(Flow::Continue)
//!     }
//! }
//! ```

mod list;

pub use list::{TaskEntry, TaskList, TaskStats};

use crate::error::Result;
use crate::registry::Registry;

/// Outcome of one `process` call.
///
/// Fatal errors are not a `Flow`: they are reported as `Err` from
/// [`Task::process`] and abort the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Normal: sibling tasks after this one still run this tick.
    #[default]
    Continue,
    /// Skip the remaining tasks of the *immediately enclosing* list for
    /// this tick only. The skip never propagates past that list.
    SkipRest,
    /// End the event loop after this tick; not an error (end of data).
    StopLoop,
}

impl Flow {
    /// Whether this is [`Flow::Continue`].
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Whether this is [`Flow::SkipRest`].
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::SkipRest)
    }

    /// Whether this is [`Flow::StopLoop`].
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::StopLoop)
    }
}

/// Outcome of `pre_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Setup {
    /// The task resolved its bindings and takes part in the run.
    #[default]
    Ready,
    /// The task excludes itself from the run: it is neither processed nor
    /// post-processed. Used by tasks that discover they have nothing to do
    /// for this particular pipeline configuration.
    Withdraw,
}

/// A unit of work with the four-phase lifecycle.
///
/// Every method except [`name`](Task::name) has a successful default, so a
/// task only implements the phases it participates in. Tasks are not
/// required to be `Send`: the engine is single-threaded by contract.
pub trait Task {
    /// Name for diagnostics and statistics. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Resolve and cache required container handles.
    ///
    /// Called once before the loop starts. A missing or mis-typed
    /// container is a fatal setup error; return it rather than deferring.
    /// On failure the task must leave itself clean; its `post_process`
    /// will not be called.
    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        let _ = registry;
        Ok(Setup::Ready)
    }

    /// Re-resolve context-dependent parameters.
    ///
    /// Called on every context transition before the first tick of the new
    /// context, possibly many times per run. Failure is fatal.
    fn re_init(&mut self, registry: &mut Registry) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    /// Perform one tick of work.
    fn process(&mut self) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    /// Release resources and flush summaries.
    ///
    /// Called exactly once if `pre_process` succeeded, regardless of how
    /// the loop ended.
    fn post_process(&mut self) -> Result<()> {
        Ok(())
    }

    /// Log execution statistics, indented by nesting depth.
    ///
    /// Leaf tasks do nothing here; their counters live in the enclosing
    /// list's entry. [`TaskList`] overrides this to log its entries and
    /// recurse into nested lists.
    fn log_statistics(&self, indent: usize) {
        let _ = indent;
    }
}
