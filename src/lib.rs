//! # Camshaft
//!
//! A single-threaded, pull-based task pipeline engine with named shared
//! state, built for tick-at-a-time event processing: read a record,
//! calibrate it, parameterize it, write it out, once per tick and in a
//! fixed task order.
//!
//! ## Concepts
//!
//! - **Containers** are named units of shared mutable state registered in a
//!   [`Registry`](registry::Registry); tasks resolve them by name (or by
//!   capability) once, up front, and share them across ticks.
//! - **Tasks** implement a four-phase lifecycle
//!   (`pre_process`/`re_init`/`process`/`post_process`); the
//!   [`Flow`](task::Flow) returned by `process` steers the pipeline.
//! - **Task lists** are ordered task sequences and are tasks themselves, so
//!   sub-pipelines nest. Entries can be restricted to one input stream or
//!   gated by a filter condition.
//! - **Filters** publish per-tick booleans that gates turn into "skip the
//!   rest of this list for this tick", the engine's only branch construct.
//! - The **event loop** drives the whole thing until the data runs out,
//!   a task fails, or a tick bound is reached, re-initializing the
//!   pipeline at every context boundary (new run, new file).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use camshaft::prelude::*;
//! use camshaft::container::Param;
//! use camshaft::tasks::TickSrc;
//!
//! let mut registry = Registry::new();
//! registry.add(Param::new("EventCount", 0u64))?;
//!
//! let mut list = TaskList::new("main");
//! list.add(TickSrc::new(1000));
//! list.add(CountTicks::new()); // your Task impl
//!
//! let mut event_loop = EventLoop::new(registry, list);
//! event_loop.run()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod error;
pub mod event_loop;
pub mod filter;
pub mod observability;
pub mod registry;
pub mod stream;
pub mod task;
pub mod tasks;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::container::{Container, ContainerCell, ContainerRef, Param};
    pub use crate::error::{Error, Result};
    pub use crate::event_loop::{EventLoop, LoopState, RunStats};
    pub use crate::filter::{FilterCondition, FilterGate, Flag, FnFilter};
    pub use crate::registry::Registry;
    pub use crate::stream::{StreamId, StreamState};
    pub use crate::task::{Flow, Setup, Task, TaskEntry, TaskList, TaskStats};
}

pub use error::{Error, Result};
