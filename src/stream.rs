//! Stream tags and per-tick stream state.
//!
//! Every tick of the pipeline carries a stream tag identifying which
//! upstream source produced the tick's data ("Camera", "Drive", ...). Task
//! list entries may declare an affinity for one stream; mismatching entries
//! are skipped for the tick. The engine only consumes the tag; whichever
//! reader task drives the ticks decides how it is computed.
//!
//! The current tag and the context epoch live in a [`StreamState`] shared
//! by the registry. Reader tasks cache the handle in `pre_process`, set the
//! tag per tick, and bump the epoch at context boundaries (a new run, a new
//! input file); the event loop compares epochs before every tick and
//! re-initializes the pipeline when one has passed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Tag identifying which upstream source produced a tick's data.
///
/// The empty tag is special: as an entry affinity it means "run on every
/// tick regardless of the active stream", and it is the default for both
/// affinities and the active stream itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The empty tag, matching every stream.
    pub fn all() -> Self {
        Self(String::new())
    }

    /// Whether this is the match-everything tag.
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for StreamId {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Per-run stream state: the active stream tag and the context epoch.
///
/// One instance is owned by the registry and shared (via `Rc`) with the
/// task lists and reader tasks of the run. Not thread-safe; the engine is
/// single-threaded by contract.
#[derive(Debug, Default)]
pub struct StreamState {
    current: RefCell<StreamId>,
    epoch: Cell<u64>,
}

impl StreamState {
    /// Create a fresh state: active stream "all", epoch zero.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Set the active stream for the current tick.
    pub fn set_current(&self, tag: impl Into<StreamId>) {
        *self.current.borrow_mut() = tag.into();
    }

    /// The active stream tag.
    pub fn current(&self) -> StreamId {
        self.current.borrow().clone()
    }

    /// Whether an entry with the given affinity runs on the current tick.
    ///
    /// The empty affinity admits every stream.
    pub fn admits(&self, tag: &StreamId) -> bool {
        tag.is_all() || *tag == *self.current.borrow()
    }

    /// Announce a context boundary (new run, new file).
    ///
    /// Returns the new epoch. The event loop re-initializes the pipeline
    /// before the next tick it drives.
    pub fn begin_context(&self) -> u64 {
        let next = self.epoch.get() + 1;
        self.epoch.set(next);
        next
    }

    /// The current context epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }
}
