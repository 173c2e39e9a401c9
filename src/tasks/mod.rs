//! Reusable engine tasks.
//!
//! Domain payloads bring their own tasks; the ones here are generic
//! plumbing: bounded tick sources for tests and demos, and a do-nothing
//! task useful as a counting probe behind a filter.

mod testing;

pub use testing::{NullTask, TickSrc};
