//! Error types for Camshaft.

use thiserror::Error;

/// Result type alias using Camshaft's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required container is not registered.
    #[error("container '{0}' is not registered")]
    MissingContainer(String),

    /// A container was found but holds a different payload type.
    #[error("container '{name}' is not a {expected}")]
    WrongContainerType {
        /// Name the lookup was made under.
        name: String,
        /// Payload type the caller asked for.
        expected: &'static str,
    },

    /// No registered container provides the requested capability.
    #[error("no container provides capability '{0}'")]
    MissingCapability(&'static str),

    /// A container with this name is already registered.
    ///
    /// Overwriting an existing binding requires an explicit
    /// [`replace`](crate::registry::Registry::replace).
    #[error("container '{0}' is already registered")]
    DuplicateContainer(String),

    /// A task was processed before its `pre_process` ran.
    #[error("task '{0}' was processed before pre_process")]
    NotPreProcessed(String),

    /// A task reported a fatal processing error.
    #[error("task '{task}' failed: {message}")]
    TaskFailed {
        /// Name of the failing task.
        task: String,
        /// Task-supplied failure description.
        message: String,
    },

    /// The event loop observed a fatal error and cannot be restarted.
    #[error("event loop is not restartable after a fatal error")]
    NotRestartable,

    /// I/O error from a payload task.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a [`Error::TaskFailed`] from a task name and message.
    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }
}
