//! Runtime failures, operation outcomes and the error propagation envelope.

use crate::builder::{GraphError, InvalidDefinition};
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// Errors surfaced by machine operations and returned by hooks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MachineError {
    /// A definition or request referenced something the graph does not have.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A definition failed validation as a whole.
    #[error(transparent)]
    Definition(#[from] InvalidDefinition),

    /// A hook, handler or observer failed at runtime.
    #[error("{0}")]
    Failed(String),
}

impl MachineError {
    /// Runtime failure with a message, for use in hook code.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error came from a malformed definition rather than
    /// from hook code.
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Self::Graph(_) | Self::Definition(_))
    }
}

/// Result type of hooks, handlers and channel observers.
pub type HookResult = Result<(), MachineError>;

/// What a machine operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request took effect.
    Applied,

    /// The request was a no-op: already in the requested condition, a
    /// guard rejected it, or the machine was not in a state to accept it.
    Ignored,

    /// The request was recorded behind an in-flight transition and will be
    /// processed once that transition's current step finishes.
    Queued,
}

/// Envelope for a failure travelling outward through error handlers.
///
/// Clones share the handled flag, so a handler marking the context handled
/// is visible to whoever is bubbling the failure.
///
/// # Example
///
/// ```rust
/// use stratum::core::{ErrorContext, MachineError};
///
/// let ctx = ErrorContext::new(MachineError::failed("disk full"));
/// let seen_by_handler = ctx.clone();
///
/// assert!(!ctx.is_handled());
/// seen_by_handler.stop_propagation();
/// assert!(ctx.is_handled());
/// ```
#[derive(Debug, Clone)]
pub struct ErrorContext {
    error: MachineError,
    handled: Rc<Cell<bool>>,
}

impl ErrorContext {
    pub fn new(error: MachineError) -> Self {
        Self {
            error,
            handled: Rc::new(Cell::new(false)),
        }
    }

    pub fn error(&self) -> &MachineError {
        &self.error
    }

    /// Mark the failure handled; bubbling stops at the current handler.
    pub fn stop_propagation(&self) {
        self.handled.set(true);
    }

    pub fn is_handled(&self) -> bool {
        self.handled.get()
    }

    pub fn into_error(self) -> MachineError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_builds_runtime_failure() {
        let err = MachineError::failed("hook blew up");
        assert_eq!(err.to_string(), "hook blew up");
        assert!(!err.is_graph_error());
    }

    #[test]
    fn graph_errors_convert() {
        let err: MachineError = GraphError::UnknownStart("nowhere".to_string()).into();
        assert!(err.is_graph_error());
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn context_starts_unhandled() {
        let ctx = ErrorContext::new(MachineError::failed("x"));
        assert!(!ctx.is_handled());
        assert_eq!(ctx.error(), &MachineError::failed("x"));
    }

    #[test]
    fn stop_propagation_is_shared_between_clones() {
        let ctx = ErrorContext::new(MachineError::failed("x"));
        let handler_view = ctx.clone();

        handler_view.stop_propagation();

        assert!(ctx.is_handled());
        assert_eq!(ctx.into_error(), MachineError::failed("x"));
    }
}
