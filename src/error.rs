//! Crate-level error types for command dispatch, routines, backend effects,
//! and resource arbitration.

use crate::event::DashboardEvent;

/// Error returned to callers of the command bus.
///
/// Routine failures never surface here: they are converted into
/// `CommandFailed` events by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dashboard session has been torn down.
    ///
    /// Returned synchronously by `dispatch` after `close`; nothing was
    /// queued and no state was touched.
    #[error("dashboard session is closed")]
    SessionClosed,

    /// The command finished with an event outside the awaited set.
    ///
    /// Returned by `dispatch_and_wait_for` when the terminal event for the
    /// command (for example `CommandFailed` or `Cancelled`) is not one of the
    /// event types the caller asked for. Carries that event so callers can
    /// inspect the failure.
    #[error("command finished with unexpected event {}", .0.event_type())]
    UnexpectedEvent(Box<DashboardEvent>),
}

/// Error raised inside a handler routine.
///
/// The scheduler catches these at its boundary; hosts only ever observe them
/// as the payload of a failure event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutineError {
    /// A precondition checked by the routine before performing effects.
    #[error("{0}")]
    Validation(String),

    /// An external call rejected.
    #[error(transparent)]
    Effect(#[from] EffectError),

    /// The command was cancelled before the routine completed.
    #[error("command was cancelled")]
    Cancelled,
}

impl RoutineError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Error returned by a [`Backend`](crate::Backend) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    /// The backend understood the request and refused it.
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    /// The referenced object does not exist on the backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl EffectError {
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Error returned by a resource arbiter for misuse of its protocol.
///
/// Delegation to the current holder is not an error; see
/// [`OpenGrant::Delegated`](crate::OpenGrant::Delegated).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbiterError {
    #[error("owner {0} is not registered with the arbiter")]
    UnknownOwner(String),

    #[error("owner {0} is already registered with the arbiter")]
    DuplicateOwner(String),
}
