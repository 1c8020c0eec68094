//! Common error types

use std::fmt;

use thiserror::Error;

/// Error returned by a [`ProtocolEngine`](crate::interface::ProtocolEngine) operation.
///
/// This is intentionally opaque at this layer: the core only needs to know an engine call
/// failed and report it back through a command's completion, not interpret broker-specific
/// detail. Adapters (e.g. `rumqttc_adapter.rs`) wrap their own error types into this one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProtocolError(pub String);

/// Error produced by the command dispatch core.
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct AgentError {
    kind: AgentErrorKind,
}

impl AgentError {
    /// Create a new [`AgentError`]
    #[must_use]
    pub fn new(kind: AgentErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`AgentErrorKind`] for this error
    #[must_use]
    pub fn kind(&self) -> &AgentErrorKind {
        &self.kind
    }
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        AgentError::new(AgentErrorKind::Protocol(err))
    }
}

/// An enumeration of categories of [`AgentError`]
#[derive(Clone, Debug, PartialEq)]
pub enum AgentErrorKind {
    /// A command was submitted with an invalid argument (e.g. an empty topic filter list).
    BadParameter,
    /// The pending-ack table or command allocator has no capacity left for a new command.
    NoMemory,
    /// The command could not be handed to the worker: its queue is closed or full past the
    /// caller's wait budget.
    SendFailed,
    /// A completion could not be delivered back to the caller: the awaiting side has gone away.
    RecvFailed,
    /// The worker is not in a state that can accept this command (e.g. terminated).
    IllegalState,
    /// The underlying protocol engine reported a failure executing the operation.
    Protocol(ProtocolError),
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentErrorKind::BadParameter => write!(f, "invalid command parameter"),
            AgentErrorKind::NoMemory => write!(f, "no capacity for a new pending command"),
            AgentErrorKind::SendFailed => write!(f, "failed to submit command to worker"),
            AgentErrorKind::RecvFailed => write!(f, "failed to receive command completion"),
            AgentErrorKind::IllegalState => write!(f, "worker is not in a state to accept this command"),
            AgentErrorKind::Protocol(err) => write!(f, "protocol engine error: {err}"),
        }
    }
}
