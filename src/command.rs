//! Command records: the unit of work a producer task hands to the agent worker.
//!
//! A [`Command`] owns everything the worker needs to carry out one protocol operation and to
//! report its outcome. There is no caller-retained pointer into a command once it has been sent:
//! ownership moves into the worker's channel, and back out again (as a [`CommandResult`] passed
//! to the completion callback) when the operation finishes or fails.

use std::fmt;

use crate::control_packet::{
    ConnectInfo, PublishInfo, SubscribeInfo, SubscribeReturnCode, UnsubscribeInfo,
};
use crate::error::AgentError;

/// Outcome of a completed [`Command`], passed to its completion callback exactly once.
#[derive(Debug)]
pub enum CommandResult {
    /// The operation completed successfully.
    Success,
    /// A `Subscribe` command's SUBACK came back: the broker's per-filter return codes, in the
    /// same order as the filters in the originating `SubscribeInfo`. A filter can be individually
    /// rejected (`SubscribeReturnCode::Failure`) even when the packet itself was acknowledged, so
    /// this is reported alongside success rather than folded into a pass/fail status.
    SubscribeAck(Vec<SubscribeReturnCode>),
    /// The operation failed.
    Failure(AgentError),
}

impl CommandResult {
    /// Returns `Ok(())` on [`CommandResult::Success`] or [`CommandResult::SubscribeAck`], `Err`
    /// otherwise. Callers that need the per-filter codes should match on `CommandResult` directly
    /// (see [`crate::producer::AgentHandle::subscribe_and_await`]) rather than call this.
    ///
    /// # Errors
    /// The [`AgentError`] carried by [`CommandResult::Failure`].
    pub fn into_result(self) -> Result<(), AgentError> {
        match self {
            CommandResult::Success | CommandResult::SubscribeAck(_) => Ok(()),
            CommandResult::Failure(err) => Err(err),
        }
    }
}

/// A completion callback, invoked exactly once by the worker when a command finishes.
///
/// This is the idiomatic replacement for an opaque `(callback_fn, context_ptr)` pair: the
/// closure captures whatever context it needs directly, and `Send` lets it cross into the
/// worker task.
pub type CompletionCallback = Box<dyn FnOnce(CommandResult) + Send>;

/// The operation-specific payload of a [`Command`].
pub enum CommandKind {
    /// Establish a connection to the broker.
    Connect(ConnectInfo),
    /// Publish a message.
    Publish(PublishInfo),
    /// Subscribe to one or more topic filters.
    Subscribe(SubscribeInfo),
    /// Unsubscribe from one or more topic filters.
    Unsubscribe(UnsubscribeInfo),
    /// Send a PINGREQ.
    Ping,
    /// Gracefully disconnect from the broker.
    Disconnect,
    /// Drive the protocol engine's event loop once, delivering any ready incoming event.
    ProcessLoop,
    /// Shut down the worker: fail every pending command and stop the loop.
    Terminate,
}

impl fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Connect(_) => "Connect",
            CommandKind::Publish(_) => "Publish",
            CommandKind::Subscribe(_) => "Subscribe",
            CommandKind::Unsubscribe(_) => "Unsubscribe",
            CommandKind::Ping => "Ping",
            CommandKind::Disconnect => "Disconnect",
            CommandKind::ProcessLoop => "ProcessLoop",
            CommandKind::Terminate => "Terminate",
        };
        f.write_str(name)
    }
}

/// A unit of work submitted to the agent worker.
///
/// The worker owns a `Command` for its entire lifetime: from dequeue, through dispatch, through
/// (for acknowledged operations) a stay in the pending-ack table, to completion. Nothing else
/// holds a reference to it in the meantime.
pub struct Command {
    /// What to do.
    pub kind: CommandKind,
    /// Invoked once the operation is known to have succeeded or failed.
    pub on_complete: CompletionCallback,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("on_complete", &"<callback>")
            .finish()
    }
}

impl Command {
    /// Create a new [`Command`].
    #[must_use]
    pub fn new(kind: CommandKind, on_complete: CompletionCallback) -> Self {
        Self { kind, on_complete }
    }

    /// Consume the command, invoking its completion callback with `result`.
    pub fn complete(self, result: CommandResult) {
        (self.on_complete)(result);
    }

    /// Returns true if this command's kind is acknowledged by the broker and therefore needs a
    /// pending-ack table entry (i.e. it is not a fire-and-forget QoS 0 publish or an operation
    /// with no corresponding ack packet).
    ///
    /// `Connect` is not included here even though CONNACK is a real acknowledgment packet: the
    /// dispatcher completes a `Connect` command as soon as the CONNECT packet is sent, and the
    /// CONNACK's `session_present` flag is surfaced to the worker loop directly rather than
    /// resolving a pending-ack entry (there would be no packet id to key one on).
    #[must_use]
    pub fn needs_ack(&self) -> bool {
        match &self.kind {
            CommandKind::Subscribe(_) | CommandKind::Unsubscribe(_) => true,
            CommandKind::Publish(info) => !matches!(info.qos, crate::control_packet::QoS::AtMostOnce),
            CommandKind::Connect(_)
            | CommandKind::Ping
            | CommandKind::Disconnect
            | CommandKind::ProcessLoop
            | CommandKind::Terminate => false,
        }
    }
}
