//! The command dispatcher: turns one dequeued [`Command`] into calls against the protocol
//! engine, installing a pending-ack table entry for commands that need one.

use crate::command::{Command, CommandKind, CommandResult};
use crate::error::{AgentError, AgentErrorKind};
use crate::interface::ProtocolEngine;
use crate::pending_ack::{InsertError, PendingAckTable};

/// Dispatches commands dequeued by the worker to the protocol engine.
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Dispatch `command` against `engine`, installing it in `pending` if it requires an
    /// acknowledgment.
    ///
    /// Commands that complete immediately (no ack required, or a failure sending the packet at
    /// all) invoke their completion callback before this returns. Commands installed in
    /// `pending` are completed later, when the demultiplexer observes their acknowledgment.
    pub async fn dispatch<E: ProtocolEngine + ?Sized>(
        command: Command,
        engine: &mut E,
        pending: &mut PendingAckTable,
    ) {
        match command.kind {
            CommandKind::Connect(ref info) => {
                let result = engine.connect(info).await;
                Self::finish_or_install(command, result.map(|()| None), pending);
            }
            CommandKind::Publish(ref info) => {
                let result = engine.publish(info).await;
                Self::finish_or_install(command, result, pending);
            }
            CommandKind::Subscribe(ref info) => {
                let result = engine.subscribe(info).await;
                Self::finish_or_install(command, result.map(Some), pending);
            }
            CommandKind::Unsubscribe(ref info) => {
                let result = engine.unsubscribe(info).await;
                Self::finish_or_install(command, result.map(Some), pending);
            }
            CommandKind::Ping => {
                let result = engine.ping().await;
                command.complete(Self::to_command_result(result.map(|()| ())));
            }
            CommandKind::Disconnect => {
                let result = engine.disconnect().await;
                command.complete(Self::to_command_result(result));
            }
            CommandKind::ProcessLoop | CommandKind::Terminate => {
                // Handled directly by the worker loop; the dispatcher never sees these.
                command.complete(CommandResult::Failure(AgentError::new(
                    AgentErrorKind::IllegalState,
                )));
            }
        }
    }

    fn finish_or_install(
        command: Command,
        packet_id: Result<Option<u16>, crate::error::ProtocolError>,
        pending: &mut PendingAckTable,
    ) {
        if let Ok(packet_id) = &packet_id {
            debug_assert_eq!(
                command.needs_ack(),
                packet_id.is_some(),
                "{:?} reported needs_ack() = {} but the engine returned a packet id = {}",
                command.kind,
                command.needs_ack(),
                packet_id.is_some(),
            );
        }
        match packet_id {
            Ok(Some(packet_id)) => {
                if let Err((err, command)) = pending.insert(packet_id, command) {
                    match err {
                        InsertError::Full => log::error!(
                            "pending-ack table full for packet id {packet_id} after send"
                        ),
                        InsertError::AlreadyPending(packet_id) => {
                            log::error!("packet id {packet_id} reused while still pending");
                        }
                    }
                    command.complete(CommandResult::Failure(AgentError::new(
                        AgentErrorKind::NoMemory,
                    )));
                }
            }
            Ok(None) => command.complete(CommandResult::Success),
            Err(err) => command.complete(CommandResult::Failure(err.into())),
        }
    }

    fn to_command_result(result: Result<(), crate::error::ProtocolError>) -> CommandResult {
        match result {
            Ok(()) => CommandResult::Success,
            Err(err) => CommandResult::Failure(err.into()),
        }
    }
}
