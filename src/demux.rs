//! Demultiplexes [`Incoming`] events from the protocol engine: routes acknowledgments to their
//! pending command and publishes to the fan-out dispatcher.

use crate::command::CommandResult;
use crate::control_packet::PacketIdentifier;
use crate::error::{AgentError, AgentErrorKind};
use crate::interface::{Incoming, ProtocolEngine};
use crate::pending_ack::PendingAckTable;
use crate::publish_dispatcher::PublishFanoutDispatcher;

/// Resolve one [`Incoming`] event, completing any pending command it acknowledges and routing
/// any publish payload to the fan-out dispatcher.
///
/// QoS 2 delivery is a three-packet exchange (PUBLISH, PUBREC, PUBREL, PUBCOMP) from the sender's
/// side; the protocol engine owns sending the PUBREL once it receives the PUBREC, so this only
/// needs to resolve the pending command on the terminal PUBCOMP. PUBREC itself completes nothing.
///
/// Returns the CONNACK `session_present` flag when `event` is a [`Incoming::ConnAck`], so the
/// worker loop can drive [`crate::agent::resume_session`] — that decision lives with the worker,
/// not the demultiplexer, since it depends on the worker's session-resume policy.
pub async fn demux<E: ProtocolEngine + ?Sized>(
    event: Incoming,
    engine: &mut E,
    pending: &mut PendingAckTable,
    publishes: &mut PublishFanoutDispatcher,
) -> Option<bool> {
    match event {
        Incoming::ConnAck { session_present } => return Some(session_present),
        Incoming::Publish(publish) => {
            let packet_id = publish.packet_id;
            let qos = publish.qos;
            publishes.dispatch(publish).await;
            if let Some(packet_id) = packet_id {
                if let Err(err) = engine.ack_publish(packet_id, qos).await {
                    log::warn!("failed to acknowledge packet id {packet_id}: {err}");
                }
            }
        }
        Incoming::PubAck { packet_id } => {
            resolve(packet_id, pending, |_| CommandResult::Success);
        }
        Incoming::PubRec { .. } => {
            // No-op: the engine sends PUBREL on its own and the command stays pending until
            // PUBCOMP arrives.
        }
        Incoming::PubComp { packet_id } => {
            resolve(packet_id, pending, |_| CommandResult::Success);
        }
        Incoming::SubAck { packet_id, return_codes } => {
            resolve(packet_id, pending, |_| CommandResult::SubscribeAck(return_codes));
        }
        Incoming::UnsubAck { packet_id } => {
            resolve(packet_id, pending, |_| CommandResult::Success);
        }
        Incoming::PingResp | Incoming::Disconnect => {}
    }
    None
}

fn resolve(
    packet_id: PacketIdentifier,
    pending: &mut PendingAckTable,
    make_result: impl FnOnce(PacketIdentifier) -> CommandResult,
) {
    match pending.remove(packet_id) {
        Some(command) => command.complete(make_result(packet_id)),
        None => log::debug!("ack for unknown or already-completed packet id {packet_id}"),
    }
}

/// Fail every command still in the pending-ack table, used when the worker terminates.
pub fn fail_all_pending(pending: &mut PendingAckTable) {
    for command in pending.drain() {
        command.complete(CommandResult::Failure(AgentError::new(
            AgentErrorKind::RecvFailed,
        )));
    }
}
