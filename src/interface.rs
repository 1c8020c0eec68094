//! Traits at the seams of the command dispatch core.
//!
//! These replace the function-pointer vtable a C implementation would use to decouple the core
//! from one transport: a generic [`ProtocolEngine`] plays the role of the function table, a
//! [`MessageQueue`] is the thread-safe channel producers submit commands through, and a
//! [`CommandAllocator`] controls where [`Command`](crate::command::Command) storage comes from.

use std::time::Duration;

use async_trait::async_trait;

use crate::command::Command;
use crate::control_packet::{
    ConnectInfo, IncomingPublish, PacketIdentifier, PublishInfo, QoS, SubscribeInfo,
    SubscribeReturnCode, UnsubscribeInfo,
};
use crate::error::ProtocolError;

/// An event delivered by the protocol engine's event loop, consumed by the demultiplexer.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// The broker accepted the connection. `session_present` reflects whether it resumed an
    /// existing session (relevant to [`crate::agent::resume_session`]).
    ConnAck { session_present: bool },
    /// A message arrived from the broker.
    Publish(IncomingPublish),
    /// Acknowledgment of a QoS 1 publish.
    PubAck { packet_id: PacketIdentifier },
    /// First acknowledgment of a QoS 2 publish.
    PubRec { packet_id: PacketIdentifier },
    /// Broker's acknowledgment of a PUBREL, completing a QoS 2 publish.
    PubComp { packet_id: PacketIdentifier },
    /// Acknowledgment of a SUBSCRIBE.
    SubAck {
        packet_id: PacketIdentifier,
        return_codes: Vec<SubscribeReturnCode>,
    },
    /// Acknowledgment of an UNSUBSCRIBE.
    UnsubAck { packet_id: PacketIdentifier },
    /// Response to a PINGREQ.
    PingResp,
    /// The broker closed the connection.
    Disconnect,
}

/// The transport-facing half of the agent: everything the worker needs to drive one MQTT 3.1.1
/// connection. An implementation wraps a specific client crate; [`crate::rumqttc_adapter`]
/// provides the default one over `rumqttc`.
#[async_trait]
pub trait ProtocolEngine: Send {
    /// Send a CONNECT packet built from `info`. Implementations whose underlying client fixes
    /// connection parameters at construction (as `rumqttc`'s does) are expected to apply `info` by
    /// reconfiguring that client, not to silently keep whatever it was built with.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), ProtocolError>;

    /// Send a PUBLISH packet, returning its packet identifier if it requires acknowledgment
    /// (QoS 1 or 2).
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn publish(&mut self, info: &PublishInfo) -> Result<Option<PacketIdentifier>, ProtocolError>;

    /// Send a SUBSCRIBE packet, returning its packet identifier.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn subscribe(&mut self, info: &SubscribeInfo) -> Result<PacketIdentifier, ProtocolError>;

    /// Send an UNSUBSCRIBE packet, returning its packet identifier.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn unsubscribe(&mut self, info: &UnsubscribeInfo) -> Result<PacketIdentifier, ProtocolError>;

    /// Send a PINGREQ packet.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn ping(&mut self) -> Result<(), ProtocolError>;

    /// Send a DISCONNECT packet.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the packet.
    async fn disconnect(&mut self) -> Result<(), ProtocolError>;

    /// Acknowledge a received QoS 1 or QoS 2 publish (PUBACK / PUBREC, and PUBREL once the
    /// matching PUBCOMP is read back through [`ProtocolEngine::poll`]). `qos` must be the QoS the
    /// publish itself arrived with — it decides whether the engine sends a PUBACK or a PUBREC.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the engine could not send the acknowledgment.
    async fn ack_publish(&mut self, packet_id: PacketIdentifier, qos: QoS) -> Result<(), ProtocolError>;

    /// Drive the engine's event loop for up to `timeout`, returning the next [`Incoming`] event
    /// if one arrives before the timeout elapses.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the connection failed.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>, ProtocolError>;
}

/// A thread-safe channel [`Command`]s are submitted through.
///
/// Implementations must support many concurrent senders (producer tasks) and exactly one
/// receiver (the worker). [`crate::mpsc_queue::ChannelMessageQueue`] is the default
/// implementation, over `tokio::sync::mpsc`.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Submit a command, waiting up to `timeout` for room in the queue.
    ///
    /// # Errors
    /// Returns the command back if it could not be enqueued before `timeout` elapsed or the
    /// worker side has been dropped.
    async fn send(&self, command: Command, timeout: Duration) -> Result<(), Command>;

    /// Receive the next command, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` on timeout, and `Err(())` once the queue is closed and drained (i.e.
    /// no sender remains and no command is buffered).
    async fn recv(&self, timeout: Duration) -> Result<Option<Command>, ()>;
}

/// Controls where [`Command`] storage comes from.
///
/// The dispatch core never allocates a `Command` itself beyond what an allocator hands it; a
/// [`crate::pool::FixedPool`] can back this with a fixed-capacity pool with no heap allocation
/// on the hot path, while [`crate::pool::HeapAllocator`] is the simple default.
pub trait CommandAllocator: Send + Sync {
    /// Reserve capacity for one more in-flight command, returning `false` if none is available.
    fn try_reserve(&self) -> bool;

    /// Release capacity previously reserved by [`CommandAllocator::try_reserve`].
    fn release(&self);
}
