//! Control packet payloads carried by [`Command`](crate::command::Command)s and produced by the
//! [`ProtocolEngine`](crate::interface::ProtocolEngine) on the way back out.
//!
//! These are independent of any particular MQTT client crate: the core only ever sees these
//! shapes, never `rumqttc` types directly, so swapping the engine in `rumqttc_adapter.rs` for a
//! different MQTT 3.1.1 client never touches the dispatch core.

use bytes::Bytes;

use crate::topic::{TopicFilter, TopicName};

/// Quality of Service, as defined in MQTT 3.1.1 section 4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce,
    /// At least once delivery.
    AtLeastOnce,
    /// Exactly once delivery.
    ExactlyOnce,
}

/// A packet identifier, present on all PUBLISH (QoS > 0), SUBSCRIBE, and UNSUBSCRIBE packets.
pub type PacketIdentifier = u16;

/// Parameters for a CONNECT packet.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Whether the broker should discard any existing session for this client identifier.
    pub clean_session: bool,
    /// Keep-alive interval, in seconds.
    pub keep_alive_secs: u16,
    /// Optional username for the CONNECT packet.
    pub username: Option<String>,
    /// Optional password for the CONNECT packet.
    pub password: Option<Vec<u8>>,
}

/// Parameters for a single outgoing PUBLISH packet.
#[derive(Debug, Clone)]
pub struct PublishInfo {
    /// Topic the message is published to.
    pub topic: TopicName,
    /// Requested quality of service.
    pub qos: QoS,
    /// Whether the broker should retain this message for future subscribers.
    pub retain: bool,
    /// Whether this is a redelivery of a publish the broker never acknowledged, set by
    /// [`crate::agent::resume_session`] when resending after a reconnect.
    pub dup: bool,
    /// Message payload.
    pub payload: Bytes,
}

/// A single topic filter plus requested QoS, as carried in a SUBSCRIBE packet.
#[derive(Debug, Clone)]
pub struct SubscribeTopic {
    /// Topic filter to subscribe to.
    pub filter: TopicFilter,
    /// Maximum QoS requested for this filter.
    pub qos: QoS,
}

/// Parameters for a SUBSCRIBE packet. The protocol allows subscribing to multiple filters in a
/// single packet, sharing one packet identifier and one SUBACK.
#[derive(Debug, Clone)]
pub struct SubscribeInfo {
    /// Filters to subscribe to.
    pub topics: Vec<SubscribeTopic>,
}

/// Parameters for an UNSUBSCRIBE packet.
#[derive(Debug, Clone)]
pub struct UnsubscribeInfo {
    /// Filters to unsubscribe from.
    pub filters: Vec<TopicFilter>,
}

/// Per-filter return code carried on a SUBACK, per MQTT 3.1.1 section 3.9.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    /// Subscription accepted at QoS 0.
    SuccessQoS0,
    /// Subscription accepted at QoS 1.
    SuccessQoS1,
    /// Subscription accepted at QoS 2.
    SuccessQoS2,
    /// Subscription rejected by the broker.
    Failure,
}

/// A PUBLISH delivered from the broker, handed to the publish dispatcher for fan-out.
#[derive(Debug, Clone)]
pub struct IncomingPublish {
    /// Topic the message was published to.
    pub topic: TopicName,
    /// Quality of service the message was delivered at.
    pub qos: QoS,
    /// Whether this is a retained message.
    pub retain: bool,
    /// Whether this is a redelivery of a message the broker previously sent (DUP flag).
    pub dup: bool,
    /// Packet identifier, present for QoS 1 and QoS 2 deliveries.
    pub packet_id: Option<PacketIdentifier>,
    /// Message payload.
    pub payload: Bytes,
}
