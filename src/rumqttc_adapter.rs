//! Adapter layer binding [`ProtocolEngine`] to `rumqttc`'s MQTT 3.1.1 client.
//!
//! This is the only module in the crate that names `rumqttc` types directly; everything upstream
//! of it (`command.rs`, `dispatcher.rs`, `demux.rs`, `agent.rs`) only ever sees the
//! transport-neutral types in `control_packet.rs` and `interface.rs`.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, NetworkOptions, Packet,
    QoS as RumqttcQoS,
};

use crate::connection_settings::AgentConnectionSettings;
use crate::control_packet::{
    ConnectInfo, IncomingPublish, PacketIdentifier, PublishInfo, QoS, SubscribeInfo,
    SubscribeReturnCode, UnsubscribeInfo,
};
use crate::error::ProtocolError;
use crate::interface::{Incoming, ProtocolEngine};

fn to_rumqttc_qos(qos: QoS) -> RumqttcQoS {
    match qos {
        QoS::AtMostOnce => RumqttcQoS::AtMostOnce,
        QoS::AtLeastOnce => RumqttcQoS::AtLeastOnce,
        QoS::ExactlyOnce => RumqttcQoS::ExactlyOnce,
    }
}

fn from_rumqttc_qos(qos: RumqttcQoS) -> QoS {
    match qos {
        RumqttcQoS::AtMostOnce => QoS::AtMostOnce,
        RumqttcQoS::AtLeastOnce => QoS::AtLeastOnce,
        RumqttcQoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn from_rumqttc_suback_code(code: rumqttc::SubscribeReasonCode) -> SubscribeReturnCode {
    match code {
        rumqttc::SubscribeReasonCode::Success(RumqttcQoS::AtMostOnce) => {
            SubscribeReturnCode::SuccessQoS0
        }
        rumqttc::SubscribeReasonCode::Success(RumqttcQoS::AtLeastOnce) => {
            SubscribeReturnCode::SuccessQoS1
        }
        rumqttc::SubscribeReasonCode::Success(RumqttcQoS::ExactlyOnce) => {
            SubscribeReturnCode::SuccessQoS2
        }
        rumqttc::SubscribeReasonCode::Failure => SubscribeReturnCode::Failure,
    }
}

fn to_mqtt_options(hostname: &str, tcp_port: u16, info: &ConnectInfo) -> MqttOptions {
    let mut options = MqttOptions::new(info.client_id.clone(), hostname, tcp_port);
    options.set_keep_alive(Duration::from_secs(u64::from(info.keep_alive_secs)));
    options.set_clean_session(info.clean_session);
    options.set_manual_acks(true);
    if let Some(username) = &info.username {
        let password = info.password.clone().unwrap_or_default();
        let password = String::from_utf8(password).unwrap_or_default();
        options.set_credentials(username, password);
    }
    options
}

/// A [`ProtocolEngine`] backed by `rumqttc::AsyncClient`/`EventLoop`.
pub struct RumqttcProtocolEngine {
    client: AsyncClient,
    event_loop: EventLoop,
    /// Broker address fixed for the lifetime of this engine; [`ConnectInfo`] carries only the
    /// CONNECT packet's own fields (client id, clean session, keep-alive, credentials), not the
    /// transport target, so a command-level reconnect still needs these to rebuild `MqttOptions`.
    hostname: String,
    tcp_port: u16,
    connection_timeout: Duration,
    event_channel_capacity: usize,
    /// Mirrors the packet identifier `rumqttc`'s internal event loop assigns to the next QoS 1/2
    /// publish it sends. `rumqttc` does not hand this id back from `AsyncClient::publish`
    /// (it is assigned later, inside the event loop); this engine is the exclusive owner of both
    /// the client and the event loop, so no other caller can interleave a publish and desync the
    /// count, which makes predicting it here sound.
    next_pkid: PacketIdentifier,
}

impl RumqttcProtocolEngine {
    /// Build a new engine from connection settings. The returned engine owns both the client
    /// handle (used to issue packets) and the event loop (used to poll for incoming events); the
    /// agent worker drives both from within its own task.
    #[must_use]
    pub fn new(settings: &AgentConnectionSettings, event_channel_capacity: usize) -> Self {
        let info = ConnectInfo {
            client_id: settings.client_id.clone(),
            clean_session: settings.clean_session,
            keep_alive_secs: u16::try_from(settings.keep_alive.as_secs()).unwrap_or(u16::MAX),
            username: settings.username.clone(),
            password: settings.password.clone().map(String::into_bytes),
        };
        let options = to_mqtt_options(&settings.hostname, settings.tcp_port, &info);
        let (client, mut event_loop) = AsyncClient::new(options, event_channel_capacity);
        let mut network_options = NetworkOptions::new();
        network_options.set_connection_timeout(settings.connection_timeout.as_secs());
        event_loop.set_network_options(network_options);
        Self {
            client,
            event_loop,
            hostname: settings.hostname.clone(),
            tcp_port: settings.tcp_port,
            connection_timeout: settings.connection_timeout,
            event_channel_capacity,
            next_pkid: 1,
        }
    }

    fn take_pkid(&mut self) -> PacketIdentifier {
        let pkid = self.next_pkid;
        self.next_pkid = if pkid == u16::MAX { 1 } else { pkid + 1 };
        pkid
    }
}

#[async_trait]
impl ProtocolEngine for RumqttcProtocolEngine {
    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), ProtocolError> {
        // `rumqttc` fixes CONNECT parameters in the `MqttOptions` an `AsyncClient`/`EventLoop`
        // pair is built from; there is no call to change `client_id`/`clean_session`/keep-alive
        // on an already-built client. Applying a freshly supplied `ConnectInfo` therefore means
        // rebuilding both, discarding whatever the previous pair had in flight. The broker address
        // itself is not part of `ConnectInfo` (it is a transport concern, not a CONNECT packet
        // field), so it is carried over from this engine's own construction.
        let options = to_mqtt_options(&self.hostname, self.tcp_port, info);
        let (client, mut event_loop) = AsyncClient::new(options, self.event_channel_capacity);
        let mut network_options = NetworkOptions::new();
        network_options.set_connection_timeout(self.connection_timeout.as_secs());
        event_loop.set_network_options(network_options);
        self.client = client;
        self.event_loop = event_loop;
        self.next_pkid = 1;
        // The CONNECT packet itself is sent implicitly the first time the new event loop is
        // polled, which happens on the next idle `ProcessLoop` tick.
        Ok(())
    }

    async fn publish(&mut self, info: &PublishInfo) -> Result<Option<PacketIdentifier>, ProtocolError> {
        if info.dup {
            // `AsyncClient::publish` has no way to set the wire DUP bit; the broker still
            // receives a well-formed PUBLISH, it just can't tell it's a resend, which only
            // matters for broker-side diagnostics, not protocol correctness.
            log::debug!("resending on topic {} without a wire DUP bit (not exposed by rumqttc)", info.topic.as_str());
        }
        self.client
            .publish(
                info.topic.as_str(),
                to_rumqttc_qos(info.qos),
                info.retain,
                info.payload.clone(),
            )
            .await
            .map_err(|e| ProtocolError(e.to_string()))?;
        // Only advance the mirrored counter once the send is known to have reached the event
        // loop: a failed send never gets a packet id from rumqttc's own counter, so bumping ours
        // on the error path would desync the two and misattribute a later ack.
        Ok((!matches!(info.qos, QoS::AtMostOnce)).then(|| self.take_pkid()))
    }

    async fn subscribe(&mut self, info: &SubscribeInfo) -> Result<PacketIdentifier, ProtocolError> {
        let filters = info
            .topics
            .iter()
            .map(|t| rumqttc::SubscribeFilter::new(t.filter.as_str().to_string(), to_rumqttc_qos(t.qos)));
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|e| ProtocolError(e.to_string()))?;
        Ok(self.take_pkid())
    }

    async fn unsubscribe(&mut self, info: &UnsubscribeInfo) -> Result<PacketIdentifier, ProtocolError> {
        for filter in &info.filters {
            self.client
                .unsubscribe(filter.as_str())
                .await
                .map_err(|e| ProtocolError(e.to_string()))?;
        }
        Ok(self.take_pkid())
    }

    async fn ping(&mut self) -> Result<(), ProtocolError> {
        // `rumqttc`'s event loop sends PINGREQ on its own keep-alive schedule; there is no public
        // API to request one out of band, so this is a no-op and keep-alive is left to the loop.
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| ProtocolError(e.to_string()))
    }

    async fn ack_publish(&mut self, packet_id: PacketIdentifier, qos: QoS) -> Result<(), ProtocolError> {
        // `AsyncClient::ack` only reads `pkid` and `qos` off the `Publish` it's given (to choose
        // between PUBACK and PUBREC) — everything else is a stand-in, since manual acks never
        // re-send the payload.
        let mut publish = rumqttc::Publish::new("", to_rumqttc_qos(qos), Vec::new());
        publish.pkid = packet_id;
        self.client
            .ack(&publish)
            .await
            .map_err(|e| ProtocolError(e.to_string()))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>, ProtocolError> {
        match tokio::time::timeout(timeout, self.event_loop.poll()).await {
            Ok(Ok(event)) => Ok(Self::translate_event(event)),
            Ok(Err(err)) => Err(Self::translate_connection_error(err)),
            Err(_elapsed) => Ok(None),
        }
    }
}

impl RumqttcProtocolEngine {
    fn translate_event(event: Event) -> Option<Incoming> {
        let Event::Incoming(packet) = event else {
            return None;
        };
        match packet {
            Packet::ConnAck(connack) => Some(Incoming::ConnAck {
                session_present: connack.session_present,
            }),
            Packet::Publish(publish) => Some(Incoming::Publish(IncomingPublish {
                topic: crate::topic::TopicName::from_string(publish.topic).ok()?,
                qos: from_rumqttc_qos(publish.qos),
                retain: publish.retain,
                dup: publish.dup,
                packet_id: (publish.pkid != 0).then_some(publish.pkid),
                payload: publish.payload,
            })),
            Packet::PubAck(ack) => Some(Incoming::PubAck {
                packet_id: ack.pkid,
            }),
            Packet::PubRec(ack) => Some(Incoming::PubRec {
                packet_id: ack.pkid,
            }),
            Packet::PubComp(ack) => Some(Incoming::PubComp {
                packet_id: ack.pkid,
            }),
            Packet::SubAck(ack) => Some(Incoming::SubAck {
                packet_id: ack.pkid,
                return_codes: ack
                    .return_codes
                    .into_iter()
                    .map(from_rumqttc_suback_code)
                    .collect(),
            }),
            Packet::UnsubAck(ack) => Some(Incoming::UnsubAck {
                packet_id: ack.pkid,
            }),
            Packet::PingResp => Some(Incoming::PingResp),
            Packet::Disconnect => Some(Incoming::Disconnect),
            _ => None,
        }
    }

    fn translate_connection_error(err: ConnectionError) -> ProtocolError {
        ProtocolError(err.to_string())
    }
}
