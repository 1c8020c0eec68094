//! Bespoke mocks for the traits in `interface.rs`, used by this crate's own tests.
#![allow(unused_variables)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::control_packet::{
    ConnectInfo, PacketIdentifier, PublishInfo, QoS, SubscribeInfo, UnsubscribeInfo,
};
use crate::error::ProtocolError;
use crate::interface::{CommandAllocator, Incoming, ProtocolEngine};

/// Mock [`ProtocolEngine`] whose outgoing calls succeed and assign sequential packet ids unless
/// told otherwise, paired with an [`EventInjector`] that stands in for a broker's incoming
/// traffic.
pub struct MockProtocolEngine {
    rx: UnboundedReceiver<Incoming>,
    next_pkid: PacketIdentifier,
    fail_next_publish: bool,
    /// The `ConnectInfo` supplied to the most recent `connect` call, so tests can assert on it.
    last_connect: Option<ConnectInfo>,
}

impl MockProtocolEngine {
    /// Return a new mocked engine along with an [`EventInjector`] for feeding it incoming events.
    #[must_use]
    pub fn new() -> (Self, EventInjector) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                rx,
                next_pkid: 1,
                fail_next_publish: false,
                last_connect: None,
            },
            EventInjector { tx },
        )
    }

    /// Make the next call to `publish` return a [`ProtocolError`] instead of succeeding.
    pub fn fail_next_publish(&mut self) {
        self.fail_next_publish = true;
    }

    /// The `ConnectInfo` passed to the most recent `connect` call, if any.
    #[must_use]
    pub fn last_connect(&self) -> Option<&ConnectInfo> {
        self.last_connect.as_ref()
    }

    fn take_pkid(&mut self) -> PacketIdentifier {
        let pkid = self.next_pkid;
        self.next_pkid = if pkid == u16::MAX { 1 } else { pkid + 1 };
        pkid
    }
}

// TODO: track call order and arguments for assertions once a test needs it; not needed yet.

#[async_trait]
impl ProtocolEngine for MockProtocolEngine {
    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), ProtocolError> {
        // Mirrors `RumqttcProtocolEngine::connect` resetting state as if a fresh client had been
        // built from `info`, rather than silently accepting and discarding it.
        self.next_pkid = 1;
        self.last_connect = Some(info.clone());
        Ok(())
    }

    async fn publish(&mut self, info: &PublishInfo) -> Result<Option<PacketIdentifier>, ProtocolError> {
        if self.fail_next_publish {
            self.fail_next_publish = false;
            return Err(ProtocolError("mock publish failure".to_string()));
        }
        Ok((!matches!(info.qos, QoS::AtMostOnce)).then(|| self.take_pkid()))
    }

    async fn subscribe(&mut self, info: &SubscribeInfo) -> Result<PacketIdentifier, ProtocolError> {
        Ok(self.take_pkid())
    }

    async fn unsubscribe(&mut self, info: &UnsubscribeInfo) -> Result<PacketIdentifier, ProtocolError> {
        Ok(self.take_pkid())
    }

    async fn ping(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn ack_publish(&mut self, packet_id: PacketIdentifier, qos: QoS) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>, ProtocolError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(ProtocolError("event injector dropped".to_string())),
            Err(_elapsed) => Ok(None),
        }
    }
}

/// Used to inject [`Incoming`] events into a [`MockProtocolEngine`], standing in for a broker.
#[derive(Clone)]
pub struct EventInjector {
    tx: UnboundedSender<Incoming>,
}

impl EventInjector {
    /// Inject an event for the next `poll` to return.
    ///
    /// # Errors
    /// Returns a [`SendError`] if the event could not be injected (i.e. the engine has been
    /// dropped).
    pub fn inject(&self, event: Incoming) -> Result<(), SendError<Incoming>> {
        self.tx.send(event)
    }
}

/// A [`CommandAllocator`] with an optional fixed capacity and a running reservation count, for
/// asserting on allocator behavior in tests.
#[derive(Debug)]
pub struct MockAllocator {
    capacity: Option<usize>,
    in_use: AtomicUsize,
}

impl MockAllocator {
    /// An allocator that never refuses a reservation.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            capacity: None,
            in_use: AtomicUsize::new(0),
        }
    }

    /// An allocator that refuses reservations past `capacity`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Number of reservations currently outstanding.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl CommandAllocator for MockAllocator {
    fn try_reserve(&self) -> bool {
        match self.capacity {
            None => {
                self.in_use.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(capacity) => self
                .in_use
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < capacity).then_some(current + 1)
                })
                .is_ok(),
        }
    }

    fn release(&self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
