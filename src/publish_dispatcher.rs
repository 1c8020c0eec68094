//! Fan-out of incoming publishes to registered sinks.
//!
//! The worker sees one global stream of [`IncomingPublish`]es from the protocol engine. This
//! dispatcher is that stream's single consumer internally, and in turn fans each message out to
//! every producer-side sink whose topic filter matches — reconciling a single funnel in with
//! many funnels out.

use std::collections::HashMap;

use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::control_packet::IncomingPublish;
use crate::topic::{TopicFilter, TopicName};

/// Dispatches incoming publishes to topic-filtered sinks, falling back to a single unfiltered
/// sink for anything unmatched.
pub struct PublishFanoutDispatcher {
    channel_capacity: usize,
    filtered: HashMap<TopicFilter, Vec<Sender<IncomingPublish>>>,
    unfiltered: Sender<IncomingPublish>,
}

impl PublishFanoutDispatcher {
    /// Create a new dispatcher and its unfiltered receiver.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<IncomingPublish>) {
        let (tx, rx) = channel(capacity);
        (
            PublishFanoutDispatcher {
                channel_capacity: capacity,
                filtered: HashMap::new(),
                unfiltered: tx,
            },
            rx,
        )
    }

    /// Register `topic_filter` for dispatching, returning a receiver for publishes matching it.
    ///
    /// Multiple receivers may be registered for the same filter; a publish matching it is sent
    /// to all of them.
    pub fn register_filter(&mut self, topic_filter: &TopicFilter) -> Receiver<IncomingPublish> {
        self.prune();
        let (tx, rx) = channel(self.channel_capacity);
        self.filtered
            .entry(topic_filter.clone())
            .or_default()
            .push(tx);
        rx
    }

    /// Dispatch `publish` to every registered filter matching its topic, or to the unfiltered
    /// sink if none match. Returns the number of sinks it was delivered to.
    pub async fn dispatch(&mut self, publish: IncomingPublish) -> usize {
        let topic = publish.topic.clone();
        let mut delivered = 0;
        let mut closed = Vec::new();

        let matching = self
            .filtered
            .iter()
            .filter(|(filter, _)| Self::matches(filter, &topic));
        for (filter, senders) in matching {
            for (pos, sender) in senders.iter().enumerate() {
                if sender.is_closed() {
                    closed.push((filter.clone(), pos));
                    continue;
                }
                if sender.send(publish.clone()).await.is_ok() {
                    delivered += 1;
                }
            }
        }

        if delivered == 0 {
            if self.unfiltered.send(publish).await.is_ok() {
                delivered += 1;
            }
        }

        for (filter, pos) in closed.into_iter().rev() {
            if let Some(senders) = self.filtered.get_mut(&filter) {
                senders.remove(pos);
                if senders.is_empty() {
                    self.filtered.remove(&filter);
                }
            }
        }

        delivered
    }

    fn matches(filter: &TopicFilter, topic: &TopicName) -> bool {
        filter.matches_topic_name(topic)
    }

    /// Remove closed receivers left over from dropped sinks.
    fn prune(&mut self) {
        self.filtered.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
    }
}
